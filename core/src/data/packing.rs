//! Packed index words.
//!
//! The weight tables and adjacency tables store `(count, start)` pairs and
//! small index tuples packed into single words. The 16-bit halves impose
//! the 65 535-vertex ceiling on unified topology.

/// Pack an unordered index pair into one word, smaller index in the high
/// half. Used as an order-independent edge key.
pub fn pack_pair(v0: u32, v1: u32) -> u32 {
    let (hi, lo) = if v0 > v1 { (v1, v0) } else { (v0, v1) };
    hi << 16 | lo & 0xffff
}

/// Split an edge key back into its two indices.
pub fn unpack_pair(pack: u32) -> (u32, u32) {
    (pack >> 16 & 0xffff, pack & 0xffff)
}

/// Pack an unordered index triple into one word (sorted ascending).
/// Used as a triangle key.
pub fn pack_triple(v0: u32, v1: u32, v2: u32) -> u64 {
    let mut v = [v0, v1, v2];
    v.sort_unstable();
    (v[0] as u64) << 32 | (v[1] as u64) << 16 | v[2] as u64
}

/// Pack an unordered index quadruple into one word (sorted ascending).
/// Used as a quad key when hunting duplicate triangle pairs.
pub fn pack_quad(v0: u32, v1: u32, v2: u32, v3: u32) -> u64 {
    let mut v = [v0, v1, v2, v3];
    v.sort_unstable();
    (v[0] as u64) << 48 | (v[1] as u64) << 32 | (v[2] as u64) << 16 | v[3] as u64
}

/// Pack a `(count, start)` pair as 4/28 bits. Weight-table entry: at most
/// 15 weights per vertex.
pub fn pack4_28(count: u32, start: u32) -> u32 {
    count << 28 | start & 0x0fff_ffff
}

/// Unpack a 4/28 `(count, start)` pair.
pub fn unpack4_28(pack: u32) -> (u32, u32) {
    (pack >> 28 & 0xf, pack & 0x0fff_ffff)
}

/// Pack a `(count, start)` pair as 8/24 bits. Adjacency-table entry: at
/// most 255 triangles per vertex.
pub fn pack8_24(count: u32, start: u32) -> u32 {
    count << 24 | start & 0x00ff_ffff
}

/// Unpack an 8/24 `(count, start)` pair.
pub fn unpack8_24(pack: u32) -> (u32, u32) {
    (pack >> 24 & 0xff, pack & 0x00ff_ffff)
}

/// Pack two 16-bit indices, `hi` in the upper half. Used for
/// (child mesh, child vertex) references.
pub fn pack16(hi: u32, lo: u32) -> u32 {
    hi << 16 | lo & 0xffff
}

/// Unpack a 16/16 pair.
pub fn unpack16(pack: u32) -> (u32, u32) {
    (pack >> 16 & 0xffff, pack & 0xffff)
}
