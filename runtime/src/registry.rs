//! Content-addressed sharing of immutable geometry buffers.
//!
//! Component instances that reference identical authored content (same
//! source meshes, same merge parameters) resolve to one physical buffer:
//! the first registrant for a content hash stores the payload, later
//! registrants reuse it through a reference count. Each registration also
//! receives its own particle chunk in the shared simulation buffer, since
//! instances deform independently even when their geometry is shared.
//!
//! The registry is an explicitly constructed value passed to whoever
//! needs it; there is no global instance.

use std::collections::HashMap;
use std::sync::Arc;

use meshweave_core::data::GeometryBuffer;
use meshweave_core::MeshError;

/// Handle to a shared geometry payload. Equal authored content yields
/// equal handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

/// The result of registering one component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub handle: BufferHandle,
    /// True for the registrant that populated the shared payload.
    pub is_first: bool,
    /// Start of this instance's chunk in the shared particle buffer.
    pub particle_offset: u32,
}

#[derive(Debug)]
struct Entry {
    hash: u32,
    payload: Arc<GeometryBuffer>,
    ref_count: u32,
}

/// Content-addressed cache of [`GeometryBuffer`] payloads.
#[derive(Debug, Default)]
pub struct SharedGeometryRegistry {
    entries: Vec<Option<Entry>>,
    by_hash: HashMap<u32, u32>,
    free_slots: Vec<u32>,
    next_particle_offset: u32,
}

impl SharedGeometryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one instance of `geometry`.
    ///
    /// The buffer must verify. Instances with equal content hashes share
    /// one entry; `is_first` is true exactly once per hash while it stays
    /// registered.
    pub fn register(&mut self, geometry: &Arc<GeometryBuffer>) -> Result<Registration, MeshError> {
        geometry.verify()?;
        let hash = geometry.content_hash;

        let existing = self
            .by_hash
            .get(&hash)
            .copied()
            .filter(|&slot| matches!(self.entries.get(slot as usize), Some(Some(_))));
        let (slot, is_first) = match existing {
            Some(slot) => {
                if let Some(Some(entry)) = self.entries.get_mut(slot as usize) {
                    entry.ref_count += 1;
                }
                (slot, false)
            }
            None => {
                let entry = Entry {
                    hash,
                    payload: Arc::clone(geometry),
                    ref_count: 1,
                };
                let slot = match self.free_slots.pop() {
                    Some(slot) => {
                        self.entries[slot as usize] = Some(entry);
                        slot
                    }
                    None => {
                        self.entries.push(Some(entry));
                        (self.entries.len() - 1) as u32
                    }
                };
                self.by_hash.insert(hash, slot);
                (slot, true)
            }
        };

        let particle_offset = self.next_particle_offset;
        self.next_particle_offset += geometry.vertex_count;

        log::debug!(
            "registered geometry {hash:#010x} (slot {slot}, first: {is_first}, particles at {particle_offset})"
        );
        Ok(Registration {
            handle: BufferHandle(slot),
            is_first,
            particle_offset,
        })
    }

    /// Drop one registration. The payload is released when the last
    /// registrant leaves. Returns false for a stale handle.
    pub fn unregister(&mut self, handle: BufferHandle) -> bool {
        let slot = handle.0 as usize;
        let Some(Some(entry)) = self.entries.get_mut(slot) else {
            return false;
        };
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            let hash = entry.hash;
            self.entries[slot] = None;
            self.by_hash.remove(&hash);
            self.free_slots.push(handle.0);
            log::debug!("released geometry {hash:#010x} (slot {slot})");
        }
        true
    }

    /// The shared payload behind a handle.
    pub fn payload(&self, handle: BufferHandle) -> Option<&Arc<GeometryBuffer>> {
        self.entries
            .get(handle.0 as usize)
            .and_then(|e| e.as_ref())
            .map(|e| &e.payload)
    }

    /// Deep-copy a shared payload for independent editing.
    ///
    /// Shared buffers are never edited in place; duplicating an asset
    /// clones the payload and the clone is re-sealed (and thus re-hashed)
    /// once editing finishes.
    pub fn clone_payload(&self, handle: BufferHandle) -> Option<GeometryBuffer> {
        self.payload(handle).map(|arc| {
            let mut copy = GeometryBuffer::clone(arc);
            copy.content_hash = 0;
            copy.format_version = 0;
            copy
        })
    }

    /// Number of distinct payloads currently shared.
    pub fn shared_count(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_registered(&self, hash: u32) -> bool {
        self.by_hash.contains_key(&hash)
    }
}

static_assertions::assert_impl_all!(SharedGeometryRegistry: Send);
