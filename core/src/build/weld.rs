//! Weld passes: collapse clusters that are close enough to count as one
//! simulated vertex.
//!
//! Two reductions run over the cluster soup:
//!
//! - [`weld_near_points`]: any two clusters within a radius, found
//!   through a 3-D grid hash, closest pair first.
//! - [`weld_linked`]: clusters joined by triangle topology within a
//!   radius, gated by surface-normal agreement so a hard edge never
//!   welds shut.
//!
//! Both repeat until no pair qualifies, re-evaluating neighborhoods after
//! every merge since combined clusters move.

use std::collections::{BTreeSet, HashMap};

use crate::build::cluster::ClusterSoup;
use crate::math::{angle_degrees, Vec3};

const NO_DIST: f32 = f32::MAX;

/// Nearest qualifying partner of each cluster, if any.
struct NearestTable {
    partner: Vec<Option<u32>>,
    dist: Vec<f32>,
    /// Reverse index: who currently points at this cluster.
    pointed_by: HashMap<u32, BTreeSet<u32>>,
}

impl NearestTable {
    fn new(len: usize) -> Self {
        Self {
            partner: vec![None; len],
            dist: vec![NO_DIST; len],
            pointed_by: HashMap::new(),
        }
    }

    fn set(&mut self, id: u32, partner: Option<(u32, f32)>) {
        if let Some(old) = self.partner[id as usize] {
            if let Some(set) = self.pointed_by.get_mut(&old) {
                set.remove(&id);
            }
        }
        match partner {
            Some((p, d)) => {
                self.partner[id as usize] = Some(p);
                self.dist[id as usize] = d;
                self.pointed_by.entry(p).or_default().insert(id);
            }
            None => {
                self.partner[id as usize] = None;
                self.dist[id as usize] = NO_DIST;
            }
        }
    }

    /// The globally closest pair, ties broken toward the lowest cluster
    /// id for determinism.
    fn closest(&self) -> Option<u32> {
        let mut best: Option<u32> = None;
        let mut best_dist = NO_DIST;
        for (id, &d) in self.dist.iter().enumerate() {
            if self.partner[id].is_some() && d < best_dist {
                best = Some(id as u32);
                best_dist = d;
            }
        }
        best
    }

    /// Drain everyone pointing at `id` (used when `id` moves or dies).
    fn take_pointers(&mut self, id: u32) -> BTreeSet<u32> {
        self.pointed_by.remove(&id).unwrap_or_default()
    }
}

/// 3-D cell hash over cluster positions.
struct Grid {
    cell: f32,
    map: HashMap<[i32; 3], Vec<u32>>,
}

impl Grid {
    fn new(cell: f32) -> Self {
        Self {
            cell: cell.max(1e-6),
            map: HashMap::new(),
        }
    }

    fn key(&self, p: Vec3) -> [i32; 3] {
        [
            (p.x / self.cell).floor() as i32,
            (p.y / self.cell).floor() as i32,
            (p.z / self.cell).floor() as i32,
        ]
    }

    fn insert(&mut self, id: u32, p: Vec3) {
        self.map.entry(self.key(p)).or_default().push(id);
    }

    fn remove(&mut self, id: u32, p: Vec3) {
        let key = self.key(p);
        if let Some(list) = self.map.get_mut(&key) {
            list.retain(|&x| x != id);
            if list.is_empty() {
                self.map.remove(&key);
            }
        }
    }

    /// Visit every cluster in cells overlapping a sphere.
    fn for_each_in_radius(&self, center: Vec3, radius: f32, mut f: impl FnMut(u32)) {
        let reach = (radius / self.cell).floor() as i32 + 1;
        let c = self.key(center);
        for x in (c[0] - reach)..=(c[0] + reach) {
            for y in (c[1] - reach)..=(c[1] + reach) {
                for z in (c[2] - reach)..=(c[2] + reach) {
                    if let Some(list) = self.map.get(&[x, y, z]) {
                        for &id in list {
                            f(id);
                        }
                    }
                }
            }
        }
    }
}

/// Weld every cluster pair within `radius`, closest pair first.
pub(crate) fn weld_near_points(soup: &mut ClusterSoup, radius: f32) {
    if radius <= 0.0 {
        return;
    }
    let before = soup.alive_count();

    let mut grid = Grid::new(radius * 2.0);
    for (id, c) in soup.clusters.iter().enumerate() {
        if c.alive {
            grid.insert(id as u32, c.wpos);
        }
    }

    let mut table = NearestTable::new(soup.clusters.len());
    let ids: Vec<u32> = (0..soup.clusters.len() as u32)
        .filter(|&id| soup.clusters[id as usize].alive)
        .collect();
    for &id in &ids {
        let nearest = search_grid_nearest(soup, &grid, id, radius);
        table.set(id, nearest);
    }

    while let Some(keep) = table.closest() {
        let drop = match table.partner[keep as usize] {
            Some(p) => p,
            None => break,
        };

        // Everyone whose nearest was either endpoint must re-search.
        let mut affected = table.take_pointers(keep);
        affected.extend(table.take_pointers(drop));
        affected.insert(keep);
        affected.remove(&drop);
        table.set(drop, None);

        let keep_old_pos = soup.clusters[keep as usize].wpos;
        let drop_pos = soup.clusters[drop as usize].wpos;
        grid.remove(drop, drop_pos);
        grid.remove(keep, keep_old_pos);

        soup.combine(keep, drop);
        grid.insert(keep, soup.clusters[keep as usize].wpos);

        for id in affected {
            if soup.clusters[id as usize].alive {
                let nearest = search_grid_nearest(soup, &grid, id, radius);
                table.set(id, nearest);
            }
        }
    }

    log::debug!(
        "near-point weld (r={radius}): {before} -> {} clusters",
        soup.alive_count()
    );
}

fn search_grid_nearest(
    soup: &ClusterSoup,
    grid: &Grid,
    id: u32,
    radius: f32,
) -> Option<(u32, f32)> {
    let pos = soup.clusters[id as usize].wpos;
    let mut best: Option<(u32, f32)> = None;
    grid.for_each_in_radius(pos, radius, |other| {
        if other == id || !soup.clusters[other as usize].alive {
            return;
        }
        let d = (soup.clusters[other as usize].wpos - pos).norm();
        if d > radius {
            return;
        }
        let better = match best {
            None => true,
            Some((b, bd)) => d < bd || (d == bd && other < b),
        };
        if better {
            best = Some((other, d));
        }
    });
    best
}

/// Weld topology-linked cluster pairs within `radius`, skipping pairs
/// whose surface normals disagree by more than `same_surface_angle`
/// degrees (a hard edge).
pub(crate) fn weld_linked(soup: &mut ClusterSoup, radius: f32, same_surface_angle: f32) {
    if radius <= 0.0 {
        return;
    }
    let before = soup.alive_count();

    let mut table = NearestTable::new(soup.clusters.len());
    let ids: Vec<u32> = (0..soup.clusters.len() as u32)
        .filter(|&id| soup.clusters[id as usize].alive)
        .collect();
    for &id in &ids {
        table.set(id, search_linked_nearest(soup, id, radius, same_surface_angle));
    }

    while let Some(keep) = table.closest() {
        let drop = match table.partner[keep as usize] {
            Some(p) => p,
            None => break,
        };

        // The link neighborhoods of both endpoints change.
        let mut affected: BTreeSet<u32> = soup.clusters[keep as usize].links.clone();
        affected.extend(soup.clusters[drop as usize].links.iter().copied());
        affected.insert(keep);
        affected.remove(&drop);
        table.set(drop, None);

        soup.combine(keep, drop);

        for id in affected {
            if soup.clusters[id as usize].alive {
                table.set(id, search_linked_nearest(soup, id, radius, same_surface_angle));
            }
        }
    }

    log::debug!(
        "linked weld (r={radius}, angle={same_surface_angle}): {before} -> {} clusters",
        soup.alive_count()
    );
}

fn search_linked_nearest(
    soup: &ClusterSoup,
    id: u32,
    radius: f32,
    same_surface_angle: f32,
) -> Option<(u32, f32)> {
    let cluster = &soup.clusters[id as usize];
    let mut best: Option<(u32, f32)> = None;
    for &other in &cluster.links {
        let oc = &soup.clusters[other as usize];
        if !oc.alive {
            continue;
        }
        let d = (oc.wpos - cluster.wpos).norm();
        if d > radius {
            continue;
        }
        if angle_degrees(&cluster.wnor, &oc.wnor) > same_surface_angle {
            continue;
        }
        let better = match best {
            None => true,
            Some((b, bd)) => d < bd || (d == bd && other < b),
        };
        if better {
            best = Some((other, d));
        }
    }
    best
}
