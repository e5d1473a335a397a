//! Sector hasher (C3).
//!
//! Partitions 3D space into cubes of side `grid` light-years and maps each cube to a fixed
//! length hex digest. Pure and deterministic; holds no state beyond the grid size and digest
//! length, both of which are config (changing either requires a full rebuild of the systems
//! store, since `systemSector` values become incomparable across a grid-size change).

use std::collections::HashSet;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct SectorHasher {
    grid: f64,
    hash_bytes: usize,
}

impl SectorHasher {
    pub fn new(grid: f64, hash_bytes: usize) -> Self {
        assert!(grid > 0.0, "sector grid size must be positive");
        assert!(hash_bytes > 0 && hash_bytes <= 32, "hash_bytes must be in 1..=32");
        Self { grid, hash_bytes }
    }

    fn cube(&self, x: f64, y: f64, z: f64) -> (i64, i64, i64) {
        (
            (x / self.grid).floor() as i64,
            (y / self.grid).floor() as i64,
            (z / self.grid).floor() as i64,
        )
    }

    fn digest_cube(&self, cube: (i64, i64, i64)) -> String {
        let mut hasher = Sha256::new();
        hasher.update(cube.0.to_le_bytes());
        hasher.update(cube.1.to_le_bytes());
        hasher.update(cube.2.to_le_bytes());
        let full = hasher.finalize();
        hex::encode(&full[..self.hash_bytes])
    }

    /// The sector id for a single point.
    pub fn sector_of(&self, x: f64, y: f64, z: f64) -> String {
        self.digest_cube(self.cube(x, y, z))
    }

    /// Every sector id whose cube intersects the bounding sphere of radius `d` around
    /// `(x, y, z)`. Implemented as an inclusive bounding-box enumeration per axis, as a
    /// superset that never misses a cube the sphere actually touches (§4.1, property 6).
    pub fn nearby_sectors(&self, x: f64, y: f64, z: f64, d: f64) -> HashSet<String> {
        let (cx, cy, cz) = self.cube(x, y, z);
        let lo = |c: f64| ((c - d) / self.grid).floor() as i64;
        let hi = |c: f64| ((c + d) / self.grid).ceil() as i64;

        let (lo_x, hi_x) = (lo(x), hi(x));
        let (lo_y, hi_y) = (lo(y), hi(y));
        let (lo_z, hi_z) = (lo(z), hi(z));

        let mut out = HashSet::new();
        // cx/cy/cz are always inside [lo,hi]; iterate the full box regardless.
        let _ = (cx, cy, cz);
        for ix in lo_x..=hi_x {
            for iy in lo_y..=hi_y {
                for iz in lo_z..=hi_z {
                    out.insert(self.digest_cube((ix, iy, iz)));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_same_sector() {
        let h = SectorHasher::new(100.0, 8);
        assert_eq!(h.sector_of(10.0, 20.0, 30.0), h.sector_of(10.0, 20.0, 30.0));
    }

    #[test]
    fn digest_length_matches_hash_bytes() {
        let h = SectorHasher::new(100.0, 8);
        assert_eq!(h.sector_of(0.0, 0.0, 0.0).len(), 16);
    }

    #[test]
    fn nearby_sectors_contains_self() {
        let h = SectorHasher::new(100.0, 8);
        let sectors = h.nearby_sectors(0.0, 0.0, 0.0, 10.0);
        assert!(sectors.contains(&h.sector_of(0.0, 0.0, 0.0)));
    }

    #[test]
    fn nearby_sectors_no_false_negatives_near_boundary() {
        let h = SectorHasher::new(100.0, 8);
        // A point just across a cube boundary from the origin, within radius d.
        let p = (101.0, 0.0, 0.0);
        let d = 5.0;
        let sectors = h.nearby_sectors(100.0, 0.0, 0.0, d);
        let dist = ((p.0 - 100.0f64).powi(2) + p.1.powi(2) + p.2.powi(2)).sqrt();
        assert!(dist <= d);
        assert!(sectors.contains(&h.sector_of(p.0, p.1, p.2)));
    }

    #[test]
    fn larger_radius_yields_more_sectors() {
        let h = SectorHasher::new(100.0, 8);
        let small = h.nearby_sectors(50.0, 50.0, 50.0, 10.0);
        let large = h.nearby_sectors(50.0, 50.0, 50.0, 500.0);
        assert!(large.len() >= small.len());
    }
}
