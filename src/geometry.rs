//! Legacy cylinder/head/sector geometry.
//!
//! A RAM-backed volume has no physical geometry, but legacy consumers still
//! ask for one. This module fabricates a self-consistent triple such that
//! `cylinders * heads * sectors_per_track` approximates the capacity in host
//! sectors. Geometry is purely descriptive and carries no addressing
//! authority; capacity is authoritative only from `capacity_bytes`.

use crate::constants::HOST_SECTOR_SHIFT;

/// Fixed head count reported to legacy consumers.
pub const GEO_HEADS: u8 = 1 << 6;

/// Fixed sectors-per-track count reported to legacy consumers.
pub const GEO_SECTORS_PER_TRACK: u8 = 1 << 5;

/// Log2 of sectors per cylinder (`heads * sectors_per_track`).
const GEO_CYLINDER_SHIFT: u32 = 11;

const _: () = {
    assert!(GEO_HEADS == 64);
    assert!(GEO_SECTORS_PER_TRACK == 32);
    assert!((GEO_HEADS as u64) * (GEO_SECTORS_PER_TRACK as u64) == 1 << GEO_CYLINDER_SHIFT);
};

/// Legacy CHS triple derived from capacity. Stateless; recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cylinders: u64,
    pub heads: u8,
    pub sectors_per_track: u8,
}

impl Geometry {
    /// Total sectors implied by the triple. At most one cylinder unit below
    /// the true host-sector count (the division truncates).
    #[inline]
    pub fn total_sectors(&self) -> u64 {
        self.cylinders * u64::from(self.heads) * u64::from(self.sectors_per_track)
    }
}

/// Derives the legacy geometry for a volume of `capacity_bytes`.
///
/// The computation uses the host's fixed 512-byte sector unit, independent of
/// the device's own configured sector size. Reproduced exactly for
/// compatibility: `heads = 64`, `sectors_per_track = 32`,
/// `cylinders = host_sectors >> 11`.
pub fn describe(capacity_bytes: u64) -> Geometry {
    let host_sectors = capacity_bytes >> HOST_SECTOR_SHIFT;

    let geometry = Geometry {
        cylinders: host_sectors >> GEO_CYLINDER_SHIFT,
        heads: GEO_HEADS,
        sectors_per_track: GEO_SECTORS_PER_TRACK,
    };
    assert!(geometry.total_sectors() <= host_sectors);

    geometry
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_geometry_consistent(capacity in 1u64..(1 << 45)) {
            let geo = describe(capacity);
            let host_sectors = capacity >> HOST_SECTOR_SHIFT;

            prop_assert_eq!(geo.heads, GEO_HEADS);
            prop_assert_eq!(geo.sectors_per_track, GEO_SECTORS_PER_TRACK);
            prop_assert!(geo.total_sectors() <= host_sectors);
            prop_assert!(host_sectors - geo.total_sectors() < 2048);
        }

        #[test]
        fn prop_geometry_monotonic(a in 1u64..(1 << 44), delta in 0u64..(1 << 44)) {
            let smaller = describe(a);
            let larger = describe(a + delta);
            prop_assert!(larger.cylinders >= smaller.cylinders);
            prop_assert!(larger.total_sectors() >= smaller.total_sectors());
        }
    }
}
