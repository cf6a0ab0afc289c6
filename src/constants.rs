//! Volume protocol constants and limits.

/// Log2 of the host I/O subsystem's fixed addressing unit.
pub const HOST_SECTOR_SHIFT: u32 = 9;

/// The host subsystem addresses capacity in fixed 512-byte sectors,
/// independent of the device's own configured sector size.
pub const HOST_SECTOR_SIZE: u64 = 1 << HOST_SECTOR_SHIFT;

/// Minimum device sector size (legacy 512-byte sectors).
pub const SECTOR_SIZE_MIN: u64 = 512;

/// Default device sector size.
pub const SECTOR_SIZE_DEFAULT: u64 = 512;

/// Maximum supported device sector size (64 KiB for large-block devices).
pub const SECTOR_SIZE_MAX: u64 = 65536;

/// Default volume capacity: 1 GiB.
pub const CAPACITY_DEFAULT: u64 = 1024 * 1024 * 1024;

/// Default device name, also the driver name registered with the host.
pub const NAME_DEFAULT: &str = "xiprd";

/// Upper bound on device name length, in bytes.
pub const NAME_MAX: usize = 32;

/// Minor numbers reserved per disk handle.
pub const MINORS_PER_DISK: u32 = 16;

const _: () = {
    assert!(HOST_SECTOR_SIZE == 512);
    assert!(SECTOR_SIZE_MIN.is_power_of_two());
    assert!(SECTOR_SIZE_DEFAULT.is_power_of_two());
    assert!(SECTOR_SIZE_MAX.is_power_of_two());
    assert!(SECTOR_SIZE_MIN <= SECTOR_SIZE_DEFAULT);
    assert!(SECTOR_SIZE_DEFAULT <= SECTOR_SIZE_MAX);
    assert!(SECTOR_SIZE_MIN >= HOST_SECTOR_SIZE);

    // Offsets index an in-memory buffer, so u64 byte math must fit usize.
    assert!(std::mem::size_of::<usize>() >= 8);

    assert!(CAPACITY_DEFAULT.is_multiple_of(SECTOR_SIZE_DEFAULT));
    assert!(NAME_DEFAULT.len() <= NAME_MAX);
    assert!(MINORS_PER_DISK > 0);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_pow2() {
        assert!(SECTOR_SIZE_MIN.is_power_of_two());
        assert!(SECTOR_SIZE_DEFAULT.is_power_of_two());
        assert!(SECTOR_SIZE_MAX.is_power_of_two());
        assert!(HOST_SECTOR_SIZE.is_power_of_two());
    }

    #[test]
    fn const_values() {
        assert_eq!(HOST_SECTOR_SIZE, 512);
        assert_eq!(SECTOR_SIZE_MIN, 512);
        assert_eq!(SECTOR_SIZE_MAX, 65536);
        assert_eq!(CAPACITY_DEFAULT, 1 << 30);
        const { assert!(SECTOR_SIZE_MIN <= SECTOR_SIZE_DEFAULT) };
        const { assert!(SECTOR_SIZE_DEFAULT <= SECTOR_SIZE_MAX) };
    }

    #[test]
    fn const_default_sector_count() {
        // The default configuration yields a whole number of sectors.
        assert_eq!(CAPACITY_DEFAULT % SECTOR_SIZE_DEFAULT, 0);
        assert_eq!(CAPACITY_DEFAULT / SECTOR_SIZE_DEFAULT, 2_097_152);
    }
}
