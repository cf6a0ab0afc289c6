//! Volume configuration.
//!
//! Two knobs, read once at startup and passed to [`Device::bring_up`]
//! unchanged: the device sector size and the sector count. Textual parsing is
//! the embedder's job; this module validates only numeric constraints.
//!
//! [`Device::bring_up`]: crate::device::Device::bring_up

use thiserror::Error;

use crate::constants::{
    CAPACITY_DEFAULT, HOST_SECTOR_SIZE, NAME_DEFAULT, NAME_MAX, SECTOR_SIZE_DEFAULT,
    SECTOR_SIZE_MAX, SECTOR_SIZE_MIN,
};

/// Rejected configuration. Fatal to initialization; nothing is allocated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("device name must be non-empty and at most {NAME_MAX} bytes")]
    Name,
    #[error(
        "sector_size {0} must be a multiple of {HOST_SECTOR_SIZE} in \
         [{SECTOR_SIZE_MIN}, {SECTOR_SIZE_MAX}]"
    )]
    SectorSize(u64),
    #[error("sector_count must be positive")]
    SectorCount,
    #[error("sector_size {sector_size} * sector_count {sector_count} overflows capacity")]
    CapacityOverflow { sector_size: u64, sector_count: u64 },
}

/// Startup parameters for one volume.
///
/// `Default` reproduces the stock configuration: a 1 GiB volume of 512-byte
/// sectors named `xiprd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeConfig {
    /// Bounded identifier, set once at creation. Also the driver name
    /// registered with the host subsystem.
    pub name: String,
    /// Bytes per logical sector; immutable after creation.
    pub sector_size: u64,
    /// Total sectors; immutable after creation.
    pub sector_count: u64,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            name: NAME_DEFAULT.to_string(),
            sector_size: SECTOR_SIZE_DEFAULT,
            sector_count: CAPACITY_DEFAULT / SECTOR_SIZE_DEFAULT,
        }
    }
}

impl VolumeConfig {
    /// Checks every numeric constraint; the first violation wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || self.name.len() > NAME_MAX {
            return Err(ConfigError::Name);
        }

        let sector_size_valid = self.sector_size >= SECTOR_SIZE_MIN
            && self.sector_size <= SECTOR_SIZE_MAX
            && self.sector_size.is_multiple_of(HOST_SECTOR_SIZE);
        if !sector_size_valid {
            return Err(ConfigError::SectorSize(self.sector_size));
        }

        if self.sector_count == 0 {
            return Err(ConfigError::SectorCount);
        }

        let capacity = self
            .sector_size
            .checked_mul(self.sector_count)
            .ok_or(ConfigError::CapacityOverflow {
                sector_size: self.sector_size,
                sector_count: self.sector_count,
            })?;
        // The store is a single in-memory allocation.
        if capacity > isize::MAX as u64 {
            return Err(ConfigError::CapacityOverflow {
                sector_size: self.sector_size,
                sector_count: self.sector_count,
            });
        }

        Ok(())
    }

    /// Total capacity in bytes. Valid only after [`Self::validate`] passed.
    ///
    /// # Panics
    ///
    /// Panics on overflow; `validate` rules that out.
    pub fn capacity_bytes(&self) -> u64 {
        let capacity = self
            .sector_size
            .checked_mul(self.sector_count)
            .expect("capacity overflow, config not validated");
        assert!(capacity > 0);

        capacity
    }
}
