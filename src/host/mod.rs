//! Abstract boundary with the host I/O subsystem.
//!
//! The host subsystem is the external framework that routes I/O to a device.
//! The core consumes it through [`HostSubsystem`]; everything behind the
//! trait (real kernel integration, test double) is a collaborator, not part
//! of the core.

pub mod mock;

use thiserror::Error;

pub use mock::{FailPoint, HostEvent, MockHost};

/// The host refused a registration step. Fatal to initialization; rolls back
/// exactly the steps acquired before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("host refused driver registration")]
    Driver,
    #[error("host could not allocate a disk handle")]
    Disk,
    #[error("host could not allocate a request queue")]
    Queue,
}

/// Host I/O subsystem operations consumed by the device lifecycle.
///
/// Acquisition order is `register_driver`, `allocate_disk`,
/// `allocate_queue`; release happens in strict reverse, each release paired
/// with exactly one successful acquisition.
///
/// Handle types are associated so a host may hand out whatever it likes;
/// the core never inspects them, it only stores and returns them.
pub trait HostSubsystem {
    /// Identifier assigned by a successful `register_driver`.
    type DriverId: Copy + core::fmt::Debug;
    /// Opaque disk object.
    type Disk;
    /// Opaque request-queue object.
    type Queue;

    fn register_driver(&self, name: &str) -> Result<Self::DriverId, RegistrationError>;

    fn allocate_disk(&self, minor_count: u32) -> Result<Self::Disk, RegistrationError>;

    fn allocate_queue(&self) -> Result<Self::Queue, RegistrationError>;

    /// Binds the device as the queue's context and tells the host the
    /// device's logical sector size.
    fn bind_queue_context(&self, queue: &mut Self::Queue, device_name: &str, sector_size: u64);

    /// Sets the disk capacity, expressed in host (512-byte) sectors.
    fn set_capacity(&self, disk: &mut Self::Disk, host_sectors: u64);

    /// Exposes the disk; live I/O may arrive from this point on.
    fn publish_disk(&self, disk: &mut Self::Disk, disk_name: &str);

    fn unpublish_disk(&self, disk: &mut Self::Disk);

    fn release_queue(&self, queue: Self::Queue);

    fn release_disk(&self, disk: Self::Disk);

    fn unregister_driver(&self, driver: Self::DriverId, name: &str);
}
