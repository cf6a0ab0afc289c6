//! RAM-backed block volume engine.
//!
//! Presents a fixed-capacity block device whose entire content lives in one
//! in-memory buffer. The host I/O subsystem is an abstract boundary
//! ([`host::HostSubsystem`]); requests are serviced synchronously by copying
//! bytes between caller segments and the backing store under one per-device
//! lock. Despite the crate's execute-in-place ancestry, all I/O is
//! copy-based; nothing is mapped into a consumer's address space.

pub mod config;
pub mod constants;
pub mod device;
pub mod geometry;
pub mod host;
pub mod store;
pub mod test_utils;

pub use config::{ConfigError, VolumeConfig};
pub use device::{Completion, Device, Direction, InitError, LifecycleState, Request, RequestError};
pub use geometry::Geometry;
pub use host::{HostSubsystem, RegistrationError};
pub use store::{AllocError, RamStore, RangeError};
