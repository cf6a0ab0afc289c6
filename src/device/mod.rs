//! The device aggregate: lifecycle plus request processing.
//!
//! A [`Device`] is an ordinary value; any number may coexist and requests
//! against different devices are fully independent. It is created only by
//! [`Device::bring_up`] and destroyed only by [`Device::tear_down`], so a
//! live `Device` is always fully constructed.

pub mod lifecycle;
pub mod request;

use parking_lot::Mutex;

pub use lifecycle::{InitError, LifecycleState};
pub use request::{Completion, Direction, Request, RequestError};

use crate::geometry::{self, Geometry};
use crate::host::HostSubsystem;
use crate::store::RamStore;

/// A RAM-backed block device registered with a host subsystem.
///
/// # Invariants
///
/// - `capacity_bytes == sector_size * sector_count`, never mutated
/// - `store.len() == capacity_bytes`
/// - store contents change only through [`Device::submit`]
pub struct Device<H: HostSubsystem> {
    name: String,
    sector_size: u64,
    sector_count: u64,
    capacity_bytes: u64,

    /// Exclusive guard over all reads and writes against the store.
    store: Mutex<RamStore>,

    driver: H::DriverId,
    disk: H::Disk,
    queue: H::Queue,

    state: LifecycleState,
}

impl<H: HostSubsystem> core::fmt::Debug for Device<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("sector_size", &self.sector_size)
            .field("sector_count", &self.sector_count)
            .field("capacity_bytes", &self.capacity_bytes)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<H: HostSubsystem> Device<H> {
    /// Validates structural invariants. Called in public methods.
    #[inline]
    fn assert_invariants(&self) {
        assert!(self.state == LifecycleState::Ready);
        assert!(self.sector_size > 0);
        assert!(self.sector_count > 0);
        assert!(self.capacity_bytes == self.sector_size * self.sector_count);
    }

    /// Services one I/O request, atomically with respect to every other
    /// request on this device.
    ///
    /// The whole range is validated against capacity before any byte moves;
    /// an out-of-range request mutates nothing. The device lock is held
    /// across all segments rather than per segment, so concurrent requests
    /// observe each other all-or-nothing at the byte level. The cost is full
    /// serialization of I/O per device; that trade-off is deliberate.
    ///
    /// Completion is synchronous: when this returns, the transfer has
    /// happened and the caller may reuse its buffers immediately.
    pub fn submit(&self, request: Request<'_>) -> Result<Completion, RequestError> {
        self.assert_invariants();

        let direction = request.direction();
        let start_sector = request.start_sector();
        let total_len = request.total_len();

        let out_of_range = RequestError::OutOfRange {
            start_sector,
            len: total_len,
            capacity_bytes: self.capacity_bytes,
        };

        let start = start_sector
            .checked_mul(self.sector_size)
            .ok_or(out_of_range)?;
        let end = start.checked_add(total_len).ok_or(out_of_range)?;
        if end > self.capacity_bytes {
            return Err(out_of_range);
        }

        // Non-reentrant; the critical section is pure memory copy, so hold
        // time is bounded by memory bandwidth times request size.
        let mut store = self.store.lock();
        let mut offset = start;
        match request {
            Request::Read { segments, .. } => {
                for segment in segments {
                    if segment.is_empty() {
                        continue;
                    }
                    store
                        .read_into(offset, segment)
                        .expect("request range pre-validated");
                    offset += segment.len() as u64;
                }
            }
            Request::Write { segments, .. } => {
                for segment in segments {
                    if segment.is_empty() {
                        continue;
                    }
                    store
                        .write_from(offset, segment)
                        .expect("request range pre-validated");
                    offset += segment.len() as u64;
                }
            }
        }
        drop(store);
        assert!(offset == end);

        log::trace!(
            "{}: {:?} sector={} len={}",
            self.name,
            direction,
            start_sector,
            total_len,
        );

        Ok(Completion {
            direction,
            bytes_transferred: total_len,
        })
    }

    /// Legacy geometry for this device's capacity. Descriptive only.
    pub fn geometry(&self) -> Geometry {
        self.assert_invariants();
        geometry::describe(self.capacity_bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sector_size(&self) -> u64 {
        self.sector_size
    }

    pub fn sector_count(&self) -> u64 {
        self.sector_count
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }
}
