//! One I/O request: a direction, a start sector, and ordered segments.
//!
//! Segments map non-contiguous caller buffers onto one contiguous device
//! range; the device offset advances by each segment's length in turn. The
//! direction is the enum variant, so a request can never mix reads and
//! writes.

use thiserror::Error;

/// Transfer direction of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// A transient value describing one I/O operation against a device.
///
/// Read segments are caller buffers to fill from the store; write segments
/// are caller buffers to copy into the store.
pub enum Request<'a> {
    Read {
        start_sector: u64,
        segments: Vec<&'a mut [u8]>,
    },
    Write {
        start_sector: u64,
        segments: Vec<&'a [u8]>,
    },
}

impl Request<'_> {
    pub fn direction(&self) -> Direction {
        match self {
            Request::Read { .. } => Direction::Read,
            Request::Write { .. } => Direction::Write,
        }
    }

    pub fn start_sector(&self) -> u64 {
        match self {
            Request::Read { start_sector, .. } | Request::Write { start_sector, .. } => {
                *start_sector
            }
        }
    }

    /// Sum of all segment lengths in bytes.
    ///
    /// # Panics
    ///
    /// Panics if the sum overflows `u64` (no real caller gets close).
    pub fn total_len(&self) -> u64 {
        let total = match self {
            Request::Read { segments, .. } => segments
                .iter()
                .try_fold(0u64, |acc, s| acc.checked_add(s.len() as u64)),
            Request::Write { segments, .. } => segments
                .iter()
                .try_fold(0u64, |acc, s| acc.checked_add(s.len() as u64)),
        };
        total.expect("segment lengths overflow u64")
    }

    pub fn segment_count(&self) -> usize {
        match self {
            Request::Read { segments, .. } => segments.len(),
            Request::Write { segments, .. } => segments.len(),
        }
    }
}

/// Outcome of a successfully serviced request. Completion is synchronous:
/// by the time the caller holds this value the transfer already happened and
/// its buffers are reusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub direction: Direction,
    pub bytes_transferred: u64,
}

/// A rejected request. Local to the request: the store is untouched and
/// other in-flight or future requests are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(
        "request range (sector {start_sector}, {len} bytes) exceeds capacity {capacity_bytes}"
    )]
    OutOfRange {
        start_sector: u64,
        len: u64,
        capacity_bytes: u64,
    },
}
