pub mod buffer;

pub use buffer::{AllocError, RamStore, RangeError};
