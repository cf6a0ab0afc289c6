//! The in-memory backing store of a volume.
//!
//! Provides [`RamStore`], one contiguous heap allocation holding the entire
//! content of an emulated block device. All request processing resolves to
//! bounds-checked byte copies against this buffer.

use core::ptr::NonNull;
use std::alloc;

use thiserror::Error;

use crate::constants::SECTOR_SIZE_MAX;

/// The backing buffer could not be obtained from the allocator.
///
/// Fatal to device initialization; never surfaced mid-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("allocation of {len} bytes (align {align}) refused by the allocator")]
pub struct AllocError {
    pub len: usize,
    pub align: usize,
}

/// An offset/length pair falls outside the store's capacity.
///
/// The copy is rejected before any byte moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("byte range {offset}+{len} exceeds store capacity {capacity}")]
pub struct RangeError {
    pub offset: u64,
    pub len: usize,
    pub capacity: u64,
}

/// Heap-allocated backing store for one volume, aligned to its sector size.
///
/// The allocation is zero-initialized: a fresh device reads as all zeroes
/// rather than exposing whatever the allocator last held.
///
/// # Invariants
///
/// - `len > 0` (empty stores disallowed)
/// - `align` is a power of two and ≤ [`SECTOR_SIZE_MAX`]
/// - `ptr` is aligned to `align`
pub struct RamStore {
    ptr: NonNull<u8>,
    len: usize,
    align: usize,
}

impl RamStore {
    /// Allocates a zero-initialized store of `len` bytes aligned to `align`.
    ///
    /// Fails cleanly with [`AllocError`] if the allocator refuses; no partial
    /// buffer remains reachable. There is no implicit retry or shrinking.
    ///
    /// # Panics
    ///
    /// - `len == 0`
    /// - `align == 0`, not a power of two, or `align > SECTOR_SIZE_MAX`
    /// - `len > isize::MAX` (Rust allocation limit)
    pub fn allocate(len: usize, align: usize) -> Result<Self, AllocError> {
        assert!(len > 0);
        assert!(align > 0);
        assert!(align.is_power_of_two());
        assert!(align <= SECTOR_SIZE_MAX as usize);
        assert!(len <= isize::MAX as usize);

        let layout = alloc::Layout::from_size_align(len, align).expect("bad layout");

        // SAFETY: Layout is valid (non-zero size, power-of-two alignment).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(AllocError { len, align })?;

        let store = Self { ptr, len, align };
        store.assert_invariants();

        Ok(store)
    }

    /// Validates structural invariants. Called on all public operations.
    #[inline]
    fn assert_invariants(&self) {
        assert!(self.len > 0);
        assert!(self.align > 0);
        assert!(self.align.is_power_of_two());
        assert!((self.ptr.as_ptr() as usize).is_multiple_of(self.align));
    }

    /// Checks that `offset + len` stays within capacity, without copying.
    #[inline]
    pub fn check_range(&self, offset: u64, len: usize) -> Result<(), RangeError> {
        self.assert_invariants();

        let out_of_range = RangeError {
            offset,
            len,
            capacity: self.len as u64,
        };

        let end = offset.checked_add(len as u64).ok_or(out_of_range)?;
        if end > self.len as u64 {
            return Err(out_of_range);
        }

        Ok(())
    }

    /// Copies `dest.len()` bytes out of the store starting at `offset`.
    ///
    /// Rejects out-of-range access before any byte moves.
    pub fn read_into(&self, offset: u64, dest: &mut [u8]) -> Result<(), RangeError> {
        self.check_range(offset, dest.len())?;

        let start = offset as usize;
        dest.copy_from_slice(&self.as_slice()[start..start + dest.len()]);

        Ok(())
    }

    /// Copies `src.len()` bytes into the store starting at `offset`.
    ///
    /// Rejects out-of-range access before any byte moves.
    pub fn write_from(&mut self, offset: u64, src: &[u8]) -> Result<(), RangeError> {
        self.check_range(offset, src.len())?;

        let start = offset as usize;
        self.as_mut_slice()[start..start + src.len()].copy_from_slice(src);

        Ok(())
    }

    /// Returns the store as an immutable byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.assert_invariants();
        // SAFETY: Valid allocation of `len` bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the store as a mutable byte slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.assert_invariants();
        // SAFETY: We own the allocation exclusively, it's valid for `len` bytes.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the store capacity in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always returns `false` (empty stores are disallowed by construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the alignment in bytes.
    pub fn align(&self) -> usize {
        self.align
    }
}

impl Drop for RamStore {
    fn drop(&mut self) {
        self.assert_invariants();

        let layout =
            alloc::Layout::from_size_align(self.len, self.align).expect("bad layout in drop");
        assert!(layout.size() == self.len);
        assert!(layout.align() == self.align);

        // SAFETY: `ptr` was allocated with this exact layout in `allocate`.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) }
    }
}

// SAFETY: The store owns its allocation exclusively. No shared mutable state.
unsafe impl Send for RamStore {}
