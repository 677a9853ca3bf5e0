use std::cell::UnsafeCell;

/// A slice that may be written from several workers at once.
///
/// The plane-scheduled kernels partition their output index space so that no
/// two workers ever touch the same element; this view is how that contract
/// crosses the `rayon` closure boundary. Every accessor is `unsafe`: the
/// caller asserts that within the current parallel region each index is
/// written by at most one worker, and that no reads of an index race with a
/// write to it.
pub struct SharedSlice<'a, T> {
    slice: &'a [UnsafeCell<T>],
}

unsafe impl<T: Send + Sync> Send for SharedSlice<'_, T> {}
unsafe impl<T: Send + Sync> Sync for SharedSlice<'_, T> {}

impl<'a, T> SharedSlice<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        let ptr = slice as *mut [T] as *const [UnsafeCell<T>];
        // &mut [T] and &[UnsafeCell<T>] have the same layout
        Self {
            slice: unsafe { &*ptr },
        }
    }

    pub fn len(&self) -> usize {
        self.slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    /// # Safety
    /// No other worker may access index `i` concurrently.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, i: usize) -> &mut T {
        &mut *self.slice[i].get()
    }

    /// Mutable window `[start, start + len)`.
    ///
    /// # Safety
    /// No other worker may access any index in the window concurrently.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, start: usize, len: usize) -> &mut [T] {
        debug_assert!(start + len <= self.slice.len());
        std::slice::from_raw_parts_mut(self.slice[start].get(), len)
    }
}
