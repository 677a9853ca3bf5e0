use std::cell::UnsafeCell;
use std::mem;

use crossbeam_utils::CachePadded;
use num_traits::Zero;

use crate::error::{Result, SpTensorError};

/// Per-worker scratch regions for the TTMc kernels, sized once at kernel
/// entry.
///
/// `accum_nnz` holds per-fiber reductions over leaf nonzeros, `accum_fids`
/// the fiber ids gathered for the batched outer product, `accum_oprod` the
/// gathered factor rows (or a single outer product in the leaf variant).
/// `pre`/`post`/`join` are the per-level buffers of the generic N-mode
/// traversal. Contents are undefined between slices.
pub struct TtmcScratch<T> {
    pub accum_nnz: Vec<T>,
    pub accum_fids: Vec<usize>,
    pub accum_oprod: Vec<T>,
    pub pre: Vec<Vec<T>>,
    pub post: Vec<Vec<T>>,
    pub join: Vec<T>,
    pub stack: Vec<usize>,
}

/// Buffer lengths for one worker's [`TtmcScratch`].
#[derive(Clone, Debug, Default)]
pub struct ScratchSizes {
    pub accum_nnz: usize,
    pub accum_fids: usize,
    pub accum_oprod: usize,
    pub pre: Vec<usize>,
    pub post: Vec<usize>,
    pub join: usize,
    pub stack: usize,
}

impl ScratchSizes {
    fn bytes<T>(&self) -> usize {
        let vals = self.accum_nnz
            + self.accum_oprod
            + self.join
            + self.pre.iter().sum::<usize>()
            + self.post.iter().sum::<usize>();
        vals * mem::size_of::<T>()
            + (self.accum_fids + self.stack) * mem::size_of::<usize>()
    }
}

impl<T: Zero + Clone> TtmcScratch<T> {
    fn sized(sizes: &ScratchSizes) -> Self {
        Self {
            accum_nnz: vec![T::zero(); sizes.accum_nnz],
            accum_fids: vec![0; sizes.accum_fids],
            accum_oprod: vec![T::zero(); sizes.accum_oprod],
            pre: sizes.pre.iter().map(|&n| vec![T::zero(); n]).collect(),
            post: sizes.post.iter().map(|&n| vec![T::zero(); n]).collect(),
            join: vec![T::zero(); sizes.join],
            stack: vec![0; sizes.stack],
        }
    }
}

/// One cache-padded scratch slot per worker of a kernel's pool.
///
/// Slot `i` is owned exclusively by the worker whose
/// `rayon::current_thread_index()` is `i` for the duration of the kernel
/// region; the padding keeps neighbouring slots off each other's cache
/// lines.
#[derive(Debug)]
pub struct ScratchPool<T> {
    slots: Vec<CachePadded<UnsafeCell<TtmcScratch<T>>>>,
}

unsafe impl<T: Send> Sync for ScratchPool<T> {}

impl<T: Zero + Clone> ScratchPool<T> {
    pub fn new(nthreads: usize, sizes: &ScratchSizes, limit: Option<usize>) -> Result<Self> {
        let total = sizes.bytes::<T>().saturating_mul(nthreads.max(1));
        if let Some(limit) = limit {
            if total > limit {
                return Err(SpTensorError::AllocationFailure(format!(
                    "scratch needs {total} bytes, limit is {limit}"
                )));
            }
        }
        Ok(Self {
            slots: (0..nthreads.max(1))
                .map(|_| CachePadded::new(UnsafeCell::new(TtmcScratch::sized(sizes))))
                .collect(),
        })
    }

    /// Scratch slot of the current worker.
    ///
    /// # Safety
    /// Must only be called from inside the kernel's pool, and the returned
    /// borrow must not outlive the current work item; each worker index maps
    /// to exactly one caller at a time.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn current(&self) -> &mut TtmcScratch<T> {
        let tid = rayon::current_thread_index().unwrap_or(0);
        debug_assert!(tid < self.slots.len());
        &mut *self.slots[tid].get()
    }
}
