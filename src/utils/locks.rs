use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};

/// Default pool size used by the TTMc kernels.
pub const NLOCKS: usize = 1024;

/// Fixed pool of mutexes addressed by `key % nlocks`.
///
/// Serializes concurrent accumulation into output rows that several workers
/// may touch, while keeping the lock count bounded. Each mutex is padded to
/// its own cache line so neighbouring locks do not share one.
pub struct StripedLocks {
    locks: Vec<CachePadded<Mutex<()>>>,
}

impl StripedLocks {
    pub fn new(nlocks: usize) -> Self {
        assert!(nlocks > 0);
        Self {
            locks: (0..nlocks).map(|_| CachePadded::new(Mutex::new(()))).collect(),
        }
    }

    #[inline]
    pub fn lock(&self, key: usize) -> MutexGuard<'_, ()> {
        self.locks[key % self.locks.len()].lock()
    }
}

impl Default for StripedLocks {
    fn default() -> Self {
        Self::new(NLOCKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn colliding_keys_serialize() {
        let locks = StripedLocks::new(4);
        let mut total = vec![0u64; 1];
        let view = crate::utils::shared::SharedSlice::new(&mut total);
        (0..64u64).into_par_iter().for_each(|i| {
            // every key maps to the same stripe
            let _guard = locks.lock(8);
            unsafe {
                *view.get_mut(0) += i;
            }
        });
        assert_eq!(total[0], 63 * 64 / 2);
    }
}
