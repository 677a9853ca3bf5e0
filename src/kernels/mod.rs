//! Numerical kernels over CSF storage: CCD tensor completion, TTMc, the
//! coordinate-form TTMc fallback, and flop accounting for the planner.

pub mod ccd;
pub mod flops;
pub mod stream;
pub mod ttmc;

use ndarray::linalg::general_mat_mul;
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use rayon::ThreadPool;

use crate::error::{Result, SpTensorError};
use crate::Scalar;

/// Fixed-size fork-join pool for one kernel region.
pub(crate) fn build_pool(nthreads: usize) -> Result<ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(nthreads.max(1))
        .build()
        .map_err(|e| SpTensorError::AllocationFailure(format!("worker pool: {e}")))
}

/// Row-major backing slice of a factor matrix.
pub(crate) fn standard_slice<'a, T: Scalar>(mat: &'a Array2<T>, what: &str) -> Result<&'a [T]> {
    mat.as_slice().ok_or_else(|| {
        SpTensorError::InvalidInput(format!("{what} must be in standard row-major layout"))
    })
}

/// Row `i` of a row-major matrix slice with `ncols` columns.
#[inline]
pub(crate) fn mat_row<T>(vals: &[T], ncols: usize, i: usize) -> &[T] {
    &vals[i * ncols..(i + 1) * ncols]
}

/// Number of output columns of a TTMc along `mode`.
pub(crate) fn out_ncols(ncols: &[usize], mode: usize) -> usize {
    ncols
        .iter()
        .enumerate()
        .filter(|&(m, _)| m != mode)
        .map(|(_, &c)| c)
        .product()
}

/// `out = row_a^T row_b`, row-major, overwriting.
#[inline]
pub(crate) fn outer_prod<T: Scalar>(row_a: &[T], row_b: &[T], out: &mut [T]) {
    let nb = row_b.len();
    for (i, &a) in row_a.iter().enumerate() {
        for (o, &b) in out[i * nb..(i + 1) * nb].iter_mut().zip(row_b) {
            *o = a * b;
        }
    }
}

/// `out += row_a^T row_b`, row-major.
#[inline]
pub(crate) fn outer_prod_accum<T: Scalar>(row_a: &[T], row_b: &[T], out: &mut [T]) {
    let nb = row_b.len();
    for (i, &a) in row_a.iter().enumerate() {
        for (o, &b) in out[i * nb..(i + 1) * nb].iter_mut().zip(row_b) {
            *o += a * b;
        }
    }
}

/// Batched outer products: `out += a_rows^T . b_rows`, where both operands
/// hold one row per gathered fiber. A single dense mat-mul instead of
/// `nrows` rank-1 updates.
pub(crate) fn batched_outer_accum<T: Scalar>(
    a_rows: &[T],
    ncol_a: usize,
    b_rows: &[T],
    ncol_b: usize,
    nrows: usize,
    out: &mut [T],
) {
    let a = ArrayView2::from_shape((nrows, ncol_a), &a_rows[..nrows * ncol_a])
        .expect("gathered rows are contiguous");
    let b = ArrayView2::from_shape((nrows, ncol_b), &b_rows[..nrows * ncol_b])
        .expect("accumulator rows are contiguous");
    let mut c = ArrayViewMut2::from_shape((ncol_a, ncol_b), out)
        .expect("output block is contiguous");
    general_mat_mul(T::one(), &a.t(), &b, T::one(), &mut c);
}
