//! Coordinate-form TTMc: stream the nonzeros, building the nested Kronecker
//! product of every non-output factor row in progressively larger buffers,
//! and accumulate into the output row under a striped lock. The reference
//! against which the CSF variants are validated.

use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{Result, SpTensorError};
use crate::kernels::{build_pool, mat_row, out_ncols, outer_prod, outer_prod_accum, standard_slice};
use crate::opts::Options;
use crate::primitives::coord::CooTensor;
use crate::utils::locks::StripedLocks;
use crate::utils::shared::SharedSlice;
use crate::Scalar;

pub fn ttmc_stream<T: Scalar>(
    tt: &CooTensor<T>,
    mats: &[Array2<T>],
    tenout: &mut [T],
    mode: usize,
    opts: &Options,
) -> Result<()> {
    let nmodes = tt.nmodes();
    if nmodes < 3 {
        return Err(SpTensorError::Unsupported(format!(
            "TTMc needs at least 3 modes, got {nmodes}"
        )));
    }
    if mats.len() != nmodes {
        return Err(SpTensorError::InvalidInput(format!(
            "expected {nmodes} matrices, got {}",
            mats.len()
        )));
    }
    if mode >= nmodes {
        return Err(SpTensorError::InvalidInput(format!(
            "mode {mode} out of range for {nmodes} modes"
        )));
    }
    for (m, mat) in mats.iter().enumerate() {
        if mat.nrows() != tt.dims()[m] {
            return Err(SpTensorError::InvalidInput(format!(
                "matrix {m} has {} rows, expected {}",
                mat.nrows(),
                tt.dims()[m]
            )));
        }
    }
    let rows: Vec<&[T]> = mats
        .iter()
        .map(|m| standard_slice(m, "factor matrix"))
        .collect::<Result<_>>()?;
    let ncols: Vec<usize> = mats.iter().map(|m| m.ncols()).collect();
    let total_cols = out_ncols(&ncols, mode);
    if tenout.len() != tt.dims()[mode] * total_cols {
        return Err(SpTensorError::InvalidInput(format!(
            "output slab has {} elements, expected {}",
            tenout.len(),
            tt.dims()[mode] * total_cols
        )));
    }

    // columns accumulated from mode m inward; the output mode adds nothing
    let mut ncols_sfx = vec![1usize; nmodes + 1];
    for m in (0..nmodes).rev() {
        ncols_sfx[m] = if m == mode {
            ncols_sfx[m + 1]
        } else {
            ncols_sfx[m + 1] * ncols[m]
        };
    }
    debug_assert_eq!(ncols_sfx[0], total_cols);

    // the last mode seeds the buffer, the first one accumulates
    let first_mode = usize::from(mode == 0);
    let last_mode = if mode == nmodes - 1 { nmodes - 2 } else { nmodes - 1 };

    let pool = build_pool(opts.nthreads)?;
    let locks = StripedLocks::default();

    // preconditions hold; clear stale results
    pool.install(|| {
        tenout.par_chunks_mut(4096).for_each(|c| c.fill(T::zero()));
    });
    let out = SharedSlice::new(tenout);

    pool.install(|| {
        (0..tt.nnz()).into_par_iter().for_each_init(
            || {
                // one buffer per non-output mode; the output slot stays empty
                (0..nmodes)
                    .map(|m| (m != mode).then(|| vec![T::zero(); ncols_sfx[m]]))
                    .collect::<Vec<Option<Vec<T>>>>()
            },
            |buffers, n| {
                let out_id = tt.ind(mode)[n];
                let v = tt.vals()[n];

                // seed with the nonzero value times the deepest row
                let mut buff_size = ncols[last_mode];
                {
                    let buf = buffers[last_mode].as_mut().unwrap();
                    let lrow = mat_row(rows[last_mode], ncols[last_mode], tt.ind(last_mode)[n]);
                    for (b, &x) in buf[..buff_size].iter_mut().zip(lrow) {
                        *b = v * x;
                    }
                }

                // remaining Kronecker products, deepest first
                let mut curr = last_mode;
                for m in (0..last_mode).rev() {
                    if m == mode {
                        // the output level is skipped on ascent
                        continue;
                    }
                    let row = mat_row(rows[m], ncols[m], tt.ind(m)[n]);
                    if m != first_mode {
                        let (lo, hi) = buffers.split_at_mut(curr);
                        let src = hi[0].as_ref().unwrap();
                        let dst = lo[m].as_mut().unwrap();
                        outer_prod(row, &src[..buff_size], &mut dst[..ncols[m] * buff_size]);
                        curr = m;
                        buff_size *= ncols[m];
                    } else {
                        // first mode accumulates straight into the output
                        let src = buffers[curr].as_ref().unwrap();
                        let orow = unsafe { out.slice_mut(out_id * total_cols, total_cols) };
                        let _guard = locks.lock(out_id);
                        outer_prod_accum(row, &src[..buff_size], orow);
                    }
                }
            },
        );
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ones(dims: &[usize], rank: usize) -> Vec<Array2<f64>> {
        dims.iter().map(|&d| Array2::ones((d, rank))).collect()
    }

    #[test]
    fn matches_hand_expansion_three_modes() {
        let tt = CooTensor::from_entries(
            vec![2, 2, 3],
            &[
                (vec![0, 0, 0], 1.0),
                (vec![1, 0, 0], 2.0),
                (vec![0, 1, 2], 3.0),
            ],
        )
        .unwrap();
        let mats = ones(tt.dims(), 2);
        let mut y = vec![0.0; 2 * 4];
        ttmc_stream(&tt, &mats, &mut y, 0, &Options::default()).unwrap();
        assert_eq!(y, vec![4.0, 4.0, 4.0, 4.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn middle_mode_orders_columns_root_to_leaf() {
        // one nonzero, distinct factor rows, check the Kronecker layout
        let tt = CooTensor::from_entries(vec![2, 2, 2], &[(vec![1, 0, 1], 2.0)]).unwrap();
        let mats = vec![
            Array2::from_shape_vec((2, 2), vec![0.0, 0.0, 1.0, 2.0]).unwrap(),
            Array2::from_shape_vec((2, 1), vec![1.0, 0.0]).unwrap(),
            Array2::from_shape_vec((2, 3), vec![0.0; 3].into_iter().chain([3.0, 4.0, 5.0]).collect())
                .unwrap(),
        ];
        let mut y = vec![0.0; 2 * 6];
        ttmc_stream(&tt, &mats, &mut y, 1, &Options::default()).unwrap();
        // row 0 of Y gets 2 * (1,2) kron (3,4,5)
        assert_eq!(&y[0..6], &[6.0, 8.0, 10.0, 12.0, 16.0, 20.0]);
        assert!(y[6..].iter().all(|&x| x == 0.0));
    }
}
