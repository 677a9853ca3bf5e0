//! Exact flop counts for TTMc across representations and modes; the planner
//! uses the table to pick between one, two, per-mode, or coordinate-form
//! execution.

use log::debug;

use crate::csf::Csf;
use crate::error::Result;
use crate::kernels::out_ncols;
use crate::opts::{Options, TilePolicy};
use crate::primitives::coord::CooTensor;
use crate::utils::calculation::{argmax, argmin};
use crate::Scalar;

/// Work performed by a CSF TTMc along `mode`: descent expansions, ascent
/// accumulations, and the final join when the mode is not at the root.
pub fn ttmc_csf_count_flops<T: Copy>(csf: &Csf<T>, mode: usize, ncols: &[usize]) -> usize {
    let nmodes = csf.nmodes();
    let depth = csf.depth_of(mode);
    let perm = csf.dim_perm();

    let mut flops = 0;
    for tile in csf.tiles() {
        // move down the tree
        let mut out_size = ncols[perm[0]];
        for d in 1..depth {
            out_size *= ncols[perm[d]];
            flops += tile.nfibs(d) * out_size;
        }

        // move up the tree, leaf to just below the output depth
        out_size = 1;
        for d in (depth + 1..nmodes).rev() {
            out_size *= ncols[perm[d]];
            flops += tile.nfibs(d) * out_size;
        }

        // final join for internal/leaf modes
        if depth > 0 {
            flops += tile.nfibs(depth) * out_ncols(ncols, mode);
        }
    }
    flops
}

/// Work performed by the coordinate-form fallback: nested Kronecker products
/// per nonzero.
pub fn ttmc_coord_count_flops<T: Scalar>(
    tt: &CooTensor<T>,
    mode: usize,
    ncols: &[usize],
) -> usize {
    let mut nnzflops = 0;
    let mut accum = 1;
    for m in (0..tt.nmodes()).rev() {
        if m != mode {
            accum *= ncols[m];
            nnzflops += accum;
        }
    }
    tt.nnz() * nnzflops
}

/// Flop table over (representation rooted at mode i) x (computation mode j),
/// with the per-scheme summaries the planner compares.
#[derive(Clone, Debug)]
pub struct FlopTable {
    /// `table[i][j]`: flops for mode `j` on the representation rooted at `i`.
    pub table: Vec<Vec<usize>>,
    /// One representation (smallest mode at the root) for every mode.
    pub csf1: Vec<usize>,
    /// Like `csf1`, but the largest mode runs on its own root.
    pub csf2: Vec<usize>,
    /// One representation per mode, each at its own root.
    pub csfa: Vec<usize>,
    /// Best representation per mode.
    pub custom: Vec<usize>,
    /// Representation index backing each entry of `custom`.
    pub custom_reps: Vec<usize>,
    /// Coordinate-form fallback per mode.
    pub coord: Vec<usize>,
}

impl FlopTable {
    pub fn total(scheme: &[usize]) -> usize {
        scheme.iter().sum()
    }
}

/// Builds an untiled representation rooted at every mode and fills the full
/// flop table plus the per-scheme summaries.
pub fn ttmc_fill_flop_tbl<T: Scalar>(
    tt: &CooTensor<T>,
    ncols: &[usize],
    opts: &Options,
) -> Result<FlopTable> {
    let nmodes = tt.nmodes();
    // counting assumes no tiling
    let mut opts = opts.clone();
    opts.tile = TilePolicy::NoTile;

    let smallest_mode = argmin(tt.dims());
    let largest_mode = argmax(tt.dims());

    let mut table = vec![vec![0; nmodes]; nmodes];
    let mut csf1 = vec![0; nmodes];
    let mut csf2 = vec![0; nmodes];
    let mut csfa = vec![0; nmodes];

    for i in 0..nmodes {
        let csf = Csf::<T>::build_one(tt, i, &opts)?;
        for (j, entry) in table[i].iter_mut().enumerate() {
            let flops = ttmc_csf_count_flops(&csf, j, ncols);
            *entry = flops;

            if i == smallest_mode {
                csf1[j] = flops;
                if j != largest_mode {
                    csf2[j] = flops;
                }
            }
            if i == j {
                csfa[i] = flops;
                // the largest mode runs on its own root in the two-rep scheme
                if i == largest_mode {
                    csf2[j] = flops;
                }
            }
        }
    }

    let mut custom = vec![0; nmodes];
    let mut custom_reps = vec![0; nmodes];
    for j in 0..nmodes {
        let mut best = 0;
        for i in 0..nmodes {
            if table[i][j] <= table[best][j] {
                best = i;
            }
        }
        custom[j] = table[best][j];
        custom_reps[j] = best;
    }

    let coord = (0..nmodes)
        .map(|m| ttmc_coord_count_flops(tt, m, ncols))
        .collect();

    let tbl = FlopTable {
        table,
        csf1,
        csf2,
        csfa,
        custom,
        custom_reps,
        coord,
    };
    debug!(
        "flop table: csf1={} csf2={} csfa={} custom={} coord={}",
        FlopTable::total(&tbl.csf1),
        FlopTable::total(&tbl.csf2),
        FlopTable::total(&tbl.csfa),
        FlopTable::total(&tbl.custom),
        FlopTable::total(&tbl.coord),
    );
    Ok(tbl)
}
