//! Tensor-times-matrix chain over CSF storage.
//!
//! For a fixed output mode, every nonzero contributes the Kronecker product
//! of all other modes' factor rows, weighted by its value, to the output row
//! indexed by that mode. The traversal shape depends on the output mode's
//! depth in the representation: the root variant reduces fibers upward and
//! joins with a batched outer product (lock-free, each slice owns its output
//! row), while the internal and leaf variants serialize row updates through
//! a striped lock pool.
//!
//! Output columns are ordered by ascending mode index with the output mode
//! removed, independent of the representation's level order, so every CSF
//! flavor and the coordinate fallback produce identical slabs.

use log::debug;
use ndarray::Array2;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::csf::{Csf, CsfBundle, FidsView, NodeRole, Tile3View};
use crate::error::{Result, SpTensorError};
use crate::kernels::{
    batched_outer_accum, build_pool, mat_row, out_ncols, outer_prod, outer_prod_accum,
    standard_slice,
};
use crate::opts::{CsfAlloc, Options};
use crate::utils::locks::StripedLocks;
use crate::utils::scratch::{ScratchPool, ScratchSizes, TtmcScratch};
use crate::utils::shared::SharedSlice;
use crate::Scalar;

/// Computes the TTMc along `mode` into the caller-allocated `tenout`, which
/// must hold `dims[mode] * prod_{m != mode} ncols[m]` elements and is zeroed
/// once all preconditions pass.
pub fn ttmc<T: Scalar>(
    bundle: &CsfBundle<T>,
    mats: &[Array2<T>],
    tenout: &mut [T],
    mode: usize,
    opts: &Options,
) -> Result<()> {
    let nmodes = bundle
        .reps()
        .first()
        .map(|rep| rep.nmodes())
        .ok_or_else(|| SpTensorError::InvalidInput("empty CSF bundle".into()))?;
    if mode >= nmodes {
        return Err(SpTensorError::InvalidInput(format!(
            "mode {mode} out of range for {nmodes} modes"
        )));
    }
    let csf = select_rep(bundle, mode)?;
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
    for (m, mat) in mats.iter().enumerate() {
        if mat.nrows() != csf.dims()[m] {
            return Err(SpTensorError::InvalidInput(format!(
                "matrix {m} has {} rows, expected {}",
                mat.nrows(),
                csf.dims()[m]
            )));
        }
    }
    let rows: Vec<&[T]> = mats
        .iter()
        .map(|m| standard_slice(m, "factor matrix"))
        .collect::<Result<_>>()?;
    let ncols: Vec<usize> = mats.iter().map(|m| m.ncols()).collect();
    let outncols = out_ncols(&ncols, mode);
    if tenout.len() != csf.dims()[mode] * outncols {
        return Err(SpTensorError::InvalidInput(format!(
            "output slab has {} elements, expected {}",
            tenout.len(),
            csf.dims()[mode] * outncols
        )));
    }
    if nmodes > 3 && csf.ntiles() > 1 {
        return Err(SpTensorError::Unsupported(
            "tiled TTMc is limited to 3 modes".into(),
        ));
    }

    let outdepth = csf.depth_of(mode);
    let role = NodeRole::classify(outdepth, nmodes);
    let pool = build_pool(opts.nthreads)?;
    let sizes = scratch_sizes(csf, &ncols, outdepth, outncols);
    let scratch = ScratchPool::new(opts.nthreads.max(1), &sizes, opts.memory_limit)?;
    let locks = StripedLocks::default();
    debug!(
        "ttmc: mode={mode} depth={outdepth} role={role:?} rep_perm={:?} ntiles={}",
        csf.dim_perm(),
        csf.ntiles()
    );

    // preconditions hold; clear stale results
    pool.install(|| {
        tenout.par_chunks_mut(4096).for_each(|c| c.fill(T::zero()));
    });
    let out = SharedSlice::new(tenout);

    if nmodes == 3 {
        let perm = csf.dim_perm();
        match role {
            NodeRole::Root => {
                let (mid, leaf) = (perm[1], perm[2]);
                pool.install(|| {
                    for tile in csf.tiles() {
                        if let Some(tv) = tile.view3() {
                            ttmc_root3(
                                &tv,
                                rows[mid],
                                ncols[mid],
                                rows[leaf],
                                ncols[leaf],
                                mid < leaf,
                                &out,
                                &scratch,
                            );
                        }
                    }
                });
            }
            NodeRole::Internal => {
                let (root, leaf) = (perm[0], perm[2]);
                pool.install(|| {
                    for tile in csf.tiles() {
                        if let Some(tv) = tile.view3() {
                            ttmc_intl3(
                                &tv,
                                rows[root],
                                ncols[root],
                                rows[leaf],
                                ncols[leaf],
                                root < leaf,
                                &out,
                                &locks,
                                &scratch,
                            );
                        }
                    }
                });
            }
            NodeRole::Leaf => {
                let (root, mid) = (perm[0], perm[1]);
                pool.install(|| {
                    for tile in csf.tiles() {
                        if let Some(tv) = tile.view3() {
                            ttmc_leaf3(
                                &tv,
                                rows[root],
                                ncols[root],
                                rows[mid],
                                ncols[mid],
                                root < mid,
                                &out,
                                &locks,
                                &scratch,
                            );
                        }
                    }
                });
            }
        }
    } else {
        let lvl_rows: Vec<&[T]> = csf.dim_perm().iter().map(|&m| rows[m]).collect();
        let lvl_ncols: Vec<usize> = csf.dim_perm().iter().map(|&m| ncols[m]).collect();
        let col_map = canonical_col_map(csf.dim_perm(), &ncols, mode, outdepth);
        ttmc_generic(
            csf, &lvl_rows, &lvl_ncols, outdepth, outncols, &col_map, &out, &locks, &scratch,
            &pool,
        );
    }
    Ok(())
}

/// Largest fiber length per mode across every representation and tile, for
/// all levels above the nonzero layer. Sizes the accumulation scratch.
pub fn ttmc_largest_outer<T: Copy>(bundle: &CsfBundle<T>) -> Vec<usize> {
    let nmodes = bundle.rep(0).nmodes();
    let mut outer = vec![0; nmodes];
    for csf in bundle.reps() {
        for tile in csf.tiles() {
            // modes above the nonzero layer; the last two accumulate
            // instead of expanding outer products
            for d in 0..nmodes.saturating_sub(2) {
                let madj = csf.dim_perm()[d];
                let fptr = tile.fptr(d);
                for f in 0..tile.nfibs(d) {
                    outer[madj] = outer[madj].max(fptr[f + 1] - fptr[f]);
                }
            }
        }
    }
    outer
}

/// Largest output-slab length over all modes, for callers reusing one
/// allocation across TTMc calls.
pub fn tenout_dim(dims: &[usize], ncols: &[usize]) -> usize {
    (0..dims.len())
        .map(|m| dims[m] * out_ncols(ncols, m))
        .max()
        .unwrap_or(0)
}

fn select_rep<'a, T: Copy>(bundle: &'a CsfBundle<T>, mode: usize) -> Result<&'a Csf<T>> {
    let reps = bundle.reps();
    if reps.is_empty() {
        return Err(SpTensorError::InvalidInput("empty CSF bundle".into()));
    }
    match bundle.alloc() {
        CsfAlloc::OneMode => Ok(&reps[0]),
        CsfAlloc::TwoMode => {
            if reps.len() < 2 {
                return Err(SpTensorError::InvalidInput(
                    "two-mode bundle holds fewer than two representations".into(),
                ));
            }
            // the primary's leaf mode is served by the second root
            let leaf_mode = *reps[0].dim_perm().last().unwrap();
            Ok(if mode == leaf_mode { &reps[1] } else { &reps[0] })
        }
        CsfAlloc::AllMode => reps.get(mode).ok_or_else(|| {
            SpTensorError::InvalidInput(format!(
                "all-mode bundle has no representation for mode {mode}"
            ))
        }),
    }
}

fn scratch_sizes<T: Copy>(
    csf: &Csf<T>,
    ncols: &[usize],
    outdepth: usize,
    outncols: usize,
) -> ScratchSizes {
    let nmodes = csf.nmodes();
    let perm = csf.dim_perm();
    let rank_max = ncols.iter().copied().max().unwrap_or(1).max(1);
    let naccum = max_children(csf, 0).max(1);

    let mut sizes = ScratchSizes {
        accum_nnz: naccum * rank_max,
        accum_fids: naccum,
        accum_oprod: naccum.max(rank_max) * rank_max,
        pre: vec![0; nmodes],
        post: vec![0; nmodes],
        join: 0,
        stack: nmodes,
    };

    if nmodes > 3 {
        if let Some(pm) = pre_max_level(outdepth, nmodes) {
            let mut sz = 1;
            for d in 0..=pm {
                sz *= ncols[perm[d]];
                sizes.pre[d] = sz;
            }
        }
        if outdepth < nmodes - 1 {
            let mut sz = 1;
            for d in (outdepth + 1..nmodes).rev() {
                sz *= ncols[perm[d]];
                sizes.post[d] = sz;
            }
            if outdepth > 0 {
                sizes.join = outncols;
            }
        }
    }
    sizes
}

/// Deepest level whose prefix Kronecker product is kept on descent.
fn pre_max_level(outdepth: usize, nmodes: usize) -> Option<usize> {
    if outdepth == nmodes - 1 {
        Some(nmodes - 2)
    } else if outdepth == 0 {
        None
    } else {
        Some(outdepth - 1)
    }
}

fn max_children<T>(csf: &Csf<T>, level: usize) -> usize {
    csf.tiles
        .iter()
        .flat_map(|tile| tile.fptr[level].windows(2))
        .map(|w| w[1] - w[0])
        .max()
        .unwrap_or(0)
}

/// Maps a level-order Kronecker position to its column in the canonical
/// mode-ascending layout.
fn canonical_col_map(
    dim_perm: &[usize],
    ncols: &[usize],
    mode: usize,
    outdepth: usize,
) -> Vec<usize> {
    let nmodes = dim_perm.len();
    // levels contributing columns, root to leaf
    let levels: Vec<usize> = (0..nmodes).filter(|&d| d != outdepth).collect();

    // canonical stride of each mode: product of the column counts of all
    // larger non-output modes
    let mut cstride = vec![1usize; nmodes];
    for m in 0..nmodes {
        cstride[m] = ncols
            .iter()
            .enumerate()
            .skip(m + 1)
            .filter(|&(m2, _)| m2 != mode)
            .map(|(_, &c)| c)
            .product();
    }

    let total: usize = levels.iter().map(|&d| ncols[dim_perm[d]]).product();
    let mut map = vec![0usize; total];
    for (p, entry) in map.iter_mut().enumerate() {
        let mut rem = p;
        let mut stride = total;
        let mut canon = 0;
        for &d in &levels {
            let m = dim_perm[d];
            stride /= ncols[m];
            let c = rem / stride;
            rem %= stride;
            canon += c * cstride[m];
        }
        *entry = canon;
    }
    map
}

/// Root variant: reduce each fiber's nonzeros into a leaf-rank accumulator,
/// then join all of a slice's fibers against the gathered mid-level rows in
/// one batched outer product. Each slice owns its output row. `mid_outer`
/// says whether the mid level is the slower output axis in the canonical
/// layout.
#[allow(clippy::too_many_arguments)]
fn ttmc_root3<T: Scalar>(
    tv: &Tile3View<'_, T>,
    mid_rows: &[T],
    rank_mid: usize,
    leaf_rows: &[T],
    rank_leaf: usize,
    mid_outer: bool,
    tenout: &SharedSlice<'_, T>,
    scratch: &ScratchPool<T>,
) {
    (0..tv.nslices).into_par_iter().for_each(|s| {
        let sc = unsafe { scratch.current() };
        let fid = tv.sids.id(s);
        // slice s is this row's only writer
        let outv = unsafe { tenout.slice_mut(fid * rank_mid * rank_leaf, rank_mid * rank_leaf) };

        let mut naccum = 0usize;
        for f in tv.sptr[s]..tv.sptr[s + 1] {
            let accum = &mut sc.accum_nnz[naccum * rank_leaf..][..rank_leaf];

            // first entry initializes the accumulator
            let jj0 = tv.fptr[f];
            let v0 = tv.vals[jj0];
            let bv = mat_row(leaf_rows, rank_leaf, tv.inds[jj0]);
            for (acc, &b) in accum.iter_mut().zip(bv) {
                *acc = v0 * b;
            }
            for jj in jj0 + 1..tv.fptr[f + 1] {
                let v = tv.vals[jj];
                let bv = mat_row(leaf_rows, rank_leaf, tv.inds[jj]);
                for (acc, &b) in accum.iter_mut().zip(bv) {
                    *acc += v * b;
                }
            }
            sc.accum_fids[naccum] = tv.fids[f];
            naccum += 1;
        }

        // gather rows, then one batched outer product
        for r in 0..naccum {
            sc.accum_oprod[r * rank_mid..][..rank_mid]
                .copy_from_slice(mat_row(mid_rows, rank_mid, sc.accum_fids[r]));
        }
        if mid_outer {
            batched_outer_accum(&sc.accum_oprod, rank_mid, &sc.accum_nnz, rank_leaf, naccum, outv);
        } else {
            batched_outer_accum(&sc.accum_nnz, rank_leaf, &sc.accum_oprod, rank_mid, naccum, outv);
        }
    });
}

/// Internal variant: the output row is indexed by the mid-level fiber id,
/// which several slices may share, so the row update runs under a striped
/// lock.
#[allow(clippy::too_many_arguments)]
fn ttmc_intl3<T: Scalar>(
    tv: &Tile3View<'_, T>,
    root_rows: &[T],
    rank_root: usize,
    leaf_rows: &[T],
    rank_leaf: usize,
    root_outer: bool,
    tenout: &SharedSlice<'_, T>,
    locks: &StripedLocks,
    scratch: &ScratchPool<T>,
) {
    (0..tv.nslices).into_par_iter().for_each(|s| {
        let sc = unsafe { scratch.current() };
        let av = mat_row(root_rows, rank_root, tv.sids.id(s));

        for f in tv.sptr[s]..tv.sptr[s + 1] {
            let accum = &mut sc.accum_nnz[..rank_leaf];

            let jj0 = tv.fptr[f];
            let v0 = tv.vals[jj0];
            let bv = mat_row(leaf_rows, rank_leaf, tv.inds[jj0]);
            for (acc, &b) in accum.iter_mut().zip(bv) {
                *acc = v0 * b;
            }
            for jj in jj0 + 1..tv.fptr[f + 1] {
                let v = tv.vals[jj];
                let bv = mat_row(leaf_rows, rank_leaf, tv.inds[jj]);
                for (acc, &b) in accum.iter_mut().zip(bv) {
                    *acc += v * b;
                }
            }

            let o = tv.fids[f];
            let outv = unsafe { tenout.slice_mut(o * rank_root * rank_leaf, rank_root * rank_leaf) };
            let _guard = locks.lock(o);
            if root_outer {
                outer_prod_accum(av, accum, outv);
            } else {
                outer_prod_accum(accum, av, outv);
            }
        }
    });
}

/// Leaf variant: one outer product of the two upper rows per fiber, scaled
/// into the row of every nonzero under a striped lock.
#[allow(clippy::too_many_arguments)]
fn ttmc_leaf3<T: Scalar>(
    tv: &Tile3View<'_, T>,
    root_rows: &[T],
    rank_root: usize,
    mid_rows: &[T],
    rank_mid: usize,
    root_outer: bool,
    tenout: &SharedSlice<'_, T>,
    locks: &StripedLocks,
    scratch: &ScratchPool<T>,
) {
    (0..tv.nslices).into_par_iter().for_each(|s| {
        let sc = unsafe { scratch.current() };
        let av = mat_row(root_rows, rank_root, tv.sids.id(s));

        for f in tv.sptr[s]..tv.sptr[s + 1] {
            let bv = mat_row(mid_rows, rank_mid, tv.fids[f]);
            let oprod = &mut sc.accum_oprod[..rank_root * rank_mid];
            if root_outer {
                outer_prod(av, bv, oprod);
            } else {
                outer_prod(bv, av, oprod);
            }

            for jj in tv.fptr[f]..tv.fptr[f + 1] {
                let v = tv.vals[jj];
                let o = tv.inds[jj];
                let outv =
                    unsafe { tenout.slice_mut(o * rank_root * rank_mid, rank_root * rank_mid) };
                let _guard = locks.lock(o);
                for (x, &p) in outv.iter_mut().zip(oprod.iter()) {
                    *x += v * p;
                }
            }
        }
    });
}

/// General N-mode traversal (untiled): descend with an explicit index stack
/// keeping the running Kronecker product of the levels above the output
/// depth, reduce nonzeros at the leaf, and accumulate subtree sums upward;
/// completed nodes at the output depth join prefix and suffix into their
/// output row through the canonical column map.
#[allow(clippy::too_many_arguments)]
fn ttmc_generic<T: Scalar>(
    csf: &Csf<T>,
    lvl_rows: &[&[T]],
    lvl_ncols: &[usize],
    outdepth: usize,
    outncols: usize,
    col_map: &[usize],
    tenout: &SharedSlice<'_, T>,
    locks: &StripedLocks,
    scratch: &ScratchPool<T>,
    pool: &ThreadPool,
) {
    let tile = &csf.tiles()[0];
    if tile.vals().is_empty() {
        return;
    }
    let nmodes = csf.nmodes();
    let top = nmodes - 2;
    let views: Vec<FidsView<'_>> = (0..nmodes).map(|d| tile.fids_view(d)).collect();
    let fp = &tile.fptr;
    let vals = tile.vals();
    let nslices = tile.nfibs(0);
    let pre_max = pre_max_level(outdepth, nmodes);

    pool.install(|| {
        (0..nslices).into_par_iter().for_each(|s| {
            if fp[0][s] == fp[0][s + 1] {
                return;
            }
            let sc = unsafe { scratch.current() };
            let TtmcScratch {
                pre,
                post,
                join,
                stack: idx,
                ..
            } = sc;

            idx[0] = s;
            for buf in post.iter_mut().skip(outdepth + 1) {
                buf.fill(T::zero());
            }
            for d in 0..=top {
                if d > 0 {
                    idx[d] = fp[d - 1][idx[d - 1]];
                }
                update_pre(d, pre_max, idx, &views, lvl_rows, lvl_ncols, pre);
            }

            loop {
                // nonzero range of the current bottom fiber
                let (start, end) = (fp[top][idx[top]], fp[top][idx[top] + 1]);
                if outdepth == nmodes - 1 {
                    let pre_top = &pre[top];
                    for jj in start..end {
                        let o = views[nmodes - 1].id(jj);
                        let v = vals[jj];
                        let orow = unsafe { tenout.slice_mut(o * outncols, outncols) };
                        let _guard = locks.lock(o);
                        for (p, &x) in pre_top.iter().enumerate() {
                            orow[col_map[p]] += v * x;
                        }
                    }
                } else {
                    let acc = &mut post[nmodes - 1];
                    acc.fill(T::zero());
                    let last_rank = lvl_ncols[nmodes - 1];
                    for jj in start..end {
                        let lrow =
                            mat_row(lvl_rows[nmodes - 1], last_rank, views[nmodes - 1].id(jj));
                        let v = vals[jj];
                        for (a, &x) in acc.iter_mut().zip(lrow) {
                            *a += v * x;
                        }
                    }
                    fold_level(
                        top, outdepth, idx, &views, lvl_rows, lvl_ncols, pre, post, join,
                        outncols, col_map, tenout, locks,
                    );
                }

                // ascend to the next unprocessed subtree
                let mut d = top;
                idx[d] += 1;
                while d > 0 && idx[d] == fp[d - 1][idx[d - 1] + 1] {
                    d -= 1;
                    fold_level(
                        d, outdepth, idx, &views, lvl_rows, lvl_ncols, pre, post, join,
                        outncols, col_map, tenout, locks,
                    );
                    idx[d] += 1;
                }
                if d == 0 {
                    break;
                }
                // new fiber at level d: refresh the prefix and descend
                for dd in d..=top {
                    if dd > d {
                        idx[dd] = fp[dd - 1][idx[dd - 1]];
                    }
                    update_pre(dd, pre_max, idx, &views, lvl_rows, lvl_ncols, pre);
                }
            }
        });
    });
}

/// Folds the prefix Kronecker product of the path down to level `d`.
fn update_pre<T: Scalar>(
    d: usize,
    pre_max: Option<usize>,
    idx: &[usize],
    views: &[FidsView<'_>],
    lvl_rows: &[&[T]],
    lvl_ncols: &[usize],
    pre: &mut [Vec<T>],
) {
    let Some(pm) = pre_max else { return };
    if d > pm {
        return;
    }
    let row = mat_row(lvl_rows[d], lvl_ncols[d], views[d].id(idx[d]));
    if d == 0 {
        pre[0].copy_from_slice(row);
    } else {
        let (head, tail) = pre.split_at_mut(d);
        outer_prod(&head[d - 1], row, &mut tail[0]);
    }
}

/// Handles completion of the node at level `d`: below the output depth the
/// subtree sum folds one level up; at the output depth it joins with the
/// prefix and accumulates into the output row.
#[allow(clippy::too_many_arguments)]
fn fold_level<T: Scalar>(
    d: usize,
    outdepth: usize,
    idx: &[usize],
    views: &[FidsView<'_>],
    lvl_rows: &[&[T]],
    lvl_ncols: &[usize],
    pre: &[Vec<T>],
    post: &mut [Vec<T>],
    join: &mut [T],
    outncols: usize,
    col_map: &[usize],
    tenout: &SharedSlice<'_, T>,
    locks: &StripedLocks,
) {
    use std::cmp::Ordering;

    match d.cmp(&outdepth) {
        Ordering::Greater => {
            let row = mat_row(lvl_rows[d], lvl_ncols[d], views[d].id(idx[d]));
            let (head, tail) = post.split_at_mut(d + 1);
            outer_prod_accum(row, &tail[0], &mut head[d]);
            tail[0].fill(T::zero());
        }
        Ordering::Equal => {
            let o = views[d].id(idx[d]);
            let sub = &mut post[d + 1];
            if d == 0 {
                // the slice owns this row
                let orow = unsafe { tenout.slice_mut(o * outncols, outncols) };
                for (p, &x) in sub.iter().enumerate() {
                    orow[col_map[p]] += x;
                }
            } else {
                outer_prod(&pre[d - 1], sub, join);
                let orow = unsafe { tenout.slice_mut(o * outncols, outncols) };
                let _guard = locks.lock(o);
                for (p, &x) in join.iter().enumerate() {
                    orow[col_map[p]] += x;
                }
            }
            sub.fill(T::zero());
        }
        Ordering::Less => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::ModePermPolicy;
    use crate::primitives::coord::CooTensor;
    use crate::Csf;

    fn ones(dims: &[usize], rank: usize) -> Vec<Array2<f64>> {
        dims.iter().map(|&d| Array2::ones((d, rank))).collect()
    }

    #[test]
    fn all_ones_rank2_mode0() {
        // S1: two nonzeros in row 0 and one in row 1, all-ones factors
        let tt = CooTensor::from_entries(
            vec![2, 2, 3],
            &[
                (vec![0, 0, 0], 1.0),
                (vec![1, 0, 0], 2.0),
                (vec![0, 1, 2], 3.0),
            ],
        )
        .unwrap();
        let bundle = Csf::build(&tt, &Options::default()).unwrap();
        let mats = ones(tt.dims(), 2);
        let mut y = vec![-1.0; 2 * 4];
        ttmc(&bundle, &mats, &mut y, 0, &Options::default()).unwrap();
        // row 0 accumulates 1 + 3, row 1 accumulates 2, all columns alike
        assert_eq!(y, vec![4.0, 4.0, 4.0, 4.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn wrong_output_length_is_rejected_without_clearing() {
        let tt = CooTensor::from_entries(vec![2, 2, 3], &[(vec![0, 0, 0], 1.0)]).unwrap();
        let bundle = Csf::build(&tt, &Options::default()).unwrap();
        let mats = ones(tt.dims(), 2);
        let mut y = vec![7.0; 3];
        let err = ttmc(&bundle, &mats, &mut y, 0, &Options::default()).unwrap_err();
        assert!(matches!(err, SpTensorError::InvalidInput(_)));
        // failed call must not touch the output
        assert!(y.iter().all(|&v| v == 7.0));
    }

    #[test]
    fn tenout_dim_is_max_over_modes() {
        // dims (2,3,4), ncols (5,6,7): mode outputs 2*42, 3*35, 4*30
        assert_eq!(tenout_dim(&[2, 3, 4], &[5, 6, 7]), 3 * 35);
    }

    #[test]
    fn canonical_map_reorders_swapped_levels() {
        // perm (2,0,1), output mode 2 at the root: levels contribute modes
        // (0, 1) in order, which is already canonical
        let id_map = canonical_col_map(&[2, 0, 1], &[2, 3, 4], 2, 0);
        assert_eq!(id_map, (0..6).collect::<Vec<_>>());

        // perm (1, 2, 0), output mode 1: levels contribute modes (2, 0);
        // canonical order is (0, 2)
        let map = canonical_col_map(&[1, 2, 0], &[2, 3, 4], 1, 0);
        // position (c2, c0) -> canonical c0 * 4 + c2
        assert_eq!(map[0], 0);
        assert_eq!(map[1], 4); // c2=0, c0=1
        assert_eq!(map[2], 1); // c2=1, c0=0
        assert_eq!(map[6], 3); // c2=3, c0=0
    }

    #[test]
    fn largest_outer_tracks_fiber_lengths() {
        let tt = CooTensor::from_entries(
            vec![2, 2, 3],
            &[
                (vec![0, 0, 0], 1.0),
                (vec![0, 1, 0], 2.0),
                (vec![0, 1, 1], 3.0),
                (vec![1, 0, 2], 4.0),
            ],
        )
        .unwrap();
        let opts = Options::default().with_mode_perm(ModePermPolicy::Explicit(vec![0, 1, 2]));
        let bundle = Csf::build(&tt, &opts).unwrap();
        let outer = ttmc_largest_outer(&bundle);
        // slice 0 holds two fibers, the deeper levels are not counted
        assert_eq!(outer[0], 2);
        assert_eq!(outer[1], 0);
        assert_eq!(outer[2], 0);
    }

    #[test]
    fn two_mode_selects_second_rep_for_leaf_mode() {
        let tt = CooTensor::from_entries(
            vec![2, 3, 4],
            &[(vec![0, 1, 2], 1.5), (vec![1, 2, 3], -2.0)],
        )
        .unwrap();
        let bundle = Csf::build(&tt, &Options::default().with_alloc(CsfAlloc::TwoMode)).unwrap();
        let leaf_mode = *bundle.rep(0).dim_perm().last().unwrap();
        let rep = select_rep(&bundle, leaf_mode).unwrap();
        assert_eq!(rep.dim_perm()[0], leaf_mode);
        let other = select_rep(&bundle, bundle.rep(0).dim_perm()[0]).unwrap();
        assert_eq!(other.dim_perm(), bundle.rep(0).dim_perm());
    }
}
