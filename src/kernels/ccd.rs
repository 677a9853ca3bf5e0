//! Coordinate cyclic descent for 3-mode tensor completion.
//!
//! The training tensor is held as a single CSF representation whose leaf
//! values store the *current residual* `r = x - <model>`. Each column step
//! adds the outgoing rank-one component back into the residual, recomputes
//! the column for every mode from numerator/denominator sums, and subtracts
//! the new component again. Work is partitioned by tile planes along the
//! mode being updated, so every numerator/denominator row has exactly one
//! writer and no locks are needed.

use log::debug;
use ndarray::{ArrayView1, Zip};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::csf::tile::TilePlane;
use crate::csf::{Csf, CsfTile, FidsView, NodeRole, Tile3View};
use crate::error::{Result, SpTensorError};
use crate::kernels::{build_pool, standard_slice};
use crate::opts::{CsfAlloc, ModePermPolicy, Options, TilePolicy};
use crate::primitives::coord::CooTensor;
use crate::primitives::model::CompletionModel;
use crate::utils::shared::SharedSlice;
use crate::Scalar;

/// Workspace that lives across CCD epochs.
pub struct CcdWorkspace<T> {
    regularization: Vec<T>,
    numerator: Vec<T>,
    denominator: Vec<T>,
    max_epochs: usize,
    nthreads: usize,
}

impl<T: Scalar> CcdWorkspace<T> {
    pub fn new(regularization: Vec<T>, max_epochs: usize, nthreads: usize) -> Self {
        Self {
            regularization,
            numerator: Vec::new(),
            denominator: Vec::new(),
            max_epochs,
            nthreads,
        }
    }

    pub fn regularization(&self) -> &[T] {
        &self.regularization
    }
}

/// Per-epoch report handed to the convergence predicate.
#[derive(Clone, Copy, Debug)]
pub struct CcdEpoch<T> {
    pub epoch: usize,
    /// `sum r^2` as observed by the last column's subtract pass.
    pub loss_sq: T,
    pub frob_sq: T,
    pub objective: T,
    pub val_rmse: T,
}

/// Runs CCD epochs until the convergence predicate returns `true` or
/// `max_epochs` is reached, and returns the per-epoch reports (the first
/// entry is the state before any update).
///
/// The reported `loss_sq` of an epoch is the residual norm accumulated
/// during the final column's subtract pass, which equals the loss of the
/// fully updated model.
pub fn ccd_run<T, F>(
    train: &CooTensor<T>,
    validate: &CooTensor<T>,
    model: &mut CompletionModel<T>,
    ws: &mut CcdWorkspace<T>,
    mut converged: F,
) -> Result<Vec<CcdEpoch<T>>>
where
    T: Scalar,
    F: FnMut(&CcdEpoch<T>) -> bool,
{
    let nmodes = train.nmodes();
    if nmodes != 3 {
        return Err(SpTensorError::Unsupported(format!(
            "CCD is implemented for 3 modes, got {nmodes}"
        )));
    }
    if model.dims() != train.dims() || validate.dims() != train.dims() {
        return Err(SpTensorError::InvalidInput(
            "model, training, and validation dimensions disagree".into(),
        ));
    }
    if ws.regularization.len() != nmodes {
        return Err(SpTensorError::InvalidInput(format!(
            "expected {nmodes} regularization values, got {}",
            ws.regularization.len()
        )));
    }
    if ws.regularization.iter().any(|&r| r <= T::zero()) {
        return Err(SpTensorError::InvalidInput(
            "regularization must be positive".into(),
        ));
    }

    // training data as CSF-ONEMODE with full tiling
    let opts = Options::default()
        .with_nthreads(ws.nthreads)
        .with_alloc(CsfAlloc::OneMode)
        .with_tiling(TilePolicy::DenseTile, 0)
        .with_mode_perm(ModePermPolicy::SortedSmallFirst);
    let mut csf = Csf::build(train, &opts)?.reps.remove(0);
    debug!("ccd: ntiles={} dim_perm={:?}", csf.ntiles(), csf.dim_perm());

    let pool = build_pool(ws.nthreads)?;
    let rank = model.rank();
    let dims = train.dims().to_vec();
    let max_dim = dims.iter().copied().max().unwrap_or(0);
    ws.numerator.clear();
    ws.numerator.resize(max_dim, T::zero());
    ws.denominator.clear();
    ws.denominator.resize(max_dim, T::zero());

    init_residual(&mut csf, model, &pool)?;

    let mut reports = Vec::with_capacity(ws.max_epochs + 1);
    let first = epoch_report(0, pool.install(|| model.loss_sq(train)), model, validate, ws, &pool);
    let stop = converged(&first);
    reports.push(first);
    if stop {
        return Ok(reports);
    }

    let perm = csf.dim_perm().to_vec();
    let mut best_rmse = reports[0].val_rmse;

    for e in 1..=ws.max_epochs {
        let mut epoch_loss = T::zero();

        for f in 0..rank {
            // factor columns in level order, gathered contiguous
            let mut cols: Vec<Vec<T>> =
                perm.iter().map(|&m| model.factor(m).column(f).to_vec()).collect();

            // add current component back into the residual; the returned
            // partial loss is discarded by design
            let _ = update_residual3(&mut csf, &cols, T::one(), &pool);

            for m in 0..nmodes {
                let dim = dims[m];
                ws.numerator[..dim].fill(T::zero());
                ws.denominator[..dim].fill(ws.regularization[m]);

                mode_pass(&csf, m, &cols, &mut ws.numerator, &mut ws.denominator, &pool);

                // numerator/denominator are complete; update the column
                let quotient: Vec<T> = ws.numerator[..dim]
                    .iter()
                    .zip(&ws.denominator[..dim])
                    .map(|(&n, &d)| n / d)
                    .collect();
                pool.install(|| {
                    Zip::from(model.factor_mut(m).column_mut(f))
                        .and(ArrayView1::from(quotient.as_slice()))
                        .par_for_each(|a, &q| *a = q);
                });
                cols[crate::csf::mode_depth(m, &perm)] = quotient;
            }

            // subtract the new rank-one component
            epoch_loss = update_residual3(&mut csf, &cols, -T::one(), &pool);
        }

        let report = epoch_report(e, epoch_loss, model, validate, ws, &pool);
        if report.val_rmse > best_rmse {
            debug!("ccd: validation RMSE not improving at epoch {e}");
        } else {
            best_rmse = report.val_rmse;
        }
        let stop = converged(&report);
        reports.push(report);
        if stop {
            break;
        }
    }

    Ok(reports)
}

fn epoch_report<T: Scalar>(
    epoch: usize,
    loss_sq: T,
    model: &CompletionModel<T>,
    validate: &CooTensor<T>,
    ws: &CcdWorkspace<T>,
    pool: &ThreadPool,
) -> CcdEpoch<T> {
    let frob_sq = model.frob_sq(&ws.regularization);
    let val_rmse = pool.install(|| model.rmse(validate));
    CcdEpoch {
        epoch,
        loss_sq,
        frob_sq,
        objective: loss_sq + frob_sq,
        val_rmse,
    }
}

/// Subtracts the full model prediction from the stored values, turning them
/// into the residual. Parallel over the slices of each tile; every slice
/// owns a disjoint leaf range.
fn init_residual<T: Scalar>(
    csf: &mut Csf<T>,
    model: &CompletionModel<T>,
    pool: &ThreadPool,
) -> Result<()> {
    let rank = model.rank();
    let perm = csf.dim_perm().to_vec();
    let fa = standard_slice(model.factor(perm[0]), "factor")?;
    let fb = standard_slice(model.factor(perm[1]), "factor")?;
    let fc = standard_slice(model.factor(perm[2]), "factor")?;

    for tile in &mut csf.tiles {
        if tile.vals.is_empty() {
            continue;
        }
        let CsfTile {
            nfibs, fptr, fids, vals,
        } = tile;
        let nslices = nfibs[0];
        let sids = FidsView::from(&fids[0]);
        let fview = FidsView::from(&fids[1]);
        let iview = FidsView::from(&fids[2]);
        let (sptr, fptr1) = (&fptr[0], &fptr[1]);
        let residual = SharedSlice::new(vals);

        pool.install(|| {
            (0..nslices)
                .into_par_iter()
                .for_each_init(|| vec![T::zero(); rank], |predict, i| {
                    let arow = &fa[sids.id(i) * rank..][..rank];
                    for fib in sptr[i]..sptr[i + 1] {
                        let brow = &fb[fview.id(fib) * rank..][..rank];
                        for (p, (&a, &b)) in predict.iter_mut().zip(arow.iter().zip(brow)) {
                            *p = a * b;
                        }
                        for jj in fptr1[fib]..fptr1[fib + 1] {
                            let crow = &fc[iview.id(jj) * rank..][..rank];
                            let dot: T =
                                predict.iter().zip(crow).map(|(&p, &c)| p * c).sum();
                            // slice i owns the leaf range [sptr[i], sptr[i+1])
                            unsafe {
                                *residual.get_mut(jj) -= dot;
                            }
                        }
                    }
                });
        });
    }
    Ok(())
}

/// `r += mult * a o b o c` over every stored nonzero, returning `sum r^2`
/// over the updated values. Parallel over tiles; each tile owns its values.
fn update_residual3<T: Scalar>(
    csf: &mut Csf<T>,
    cols: &[Vec<T>],
    mult: T,
    pool: &ThreadPool,
) -> T {
    pool.install(|| {
        csf.tiles
            .par_iter_mut()
            .map(|tile| {
                if tile.vals.is_empty() {
                    return T::zero();
                }
                let CsfTile {
                    nfibs, fptr, fids, vals,
                } = tile;
                let sids = FidsView::from(&fids[0]);
                let fview = FidsView::from(&fids[1]);
                let iview = FidsView::from(&fids[2]);
                let (sptr, fptr1) = (&fptr[0], &fptr[1]);

                let mut myloss = T::zero();
                for i in 0..nfibs[0] {
                    let aval = cols[0][sids.id(i)];
                    for fib in sptr[i]..sptr[i + 1] {
                        let bval = cols[1][fview.id(fib)];
                        for jj in fptr1[fib]..fptr1[fib + 1] {
                            let cval = cols[2][iview.id(jj)];
                            vals[jj] += mult * aval * bval * cval;
                            myloss += vals[jj] * vals[jj];
                        }
                    }
                }
                myloss
            })
            .sum()
    })
}

/// One numerator/denominator pass for `mode`, dispatched on the mode's
/// depth. Tile layers along `mode` are distributed to workers, so all
/// output rows of a layer are written by a single worker.
fn mode_pass<T: Scalar>(
    csf: &Csf<T>,
    mode: usize,
    cols: &[Vec<T>],
    numerator: &mut [T],
    denominator: &mut [T],
    pool: &ThreadPool,
) {
    let role = csf.role_of(mode);
    let tile_dims = csf.tile_dims().to_vec();
    let numer = SharedSlice::new(numerator);
    let denom = SharedSlice::new(denominator);

    pool.install(|| {
        (0..tile_dims[mode]).into_par_iter().for_each(|layer| {
            for tid in TilePlane::new(&tile_dims, mode, layer) {
                if let Some(tv) = csf.tiles()[tid].view3() {
                    // all rows touched by this layer's tiles fall in the
                    // layer's index range along `mode`
                    match role {
                        NodeRole::Root => process_root3(&tv, cols, &numer, &denom),
                        NodeRole::Internal => process_intl3(&tv, cols, &numer, &denom),
                        NodeRole::Leaf => process_leaf3(&tv, cols, &numer, &denom),
                    }
                }
            }
        });
    });
}

fn process_root3<T: Scalar>(
    tv: &Tile3View<'_, T>,
    cols: &[Vec<T>],
    numer: &SharedSlice<'_, T>,
    denom: &SharedSlice<'_, T>,
) {
    for i in 0..tv.nslices {
        let a_id = tv.sids.id(i);
        for fib in tv.sptr[i]..tv.sptr[i + 1] {
            let bval = cols[1][tv.fids[fib]];
            for jj in tv.fptr[fib]..tv.fptr[fib + 1] {
                let cval = cols[2][tv.inds[jj]];
                let sgrad = bval * cval;
                unsafe {
                    *numer.get_mut(a_id) += tv.vals[jj] * sgrad;
                    *denom.get_mut(a_id) += sgrad * sgrad;
                }
            }
        }
    }
}

fn process_intl3<T: Scalar>(
    tv: &Tile3View<'_, T>,
    cols: &[Vec<T>],
    numer: &SharedSlice<'_, T>,
    denom: &SharedSlice<'_, T>,
) {
    for i in 0..tv.nslices {
        let aval = cols[0][tv.sids.id(i)];
        for fib in tv.sptr[i]..tv.sptr[i + 1] {
            let b_id = tv.fids[fib];
            for jj in tv.fptr[fib]..tv.fptr[fib + 1] {
                let cval = cols[2][tv.inds[jj]];
                let sgrad = aval * cval;
                unsafe {
                    *numer.get_mut(b_id) += tv.vals[jj] * sgrad;
                    *denom.get_mut(b_id) += sgrad * sgrad;
                }
            }
        }
    }
}

fn process_leaf3<T: Scalar>(
    tv: &Tile3View<'_, T>,
    cols: &[Vec<T>],
    numer: &SharedSlice<'_, T>,
    denom: &SharedSlice<'_, T>,
) {
    for i in 0..tv.nslices {
        let aval = cols[0][tv.sids.id(i)];
        for fib in tv.sptr[i]..tv.sptr[i + 1] {
            let bval = cols[1][tv.fids[fib]];
            let predict = aval * bval;
            for jj in tv.fptr[fib]..tv.fptr[fib + 1] {
                let c_id = tv.inds[jj];
                unsafe {
                    *numer.get_mut(c_id) += tv.vals[jj] * predict;
                    *denom.get_mut(c_id) += predict * predict;
                }
            }
        }
    }
}
