//! CSF construction: permutation policy, tile assignment, per-tile
//! lexicographic sort, and the single sweep that emits fiber pointers and
//! ids for every level.

use std::cmp::Ordering;
use std::mem;

use itertools::Itertools;
use log::debug;

use crate::csf::tile::{encode_tile, tile_chunks};
use crate::csf::{Csf, CsfBundle, CsfTile};
use crate::error::{Result, SpTensorError};
use crate::opts::{CsfAlloc, ModePermPolicy, Options, TilePolicy};
use crate::primitives::coord::CooTensor;
use crate::Scalar;

impl<T: Scalar> Csf<T> {
    /// Builds the CSF representation(s) requested by `opts.csf_alloc`.
    pub fn build(tt: &CooTensor<T>, opts: &Options) -> Result<CsfBundle<T>> {
        let primary = resolve_perm(&opts.mode_perm, tt.dims())?;
        let reps = match opts.csf_alloc {
            CsfAlloc::OneMode => vec![build_with_perm(tt, primary, opts)?],
            CsfAlloc::TwoMode => {
                // the second representation roots the primary's leaf mode so
                // that mode is reachable lock-free
                let leaf_mode = primary[primary.len() - 1];
                let second = perm_minus_one(tt.dims(), leaf_mode)?;
                vec![
                    build_with_perm(tt, primary, opts)?,
                    build_with_perm(tt, second, opts)?,
                ]
            }
            CsfAlloc::AllMode => (0..tt.nmodes())
                .map(|m| build_with_perm(tt, perm_minus_one(tt.dims(), m)?, opts))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(CsfBundle {
            alloc: opts.csf_alloc,
            reps,
        })
    }

    /// Builds a single representation with `root_mode` hoisted to the root
    /// and the remaining modes ascending by dimension.
    pub fn build_one(tt: &CooTensor<T>, root_mode: usize, opts: &Options) -> Result<Csf<T>> {
        build_with_perm(tt, perm_minus_one(tt.dims(), root_mode)?, opts)
    }
}

/// Modes ascending by dimension, ties by mode index.
fn perm_small_first(dims: &[usize]) -> Vec<usize> {
    (0..dims.len()).sorted_by_key(|&m| (dims[m], m)).collect_vec()
}

/// `root_mode` first, remaining modes ascending by dimension.
fn perm_minus_one(dims: &[usize], root_mode: usize) -> Result<Vec<usize>> {
    if root_mode >= dims.len() {
        return Err(SpTensorError::InvalidInput(format!(
            "root mode {root_mode} out of range for {} modes",
            dims.len()
        )));
    }
    let mut perm = vec![root_mode];
    perm.extend(
        (0..dims.len())
            .filter(|&m| m != root_mode)
            .sorted_by_key(|&m| (dims[m], m)),
    );
    Ok(perm)
}

fn resolve_perm(policy: &ModePermPolicy, dims: &[usize]) -> Result<Vec<usize>> {
    match policy {
        ModePermPolicy::SortedSmallFirst => Ok(perm_small_first(dims)),
        ModePermPolicy::SortedSmallFirstMinusOne(mode) => perm_minus_one(dims, *mode),
        ModePermPolicy::Explicit(perm) => {
            let nmodes = dims.len();
            let mut seen = vec![false; nmodes];
            if perm.len() != nmodes || perm.iter().any(|&m| m >= nmodes || mem::replace(&mut seen[m], true)) {
                return Err(SpTensorError::InvalidInput(format!(
                    "dim_perm {perm:?} is not a permutation of [0, {nmodes})"
                )));
            }
            Ok(perm.clone())
        }
    }
}

/// Per-mode tile counts under the given tiling policy.
fn tile_counts(dims: &[usize], dim_perm: &[usize], opts: &Options) -> Vec<usize> {
    let nparts = opts.nthreads.max(1);
    let mut counts = vec![1; dims.len()];
    for (depth, &m) in dim_perm.iter().enumerate() {
        let tiled = match opts.tile {
            TilePolicy::NoTile => false,
            TilePolicy::DenseTile => depth >= opts.tile_depth,
            TilePolicy::SyncTile => depth > 0,
        };
        if tiled {
            counts[m] = nparts.min(dims[m].max(1));
        }
    }
    counts
}

fn build_with_perm<T: Scalar>(
    tt: &CooTensor<T>,
    dim_perm: Vec<usize>,
    opts: &Options,
) -> Result<Csf<T>> {
    let nmodes = tt.nmodes();
    let nnz = tt.nnz();
    if nnz == 0 {
        return Err(SpTensorError::InvalidInput("empty tensor".into()));
    }

    if let Some(limit) = opts.memory_limit {
        let estimate = nnz * (nmodes * mem::size_of::<usize>() + mem::size_of::<T>());
        if estimate > limit {
            return Err(SpTensorError::AllocationFailure(format!(
                "CSF needs about {estimate} bytes, limit is {limit}"
            )));
        }
    }

    let tile_dims = tile_counts(tt.dims(), &dim_perm, opts);
    let chunks = tile_chunks(tt.dims(), &tile_dims);
    let ntiles: usize = tile_dims.iter().product();

    // assign each nonzero to its tile
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); ntiles];
    let mut coords = vec![0usize; nmodes];
    for n in 0..nnz {
        for (m, c) in coords.iter_mut().enumerate() {
            *c = tt.ind(m)[n] / chunks[m];
        }
        buckets[encode_tile(&coords, &tile_dims)].push(n);
    }

    let tiles = buckets
        .into_iter()
        .map(|mut entries| {
            if entries.is_empty() {
                return CsfTile::empty(nmodes);
            }
            // lexicographic by permuted coordinates
            entries.sort_unstable_by(|&a, &b| {
                for &m in &dim_perm {
                    match tt.ind(m)[a].cmp(&tt.ind(m)[b]) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                Ordering::Equal
            });
            sweep_tile(tt, &dim_perm, &entries)
        })
        .collect_vec();

    let csf = Csf {
        dims: tt.dims().to_vec(),
        dim_perm,
        which_tile: opts.tile,
        tile_dims,
        tiles,
    };
    debug!(
        "csf built: dim_perm={:?} ntiles={} nnz={}",
        csf.dim_perm,
        csf.ntiles(),
        nnz
    );
    debug_assert_eq!(csf.nnz(), nnz);
    Ok(dense_root_reduction(csf))
}

/// One pass over a tile's sorted nonzeros, emitting fiber ids and pointers
/// for every level by comparing each entry's level prefix with its
/// predecessor.
fn sweep_tile<T: Scalar>(tt: &CooTensor<T>, dim_perm: &[usize], entries: &[usize]) -> CsfTile<T> {
    let nmodes = dim_perm.len();

    // diffs[p] = shallowest level whose index differs from the previous
    // entry (nmodes when the whole coordinate repeats)
    let mut diffs = Vec::with_capacity(entries.len());
    diffs.push(0usize);
    for pair in entries.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        let d = (0..nmodes)
            .find(|&l| tt.ind(dim_perm[l])[prev] != tt.ind(dim_perm[l])[cur])
            .unwrap_or(nmodes);
        diffs.push(d);
    }

    let mut fids: Vec<Option<Vec<usize>>> = Vec::with_capacity(nmodes);
    let mut nfibs = Vec::with_capacity(nmodes);
    for l in 0..nmodes {
        let ids = if l == nmodes - 1 {
            // leaf: every nonzero is its own fiber
            entries.iter().map(|&e| tt.ind(dim_perm[l])[e]).collect_vec()
        } else {
            entries
                .iter()
                .zip(&diffs)
                .filter(|(_, &d)| d <= l)
                .map(|(&e, _)| tt.ind(dim_perm[l])[e])
                .collect_vec()
        };
        nfibs.push(ids.len());
        fids.push(Some(ids));
    }

    let mut fptr = Vec::with_capacity(nmodes - 1);
    for l in 0..nmodes - 1 {
        let mut ptr = vec![0usize];
        let mut nchildren = 0usize;
        for (pos, &d) in diffs.iter().enumerate() {
            if pos > 0 && d <= l {
                ptr.push(nchildren);
            }
            let child_new = l + 1 == nmodes - 1 || d <= l + 1;
            if child_new {
                nchildren += 1;
            }
        }
        ptr.push(nchildren);
        debug_assert_eq!(ptr.len(), nfibs[l] + 1);
        fptr.push(ptr);
    }

    CsfTile {
        nfibs,
        fptr,
        fids,
        vals: entries.iter().map(|&e| tt.vals()[e]).collect(),
    }
}

/// Replaces a fully populated untiled root level with the identity map.
fn dense_root_reduction<T>(mut csf: Csf<T>) -> Csf<T> {
    if csf.tiles.len() == 1 {
        let root_dim = csf.dims[csf.dim_perm[0]];
        let tile = &mut csf.tiles[0];
        if tile.nfibs[0] == root_dim {
            tile.fids[0] = None;
        }
    }
    csf
}
