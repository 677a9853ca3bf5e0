//! Sparse tensor computation core: a Compressed Sparse Fiber (CSF) storage
//! engine for N-dimensional sparse tensors plus two mode-parametric kernels
//! defined on it, CCD tensor completion and TTMc (tensor-times-matrix chain).
//!
//! A [`CooTensor`] is the canonical input form. [`Csf::build`] turns it into
//! one or more permuted, optionally tiled tree representations, and the
//! kernels in [`kernels`] consume those together with dense factor matrices.

pub mod csf;
pub mod error;
pub mod kernels;
pub mod opts;
pub mod primitives;
pub mod utils;

#[cfg(test)]
pub mod test;

use std::fmt::Debug;
use std::iter::Sum;

use num_traits::{Float, NumAssign};

pub use crate::csf::tile::{next_tile_in_layer, TilePlane};
pub use crate::csf::{mode_depth, Csf, CsfBundle, CsfTile, FidsView, NodeRole};
pub use crate::error::{Result, SpTensorError};
pub use crate::kernels::ccd::{ccd_run, CcdEpoch, CcdWorkspace};
pub use crate::kernels::flops::{
    ttmc_coord_count_flops, ttmc_csf_count_flops, ttmc_fill_flop_tbl, FlopTable,
};
pub use crate::kernels::stream::ttmc_stream;
pub use crate::kernels::ttmc::{tenout_dim, ttmc, ttmc_largest_outer};
pub use crate::opts::{CsfAlloc, ModePermPolicy, Options, TilePolicy};
pub use crate::primitives::coord::CooTensor;
pub use crate::primitives::model::CompletionModel;

/// Element type of tensor values and factor matrices.
///
/// Alias trait collecting everything the storage engine and the kernels need
/// from a scalar; implemented for `f32` and `f64` via the blanket impl.
pub trait Scalar: Float + NumAssign + Sum + Send + Sync + Debug + 'static {}

impl<T> Scalar for T where T: Float + NumAssign + Sum + Send + Sync + Debug + 'static {}
