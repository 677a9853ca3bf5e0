//! Configuration shared by CSF construction and the kernels.

/// How many CSF representations to allocate and how to orient them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CsfAlloc {
    /// A single representation. CCD uses this flavor.
    OneMode,
    /// Two representations: the primary one plus a second rooted at the
    /// primary's leaf mode, so every mode is reachable from a root or an
    /// internal level.
    TwoMode,
    /// One representation per mode, each rooted at that mode.
    AllMode,
}

/// Tiling policy applied during CSF construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TilePolicy {
    /// One tile spanning the whole index space.
    NoTile,
    /// Cartesian product of per-mode partitions over every level at depth
    /// `tile_depth` or below.
    DenseTile,
    /// Like `DenseTile` but the root level stays whole.
    SyncTile,
}

/// Policy for choosing `dim_perm`, the root-to-leaf level order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModePermPolicy {
    /// Modes ascending by dimension; smallest dimension at the root.
    SortedSmallFirst,
    /// The given mode at the root, remaining modes ascending by dimension.
    SortedSmallFirstMinusOne(usize),
    /// Caller-supplied permutation of `[0, nmodes)`.
    Explicit(Vec<usize>),
}

/// Option table consumed by `Csf::build`, `ccd_run`, `ttmc`, and
/// `ttmc_stream`.
#[derive(Clone, Debug)]
pub struct Options {
    /// Worker count for the kernel's fork-join pool.
    pub nthreads: usize,
    /// Number and orientation of CSF representations.
    pub csf_alloc: CsfAlloc,
    /// Tiling policy.
    pub tile: TilePolicy,
    /// Depth from which tiling is applied; 0 tiles every level.
    pub tile_depth: usize,
    /// Level-order policy.
    pub mode_perm: ModePermPolicy,
    /// Upper bound in bytes for CSF and scratch allocations, if any.
    pub memory_limit: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            nthreads: 1,
            csf_alloc: CsfAlloc::OneMode,
            tile: TilePolicy::NoTile,
            tile_depth: 0,
            mode_perm: ModePermPolicy::SortedSmallFirst,
            memory_limit: None,
        }
    }
}

impl Options {
    pub fn with_nthreads(mut self, nthreads: usize) -> Self {
        self.nthreads = nthreads;
        self
    }

    pub fn with_alloc(mut self, alloc: CsfAlloc) -> Self {
        self.csf_alloc = alloc;
        self
    }

    pub fn with_tiling(mut self, tile: TilePolicy, tile_depth: usize) -> Self {
        self.tile = tile;
        self.tile_depth = tile_depth;
        self
    }

    pub fn with_mode_perm(mut self, policy: ModePermPolicy) -> Self {
        self.mode_perm = policy;
        self
    }
}
