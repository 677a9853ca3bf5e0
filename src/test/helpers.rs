//! Shared fixtures for the end-to-end scenarios: deterministic
//! pseudo-random inputs, a naive TTMc reference, and float comparison.

use fxhash::FxHashMap;
use ndarray::Array2;

use crate::primitives::coord::CooTensor;

pub fn assert_close(a: f64, b: f64, tol: f64) {
    let scale = a.abs().max(b.abs()).max(1.0);
    assert!(
        (a - b).abs() <= tol * scale,
        "{a} and {b} differ by more than {tol} relative"
    );
}

/// Tiny deterministic generator; keeps the fixtures reproducible without a
/// seed dependency.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493))
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 11
    }

    /// Uniform-ish value in (-1, 1).
    pub fn next_val(&mut self) -> f64 {
        (self.next_u64() % 2_000_001) as f64 / 1_000_000.0 - 1.0
    }

    pub fn next_index(&mut self, bound: usize) -> usize {
        (self.next_u64() as usize) % bound
    }
}

/// Random tensor with distinct coordinates.
pub fn random_coo(dims: &[usize], nnz: usize, seed: u64) -> CooTensor<f64> {
    let mut rng = Lcg::new(seed);
    let mut seen = FxHashMap::default();
    while seen.len() < nnz {
        let coords: Vec<usize> = dims.iter().map(|&d| rng.next_index(d)).collect();
        let v = rng.next_val() * 4.0;
        seen.entry(coords).or_insert(v);
    }
    let entries: Vec<(Vec<usize>, f64)> = seen.into_iter().collect();
    CooTensor::from_entries(dims.to_vec(), &entries).unwrap()
}

pub fn random_mats(dims: &[usize], ncols: &[usize], seed: u64) -> Vec<Array2<f64>> {
    let mut rng = Lcg::new(seed);
    dims.iter()
        .zip(ncols)
        .map(|(&d, &c)| Array2::from_shape_fn((d, c), |_| rng.next_val()))
        .collect()
}

/// Direct N-way expansion of the TTMc definition: for every nonzero and
/// every output column, multiply the matching factor entries. Output columns
/// are ordered by ascending mode index with the output mode removed.
pub fn naive_ttmc(tt: &CooTensor<f64>, mats: &[Array2<f64>], mode: usize) -> Vec<f64> {
    let nmodes = tt.nmodes();
    let ncols: Vec<usize> = mats.iter().map(|m| m.ncols()).collect();
    let others: Vec<usize> = (0..nmodes).filter(|&m| m != mode).collect();
    let total: usize = others.iter().map(|&m| ncols[m]).product();

    let mut y = vec![0.0; tt.dims()[mode] * total];
    for n in 0..tt.nnz() {
        let coords = tt.coords(n);
        for col in 0..total {
            let mut rem = col;
            let mut stride = total;
            let mut prod = tt.vals()[n];
            for &m in &others {
                stride /= ncols[m];
                let c = rem / stride;
                rem %= stride;
                prod *= mats[m][[coords[m], c]];
            }
            y[coords[mode] * total + col] += prod;
        }
    }
    y
}

/// Multiset of `(coords, value-bits)` pairs for exact entry comparison.
pub fn entry_multiset(entries: &[(Vec<usize>, f64)]) -> FxHashMap<(Vec<usize>, u64), usize> {
    let mut set = FxHashMap::default();
    for (coords, v) in entries {
        *set.entry((coords.clone(), v.to_bits())).or_insert(0) += 1;
    }
    set
}
