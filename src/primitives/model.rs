use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{Result, SpTensorError};
use crate::primitives::coord::CooTensor;
use crate::Scalar;

/// Rank-R factor model for tensor completion: one `dims[m] x rank` row-major
/// matrix per mode.
#[derive(Clone, Debug)]
pub struct CompletionModel<T> {
    rank: usize,
    factors: Vec<Array2<T>>,
}

impl<T: Scalar> CompletionModel<T> {
    /// All-ones factors, the reproducible initialization used by the tests.
    pub fn ones(dims: &[usize], rank: usize) -> Self {
        Self {
            rank,
            factors: dims.iter().map(|&d| Array2::ones((d, rank))).collect(),
        }
    }

    /// Wraps caller-supplied factors, validating a common column count.
    pub fn with_factors(factors: Vec<Array2<T>>) -> Result<Self> {
        let rank = factors
            .first()
            .map(|f| f.ncols())
            .ok_or_else(|| SpTensorError::InvalidInput("empty factor set".into()))?;
        if let Some(m) = factors.iter().position(|f| f.ncols() != rank) {
            return Err(SpTensorError::InvalidInput(format!(
                "factor {m} has {} columns, expected {rank}",
                factors[m].ncols()
            )));
        }
        Ok(Self { rank, factors })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn nmodes(&self) -> usize {
        self.factors.len()
    }

    pub fn dims(&self) -> Vec<usize> {
        self.factors.iter().map(|f| f.nrows()).collect()
    }

    pub fn factor(&self, m: usize) -> &Array2<T> {
        &self.factors[m]
    }

    pub fn factor_mut(&mut self, m: usize) -> &mut Array2<T> {
        &mut self.factors[m]
    }

    /// Model prediction at one coordinate: the rank-sum of the Hadamard
    /// product of the factor rows.
    pub fn predict(&self, coords: &[usize]) -> T {
        (0..self.rank)
            .map(|f| {
                self.factors
                    .iter()
                    .zip(coords)
                    .fold(T::one(), |acc, (fac, &i)| acc * fac[[i, f]])
            })
            .sum()
    }

    /// Squared reconstruction loss over the observed nonzeros of `tt`.
    pub fn loss_sq(&self, tt: &CooTensor<T>) -> T {
        (0..tt.nnz())
            .into_par_iter()
            .map(|n| {
                let err = tt.vals()[n] - self.predict(&tt.coords(n));
                err * err
            })
            .sum()
    }

    /// Regularized squared Frobenius norm `sum_m reg[m] * ||A^(m)||^2`.
    pub fn frob_sq(&self, regularization: &[T]) -> T {
        self.factors
            .iter()
            .zip(regularization)
            .map(|(fac, &reg)| reg * fac.iter().map(|&v| v * v).sum::<T>())
            .sum()
    }

    /// Root-mean-square error of the model on `tt`.
    pub fn rmse(&self, tt: &CooTensor<T>) -> T {
        let n = T::from(tt.nnz().max(1)).unwrap_or_else(T::one);
        (self.loss_sq(tt) / n).sqrt()
    }
}
