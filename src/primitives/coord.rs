use crate::error::{Result, SpTensorError};
use crate::Scalar;

/// Coordinate-form (COO) sparse tensor: one index column per mode plus a
/// value column. The canonical input form for CSF construction and the
/// streaming kernels.
#[derive(Clone, Debug)]
pub struct CooTensor<T> {
    dims: Vec<usize>,
    ind: Vec<Vec<usize>>,
    vals: Vec<T>,
}

impl<T: Scalar> CooTensor<T> {
    /// Builds a COO tensor, validating column lengths and coordinate ranges.
    pub fn new(dims: Vec<usize>, ind: Vec<Vec<usize>>, vals: Vec<T>) -> Result<Self> {
        if dims.is_empty() || dims.len() != ind.len() {
            return Err(SpTensorError::InvalidInput(format!(
                "expected {} index columns, got {}",
                dims.len(),
                ind.len()
            )));
        }
        let nnz = vals.len();
        for (m, col) in ind.iter().enumerate() {
            if col.len() != nnz {
                return Err(SpTensorError::InvalidInput(format!(
                    "index column {m} has {} entries, expected {nnz}",
                    col.len()
                )));
            }
            if let Some(&bad) = col.iter().find(|&&i| i >= dims[m]) {
                return Err(SpTensorError::InvalidInput(format!(
                    "coordinate {bad} out of range for mode {m} (dim {})",
                    dims[m]
                )));
            }
        }
        Ok(Self { dims, ind, vals })
    }

    /// Convenience constructor from `(coords, value)` entries.
    pub fn from_entries(dims: Vec<usize>, entries: &[(Vec<usize>, T)]) -> Result<Self> {
        let nmodes = dims.len();
        let mut ind = vec![Vec::with_capacity(entries.len()); nmodes];
        let mut vals = Vec::with_capacity(entries.len());
        for (coords, v) in entries {
            if coords.len() != nmodes {
                return Err(SpTensorError::InvalidInput(format!(
                    "entry has {} coordinates, expected {nmodes}",
                    coords.len()
                )));
            }
            for (m, &i) in coords.iter().enumerate() {
                ind[m].push(i);
            }
            vals.push(*v);
        }
        Self::new(dims, ind, vals)
    }

    pub fn nmodes(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn nnz(&self) -> usize {
        self.vals.len()
    }

    /// Index column of mode `m`.
    pub fn ind(&self, m: usize) -> &[usize] {
        &self.ind[m]
    }

    pub fn vals(&self) -> &[T] {
        &self.vals
    }

    /// Coordinates of nonzero `n`, one index per mode.
    pub fn coords(&self, n: usize) -> Vec<usize> {
        self.ind.iter().map(|col| col[n]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinate() {
        let err = CooTensor::<f64>::new(
            vec![2, 2],
            vec![vec![0, 1], vec![0, 2]],
            vec![1.0, 2.0],
        )
        .unwrap_err();
        assert!(matches!(err, SpTensorError::InvalidInput(_)));
    }

    #[test]
    fn rejects_ragged_columns() {
        let err =
            CooTensor::<f64>::new(vec![2, 2], vec![vec![0], vec![0, 1]], vec![1.0, 2.0])
                .unwrap_err();
        assert!(matches!(err, SpTensorError::InvalidInput(_)));
    }

    #[test]
    fn entries_round_trip() {
        let tt = CooTensor::from_entries(
            vec![2, 2, 3],
            &[(vec![0, 0, 0], 1.0), (vec![1, 1, 2], -2.5)],
        )
        .unwrap();
        assert_eq!(tt.nnz(), 2);
        assert_eq!(tt.coords(1), vec![1, 1, 2]);
        assert_eq!(tt.vals()[1], -2.5);
    }
}
