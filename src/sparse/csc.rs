use std::ops::AddAssign;

use anyhow::anyhow;
use nalgebra_sparse::CscMatrix;
use num_traits::{PrimInt, Unsigned, Zero};

use super::{MatrixNonZero, SparseMatrix, SparseVector};

impl SparseMatrix {
    /// Converts to a `nalgebra_sparse` CSC matrix with `rows()` rows.
    pub fn to_csc(&self) -> anyhow::Result<CscMatrix<f64>> {
        let mut col_offsets = Vec::with_capacity(self.cols() + 1);
        let mut row_indices = Vec::with_capacity(self.nnz());
        let mut values = Vec::with_capacity(self.nnz());
        col_offsets.push(0);
        for col in self.col_iter() {
            for (r, v) in col.iter() {
                row_indices.push(r);
                values.push(v);
            }
            col_offsets.push(row_indices.len());
        }
        CscMatrix::try_from_csc_data(self.rows(), self.cols(), col_offsets, row_indices, values)
            .map_err(|e| anyhow!("Failed to build CSC matrix: {}", e))
    }
}

impl From<&CscMatrix<f64>> for SparseMatrix {
    fn from(csc: &CscMatrix<f64>) -> Self {
        let rows = csc.nrows();
        let mut out = SparseMatrix::with_rows(rows);
        for col in csc.col_iter() {
            out.push_unchecked(SparseVector::from_sorted_parts(
                col.row_indices().to_vec(),
                col.values().to_vec(),
                Some(rows),
            ));
        }
        out
    }
}

impl MatrixNonZero for SparseMatrix {
    fn nonzero_col<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign,
    {
        self.col_iter()
            .map(|col| T::from(col.nnz()).ok_or_else(|| anyhow!("Failed to convert to target type")))
            .collect()
    }

    fn nonzero_row<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign,
    {
        let mut result = vec![T::zero(); self.rows()];
        for col in self.col_iter() {
            for (row, _) in col.iter() {
                result[row] += T::one();
            }
        }
        Ok(result)
    }
}

impl MatrixNonZero for CscMatrix<f64> {
    fn nonzero_col<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign,
    {
        self.col_offsets()
            .windows(2)
            .map(|window| {
                let diff = window[1]
                    .checked_sub(window[0])
                    .ok_or_else(|| anyhow!("Subtraction overflow"))?;
                T::from(diff).ok_or_else(|| anyhow!("Failed to convert to target type"))
            })
            .collect()
    }

    fn nonzero_row<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign,
    {
        let mut result = vec![T::zero(); self.nrows()];
        for &row_index in self.row_indices() {
            result[row_index] += T::one();
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn create_test_matrix() -> CscMatrix<f64> {
        // [1 0 2]
        // [0 0 0]
        // [3 4 0]
        // [0 5 6]
        let values = vec![1.0, 3.0, 4.0, 5.0, 2.0, 6.0];
        let row_indices = vec![0, 2, 2, 3, 0, 3];
        let col_ptrs = vec![0, 2, 4, 6];

        CscMatrix::try_from_csc_data(4, 3, col_ptrs, row_indices, values).unwrap()
    }

    #[test]
    fn test_round_trip_through_csc() {
        let csc = create_test_matrix();
        let sparse = SparseMatrix::from(&csc);
        assert_eq!((sparse.rows(), sparse.cols(), sparse.nnz()), (4, 3, 6));
        assert_eq!(sparse.at(2, 1).unwrap(), 4.0);
        let back = sparse.to_csc().unwrap();
        assert_eq!(back, csc);
    }

    #[test]
    fn test_nonzero_counts_agree() {
        let csc = create_test_matrix();
        let sparse = SparseMatrix::from(&csc);

        let col_csc: Vec<u32> = csc.nonzero_col().unwrap();
        let col_sparse: Vec<u32> = sparse.nonzero_col().unwrap();
        assert_eq!(col_csc, vec![2, 2, 2]);
        assert_eq!(col_csc, col_sparse);

        let row_csc: Vec<u64> = csc.nonzero_row().unwrap();
        let row_sparse: Vec<u64> = sparse.nonzero_row().unwrap();
        assert_eq!(row_csc, vec![2, 0, 2, 2]);
        assert_eq!(row_csc, row_sparse);
    }

    #[test]
    fn test_from_coo_with_duplicates() {
        let mut coo = CooMatrix::new(3, 2);
        coo.push(0, 0, 1.0);
        coo.push(0, 0, 2.0);
        coo.push(2, 1, 5.0);
        let csc = CscMatrix::from(&coo);
        let sparse = SparseMatrix::from(&csc);
        assert_eq!(sparse.at(0, 0).unwrap(), 3.0);
        assert_eq!(sparse.full().get_col(1).unwrap().as_slice(), &[0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_empty_matrix() {
        let empty: CscMatrix<f64> = CscMatrix::zeros(0, 0);
        let sparse = SparseMatrix::from(&empty);
        assert_eq!(sparse.cols(), 0);
        assert!(sparse.nonzero_col::<u32>().unwrap().is_empty());
        assert_eq!(sparse.to_csc().unwrap().nnz(), 0);
    }
}
