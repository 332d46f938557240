pub mod active_learning;
pub mod anomaly;
pub mod dataset;
pub mod dense;
pub mod error;
pub mod linreg;
pub mod logreg;
pub mod online;
pub mod similarity;
pub mod solver;
pub mod sparse;
pub mod svd;
pub mod svm;
pub mod utils;

pub use dense::{Matrix, Vector};
pub use error::LinalgError;
pub use sparse::{SparseMatrix, SparseVector};
pub use utils::Direction;
pub use utils::{Multiply, MultiplyT, Normalize, Persist};
