use thiserror::Error;

/// Failure kinds raised by the kernels and learners.
///
/// Public functions return `anyhow::Result`; the underlying cause is always one of
/// these variants, so callers can recover it with `err.downcast_ref::<LinalgError>()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinalgError {
    #[error("dimension mismatch in {op}: expected {expected}, found {found}")]
    DimensionMismatch {
        op: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("index {index} out of range (bound {bound})")]
    IndexOutOfRange { index: usize, bound: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} must be fitted before use")]
    NotFitted(&'static str),

    #[error("matrix is singular")]
    Singular,

    #[error("serialization failed: {0}")]
    Serialization(String),
}

pub(crate) fn check_dim(op: &'static str, expected: usize, found: usize) -> anyhow::Result<()> {
    if expected != found {
        return Err(LinalgError::DimensionMismatch {
            op,
            expected,
            found,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn check_index(index: usize, bound: usize) -> anyhow::Result<()> {
    if index >= bound {
        return Err(LinalgError::IndexOutOfRange { index, bound }.into());
    }
    Ok(())
}
