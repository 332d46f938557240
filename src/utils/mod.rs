use std::io::{BufRead, Write};

use anyhow::bail;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::LinalgError;

pub(crate) mod float;

/// Axis selector for reductions over a matrix.
///
/// `ROW` reduces each row to one value, `COLUMN` reduces each column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum Direction {
    ROW,
    COLUMN,
}

/// Product `self * rhs`, resolved statically on the operand type.
pub trait Multiply<Rhs: ?Sized> {
    type Output;

    fn multiply(&self, rhs: &Rhs) -> anyhow::Result<Self::Output>;
}

/// Product `self^T * rhs` without materializing the transpose.
pub trait MultiplyT<Rhs: ?Sized> {
    type Output;

    fn multiply_t(&self, rhs: &Rhs) -> anyhow::Result<Self::Output>;
}

/// In-place normalization returning the receiver for chaining.
///
/// Zero-norm inputs are left untouched.
pub trait Normalize {
    fn normalize(&mut self) -> &mut Self;
}

/// JSON-line persistence shared by every container and model.
///
/// Each call to `save` writes exactly one line, so several objects can share a stream
/// and be read back in the same order with `load`. Float fields go through
/// [`float`] so non-finite values load back unchanged, and types with invariants
/// reject documents that break them.
pub trait Persist: Sized {
    fn save<W: Write>(&self, writer: W) -> anyhow::Result<()>;

    fn load<R: BufRead>(reader: R) -> anyhow::Result<Self>;
}

impl<T: Serialize + DeserializeOwned> Persist for T {
    fn save<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        serde_json::to_writer(&mut writer, self)
            .map_err(|e| LinalgError::Serialization(e.to_string()))?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn load<R: BufRead>(mut reader: R) -> anyhow::Result<Self> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            bail!(LinalgError::Serialization(
                "unexpected end of stream".to_string()
            ));
        }
        let value = serde_json::from_str(line.trim_end())
            .map_err(|e| LinalgError::Serialization(e.to_string()))?;
        Ok(value)
    }
}

/// Serde impls for a parameter struct derived with `#[serde(remote = "Self")]`.
/// Deserialized values must pass the struct's `validate`.
macro_rules! validated_serde {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                <$ty>::serialize(self, serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let params = <$ty>::deserialize(deserializer)?;
                params
                    .validate()
                    .map_err(<D::Error as serde::de::Error>::custom)?;
                Ok(params)
            }
        }
    };
}

pub(crate) use validated_serde;

/// Deterministic generator used wherever the crate needs randomness.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Random permutation of `0..n`.
pub fn randperm<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..n).collect();
    perm.shuffle(rng);
    perm
}

/// `n` integers drawn uniformly from `0..bound`.
pub fn randi<R: Rng + ?Sized>(n: usize, bound: usize, rng: &mut R) -> anyhow::Result<Vec<usize>> {
    if bound == 0 {
        bail!(LinalgError::InvalidArgument(
            "randi bound must be positive".to_string()
        ));
    }
    Ok((0..n).map(|_| rng.random_range(0..bound)).collect())
}

/// Indices that sort `values`, ascending or descending. Ties keep their original order.
pub(crate) fn sort_permutation(values: &[f64], ascending: bool) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..values.len()).collect();
    if ascending {
        perm.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    } else {
        perm.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    }
    perm
}
