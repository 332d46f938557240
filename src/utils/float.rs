//! Serde codec for `f64` fields that keeps NaN and the infinities.
//!
//! JSON has no literal for non-finite numbers and `serde_json` writes them as `null`,
//! which then fails to load. Finite values stay plain numbers; the others are written
//! as the strings `"NaN"`, `"inf"` and `"-inf"`.
//!
//! Use with `#[serde(with = "crate::utils::float")]` on scalars and
//! `#[serde(with = "crate::utils::float::seq")]` on `Vec<f64>` buffers.

use std::fmt;

use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const NAN: &str = "NaN";
const INF: &str = "inf";
const NEG_INF: &str = "-inf";

#[derive(Debug, Clone, Copy)]
pub(crate) struct Float(pub f64);

impl Serialize for Float {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_finite() {
            serializer.serialize_f64(v)
        } else if v.is_nan() {
            serializer.serialize_str(NAN)
        } else if v > 0.0 {
            serializer.serialize_str(INF)
        } else {
            serializer.serialize_str(NEG_INF)
        }
    }
}

struct FloatVisitor;

impl Visitor<'_> for FloatVisitor {
    type Value = f64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
        Ok(v as f64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
        match v {
            NAN => Ok(f64::NAN),
            INF => Ok(f64::INFINITY),
            NEG_INF => Ok(f64::NEG_INFINITY),
            _ => Err(E::invalid_value(Unexpected::Str(v), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for Float {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FloatVisitor).map(Float)
    }
}

pub(crate) fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    Float(*value).serialize(serializer)
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Float::deserialize(deserializer).map(|f| f.0)
}

pub(crate) mod seq {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Float;

    pub(crate) fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|&v| Float(v)))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Float>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|f| f.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Reading {
        #[serde(with = "crate::utils::float")]
        level: f64,
        #[serde(with = "crate::utils::float::seq")]
        history: Vec<f64>,
    }

    #[test]
    fn test_non_finite_values_survive_json() {
        let reading = Reading {
            level: f64::NEG_INFINITY,
            history: vec![1.5, f64::NAN, f64::INFINITY, -0.0],
        };
        let text = serde_json::to_string(&reading).unwrap();
        assert_eq!(text, r#"{"level":"-inf","history":[1.5,"NaN","inf",-0.0]}"#);

        let back: Reading = serde_json::from_str(&text).unwrap();
        assert_eq!(back.level, f64::NEG_INFINITY);
        assert_eq!(back.history[0], 1.5);
        assert!(back.history[1].is_nan());
        assert_eq!(back.history[2], f64::INFINITY);
        assert!(back.history[3] == 0.0 && back.history[3].is_sign_negative());
    }

    #[test]
    fn test_accepts_integers_and_rejects_other_strings() {
        let back: Reading = serde_json::from_str(r#"{"level":3,"history":[-2]}"#).unwrap();
        assert_eq!(back.level, 3.0);
        assert_eq!(back.history, vec![-2.0]);
        assert!(serde_json::from_str::<Reading>(r#"{"level":"nan","history":[]}"#).is_err());
        assert!(serde_json::from_str::<Reading>(r#"{"level":null,"history":[]}"#).is_err());
    }
}
