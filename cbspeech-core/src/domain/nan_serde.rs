//! Serde adapters mapping missing (`NaN`/infinite) floats to JSON `null`.
//!
//! `serde_json` writes non-finite floats as `null` but refuses to read `null`
//! back into an `f64`, so every persisted float that may be missing goes
//! through one of these modules.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn to_opt(v: f64) -> Option<f64> {
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

fn from_opt(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NAN)
}

pub mod scalar {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        to_opt(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Option::<f64>::deserialize(deserializer).map(from_opt)
    }
}

pub mod vec {
    use super::*;

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let opts: Vec<Option<f64>> = values.iter().map(|&v| to_opt(v)).collect();
        opts.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let opts = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(opts.into_iter().map(from_opt).collect())
    }
}

pub mod matrix {
    use super::*;

    pub fn serialize<S: Serializer>(rows: &[Vec<f64>], serializer: S) -> Result<S::Ok, S::Error> {
        let opts: Vec<Vec<Option<f64>>> = rows
            .iter()
            .map(|r| r.iter().map(|&v| to_opt(v)).collect())
            .collect();
        opts.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<f64>>, D::Error> {
        let opts = Vec::<Vec<Option<f64>>>::deserialize(deserializer)?;
        Ok(opts
            .into_iter()
            .map(|r| r.into_iter().map(from_opt).collect())
            .collect())
    }
}
