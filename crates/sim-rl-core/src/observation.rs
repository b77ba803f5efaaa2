//! Observation feature types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Feature mapping handed to the policy, keyed by feature name
///
/// Ordered so that flattening is stable across runs.
pub type Features = BTreeMap<String, FeatureValue>;

/// A single observation feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Scalar feature
    Scalar(f64),
    /// Fixed-length vector feature
    Vector(Vec<f64>),
}

impl FeatureValue {
    /// Whether this is a vector feature
    pub fn is_vector(&self) -> bool {
        matches!(self, FeatureValue::Vector(_))
    }

    /// Number of elements (1 for scalars)
    pub fn len(&self) -> usize {
        match self {
            FeatureValue::Scalar(_) => 1,
            FeatureValue::Vector(v) => v.len(),
        }
    }

    /// Whether the feature holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values in element order
    pub fn as_slice(&self) -> &[f64] {
        match self {
            FeatureValue::Scalar(v) => std::slice::from_ref(v),
            FeatureValue::Vector(v) => v,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Scalar(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Scalar(if value { 1.0 } else { 0.0 })
    }
}

impl From<Vec<f64>> for FeatureValue {
    fn from(value: Vec<f64>) -> Self {
        FeatureValue::Vector(value)
    }
}

/// Flatten features into a single vector in key order
pub fn flatten(features: &Features) -> Vec<f64> {
    features
        .values()
        .flat_map(|value| value.as_slice().iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json_shape() {
        let json = r#"{"gcdRemaining": 1500.0, "runeCDs": [0.0, 2500.0]}"#;
        let features: Features = serde_json::from_str(json).unwrap();

        assert_eq!(features["gcdRemaining"], FeatureValue::Scalar(1500.0));
        assert_eq!(features["runeCDs"], FeatureValue::Vector(vec![0.0, 2500.0]));
    }

    #[test]
    fn test_flatten_is_key_ordered() {
        let mut features = Features::new();
        features.insert("b".into(), vec![2.0, 3.0].into());
        features.insert("a".into(), 1.0.into());
        features.insert("c".into(), true.into());

        assert_eq!(flatten(&features), vec![1.0, 2.0, 3.0, 1.0]);
    }
}
