//! Online observation normalization
//!
//! An [`ObservationNormalizer`] has two modes, chosen by whether it holds a
//! [`NormalizationConfig`]:
//!
//! - **Recording** (no config): every observation is appended to a value
//!   cache and returned untouched.
//! - **Scaling** (config built or loaded): every observation is scaled with
//!   the per-feature parameters. The normalizer never records again.
//!
//! Only the derived config is persisted. The value cache lives and dies with
//! the instance.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::observation::{FeatureValue, Features};
use crate::state::DISCRETE_FEATURES;

/// Scaling function applied to a feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingKind {
    /// `(v - min) / (max - min)`
    #[default]
    Minmax,
    /// `(v - mean) / std`
    Standard,
}

impl ScalingKind {
    /// Scale one value. Degenerate features (zero range or zero std) map to 0.
    pub fn scale(self, value: f64, min: f64, max: f64, mean: f64, std: f64) -> f64 {
        match self {
            ScalingKind::Minmax => {
                let range = max - min;
                if range == 0.0 { 0.0 } else { (value - min) / range }
            }
            ScalingKind::Standard => {
                if std == 0.0 { 0.0 } else { (value - mean) / std }
            }
        }
    }
}

impl FromStr for ScalingKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "minmax" => Ok(ScalingKind::Minmax),
            "standard" => Ok(ScalingKind::Standard),
            other => Err(SimError::Config(format!(
                "Unknown scaling type: {}",
                other
            ))),
        }
    }
}

/// Scaling parameters for one feature
///
/// For vector features every statistic is an element-wise array and
/// `is_list` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaling {
    pub min: FeatureValue,
    pub max: FeatureValue,
    pub mean: FeatureValue,
    pub std: FeatureValue,
    pub scaling_type: ScalingKind,
    pub is_list: bool,
}

impl FeatureScaling {
    /// Compute statistics from per-element sample columns
    fn from_samples(columns: &[Vec<f64>], is_list: bool, kind: ScalingKind) -> Self {
        let stats: Vec<Stats> = columns.iter().map(|c| Stats::of(c)).collect();
        let pick = |f: fn(&Stats) -> f64| {
            if is_list {
                FeatureValue::Vector(stats.iter().map(f).collect())
            } else {
                FeatureValue::Scalar(f(&stats[0]))
            }
        };
        Self {
            min: pick(|s| s.min),
            max: pick(|s| s.max),
            mean: pick(|s| s.mean),
            std: pick(|s| s.std),
            scaling_type: kind,
            is_list,
        }
    }

    /// Number of elements this feature is configured for
    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    fn validate(&self, key: &str) -> std::result::Result<(), String> {
        let fields = [&self.min, &self.max, &self.mean, &self.std];
        if fields.iter().any(|f| f.is_vector() != self.is_list) {
            return Err(format!("{}: is_list disagrees with statistic shapes", key));
        }
        let dim = self.dimension();
        if fields.iter().any(|f| f.len() != dim) {
            return Err(format!("{}: statistic arrays differ in length", key));
        }
        if fields
            .iter()
            .flat_map(|f| f.as_slice())
            .any(|v| !v.is_finite())
        {
            return Err(format!("{}: non-finite statistic", key));
        }
        Ok(())
    }

    fn apply(&self, key: &str, value: &FeatureValue) -> Result<FeatureValue> {
        if value.is_vector() != self.is_list || value.len() != self.dimension() {
            return Err(SimError::FeatureShape(format!(
                "{}: expected {} of length {}, got {} of length {}",
                key,
                shape_name(self.is_list),
                self.dimension(),
                shape_name(value.is_vector()),
                value.len()
            )));
        }
        let (min, max, mean, std) = (
            self.min.as_slice(),
            self.max.as_slice(),
            self.mean.as_slice(),
            self.std.as_slice(),
        );
        let scaled = value.as_slice().iter().enumerate().map(|(i, &v)| {
            self.scaling_type.scale(v, min[i], max[i], mean[i], std[i])
        });
        Ok(match value {
            FeatureValue::Scalar(_) => FeatureValue::Scalar(scaled.sum()),
            FeatureValue::Vector(_) => FeatureValue::Vector(scaled.collect()),
        })
    }
}

fn shape_name(is_list: bool) -> &'static str {
    if is_list { "vector" } else { "scalar" }
}

/// Summary statistics over one sample column (population std)
struct Stats {
    min: f64,
    max: f64,
    mean: f64,
    std: f64,
}

impl Stats {
    fn of(samples: &[f64]) -> Self {
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let (mean, std) = match Self::moments(samples, 1.0) {
            (mean, std) if mean.is_finite() && std.is_finite() => (mean, std),
            // Squared deviations overflowed, redo the sums in units of the largest magnitude
            _ => {
                let scale = samples.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
                let (mean, std) = Self::moments(samples, scale);
                (mean * scale, std * scale)
            }
        };
        Self {
            min,
            max,
            mean,
            std,
        }
    }

    /// Mean and population std of `samples / scale`
    fn moments(samples: &[f64], scale: f64) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().map(|v| v / scale).sum::<f64>() / n;
        let variance = samples
            .iter()
            .map(|v| (v / scale - mean).powi(2))
            .sum::<f64>()
            / n;
        (mean, variance.sqrt())
    }
}

/// Persisted per-feature scaling parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizationConfig {
    features: BTreeMap<String, FeatureScaling>,
}

impl NormalizationConfig {
    /// Whether no feature is configured
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of configured features
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Scaling parameters for a feature
    pub fn get(&self, key: &str) -> Option<&FeatureScaling> {
        self.features.get(key)
    }

    /// Iterate over configured features in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureScaling)> {
        self.features.iter()
    }

    /// SHA-256 of the canonical JSON encoding, hex encoded
    ///
    /// Identifies the scaling a policy was trained against.
    pub fn fingerprint(&self) -> String {
        // BTreeMap keys and fixed field order make the encoding canonical
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Write the config as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| {
            SimError::Normalization(format!("Failed to write {}: {}", path.display(), e))
        })?;
        info!(
            "Saved normalization config ({} features, {}) to {}",
            self.len(),
            &self.fingerprint()[..12],
            path.display()
        );
        Ok(())
    }

    /// Read and validate a config file
    ///
    /// Fails without side effects if the file is missing, malformed, empty,
    /// or internally inconsistent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| SimError::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        let config: NormalizationConfig = serde_json::from_str(&json)
            .map_err(|e| SimError::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        config.validate().map_err(SimError::ConfigLoad)?;
        info!(
            "Loaded normalization config ({} features, {}) from {}",
            config.len(),
            &config.fingerprint()[..12],
            path.display()
        );
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.is_empty() {
            return Err("config contains no features".into());
        }
        self.features
            .iter()
            .try_for_each(|(key, scaling)| scaling.validate(key))
    }
}

/// Recorded samples for one feature, one column per element index
#[derive(Debug)]
struct SampleColumns {
    is_vector: bool,
    columns: Vec<Vec<f64>>,
}

/// Records feature statistics, then scales observations with them
#[derive(Debug)]
pub struct ObservationNormalizer {
    /// Samples recorded before the config exists
    value_cache: BTreeMap<String, SampleColumns>,
    /// Scaling parameters; non-empty means scaling mode
    config: NormalizationConfig,
    /// Keys never recorded or scaled
    exclude_keys: HashSet<String>,
    /// Observations recorded so far
    samples: usize,
}

impl ObservationNormalizer {
    /// Create a normalizer in recording mode
    pub fn new<I, S>(exclude_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            value_cache: BTreeMap::new(),
            config: NormalizationConfig::default(),
            exclude_keys: exclude_keys.into_iter().map(Into::into).collect(),
            samples: 0,
        }
    }

    /// Normalizer for [`SimState::features`](crate::SimState::features),
    /// excluding the discrete features
    pub fn for_sim_state() -> Self {
        Self::new(DISCRETE_FEATURES.iter().copied())
    }

    /// Whether observations are still being recorded
    pub fn is_recording(&self) -> bool {
        self.config.is_empty()
    }

    /// Current config (empty while recording)
    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// Number of observations recorded
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Whether a key is excluded from normalization
    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude_keys.contains(key)
    }

    /// Record or scale an observation, depending on mode
    pub fn apply(&mut self, features: Features) -> Result<Features> {
        if self.is_recording() {
            self.record(&features)?;
            Ok(features)
        } else {
            self.scale(features)
        }
    }

    /// Reduce the recorded samples into a config and switch to scaling mode
    pub fn build_config(&mut self, kind: ScalingKind) -> Result<&NormalizationConfig> {
        if !self.is_recording() {
            return Err(SimError::Normalization(
                "Normalization config already built".into(),
            ));
        }
        if self.value_cache.is_empty() {
            return Err(SimError::Normalization(
                "No observations recorded, cannot build config".into(),
            ));
        }

        let config = NormalizationConfig {
            features: self
                .value_cache
                .iter()
                .map(|(key, samples)| {
                    let scaling =
                        FeatureScaling::from_samples(&samples.columns, samples.is_vector, kind);
                    (key.clone(), scaling)
                })
                .collect(),
        };
        // Samples are kept when the config is unusable
        config.validate().map_err(|e| {
            SimError::Normalization(format!("Recorded samples give an unusable config: {}", e))
        })?;
        self.value_cache.clear();
        self.config = config;
        info!(
            "Built {:?} normalization config over {} observations ({} features)",
            kind,
            self.samples,
            self.config.len()
        );
        Ok(&self.config)
    }

    /// Load a persisted config, switching to scaling mode
    ///
    /// On failure the normalizer is left exactly as it was.
    pub fn load_config(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let config = NormalizationConfig::load(path)?;
        self.value_cache.clear();
        self.config = config;
        Ok(())
    }

    /// Persist the current config
    pub fn save_config(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_recording() {
            return Err(SimError::Normalization(
                "Nothing to save, normalization config not built".into(),
            ));
        }
        self.config.save(path)
    }

    fn record(&mut self, features: &Features) -> Result<()> {
        // Validate shapes before touching the cache so a bad observation
        // is rejected as a whole
        for (key, value) in features {
            if self.is_excluded(key) {
                continue;
            }
            if let Some(existing) = self.value_cache.get(key) {
                if existing.is_vector != value.is_vector()
                    || existing.columns.len() != value.len()
                {
                    return Err(SimError::FeatureShape(format!(
                        "{}: recorded {} of length {}, got {} of length {}",
                        key,
                        shape_name(existing.is_vector),
                        existing.columns.len(),
                        shape_name(value.is_vector()),
                        value.len()
                    )));
                }
            } else if value.is_empty() {
                return Err(SimError::FeatureShape(format!("{}: empty vector", key)));
            }
        }

        for (key, value) in features {
            if self.is_excluded(key) {
                continue;
            }
            let entry = self
                .value_cache
                .entry(key.clone())
                .or_insert_with(|| SampleColumns {
                    is_vector: value.is_vector(),
                    columns: vec![Vec::new(); value.len()],
                });
            for (column, &v) in entry.columns.iter_mut().zip(value.as_slice()) {
                column.push(v);
            }
        }
        self.samples += 1;
        Ok(())
    }

    fn scale(&self, mut features: Features) -> Result<Features> {
        for (key, value) in features.iter_mut() {
            if self.is_excluded(key) {
                continue;
            }
            let Some(scaling) = self.config.get(key) else {
                debug!("No normalization config for {}, passing through", key);
                continue;
            };
            *value = scaling.apply(key, value)?;
        }
        Ok(features)
    }
}
