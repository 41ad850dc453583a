//! Configuration for the advisory core.
//!
//! Settings come from [`AdvisorConfig::default`], optionally a JSON file, and
//! finally environment variables, which always win.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::inference::tensor::{PreprocessMode, DEFAULT_INPUT_SIZE};
use crate::utils::error::{AdvisorError, Result, ResultExt};
use crate::utils::is_truthy;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Primary disease classifier
    pub disease: DiseaseModelConfig,
    /// Content-verification model
    pub gatekeeper: GatekeeperConfig,
    /// Yield regressor
    pub yield_model: YieldModelConfig,
}

/// Disease classifier and decision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiseaseModelConfig {
    /// Burn record of the classifier (`.mpk`)
    pub model_path: PathBuf,
    /// `index: label` text file
    pub labels_path: Option<PathBuf>,
    /// Output width of the network; defaults to the label count
    pub num_classes: Option<usize>,
    /// Square input edge in pixels
    pub input_size: u32,
    /// Preprocessing the classifier was trained with
    pub preprocess: PreprocessMode,
    /// Percent confidence below which a prediction is rejected
    pub confidence_threshold: f64,
    /// Crop alias table (JSON); built-in aliases when unset
    pub crop_aliases_path: Option<PathBuf>,
    /// Mock predictor settings
    pub mock: MockConfig,
    /// Upper bound on artifact loading
    pub load_timeout_secs: u64,
}

impl Default for DiseaseModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/disease_model.mpk"),
            labels_path: Some(PathBuf::from("models/class_labels.txt")),
            num_classes: None,
            input_size: DEFAULT_INPUT_SIZE,
            preprocess: PreprocessMode::MobileNetV2,
            confidence_threshold: 45.0,
            crop_aliases_path: None,
            mock: MockConfig::default(),
            load_timeout_secs: 60,
        }
    }
}

impl DiseaseModelConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

/// Deterministic stand-in used when the classifier cannot be loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Reported confidence in percent
    pub confidence: f64,
    /// Label index returned when no crop filter matches
    pub default_index: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            confidence: 85.5,
            default_index: 29,
        }
    }
}

/// Memory layout the gatekeeper network expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    #[default]
    Nhwc,
    Nchw,
}

/// Gatekeeper enablement inputs.
///
/// The override always wins; without it the gatekeeper is on unless the
/// deployment is memory constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperPolicy {
    pub memory_constrained: bool,
    pub override_enabled: Option<bool>,
}

impl GatekeeperPolicy {
    pub fn enabled(&self) -> bool {
        self.override_enabled.unwrap_or(!self.memory_constrained)
    }
}

/// Content-verification model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// ONNX ImageNet classifier
    pub model_path: PathBuf,
    /// Synset file, one class per line
    pub labels_path: PathBuf,
    pub policy: GatekeeperPolicy,
    pub input_size: u32,
    pub layout: TensorLayout,
    /// Predictions checked against the keyword vocabulary
    pub top_k: usize,
    pub load_timeout_secs: u64,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/gatekeeper.onnx"),
            labels_path: PathBuf::from("models/imagenet_classes.txt"),
            policy: GatekeeperPolicy::default(),
            input_size: DEFAULT_INPUT_SIZE,
            layout: TensorLayout::Nhwc,
            top_k: 3,
            load_timeout_secs: 60,
        }
    }
}

impl GatekeeperConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

/// Yield regressor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YieldModelConfig {
    /// linfa linear model serialized as JSON (`.json` or `.json.gz`)
    pub model_path: PathBuf,
    /// Always use the rule-based estimate
    pub skip_model: bool,
    pub load_timeout_secs: u64,
}

impl Default for YieldModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yield_model.json"),
            skip_model: false,
            load_timeout_secs: 30,
        }
    }
}

impl YieldModelConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

impl AdvisorConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AdvisorError::PathNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Defaults (or `path`), overlaid with the process environment, validated.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay variables looked up through `lookup`.
    ///
    /// Taking a lookup function keeps tests away from the real environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        if let Some(p) = path("DISEASE_MODEL_PATH") {
            self.disease.model_path = p;
        }
        if let Some(p) = path("CLASS_LABELS_PATH") {
            self.disease.labels_path = Some(p);
        }
        if let Some(p) = path("CROP_ALIASES_PATH") {
            self.disease.crop_aliases_path = Some(p);
        }
        if let Some(p) = path("GATEKEEPER_MODEL_PATH") {
            self.gatekeeper.model_path = p;
        }
        if let Some(p) = path("GATEKEEPER_LABELS_PATH") {
            self.gatekeeper.labels_path = p;
        }
        if let Some(p) = path("YIELD_MODEL_PATH") {
            self.yield_model.model_path = p;
        }

        if let Some(v) = lookup("RENDER") {
            self.gatekeeper.policy.memory_constrained = is_truthy(&v);
        }
        if let Some(v) = lookup("ENABLE_GATEKEEPER") {
            self.gatekeeper.policy.override_enabled = Some(is_truthy(&v));
        }
        if let Some(v) = lookup("SKIP_YIELD_MODEL") {
            self.yield_model.skip_model = is_truthy(&v);
        }

        debug!(
            "Gatekeeper policy after environment: {:?} (enabled: {})",
            self.gatekeeper.policy,
            self.gatekeeper.policy.enabled()
        );
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.disease.confidence_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(AdvisorError::Config(format!(
                "confidence_threshold must be within [0, 100], got {}",
                threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.disease.mock.confidence) {
            return Err(AdvisorError::Config(format!(
                "mock confidence must be within [0, 100], got {}",
                self.disease.mock.confidence
            )));
        }
        if self.disease.input_size == 0 || self.gatekeeper.input_size == 0 {
            return Err(AdvisorError::Config("input_size must be positive".to_string()));
        }
        if self.disease.num_classes == Some(0) {
            return Err(AdvisorError::Config("num_classes must be positive".to_string()));
        }
        if self.gatekeeper.top_k == 0 {
            return Err(AdvisorError::Config("gatekeeper top_k must be positive".to_string()));
        }
        if self.disease.load_timeout_secs == 0
            || self.gatekeeper.load_timeout_secs == 0
            || self.yield_model.load_timeout_secs == 0
        {
            return Err(AdvisorError::Config("load timeouts must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AdvisorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.disease.confidence_threshold, 45.0);
        assert_eq!(config.disease.mock.confidence, 85.5);
        assert_eq!(config.disease.mock.default_index, 29);
        assert_eq!(config.gatekeeper.top_k, 3);
        assert!(config.gatekeeper.policy.enabled());
    }

    #[test]
    fn test_gatekeeper_policy_table() {
        let policy = |memory_constrained, override_enabled| GatekeeperPolicy {
            memory_constrained,
            override_enabled,
        };
        assert!(policy(false, None).enabled());
        assert!(!policy(true, None).enabled());
        assert!(policy(true, Some(true)).enabled());
        assert!(!policy(false, Some(false)).enabled());
    }

    #[test]
    fn test_render_disables_gatekeeper() {
        let mut config = AdvisorConfig::default();
        config.apply_env(env_of(&[("RENDER", "true")]));
        assert!(!config.gatekeeper.policy.enabled());
    }

    #[test]
    fn test_override_wins_over_render() {
        let mut config = AdvisorConfig::default();
        config.apply_env(env_of(&[("RENDER", "1"), ("ENABLE_GATEKEEPER", "YES")]));
        assert!(config.gatekeeper.policy.enabled());

        let mut config = AdvisorConfig::default();
        config.apply_env(env_of(&[("ENABLE_GATEKEEPER", "false")]));
        assert!(!config.gatekeeper.policy.enabled());
    }

    #[test]
    fn test_env_paths_and_flags() {
        let mut config = AdvisorConfig::default();
        config.apply_env(env_of(&[
            ("DISEASE_MODEL_PATH", "/srv/models/cnn.mpk"),
            ("CLASS_LABELS_PATH", "/srv/models/labels.txt"),
            ("YIELD_MODEL_PATH", "  "),
            ("SKIP_YIELD_MODEL", "True"),
        ]));
        assert_eq!(config.disease.model_path, PathBuf::from("/srv/models/cnn.mpk"));
        assert_eq!(config.disease.labels_path, Some(PathBuf::from("/srv/models/labels.txt")));
        assert_eq!(config.yield_model.model_path, PathBuf::from("models/yield_model.json"));
        assert!(config.yield_model.skip_model);
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"disease": {{"confidence_threshold": 60.0, "preprocess": "image_net"}}, "gatekeeper": {{"layout": "nchw"}}}}"#
        )
        .unwrap();

        let config = AdvisorConfig::load(file.path()).unwrap();
        assert_eq!(config.disease.confidence_threshold, 60.0);
        assert_eq!(config.disease.preprocess, PreprocessMode::ImageNet);
        assert_eq!(config.disease.input_size, 224);
        assert_eq!(config.gatekeeper.layout, TensorLayout::Nchw);
        assert_eq!(config.gatekeeper.top_k, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AdvisorConfig::load(Path::new("/no/such/config.json")).unwrap_err();
        assert!(matches!(err, AdvisorError::PathNotFound(_)));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = AdvisorConfig::default();
        config.disease.confidence_threshold = 120.0;
        assert!(matches!(config.validate(), Err(AdvisorError::Config(_))));
    }
}
