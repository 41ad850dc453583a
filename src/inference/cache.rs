//! Model cache.
//!
//! Owns the primary disease classifier and the optional gatekeeper. Each is
//! loaded at most once, on first use, and whatever the first load produced
//! (a real model, the mock, or nothing) stays for the life of the cache.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::{info, warn};

use super::classifier::{BurnClassifier, DiseaseClassifier, MockPredictor};
use super::gatekeeper::{ContentClassifier, OnnxGatekeeper};
use super::labels::{LabelRegistry, LabelSource};
use crate::config::{AdvisorConfig, DiseaseModelConfig, GatekeeperConfig};
use crate::model::CropDiseaseNetConfig;
use crate::utils::error::Result;
use crate::utils::load_with_timeout;

/// Builds models from artifacts. Swapped out in tests.
pub trait ModelLoader: Send + Sync {
    fn load_classifier(
        &self,
        config: &DiseaseModelConfig,
        num_classes: usize,
    ) -> Result<Box<dyn DiseaseClassifier>>;

    fn load_gatekeeper(&self, config: &GatekeeperConfig) -> Result<Box<dyn ContentClassifier>>;
}

/// Loads the Burn classifier and the ONNX gatekeeper from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactLoader;

impl ModelLoader for ArtifactLoader {
    fn load_classifier(
        &self,
        config: &DiseaseModelConfig,
        num_classes: usize,
    ) -> Result<Box<dyn DiseaseClassifier>> {
        let net_config = CropDiseaseNetConfig::new().with_num_classes(num_classes);
        Ok(Box::new(BurnClassifier::load(&config.model_path, &net_config)?))
    }

    fn load_gatekeeper(&self, config: &GatekeeperConfig) -> Result<Box<dyn ContentClassifier>> {
        Ok(Box::new(OnnxGatekeeper::load(config)?))
    }
}

/// The cached primary model.
pub enum PrimaryModel {
    Loaded(Box<dyn DiseaseClassifier>),
    Mock { predictor: MockPredictor, reason: String },
}

impl PrimaryModel {
    pub fn is_mock(&self) -> bool {
        matches!(self, PrimaryModel::Mock { .. })
    }
}

impl fmt::Debug for PrimaryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryModel::Loaded(classifier) => f
                .debug_struct("Loaded")
                .field("backend", &classifier.backend())
                .field("num_classes", &classifier.num_classes())
                .finish(),
            PrimaryModel::Mock { reason, .. } => {
                f.debug_struct("Mock").field("reason", reason).finish()
            }
        }
    }
}

enum GatekeeperSlot {
    Ready(Box<dyn ContentClassifier>),
    Disabled,
    Unavailable(String),
}

/// State of the primary model as seen by a health check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelState {
    NotLoaded,
    Ready { backend: String },
    Mock { reason: String },
}

/// State of the gatekeeper as seen by a health check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GatekeeperState {
    NotLoaded,
    Ready,
    Disabled,
    Unavailable { reason: String },
}

/// Classifier output width disagrees with the label registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelMismatch {
    pub model_classes: usize,
    pub labels: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub primary: ModelState,
    pub gatekeeper: GatekeeperState,
    pub label_count: usize,
    pub label_source: LabelSource,
    pub label_mismatch: Option<LabelMismatch>,
    pub degraded: bool,
}

/// Lazily loaded models shared by every request.
pub struct ModelCache {
    disease: DiseaseModelConfig,
    gatekeeper_config: GatekeeperConfig,
    labels: Arc<LabelRegistry>,
    loader: Arc<dyn ModelLoader>,
    primary: OnceLock<PrimaryModel>,
    gatekeeper: OnceLock<GatekeeperSlot>,
}

impl ModelCache {
    pub fn new(config: &AdvisorConfig, labels: Arc<LabelRegistry>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            disease: config.disease.clone(),
            gatekeeper_config: config.gatekeeper.clone(),
            labels,
            loader,
            primary: OnceLock::new(),
            gatekeeper: OnceLock::new(),
        }
    }

    pub fn labels(&self) -> &Arc<LabelRegistry> {
        &self.labels
    }

    /// The primary model, loading it on first call.
    ///
    /// Concurrent first callers wait for a single load. A failed load leaves
    /// the mock installed for good.
    pub fn primary(&self) -> &PrimaryModel {
        self.primary.get_or_init(|| self.load_primary())
    }

    /// The gatekeeper, if enabled and loadable.
    pub fn gatekeeper(&self) -> Option<&dyn ContentClassifier> {
        match self.gatekeeper.get_or_init(|| self.load_gatekeeper()) {
            GatekeeperSlot::Ready(gatekeeper) => Some(gatekeeper.as_ref()),
            GatekeeperSlot::Disabled | GatekeeperSlot::Unavailable(_) => None,
        }
    }

    /// Resolve both models now instead of on the first request.
    pub fn warm_up(&self) {
        let primary = self.primary();
        let gatekeeper = self.gatekeeper().is_some();
        info!(
            "Model cache warm: primary {}, gatekeeper {}",
            if primary.is_mock() { "mock" } else { "ready" },
            if gatekeeper { "ready" } else { "off" }
        );
    }

    /// Whether the mock is serving predictions. False until the first load.
    pub fn is_degraded(&self) -> bool {
        self.primary.get().is_some_and(PrimaryModel::is_mock)
    }

    /// Snapshot for health checks. Never triggers a load.
    pub fn status(&self) -> CacheStatus {
        let primary = match self.primary.get() {
            None => ModelState::NotLoaded,
            Some(PrimaryModel::Loaded(classifier)) => ModelState::Ready {
                backend: classifier.backend().to_string(),
            },
            Some(PrimaryModel::Mock { reason, .. }) => ModelState::Mock {
                reason: reason.clone(),
            },
        };

        CacheStatus {
            primary,
            gatekeeper: self.gatekeeper_state(),
            label_count: self.labels.len(),
            label_source: self.labels.source().clone(),
            label_mismatch: self.label_mismatch(),
            degraded: self.is_degraded(),
        }
    }

    /// Gatekeeper state without triggering a load.
    pub fn gatekeeper_state(&self) -> GatekeeperState {
        match self.gatekeeper.get() {
            None if !self.gatekeeper_config.policy.enabled() => GatekeeperState::Disabled,
            None => GatekeeperState::NotLoaded,
            Some(GatekeeperSlot::Ready(_)) => GatekeeperState::Ready,
            Some(GatekeeperSlot::Disabled) => GatekeeperState::Disabled,
            Some(GatekeeperSlot::Unavailable(reason)) => GatekeeperState::Unavailable {
                reason: reason.clone(),
            },
        }
    }

    fn label_mismatch(&self) -> Option<LabelMismatch> {
        match self.primary.get() {
            Some(PrimaryModel::Loaded(classifier)) if classifier.num_classes() != self.labels.len() => {
                Some(LabelMismatch {
                    model_classes: classifier.num_classes(),
                    labels: self.labels.len(),
                })
            }
            _ => None,
        }
    }

    fn load_primary(&self) -> PrimaryModel {
        let num_classes = self.disease.num_classes.unwrap_or(self.labels.len());
        let loader = Arc::clone(&self.loader);
        let config = self.disease.clone();

        let loaded = load_with_timeout("disease classifier", self.disease.load_timeout(), move || {
            loader.load_classifier(&config, num_classes)
        });

        match loaded {
            Ok(classifier) => {
                info!(
                    "Disease classifier ready on {} ({} classes)",
                    classifier.backend(),
                    classifier.num_classes()
                );
                if classifier.num_classes() != self.labels.len() {
                    warn!(
                        "Classifier outputs {} classes but {} labels are registered",
                        classifier.num_classes(),
                        self.labels.len()
                    );
                }
                PrimaryModel::Loaded(classifier)
            }
            Err(e) => {
                warn!("Disease classifier unavailable ({}); using mock predictor", e);
                PrimaryModel::Mock {
                    predictor: MockPredictor::new(&self.disease.mock),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn load_gatekeeper(&self) -> GatekeeperSlot {
        if !self.gatekeeper_config.policy.enabled() {
            info!("Gatekeeper disabled by policy {:?}", self.gatekeeper_config.policy);
            return GatekeeperSlot::Disabled;
        }

        let loader = Arc::clone(&self.loader);
        let config = self.gatekeeper_config.clone();
        let loaded = load_with_timeout("gatekeeper", self.gatekeeper_config.load_timeout(), move || {
            loader.load_gatekeeper(&config)
        });

        match loaded {
            Ok(gatekeeper) => GatekeeperSlot::Ready(gatekeeper),
            Err(e) => {
                warn!("Gatekeeper unavailable ({}); content checks are off", e);
                GatekeeperSlot::Unavailable(e.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::GatekeeperPolicy;
    use crate::inference::gatekeeper::ContentPrediction;
    use crate::inference::tensor::ImageTensor;
    use crate::utils::error::AdvisorError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    /// Classifier that returns a fixed vector or a fixed error.
    pub(crate) struct StubClassifier {
        pub probs: std::result::Result<Vec<f64>, String>,
        pub seen: Arc<Mutex<Vec<ImageTensor>>>,
    }

    impl DiseaseClassifier for StubClassifier {
        fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f64>> {
            self.seen.lock().unwrap().push(tensor.clone());
            self.probs.clone().map_err(AdvisorError::Inference)
        }

        fn num_classes(&self) -> usize {
            self.probs.as_ref().map(Vec::len).unwrap_or(0)
        }

        fn backend(&self) -> &str {
            "stub"
        }
    }

    pub(crate) struct StubGatekeeper {
        pub labels: std::result::Result<Vec<&'static str>, String>,
    }

    impl ContentClassifier for StubGatekeeper {
        fn top_k(&self, _tensor: &ImageTensor, k: usize) -> Result<Vec<ContentPrediction>> {
            let labels = self.labels.clone().map_err(AdvisorError::Inference)?;
            Ok(labels
                .into_iter()
                .take(k)
                .map(|label| ContentPrediction {
                    label: label.to_string(),
                    probability: 0.3,
                })
                .collect())
        }
    }

    /// Loader handing out stubs, counting how often it is asked.
    pub(crate) struct StubLoader {
        pub probs: Option<Vec<f64>>,
        pub predict_error: Option<String>,
        pub gatekeeper_labels: Option<Vec<&'static str>>,
        pub gatekeeper_error: Option<String>,
        pub delay: Duration,
        /// Tensors handed to the classifier
        pub seen: Arc<Mutex<Vec<ImageTensor>>>,
        pub classifier_loads: AtomicUsize,
        pub gatekeeper_loads: AtomicUsize,
    }

    impl Default for StubLoader {
        fn default() -> Self {
            Self {
                probs: None,
                predict_error: None,
                gatekeeper_labels: None,
                gatekeeper_error: None,
                delay: Duration::ZERO,
                seen: Arc::new(Mutex::new(Vec::new())),
                classifier_loads: AtomicUsize::new(0),
                gatekeeper_loads: AtomicUsize::new(0),
            }
        }
    }

    impl ModelLoader for StubLoader {
        fn load_classifier(
            &self,
            config: &DiseaseModelConfig,
            _num_classes: usize,
        ) -> Result<Box<dyn DiseaseClassifier>> {
            self.classifier_loads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            let probs = match (&self.predict_error, &self.probs) {
                (Some(message), _) => Err(message.clone()),
                (None, Some(probs)) => Ok(probs.clone()),
                (None, None) => return Err(AdvisorError::PathNotFound(config.model_path.clone())),
            };
            Ok(Box::new(StubClassifier {
                probs,
                seen: Arc::clone(&self.seen),
            }))
        }

        fn load_gatekeeper(&self, config: &GatekeeperConfig) -> Result<Box<dyn ContentClassifier>> {
            self.gatekeeper_loads.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = &self.gatekeeper_error {
                return Ok(Box::new(StubGatekeeper {
                    labels: Err(message.clone()),
                }));
            }
            match &self.gatekeeper_labels {
                Some(labels) => Ok(Box::new(StubGatekeeper {
                    labels: Ok(labels.clone()),
                })),
                None => Err(AdvisorError::PathNotFound(config.model_path.clone())),
            }
        }
    }

    fn cache_with(loader: Arc<StubLoader>, config: AdvisorConfig) -> ModelCache {
        ModelCache::new(&config, Arc::new(LabelRegistry::built_in()), loader)
    }

    #[test]
    fn test_missing_model_falls_back_to_mock_once() {
        let loader = Arc::new(StubLoader::default());
        let cache = cache_with(Arc::clone(&loader), AdvisorConfig::default());

        assert_eq!(cache.status().primary, ModelState::NotLoaded);
        assert!(!cache.is_degraded());

        assert!(cache.primary().is_mock());
        assert!(cache.primary().is_mock());
        assert_eq!(loader.classifier_loads.load(Ordering::SeqCst), 1);

        let status = cache.status();
        assert!(status.degraded);
        match status.primary {
            ModelState::Mock { reason } => assert!(reason.contains("disease_model.mpk")),
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_loaded_model_reports_ready() {
        let loader = Arc::new(StubLoader {
            probs: Some(vec![1.0 / 48.0; 48]),
            ..StubLoader::default()
        });
        let cache = cache_with(loader, AdvisorConfig::default());

        assert!(!cache.primary().is_mock());
        let status = cache.status();
        assert_eq!(
            status.primary,
            ModelState::Ready {
                backend: "stub".to_string()
            }
        );
        assert_eq!(status.label_count, 48);
        assert_eq!(status.label_mismatch, None);
        assert!(!status.degraded);
    }

    #[test]
    fn test_label_mismatch_is_reported() {
        let loader = Arc::new(StubLoader {
            probs: Some(vec![0.25; 4]),
            ..StubLoader::default()
        });
        let cache = cache_with(loader, AdvisorConfig::default());
        cache.warm_up();

        assert_eq!(
            cache.status().label_mismatch,
            Some(LabelMismatch {
                model_classes: 4,
                labels: 48
            })
        );
    }

    #[test]
    fn test_concurrent_cold_start_loads_once() {
        let loader = Arc::new(StubLoader {
            probs: Some(vec![0.5, 0.5]),
            delay: Duration::from_millis(50),
            ..StubLoader::default()
        });
        let cache = cache_with(Arc::clone(&loader), AdvisorConfig::default());

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    assert!(!cache.primary().is_mock());
                });
            }
        });

        assert_eq!(loader.classifier_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slow_load_times_out_to_mock() {
        let loader = Arc::new(StubLoader {
            probs: Some(vec![0.5, 0.5]),
            delay: Duration::from_millis(1500),
            ..StubLoader::default()
        });
        let mut config = AdvisorConfig::default();
        config.disease.load_timeout_secs = 1;
        let cache = cache_with(loader, config);

        match cache.primary() {
            PrimaryModel::Mock { reason, .. } => assert!(reason.contains("Timed out")),
            other => panic!("unexpected model: {:?}", other),
        }
    }

    #[test]
    fn test_gatekeeper_disabled_by_policy_never_loads() {
        let loader = Arc::new(StubLoader {
            gatekeeper_labels: Some(vec!["pot"]),
            ..StubLoader::default()
        });
        let mut config = AdvisorConfig::default();
        config.gatekeeper.policy = GatekeeperPolicy {
            memory_constrained: true,
            override_enabled: None,
        };
        let cache = cache_with(Arc::clone(&loader), config);

        assert_eq!(cache.status().gatekeeper, GatekeeperState::Disabled);
        assert!(cache.gatekeeper().is_none());
        assert_eq!(loader.gatekeeper_loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_gatekeeper_failure_is_absent_not_error() {
        let loader = Arc::new(StubLoader::default());
        let cache = cache_with(Arc::clone(&loader), AdvisorConfig::default());

        assert_eq!(cache.gatekeeper_state(), GatekeeperState::NotLoaded);
        assert!(cache.gatekeeper().is_none());
        assert!(cache.gatekeeper().is_none());
        assert_eq!(loader.gatekeeper_loads.load(Ordering::SeqCst), 1);
        assert!(matches!(
            cache.status().gatekeeper,
            GatekeeperState::Unavailable { .. }
        ));
    }

    #[test]
    fn test_gatekeeper_ready() {
        let loader = Arc::new(StubLoader {
            gatekeeper_labels: Some(vec!["daisy"]),
            ..StubLoader::default()
        });
        let cache = cache_with(loader, AdvisorConfig::default());

        assert!(cache.gatekeeper().is_some());
        assert_eq!(cache.status().gatekeeper, GatekeeperState::Ready);
    }
}
