//! Disease classifiers.
//!
//! [`DiseaseClassifier`] is the seam between the decision pipeline and an
//! inference backend. The real implementation restores a Burn record; the
//! [`MockPredictor`] stands in when no artifact can be loaded.

use std::path::Path;
use std::sync::Mutex;

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::{Tensor, TensorData};
use tracing::info;

use super::labels::LabelRegistry;
use super::tensor::ImageTensor;
use crate::backend::{backend_name, default_device, InferenceBackend, InferenceDevice};
use crate::config::MockConfig;
use crate::model::{CropDiseaseNet, CropDiseaseNetConfig};
use crate::utils::error::{AdvisorError, Result};

/// Produces a class probability vector for a preprocessed image.
pub trait DiseaseClassifier: Send + Sync {
    /// Probabilities, one per class, for an already preprocessed tensor.
    fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f64>>;

    /// Width of the output vector.
    fn num_classes(&self) -> usize;

    /// Human-readable backend description for status reports.
    fn backend(&self) -> &str;
}

/// [`CropDiseaseNet`] restored from a `CompactRecorder` record.
pub struct BurnClassifier {
    // Burn modules are Send but not Sync
    model: Mutex<CropDiseaseNet<InferenceBackend>>,
    device: InferenceDevice,
    num_classes: usize,
}

impl BurnClassifier {
    /// Load weights for a network shaped by `config`.
    pub fn load(path: &Path, config: &CropDiseaseNetConfig) -> Result<Self> {
        if !path.exists() {
            return Err(AdvisorError::PathNotFound(path.to_path_buf()));
        }

        let device = default_device();
        let recorder = CompactRecorder::new();
        let model = CropDiseaseNet::<InferenceBackend>::new(config, &device)
            .load_file(path, &recorder, &device)
            .map_err(|e| AdvisorError::ModelLoad(path.to_path_buf(), format!("{:?}", e)))?;

        info!(
            "Loaded disease classifier from {} ({} classes, {})",
            path.display(),
            config.num_classes,
            backend_name()
        );
        Ok(Self::from_model(model, device))
    }

    /// Wrap an in-memory network.
    pub fn from_model(model: CropDiseaseNet<InferenceBackend>, device: InferenceDevice) -> Self {
        let num_classes = model.num_classes();
        Self {
            model: Mutex::new(model),
            device,
            num_classes,
        }
    }
}

impl DiseaseClassifier for BurnClassifier {
    fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f64>> {
        let [batch, height, width, channels] = tensor.shape();
        let input = Tensor::<InferenceBackend, 4>::from_data(
            TensorData::new(tensor.to_chw(), [batch, channels, height, width]),
            &self.device,
        );

        let model = self
            .model
            .lock()
            .map_err(|_| AdvisorError::Inference("classifier lock poisoned".to_string()))?;
        let probs: Vec<f32> = model
            .forward_softmax(input)
            .into_data()
            .to_vec()
            .map_err(|e| AdvisorError::Inference(format!("{:?}", e)))?;

        Ok(probs.into_iter().map(f64::from).collect())
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn backend(&self) -> &str {
        backend_name()
    }
}

/// Deterministic stand-in for the disease classifier.
#[derive(Debug, Clone)]
pub struct MockPredictor {
    confidence: f64,
    default_index: usize,
}

impl Default for MockPredictor {
    fn default() -> Self {
        Self::new(&MockConfig::default())
    }
}

impl MockPredictor {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            confidence: config.confidence,
            default_index: config.default_index,
        }
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Index of the first label containing `crop_filter` (case-insensitive),
    /// otherwise the default index clamped into range.
    pub fn predict_index(&self, labels: &LabelRegistry, crop_filter: Option<&str>) -> usize {
        let filter = crop_filter
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty());

        if let Some(filter) = filter {
            if let Some(index) = labels
                .iter()
                .position(|label| label.to_lowercase().contains(&filter))
            {
                return index;
            }
        }

        self.default_index.min(labels.len().saturating_sub(1))
    }
}
