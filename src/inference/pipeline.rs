//! Disease classification pipeline.
//!
//! Turns an image tensor into a [`PredictionResult`]:
//!
//! 1. mock short-circuit when no real classifier is loaded
//! 2. content gate (fail-open)
//! 3. range normalization and model preprocessing
//! 4. inference
//! 5. crop masking
//! 6. argmax decision
//! 7. confidence threshold
//! 8. label formatting
//!
//! Every outcome, including backend errors, is reported through the result
//! rather than returned as an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cache::{GatekeeperState, ModelCache, PrimaryModel};
use super::classifier::{DiseaseClassifier, MockPredictor};
use super::crop_filter::{apply_mask, CropAliases};
use super::gatekeeper::{check_content, GateOutcome};
use super::labels::LabelRegistry;
use super::tensor::{decode_upload, ImageTensor, PreprocessMode};
use crate::config::AdvisorConfig;
use crate::utils::error::Result;
use crate::utils::round_to;

/// Name reported when the content gate rejects an image
pub const INVALID_DATA: &str = "Invalid data";
/// Raw label reported when the content gate rejects an image
pub const INVALID_CONTENT_LABEL: &str = "invalid_content";
/// Name reported for low-confidence predictions
pub const CROP_NOT_TRAINED: &str = "Crop Not Trained";
/// Name reported when inference itself fails
pub const INFERENCE_ERROR: &str = "Error";

/// Outcome of one classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub success: bool,
    pub disease_name: String,
    /// Percent, always within `[0, 100]`
    pub confidence: f64,
    pub is_healthy: bool,
    pub raw_label: String,
    /// Present whenever `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-fatal diagnostics, such as a skipped content check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl PredictionResult {
    fn accepted(raw_label: &str, confidence: f64) -> Self {
        Self {
            success: true,
            disease_name: format_label(raw_label),
            confidence: round_to(confidence, 2),
            is_healthy: is_healthy_label(raw_label),
            raw_label: raw_label.to_string(),
            error: None,
            notice: None,
        }
    }

    fn low_confidence(raw_label: &str, confidence: f64) -> Self {
        Self {
            success: false,
            disease_name: CROP_NOT_TRAINED.to_string(),
            confidence: round_to(confidence, 2),
            is_healthy: false,
            raw_label: raw_label.to_string(),
            error: Some(format!(
                "Low confidence ({:.1}%). This crop looks unsupported.",
                round_to(confidence, 1)
            )),
            notice: None,
        }
    }

    fn invalid_content(top_label: &str) -> Self {
        Self {
            success: false,
            disease_name: INVALID_DATA.to_string(),
            confidence: 0.0,
            is_healthy: false,
            raw_label: INVALID_CONTENT_LABEL.to_string(),
            error: Some(format!(
                "Image appears to be '{}', not a crop leaf.",
                top_label.replace('_', " ")
            )),
            notice: None,
        }
    }

    fn inference_error(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = "inference failed".to_string();
        }
        Self {
            success: false,
            disease_name: INFERENCE_ERROR.to_string(),
            confidence: 0.0,
            is_healthy: false,
            raw_label: String::new(),
            error: Some(message),
            notice: None,
        }
    }

    fn with_notice(mut self, notice: Option<String>) -> Self {
        self.notice = notice;
        self
    }
}

/// `"Tomato___Early_blight"` to `"Tomato Early Blight"`.
///
/// Separators become spaces, each word starts upper case with the rest lower
/// case, and runs of whitespace collapse.
pub fn format_label(raw_label: &str) -> String {
    let spaced = raw_label.replace("___", " ").replace('_', " ");

    let mut titled = String::with_capacity(spaced.len());
    let mut prev_is_letter = false;
    for c in spaced.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                titled.extend(c.to_lowercase());
            } else {
                titled.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            titled.push(c);
            prev_is_letter = false;
        }
    }

    titled.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_healthy_label(raw_label: &str) -> bool {
    raw_label.to_lowercase().contains("healthy")
}

/// Index and value of the largest entry; ties go to the lowest index.
///
/// NaN entries are ignored. `None` when nothing comparable remains.
pub fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if v <= current => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

fn absent_gatekeeper_notice(state: &GatekeeperState) -> String {
    match state {
        GatekeeperState::Unavailable { reason } => {
            format!("Content check skipped: gatekeeper unavailable ({})", reason)
        }
        _ => "Content check skipped: gatekeeper disabled".to_string(),
    }
}

/// Probability to percent, clamped to `[0, 100]`.
///
/// Scaled in single precision, the precision classifier backends produce, so
/// an f32 output of 0.45 reads as exactly 45%.
fn percent(probability: f64) -> f64 {
    f64::from(probability as f32 * 100.0).clamp(0.0, 100.0)
}

/// Gated, filtered disease classification over the cached models.
pub struct DiseasePipeline {
    cache: Arc<ModelCache>,
    aliases: CropAliases,
    preprocess: PreprocessMode,
    input_size: u32,
    confidence_threshold: f64,
    gate_top_k: usize,
}

impl DiseasePipeline {
    pub fn new(cache: Arc<ModelCache>, aliases: CropAliases, config: &AdvisorConfig) -> Self {
        Self {
            cache,
            aliases,
            preprocess: config.disease.preprocess,
            input_size: config.disease.input_size,
            confidence_threshold: config.disease.confidence_threshold,
            gate_top_k: config.gatekeeper.top_k,
        }
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn labels(&self) -> &LabelRegistry {
        self.cache.labels()
    }

    /// Decode an upload, resize it to the model input and classify it.
    pub fn classify_upload(&self, bytes: &[u8], crop_filter: Option<&str>) -> Result<PredictionResult> {
        let image = decode_upload(bytes)?;
        let tensor = ImageTensor::from_image(&image, self.input_size);
        Ok(self.classify(&tensor, crop_filter))
    }

    pub fn classify(&self, tensor: &ImageTensor, crop_filter: Option<&str>) -> PredictionResult {
        let crop_filter = crop_filter.map(str::trim).filter(|f| !f.is_empty());

        let classifier = match self.cache.primary() {
            PrimaryModel::Mock { predictor, .. } => {
                return self.mock_result(predictor, crop_filter);
            }
            PrimaryModel::Loaded(classifier) => classifier.as_ref(),
        };

        let mut notice = None;
        match self.cache.gatekeeper() {
            Some(gatekeeper) => match check_content(gatekeeper, tensor, self.gate_top_k) {
                GateOutcome::Passed { .. } => {}
                GateOutcome::Rejected { top_label } => {
                    return PredictionResult::invalid_content(&top_label);
                }
                GateOutcome::Skipped { notice: skipped } => notice = Some(skipped),
            },
            None => notice = Some(absent_gatekeeper_notice(&self.cache.gatekeeper_state())),
        }

        self.run_classifier(classifier, tensor, crop_filter)
            .with_notice(notice)
    }

    fn run_classifier(
        &self,
        classifier: &dyn DiseaseClassifier,
        tensor: &ImageTensor,
        crop_filter: Option<&str>,
    ) -> PredictionResult {
        let prepared = tensor.prepared(self.preprocess);

        let mut probabilities = match classifier.predict(&prepared) {
            Ok(probabilities) => probabilities,
            Err(e) => {
                warn!("Disease prediction failed: {}", e);
                return PredictionResult::inference_error(e.to_string());
            }
        };

        if let Some(crop) = crop_filter {
            let keep = self.aliases.matching_indices(self.labels(), crop);
            debug!("Crop filter {:?} keeps {} classes", crop, keep.len());
            probabilities = apply_mask(&probabilities, &keep);
        }

        let Some((mut index, max)) = argmax(&probabilities) else {
            return PredictionResult::inference_error("classifier returned no usable probabilities");
        };

        if index >= self.labels().len() {
            warn!(
                "Predicted index {} is outside the {} registered labels; using index 0",
                index,
                self.labels().len()
            );
            index = 0;
        }
        let raw_label = self.labels().get(index).unwrap_or_default();

        let confidence = if max.is_finite() {
            percent(max)
        } else {
            0.0
        };

        if confidence < self.confidence_threshold {
            info!(
                "Rejecting {} at {:.2}% (threshold {}%)",
                raw_label, confidence, self.confidence_threshold
            );
            return PredictionResult::low_confidence(raw_label, confidence);
        }

        debug!("Predicted {} at {:.2}%", raw_label, confidence);
        PredictionResult::accepted(raw_label, confidence)
    }

    fn mock_result(&self, predictor: &MockPredictor, crop_filter: Option<&str>) -> PredictionResult {
        let index = predictor.predict_index(self.labels(), crop_filter);
        let raw_label = self.labels().get(index).unwrap_or_default();
        debug!("Mock predictor answered {}", raw_label);
        PredictionResult::accepted(raw_label, predictor.confidence())
    }
}
