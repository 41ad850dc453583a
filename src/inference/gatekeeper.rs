//! Content verification.
//!
//! A general-purpose ImageNet classifier looks at the upload before the
//! disease classifier does. If none of its top predictions mention anything
//! plant or farm related, the image is rejected. Any failure of the
//! gatekeeper itself lets the image through.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};
use tract_onnx::prelude::*;

use super::tensor::{ImageTensor, PreprocessMode};
use crate::config::{GatekeeperConfig, TensorLayout};
use crate::utils::error::{AdvisorError, Result as AdvisorResult};

/// Substrings that mark a gatekeeper label as plant or agriculture related.
pub const PLANT_KEYWORDS: [&str; 41] = [
    "plant", "leaf", "flower", "fruit", "vegetable", "tree", "grass", "agriculture", "garden",
    "crop", "corn", "wheat", "rice", "onion", "potato", "tomato", "pepper", "apple", "grape",
    "orange", "strawberry", "peach", "cherry", "blueberry", "raspberry", "soybean", "squash",
    "lettuce", "cabbage", "broccoli", "produce", "food", "pot", "farm", "greenhouse", "mushroom",
    "pod", "seed", "grain", "root", "tuber",
];

/// One decoded gatekeeper prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentPrediction {
    pub label: String,
    pub probability: f32,
}

/// General image classifier used as the content gate.
pub trait ContentClassifier: Send + Sync {
    /// Highest `k` predictions for a raw (unpreprocessed) tensor, best first.
    fn top_k(&self, tensor: &ImageTensor, k: usize) -> AdvisorResult<Vec<ContentPrediction>>;
}

/// Result of running the content gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// A prediction matched the vocabulary
    Passed { matched: String },
    /// Nothing matched; carries the top prediction
    Rejected { top_label: String },
    /// The gatekeeper could not decide; the image passes
    Skipped { notice: String },
}

/// Whether `label` contains any [`PLANT_KEYWORDS`] entry, ignoring case.
pub fn matches_plant_vocabulary(label: &str) -> bool {
    let label = label.to_lowercase();
    PLANT_KEYWORDS.iter().any(|keyword| label.contains(keyword))
}

/// Run the gate over the top `top_k` predictions.
pub fn check_content(
    gatekeeper: &dyn ContentClassifier,
    tensor: &ImageTensor,
    top_k: usize,
) -> GateOutcome {
    let predictions = match gatekeeper.top_k(tensor, top_k) {
        Ok(predictions) => predictions,
        Err(e) => {
            warn!("Gatekeeper check failed, letting image through: {}", e);
            return GateOutcome::Skipped {
                notice: format!("Content check skipped: {}", e),
            };
        }
    };

    let Some(top) = predictions.first() else {
        warn!("Gatekeeper returned no predictions, letting image through");
        return GateOutcome::Skipped {
            notice: "Content check skipped: gatekeeper returned no predictions".to_string(),
        };
    };

    if let Some(hit) = predictions.iter().find(|p| matches_plant_vocabulary(&p.label)) {
        debug!("Gatekeeper accepted image as {:?} ({:.3})", hit.label, hit.probability);
        return GateOutcome::Passed {
            matched: hit.label.clone(),
        };
    }

    info!(
        "Gatekeeper rejected image; top prediction {:?} ({:.3})",
        top.label, top.probability
    );
    GateOutcome::Rejected {
        top_label: top.label.clone(),
    }
}

/// Indices of the `k` largest scores, best first; ties keep index order.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).filter(|&i| !scores[i].is_nan()).collect();
    indices.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    indices.truncate(k);
    indices
}

/// Parse an ImageNet synset file.
///
/// Accepts `n01440764 tench, Tinca tinca` or bare `tench` lines. The first
/// comma-separated name is kept, with spaces joined by underscores.
pub fn parse_synset_labels(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let name = match line.split_once(' ') {
                Some((id, rest)) if is_wordnet_id(id) => rest,
                _ => line,
            };
            let first = name.split(',').next().unwrap_or(name).trim();
            first.split_whitespace().collect::<Vec<_>>().join("_")
        })
        .collect()
}

fn is_wordnet_id(token: &str) -> bool {
    token.len() == 9
        && token.starts_with('n')
        && token[1..].chars().all(|c| c.is_ascii_digit())
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn looks_like_distribution(scores: &[f32]) -> bool {
    let sum: f32 = scores.iter().sum();
    scores.iter().all(|&s| (0.0..=1.0).contains(&s)) && (sum - 1.0).abs() < 1e-2
}

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX ImageNet classifier executed with tract.
pub struct OnnxGatekeeper {
    runnable: RunnableModel,
    labels: Vec<String>,
    input_size: usize,
    layout: TensorLayout,
}

impl OnnxGatekeeper {
    pub fn load(config: &GatekeeperConfig) -> AdvisorResult<Self> {
        let model_path = config.model_path.as_path();
        if !model_path.exists() {
            return Err(AdvisorError::PathNotFound(model_path.to_path_buf()));
        }
        let labels = load_synset_file(&config.labels_path)?;

        let size = config.input_size as usize;
        let shape = match config.layout {
            TensorLayout::Nhwc => [1, size, size, 3],
            TensorLayout::Nchw => [1, 3, size, size],
        };

        let load_error = |e: TractError| AdvisorError::ModelLoad(model_path.to_path_buf(), format!("{e}"));
        let runnable = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(load_error)?
            .with_input_fact(0, f32::fact(shape).into())
            .map_err(load_error)?
            .into_optimized()
            .map_err(load_error)?
            .into_runnable()
            .map_err(load_error)?;

        info!(
            "Loaded gatekeeper from {} ({} labels, {:?} input)",
            model_path.display(),
            labels.len(),
            shape
        );

        Ok(Self {
            runnable,
            labels,
            input_size: size,
            layout: config.layout,
        })
    }

    fn input_tensor(&self, tensor: &ImageTensor) -> AdvisorResult<Tensor> {
        if tensor.height() != self.input_size || tensor.width() != self.input_size {
            return Err(AdvisorError::Inference(format!(
                "gatekeeper expects {}x{} input, got {}x{}",
                self.input_size,
                self.input_size,
                tensor.height(),
                tensor.width()
            )));
        }

        let prepared = tensor.prepared(PreprocessMode::MobileNetV2);
        let (shape, data) = match self.layout {
            TensorLayout::Nhwc => (prepared.shape(), prepared.as_slice().to_vec()),
            TensorLayout::Nchw => {
                let [n, h, w, c] = prepared.shape();
                ([n, c, h, w], prepared.to_chw())
            }
        };

        Tensor::from_shape(&shape, &data).map_err(|e| AdvisorError::Inference(format!("{e}")))
    }
}

impl ContentClassifier for OnnxGatekeeper {
    fn top_k(&self, tensor: &ImageTensor, k: usize) -> AdvisorResult<Vec<ContentPrediction>> {
        let input = self.input_tensor(tensor)?;
        let outputs = self
            .runnable
            .run(tvec!(input.into()))
            .map_err(|e| AdvisorError::Inference(format!("gatekeeper execution failed: {e}")))?;

        let output = outputs
            .first()
            .ok_or_else(|| AdvisorError::Inference("gatekeeper produced no outputs".to_string()))?;
        let mut scores = output
            .as_slice::<f32>()
            .map_err(|e| AdvisorError::Inference(format!("{e}")))?;

        // TF-slim exports prepend a background class
        if scores.len() == self.labels.len() + 1 {
            scores = &scores[1..];
        }
        if scores.len() != self.labels.len() {
            return Err(AdvisorError::Inference(format!(
                "gatekeeper produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }

        let probs = if looks_like_distribution(scores) {
            scores.to_vec()
        } else {
            softmax(scores)
        };

        Ok(top_k_indices(&probs, k)
            .into_iter()
            .map(|i| ContentPrediction {
                label: self.labels[i].clone(),
                probability: probs[i],
            })
            .collect())
    }
}

fn load_synset_file(path: &Path) -> AdvisorResult<Vec<String>> {
    if !path.exists() {
        return Err(AdvisorError::PathNotFound(path.to_path_buf()));
    }
    let labels = parse_synset_labels(&fs::read_to_string(path)?);
    if labels.is_empty() {
        return Err(AdvisorError::Config(format!(
            "gatekeeper label file {} is empty",
            path.display()
        )));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct FixedGatekeeper(AdvisorResult<Vec<ContentPrediction>>);

    impl ContentClassifier for FixedGatekeeper {
        fn top_k(&self, _tensor: &ImageTensor, k: usize) -> AdvisorResult<Vec<ContentPrediction>> {
            match &self.0 {
                Ok(predictions) => Ok(predictions.iter().take(k).cloned().collect()),
                Err(e) => Err(AdvisorError::Inference(e.to_string())),
            }
        }
    }

    fn predictions(labels: &[&str]) -> Vec<ContentPrediction> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| ContentPrediction {
                label: label.to_string(),
                probability: 0.5 / (i as f32 + 1.0),
            })
            .collect()
    }

    fn image() -> ImageTensor {
        ImageTensor::filled(4, 4, 0.5)
    }

    #[test]
    fn test_keyword_count_and_matching() {
        assert_eq!(PLANT_KEYWORDS.len(), 41);
        assert!(matches_plant_vocabulary("Granny_Smith_apple"));
        assert!(matches_plant_vocabulary("FLOWERPOT"));
        assert!(matches_plant_vocabulary("head_cabbage"));
        assert!(!matches_plant_vocabulary("tabby"));
        assert!(!matches_plant_vocabulary("sports_car"));
    }

    #[test]
    fn test_gate_passes_on_any_top_match() {
        let gk = FixedGatekeeper(Ok(predictions(&["tabby", "Egyptian_cat", "pot"])));
        assert_eq!(
            check_content(&gk, &image(), 3),
            GateOutcome::Passed {
                matched: "pot".to_string()
            }
        );
    }

    #[test]
    fn test_gate_only_considers_top_k() {
        let gk = FixedGatekeeper(Ok(predictions(&["tabby", "Egyptian_cat", "tiger_cat", "daisy"])));
        assert_eq!(
            check_content(&gk, &image(), 3),
            GateOutcome::Rejected {
                top_label: "tabby".to_string()
            }
        );
    }

    #[test]
    fn test_gate_fails_open_on_error() {
        let gk = FixedGatekeeper(Err(AdvisorError::Inference("onnx blew up".to_string())));
        match check_content(&gk, &image(), 3) {
            GateOutcome::Skipped { notice } => assert!(notice.contains("onnx blew up")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_gate_fails_open_on_empty_output() {
        let gk = FixedGatekeeper(Ok(Vec::new()));
        assert!(matches!(check_content(&gk, &image(), 3), GateOutcome::Skipped { .. }));
    }

    #[test]
    fn test_top_k_indices_stable_and_descending() {
        let scores = [0.1, 0.4, 0.4, f32::NAN, 0.05, 0.3];
        assert_eq!(top_k_indices(&scores, 3), vec![1, 2, 5]);
        assert_eq!(top_k_indices(&scores, 10).len(), 5);
    }

    #[test]
    fn test_parse_synset_labels() {
        let labels = parse_synset_labels(
            "n01440764 tench, Tinca tinca\nn03991062 pot, flowerpot\n\nhead cabbage\nGranny_Smith\n",
        );
        assert_eq!(labels, vec!["tench", "pot", "head_cabbage", "Granny_Smith"]);
    }

    #[test]
    fn test_softmax_and_distribution_check() {
        let probs = softmax(&[2.0, 1.0, 0.1]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
        assert!(looks_like_distribution(&probs));
        assert!(!looks_like_distribution(&[2.0, 1.0, 0.1]));
    }

    #[test]
    fn test_load_missing_model() {
        let config = GatekeeperConfig {
            model_path: PathBuf::from("/no/gatekeeper.onnx"),
            ..GatekeeperConfig::default()
        };
        assert!(matches!(
            OnnxGatekeeper::load(&config),
            Err(AdvisorError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_load_rejects_invalid_onnx() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("gatekeeper.onnx");
        let labels_path = dir.path().join("synset.txt");
        fs::write(&model_path, b"definitely not protobuf").unwrap();
        fs::write(&labels_path, "n03991062 pot, flowerpot\n").unwrap();

        let config = GatekeeperConfig {
            model_path,
            labels_path,
            ..GatekeeperConfig::default()
        };
        assert!(matches!(
            OnnxGatekeeper::load(&config),
            Err(AdvisorError::ModelLoad(_, _))
        ));
    }
}
