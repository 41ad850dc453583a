//! Inference module for disease classification
//!
//! This module provides:
//! - The class label registry
//! - Image intake and preprocessing
//! - The lazily loaded model cache with its mock fallback
//! - The content gate and crop filtering
//! - The decision pipeline producing [`PredictionResult`]s

pub mod cache;
pub mod classifier;
pub mod crop_filter;
pub mod gatekeeper;
pub mod labels;
pub mod pipeline;
pub mod tensor;

// Re-export main types for convenience
pub use cache::{ArtifactLoader, CacheStatus, ModelCache, ModelLoader, PrimaryModel};
pub use classifier::{BurnClassifier, DiseaseClassifier, MockPredictor};
pub use crop_filter::{CropAliases, LabelMatcher};
pub use gatekeeper::{ContentClassifier, GateOutcome, OnnxGatekeeper};
pub use labels::{LabelRegistry, LabelSource, DEFAULT_CLASS_LABELS};
pub use pipeline::{format_label, DiseasePipeline, PredictionResult};
pub use tensor::{decode_upload, ImageTensor, PreprocessMode};
