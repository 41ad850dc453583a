//! # Agri Advisor
//!
//! Advisory core for a farm assistant: crop disease classification behind a
//! content gate, yield estimation with risk banding, and treatment lookup.
//!
//! ## Features
//!
//! - Lazily loaded disease classifier (Burn) with a deterministic mock fallback
//! - Optional ImageNet gatekeeper (ONNX via tract) rejecting non-plant photos
//! - Crop-restricted predictions through a configurable alias table
//! - Yield estimation (linfa regressor or rule-based) with Low/Medium/High risk
//! - Treatment recommendations from an embedded knowledge base
//!
//! ## Modules
//!
//! - `inference`: Label registry, model cache, content gate and decision pipeline
//! - `model`: CNN architecture for the disease classifier
//! - `yield_estimate`: Yield regressor, feature encoding and risk banding
//! - `recommendation`: Disease treatment knowledge base
//! - `config`: File and environment configuration
//! - `utils`: Logging, errors and bounded loading
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use agri_advisor::{AdvisorConfig, ArtifactLoader, CropAliases, DiseasePipeline, LabelRegistry, ModelCache};
//!
//! let config = AdvisorConfig::resolve(None)?;
//! let labels = Arc::new(LabelRegistry::load(config.disease.labels_path.as_deref()));
//! let cache = Arc::new(ModelCache::new(&config, labels, Arc::new(ArtifactLoader)));
//! let pipeline = DiseasePipeline::new(cache, CropAliases::default(), &config);
//!
//! let result = pipeline.classify_upload(&std::fs::read("leaf.jpg")?, Some("tomato"))?;
//! println!("{} ({:.1}%)", result.disease_name, result.confidence);
//! ```

pub mod backend;
pub mod config;
pub mod inference;
pub mod model;
pub mod recommendation;
pub mod utils;
pub mod yield_estimate;

// Re-export commonly used types
pub use config::AdvisorConfig;
pub use inference::{
    ArtifactLoader, CacheStatus, CropAliases, DiseasePipeline, LabelRegistry, ModelCache,
    PredictionResult,
};
pub use recommendation::{KnowledgeBase, Recommendation};
pub use utils::error::{AdvisorError, Result};
pub use yield_estimate::{RiskLevel, YieldEstimator, YieldInput, YieldResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
