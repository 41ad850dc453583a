//! Yield regressor artifacts.
//!
//! The regressor is a linfa linear model stored as JSON, optionally gzip
//! compressed. When `model_path` is missing but `model_path.gz` exists, the
//! compressed copy is used.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use linfa::traits::Predict;
use linfa_linear::FittedLinearRegression;
use ndarray::Array2;
use tracing::info;

use super::encoding::NUM_FEATURES;
use crate::utils::error::{AdvisorError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Predicts yield (kg/acre) from an encoded feature row.
pub trait YieldRegressor: Send + Sync {
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> Result<f64>;
}

/// Fitted linear regression over the five yield features.
pub struct LinearYieldModel {
    model: FittedLinearRegression<f64>,
}

impl LinearYieldModel {
    pub fn from_fitted(model: FittedLinearRegression<f64>) -> Result<Self> {
        let n_params = model.params().len();
        if n_params != NUM_FEATURES {
            return Err(AdvisorError::InvalidInput(format!(
                "yield model has {} coefficients, expected {}",
                n_params, NUM_FEATURES
            )));
        }
        Ok(Self { model })
    }

    /// Load from `path`, or from `path.gz` when only the compressed copy exists.
    pub fn load(path: &Path) -> Result<Self> {
        let artifact = resolve_artifact(path)?;
        let json = read_maybe_gzipped(&artifact)?;

        let model: FittedLinearRegression<f64> = serde_json::from_str(&json)
            .map_err(|e| AdvisorError::ModelLoad(artifact.clone(), e.to_string()))?;
        let model = Self::from_fitted(model)
            .map_err(|e| AdvisorError::ModelLoad(artifact.clone(), e.to_string()))?;

        info!(
            "Loaded yield model from {} (intercept {:.2})",
            artifact.display(),
            model.model.intercept()
        );
        Ok(model)
    }
}

impl YieldRegressor for LinearYieldModel {
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> Result<f64> {
        let row = Array2::from_shape_vec((1, NUM_FEATURES), features.to_vec())
            .map_err(|e| AdvisorError::Inference(e.to_string()))?;
        let predictions = self.model.predict(&row);
        predictions
            .first()
            .copied()
            .ok_or_else(|| AdvisorError::Inference("yield model returned no prediction".to_string()))
    }
}

fn resolve_artifact(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }

    let mut compressed = path.as_os_str().to_os_string();
    compressed.push(".gz");
    let compressed = PathBuf::from(compressed);
    if compressed.exists() {
        return Ok(compressed);
    }

    Err(AdvisorError::PathNotFound(path.to_path_buf()))
}

fn read_maybe_gzipped(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut json = String::new();
        GzDecoder::new(bytes.as_slice()).read_to_string(&mut json)?;
        Ok(json)
    } else {
        String::from_utf8(bytes)
            .map_err(|e| AdvisorError::ModelLoad(path.to_path_buf(), e.to_string()))
    }
}
