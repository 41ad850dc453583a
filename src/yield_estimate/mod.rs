//! Yield estimation module
//!
//! This module provides:
//! - Risk banding against per-crop baselines
//! - Feature encoding for the regressor
//! - A lazily loaded regressor with a rule-based fallback

pub mod encoding;
pub mod regressor;
pub mod risk;

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::YieldModelConfig;
use crate::utils::error::{AdvisorError, Result};
use crate::utils::load_with_timeout;

pub use encoding::feature_row;
pub use regressor::{LinearYieldModel, YieldRegressor};
pub use risk::{classify_risk, crop_baseline, RiskLevel};

/// Unit of every reported yield
pub const YIELD_UNIT: &str = "kg/acre";

/// Smallest yield the rule-based estimate reports
pub const MIN_RULE_BASED_YIELD: f64 = 50.0;

const MAX_NAME_LEN: usize = 100;

/// Field conditions for one estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldInput {
    pub district: String,
    pub soil_type: String,
    pub crop: String,
    /// Monthly rainfall in mm
    pub rainfall: f64,
    /// Average temperature in degrees Celsius
    pub temperature: f64,
}

impl YieldInput {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("district", &self.district),
            ("soil_type", &self.soil_type),
            ("crop", &self.crop),
        ] {
            if value.trim().is_empty() {
                return Err(AdvisorError::InvalidInput(format!("{} is required", field)));
            }
            if value.chars().count() > MAX_NAME_LEN {
                return Err(AdvisorError::InvalidInput(format!(
                    "{} must be at most {} characters",
                    field, MAX_NAME_LEN
                )));
            }
        }

        if !(0.0..=5000.0).contains(&self.rainfall) {
            return Err(AdvisorError::InvalidInput(format!(
                "rainfall must be between 0 and 5000 mm, got {}",
                self.rainfall
            )));
        }
        if !(-10.0..=60.0).contains(&self.temperature) {
            return Err(AdvisorError::InvalidInput(format!(
                "temperature must be between -10 and 60 C, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldResult {
    pub predicted_yield: u64,
    pub unit: String,
    pub risk_level: RiskLevel,
}

impl YieldResult {
    fn new(predicted_yield: u64, crop: &str) -> Self {
        Self {
            predicted_yield,
            unit: YIELD_UNIT.to_string(),
            risk_level: classify_risk(predicted_yield as f64, crop),
        }
    }
}

/// Heuristic estimate used when no regressor is available.
///
/// Scales the crop baseline by rainfall (relative to 70 mm, capped at 1.5x)
/// and by distance from 28 C (2% per degree).
pub fn rule_based_estimate(crop: &str, rainfall: f64, temperature: f64) -> u64 {
    let rainfall_factor = (rainfall / 70.0).min(1.5);
    let temperature_factor = 1.0 - (temperature - 28.0).abs() * 0.02;
    let estimate = (crop_baseline(crop) * rainfall_factor * temperature_factor).round_ties_even();
    estimate.max(MIN_RULE_BASED_YIELD) as u64
}

/// The cached yield model.
pub enum YieldModel {
    Fitted(Box<dyn YieldRegressor>),
    RuleBased { reason: String },
}

impl fmt::Debug for YieldModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YieldModel::Fitted(_) => write!(f, "Fitted"),
            YieldModel::RuleBased { reason } => {
                f.debug_struct("RuleBased").field("reason", reason).finish()
            }
        }
    }
}

type RegressorLoader = dyn Fn(&YieldModelConfig) -> Result<Box<dyn YieldRegressor>> + Send + Sync;

/// Yield predictions over a lazily loaded regressor.
pub struct YieldEstimator {
    config: YieldModelConfig,
    loader: Arc<RegressorLoader>,
    model: OnceLock<YieldModel>,
}

impl YieldEstimator {
    /// Estimator that loads a [`LinearYieldModel`] from `config.model_path`.
    pub fn new(config: YieldModelConfig) -> Self {
        Self::with_loader(config, |config: &YieldModelConfig| {
            Ok(Box::new(LinearYieldModel::load(&config.model_path)?) as Box<dyn YieldRegressor>)
        })
    }

    pub fn with_loader<F>(config: YieldModelConfig, loader: F) -> Self
    where
        F: Fn(&YieldModelConfig) -> Result<Box<dyn YieldRegressor>> + Send + Sync + 'static,
    {
        Self {
            config,
            loader: Arc::new(loader),
            model: OnceLock::new(),
        }
    }

    /// The model, loading it on first call. Failures settle on the rule-based estimate.
    pub fn model(&self) -> &YieldModel {
        self.model.get_or_init(|| self.load())
    }

    pub fn is_rule_based(&self) -> bool {
        matches!(self.model(), YieldModel::RuleBased { .. })
    }

    pub fn predict(&self, input: &YieldInput) -> Result<YieldResult> {
        input.validate()?;

        let predicted_yield = match self.model() {
            YieldModel::RuleBased { .. } => {
                rule_based_estimate(&input.crop, input.rainfall, input.temperature)
            }
            YieldModel::Fitted(regressor) => {
                let features = feature_row(
                    &input.district,
                    &input.soil_type,
                    &input.crop,
                    input.rainfall,
                    input.temperature,
                );
                let raw = regressor.predict(&features)?;
                if !raw.is_finite() {
                    return Err(AdvisorError::Inference(format!(
                        "yield model produced a non-finite prediction ({})",
                        raw
                    )));
                }
                raw.max(0.0).round_ties_even() as u64
            }
        };

        let result = YieldResult::new(predicted_yield, &input.crop);
        debug!(
            "Yield for {} in {}: {} {} ({} risk)",
            input.crop, input.district, result.predicted_yield, result.unit, result.risk_level
        );
        Ok(result)
    }

    fn load(&self) -> YieldModel {
        if self.config.skip_model {
            info!("Yield model skipped by configuration; using rule-based estimator");
            return YieldModel::RuleBased {
                reason: "skipped by configuration".to_string(),
            };
        }

        let loader = Arc::clone(&self.loader);
        let config = self.config.clone();
        match load_with_timeout("yield model", self.config.load_timeout(), move || loader(&config)) {
            Ok(regressor) => YieldModel::Fitted(regressor),
            Err(e) => {
                warn!("Yield model unavailable ({}); using rule-based estimator", e);
                YieldModel::RuleBased {
                    reason: e.to_string(),
                }
            }
        }
    }
}
