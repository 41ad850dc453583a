//! Yield risk banding.
//!
//! Risk compares a predicted yield with the crop's typical yield per acre:
//! at least 85% of baseline is `Low`, at least 55% is `Medium`, anything
//! less is `High`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Baseline used for crops missing from [`CROP_BASELINES`]
pub const DEFAULT_BASELINE_KG_PER_ACRE: f64 = 1000.0;

/// Ratio at or above which risk is `Low`
pub const LOW_RISK_RATIO: f64 = 0.85;

/// Ratio at or above which risk is `Medium`
pub const MEDIUM_RISK_RATIO: f64 = 0.55;

/// Average yield per acre (kg) for each supported crop.
pub const CROP_BASELINES: [(&str, f64); 12] = [
    ("Rice", 1700.0),
    ("Wheat", 600.0),
    ("Maize", 1900.0),
    ("Sugarcane", 35000.0),
    ("Cotton", 500.0),
    ("Groundnut", 700.0),
    ("Millets", 500.0),
    ("Pulses", 300.0),
    ("Banana", 17000.0),
    ("Coconut", 4000.0),
    ("Turmeric", 2200.0),
    ("Tea", 650.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
        }
    }
}

/// Baseline yield for `crop` (exact, case-sensitive name).
pub fn crop_baseline(crop: &str) -> f64 {
    CROP_BASELINES
        .iter()
        .find(|(name, _)| *name == crop)
        .map(|(_, baseline)| *baseline)
        .unwrap_or(DEFAULT_BASELINE_KG_PER_ACRE)
}

/// Band a yield ratio. Lower bounds are inclusive.
pub fn risk_for_ratio(ratio: f64) -> RiskLevel {
    if ratio >= LOW_RISK_RATIO {
        RiskLevel::Low
    } else if ratio >= MEDIUM_RISK_RATIO {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// Risk of a predicted yield for `crop`.
pub fn classify_risk(predicted_yield: f64, crop: &str) -> RiskLevel {
    let baseline = crop_baseline(crop);
    // A zero baseline cannot be divided by; treat it as a half-baseline yield
    let ratio = if baseline != 0.0 {
        predicted_yield / baseline
    } else {
        0.5
    };
    risk_for_ratio(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(risk_for_ratio(0.85), RiskLevel::Low);
        assert_eq!(risk_for_ratio(0.8499), RiskLevel::Medium);
        assert_eq!(risk_for_ratio(0.55), RiskLevel::Medium);
        assert_eq!(risk_for_ratio(0.5499), RiskLevel::High);
        assert_eq!(risk_for_ratio(0.0), RiskLevel::High);
        assert_eq!(risk_for_ratio(3.0), RiskLevel::Low);
    }

    #[test]
    fn test_classify_risk_against_baselines() {
        // Rice baseline 1700: 0.85 -> 1445, 0.55 -> 935
        assert_eq!(classify_risk(1445.0, "Rice"), RiskLevel::Low);
        assert_eq!(classify_risk(1444.0, "Rice"), RiskLevel::Medium);
        assert_eq!(classify_risk(935.0, "Rice"), RiskLevel::Medium);
        assert_eq!(classify_risk(934.0, "Rice"), RiskLevel::High);

        // Unknown crops use 1000
        assert_eq!(classify_risk(850.0, "Quinoa"), RiskLevel::Low);
        assert_eq!(classify_risk(549.9, "Quinoa"), RiskLevel::High);
        assert_eq!(classify_risk(550.0, "Quinoa"), RiskLevel::Medium);
    }

    #[test]
    fn test_baseline_lookup() {
        assert_eq!(crop_baseline("Sugarcane"), 35000.0);
        assert_eq!(crop_baseline("Tea"), 650.0);
        assert_eq!(crop_baseline("rice"), DEFAULT_BASELINE_KG_PER_ACRE);
    }

    #[test]
    fn test_display() {
        assert_eq!(RiskLevel::Medium.to_string(), "Medium");
        assert_eq!(serde_json::to_string(&RiskLevel::High).unwrap(), "\"High\"");
    }
}
