//! Quality gate shared across OCR providers.
//!
//! Providers that score capture quality (currently Document AI) report a
//! minimum and average page score plus detected defects. The gate compares
//! the minimum score against the configured threshold and translates defect
//! reasons into actionable capture hints. Providers without a quality signal
//! pass vacuously.

use serde::{Deserialize, Serialize};

use crate::models::QualityMetrics;

/// Result of evaluating quality metrics against a threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub score_min: Option<f64>,
    pub score_avg: Option<f64>,
    pub reasons: Vec<String>,
    #[serde(rename = "pass")]
    pub passed: bool,
    pub hints: Vec<String>,
    pub threshold: f64,
}

/// Evaluate whether the document passes the minimum quality threshold.
///
/// A missing `score_min` means the provider had nothing to say; the gate
/// lets the document through without hints in that case.
pub fn assess(metrics: Option<&QualityMetrics>, threshold: f64) -> QualityAssessment {
    let (score_min, score_avg, reasons) = match metrics {
        Some(m) => (m.score_min, m.score_avg, m.reasons.clone()),
        None => (None, None, Vec::new()),
    };

    let Some(score) = score_min else {
        return QualityAssessment {
            score_min,
            score_avg,
            reasons,
            passed: true,
            hints: Vec::new(),
            threshold,
        };
    };

    let hints = reasons.iter().filter_map(|r| hint_for_reason(r)).collect();
    QualityAssessment {
        score_min,
        score_avg,
        reasons,
        passed: score >= threshold,
        hints,
        threshold,
    }
}

/// Translate a detected defect into a capture hint shown to the operator.
///
/// Reasons arrive as `"{type} ({confidence})"`; only the leading token is
/// significant.
fn hint_for_reason(reason: &str) -> Option<String> {
    let key = reason.split_whitespace().next().unwrap_or("");
    let hint = match key {
        "motion_blur" => "Avoid moving the device during capture.",
        "defocus_blur" => "Move the camera closer and refocus before capturing.",
        "insufficient_lighting" | "low_brightness" => {
            "Increase ambient lighting or avoid dark environments."
        }
        "over_exposure" => "Reduce reflections or change the angle to avoid blown-out areas.",
        "under_exposure" => "Move the camera closer or use a brighter environment.",
        "specular_glare" => "Avoid reflections by placing the document at a different angle.",
        "camera_shake" => "Hold the device firmly or rest it on a support while capturing.",
        _ => return None,
    };
    Some(hint.to_string())
}
