//! Decision engine fusing extracted fields and quality scores.

use serde::{Deserialize, Serialize};

use crate::extract::{ExtractedFields, FieldValue};
use crate::quality::QualityAssessment;

/// Final per-file outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Ok,
    NeedsReview,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NeedsReview => "NEEDS_REVIEW",
            Self::Rejected => "REJECTED",
        }
    }

    /// Escalate, never downgrade: `Rejected` dominates `NeedsReview`.
    fn escalate(&mut self, to: Decision) {
        if (*self == Decision::Ok) || (*self == Decision::NeedsReview && to == Decision::Rejected)
        {
            *self = to;
        }
    }
}

/// Thresholds applied during validation, echoed into the artifacts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub field_min_confidence: f64,
    pub quality_min_score: f64,
}

/// Result of validating one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub decision: Decision,
    /// Minimum confidence across all evaluated signals.
    pub decision_score: f64,
    pub issues: Vec<String>,
    pub fields: ExtractedFields,
    pub quality: QualityAssessment,
    pub engine_used: String,
    pub engine_chain: Vec<String>,
    pub thresholds: Thresholds,
}

/// Fuse extracted fields and quality scores into a high-level decision.
pub fn run_validation(
    fields: ExtractedFields,
    quality: QualityAssessment,
    thresholds: Thresholds,
    engine_used: String,
    engine_chain: Vec<String>,
) -> ValidationOutcome {
    let mut issues: Vec<String> = Vec::new();
    let mut decision = Decision::Ok;
    let mut scores: Vec<f64> = Vec::new();

    let (quality_passed, quality_score, quality_issues) =
        assess_quality_gate(&quality, thresholds.quality_min_score);
    scores.push(quality_score);
    issues.extend(quality_issues);
    if !quality_passed {
        decision = Decision::Rejected;
    }

    for (name, field) in fields.iter() {
        let confidence = field.confidence.unwrap_or(0.0);

        if name == "signature_present" {
            if field.value == Some(FieldValue::Flag(false)) {
                issues.push("No signature detected on the receipt.".to_string());
                decision.escalate(Decision::NeedsReview);
            }
            scores.push(confidence);
            continue;
        }

        if !field.has_value() {
            issues.push(format!("Required field '{name}' was not identified."));
            decision = Decision::Rejected;
            scores.push(confidence);
            continue;
        }

        scores.push(confidence);
        if confidence < 0.5 {
            issues.push(format!(
                "Field '{name}' came back with low confidence ({confidence:.2})."
            ));
            decision = Decision::Rejected;
        } else if confidence < thresholds.field_min_confidence {
            issues.push(format!(
                "Field '{name}' needs review (confidence {confidence:.2})."
            ));
            decision.escalate(Decision::NeedsReview);
        }
    }

    let decision_score = scores
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    let decision_score = if decision_score.is_finite() {
        round4(decision_score)
    } else {
        0.0
    };

    ValidationOutcome {
        decision,
        decision_score,
        issues,
        fields,
        quality,
        engine_used,
        engine_chain,
        thresholds,
    }
}

/// Evaluate the quality block against the threshold, returning the score
/// that participates in the decision score.
fn assess_quality_gate(
    quality: &QualityAssessment,
    quality_min_score: f64,
) -> (bool, f64, Vec<String>) {
    let mut passed = quality.passed;
    let mut issues: Vec<String> = Vec::new();

    match quality.score_min {
        Some(score_min) => {
            if score_min < quality_min_score {
                passed = false;
                issues.push(format!(
                    "Capture quality below threshold ({score_min:.2} < {quality_min_score:.2})."
                ));
                issues.extend(quality.hints.iter().cloned());
            }
            (passed, score_min, issues)
        }
        None => {
            if !passed {
                issues.push("Document quality does not meet the minimum threshold.".to_string());
            }
            let baseline = if passed { quality_min_score } else { 0.0 };
            (passed, baseline, issues)
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractedField, FieldValue};

    fn field(name: &str, value: Option<FieldValue>, confidence: f64) -> ExtractedField {
        ExtractedField {
            name: name.to_string(),
            value,
            confidence: Some(confidence),
            bbox: None,
            page: None,
        }
    }

    fn fields(date_conf: f64, recipient_conf: f64, signed: bool, tracking_conf: f64) -> ExtractedFields {
        ExtractedFields {
            date: field("date", Some(FieldValue::Text("2023-03-15".into())), date_conf),
            recipient_name: field(
                "recipient_name",
                Some(FieldValue::Text("Maria".into())),
                recipient_conf,
            ),
            signature_present: field("signature_present", Some(FieldValue::Flag(signed)), 0.9),
            tracking_code: field(
                "tracking_code",
                Some(FieldValue::Text("AA123456789BR".into())),
                tracking_conf,
            ),
        }
    }

    fn passing_quality() -> QualityAssessment {
        QualityAssessment {
            score_min: Some(0.8),
            score_avg: Some(0.85),
            reasons: vec![],
            passed: true,
            hints: vec![],
            threshold: 0.55,
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            field_min_confidence: 0.75,
            quality_min_score: 0.55,
        }
    }

    #[test]
    fn test_all_good_is_ok() {
        let outcome = run_validation(
            fields(0.9, 0.9, true, 0.9),
            passing_quality(),
            thresholds(),
            "datalab_api".into(),
            vec!["datalab_api".into()],
        );
        assert_eq!(outcome.decision, Decision::Ok);
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.decision_score, 0.8); // quality score_min is the floor
    }

    #[test]
    fn test_missing_field_rejects() {
        let mut f = fields(0.9, 0.9, true, 0.9);
        f.date = ExtractedField {
            name: "date".into(),
            value: None,
            confidence: Some(0.0),
            bbox: None,
            page: None,
        };
        let outcome = run_validation(
            f,
            passing_quality(),
            thresholds(),
            "datalab_api".into(),
            vec![],
        );
        assert_eq!(outcome.decision, Decision::Rejected);
        assert!(outcome.issues.iter().any(|i| i.contains("'date'")));
        assert_eq!(outcome.decision_score, 0.0);
    }

    #[test]
    fn test_low_confidence_rejects_and_medium_reviews() {
        let outcome = run_validation(
            fields(0.4, 0.9, true, 0.9),
            passing_quality(),
            thresholds(),
            "datalab_api".into(),
            vec![],
        );
        assert_eq!(outcome.decision, Decision::Rejected);

        let outcome = run_validation(
            fields(0.9, 0.7, true, 0.9),
            passing_quality(),
            thresholds(),
            "datalab_api".into(),
            vec![],
        );
        assert_eq!(outcome.decision, Decision::NeedsReview);
        assert!(outcome.issues.iter().any(|i| i.contains("needs review")));
    }

    #[test]
    fn test_missing_signature_needs_review_but_never_downgrades() {
        let outcome = run_validation(
            fields(0.9, 0.9, false, 0.9),
            passing_quality(),
            thresholds(),
            "gdocai".into(),
            vec![],
        );
        assert_eq!(outcome.decision, Decision::NeedsReview);

        // A rejection elsewhere is not softened by the signature rule
        let outcome = run_validation(
            fields(0.4, 0.9, false, 0.9),
            passing_quality(),
            thresholds(),
            "gdocai".into(),
            vec![],
        );
        assert_eq!(outcome.decision, Decision::Rejected);
    }

    #[test]
    fn test_quality_failure_rejects_with_hints() {
        let quality = QualityAssessment {
            score_min: Some(0.3),
            score_avg: Some(0.4),
            reasons: vec!["motion_blur (0.9)".into()],
            passed: false,
            hints: vec!["Avoid moving the device during capture.".into()],
            threshold: 0.55,
        };
        let outcome = run_validation(
            fields(0.9, 0.9, true, 0.9),
            quality,
            thresholds(),
            "gdocai".into(),
            vec![],
        );
        assert_eq!(outcome.decision, Decision::Rejected);
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.contains("below threshold")));
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.contains("Avoid moving the device")));
        assert_eq!(outcome.decision_score, 0.3);
    }

    #[test]
    fn test_absent_quality_uses_threshold_baseline() {
        let quality = QualityAssessment {
            score_min: None,
            score_avg: None,
            reasons: vec![],
            passed: true,
            hints: vec![],
            threshold: 0.55,
        };
        let outcome = run_validation(
            fields(0.9, 0.9, true, 0.9),
            quality,
            thresholds(),
            "datalab_api".into(),
            vec![],
        );
        assert_eq!(outcome.decision, Decision::Ok);
        assert_eq!(outcome.decision_score, 0.55);
    }

    #[test]
    fn test_decision_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_value(Decision::NeedsReview).unwrap(),
            serde_json::json!("NEEDS_REVIEW")
        );
        assert_eq!(Decision::Rejected.as_str(), "REJECTED");
    }
}
