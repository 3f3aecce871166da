//! Backend-agnostic document representation.
//!
//! Every adapter ends up here: a flat list of lines plus the full text and
//! whatever quality signal the provider reported. Downstream stages (gate,
//! extraction, validation) only ever see this shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single extracted line with provider metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLine {
    pub text: String,
    pub confidence: Option<f64>,
    pub bbox: Option<Vec<f64>>,
    pub page: Option<u32>,
}

/// Raw quality signal as reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub score_min: Option<f64>,
    pub score_avg: Option<f64>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Normalized view of one processed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub lines: Vec<NormalizedLine>,
    pub full_text: String,
    /// Absent when the backend reports no quality signal.
    pub quality: Option<QualityMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}
