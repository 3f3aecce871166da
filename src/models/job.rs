//! Wire models for the asynchronous OCR job API.
//!
//! The payload shape is shared by every backend that reports results as
//! pages of text lines; adapters that speak other schemas convert into it.
//! Unknown fields are ignored so provider-side additions never break
//! parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A textual line within a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrTextLine {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Axis-aligned box as `[x_min, y_min, x_max, y_max]`.
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    /// Arbitrary quadrilateral as a list of `[x, y]` points.
    #[serde(default)]
    pub polygon: Option<Vec<Vec<f64>>>,
}

impl OcrTextLine {
    /// Line text stripped of surrounding whitespace.
    pub fn plain_text(&self) -> &str {
        self.text.as_deref().map(str::trim).unwrap_or("")
    }
}

/// A page in the OCR response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrPage {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub text_lines: Vec<OcrTextLine>,
    #[serde(default)]
    pub lines: Vec<OcrTextLine>,
    #[serde(default)]
    pub image_bbox: Option<Vec<f64>>,
}

impl OcrPage {
    /// Prefer `text_lines` but fall back to `lines` when necessary.
    pub fn iter_lines(&self) -> &[OcrTextLine] {
        if !self.text_lines.is_empty() {
            &self.text_lines
        } else {
            &self.lines
        }
    }

    /// Cleaned line strings with consecutive duplicates collapsed.
    pub fn deduplicated_lines(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let mut previous: Option<&str> = None;
        for line in self.iter_lines() {
            let text = line.plain_text();
            if text.is_empty() || previous == Some(text) {
                continue;
            }
            out.push(text);
            previous = Some(text);
        }
        out
    }

    /// Join the deduplicated lines into a single block of text.
    pub fn as_single_block(&self) -> String {
        self.deduplicated_lines().join("\n")
    }
}

/// Top-level model for the final OCR job payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrJobResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub pages: Vec<OcrPage>,
}

impl OcrJobResponse {
    pub fn status_label(&self) -> String {
        self.status.as_deref().unwrap_or("").to_ascii_lowercase()
    }
}

/// Final result of one file processed by a backend.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Provider-assigned (or synthesized) request identifier.
    pub request_id: String,
    /// Raw payload as returned by the backend.
    pub raw: Value,
    /// Parsed view of the payload.
    pub parsed: OcrJobResponse,
    /// One cleaned text block per page.
    pub text_per_page: Vec<String>,
}

impl JobResult {
    /// Build a result from a raw payload, parsing it into the typed view.
    pub fn from_payload(request_id: String, raw: Value) -> Result<Self, serde_json::Error> {
        let parsed: OcrJobResponse = serde_json::from_value(raw.clone())?;
        let text_per_page = parsed.pages.iter().map(OcrPage::as_single_block).collect();
        Ok(Self {
            request_id,
            raw,
            parsed,
            text_per_page,
        })
    }

    pub fn status(&self) -> String {
        self.parsed.status_label()
    }

    pub fn success(&self) -> bool {
        match self.parsed.success {
            Some(success) => success,
            None => self.status() == "complete",
        }
    }
}
