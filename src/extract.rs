//! Heuristic field extraction for delivery receipts.
//!
//! Works over normalized OCR lines; every extractor returns the best-scoring
//! candidate (by line confidence) so that noisy repeats do not shadow a
//! cleaner read elsewhere on the page.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::NormalizedLine;

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}[/-]\d{1,2}[/-]\d{1,2})\b")
        .expect("valid regex")
});

/// Registered-mail tracking format: two letters, nine digits, two letters.
static TRACKING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2}\d{9}[A-Z]{2})\b").expect("valid regex"));

static LONG_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{10,}\b").expect("valid regex"));

static NAME_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[:\-–—]\s*").expect("valid regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Ruling marks that stand in for a handwritten signature.
const SIGNATURE_TRACES: [&str; 5] = ["____", "----", "_____", "------", "_______"];

/// Receipt labels that introduce the receiver's name. The corpus is
/// Brazilian delivery slips, hence the Portuguese keywords.
const RECIPIENT_KEYWORDS: [&str; 6] = [
    "recebedor",
    "recebido",
    "responsavel",
    "responsável",
    "assinatura",
    "assinante",
];

const SIGNATURE_KEYWORDS: [&str; 2] = ["assinatura", "signature"];

/// A field value is either free text or a boolean flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Text(String),
}

/// One extracted field with its provenance metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: Option<FieldValue>,
    pub confidence: Option<f64>,
    pub bbox: Option<Vec<f64>>,
    pub page: Option<u32>,
}

impl ExtractedField {
    fn missing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            confidence: Some(0.0),
            bbox: None,
            page: None,
        }
    }

    fn from_line(name: &str, value: FieldValue, confidence: Option<f64>, line: &NormalizedLine) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value),
            confidence: confidence.map(round_confidence),
            bbox: line.bbox.clone(),
            page: line.page,
        }
    }

    /// Whether the field carries a usable value.
    pub fn has_value(&self) -> bool {
        match &self.value {
            None => false,
            Some(FieldValue::Text(s)) => !s.is_empty(),
            Some(FieldValue::Flag(_)) => true,
        }
    }
}

/// The receipt fields the validation engine reasons about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub date: ExtractedField,
    pub recipient_name: ExtractedField,
    pub signature_present: ExtractedField,
    pub tracking_code: ExtractedField,
}

impl ExtractedFields {
    /// Fields in stable artifact order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ExtractedField)> {
        [
            ("date", &self.date),
            ("recipient_name", &self.recipient_name),
            ("signature_present", &self.signature_present),
            ("tracking_code", &self.tracking_code),
        ]
        .into_iter()
    }
}

/// Extract the receipt field set from normalized lines.
pub fn extract_fields(lines: &[NormalizedLine], full_text: &str) -> ExtractedFields {
    ExtractedFields {
        date: extract_date(lines),
        recipient_name: extract_recipient(lines),
        signature_present: extract_signature(lines),
        tracking_code: extract_tracking(lines, full_text),
    }
}

fn extract_date(lines: &[NormalizedLine]) -> ExtractedField {
    let mut best: Option<ExtractedField> = None;
    for line in lines {
        for capture in DATE_PATTERN.captures_iter(&line.text) {
            let value = normalize_date(&capture[1]);
            let candidate =
                ExtractedField::from_line("date", FieldValue::Text(value), line.confidence, line);
            best = Some(choose_best(best, candidate));
        }
    }
    best.unwrap_or_else(|| ExtractedField::missing("date"))
}

fn extract_recipient(lines: &[NormalizedLine]) -> ExtractedField {
    let mut best: Option<ExtractedField> = None;
    for line in lines {
        let lowered = line.text.to_lowercase();
        if !RECIPIENT_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            continue;
        }
        let value = clean_name(split_after_separator(&line.text));
        if value.is_empty() {
            continue;
        }
        let candidate = ExtractedField::from_line(
            "recipient_name",
            FieldValue::Text(value),
            line.confidence,
            line,
        );
        best = Some(choose_best(best, candidate));
    }
    best.unwrap_or_else(|| ExtractedField::missing("recipient_name"))
}

fn extract_signature(lines: &[NormalizedLine]) -> ExtractedField {
    for line in lines {
        let lowered = line.text.to_lowercase();
        if !SIGNATURE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            continue;
        }
        let trace_found = SIGNATURE_TRACES.iter().any(|m| line.text.contains(m));
        let floor = if trace_found { 0.9 } else { 0.6 };
        let confidence = line.confidence.unwrap_or(0.0).max(floor);
        return ExtractedField::from_line(
            "signature_present",
            FieldValue::Flag(trace_found),
            Some(confidence),
            line,
        );
    }
    ExtractedField {
        name: "signature_present".to_string(),
        value: Some(FieldValue::Flag(false)),
        confidence: Some(0.5),
        bbox: None,
        page: None,
    }
}

fn extract_tracking(lines: &[NormalizedLine], full_text: &str) -> ExtractedField {
    let mut best: Option<ExtractedField> = None;
    for line in lines {
        if let Some(capture) = TRACKING_PATTERN.captures(&line.text) {
            let candidate = ExtractedField::from_line(
                "tracking_code",
                FieldValue::Text(capture[1].to_string()),
                line.confidence,
                line,
            );
            best = Some(choose_best(best, candidate));
            continue;
        }
        if let Some(found) = LONG_NUMBER_PATTERN.find(&line.text) {
            let confidence = match line.confidence {
                Some(c) if c > 0.0 => c,
                _ => 0.6,
            };
            let candidate = ExtractedField::from_line(
                "tracking_code",
                FieldValue::Text(found.as_str().to_string()),
                Some(confidence),
                line,
            );
            best = Some(choose_best(best, candidate));
        }
    }
    if let Some(best) = best {
        return best;
    }

    // Fallback to full text search at reduced confidence
    let fallback = TRACKING_PATTERN
        .captures(full_text)
        .map(|c| c[1].to_string())
        .or_else(|| {
            LONG_NUMBER_PATTERN
                .find(full_text)
                .map(|m| m.as_str().to_string())
        });
    match fallback {
        Some(value) => ExtractedField {
            name: "tracking_code".to_string(),
            value: Some(FieldValue::Text(value)),
            confidence: Some(0.4),
            bbox: None,
            page: None,
        },
        None => ExtractedField::missing("tracking_code"),
    }
}

fn choose_best(current: Option<ExtractedField>, candidate: ExtractedField) -> ExtractedField {
    match current {
        None => candidate,
        Some(current) => {
            let current_conf = current.confidence.unwrap_or(0.0);
            let new_conf = candidate.confidence.unwrap_or(0.0);
            if new_conf >= current_conf {
                candidate
            } else {
                current
            }
        }
    }
}

fn round_confidence(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Normalize a matched date into ISO `YYYY-MM-DD`. Two-digit years pivot at
/// 50 (below: 20xx, otherwise 19xx). Returns the raw match when the token
/// layout is unexpected.
fn normalize_date(raw: &str) -> String {
    let tokens: Vec<&str> = raw.split(['/', '-']).collect();
    if tokens.len() != 3 {
        return raw.to_string();
    }

    let (year, month, day) = if tokens[0].len() == 4 {
        (tokens[0], tokens[1], tokens[2])
    } else {
        (tokens[2], tokens[1], tokens[0])
    };

    let (Ok(mut year), Ok(month), Ok(day)) = (
        year.parse::<u32>(),
        month.parse::<u32>(),
        day.parse::<u32>(),
    ) else {
        return raw.to_string();
    };
    if year < 100 {
        year += if year < 50 { 2000 } else { 1900 };
    }
    format!("{year:04}-{month:02}-{day:02}")
}

/// Value portion of a `label: value` (or dash-separated) line.
fn split_after_separator(text: &str) -> &str {
    let mut parts = NAME_SEPARATORS.splitn(text, 2);
    let first = parts.next().unwrap_or(text);
    match parts.next() {
        Some(rest) => rest.trim(),
        None => first.trim(),
    }
}

fn clean_name(name: &str) -> String {
    let cleaned = name.trim_matches(|c: char| ":.-–— ".contains(c));
    let cleaned = WHITESPACE_RUN.replace_all(cleaned, " ");
    cleaned
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .trim()
        .to_string()
}
