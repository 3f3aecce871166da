//! Persists per-file result artifacts.
//!
//! Every processed file gets its own directory named after the file stem,
//! holding the OCR JSON, a human-readable text summary, the validation
//! outcome, a PDF report, and the raw backend payload when present.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::json;

use crate::extract::extract_fields;
use crate::models::JobResult;
use crate::ocr::EngineKind;
use crate::pipeline::PipelineOutcome;
use crate::report;
use crate::validation::{run_validation, Thresholds, ValidationOutcome};

/// Artifact paths produced for one document-pipeline file.
#[derive(Debug)]
pub struct SavedArtifacts {
    pub json: PathBuf,
    pub text: PathBuf,
    pub validation: PathBuf,
    pub report: PathBuf,
    pub raw: Option<PathBuf>,
    pub validation_data: ValidationOutcome,
}

/// Serializes the document-pipeline artifacts for downstream consumption.
pub struct DocumentResultWriter {
    output_dir: PathBuf,
    field_min_confidence: f64,
    quality_min_score: f64,
}

impl DocumentResultWriter {
    pub fn new(output_dir: impl Into<PathBuf>, field_min_confidence: f64, quality_min_score: f64) -> Self {
        Self {
            output_dir: output_dir.into(),
            field_min_confidence,
            quality_min_score,
        }
    }

    /// Run extraction and validation over the outcome, then write the full
    /// artifact set.
    pub fn write(&self, outcome: &PipelineOutcome) -> anyhow::Result<SavedArtifacts> {
        let stem = file_stem(&outcome.source_path);
        let target_dir = self.output_dir.join(&stem);
        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("failed to create {}", target_dir.display()))?;

        let fields = extract_fields(&outcome.normalized.lines, &outcome.normalized.full_text);
        let validation = run_validation(
            fields,
            outcome.quality_gate.clone(),
            Thresholds {
                field_min_confidence: self.field_min_confidence,
                quality_min_score: self.quality_min_score,
            },
            outcome.engine_used.as_str().to_string(),
            outcome.engine_chain_labels(),
        );

        let json_path = target_dir.join(format!("{stem}_ocr.json"));
        let text_path = target_dir.join(format!("{stem}_ocr.txt"));
        let validation_path = target_dir.join(format!("{stem}_validation.json"));
        let report_path = target_dir.join(format!("{stem}_validation.pdf"));

        let ocr_payload = json!({
            "mode": outcome.mode,
            "engine_used": outcome.engine_used,
            "engine_chain": outcome.engine_chain,
            "latencies": outcome.latencies,
            "quality": validation.quality,
            "fields": validation.fields,
            "full_text": outcome.normalized.full_text,
            "lines": outcome.normalized.lines,
            "raw_payload": outcome.normalized.raw_payload,
            "artifacts": outcome.artifacts,
            "skipped_extraction": outcome.skipped_extraction,
        });
        write_json(&json_path, &ocr_payload)?;
        std::fs::write(&text_path, text_summary(outcome, &validation))
            .with_context(|| format!("failed to write {}", text_path.display()))?;
        write_json(&validation_path, &serde_json::to_value(&validation)?)?;
        report::build_validation_report(&report_path, outcome, &validation)?;

        let raw = match &outcome.normalized.raw_payload {
            Some(raw_payload) => {
                let suffix = match outcome.engine_used {
                    EngineKind::Gdocai | EngineKind::GdocaiGate => "gdocai_raw",
                    _ => "raw",
                };
                let raw_path = target_dir.join(format!("{stem}_{suffix}.json"));
                write_json(&raw_path, raw_payload)?;
                Some(raw_path)
            }
            None => None,
        };

        Ok(SavedArtifacts {
            json: json_path,
            text: text_path,
            validation: validation_path,
            report: report_path,
            raw,
            validation_data: validation,
        })
    }
}

/// Artifact paths produced for one simple-pipeline file.
#[derive(Debug)]
pub struct SimpleArtifacts {
    pub json: PathBuf,
    pub text: PathBuf,
}

/// Persists OCR responses from the simple (no validation) pipeline.
pub struct SimpleResultWriter {
    output_dir: PathBuf,
}

impl SimpleResultWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn write(&self, source_path: &Path, result: &JobResult) -> anyhow::Result<SimpleArtifacts> {
        let stem = file_stem(source_path);
        let target_dir = self.output_dir.join(&stem);
        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("failed to create {}", target_dir.display()))?;

        let json_path = target_dir.join(format!("{stem}_ocr.json"));
        let text_path = target_dir.join(format!("{stem}_ocr.txt"));

        let payload = json!({
            "request_id": result.request_id,
            "status": result.status(),
            "page_count": result.parsed.page_count,
            "pages": result.parsed.pages,
            "raw": result.raw,
        });
        write_json(&json_path, &payload)?;
        std::fs::write(&text_path, page_blocks(result))
            .with_context(|| format!("failed to write {}", text_path.display()))?;

        Ok(SimpleArtifacts {
            json: json_path,
            text: text_path,
        })
    }
}

fn write_json(path: &Path, value: &serde_json::Value) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    std::fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string())
}

/// Human-readable run summary mirroring the JSON artifact.
fn text_summary(outcome: &PipelineOutcome, validation: &ValidationOutcome) -> String {
    let file_name = outcome
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut sections = vec![
        format!("File: {file_name}"),
        format!("Mode: {}", outcome.mode),
        format!("Final engine: {}", outcome.engine_used),
        format!(
            "Engine chain: {}",
            if outcome.engine_chain.is_empty() {
                "-".to_string()
            } else {
                outcome.engine_chain_labels().join(", ")
            }
        ),
        String::new(),
        "== Quality ==".to_string(),
        format!("score_min: {}", display_score(validation.quality.score_min)),
        format!("score_avg: {}", display_score(validation.quality.score_avg)),
        format!("Threshold applied: {}", validation.thresholds.quality_min_score),
        format!(
            "Hints: {}",
            if validation.quality.hints.is_empty() {
                "-".to_string()
            } else {
                validation.quality.hints.join(", ")
            }
        ),
        String::new(),
        "== Decision ==".to_string(),
        format!("Status: {}", validation.decision.as_str()),
        format!("Decision score: {:.4}", validation.decision_score),
        format!(
            "Issues: {}",
            if validation.issues.is_empty() {
                "none".to_string()
            } else {
                validation.issues.join("; ")
            }
        ),
        String::new(),
        "== Extracted fields ==".to_string(),
    ];

    for (name, field) in validation.fields.iter() {
        let value = serde_json::to_string(&field.value).unwrap_or_else(|_| "null".to_string());
        sections.push(format!(
            "- {name}: value={value}, confidence={}, page={}, bbox={}",
            display_score(field.confidence),
            field.page.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            field
                .bbox
                .as_ref()
                .map(|b| format!("{b:?}"))
                .unwrap_or_else(|| "-".into()),
        ));
    }

    sections.push(String::new());
    sections.push("== OCR text ==".to_string());
    if outcome.normalized.full_text.is_empty() {
        sections.push("(no text extracted)".to_string());
    } else {
        sections.push(outcome.normalized.full_text.clone());
    }

    sections.join("\n")
}

fn display_score(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "-".to_string())
}

/// Per-page text blocks with page headers.
fn page_blocks(result: &JobResult) -> String {
    if result.text_per_page.is_empty() {
        return String::new();
    }
    result
        .text_per_page
        .iter()
        .enumerate()
        .map(|(index, page_text)| format!("# Page {}\n{}", index + 1, page_text).trim().to_string())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineMode;
    use crate::models::NormalizedDocument;
    use crate::pipeline::RunArtifacts;
    use crate::quality::QualityAssessment;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample_outcome(dir: &Path) -> PipelineOutcome {
        let normalized = NormalizedDocument {
            lines: vec![crate::models::NormalizedLine {
                text: "Recebedor: Ana".into(),
                confidence: Some(0.9),
                bbox: None,
                page: Some(1),
            }],
            full_text: "Recebedor: Ana\nData: 15/03/2023\nAA123456789BR".into(),
            quality: None,
            raw_payload: Some(json!({"status": "complete"})),
            request_id: Some("req-9".into()),
        };
        PipelineOutcome {
            source_path: dir.join("receipt.png"),
            mode: PipelineMode::DatalabApi,
            engine_used: EngineKind::DatalabApi,
            engine_chain: vec![EngineKind::DatalabApi],
            normalized,
            quality_gate: QualityAssessment {
                score_min: None,
                score_avg: None,
                reasons: vec![],
                passed: true,
                hints: vec![],
                threshold: 0.55,
            },
            artifacts: RunArtifacts::default(),
            latencies: BTreeMap::from([("datalab_api".to_string(), 1.25)]),
            skipped_extraction: false,
        }
    }

    #[test]
    fn test_document_writer_produces_full_artifact_set() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DocumentResultWriter::new(dir.path(), 0.75, 0.55);
        let outcome = sample_outcome(dir.path());

        let saved = writer.write(&outcome).unwrap();
        assert!(saved.json.exists());
        assert!(saved.text.exists());
        assert!(saved.validation.exists());
        assert!(saved.report.exists());
        let raw = saved.raw.expect("raw payload written");
        assert!(raw.ends_with("receipt/receipt_raw.json"));

        let ocr_json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved.json).unwrap()).unwrap();
        assert_eq!(ocr_json["mode"], "datalab_api");
        assert_eq!(ocr_json["engine_used"], "datalab_api");
        assert!(ocr_json["fields"]["recipient_name"].is_object());

        let validation_json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved.validation).unwrap()).unwrap();
        assert!(validation_json["decision"].is_string());

        // PDF report has the magic header
        let report_bytes = std::fs::read(&saved.report).unwrap();
        assert!(report_bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_text_summary_mentions_decision_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DocumentResultWriter::new(dir.path(), 0.75, 0.55);
        let outcome = sample_outcome(dir.path());
        let saved = writer.write(&outcome).unwrap();

        let text = std::fs::read_to_string(&saved.text).unwrap();
        assert!(text.contains("== Decision =="));
        assert!(text.contains("Recebedor: Ana"));
        assert!(text.contains(saved.validation_data.decision.as_str()));
    }

    #[test]
    fn test_simple_writer_writes_page_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SimpleResultWriter::new(dir.path());
        let result = JobResult::from_payload(
            "req-1".into(),
            json!({
                "status": "complete",
                "pages": [
                    {"text_lines": [{"text": "first page"}]},
                    {"text_lines": [{"text": "second page"}]}
                ]
            }),
        )
        .unwrap();

        let saved = writer.write(&dir.path().join("scan.jpg"), &result).unwrap();
        let text = std::fs::read_to_string(&saved.text).unwrap();
        assert!(text.contains("# Page 1\nfirst page"));
        assert!(text.contains("# Page 2\nsecond page"));
        assert!(saved.json.ends_with("scan/scan_ocr.json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&saved.json).unwrap()).unwrap();
        assert_eq!(json["request_id"], "req-1");
        assert_eq!(json["status"], "complete");
        assert_eq!(json["pages"].as_array().unwrap().len(), 2);
        assert_eq!(json["raw"]["status"], "complete");
    }
}
