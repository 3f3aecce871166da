//! End-to-end test of the document flow below the HTTP boundary: a final
//! job payload is normalized, gated, extracted, validated, and written out
//! as the full artifact set.

use std::collections::BTreeMap;

use serde_json::json;

use podscan::config::PipelineMode;
use podscan::models::JobResult;
use podscan::normalize::normalize_job_result;
use podscan::ocr::EngineKind;
use podscan::pipeline::{PipelineOutcome, RunArtifacts};
use podscan::quality;
use podscan::validation::Decision;
use podscan::writer::DocumentResultWriter;

fn completed_job_payload() -> serde_json::Value {
    json!({
        "status": "complete",
        "success": true,
        "page_count": 1,
        "pages": [
            {
                "page": 1,
                "text_lines": [
                    {"text": "COMPROVANTE DE ENTREGA", "confidence": 0.98},
                    {"text": "Data: 15/03/2023", "confidence": 0.95},
                    {"text": "Recebedor: Maria da Silva", "confidence": 0.92},
                    {"text": "Assinatura: ________", "confidence": 0.81},
                    {"text": "Objeto: AA123456789BR", "confidence": 0.93}
                ]
            }
        ]
    })
}

fn outcome_from_payload(dir: &std::path::Path) -> PipelineOutcome {
    let result = JobResult::from_payload("req-42".into(), completed_job_payload()).unwrap();
    assert!(result.success());

    let normalized = normalize_job_result(&result, None);
    let gate = quality::assess(normalized.quality.as_ref(), 0.55);
    assert!(gate.passed);

    PipelineOutcome {
        source_path: dir.join("canhoto_001.png"),
        mode: PipelineMode::DatalabApi,
        engine_used: EngineKind::DatalabApi,
        engine_chain: vec![EngineKind::DatalabApi],
        normalized,
        quality_gate: gate,
        artifacts: RunArtifacts::default(),
        latencies: BTreeMap::from([("datalab_api".to_string(), 3.2)]),
        skipped_extraction: false,
    }
}

#[test]
fn clean_receipt_validates_ok_with_full_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let writer = DocumentResultWriter::new(dir.path(), 0.75, 0.55);
    let outcome = outcome_from_payload(dir.path());

    let saved = writer.write(&outcome).unwrap();
    let validation = &saved.validation_data;

    assert_eq!(validation.decision, Decision::Ok);
    assert!(validation.issues.is_empty());
    // No provider quality signal: the decision floor is the gate threshold
    assert_eq!(validation.decision_score, 0.55);

    let validation_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&saved.validation).unwrap()).unwrap();
    assert_eq!(validation_json["decision"], "OK");
    assert_eq!(validation_json["fields"]["date"]["value"], "2023-03-15");
    assert_eq!(
        validation_json["fields"]["recipient_name"]["value"],
        "Maria da Silva"
    );
    assert_eq!(validation_json["fields"]["signature_present"]["value"], true);
    assert_eq!(
        validation_json["fields"]["tracking_code"]["value"],
        "AA123456789BR"
    );

    let ocr_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&saved.json).unwrap()).unwrap();
    assert_eq!(ocr_json["mode"], "datalab_api");
    assert_eq!(ocr_json["engine_chain"][0], "datalab_api");
    assert!(ocr_json["full_text"]
        .as_str()
        .unwrap()
        .contains("COMPROVANTE DE ENTREGA"));

    assert!(std::fs::read(&saved.report).unwrap().starts_with(b"%PDF"));
}

#[test]
fn low_confidence_field_downgrades_to_needs_review() {
    let dir = tempfile::tempdir().unwrap();
    let writer = DocumentResultWriter::new(dir.path(), 0.75, 0.55);

    let payload = json!({
        "status": "complete",
        "pages": [
            {
                "page": 1,
                "text_lines": [
                    {"text": "Data: 15/03/2023", "confidence": 0.95},
                    {"text": "Recebedor: Maria da Silva", "confidence": 0.6},
                    {"text": "Assinatura: ________", "confidence": 0.5},
                    {"text": "Objeto: AA123456789BR", "confidence": 0.93}
                ]
            }
        ]
    });
    let result = JobResult::from_payload("req-43".into(), payload).unwrap();
    let normalized = normalize_job_result(&result, None);
    let gate = quality::assess(normalized.quality.as_ref(), 0.55);

    let outcome = PipelineOutcome {
        source_path: dir.path().join("canhoto_002.png"),
        mode: PipelineMode::DatalabApi,
        engine_used: EngineKind::DatalabApi,
        engine_chain: vec![EngineKind::DatalabApi],
        normalized,
        quality_gate: gate,
        artifacts: RunArtifacts::default(),
        latencies: BTreeMap::new(),
        skipped_extraction: false,
    };

    let saved = writer.write(&outcome).unwrap();
    assert_eq!(saved.validation_data.decision, Decision::NeedsReview);
    assert!(saved
        .validation_data
        .issues
        .iter()
        .any(|issue| issue.contains("recipient_name")));
}
