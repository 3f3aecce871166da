//! Aligns OCR outputs across providers into the common document shape.

use crate::models::{
    JobResult, NormalizedDocument, NormalizedLine, OcrTextLine, QualityMetrics,
};
use crate::ocr::DocAiOutcome;

/// Normalize an asynchronous job result (Datalab schema).
///
/// An externally-measured quality block (from a gate pre-check) can be
/// carried into the normalized document since this provider reports none.
pub fn normalize_job_result(
    result: &JobResult,
    quality: Option<QualityMetrics>,
) -> NormalizedDocument {
    let mut lines: Vec<NormalizedLine> = Vec::new();
    let mut blocks: Vec<String> = Vec::new();

    for (page_index, page) in result.parsed.pages.iter().enumerate() {
        let mut block_lines: Vec<&str> = Vec::new();
        for line in page.iter_lines() {
            let text = line.plain_text();
            if text.is_empty() {
                continue;
            }
            lines.push(NormalizedLine {
                text: text.to_string(),
                confidence: line.confidence,
                bbox: resolve_bbox(line),
                page: Some(page.page.unwrap_or(page_index as u32 + 1)),
            });
            block_lines.push(text);
        }
        if !block_lines.is_empty() {
            blocks.push(block_lines.join("\n"));
        }
    }

    NormalizedDocument {
        lines,
        full_text: blocks.join("\n\n"),
        quality,
        raw_payload: Some(result.raw.clone()),
        request_id: Some(result.request_id.clone()),
    }
}

/// Normalize a Document AI outcome.
pub fn normalize_docai(outcome: &DocAiOutcome) -> NormalizedDocument {
    let full_text = outcome
        .lines
        .iter()
        .map(|line| line.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    NormalizedDocument {
        lines: outcome.lines.clone(),
        full_text,
        quality: Some(outcome.quality.clone()),
        raw_payload: Some(outcome.raw_payload.clone()),
        request_id: None,
    }
}

/// Bounding box from the explicit bbox or, failing that, the polygon hull.
fn resolve_bbox(line: &OcrTextLine) -> Option<Vec<f64>> {
    if let Some(bbox) = &line.bbox {
        if !bbox.is_empty() {
            return Some(bbox.clone());
        }
    }
    let polygon = line.polygon.as_ref()?;
    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();
    for point in polygon {
        if point.len() >= 2 {
            xs.push(point[0]);
            ys.push(point[1]);
        }
    }
    if xs.is_empty() || ys.is_empty() {
        return None;
    }
    let min = |v: &[f64]| v.iter().copied().fold(f64::INFINITY, f64::min);
    let max = |v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(vec![min(&xs), min(&ys), max(&xs), max(&ys)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_result(payload: serde_json::Value) -> JobResult {
        JobResult::from_payload("req-1".into(), payload).unwrap()
    }

    #[test]
    fn test_normalize_job_result_flattens_pages() {
        let result = job_result(json!({
            "status": "complete",
            "pages": [
                {
                    "page": 1,
                    "text_lines": [
                        {"text": " Recebedor: Ana ", "confidence": 0.92, "bbox": [1.0, 2.0, 3.0, 4.0]},
                        {"text": "", "confidence": 0.1}
                    ]
                },
                {
                    "text_lines": [
                        {"text": "AA123456789BR", "confidence": 0.88,
                         "polygon": [[0.0, 1.0], [5.0, 1.0], [5.0, 2.0], [0.0, 2.0]]}
                    ]
                }
            ]
        }));

        let doc = normalize_job_result(&result, None);
        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[0].text, "Recebedor: Ana");
        assert_eq!(doc.lines[0].page, Some(1));
        assert_eq!(doc.lines[0].bbox, Some(vec![1.0, 2.0, 3.0, 4.0]));
        // Second page falls back to 1-based index, bbox from polygon hull
        assert_eq!(doc.lines[1].page, Some(2));
        assert_eq!(doc.lines[1].bbox, Some(vec![0.0, 1.0, 5.0, 2.0]));
        assert_eq!(doc.full_text, "Recebedor: Ana\n\nAA123456789BR");
        assert_eq!(doc.request_id.as_deref(), Some("req-1"));
        assert!(doc.quality.is_none());
    }

    #[test]
    fn test_normalize_job_result_carries_gate_quality() {
        let result = job_result(json!({"status": "complete", "pages": []}));
        let quality = QualityMetrics {
            score_min: Some(0.7),
            score_avg: Some(0.8),
            reasons: vec![],
        };
        let doc = normalize_job_result(&result, Some(quality.clone()));
        assert_eq!(doc.quality, Some(quality));
        assert!(doc.full_text.is_empty());
    }

    #[test]
    fn test_normalize_docai() {
        let outcome = DocAiOutcome {
            lines: vec![
                NormalizedLine {
                    text: "linha um".into(),
                    confidence: Some(0.9),
                    bbox: Some(vec![0.0, 0.0, 1.0, 0.1]),
                    page: Some(1),
                },
                NormalizedLine {
                    text: "linha dois".into(),
                    confidence: Some(0.8),
                    bbox: None,
                    page: Some(1),
                },
            ],
            quality: QualityMetrics {
                score_min: Some(0.6),
                score_avg: Some(0.7),
                reasons: vec!["motion_blur (0.2)".into()],
            },
            raw_payload: json!({"text": "linha um\nlinha dois"}),
        };

        let doc = normalize_docai(&outcome);
        assert_eq!(doc.full_text, "linha um\nlinha dois");
        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.quality.as_ref().unwrap().score_min, Some(0.6));
        assert!(doc.raw_payload.is_some());
    }

    #[test]
    fn test_resolve_bbox_prefers_explicit() {
        let line = OcrTextLine {
            text: Some("x".into()),
            bbox: Some(vec![1.0, 1.0, 2.0, 2.0]),
            polygon: Some(vec![vec![9.0, 9.0], vec![10.0, 10.0]]),
            ..Default::default()
        };
        assert_eq!(resolve_bbox(&line), Some(vec![1.0, 1.0, 2.0, 2.0]));

        let no_geometry = OcrTextLine {
            text: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(resolve_bbox(&no_geometry), None);
    }
}
