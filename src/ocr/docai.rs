//! Google Document AI Enterprise OCR adapter.
//!
//! Calls the `:process` REST endpoint with the document inlined as base64
//! and image quality scoring enabled. Besides text lines, Document AI is
//! the one backend that reports capture quality, which feeds the gate.

use std::path::Path;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use super::backend::OcrError;
use crate::config::Settings;
use crate::models::{NormalizedLine, QualityMetrics};

/// Result of one Document AI process call.
#[derive(Debug, Clone)]
pub struct DocAiOutcome {
    pub lines: Vec<NormalizedLine>,
    pub quality: QualityMetrics,
    pub raw_payload: Value,
}

/// Wrapper around the Document AI Enterprise OCR processor.
pub struct DocAiClient {
    client: reqwest::Client,
    process_url: String,
    access_token: String,
}

impl DocAiClient {
    pub fn new(settings: &Settings) -> Result<Self, OcrError> {
        let (Some(project), Some(location), Some(processor), Some(token)) = (
            settings.gdoc_project_id.as_deref(),
            settings.gdoc_location.as_deref(),
            settings.gdoc_processor_id.as_deref(),
            settings.gdoc_access_token.as_deref(),
        ) else {
            return Err(OcrError::BackendNotAvailable(
                "Document AI is not configured; set GDOC_PROJECT_ID, GDOC_LOCATION, \
                 GDOC_PROCESSOR_ID and GDOC_ACCESS_TOKEN"
                    .into(),
            ));
        };

        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .build()?;

        let process_url = format!(
            "https://{location}-documentai.googleapis.com/v1/projects/{project}/locations/{location}/processors/{processor}:process"
        );

        Ok(Self {
            client,
            process_url,
            access_token: token.to_string(),
        })
    }

    /// Submit a file and normalize the response into lines and quality.
    pub async fn process_path(&self, path: &Path) -> Result<DocAiOutcome, OcrError> {
        let bytes = tokio::fs::read(path).await?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        self.process_bytes(&bytes, mime.essence_str()).await
    }

    pub async fn process_bytes(
        &self,
        content: &[u8],
        mime_type: &str,
    ) -> Result<DocAiOutcome, OcrError> {
        let request = json!({
            "rawDocument": {
                "content": base64::engine::general_purpose::STANDARD.encode(content),
                "mimeType": mime_type,
            },
            "processOptions": {
                "ocrConfig": { "enableImageQualityScores": true }
            }
        });

        let response = self
            .client
            .post(&self.process_url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OcrError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let payload: Value = response.json().await?;
        let document_value = payload.get("document").cloned().unwrap_or(Value::Null);
        let document: DocAiDocument = serde_json::from_value(document_value.clone())?;

        Ok(DocAiOutcome {
            lines: extract_lines(&document),
            quality: extract_quality(&document.pages),
            raw_payload: document_value,
        })
    }
}

// Document AI's proto-JSON serializes int64 fields as strings; indices
// therefore arrive as either numbers or numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Index {
    Int(u64),
    Str(String),
}

impl Index {
    fn value(&self) -> usize {
        match self {
            Index::Int(v) => *v as usize,
            Index::Str(s) => s.parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DocAiDocument {
    text: String,
    pages: Vec<DocAiPage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DocAiPage {
    lines: Vec<DocAiLine>,
    image_quality_scores: Option<ImageQualityScores>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DocAiLine {
    layout: Layout,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Layout {
    text_anchor: TextAnchor,
    confidence: Option<f64>,
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TextAnchor {
    text_segments: Vec<TextSegment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TextSegment {
    start_index: Option<Index>,
    end_index: Option<Index>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BoundingPoly {
    vertices: Vec<Vertex>,
    normalized_vertices: Vec<Vertex>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Vertex {
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ImageQualityScores {
    quality_score: Option<f64>,
    detected_defects: Vec<DetectedDefect>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DetectedDefect {
    #[serde(rename = "type")]
    defect_type: Option<String>,
    confidence: Option<f64>,
}

/// Flatten the document's pages into normalized lines.
fn extract_lines(document: &DocAiDocument) -> Vec<NormalizedLine> {
    let mut results = Vec::new();
    for (page_index, page) in document.pages.iter().enumerate() {
        for line in &page.lines {
            let text = anchor_text(&line.layout.text_anchor, &document.text);
            if text.is_empty() {
                continue;
            }
            results.push(NormalizedLine {
                text,
                confidence: Some(line.layout.confidence.unwrap_or(0.0)),
                bbox: Some(bounding_box(line.layout.bounding_poly.as_ref())),
                page: Some(page_index as u32 + 1),
            });
        }
    }
    results
}

/// Resolve a text anchor by concatenating its `[start, end)` slices of the
/// document text. Indices are byte offsets.
fn anchor_text(anchor: &TextAnchor, text: &str) -> String {
    if anchor.text_segments.is_empty() {
        return String::new();
    }
    let bytes = text.as_bytes();
    let mut fragments = String::new();
    for segment in &anchor.text_segments {
        let start = segment.start_index.as_ref().map(Index::value).unwrap_or(0);
        let end = segment.end_index.as_ref().map(Index::value).unwrap_or(0);
        if let Some(slice) = bytes.get(start..end) {
            fragments.push_str(&String::from_utf8_lossy(slice));
        }
    }
    fragments.trim().to_string()
}

/// Collapse a bounding poly into `[x_min, y_min, x_max, y_max]`, preferring
/// normalized vertices and clamping to the unit square.
fn bounding_box(poly: Option<&BoundingPoly>) -> Vec<f64> {
    let Some(poly) = poly else {
        return vec![0.0, 0.0, 0.0, 0.0];
    };
    let vertices = if !poly.normalized_vertices.is_empty() {
        &poly.normalized_vertices
    } else {
        &poly.vertices
    };
    if vertices.is_empty() {
        return vec![0.0, 0.0, 0.0, 0.0];
    }

    let xs: Vec<f64> = vertices.iter().map(|v| v.x.unwrap_or(0.0)).collect();
    let ys: Vec<f64> = vertices.iter().map(|v| v.y.unwrap_or(0.0)).collect();
    let min_x = xs.iter().copied().fold(f64::INFINITY, f64::min).max(0.0);
    let min_y = ys.iter().copied().fold(f64::INFINITY, f64::min).max(0.0);
    let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max).min(1.0);
    let max_y = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max).min(1.0);
    vec![min_x, min_y, max_x, max_y]
}

/// Aggregate quality scores and detected defects across pages.
fn extract_quality(pages: &[DocAiPage]) -> QualityMetrics {
    let mut scores: Vec<f64> = Vec::new();
    let mut defects: Vec<String> = Vec::new();

    for page in pages {
        let Some(quality) = &page.image_quality_scores else {
            continue;
        };
        if let Some(score) = quality.quality_score {
            scores.push(score);
        }
        for defect in &quality.detected_defects {
            let reason = defect.defect_type.as_deref().unwrap_or("unknown");
            let rendered = match defect.confidence {
                Some(confidence) => format!("{reason} ({confidence:.2})"),
                None => reason.to_string(),
            };
            if !defects.contains(&rendered) {
                defects.push(rendered);
            }
        }
    }
    defects.sort();

    QualityMetrics {
        score_min: scores.iter().copied().reduce(f64::min),
        score_avg: if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        },
        reasons: defects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> DocAiDocument {
        let value = json!({
            "text": "Recebedor: Ana\nData: 01/02/2023\n",
            "pages": [
                {
                    "lines": [
                        {
                            "layout": {
                                "textAnchor": {
                                    "textSegments": [ {"startIndex": "0", "endIndex": 14} ]
                                },
                                "confidence": 0.97,
                                "boundingPoly": {
                                    "normalizedVertices": [
                                        {"x": 0.1, "y": 0.2},
                                        {"x": 0.8, "y": 0.2},
                                        {"x": 0.8, "y": 0.25},
                                        {"x": 0.1, "y": 0.25}
                                    ]
                                }
                            }
                        },
                        {
                            "layout": {
                                "textAnchor": {
                                    "textSegments": [ {"startIndex": 15, "endIndex": "32"} ]
                                },
                                "confidence": 0.9
                            }
                        }
                    ],
                    "imageQualityScores": {
                        "qualityScore": 0.72,
                        "detectedDefects": [
                            {"type": "motion_blur", "confidence": 0.41},
                            {"type": "specular_glare"}
                        ]
                    }
                }
            ]
        });
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_extract_lines_resolves_anchors() {
        let document = sample_document();
        let lines = extract_lines(&document);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Recebedor: Ana");
        assert_eq!(lines[0].confidence, Some(0.97));
        assert_eq!(lines[0].page, Some(1));
        assert_eq!(lines[1].text, "Data: 01/02/2023");
    }

    #[test]
    fn test_bounding_box_from_normalized_vertices() {
        let document = sample_document();
        let lines = extract_lines(&document);
        let bbox = lines[0].bbox.clone().unwrap();
        assert_eq!(bbox, vec![0.1, 0.2, 0.8, 0.25]);
        // A line without a poly collapses to the zero box
        assert_eq!(lines[1].bbox.clone().unwrap(), vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extract_quality_aggregates_pages() {
        let document = sample_document();
        let quality = extract_quality(&document.pages);
        assert_eq!(quality.score_min, Some(0.72));
        assert_eq!(quality.score_avg, Some(0.72));
        assert_eq!(
            quality.reasons,
            vec!["motion_blur (0.41)".to_string(), "specular_glare".to_string()]
        );
    }

    #[test]
    fn test_quality_absent_when_pages_lack_scores() {
        let quality = extract_quality(&[DocAiPage::default()]);
        assert_eq!(quality.score_min, None);
        assert_eq!(quality.score_avg, None);
        assert!(quality.reasons.is_empty());
    }

    #[test]
    fn test_index_parses_string_and_number() {
        let index: Index = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(index.value(), 42);
        let index: Index = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(index.value(), 7);
    }
}
