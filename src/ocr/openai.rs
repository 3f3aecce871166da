//! Vision-LLM OCR adapter (OpenAI Responses API).
//!
//! Sends the capture as a base64 data URL with a transcription prompt and
//! converts the reply into the common single-page line structure. The model
//! is asked for structured JSON; plain text replies degrade gracefully to
//! one line per non-empty row.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::backend::{EngineKind, FileOcrClient, OcrError};
use crate::config::Settings;
use crate::models::{JobResult, OcrJobResponse, OcrPage, OcrTextLine};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";

/// Prompt sent alongside the image. The reply contract mirrors the fields
/// the validation engine cares about.
const TRANSCRIPTION_PROMPT: &str = r#"You are an assistant that extracts data from delivery receipts.
Transcribe the content of the slip, including: receiver name, delivery date and
time, invoice/document numbers, and any other relevant information.

Return the data as structured JSON with the fields:
{
    "receiver": "Receiver name (string)",
    "delivery_date": "Delivery date (ISO-8601 string)",
    "delivery_time": "Delivery time (HH:MM:SS string)",
    "invoice_numbers": ["List of invoice numbers"],
    "documents": ["List of other documents"],
    "extracted_text": "All text extracted via OCR",
    "confidence": "Confidence level (high, medium, low)"
}

If some information is not visible, use null or an empty string. Do not invent
data. Be concise and clear in the response."#;

/// Structured reply the model is asked to produce.
#[derive(Debug, Default, Deserialize)]
struct StructuredReply {
    #[serde(default)]
    receiver: Option<String>,
    #[serde(default)]
    delivery_date: Option<String>,
    #[serde(default)]
    delivery_time: Option<String>,
    #[serde(default)]
    invoice_numbers: Vec<Value>,
    #[serde(default)]
    documents: Vec<Value>,
    #[serde(default)]
    extracted_text: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    temperature: f64,
    input: Vec<Value>,
    max_output_tokens: u32,
}

/// Uses OpenAI vision-capable models to extract text for validation.
pub struct OpenAiOcrClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiOcrClient {
    pub fn new(settings: &Settings) -> Result<Self, OcrError> {
        let api_key = settings
            .openai_api_key
            .clone()
            .ok_or_else(|| OcrError::BackendNotAvailable("OPENAI_API_KEY is not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: settings.openai_model.clone(),
            max_tokens: settings.openai_max_tokens,
        })
    }

    async fn perform_ocr(&self, path: &Path) -> Result<String, OcrError> {
        let bytes = tokio::fs::read(path).await?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let data_url = format!(
            "data:{};base64,{}",
            mime.essence_str(),
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );

        let request = ResponsesRequest {
            model: self.model.clone(),
            temperature: 1.0,
            input: vec![json!({
                "role": "user",
                "content": [
                    {"type": "input_text", "text": TRANSCRIPTION_PROMPT},
                    {"type": "input_image", "image_url": data_url},
                ]
            })],
            max_output_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(RESPONSES_URL)
            .bearer_auth(&self.api_key)
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
        let content = output_text(&payload);
        if content.is_empty() {
            return Err(OcrError::UnexpectedResponse(
                "model reply contained no output text".into(),
            ));
        }
        debug!("OCR reply received ({} chars)", content.len());
        Ok(content)
    }
}

#[async_trait]
impl FileOcrClient for OpenAiOcrClient {
    fn engine(&self) -> EngineKind {
        EngineKind::OpenaiApi
    }

    async fn process_file(&self, path: &Path) -> Result<JobResult, OcrError> {
        let content = self.perform_ocr(path).await?;
        let parsed = convert_to_response(&content);
        let text_per_page = parsed.pages.iter().map(OcrPage::as_single_block).collect();

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".to_string());

        Ok(JobResult {
            request_id: format!("openai-{stem}"),
            raw: json!({ "content": content }),
            parsed,
            text_per_page,
        })
    }
}

/// Concatenate every `output_text` block in a Responses API payload.
fn output_text(payload: &Value) -> String {
    let mut out = String::new();
    let Some(output) = payload.get("output").and_then(Value::as_array) else {
        return out;
    };
    for item in output {
        let Some(content) = item.get("content").and_then(Value::as_array) else {
            continue;
        };
        for block in content {
            if block.get("type").and_then(Value::as_str) == Some("output_text") {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
        }
    }
    out.trim().to_string()
}

/// Shape the model reply as a completed single-page OCR response.
fn convert_to_response(content: &str) -> OcrJobResponse {
    let mut text_lines = structured_lines(content);
    if text_lines.is_empty() {
        text_lines = plain_lines(content);
    }

    OcrJobResponse {
        status: Some("complete".to_string()),
        success: Some(true),
        error: None,
        page_count: Some(1),
        pages: vec![OcrPage {
            page: Some(1),
            text_lines,
            ..Default::default()
        }],
    }
}

/// Render a structured JSON reply into labelled lines.
fn structured_lines(content: &str) -> Vec<OcrTextLine> {
    let Ok(reply) = serde_json::from_str::<StructuredReply>(content) else {
        return Vec::new();
    };

    let mut lines: Vec<String> = Vec::new();
    if let Some(receiver) = non_empty(reply.receiver) {
        lines.push(format!("Receiver: {receiver}"));
    }
    if let Some(date) = non_empty(reply.delivery_date) {
        lines.push(format!("Delivery date: {date}"));
    }
    if let Some(time) = non_empty(reply.delivery_time) {
        lines.push(format!("Delivery time: {time}"));
    }
    if !reply.invoice_numbers.is_empty() {
        lines.push(format!("Invoices: {}", join_values(&reply.invoice_numbers)));
    }
    if !reply.documents.is_empty() {
        lines.push(format!("Documents: {}", join_values(&reply.documents)));
    }
    if let Some(text) = non_empty(reply.extracted_text) {
        lines.push(format!("Extracted text: {text}"));
    }
    if let Some(confidence) = non_empty(reply.confidence) {
        lines.push(format!("Confidence: {confidence}"));
    }

    lines
        .into_iter()
        .map(|text| OcrTextLine {
            text: Some(text),
            ..Default::default()
        })
        .collect()
}

fn plain_lines(content: &str) -> Vec<OcrTextLine> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| OcrTextLine {
            text: Some(line.to_string()),
            ..Default::default()
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_text_concatenates_blocks() {
        let payload = json!({
            "output": [
                {
                    "type": "message",
                    "content": [
                        {"type": "output_text", "text": "part one "},
                        {"type": "output_text", "text": "part two"}
                    ]
                }
            ]
        });
        assert_eq!(output_text(&payload), "part one part two");
        assert_eq!(output_text(&json!({})), "");
    }

    #[test]
    fn test_structured_reply_renders_labelled_lines() {
        let content = r#"{
            "receiver": "Maria da Silva",
            "delivery_date": "2023-03-15",
            "delivery_time": "14:02:00",
            "invoice_numbers": ["1234", 5678],
            "documents": [],
            "extracted_text": "Recebido por Maria",
            "confidence": "high"
        }"#;
        let parsed = convert_to_response(content);
        let lines: Vec<&str> = parsed.pages[0]
            .text_lines
            .iter()
            .map(OcrTextLine::plain_text)
            .collect();
        assert_eq!(
            lines,
            vec![
                "Receiver: Maria da Silva",
                "Delivery date: 2023-03-15",
                "Delivery time: 14:02:00",
                "Invoices: 1234, 5678",
                "Extracted text: Recebido por Maria",
                "Confidence: high",
            ]
        );
        assert_eq!(parsed.page_count, Some(1));
        assert_eq!(parsed.status_label(), "complete");
    }

    #[test]
    fn test_plain_text_fallback() {
        let content = "Recebedor: Ana\n\n  Data: 01/02/2023  \n";
        let parsed = convert_to_response(content);
        let lines: Vec<&str> = parsed.pages[0]
            .text_lines
            .iter()
            .map(OcrTextLine::plain_text)
            .collect();
        assert_eq!(lines, vec!["Recebedor: Ana", "Data: 01/02/2023"]);
    }

    #[test]
    fn test_null_fields_are_skipped() {
        let content = r#"{"receiver": null, "delivery_date": "", "extracted_text": "texto"}"#;
        let parsed = convert_to_response(content);
        let lines: Vec<&str> = parsed.pages[0]
            .text_lines
            .iter()
            .map(OcrTextLine::plain_text)
            .collect();
        assert_eq!(lines, vec!["Extracted text: texto"]);
    }
}
