//! Client for the Datalab asynchronous OCR job API.
//!
//! Submitting a file returns a request id plus a check URL; the job then
//! completes out of band. The client polls the check URL at a fixed
//! interval with a fixed attempt cap, keeping a single request in flight.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::backend::OcrError;
use crate::config::Settings;
use crate::models::JobResult;

/// Classification of one poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollState {
    /// Job still running; sleep and poll again.
    Pending,
    /// Job finished successfully; the payload is final.
    Complete,
    /// Job reported a failure.
    Failed(String),
}

/// Payload returned by the submit endpoint.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    request_check_url: String,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// Handles communication with the Datalab OCR API.
pub struct DatalabClient {
    client: reqwest::Client,
    api_key: String,
    endpoint_url: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
    page_range: Option<String>,
    max_pages: Option<u32>,
    skip_cache: bool,
    langs: Option<String>,
}

impl DatalabClient {
    pub fn new(settings: &Settings) -> Result<Self, OcrError> {
        let api_key = settings
            .datalab_api_key
            .clone()
            .ok_or_else(|| OcrError::BackendNotAvailable("DATALAB_API_KEY is not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint_url: join_endpoint(&settings.datalab_api_base, &settings.api_endpoint),
            poll_interval: settings.poll_interval(),
            max_poll_attempts: settings.api_max_poll_attempts,
            page_range: settings.api_page_range.clone(),
            max_pages: settings.api_max_pages,
            skip_cache: settings.api_skip_cache,
            langs: settings.api_langs.clone(),
        })
    }

    /// Submit a file to the OCR endpoint and poll until completion.
    pub async fn process_file(&self, path: &Path) -> Result<JobResult, OcrError> {
        let submit = self.submit(path).await?;
        debug!(
            request_id = %submit.request_id,
            "OCR job submitted, polling {}",
            submit.request_check_url
        );
        let payload = self.poll(&submit.request_check_url).await?;
        Ok(JobResult::from_payload(submit.request_id, payload)?)
    }

    async fn submit(&self, path: &Path) -> Result<SubmitResponse, OcrError> {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let bytes = tokio::fs::read(path).await?;

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())?;
        let mut form = multipart::Form::new().part("file", part);
        if let Some(page_range) = &self.page_range {
            form = form.text("page_range", page_range.clone());
        }
        if let Some(max_pages) = self.max_pages {
            form = form.text("max_pages", max_pages.to_string());
        }
        if self.skip_cache {
            form = form.text("skip_cache", "true");
        }
        if let Some(langs) = &self.langs {
            form = form.text("langs", langs.clone());
        }

        let response = self
            .client
            .post(&self.endpoint_url)
            .header("X-API-Key", &self.api_key)
            .multipart(form)
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
        let submit: SubmitResponse = serde_json::from_value(payload.clone())?;
        if submit.request_id.is_empty() || submit.request_check_url.is_empty() {
            return Err(OcrError::UnexpectedResponse(payload.to_string()));
        }
        if submit.success == Some(false) {
            return Err(OcrError::JobFailed(
                submit.error.unwrap_or_else(|| "submission rejected".to_string()),
            ));
        }
        Ok(submit)
    }

    async fn poll(&self, check_url: &str) -> Result<Value, OcrError> {
        for attempt in 1..=self.max_poll_attempts {
            let response = self
                .client
                .get(check_url)
                .header("X-API-Key", &self.api_key)
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
            match classify_poll(&payload) {
                PollState::Complete => return Ok(payload),
                PollState::Failed(message) => return Err(OcrError::JobFailed(message)),
                PollState::Pending => {
                    debug!(
                        "job still pending (attempt {}/{})",
                        attempt, self.max_poll_attempts
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(OcrError::PollTimeout {
            attempts: self.max_poll_attempts,
        })
    }
}

/// Decide what one poll payload means for the job.
pub(crate) fn classify_poll(payload: &Value) -> PollState {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_ascii_lowercase();

    match status.as_str() {
        "complete" => {
            if payload.get("success").and_then(Value::as_bool) == Some(false) {
                PollState::Failed(error_message(payload))
            } else {
                PollState::Complete
            }
        }
        "failed" | "error" => PollState::Failed(error_message(payload)),
        _ => PollState::Pending,
    }
}

fn error_message(payload: &Value) -> String {
    payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("no error detail provided")
        .to_string()
}

fn join_endpoint(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_matches('/')
    )
}
