//! Locally-run OCR model invoked out of process.
//!
//! Drives the Chandra CLI: images are passed straight through, PDFs are
//! rasterized per page at 300 DPI with `pdftoppm` first. Model inference is
//! blocking work, so the async seam hops onto a blocking thread.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tracing::warn;

use super::backend::{EngineKind, FileOcrClient, OcrError};
use crate::config::Settings;
use crate::models::{JobResult, OcrJobResponse, OcrPage, OcrTextLine};

/// Local model backend using a subprocess.
#[derive(Debug, Clone)]
pub struct ChandraBackend {
    binary_path: PathBuf,
    device: String,
}

impl ChandraBackend {
    pub fn new(settings: &Settings) -> Self {
        Self {
            binary_path: settings.chandra_bin.clone(),
            device: settings.chandra_device.clone(),
        }
    }

    /// Check if the model CLI can be invoked.
    pub fn is_available(&self) -> bool {
        which::which(&self.binary_path).is_ok() || self.binary_path.exists()
    }

    pub fn availability_hint(&self) -> String {
        if !self.is_available() {
            format!(
                "model CLI not found at '{}'; set CHANDRA_BIN to the chandra executable",
                self.binary_path.display()
            )
        } else if !pdftoppm_available() {
            "pdftoppm not installed (install poppler-utils); PDF inputs will fail".to_string()
        } else {
            format!("model CLI available (device: {})", self.device)
        }
    }

    /// Run the model on a single image file.
    fn run_model(&self, image_path: &Path) -> Result<String, OcrError> {
        let output = Command::new(&self.binary_path)
            .arg("--quiet")
            .args(["--prompt-type", "ocr"])
            .args(["--device", &self.device])
            .arg("--image")
            .arg(image_path)
            .output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::OcrFailed(format!("model CLI failed: {stderr}")))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::BackendNotAvailable(format!(
                    "'{}' not found; set CHANDRA_BIN to the chandra executable",
                    self.binary_path.display()
                )))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }

    /// Process one file, rasterizing PDFs page by page first.
    fn process_file_sync(&self, path: &Path) -> Result<JobResult, OcrError> {
        let is_pdf = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        let page_texts = if is_pdf {
            let temp_dir = TempDir::new()?;
            let images = rasterize_pdf(path, temp_dir.path())?;
            let mut texts = Vec::with_capacity(images.len());
            for (index, image) in images.iter().enumerate() {
                match self.run_model(image) {
                    Ok(text) => texts.push(text),
                    Err(e) => {
                        warn!("model failed on page {}: {}", index + 1, e);
                        texts.push(String::new());
                    }
                }
            }
            texts
        } else {
            vec![self.run_model(path)?]
        };

        let pages: Vec<OcrPage> = page_texts
            .iter()
            .enumerate()
            .map(|(index, text)| OcrPage {
                page: Some(index as u32 + 1),
                text_lines: text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(|line| OcrTextLine {
                        text: Some(line.to_string()),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            })
            .collect();

        let parsed = OcrJobResponse {
            status: Some("complete".to_string()),
            success: Some(true),
            error: None,
            page_count: Some(pages.len() as u32),
            pages,
        };
        let text_per_page = parsed.pages.iter().map(OcrPage::as_single_block).collect();

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".to_string());

        Ok(JobResult {
            request_id: format!("chandra-{stem}"),
            raw: json!({ "pages": page_texts }),
            parsed,
            text_per_page,
        })
    }
}

#[async_trait]
impl FileOcrClient for ChandraBackend {
    fn engine(&self) -> EngineKind {
        EngineKind::Chandra
    }

    async fn process_file(&self, path: &Path) -> Result<JobResult, OcrError> {
        let backend = self.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || backend.process_file_sync(&path))
            .await
            .map_err(|e| OcrError::OcrFailed(format!("inference worker failed: {e}")))?
    }
}

fn pdftoppm_available() -> bool {
    which::which("pdftoppm").is_ok()
}

/// Convert every PDF page to a PNG in `output_dir`, returning the images in
/// page order.
fn rasterize_pdf(pdf_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, OcrError> {
    let status = Command::new("pdftoppm")
        .args(["-png", "-r", "300"])
        .arg(pdf_path)
        .arg(output_dir.join("page"))
        .status();

    match status {
        Ok(s) if s.success() => {}
        Ok(_) => {
            return Err(OcrError::OcrFailed(
                "pdftoppm failed to convert PDF".to_string(),
            ))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(OcrError::BackendNotAvailable(
                "pdftoppm not found (install poppler-utils)".to_string(),
            ))
        }
        Err(e) => return Err(OcrError::Io(e)),
    }

    let mut images: Vec<PathBuf> = std::fs::read_dir(output_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "png").unwrap_or(false))
        .collect();
    images.sort();

    if images.is_empty() {
        return Err(OcrError::OcrFailed(
            "no images generated from PDF".to_string(),
        ));
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(bin: &str) -> ChandraBackend {
        ChandraBackend {
            binary_path: PathBuf::from(bin),
            device: "cpu".to_string(),
        }
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let backend = backend("/definitely/not/a/real/binary");
        assert!(!backend.is_available());
        assert!(backend.availability_hint().contains("CHANDRA_BIN"));
    }

    #[test]
    fn test_missing_binary_maps_to_backend_not_available() {
        let backend = backend("/definitely/not/a/real/binary");
        let err = backend.run_model(Path::new("/tmp/x.png")).unwrap_err();
        assert!(matches!(err, OcrError::BackendNotAvailable(_)));
    }
}
