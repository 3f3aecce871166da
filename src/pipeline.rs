//! Document pipeline orchestrating OCR, gating, and normalization.
//!
//! Runs sequentially with a single in-flight file; per-file failures are
//! reported by the caller and never abort the whole run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::{PipelineMode, Settings};
use crate::models::{NormalizedDocument, NormalizedLine};
use crate::normalize;
use crate::ocr::{DatalabClient, DocAiClient, EngineKind};
use crate::quality::{self, QualityAssessment};

/// Side artifacts collected while processing one file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdocai_raw: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdocai_gate_lines: Option<Vec<NormalizedLine>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdocai_quality: Option<QualityAssessment>,
}

/// Complete result of processing a single document.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub source_path: PathBuf,
    pub mode: PipelineMode,
    /// Engine that produced the final normalized document.
    pub engine_used: EngineKind,
    /// Every engine invoked, in order.
    pub engine_chain: Vec<EngineKind>,
    pub normalized: NormalizedDocument,
    pub quality_gate: QualityAssessment,
    pub artifacts: RunArtifacts,
    /// Seconds spent per stage, plus `total`.
    pub latencies: BTreeMap<String, f64>,
    /// True when the quality gate rejected the capture before the main
    /// backend was invoked.
    pub skipped_extraction: bool,
}

impl PipelineOutcome {
    pub fn engine_chain_labels(&self) -> Vec<String> {
        self.engine_chain
            .iter()
            .map(|e| e.as_str().to_string())
            .collect()
    }
}

/// Runs OCR processing according to the configured mode.
pub struct DocumentPipeline {
    settings: Settings,
    datalab: Option<DatalabClient>,
    docai: Option<DocAiClient>,
}

impl DocumentPipeline {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        anyhow::ensure!(
            settings.pipeline_mode.is_document_mode(),
            "pipeline mode {} is not handled by the document flow",
            settings.pipeline_mode
        );

        let datalab = if settings.pipeline_mode == PipelineMode::DatalabApi {
            Some(DatalabClient::new(&settings)?)
        } else {
            None
        };

        let docai = if settings.gdoc_configured() {
            Some(DocAiClient::new(&settings)?)
        } else {
            None
        };

        Ok(Self {
            settings,
            datalab,
            docai,
        })
    }

    /// Process one file, recording per-stage and total latencies.
    pub async fn process_file(&self, path: &Path) -> anyhow::Result<PipelineOutcome> {
        let start_total = Instant::now();
        let mut outcome = match self.settings.pipeline_mode {
            PipelineMode::Gdocai => self.process_with_gdocai(path).await?,
            PipelineMode::DatalabApi => self.process_with_datalab(path).await?,
            mode => anyhow::bail!("pipeline mode {mode} is not handled by the document flow"),
        };
        outcome
            .latencies
            .insert("total".to_string(), start_total.elapsed().as_secs_f64());
        Ok(outcome)
    }

    async fn process_with_gdocai(&self, path: &Path) -> anyhow::Result<PipelineOutcome> {
        let docai = self.docai.as_ref().context(
            "Document AI is not configured; set GDOC_PROJECT_ID, GDOC_LOCATION, \
             GDOC_PROCESSOR_ID and GDOC_ACCESS_TOKEN",
        )?;

        let start = Instant::now();
        let result = docai.process_path(path).await?;
        let latency = start.elapsed().as_secs_f64();

        let normalized = normalize::normalize_docai(&result);
        let gate = quality::assess(normalized.quality.as_ref(), self.settings.quality_min_score);
        if !gate.passed {
            warn!(
                "document {} failed the quality gate (score_min={:?}, threshold={:.2})",
                file_label(path),
                gate.score_min,
                self.settings.quality_min_score,
            );
        }

        let artifacts = RunArtifacts {
            gdocai_raw: Some(result.raw_payload.clone()),
            gdocai_quality: Some(gate.clone()),
            ..Default::default()
        };

        let mut latencies = BTreeMap::new();
        latencies.insert("gdocai".to_string(), latency);

        Ok(PipelineOutcome {
            source_path: path.to_path_buf(),
            mode: PipelineMode::Gdocai,
            engine_used: EngineKind::Gdocai,
            engine_chain: vec![EngineKind::Gdocai],
            normalized,
            quality_gate: gate,
            artifacts,
            latencies,
            skipped_extraction: false,
        })
    }

    async fn process_with_datalab(&self, path: &Path) -> anyhow::Result<PipelineOutcome> {
        let datalab = self
            .datalab
            .as_ref()
            .context("Datalab API client is not initialized")?;

        let mut artifacts = RunArtifacts::default();
        let mut engine_chain: Vec<EngineKind> = Vec::new();
        let mut latencies = BTreeMap::new();
        let mut gate_quality = None;

        if self.settings.use_gdoc_ai_gate {
            match &self.docai {
                None => warn!(
                    "USE_GDOC_AI_GATE is enabled but Document AI credentials are incomplete"
                ),
                Some(docai) => {
                    let start_gate = Instant::now();
                    let result = docai.process_path(path).await?;
                    let gate_latency = start_gate.elapsed().as_secs_f64();

                    let normalized_gate = normalize::normalize_docai(&result);
                    let gate = quality::assess(
                        normalized_gate.quality.as_ref(),
                        self.settings.quality_min_score,
                    );

                    artifacts.gdocai_raw = Some(result.raw_payload.clone());
                    artifacts.gdocai_gate_lines = Some(normalized_gate.lines.clone());
                    engine_chain.push(EngineKind::GdocaiGate);
                    latencies.insert("gdocai_gate".to_string(), gate_latency);

                    if !gate.passed {
                        warn!(
                            "document {} blocked by the quality gate (score_min={:?}, threshold={:.2})",
                            file_label(path),
                            gate.score_min,
                            self.settings.quality_min_score,
                        );
                        return Ok(PipelineOutcome {
                            source_path: path.to_path_buf(),
                            mode: PipelineMode::DatalabApi,
                            engine_used: EngineKind::GdocaiGate,
                            engine_chain,
                            normalized: normalized_gate,
                            quality_gate: gate,
                            artifacts,
                            latencies,
                            skipped_extraction: true,
                        });
                    }

                    artifacts.gdocai_quality = Some(gate);
                    gate_quality = normalized_gate.quality.clone();
                }
            }
        }

        let start = Instant::now();
        let result = datalab.process_file(path).await?;
        latencies.insert("datalab_api".to_string(), start.elapsed().as_secs_f64());

        let normalized = normalize::normalize_job_result(&result, gate_quality);
        let gate = quality::assess(normalized.quality.as_ref(), self.settings.quality_min_score);
        engine_chain.push(EngineKind::DatalabApi);

        if !gate.passed {
            warn!(
                "document {} failed the quality gate after OCR (score_min={:?}, threshold={:.2})",
                file_label(path),
                gate.score_min,
                self.settings.quality_min_score,
            );
        }

        Ok(PipelineOutcome {
            source_path: path.to_path_buf(),
            mode: PipelineMode::DatalabApi,
            engine_used: EngineKind::DatalabApi,
            engine_chain,
            normalized,
            quality_gate: gate,
            artifacts,
            latencies,
            skipped_extraction: false,
        })
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
