//! Configuration loaded from environment variables.
//!
//! Every knob has an environment variable with a sensible default; the CLI
//! can override the mode, gate, and directories. A `.env` file is honored
//! because `main` loads it before settings are read.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default base URL for the asynchronous OCR REST API.
pub const DEFAULT_DATALAB_API_BASE: &str = "https://www.datalab.to/api/v1";

/// Errors raised while assembling the settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingKey(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid URL in {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which backend drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Locally-run OCR model invoked out of process.
    #[value(name = "chandra")]
    Chandra,
    /// Asynchronous OCR job REST API.
    #[value(name = "datalab_api")]
    DatalabApi,
    /// Vision-capable LLM API.
    #[value(name = "openai_api")]
    OpenaiApi,
    /// Cloud document processor (Google Document AI).
    #[value(name = "gdocai")]
    Gdocai,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chandra => "chandra",
            Self::DatalabApi => "datalab_api",
            Self::OpenaiApi => "openai_api",
            Self::Gdocai => "gdocai",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "chandra" => Some(Self::Chandra),
            "datalab_api" => Some(Self::DatalabApi),
            "openai_api" => Some(Self::OpenaiApi),
            "gdocai" => Some(Self::Gdocai),
            _ => None,
        }
    }

    /// Modes that run the full validation pipeline.
    pub fn is_document_mode(&self) -> bool {
        matches!(self, Self::DatalabApi | Self::Gdocai)
    }
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub pipeline_mode: PipelineMode,
    pub images_dir: PathBuf,
    pub output_dir: PathBuf,

    pub datalab_api_key: Option<String>,
    pub datalab_api_base: String,
    pub api_endpoint: String,
    pub api_page_range: Option<String>,
    pub api_max_pages: Option<u32>,
    pub api_skip_cache: bool,
    pub api_langs: Option<String>,
    pub api_poll_interval_seconds: f64,
    pub api_max_poll_attempts: u32,
    pub api_http_timeout_seconds: f64,

    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_max_tokens: u32,

    pub gdoc_project_id: Option<String>,
    pub gdoc_location: Option<String>,
    pub gdoc_processor_id: Option<String>,
    pub gdoc_access_token: Option<String>,

    pub chandra_bin: PathBuf,
    pub chandra_device: String,

    pub quality_min_score: f64,
    pub field_min_confidence: f64,
    pub use_gdoc_ai_gate: bool,
}

impl Settings {
    /// Read settings from the environment. Presence of mode-specific keys is
    /// verified later by [`Settings::finalize`], after CLI overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode_raw = env_string("PIPELINE_MODE", "datalab_api");
        let pipeline_mode =
            PipelineMode::from_str(&mode_raw).ok_or(ConfigError::InvalidValue {
                key: "PIPELINE_MODE",
                value: mode_raw,
            })?;

        Ok(Self {
            pipeline_mode,
            images_dir: PathBuf::from(env_string("IMAGES_DIR", "images_example")),
            output_dir: PathBuf::from(env_string("OUTPUT_DIR", "outputs")),

            datalab_api_key: env_opt("DATALAB_API_KEY"),
            datalab_api_base: env_string("DATALAB_API_BASE", DEFAULT_DATALAB_API_BASE),
            api_endpoint: env_string("API_ENDPOINT", "ocr"),
            api_page_range: env_opt("API_PAGE_RANGE"),
            api_max_pages: env_parse("API_MAX_PAGES")?,
            api_skip_cache: env_bool("API_SKIP_CACHE", false)?,
            api_langs: env_opt("API_LANGS"),
            api_poll_interval_seconds: env_parse("API_POLL_INTERVAL_SECONDS")?.unwrap_or(2.0),
            api_max_poll_attempts: env_parse("API_MAX_POLL_ATTEMPTS")?.unwrap_or(60),
            api_http_timeout_seconds: env_parse("API_HTTP_TIMEOUT_SECONDS")?.unwrap_or(60.0),

            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_model: env_string("OPENAI_MODEL", "gpt-5-mini"),
            openai_max_tokens: env_parse("OPENAI_MAX_TOKENS")?.unwrap_or(2048),

            gdoc_project_id: env_opt("GDOC_PROJECT_ID"),
            gdoc_location: env_opt("GDOC_LOCATION"),
            gdoc_processor_id: env_opt("GDOC_PROCESSOR_ID"),
            gdoc_access_token: env_opt("GDOC_ACCESS_TOKEN"),

            chandra_bin: PathBuf::from(env_string("CHANDRA_BIN", "chandra-cli")),
            chandra_device: env_string("CHANDRA_DEVICE", "cpu"),

            quality_min_score: env_parse("QUALITY_MIN_SCORE")?.unwrap_or(0.55),
            field_min_confidence: env_parse("FIELD_MIN_CONFIDENCE")?.unwrap_or(0.75),
            use_gdoc_ai_gate: env_bool("USE_GDOC_AI_GATE", false)?,
        })
    }

    /// Expand directories, create the output directory, and verify that the
    /// keys required by the selected mode are present.
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        self.images_dir = expand_path(&self.images_dir);
        self.output_dir = expand_path(&self.output_dir);
        std::fs::create_dir_all(&self.output_dir).map_err(|source| ConfigError::OutputDir {
            path: self.output_dir.clone(),
            source,
        })?;

        Url::parse(&self.datalab_api_base).map_err(|source| ConfigError::InvalidUrl {
            key: "DATALAB_API_BASE",
            source,
        })?;

        match self.pipeline_mode {
            PipelineMode::DatalabApi => {
                if self.datalab_api_key.is_none() {
                    return Err(ConfigError::MissingKey("DATALAB_API_KEY"));
                }
            }
            PipelineMode::OpenaiApi => {
                if self.openai_api_key.is_none() {
                    return Err(ConfigError::MissingKey("OPENAI_API_KEY"));
                }
            }
            PipelineMode::Gdocai => {
                if self.gdoc_project_id.is_none() {
                    return Err(ConfigError::MissingKey("GDOC_PROJECT_ID"));
                }
                if self.gdoc_location.is_none() {
                    return Err(ConfigError::MissingKey("GDOC_LOCATION"));
                }
                if self.gdoc_processor_id.is_none() {
                    return Err(ConfigError::MissingKey("GDOC_PROCESSOR_ID"));
                }
                if self.gdoc_access_token.is_none() {
                    return Err(ConfigError::MissingKey("GDOC_ACCESS_TOKEN"));
                }
            }
            PipelineMode::Chandra => {}
        }

        Ok(self)
    }

    /// Whether the Document AI processor is fully addressed.
    pub fn gdoc_configured(&self) -> bool {
        self.gdoc_project_id.is_some()
            && self.gdoc_location.is_some()
            && self.gdoc_processor_id.is_some()
            && self.gdoc_access_token.is_some()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.api_poll_interval_seconds.max(0.0))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.api_http_timeout_seconds.max(1.0))
    }
}

fn expand_path(path: &std::path::Path) -> PathBuf {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let expanded = PathBuf::from(expanded);
    expanded.canonicalize().unwrap_or(expanded)
}

fn env_string(key: &'static str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn env_opt(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env_opt(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidValue { key, value: raw }),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
