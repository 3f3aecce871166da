//! OCR backend adapters.
//!
//! Each backend speaks its own protocol and response schema:
//! - Datalab: asynchronous job REST API (submit, then poll)
//! - Document AI: synchronous cloud processor with quality scores
//! - OpenAI: vision-capable LLM transcription
//! - Chandra: locally-run model invoked out of process
//!
//! Adapters return either the shared [`crate::models::JobResult`] or a
//! provider outcome that `normalize` folds into the common line structure.

mod backend;
mod chandra;
mod datalab;
mod docai;
mod openai;

pub use backend::{EngineKind, FileOcrClient, OcrError};
pub use chandra::ChandraBackend;
pub use datalab::DatalabClient;
pub use docai::{DocAiClient, DocAiOutcome};
pub use openai::OpenAiOcrClient;
