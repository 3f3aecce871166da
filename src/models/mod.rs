//! Data models for podscan.

mod job;
mod normalized;

pub use job::{JobResult, OcrJobResponse, OcrPage, OcrTextLine};
pub use normalized::{NormalizedDocument, NormalizedLine, QualityMetrics};
