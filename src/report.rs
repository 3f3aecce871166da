//! PDF validation report.
//!
//! Renders a single-page summary next to the JSON artifacts: decision
//! banner, run summary, extracted fields, issues, and a short sample of the
//! OCR text. Text is transliterated to ASCII because the report uses the
//! builtin Helvetica fonts.

use std::path::Path;

use chrono::Local;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::pipeline::PipelineOutcome;
use crate::validation::{Decision, ValidationOutcome};

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const SAMPLE_LINES: usize = 15;

/// Build the one-page validation report PDF.
pub fn build_validation_report(
    output_path: &Path,
    outcome: &PipelineOutcome,
    validation: &ValidationOutcome,
) -> anyhow::Result<()> {
    let mut page = PageWriter::new();

    let file_name = outcome
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    page.heading("Delivery Receipt Validation", 20);
    page.small(&format!(
        "Generated at {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    page.space(10);
    page.banner(validation.decision);
    page.space(14);

    page.section("Summary");
    page.body(&format!("Source file: {file_name}"));
    if let Some(request_id) = &outcome.normalized.request_id {
        page.body(&format!("Request id: {request_id}"));
    }
    page.body(&format!("Engine: {}", validation.engine_used));
    page.body(&format!(
        "Engine chain: {}",
        if validation.engine_chain.is_empty() {
            "-".to_string()
        } else {
            validation.engine_chain.join(", ")
        }
    ));
    page.body(&format!("Decision score: {:.4}", validation.decision_score));
    page.body(&format!(
        "Quality score (min/avg): {} / {}",
        score(validation.quality.score_min),
        score(validation.quality.score_avg),
    ));
    page.body(&format!(
        "Thresholds: quality {:.2}, field confidence {:.2}",
        validation.thresholds.quality_min_score, validation.thresholds.field_min_confidence,
    ));
    page.space(8);

    page.section("Extracted fields");
    for (name, field) in validation.fields.iter() {
        let value = serde_json::to_string(&field.value).unwrap_or_else(|_| "null".to_string());
        page.body(&format!(
            "{name}: {value} (confidence {})",
            score(field.confidence)
        ));
    }
    page.space(8);

    if !validation.issues.is_empty() {
        page.section("Issues");
        for issue in &validation.issues {
            page.body(&format!("- {issue}"));
        }
        page.space(8);
    }

    if !outcome.normalized.full_text.is_empty() {
        page.section("OCR text sample");
        for line in outcome.normalized.full_text.lines().take(SAMPLE_LINES) {
            page.small(line);
        }
    }

    save_single_page(output_path, page.into_operations())?;
    Ok(())
}

fn score(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

/// Sequential top-down layout on a single page.
struct PageWriter {
    operations: Vec<Operation>,
    y: i64,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            operations: Vec::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    fn space(&mut self, amount: i64) {
        self.y -= amount;
    }

    fn heading(&mut self, text: &str, size: i64) {
        self.y -= size;
        self.text("F2", size, MARGIN, self.y, text);
        self.y -= 6;
    }

    fn section(&mut self, text: &str) {
        self.y -= 13;
        self.text("F2", 13, MARGIN, self.y, text);
        self.y -= 6;
    }

    fn body(&mut self, text: &str) {
        self.line("F1", 10, 14, text);
    }

    fn small(&mut self, text: &str) {
        self.line("F1", 8, 11, text);
    }

    fn line(&mut self, font: &str, size: i64, leading: i64, text: &str) {
        if self.y < MARGIN {
            return; // page full, drop the remainder
        }
        self.y -= leading;
        self.text(font, size, MARGIN, self.y, &truncate(text, 100));
    }

    /// Colored decision banner with a white bold label.
    fn banner(&mut self, decision: Decision) {
        let (label, r, g, b) = match decision {
            Decision::Ok => ("VALIDATION PASSED", 0.06, 0.62, 0.35),
            Decision::NeedsReview => ("VALIDATION NEEDS REVIEW", 0.98, 0.55, 0.0),
            Decision::Rejected => ("VALIDATION REJECTED", 0.9, 0.22, 0.21),
        };

        self.y -= 24;
        let y = self.y;
        self.operations.push(Operation::new("q", vec![]));
        self.operations.push(Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
        self.operations.push(Operation::new(
            "re",
            vec![
                MARGIN.into(),
                y.into(),
                (PAGE_WIDTH - 2 * MARGIN).into(),
                24.into(),
            ],
        ));
        self.operations.push(Operation::new("f", vec![]));
        self.operations.push(Operation::new(
            "rg",
            vec![Object::Real(1.0), Object::Real(1.0), Object::Real(1.0)],
        ));
        self.text("F2", 12, MARGIN + 10, y + 7, label);
        self.operations.push(Operation::new("Q", vec![]));
    }

    fn text(&mut self, font: &str, size: i64, x: i64, y: i64, text: &str) {
        self.operations.push(Operation::new("BT", vec![]));
        self.operations
            .push(Operation::new("Tf", vec![font.into(), size.into()]));
        self.operations
            .push(Operation::new("Td", vec![x.into(), y.into()]));
        self.operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(sanitize(text))],
        ));
        self.operations.push(Operation::new("ET", vec![]));
    }
}

fn save_single_page(output_path: &Path, operations: Vec<Operation>) -> anyhow::Result<()> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let font_bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_regular,
            "F2" => font_bold,
        },
    });

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    doc.save(output_path)?;
    Ok(())
}

/// Transliterate to ASCII for the builtin fonts.
fn sanitize(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        c if c.is_ascii() && !c.is_ascii_control() => c,
        c if c.is_ascii_control() => ' ',
        _ => '?',
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_folds_accents() {
        assert_eq!(sanitize("João Conceição"), "Joao Conceicao");
        assert_eq!(sanitize("résumé"), "resume");
        assert_eq!(sanitize("中文"), "??");
        assert_eq!(sanitize("plain (text)"), "plain (text)");
    }

    #[test]
    fn test_truncate_keeps_short_lines() {
        assert_eq!(truncate("short", 100), "short");
        let long = "x".repeat(150);
        let truncated = truncate(&long, 100);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 100);
    }
}
