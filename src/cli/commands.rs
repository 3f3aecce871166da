//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::config::{PipelineMode, Settings};
use crate::ocr::{ChandraBackend, FileOcrClient, OpenAiOcrClient};
use crate::pipeline::DocumentPipeline;
use crate::repository::ImageRepository;
use crate::validation::Decision;
use crate::writer::{DocumentResultWriter, SimpleResultWriter};

#[derive(Parser)]
#[command(name = "podscan")]
#[command(about = "Proof-of-delivery OCR processing and validation pipeline")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Process captures with the configured OCR pipeline
    Run(RunArgs),

    /// Run the document pipeline in several modes and compare outcomes
    Compare(CompareArgs),

    /// Report configuration and backend availability
    Check,
}

#[derive(Args)]
struct RunArgs {
    /// Override the pipeline mode configured via PIPELINE_MODE
    #[arg(long, value_enum)]
    mode: Option<PipelineMode>,

    /// Force the Document AI quality gate on
    #[arg(long, conflicts_with = "no_use_gate")]
    use_gate: bool,

    /// Force the Document AI quality gate off
    #[arg(long)]
    no_use_gate: bool,

    /// Directory with the captures to process (overrides IMAGES_DIR)
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Destination directory for artifacts (overrides OUTPUT_DIR)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct CompareArgs {
    /// Comma-separated list of document modes to compare
    #[arg(long, default_value = "datalab_api,gdocai")]
    modes: String,

    /// Force the Document AI quality gate on
    #[arg(long, conflicts_with = "no_use_gate")]
    use_gate: bool,

    /// Force the Document AI quality gate off
    #[arg(long)]
    no_use_gate: bool,

    /// Directory with the captures to process (overrides IMAGES_DIR)
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Base directory for per-mode artifacts and the CSV (default: OUTPUT_DIR/ab)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Compare(args) => cmd_compare(args).await,
        Commands::Check => cmd_check(),
    }
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(mode) = args.mode {
        settings.pipeline_mode = mode;
    }
    if args.use_gate {
        settings.use_gdoc_ai_gate = true;
    }
    if args.no_use_gate {
        settings.use_gdoc_ai_gate = false;
    }
    if let Some(images_dir) = args.images_dir {
        settings.images_dir = images_dir;
    }
    if let Some(output_dir) = args.output_dir {
        settings.output_dir = output_dir;
    }
    let settings = settings.finalize()?;

    info!(
        "starting OCR pipeline ({}). images_dir={} output_dir={} gate={} thresholds={{quality: {:.2}, field: {:.2}}}",
        settings.pipeline_mode,
        settings.images_dir.display(),
        settings.output_dir.display(),
        settings.use_gdoc_ai_gate,
        settings.quality_min_score,
        settings.field_min_confidence,
    );

    let repository = ImageRepository::new(settings.images_dir.clone());
    let files = repository.list_files()?;
    if files.is_empty() {
        warn!("no supported files found for processing");
        return Ok(());
    }

    match settings.pipeline_mode {
        PipelineMode::Chandra => {
            let client = ChandraBackend::new(&settings);
            run_simple(&settings, &files, Box::new(client)).await
        }
        PipelineMode::OpenaiApi => {
            let client = OpenAiOcrClient::new(&settings)?;
            run_simple(&settings, &files, Box::new(client)).await
        }
        PipelineMode::DatalabApi | PipelineMode::Gdocai => {
            run_document(&settings, &files).await
        }
    }
}

/// Simple flow: call the backend and persist the OCR artifacts, no
/// validation stage.
async fn run_simple(
    settings: &Settings,
    files: &[PathBuf],
    client: Box<dyn FileOcrClient>,
) -> anyhow::Result<()> {
    let writer = SimpleResultWriter::new(settings.output_dir.clone());
    let progress = progress_bar(files.len() as u64);
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    for path in files {
        let name = file_label(path);
        progress.set_message(name.clone());
        info!("processing file {} via {}", name, client.engine());

        match client.process_file(path).await {
            Ok(result) => {
                let saved = writer.write(path, &result)?;
                info!(
                    "OCR finished for {}. JSON result at {}",
                    name,
                    saved.json.display()
                );
                succeeded += 1;
            }
            Err(e) => {
                error!("failed to process file {}: {e:#}", name);
                failed += 1;
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    println!(
        "\n{} {} processed, {} failed",
        style("done:").bold(),
        succeeded,
        failed
    );
    Ok(())
}

/// Full flow: OCR, quality gate, field extraction, validation, reports.
async fn run_document(settings: &Settings, files: &[PathBuf]) -> anyhow::Result<()> {
    let pipeline = DocumentPipeline::new(settings.clone())?;
    let writer = DocumentResultWriter::new(
        settings.output_dir.clone(),
        settings.field_min_confidence,
        settings.quality_min_score,
    );
    let progress = progress_bar(files.len() as u64);
    let mut counts = DecisionCounts::default();

    for path in files {
        let name = file_label(path);
        progress.set_message(name.clone());
        info!(
            "processing file {} using mode {}",
            name, settings.pipeline_mode
        );

        match pipeline.process_file(path).await {
            Ok(outcome) => {
                let saved = writer.write(&outcome)?;
                let validation = &saved.validation_data;
                info!(
                    "run_summary file={} mode={} decision={} decision_score={:.2} quality_min={:?} quality_avg={:?} latencies={:?}",
                    name,
                    outcome.mode,
                    validation.decision.as_str(),
                    validation.decision_score,
                    validation.quality.score_min,
                    validation.quality.score_avg,
                    outcome.latencies,
                );
                if !validation.issues.is_empty() {
                    warn!(
                        "decision_issues file={} issues={}",
                        name,
                        validation.issues.join("; ")
                    );
                }
                progress.println(format!(
                    "  {} {} -> {}",
                    decision_glyph(validation.decision),
                    name,
                    validation.decision.as_str()
                ));
                counts.record(validation.decision);
            }
            Err(e) => {
                error!("failed to process file {}: {e:#}", name);
                progress.println(format!("  {} {} -> failed", style("✗").red(), name));
                counts.failed += 1;
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    println!(
        "\n{} {} ok, {} needing review, {} rejected, {} failed",
        style("done:").bold(),
        counts.ok,
        counts.needs_review,
        counts.rejected,
        counts.failed
    );
    Ok(())
}

/// One line of the mode comparison table.
struct CompareRow {
    file: String,
    mode: PipelineMode,
    decision: Decision,
    decision_score: f64,
    quality_score_min: Option<f64>,
    quality_score_avg: Option<f64>,
    latency_total: Option<f64>,
    latency_engine: Option<f64>,
}

/// A/B runner: process the same captures in each requested mode, writing
/// per-mode artifacts plus a comparison CSV.
async fn cmd_compare(args: CompareArgs) -> anyhow::Result<()> {
    let mut base = Settings::from_env()?;
    if args.use_gate {
        base.use_gdoc_ai_gate = true;
    }
    if args.no_use_gate {
        base.use_gdoc_ai_gate = false;
    }
    if let Some(images_dir) = args.images_dir {
        base.images_dir = images_dir;
    }
    let base_output = args
        .output_dir
        .unwrap_or_else(|| base.output_dir.join("ab"));
    let base_output = PathBuf::from(
        shellexpand::tilde(&base_output.to_string_lossy()).into_owned(),
    );

    let mut modes: Vec<PipelineMode> = Vec::new();
    for raw in args.modes.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let mode = PipelineMode::from_str(raw)
            .ok_or_else(|| anyhow::anyhow!("unknown pipeline mode: {raw}"))?;
        anyhow::ensure!(
            mode.is_document_mode(),
            "mode {mode} cannot be compared; only document modes produce validation outcomes"
        );
        modes.push(mode);
    }
    anyhow::ensure!(!modes.is_empty(), "no modes given to compare");

    let mut rows: Vec<CompareRow> = Vec::new();
    for mode in &modes {
        let mut settings = base.clone();
        settings.pipeline_mode = *mode;
        settings.output_dir = base_output.join(mode.as_str());
        let settings = settings.finalize()?;

        let files = ImageRepository::new(settings.images_dir.clone()).list_files()?;
        if files.is_empty() {
            warn!("no supported files found for mode {mode}");
            continue;
        }

        let pipeline = DocumentPipeline::new(settings.clone())?;
        let writer = DocumentResultWriter::new(
            settings.output_dir.clone(),
            settings.field_min_confidence,
            settings.quality_min_score,
        );

        for path in &files {
            let name = file_label(path);
            info!("comparing file {} in mode {}", name, mode);
            match pipeline.process_file(path).await {
                Ok(outcome) => {
                    let saved = writer.write(&outcome)?;
                    let validation = &saved.validation_data;
                    rows.push(CompareRow {
                        file: name,
                        mode: *mode,
                        decision: validation.decision,
                        decision_score: validation.decision_score,
                        quality_score_min: validation.quality.score_min,
                        quality_score_avg: validation.quality.score_avg,
                        latency_total: outcome.latencies.get("total").copied(),
                        latency_engine: outcome
                            .latencies
                            .get(mode.as_str())
                            .or_else(|| outcome.latencies.get("gdocai"))
                            .copied(),
                    });
                }
                Err(e) => error!("failed to process file {} in mode {}: {e:#}", name, mode),
            }
        }
    }

    std::fs::create_dir_all(&base_output)?;
    let csv_path = base_output.join("compare.csv");
    std::fs::write(&csv_path, render_csv(&rows))?;
    info!("comparison CSV written to {}", csv_path.display());

    print_compare_summary(&rows);
    println!(
        "\n{} {} rows, CSV at {}",
        style("done:").bold(),
        rows.len(),
        csv_path.display()
    );
    Ok(())
}

fn render_csv(rows: &[CompareRow]) -> String {
    let mut out = String::from(
        "file,mode,decision,decision_score,quality_score_min,quality_score_avg,latency_total,latency_engine\n",
    );
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{:.4},{},{},{},{}\n",
            csv_escape(&row.file),
            row.mode,
            row.decision.as_str(),
            row.decision_score,
            csv_opt(row.quality_score_min),
            csv_opt(row.quality_score_avg),
            csv_opt(row.latency_total),
            csv_opt(row.latency_engine),
        ));
    }
    out
}

fn csv_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn print_compare_summary(rows: &[CompareRow]) {
    let mut summary: std::collections::BTreeMap<&'static str, DecisionCounts> =
        std::collections::BTreeMap::new();
    for row in rows {
        summary.entry(row.mode.as_str()).or_default().record(row.decision);
    }
    for (mode, counts) in summary {
        println!(
            "  {} {}: {} ok, {} needing review, {} rejected",
            style("mode").bold(),
            mode,
            counts.ok,
            counts.needs_review,
            counts.rejected
        );
    }
}

fn cmd_check() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    println!("\n{}", style("Configuration").bold());
    println!("{}", "-".repeat(50));
    println!("  {:<22} {}", "pipeline mode", settings.pipeline_mode);
    println!("  {:<22} {}", "images dir", settings.images_dir.display());
    println!("  {:<22} {}", "output dir", settings.output_dir.display());
    println!("  {:<22} {}", "quality gate", settings.use_gdoc_ai_gate);
    println!(
        "  {:<22} quality {:.2}, field confidence {:.2}",
        "thresholds", settings.quality_min_score, settings.field_min_confidence
    );

    println!("\n{}", style("Backends").bold());
    println!("{}", "-".repeat(50));

    print_key_status("Datalab API", settings.datalab_api_key.is_some(), "set DATALAB_API_KEY");
    print_key_status("OpenAI API", settings.openai_api_key.is_some(), "set OPENAI_API_KEY");
    print_key_status(
        "Document AI",
        settings.gdoc_configured(),
        "set GDOC_PROJECT_ID, GDOC_LOCATION, GDOC_PROCESSOR_ID and GDOC_ACCESS_TOKEN",
    );

    let chandra = ChandraBackend::new(&settings);
    let status = if chandra.is_available() {
        style("✓ available").green()
    } else {
        style("✗ not available").red()
    };
    println!("  {:<22} {}", "Local model", status);
    println!("                         {}", style(chandra.availability_hint()).dim());

    let pdftoppm = which::which("pdftoppm").is_ok();
    let status = if pdftoppm {
        style("✓ found").green()
    } else {
        style("✗ not found").red()
    };
    println!("  {:<22} {}", "pdftoppm", status);
    if !pdftoppm {
        println!(
            "                         {}",
            style("install poppler-utils to process PDF inputs locally").dim()
        );
    }

    Ok(())
}

fn print_key_status(label: &str, configured: bool, hint: &str) {
    let status = if configured {
        style("✓ configured").green()
    } else {
        style("✗ not configured").red()
    };
    println!("  {:<22} {}", label, status);
    if !configured {
        println!("                         {}", style(hint).dim());
    }
}

#[derive(Default)]
struct DecisionCounts {
    ok: usize,
    needs_review: usize,
    rejected: usize,
    failed: usize,
}

impl DecisionCounts {
    fn record(&mut self, decision: Decision) {
        match decision {
            Decision::Ok => self.ok += 1,
            Decision::NeedsReview => self.needs_review += 1,
            Decision::Rejected => self.rejected += 1,
        }
    }
}

fn decision_glyph(decision: Decision) -> console::StyledObject<&'static str> {
    match decision {
        Decision::Ok => style("✓").green(),
        Decision::NeedsReview => style("!").yellow(),
        Decision::Rejected => style("✗").red(),
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain.png"), "plain.png");
        assert_eq!(csv_escape("with,comma.png"), "\"with,comma.png\"");
        assert_eq!(csv_escape("with\"quote.png"), "\"with\"\"quote.png\"");
    }

    #[test]
    fn test_render_csv_rows() {
        let rows = vec![CompareRow {
            file: "receipt.png".into(),
            mode: PipelineMode::DatalabApi,
            decision: Decision::Ok,
            decision_score: 0.8123,
            quality_score_min: Some(0.7),
            quality_score_avg: None,
            latency_total: Some(4.2),
            latency_engine: Some(3.9),
        }];
        let csv = render_csv(&rows);
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("file,mode,decision"));
        assert_eq!(
            lines.next().unwrap(),
            "receipt.png,datalab_api,OK,0.8123,0.7000,,4.2000,3.9000"
        );
    }
}
