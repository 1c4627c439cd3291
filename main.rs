mod analysis;
mod classifier;
mod conditions;
mod config;
mod db;
mod error;
mod inference;
mod models;
mod onnx;
mod preprocess;
mod report;
mod scans;
mod schema;

use crate::analysis::AnalysisSession;
use crate::classifier::{Diagnosis, DiagnosisResult};
use crate::config::{AppPaths, Settings};
use crate::error::{Error, Result};
use crate::models::{format_confidence, AnalysisOutcome, ScanRecord};
use crate::report::ReportInput;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dermalyze", version, about = "On-device skin lesion analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify a photo of a skin lesion
    Analyze {
        image: PathBuf,
        /// Identity the scan is stored under
        #[arg(long, default_value = "local")]
        user: String,
        /// Do not store the result in the scan history
        #[arg(long)]
        no_save: bool,
        /// Also write a PDF report
        #[arg(long)]
        report: bool,
        #[arg(long)]
        json: bool,
        /// Override the model from settings.json
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// List stored scans, newest first
    History {
        #[arg(long, default_value = "local")]
        user: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Write a PDF report for a stored scan
    Report {
        scan_id: String,
        #[arg(long, default_value = "local")]
        user: String,
    },
    /// Show runtime, paths and settings
    Info,
}

struct AnalyzeArgs {
    image: PathBuf,
    user: String,
    save: bool,
    report: bool,
    json: bool,
}

async fn run_analyze(paths: &AppPaths, settings: Settings, args: AnalyzeArgs) -> Result<()> {
    if !scans::is_supported_image(&args.image) {
        log::warn!(
            "{} does not have a known image extension; trying to decode anyway",
            args.image.display()
        );
    }
    let session = Arc::new(AnalysisSession::open(&settings.analysis)?);
    let model = session.classifier().model();
    log::debug!(
        "Analyzing {} with {} on {} ({:?} input)",
        args.image.display(),
        model.model_path().display(),
        model.provider().label(),
        model.layout()
    );
    let diagnosis = session.clone().analyze_path_async(args.image.clone()).await?;
    drop(session);

    let outcome = record_outcome(paths, &args, diagnosis);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match &outcome.diagnosis {
        Diagnosis::Confident(result) => {
            println!("{}", result.label);
            println!("{}", format_confidence(result.confidence as f64));
            println!();
            println!("{}", result.description);
            println!();
            println!("{}", result.recommendation);
            if let Some(id) = &outcome.scan_id {
                println!();
                println!("Saved as scan {id}");
            }
            if let Some(path) = &outcome.report_path {
                println!("Report: {path}");
            }
        }
        Diagnosis::Inconclusive { .. } => println!("Unable to confidently diagnose."),
    }
    for warning in &outcome.warnings {
        eprintln!("Warning: {warning}");
    }
    Ok(())
}

/// Saves and reports a confident diagnosis. Failures here are logged and
/// carried as warnings; the diagnosis itself is always kept.
fn record_outcome(paths: &AppPaths, args: &AnalyzeArgs, diagnosis: Diagnosis) -> AnalysisOutcome {
    let mut outcome = AnalysisOutcome {
        image: args.image.display().to_string(),
        diagnosis,
        scan_id: None,
        report_path: None,
        warnings: Vec::new(),
    };
    let Some(result) = outcome.diagnosis.result().cloned() else {
        return outcome;
    };

    let mut report_image = Some(args.image.clone());
    if args.save {
        match save_scan(paths, &args.image, &args.user, &result) {
            Ok(record) => {
                report_image = Some(PathBuf::from(&record.image_path));
                outcome.scan_id = Some(record.id);
            }
            Err(err) => {
                log::error!("Scan was analyzed but not saved: {err}");
                outcome.warnings.push(format!("scan not saved: {err}"));
            }
        }
    }
    if args.report {
        let input = ReportInput::from_result(&result, report_image);
        match report::write_report(&paths.reports_dir, &input) {
            Ok(path) => outcome.report_path = Some(path.display().to_string()),
            Err(err) => {
                log::error!("Report could not be written: {err}");
                outcome.warnings.push(format!("report not written: {err}"));
            }
        }
    }
    outcome
}

fn save_scan(
    paths: &AppPaths,
    image: &Path,
    user: &str,
    result: &DiagnosisResult,
) -> Result<ScanRecord> {
    let img = preprocess::open_image(image)?;
    let pool = db::init_database(paths)?;
    scans::persist_scan(&pool, &paths.scans_dir, user, &img, Local::now(), result)
}

fn run_history(paths: &AppPaths, user: &str, limit: Option<usize>) -> Result<()> {
    let pool = db::init_database(paths)?;
    let conn = pool.get()?;
    let scans = db::list_scans(&conn, user, limit)?;
    if scans.is_empty() {
        println!("No scans yet.");
    }
    for scan in scans {
        println!("{}", scan.history_line());
    }
    Ok(())
}

fn run_report(paths: &AppPaths, user: &str, scan_id: &str) -> Result<()> {
    let pool = db::init_database(paths)?;
    let conn = pool.get()?;
    let scan = db::get_scan(&conn, user, scan_id)?
        .ok_or_else(|| Error::NotFound(format!("scan {scan_id} for {user}")))?;
    let path = report::write_report(&paths.reports_dir, &ReportInput::from_scan(&scan))?;
    println!("{}", path.display());
    Ok(())
}

fn run_info(paths: &AppPaths, settings: &Settings) -> Result<()> {
    let runtime = onnx::ort_runtime_version().unwrap_or_else(|| "not bundled".into());
    println!("ONNX Runtime: {runtime}");
    println!("Data: {}", paths.root.display());
    println!("Database: {}", paths.db_path.display());
    println!("Model: {}", settings.analysis.model_path.display());
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::discover()?;
    let mut settings = Settings::load(&paths)?;
    match cli.command {
        Command::Analyze {
            image,
            user,
            no_save,
            report,
            json,
            model,
            threshold,
        } => {
            if let Some(model) = model {
                settings.analysis.model_path = paths.resolve_model(&model);
            }
            if let Some(threshold) = threshold {
                settings.analysis.probability_threshold = threshold;
            }
            let args = AnalyzeArgs {
                image,
                user,
                save: !no_save,
                report,
                json,
            };
            run_analyze(&paths, settings, args).await
        }
        Command::History { user, limit } => run_history(&paths, &user, limit),
        Command::Report { scan_id, user } => run_report(&paths, &user, &scan_id),
        Command::Info => run_info(&paths, &settings),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::SkinCondition;

    fn temp_paths(name: &str) -> AppPaths {
        let root = std::env::temp_dir().join(format!("dermalyze_main_{name}_{}", std::process::id()));
        AppPaths::at(root).unwrap()
    }

    fn args(image: PathBuf) -> AnalyzeArgs {
        AnalyzeArgs {
            image,
            user: "alice".into(),
            save: true,
            report: false,
            json: true,
        }
    }

    #[test]
    fn failed_save_keeps_the_diagnosis() {
        let paths = temp_paths("nosave");
        let diagnosis = Diagnosis::Confident(DiagnosisResult::for_condition(SkinCondition::Melanoma, 0.7));
        // The source image is gone by the time it would be copied.
        let outcome = record_outcome(&paths, &args(paths.root.join("vanished.jpg")), diagnosis.clone());
        assert_eq!(outcome.diagnosis, diagnosis);
        assert_eq!(outcome.scan_id, None);
        assert_eq!(outcome.warnings.len(), 1);
        let _ = std::fs::remove_dir_all(&paths.root);
    }

    #[test]
    fn inconclusive_is_never_saved() {
        let paths = temp_paths("inconclusive");
        let outcome = record_outcome(
            &paths,
            &args(paths.root.join("unused.jpg")),
            Diagnosis::Inconclusive { max_confidence: 0.3 },
        );
        assert!(outcome.scan_id.is_none());
        assert!(outcome.warnings.is_empty());
        assert!(!paths.db_path.exists());
        let _ = std::fs::remove_dir_all(&paths.root);
    }
}
