//! ReportEx CLI entry point
//!
//! The binary is the scheduler's caller: it owns report persistence,
//! progress accounting, and the decision to stop the run on fatal errors.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use eyre::{Context, Result, bail};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use reportex::cli::{Cli, Command};
use reportex::config::Config;
use reportex::extraction::{
    ExtractionTask, Extractor, Report, build_extraction_tasks, count_extraction_progress,
    update_report_with_extraction,
};
use reportex::llm::{DEFAULT_GEMINI_BASE_URL, DEFAULT_OPENAI_BASE_URL, LlmError, create_client};
use reportex::results::{Provenance, ResultsDocument, combine_extracted_data, convert_to_csv};
use reportex::scheduler::{AdaptiveRateLimiter, DynamicScheduler, TerminateReason, TerminationFlag};

fn setup_logging(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "loaded config");

    match cli.command {
        Command::Extract {
            reports,
            out,
            csv,
            model,
        } => cmd_extract(config, &reports, out, csv, model).await,
        Command::Models => cmd_models(&config).await,
        Command::Validate => cmd_validate(&config).await,
    }
}

/// List models available to the configured credentials
async fn cmd_models(config: &Config) -> Result<()> {
    let client = create_client(&config.llm)?;
    let models = client.list_models().await?;

    if models.is_empty() {
        println!("No models available.");
        return Ok(());
    }

    for model in models {
        if model.display_name != model.id {
            println!("{}  ({})", model.id, model.display_name);
        } else {
            println!("{}", model.id);
        }
    }
    Ok(())
}

/// Check the configured credentials against the endpoint
async fn cmd_validate(config: &Config) -> Result<()> {
    let client = create_client(&config.llm)?;

    if client.validate_credentials().await? {
        println!("✓ API credentials are valid.");
        Ok(())
    } else {
        bail!("API credentials were rejected. Please check your API key.");
    }
}

/// Run extraction over every report×schema pair that is not yet satisfied
async fn cmd_extract(
    mut config: Config,
    reports_dir: &Path,
    out: Option<PathBuf>,
    csv: Option<PathBuf>,
    model_override: Option<String>,
) -> Result<()> {
    if let Some(model) = model_override {
        config.llm.model = model;
    }

    let missing = config.missing_info();
    if !missing.is_empty() {
        eprintln!("Cannot start extraction; missing:");
        for item in &missing {
            eprintln!("  - {item}");
        }
        bail!("missing prerequisites");
    }

    let system_prompt: Arc<str> = Arc::from(config.extraction.resolve_system_prompt()?);
    let schemas = config.extraction.load_schemas()?;
    let mut reports = load_reports(reports_dir)?;
    if reports.is_empty() {
        bail!("no .txt reports found in {}", reports_dir.display());
    }

    let model: Arc<str> = Arc::from(config.llm.model.as_str());
    let tasks = build_extraction_tasks(&reports, &schemas, &system_prompt, &model);
    let started_at = Utc::now();

    if tasks.is_empty() {
        info!("all schemas for all reports are already extracted");
        return write_outputs(&config, &reports, started_at, out, csv);
    }

    let client = create_client(&config.llm)?;
    let limiter = Arc::new(AdaptiveRateLimiter::new(config.limiter.clone()));
    let flag = TerminationFlag::new();

    // The Stop button: first Ctrl-C lets in-flight calls finish.
    let ctrlc_flag = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStop requested; letting in-flight calls finish...");
            ctrlc_flag.terminate(TerminateReason::Requested);
        }
    });

    let extractor =
        Extractor::new(client, &config.extraction, flag.clone()).with_limiter(Arc::clone(&limiter));
    let scheduler = DynamicScheduler::new(
        config.scheduler.clone(),
        Arc::clone(&limiter),
        Arc::new(extractor),
        flag.clone(),
    );

    let total_reports = reports.len();
    let schemas_per_report = schemas.len();
    let progress = count_extraction_progress(&reports, schemas_per_report);
    let total_units = tasks.len() + progress.completed_tasks;
    let mut completed_tasks = progress.completed_tasks;
    let mut completed_reports = progress.completed_reports;
    let mut per_report = progress.per_report;

    let reports_by_id: HashMap<Uuid, usize> =
        reports.iter().enumerate().map(|(index, r)| (r.id, index)).collect();
    let report_slots = &mut reports;

    let on_task_done = |task: &ExtractionTask, outcome: &Result<Value, LlmError>| {
        completed_tasks += 1;

        match outcome {
            Err(err) if err.is_auth() => {
                eprintln!("Authentication failed: your API key was rejected. Stopping the run.");
                flag.terminate(TerminateReason::AuthFailure);
                return;
            }
            Err(err) => {
                warn!(report = %task.report_name, schema_id = task.schema_id, error = %err, "task failed");
                if let Some(&index) = reports_by_id.get(&task.report_id) {
                    update_report_with_extraction(&mut report_slots[index], task.schema_id, None);
                }
                if limiter.should_terminate_early() {
                    eprintln!("The endpoint keeps rate limiting us; stopping the run early.");
                    flag.terminate(TerminateReason::RateLimited);
                }
            }
            Ok(value) => {
                if let Some(&index) = reports_by_id.get(&task.report_id) {
                    update_report_with_extraction(&mut report_slots[index], task.schema_id, Some(value.clone()));
                }
            }
        }

        let count = per_report.entry(task.report_id).or_insert(0);
        *count += 1;
        if *count == schemas_per_report {
            completed_reports += 1;
        }

        println!(
            "  tasks {completed_tasks}/{total_units}, reports {completed_reports}/{total_reports}"
        );
    };

    println!(
        "Extracting {} report×schema pairs from {} reports...",
        tasks.len(),
        total_reports
    );
    let summary = scheduler.run(&tasks, on_task_done, || {}).await;

    write_outputs(&config, &reports, started_at, out, csv)?;

    match summary.reason {
        Some(TerminateReason::AuthFailure) => bail!("extraction aborted: invalid API credentials"),
        Some(TerminateReason::RateLimited) => {
            println!(
                "Extraction stopped early after {}/{} tasks: the API rate limit was hit repeatedly. \
                 Re-run later to continue with the remaining reports.",
                summary.dispatched, summary.total
            );
        }
        Some(TerminateReason::Requested) => {
            println!("Extraction stopped after {}/{} tasks.", summary.dispatched, summary.total);
        }
        None => {
            println!("Extraction complete: {} tasks.", summary.dispatched);
        }
    }

    Ok(())
}

/// Read every .txt file in the directory as a report
fn load_reports(dir: &Path) -> Result<Vec<Report>> {
    let entries = fs::read_dir(dir).context(format!("Failed to read reports directory {}", dir.display()))?;

    let mut reports = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let content =
            fs::read_to_string(&path).context(format!("Failed to read report {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("untitled.txt")
            .to_string();
        reports.push(Report::new(name, content));
    }

    reports.sort_by(|a, b| a.name.cmp(&b.name));
    info!(count = reports.len(), dir = %dir.display(), "loaded reports");
    Ok(reports)
}

fn completions_endpoint(config: &Config) -> String {
    match config.llm.provider.as_str() {
        "gemini" => {
            let base = if config.llm.base_url.is_empty() {
                DEFAULT_GEMINI_BASE_URL
            } else {
                &config.llm.base_url
            };
            format!("{}/models/{}:generateContent", base, config.llm.model)
        }
        _ => {
            let base = if config.llm.base_url.is_empty() {
                DEFAULT_OPENAI_BASE_URL
            } else {
                &config.llm.base_url
            };
            format!("{base}/chat/completions")
        }
    }
}

/// Persist combined extraction results as JSON (and optionally CSV)
fn write_outputs(
    config: &Config,
    reports: &[Report],
    started_at: chrono::DateTime<Utc>,
    out: Option<PathBuf>,
    csv: Option<PathBuf>,
) -> Result<()> {
    let rows = combine_extracted_data(reports);
    let document = ResultsDocument {
        provenance: Provenance {
            started_at,
            ended_at: Utc::now(),
            endpoint: completions_endpoint(config),
            model: config.llm.model.clone(),
        },
        data: rows,
    };

    let json = serde_json::to_string_pretty(&document)?;
    match &out {
        Some(path) => {
            fs::write(path, &json).context(format!("Failed to write results to {}", path.display()))?;
            println!("Results written to {}", path.display());
        }
        None => println!("{json}"),
    }

    if let Some(path) = &csv {
        let csv_text = convert_to_csv(&document.data);
        fs::write(path, csv_text).context(format!("Failed to write CSV to {}", path.display()))?;
        println!("CSV written to {}", path.display());
    }

    Ok(())
}
