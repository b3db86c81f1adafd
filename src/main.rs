//! inception-reports - statistics for exported INCEpTION projects
//!
//! A CLI tool that reads exported annotation-project archives, aggregates
//! annotation statistics across annotators and documents, and writes one
//! JSON report per project.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, unreadable directory, interruption, etc.)

mod analysis;
mod cas;
mod cli;
mod config;
mod error;
mod labels;
mod loader;
mod models;
mod report;

use anyhow::{Context, Result};
use chrono::Local;
use cli::Args;
use config::Config;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use labels::{resolve_project_labels, SparqlLabelResolver};
use loader::{ProjectArchive, ProjectLoader};
use models::ProjectReport;
use report::{build_project_report, build_reports_archive, export_project_data, write_atomically, write_summary, ReportOptions};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("inception-reports v{}", VERSION);

    match run_batch(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Batch failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .inception_reports.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE_NAME);
    println!("   Edit it to customize the aggregation mode, output directory and label lookups.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Shared state of one batch run.
struct BatchContext {
    loader: ProjectLoader,
    resolver: Option<SparqlLabelResolver>,
    project_ids: BTreeMap<String, String>,
    options: ReportOptions,
    output_dir: PathBuf,
    progress: ProgressBar,
    quiet: bool,
    cancelled: AtomicBool,
}

impl BatchContext {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn console(&self, line: &str) {
        if !self.quiet {
            self.progress.suspend(|| println!("{}", line));
        }
    }
}

/// Run the complete batch: load, resolve labels, build, export.
async fn run_batch(args: Args) -> Result<()> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let projects_dir = args
        .projects_dir
        .clone()
        .context("No projects directory given")?;
    let selected: Option<BTreeSet<String>> = args
        .projects
        .as_ref()
        .map(|names| names.iter().cloned().collect());

    let archives = loader::list_project_archives(&projects_dir, selected.as_ref())
        .with_context(|| format!("Failed to read {}", projects_dir.display()))?;

    if archives.is_empty() {
        println!("No project archives found in {}", projects_dir.display());
        return Ok(());
    }

    // Handle --dry-run: list archives and exit
    if args.dry_run {
        return handle_dry_run(&archives);
    }

    let loader = ProjectLoader::new(
        config.load_excluded_types(),
        config.load_translations()?,
        !args.quiet,
    );

    let resolver = match config.label_settings(args.password.as_deref()) {
        Some(settings) => {
            info!("Concept labels will be fetched from {}", settings.api_url);
            Some(SparqlLabelResolver::new(settings)?)
        }
        None => {
            debug!("No API credentials; concept labels are not resolved");
            None
        }
    };

    if !args.quiet {
        println!("📥 Processing {} project(s) from {}", archives.len(), projects_dir.display());
        println!("   Mode: {}", config.aggregation.mode);
        println!("   Output: {}", config.output_directory().display());
    }

    let created = Local::now().date_naive();
    let ctx = Arc::new(BatchContext {
        progress: loader.progress_bar(&archives),
        loader,
        resolver,
        project_ids: args.project_id_map(),
        options: ReportOptions {
            aggregation_mode: config.aggregation.mode,
            dashboard_version: Some(VERSION.to_string()),
            show_only_curated: config.aggregation.show_only_curated,
            created,
        },
        output_dir: config.output_directory(),
        quiet: args.quiet,
        cancelled: AtomicBool::new(false),
    });

    let mut results = stream::iter(archives.into_iter().map(|archive| process_project(archive, Arc::clone(&ctx))))
        .buffer_unordered(config.general.concurrency.max(1));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut reports: Vec<ProjectReport> = Vec::new();
    let mut failed = 0usize;
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                // Projects not started yet are skipped; running exports are awaited
                warn!("Interrupted; finishing projects already in progress");
                interrupted = true;
                ctx.cancel();
            }
            next = results.next() => match next {
                Some(Ok(Some(report))) => reports.push(report),
                Some(Ok(None)) => {}
                Some(Err(e)) => {
                    error!("{:#}", e);
                    failed += 1;
                }
                None => break,
            },
        }
    }
    drop(results);
    ctx.progress.finish_and_clear();

    reports.sort_by(|a, b| a.data.project_name.cmp(&b.data.project_name));

    if let Some(ref archive_path) = args.archive {
        let data: Vec<_> = reports.iter().map(|report| report.data.clone()).collect();
        match build_reports_archive(&data)? {
            Some(bytes) => {
                write_atomically(archive_path, &bytes)?;
                info!("Wrote archive {}", archive_path.display());
            }
            None => warn!("No reports to archive"),
        }
    }

    if let Some(ref summary_path) = args.summary {
        write_summary(&reports, created, args.top, summary_path)?;
        info!("Wrote summary {}", summary_path.display());
    }

    if interrupted {
        anyhow::bail!(
            "Interrupted after {} of the selected projects",
            reports.len()
        );
    }

    if !args.quiet {
        println!("\n📊 Batch Summary:");
        println!("   Reports exported: {}", reports.len());
        if failed > 0 {
            println!("   Failed: {}", failed);
        }
        println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
        println!(
            "\n✅ Done! Reports saved to: {}",
            ctx.output_dir.display()
        );
    }

    Ok(())
}

/// Load, label, build and export one project.
///
/// Returns `Ok(None)` for archives that were skipped while loading and
/// for projects reached after the batch was cancelled.
async fn process_project(archive: ProjectArchive, ctx: Arc<BatchContext>) -> Result<Option<ProjectReport>> {
    if ctx.is_cancelled() {
        return Ok(None);
    }

    let loaded = {
        let ctx = Arc::clone(&ctx);
        tokio::task::spawn_blocking(move || ctx.loader.load_or_skip(&archive, &ctx.progress))
            .await
            .context("Loading task failed")?
    };
    let Some(mut loaded) = loaded else {
        return Ok(None);
    };

    loaded.project.snomed_labels =
        resolve_project_labels(ctx.resolver.as_ref(), &loaded, &ctx.project_ids).await;
    if ctx.is_cancelled() {
        debug!("Skipping export of {} after interruption", loaded.project.name);
        return Ok(None);
    }

    let project = loaded.project;
    let report = {
        let ctx = Arc::clone(&ctx);
        tokio::task::spawn_blocking(move || -> Result<(ProjectReport, PathBuf)> {
            let report = build_project_report(&project, &ctx.options);
            let path = export_project_data(&report.data, &ctx.output_dir, ctx.options.created)
                .with_context(|| format!("Failed to export {}", project.name))?;
            Ok((report, path))
        })
        .await
        .context("Report task failed")??
    };
    let (report, path) = report;

    if ctx.options.show_only_curated && !report.has_curated_documents {
        ctx.console(&format!(
            "⚠️  {}: no curated documents, showing all documents",
            report.data.project_name
        ));
    }

    let documents: u64 = report.data.doc_categories.values().sum();
    let curated = report
        .data
        .doc_categories
        .get(&models::DocumentState::CurationFinished)
        .copied()
        .unwrap_or(0);
    ctx.console(&format!(
        "📦 {}: {} documents, {} curated, {} types ({}) → {}",
        report.data.project_name,
        documents,
        curated,
        report.type_counts.len(),
        if report.show_only_curated { "curated view" } else { "all documents" },
        path.display()
    ));

    Ok(Some(report))
}

/// Handle --dry-run: list the archives that would be processed, exit.
fn handle_dry_run(archives: &[ProjectArchive]) -> Result<()> {
    println!("\n🔍 Dry run: nothing is loaded or exported.\n");
    println!("   Found {} project archive(s):\n", archives.len());
    for archive in archives {
        println!("     📦 {} (project: {})", archive.file_name, archive.stem);
    }
    println!("\n✅ Dry run complete.");
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default locations
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
