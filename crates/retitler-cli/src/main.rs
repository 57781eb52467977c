use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use retitler_core::config_file;
use retitler_core::{Config, Pipeline, ProgressEvent};
use retitler_pdf_mupdf::MupdfBackend;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod output;
mod settings;

use output::ColorMode;
use settings::RenameArgs;

/// Retitler - Rename academic PDFs to <year>_<title>.pdf using GROBID and first-page heuristics
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve metadata for every PDF in a directory and move it under its new name
    Rename(RenameArgs),

    /// Show the candidates and final metadata for one PDF without touching it
    Inspect {
        /// Path to the PDF to inspect
        file: PathBuf,

        /// GROBID header-extraction endpoint
        #[arg(long)]
        grobid_url: Option<String>,

        /// Skip the GROBID call and use first-page heuristics only
        #[arg(long)]
        no_grobid: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Write the effective configuration to the platform config file
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let file_config = config_file::load_config();
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

    match cli.command {
        Command::Rename(args) => {
            let settings = settings::resolve(&args, &file_config, &env)?;
            let _guard = init_logging(&settings.log_file)?;
            rename(settings, args.no_color).await
        }
        Command::Inspect {
            file,
            grobid_url,
            no_grobid,
            no_color,
        } => {
            let args = RenameArgs {
                grobid_url,
                no_grobid,
                dry_run: true,
                ..Default::default()
            };
            let settings = settings::resolve(&args, &file_config, &env)?;
            let _guard = init_logging(&settings.log_file)?;
            inspect(&file, settings.config, no_color).await
        }
        Command::InitConfig => {
            let settings = settings::resolve(&RenameArgs::default(), &file_config, &env)?;
            let path = config_file::save_config(&settings::to_config_file(&settings))
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("Wrote configuration to {}", path.display());
            Ok(())
        }
    }
}

/// Install the file logger. The returned guard flushes the log when dropped.
fn init_logging(log_file: &Path) -> anyhow::Result<WorkerGuard> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| anyhow::anyhow!("Failed to open log file {}: {}", log_file.display(), e))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn use_color(no_color: bool) -> ColorMode {
    ColorMode(!no_color && std::io::stdout().is_terminal())
}

async fn rename(settings: settings::Settings, no_color: bool) -> anyhow::Result<()> {
    let config = settings.config;
    if !config.source_dir.is_dir() {
        anyhow::bail!("Source directory not found: {}", config.source_dir.display());
    }
    let color = use_color(no_color);

    tracing::info!(
        source = %config.source_dir.display(),
        dest = %config.dest_dir.display(),
        grobid = config.grobid_enabled,
        url = %config.grobid_url,
        workers = config.num_workers,
        policy = config.collision_policy.as_str(),
        dry_run = config.dry_run,
        "starting run"
    );

    let pipeline = Pipeline::from_config(&config, Arc::new(MupdfBackend::new()));

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/dim}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let progress_bar = bar.clone();
    let progress_cb = move |event: ProgressEvent| match event {
        ProgressEvent::Started { total } => progress_bar.set_length(total as u64),
        ProgressEvent::Processing { file_name, .. } => progress_bar.set_message(file_name),
        ProgressEvent::Processed { .. } | ProgressEvent::Failed { .. } => progress_bar.inc(1),
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight documents");
            cancel_clone.cancel();
        }
    });

    let report = pipeline
        .run(&config.source_dir, config.num_workers, progress_cb, cancel)
        .await?;
    bar.finish_and_clear();

    let stats = report.stats();
    tracing::info!(
        total = stats.total,
        moved = stats.moved,
        source_retained = stats.source_retained,
        copy_failed = stats.copy_failed,
        skipped = stats.skipped,
        failed = stats.failed,
        structured = stats.structured,
        "run finished"
    );

    let mut stdout = std::io::stdout();
    if config.dry_run {
        writeln!(stdout, "Dry run: no files were copied or deleted.\n")?;
    }
    output::print_results_table(&mut stdout, &report, color)?;
    output::print_summary(&mut stdout, &report, color)?;

    if let Some(path) = settings.summary_path {
        retitler_reporting::export_summary(&report, settings.summary_format, &path)?;
        writeln!(stdout, "\nSummary written to {}", path.display())?;
    }
    Ok(())
}

async fn inspect(file: &Path, config: Config, no_color: bool) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let color = use_color(no_color);
    let pipeline = Pipeline::from_config(&config, Arc::new(MupdfBackend::new()));
    let analysis = pipeline.analyze(file).await?;

    let mut stdout = std::io::stdout();
    output::print_analysis(&mut stdout, &analysis, color)?;
    Ok(())
}
