//! Effective settings for a run: CLI flags > env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use retitler_core::config_file::{
    ConfigFile, PathsConfig, ProcessingConfig, ServiceConfig, SummaryConfig,
};
use retitler_core::{CollisionPolicy, Config, DEFAULT_DEST_DIR_NAME, DEFAULT_GROBID_URL};
use retitler_reporting::ExportFormat;

pub const DEFAULT_LOG_FILE: &str = "retitler.log";

/// Flags of the `rename` subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct RenameArgs {
    /// Directory containing the PDFs to rename (default: current directory)
    pub source_dir: Option<PathBuf>,

    /// Destination directory (default: <SOURCE_DIR>/renamed_pdfs)
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// GROBID header-extraction endpoint
    #[arg(long)]
    pub grobid_url: Option<String>,

    /// Skip the GROBID call and use first-page heuristics only
    #[arg(long)]
    pub no_grobid: bool,

    /// GROBID request timeout in seconds (0 disables the timeout)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of documents processed concurrently
    #[arg(long)]
    pub workers: Option<usize>,

    /// What to do when the new name already exists: overwrite, suffix, or skip
    #[arg(long, value_name = "POLICY")]
    pub on_collision: Option<CollisionPolicy>,

    /// Print the planned names without copying or deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Path of the log file (default: ./retitler.log)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Also write the batch summary to this file
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,

    /// Summary file format: text, csv, json, or markdown
    #[arg(long)]
    pub format: Option<ExportFormat>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Fully resolved settings for a `rename` run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub log_file: PathBuf,
    pub summary_path: Option<PathBuf>,
    pub summary_format: ExportFormat,
}

fn env_parse<T: std::str::FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}

/// Resolve run settings. `env` looks up environment variables.
pub fn resolve(
    args: &RenameArgs,
    file: &ConfigFile,
    env: &dyn Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let service = file.service.clone().unwrap_or_default();
    let paths = file.paths.clone().unwrap_or_default();
    let processing = file.processing.clone().unwrap_or_default();
    let summary = file.summary.clone().unwrap_or_default();

    let source_dir = args
        .source_dir
        .clone()
        .or_else(|| env("RETITLER_SOURCE_DIR").map(PathBuf::from))
        .or_else(|| paths.source_dir.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let dest_dir = args
        .dest
        .clone()
        .or_else(|| env("RETITLER_DEST_DIR").map(PathBuf::from))
        .or_else(|| paths.dest_dir.map(PathBuf::from))
        .unwrap_or_else(|| source_dir.join(DEFAULT_DEST_DIR_NAME));
    let log_file = args
        .log_file
        .clone()
        .or_else(|| env("RETITLER_LOG_FILE").map(PathBuf::from))
        .or_else(|| paths.log_file.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

    let grobid_url = args
        .grobid_url
        .clone()
        .or_else(|| env("GROBID_URL"))
        .or(service.url)
        .unwrap_or_else(|| DEFAULT_GROBID_URL.to_string());
    let grobid_enabled = !(args.no_grobid || service.disabled.unwrap_or(false));
    let timeout_secs = args
        .timeout
        .or_else(|| env_parse(env, "GROBID_TIMEOUT"))
        .or(service.timeout_secs);
    let request_timeout = timeout_secs
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs);

    let num_workers = args
        .workers
        .or_else(|| env_parse(env, "RETITLER_WORKERS"))
        .or(processing.num_workers)
        .unwrap_or(1);
    if num_workers == 0 {
        anyhow::bail!("--workers must be at least 1");
    }

    let collision_policy = args
        .on_collision
        .or(processing.collision_policy)
        .unwrap_or_default();
    let dry_run = args.dry_run || processing.dry_run.unwrap_or(false);

    let summary_path = args.summary.clone().or_else(|| summary.path.map(PathBuf::from));
    let summary_format = match args.format {
        Some(format) => format,
        None => match summary.format {
            Some(name) => name.parse()?,
            None => summary_path
                .as_deref()
                .and_then(Path::extension)
                .and_then(|ext| ExportFormat::from_extension(&ext.to_string_lossy()))
                .unwrap_or_default(),
        },
    };

    Ok(Settings {
        config: Config {
            grobid_url,
            grobid_enabled,
            request_timeout,
            source_dir,
            dest_dir,
            num_workers,
            collision_policy,
            dry_run,
        },
        log_file,
        summary_path,
        summary_format,
    })
}

/// The effective settings written back as a config file.
pub fn to_config_file(settings: &Settings) -> ConfigFile {
    let config = &settings.config;
    ConfigFile {
        service: Some(ServiceConfig {
            url: Some(config.grobid_url.clone()),
            timeout_secs: config.request_timeout.map(|t| t.as_secs()),
            disabled: Some(!config.grobid_enabled),
        }),
        paths: Some(PathsConfig {
            source_dir: Some(config.source_dir.display().to_string()),
            dest_dir: Some(config.dest_dir.display().to_string()),
            log_file: Some(settings.log_file.display().to_string()),
        }),
        processing: Some(ProcessingConfig {
            num_workers: Some(config.num_workers),
            collision_policy: Some(config.collision_policy),
            dry_run: Some(config.dry_run),
        }),
        summary: Some(SummaryConfig {
            format: Some(format_name(settings.summary_format).to_string()),
            path: settings
                .summary_path
                .as_ref()
                .map(|p| p.display().to_string()),
        }),
    }
}

fn format_name(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Text => "text",
        ExportFormat::Csv => "csv",
        ExportFormat::Json => "json",
        ExportFormat::Markdown => "markdown",
    }
}
