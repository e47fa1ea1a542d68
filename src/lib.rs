pub mod backup;
pub mod catalog;
pub mod cli;
pub mod engine;
pub mod io_utils;
pub mod mapping;
pub mod payload;
pub mod process;
pub mod sync;
pub mod table;
pub mod update;
pub mod verify;

use std::{env, path::PathBuf, sync::Arc, sync::OnceLock, thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use encoding_rs::UTF_8;
use log::{LevelFilter, info};

use crate::{
    backup::BackupJob,
    catalog::HttpCatalog,
    cli::{BackupArgs, Cli, Commands},
};

pub use crate::engine::{InputRow, OutputRow, TransformOutput, Warning, transform, transform_with};
pub use crate::mapping::{MappingConfig, MappingError, MappingRule, load_config};

static LOGGER: OnceLock<()> = OnceLock::new();

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(250);

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("catalog_mapper", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Transform(args) => process::execute(&args),
        Commands::Check(args) => verify::execute(&args),
        Commands::Update(args) => update::execute(&args),
        Commands::Backup(args) => handle_backup(&args),
    }
}

fn handle_backup(args: &BackupArgs) -> Result<()> {
    let output = args.output.clone().unwrap_or_else(default_backup_path);
    info!(
        "Backing up catalog {} to {:?} ({} per page)",
        args.catalog.url, output, args.per_page
    );
    let catalog = Arc::new(
        HttpCatalog::new(args.catalog.credentials()).context("Configuring catalog client")?,
    );
    let writer = io_utils::open_csv_writer(Some(&output), io_utils::DEFAULT_CSV_DELIMITER, UTF_8)?;
    let job = BackupJob::spawn(catalog, writer, args.per_page);

    let mut last_reported = None;
    while !job.is_finished() {
        let progress = job.progress();
        if last_reported != Some(progress.pages_done) {
            if progress.total_pages > 0 {
                info!(
                    "Backup progress: page {}/{} ({} product(s))",
                    progress.pages_done, progress.total_pages, progress.products
                );
            } else {
                info!(
                    "Backup progress: page {} ({} product(s))",
                    progress.pages_done, progress.products
                );
            }
            last_reported = Some(progress.pages_done);
        }
        thread::sleep(PROGRESS_POLL_INTERVAL);
    }

    let written = job
        .join()
        .with_context(|| format!("Backing up catalog to {output:?}"))?;
    info!("Backed up {written} product(s) to {output:?}");
    Ok(())
}

fn default_backup_path() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    PathBuf::from(format!("catalog-backup-{stamp}.csv"))
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
