use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    backup::DEFAULT_PAGE_SIZE,
    catalog::CatalogCredentials,
    mapping::ConcatPolicy,
    payload::DEFAULT_SKU_FIELD,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Map product CSV columns and sync them with a catalog",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Re-map the columns of a CSV file using a mapping document
    Transform(TransformArgs),
    /// Validate a mapping document, optionally against an input header
    Check(CheckArgs),
    /// Transform a CSV file and update matching catalog products by SKU
    Update(UpdateArgs),
    /// Export every catalog product to a CSV file
    Backup(BackupArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Mapping document (.yaml, .yml or .json)
    #[arg(short = 'm', long = "map")]
    pub map: PathBuf,
    /// CSV delimiter character for reading input (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Fail on the first missing source column instead of warning
    #[arg(long)]
    pub strict: bool,
    /// How concatenations treat a missing column: keep its separator (pad) or drop it (skip)
    #[arg(long = "concat-missing", default_value = "pad", value_parser = parse_concat_policy)]
    pub concat_missing: ConcatPolicy,
}

#[derive(Debug, Args)]
pub struct TransformArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Delimiter to use for output (defaults to input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding for the output file/stdout (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Render the first rows as a table instead of writing CSV
    #[arg(long, conflicts_with = "output")]
    pub preview: bool,
    /// Number of rows shown by --preview
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// Write collected missing-column warnings to this CSV file
    #[arg(long)]
    pub warnings: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Mapping document (.yaml, .yml or .json)
    #[arg(short = 'm', long = "map")]
    pub map: PathBuf,
    /// Input CSV whose header is checked against the referenced columns
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,
    /// CSV delimiter character for reading input
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Treat referenced columns absent from the header as an error
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// Store URL of the catalog
    #[arg(long = "url", env = "WOOCOMMERCE_URL")]
    pub url: String,
    /// API consumer key
    #[arg(long = "consumer-key", env = "WOOCOMMERCE_CONSUMER_KEY")]
    pub consumer_key: String,
    /// API consumer secret
    #[arg(long = "consumer-secret", env = "WOOCOMMERCE_CONSUMER_SECRET", hide_env_values = true)]
    pub consumer_secret: String,
}

impl CatalogArgs {
    pub fn credentials(&self) -> CatalogCredentials {
        CatalogCredentials {
            url: self.url.clone(),
            consumer_key: self.consumer_key.clone(),
            consumer_secret: self.consumer_secret.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub source: InputArgs,
    #[command(flatten)]
    pub catalog: CatalogArgs,
    /// Output field holding the product SKU
    #[arg(long = "sku-field", default_value = DEFAULT_SKU_FIELD)]
    pub sku_field: String,
    /// Look products up and show what would change without updating them
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Maximum number of per-row errors to print
    #[arg(long = "max-errors", default_value_t = 10)]
    pub max_errors: usize,
}

#[derive(Debug, Args)]
pub struct BackupArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,
    /// Destination CSV file (defaults to a timestamped file in the current directory)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Products requested per page
    #[arg(long = "per-page", default_value_t = DEFAULT_PAGE_SIZE)]
    pub per_page: usize,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_concat_policy(value: &str) -> Result<ConcatPolicy, String> {
    value.parse()
}
