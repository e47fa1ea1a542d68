//! `check` command: list a mapping's rules and compare them with an input
//! header.

use anyhow::{Result, bail};
use log::{info, warn};

use crate::{cli::CheckArgs, io_utils, mapping::MappingConfig, table};

pub fn execute(args: &CheckArgs) -> Result<()> {
    let config = MappingConfig::load(&args.map)?;
    let rows = rule_rows(&config);
    let headers = ["#", "field", "rule", "source"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows, None);
    info!("{:?} defines {} output field(s)", args.map, config.len());

    let Some(input) = &args.input else {
        return Ok(());
    };
    let delimiter = io_utils::resolve_input_delimiter(input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let mut reader = io_utils::open_csv_reader_from_path(input, delimiter)?;
    let input_headers = io_utils::reader_headers(&mut reader, encoding)?;

    let missing = config.missing_columns(&input_headers);
    if missing.is_empty() {
        info!(
            "All {} referenced column(s) are present in {:?}",
            config.referenced_columns().len(),
            input
        );
        return Ok(());
    }
    if args.strict {
        bail!("Strict mode: input is missing referenced columns: {missing:?}");
    }
    warn!("Input is missing referenced columns: {missing:?}");
    Ok(())
}

fn rule_rows(config: &MappingConfig) -> Vec<Vec<String>> {
    config
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, (field, rule))| {
            vec![
                (idx + 1).to_string(),
                field.clone(),
                rule.kind().to_string(),
                rule.describe(),
            ]
        })
        .collect()
}
