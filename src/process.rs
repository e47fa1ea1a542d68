//! `transform` command: read, map, and write a CSV file.
//!
//! The whole input is loaded before mapping so that a strict-mode failure
//! leaves no partial output behind.

use anyhow::{Context, Result, bail};
use encoding_rs::UTF_8;
use log::{debug, info, warn};

use crate::{
    cli::{InputArgs, TransformArgs},
    engine::{self, TransformOptions, TransformOutput, Warning},
    io_utils,
    mapping::MappingConfig,
    table,
};

/// Warnings echoed to the log before the rest are summarized.
const LOGGED_WARNINGS: usize = 10;

pub fn execute(args: &TransformArgs) -> Result<()> {
    let output_path = args.output.as_deref();
    let output = load_and_transform(&args.source)?;

    if args.preview {
        let rows = output
            .rows
            .iter()
            .take(args.rows)
            .map(|row| row.values())
            .collect::<Vec<_>>();
        table::print_table(&output.headers, &rows, Some(table::PREVIEW_CELL_WIDTH));
        info!(
            "Displayed {} of {} transformed row(s)",
            rows.len(),
            output.rows.len()
        );
    } else {
        let input_delimiter =
            io_utils::resolve_input_delimiter(&args.source.input, args.source.delimiter);
        let output_delimiter =
            io_utils::resolve_output_delimiter(output_path, args.output_delimiter, input_delimiter);
        let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
        let mut writer =
            io_utils::open_csv_writer(output_path, output_delimiter, output_encoding)?;
        io_utils::write_output(&mut writer, &output)?;
        info!(
            "Wrote {} row(s) x {} field(s) to {}",
            output.rows.len(),
            output.headers.len(),
            output_path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stdout".into())
        );
    }

    if let Some(path) = &args.warnings {
        write_warnings(path, &output.warnings)
            .with_context(|| format!("Writing warnings to {path:?}"))?;
    }
    Ok(())
}

/// Loads the mapping and input named by `args` and runs the engine.
pub fn load_and_transform(args: &InputArgs) -> Result<TransformOutput> {
    let config = MappingConfig::load(&args.map)?;
    debug!("Loaded {} mapping rule(s) from {:?}", config.len(), args.map);

    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Mapping '{}' with {:?} (delimiter '{}', strict {})",
        args.input.display(),
        args.map,
        crate::printable_delimiter(delimiter),
        args.strict
    );
    let input = io_utils::read_input(&args.input, delimiter, encoding)?;

    let missing = config.missing_columns(&input.headers);
    if !missing.is_empty() {
        if args.strict {
            bail!("Strict mode: input is missing referenced columns: {missing:?}");
        }
        warn!("Input is missing referenced columns: {missing:?}");
    }

    let options = TransformOptions {
        strict: args.strict,
        concat_policy: args.concat_missing,
    };
    let output = engine::transform_with(&config, &input.rows, &options)
        .with_context(|| format!("Transforming {:?}", args.input))?;
    report_warnings(&output.warnings);
    Ok(output)
}

pub fn report_warnings(warnings: &[Warning]) {
    for warning in warnings.iter().take(LOGGED_WARNINGS) {
        warn!("{warning}");
    }
    if warnings.len() > LOGGED_WARNINGS {
        warn!(
            "... {} more missing-column warning(s)",
            warnings.len() - LOGGED_WARNINGS
        );
    }
}

fn write_warnings(path: &std::path::Path, warnings: &[Warning]) -> Result<()> {
    let mut writer =
        io_utils::open_csv_writer(Some(path), io_utils::DEFAULT_CSV_DELIMITER, UTF_8)?;
    if warnings.is_empty() {
        writer.write_record(["row", "field", "column"])?;
    }
    // serialize() emits the header row before the first record.
    for warning in warnings {
        writer.serialize(warning)?;
    }
    writer.flush()?;
    info!("Wrote {} warning(s) to {path:?}", warnings.len());
    Ok(())
}
