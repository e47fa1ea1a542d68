//! `update` command: transform an input file and push it to the catalog.

use anyhow::{Context, Result, bail};
use itertools::Itertools;
use log::{error, info};

use crate::{
    catalog::HttpCatalog,
    cli::UpdateArgs,
    process,
    sync::{SyncOptions, SyncReport, update_catalog},
    table,
};

pub fn execute(args: &UpdateArgs) -> Result<()> {
    let output = process::load_and_transform(&args.source)?;
    if !output.headers.iter().any(|field| field == &args.sku_field) {
        bail!(
            "Mapping does not produce the SKU field '{}' required to match products",
            args.sku_field
        );
    }

    let catalog =
        HttpCatalog::new(args.catalog.credentials()).context("Configuring catalog client")?;
    let options = SyncOptions {
        sku_field: args.sku_field.clone(),
        dry_run: args.dry_run,
    };
    info!(
        "{} {} product row(s) against {}",
        if args.dry_run { "Comparing" } else { "Updating" },
        output.rows.len(),
        args.catalog.url
    );
    let report = update_catalog(&catalog, &output.rows, &options);
    print_report(&report, args);

    if report.nothing_succeeded() {
        bail!("{} product(s) failed to update", report.failed);
    }
    Ok(())
}

fn print_report(report: &SyncReport, args: &UpdateArgs) {
    if args.dry_run {
        for diff in &report.diffs {
            print!("{}", diff.render());
        }
        let headers = ["sku", "product", "changed fields"]
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();
        let rows = report
            .diffs
            .iter()
            .map(|diff| {
                vec![
                    diff.sku.clone(),
                    diff.product_id.to_string(),
                    diff.changes
                        .iter()
                        .map(|change| change.field.as_str())
                        .join(", "),
                ]
            })
            .collect::<Vec<_>>();
        if !rows.is_empty() {
            table::print_table(&headers, &rows, Some(table::PREVIEW_CELL_WIDTH));
        }
        info!(
            "Dry run: {} product(s) would change, {} already up to date",
            report.diffs.len(),
            report.unchanged
        );
    } else if report.updated > 0 {
        info!("Successfully updated {} product(s)", report.updated);
    }

    if report.failed > 0 {
        error!("{} product(s) failed to update.", report.failed);
        for message in report.errors.iter().take(args.max_errors) {
            error!("{message}");
        }
    }
}
