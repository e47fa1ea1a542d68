//! Catalog backup to CSV on a background worker.
//!
//! [`BackupJob::spawn`] starts a single thread that pages through the catalog
//! and writes one CSV row per product. The caller polls
//! [`BackupJob::progress`] while it runs and collects the result with
//! [`BackupJob::join`].

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde_json::Value;

use crate::catalog::{Catalog, Product};

pub const DEFAULT_PAGE_SIZE: usize = 100;

pub const BACKUP_HEADERS: &[&str] = &[
    "ID",
    "SKU",
    "Name",
    "Type",
    "Status",
    "Regular price",
    "Sale price",
    "Stock quantity",
    "Categories",
    "Tags",
    "Short description",
    "Description",
];

/// Snapshot of a running backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub pages_done: usize,
    /// Zero until the server has reported a page count.
    pub total_pages: usize,
    pub products: usize,
    pub finished: bool,
}

#[derive(Debug, Default)]
struct SharedProgress {
    pages_done: AtomicUsize,
    total_pages: AtomicUsize,
    products: AtomicUsize,
    finished: AtomicBool,
}

impl SharedProgress {
    /// Counters read after an observed `finished` flag are final.
    fn snapshot(&self) -> Progress {
        let finished = self.finished.load(Ordering::Acquire);
        Progress {
            pages_done: self.pages_done.load(Ordering::Relaxed),
            total_pages: self.total_pages.load(Ordering::Relaxed),
            products: self.products.load(Ordering::Relaxed),
            finished,
        }
    }
}

pub struct BackupJob {
    progress: Arc<SharedProgress>,
    handle: JoinHandle<Result<usize>>,
}

impl BackupJob {
    pub fn spawn<C, W>(catalog: Arc<C>, writer: csv::Writer<W>, per_page: usize) -> Self
    where
        C: Catalog + ?Sized + 'static,
        W: Write + Send + 'static,
    {
        let progress = Arc::new(SharedProgress::default());
        let worker_progress = Arc::clone(&progress);
        let handle = thread::spawn(move || {
            let result = run_backup(catalog.as_ref(), writer, per_page.max(1), &worker_progress);
            worker_progress.finished.store(true, Ordering::Release);
            result
        });
        BackupJob { progress, handle }
    }

    pub fn progress(&self) -> Progress {
        self.progress.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker and returns the number of products written.
    pub fn join(self) -> Result<usize> {
        self.handle
            .join()
            .map_err(|_| anyhow!("Backup worker panicked"))?
    }
}

fn run_backup<C, W>(
    catalog: &C,
    mut writer: csv::Writer<W>,
    per_page: usize,
    progress: &SharedProgress,
) -> Result<usize>
where
    C: Catalog + ?Sized,
    W: Write,
{
    writer
        .write_record(BACKUP_HEADERS)
        .context("Writing backup headers")?;
    let mut written = 0usize;
    let mut page = 1usize;
    loop {
        let listing = catalog
            .list_products(page, per_page)
            .with_context(|| format!("Fetching catalog page {page}"))?;
        if let Some(total) = listing.total_pages {
            progress.total_pages.store(total, Ordering::Relaxed);
        }
        if listing.products.is_empty() {
            break;
        }
        for product in &listing.products {
            writer
                .write_record(product_record(product))
                .with_context(|| format!("Writing product #{}", product.id))?;
        }
        written += listing.products.len();
        progress.products.store(written, Ordering::Relaxed);
        progress.pages_done.store(page, Ordering::Relaxed);
        debug!("Backed up page {page} ({} product(s))", listing.products.len());

        let last_page = listing.total_pages.is_some_and(|total| page >= total);
        if last_page || listing.products.len() < per_page {
            break;
        }
        page += 1;
    }
    writer.flush().context("Flushing backup output")?;
    Ok(written)
}

/// Flattens a product into the [`BACKUP_HEADERS`] column order.
pub fn product_record(product: &Product) -> Vec<String> {
    let data = &product.data;
    let text = |key: &str| match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let names = |key: &str| {
        data.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("name").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    };
    vec![
        product.id.to_string(),
        text("sku"),
        text("name"),
        text("type"),
        text("status"),
        text("regular_price"),
        text("sale_price"),
        text("stock_quantity"),
        names("categories"),
        names("tags"),
        text("short_description"),
        text("description"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_record_flattens_lists_and_numbers() {
        let product = Product {
            id: 12,
            data: json!({
                "id": 12,
                "sku": "A1",
                "name": "Lamp",
                "stock_quantity": 3,
                "sale_price": null,
                "categories": [{"id": 1, "name": "Lamps"}, {"id": 2, "name": "Office"}],
            }),
        };
        let record = product_record(&product);
        assert_eq!(record.len(), BACKUP_HEADERS.len());
        assert_eq!(record[0], "12");
        assert_eq!(record[1], "A1");
        assert_eq!(record[6], "");
        assert_eq!(record[7], "3");
        assert_eq!(record[8], "Lamps, Office");
        assert_eq!(record[9], "");
    }
}
