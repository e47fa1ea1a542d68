use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

use catalog_mapper::{
    OutputRow,
    backup::{BACKUP_HEADERS, BackupJob},
    catalog::{Catalog, CatalogError, Product, ProductPage},
    sync::{SyncOptions, update_catalog},
};
use serde_json::{Value, json};

/// In-memory catalog recording every update it receives.
#[derive(Default)]
struct FakeCatalog {
    products: Vec<Product>,
    updates: Mutex<Vec<(u64, Value)>>,
    reject: Option<u64>,
    lookup_outage: Option<String>,
    broken_page: Option<usize>,
}

impl FakeCatalog {
    fn with_products(products: Vec<Value>) -> Self {
        FakeCatalog {
            products: products
                .into_iter()
                .map(|data| Product::from_value(data).expect("product"))
                .collect(),
            ..FakeCatalog::default()
        }
    }
}

impl Catalog for FakeCatalog {
    fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, CatalogError> {
        if self.lookup_outage.as_deref() == Some(sku) {
            return Err(CatalogError::Network("connection reset".to_string()));
        }
        Ok(self.products.iter().find(|p| p.sku() == sku).cloned())
    }

    fn update_product(&self, id: u64, payload: &Value) -> Result<(), CatalogError> {
        if self.reject == Some(id) {
            return Err(CatalogError::Api {
                status: 400,
                url: format!("products/{id}"),
                message: "invalid".to_string(),
            });
        }
        self.updates.lock().unwrap().push((id, payload.clone()));
        Ok(())
    }

    fn list_products(&self, page: usize, per_page: usize) -> Result<ProductPage, CatalogError> {
        if self.broken_page == Some(page) {
            return Err(CatalogError::Api {
                status: 500,
                url: format!("products?page={page}"),
                message: "internal error".to_string(),
            });
        }
        let start = (page - 1) * per_page;
        let products = self
            .products
            .iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .collect();
        Ok(ProductPage {
            products,
            total_pages: Some(self.products.len().div_ceil(per_page)),
        })
    }
}

fn output_row(cells: &[(&str, &str)]) -> OutputRow {
    cells.iter().copied().collect()
}

fn sample_catalog() -> FakeCatalog {
    FakeCatalog::with_products(vec![
        json!({"id": 1, "sku": "A1", "name": "Lamp", "categories": [{"id": 9, "name": "Lamps"}]}),
        json!({"id": 2, "sku": "A2", "name": "Desk"}),
    ])
}

#[test]
fn update_counts_successes_and_failures() {
    let mut catalog = sample_catalog();
    catalog.reject = Some(2);
    let rows = vec![
        output_row(&[("SKU", "A1"), ("Name", "Lamp XL"), ("Categories", "Lamps, Office")]),
        output_row(&[("SKU", "A2"), ("Name", "Desk")]),
        output_row(&[("SKU", "ZZ"), ("Name", "Ghost")]),
        output_row(&[("SKU", " "), ("Name", "No sku")]),
    ];
    let report = update_catalog(&catalog, &rows, &SyncOptions::default());

    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 3);
    assert!(report.errors[0].starts_with("SKU A2: Update failed - API error 400"));
    assert_eq!(report.errors[1], "Product not found with SKU: ZZ");
    assert_eq!(report.errors[2], "Row missing SKU");

    let updates = catalog.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, 1);
    assert_eq!(
        updates[0].1,
        json!({"name": "Lamp XL", "categories": [{"name": "Lamps"}, {"name": "Office"}]})
    );
}

#[test]
fn lookup_errors_are_reported_and_the_loop_continues() {
    let mut catalog = sample_catalog();
    catalog.lookup_outage = Some("A1".to_string());
    let rows = vec![
        output_row(&[("SKU", "A1"), ("Name", "Lamp XL")]),
        output_row(&[("SKU", "A2"), ("Name", "Desk XL")]),
    ];
    let report = update_catalog(&catalog, &rows, &SyncOptions::default());

    assert_eq!(report.failed, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.errors, vec!["SKU A1: network error: connection reset"]);
    assert!(!report.nothing_succeeded());
    let updates = catalog.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, 2);
}

#[test]
fn report_without_any_success_is_flagged() {
    let catalog = sample_catalog();
    let rows = vec![
        output_row(&[("SKU", "ZZ"), ("Name", "Ghost")]),
        output_row(&[("Name", "No sku")]),
    ];
    let report = update_catalog(&catalog, &rows, &SyncOptions::default());
    assert_eq!(report.failed, 2);
    assert!(report.nothing_succeeded());

    let partial = update_catalog(
        &catalog,
        &[
            output_row(&[("SKU", "ZZ")]),
            output_row(&[("SKU", "A2"), ("Name", "Desk")]),
        ],
        &SyncOptions::default(),
    );
    assert_eq!(partial.updated, 1);
    assert!(!partial.nothing_succeeded());

    let empty = update_catalog(&catalog, &[], &SyncOptions::default());
    assert!(!empty.nothing_succeeded());
}

#[test]
fn dry_run_reports_diffs_without_updating() {
    let catalog = sample_catalog();
    let rows = vec![
        output_row(&[("SKU", "A1"), ("Name", "Lamp XL"), ("Categories", "Lamps")]),
        output_row(&[("SKU", "A2"), ("Name", "Desk")]),
    ];
    let options = SyncOptions {
        dry_run: true,
        ..SyncOptions::default()
    };
    let report = update_catalog(&catalog, &rows, &options);

    assert_eq!(report.updated, 0);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.diffs.len(), 1);
    let diff = &report.diffs[0];
    assert_eq!(diff.product_id, 1);
    assert_eq!(diff.changes.len(), 1);
    assert_eq!(diff.changes[0].field, "name");
    let rendered = diff.render();
    assert!(rendered.contains("-name: Lamp"));
    assert!(rendered.contains("+name: Lamp XL"));
    assert!(catalog.updates.lock().unwrap().is_empty());
}

/// Writer whose bytes stay readable after the backup thread drops it.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn backup_pages_through_the_catalog() {
    let products = (1..=5)
        .map(|id| json!({"id": id, "sku": format!("S{id}"), "name": format!("Item {id}")}))
        .collect();
    let catalog = Arc::new(FakeCatalog::with_products(products));
    let buffer = SharedBuffer::default();
    let writer = csv::Writer::from_writer(buffer.clone());

    let job = BackupJob::spawn(catalog, writer, 2);
    let written = job.join().expect("backup succeeds");
    assert_eq!(written, 5);

    let bytes = buffer.0.lock().unwrap().clone();
    let mut reader = csv::Reader::from_reader(bytes.as_slice());
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), BACKUP_HEADERS);
    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .expect("records");
    assert_eq!(records.len(), 5);
    assert_eq!(&records[4][1], "S5");
    assert_eq!(&records[4][2], "Item 5");
}

#[test]
fn backup_progress_reaches_completion() {
    let catalog = Arc::new(sample_catalog());
    let writer = csv::Writer::from_writer(io::sink());
    let job = BackupJob::spawn(catalog, writer, 10);
    while !job.is_finished() {
        std::thread::yield_now();
    }
    let progress = job.progress();
    assert!(progress.finished);
    assert_eq!(progress.products, 2);
    assert_eq!(progress.pages_done, 1);
    assert_eq!(progress.total_pages, 1);
    assert_eq!(job.join().expect("backup succeeds"), 2);
}

#[test]
fn backup_surfaces_page_errors_through_join() {
    let products = (1..=5)
        .map(|id| json!({"id": id, "sku": format!("S{id}")}))
        .collect();
    let mut catalog = FakeCatalog::with_products(products);
    catalog.broken_page = Some(2);
    let job = BackupJob::spawn(Arc::new(catalog), csv::Writer::from_writer(io::sink()), 2);

    let err = job.join().unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Fetching catalog page 2"));
    assert!(message.contains("API error 500"));
}
