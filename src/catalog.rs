//! REST client for the remote product catalog.
//!
//! The catalog is a WooCommerce-compatible `wc/v3` API: products are looked
//! up by SKU, updated by numeric id, and listed page by page. Callers program
//! against the [`Catalog`] trait; [`HttpCatalog`] is the network-backed
//! implementation.

use std::fmt;
use std::time::Duration;

use log::debug;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use serde_json::Value;
use thiserror::Error;

/// API prefix appended to the store URL.
const API_PATH: &str = "wp-json/wc/v3/";

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies are cut to this many characters.
const ERROR_BODY_LIMIT: usize = 200;

/// Header carrying the page count of a listing.
const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("invalid catalog url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status} at {url} - {message}")]
    Api {
        status: u16,
        url: String,
        message: String,
    },

    #[error("failed to parse API response - {0}")]
    Decode(String),
}

/// Store URL and key pair. Passed in explicitly; nothing here reads the
/// environment.
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogCredentials {
    pub url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl fmt::Debug for CatalogCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogCredentials")
            .field("url", &self.url)
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .finish()
    }
}

/// A catalog product: its id plus the full JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: u64,
    pub data: Value,
}

impl Product {
    pub fn from_value(data: Value) -> Result<Self, CatalogError> {
        let id = data
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| CatalogError::Decode("product without numeric 'id'".to_string()))?;
        Ok(Product { id, data })
    }

    pub fn sku(&self) -> &str {
        self.data.get("sku").and_then(Value::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPage {
    pub products: Vec<Product>,
    /// Page count reported by the server, when it sends one.
    pub total_pages: Option<usize>,
}

pub trait Catalog: Send + Sync {
    /// First product whose SKU matches, if any.
    fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, CatalogError>;

    fn update_product(&self, id: u64, payload: &Value) -> Result<(), CatalogError>;

    /// One page of products; `page` starts at 1.
    fn list_products(&self, page: usize, per_page: usize) -> Result<ProductPage, CatalogError>;
}

pub struct HttpCatalog {
    client: Client,
    base: Url,
    credentials: CatalogCredentials,
}

impl HttpCatalog {
    pub fn new(credentials: CatalogCredentials) -> Result<Self, CatalogError> {
        let base = api_base(&credentials.url)?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| CatalogError::Network(err.to_string()))?;
        Ok(HttpCatalog {
            client,
            base,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        self.base.join(path).map_err(|err| CatalogError::InvalidUrl {
            url: format!("{}{path}", self.base),
            reason: err.to_string(),
        })
    }

    fn get(&self, url: Url) -> Result<Response, CatalogError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .basic_auth(
                &self.credentials.consumer_key,
                Some(&self.credentials.consumer_secret),
            )
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|err| CatalogError::Network(err.to_string()))?;
        debug!("Response status: {}", response.status());
        ensure_success(response)
    }
}

impl Catalog for HttpCatalog {
    fn find_by_sku(&self, sku: &str) -> Result<Option<Product>, CatalogError> {
        let mut url = self.endpoint("products")?;
        url.query_pairs_mut().append_pair("sku", sku);
        let products: Vec<Value> = self
            .get(url)?
            .json()
            .map_err(|err| CatalogError::Decode(err.to_string()))?;
        debug!("Found {} product(s) for SKU {sku}", products.len());
        products.into_iter().next().map(Product::from_value).transpose()
    }

    fn update_product(&self, id: u64, payload: &Value) -> Result<(), CatalogError> {
        let url = self.endpoint(&format!("products/{id}"))?;
        debug!("PUT {url}");
        let response = self
            .client
            .put(url)
            .basic_auth(
                &self.credentials.consumer_key,
                Some(&self.credentials.consumer_secret),
            )
            .header(ACCEPT, "application/json")
            .json(payload)
            .send()
            .map_err(|err| CatalogError::Network(err.to_string()))?;
        ensure_success(response).map(|_| ())
    }

    fn list_products(&self, page: usize, per_page: usize) -> Result<ProductPage, CatalogError> {
        let mut url = self.endpoint("products")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());
        let response = self.get(url)?;
        let total_pages = response
            .headers()
            .get(TOTAL_PAGES_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<usize>().ok());
        let products: Vec<Value> = response
            .json()
            .map_err(|err| CatalogError::Decode(err.to_string()))?;
        Ok(ProductPage {
            products: products
                .into_iter()
                .map(Product::from_value)
                .collect::<Result<_, _>>()?,
            total_pages,
        })
    }
}

/// Normalizes the store URL into the API root, always ending in `/`.
pub fn api_base(store_url: &str) -> Result<Url, CatalogError> {
    let trimmed = store_url.trim().trim_end_matches('/');
    Url::parse(&format!("{trimmed}/{API_PATH}")).map_err(|err| CatalogError::InvalidUrl {
        url: store_url.to_string(),
        reason: err.to_string(),
    })
}

fn ensure_success(response: Response) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().unwrap_or_default();
    Err(CatalogError::Api {
        status: status.as_u16(),
        url,
        message: truncate_body(&body),
    })
}

fn truncate_body(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}
