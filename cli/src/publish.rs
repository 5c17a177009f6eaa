#![allow(clippy::print_stdout)]

use std::path::Path;

use anyhow::Result;
use log::info;
use serde::Serialize;

/// What one finished extract looks like to the data catalog.
#[derive(Clone, Debug, Serialize)]
pub struct CatalogItem {
    pub file_name: String,
    pub title: String,
    pub iso3: String,
    pub theme: String,
    pub type_name: String,
    pub release: String,
    /// Public location the uploaded file will be served from.
    pub url: String,
    pub feature_count: u64,
}

/// Derives the public HTTPS location of an uploaded file from the
/// bucket settings.
pub fn download_url(bucket: &str, region: Option<&str>, file_name: &str) -> String {
    match region {
        Some(region) => format!("https://{bucket}.s3.{region}.amazonaws.com/{file_name}"),
        None => format!("https://{bucket}.s3.amazonaws.com/{file_name}"),
    }
}

/// Destination of finished extract files.
pub trait PublishSink {
    fn publish(&self, path: &Path, item: &CatalogItem) -> Result<()>;
}

/// Sink that reports what an upload would do and emits the catalog
/// entry as JSON, without touching the network.
pub struct DryRunSink {
    bucket: String,
}

impl DryRunSink {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
        }
    }
}

impl PublishSink for DryRunSink {
    fn publish(&self, path: &Path, item: &CatalogItem) -> Result<()> {
        info!(
            "would upload {} to s3://{}/{} and catalog it as {}",
            path.display(),
            self.bucket,
            item.file_name,
            item.url
        );
        println!("{}", serde_json::to_string(item)?);
        Ok(())
    }
}
