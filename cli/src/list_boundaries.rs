#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use overture_extracts::boundary::{BoundaryStore, ResolveOptions};
use overture_extracts::config::Settings;

/// Lists the boundaries available in the store, sorted by name
#[derive(Debug, Parser)]
pub struct ListBoundaries {
    /// include boundary records outside any region bucket
    #[arg(long)]
    include_unbucketed: bool,

    /// optional TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,
}

pub fn list_boundaries(params: ListBoundaries) -> Result<()> {
    let settings = Settings::load(params.config.as_deref())?;
    let store = BoundaryStore::open(&settings.boundaries_path)?;
    let boundaries = store.resolve(
        &[],
        ResolveOptions {
            with_geometry: false,
            skip_unbucketed: !params.include_unbucketed,
        },
    )?;

    for boundary in boundaries {
        println!("{} - {} - {}", boundary.name, boundary.iso3, boundary.id);
    }
    Ok(())
}
