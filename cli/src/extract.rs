use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use overture_extracts::boundary::{Boundary, BoundaryKey, BoundaryStore, ResolveOptions};
use overture_extracts::config::Settings;
use overture_extracts::convert::{convert_columnar, convert_vector};
use overture_extracts::refine::{refine, RefineOptions};
use overture_extracts::theme::{
    find_theme, output_file_name, parse_file_name, resource_title, ThemeMapping,
};

use crate::publish::{download_url, CatalogItem, DryRunSink, PublishSink};

/// Extracts one Overture type for one or more countries
#[derive(Debug, Parser)]
pub struct Extract {
    /// ISO3 codes of the countries to extract
    #[arg(long = "iso3", value_delimiter = ',')]
    iso3: Vec<String>,

    /// object ids of single boundary records to extract
    #[arg(long = "id", value_delimiter = ',')]
    ids: Vec<i64>,

    /// Overture type, e.g. `building` or `segment`
    #[arg(long = "type")]
    type_name: String,

    /// source of the release: a partition root containing
    /// `theme=<theme>/type=<type>` directories, or an OGR dataset path
    /// when `--vector` is set
    #[arg(long)]
    path: String,

    /// read the source through an OGR vector driver instead of as
    /// parquet partitions
    #[arg(long)]
    vector: bool,

    /// cut features exactly to the boundary instead of its envelope
    #[arg(long)]
    exact: bool,

    /// stop after this many features per country
    #[arg(long)]
    limit: Option<u64>,

    /// keep boundary records outside any region bucket
    #[arg(long)]
    include_unbucketed: bool,

    /// optional TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,
}

pub fn extract(params: Extract) -> Result<()> {
    // resolve the type before any I/O so a typo fails fast
    let mapping = find_theme(&params.type_name)?;
    let settings = Settings::load(params.config.as_deref())?;

    let mut keys: Vec<BoundaryKey> = params
        .iso3
        .iter()
        .map(|code| BoundaryKey::iso3(code))
        .collect();
    keys.extend(params.ids.iter().copied().map(BoundaryKey::Id));
    if keys.is_empty() {
        bail!("nothing to extract, pass at least one --iso3 or --id");
    }

    let store = BoundaryStore::open(&settings.boundaries_path)?;
    let boundaries = store.resolve(
        &keys,
        ResolveOptions {
            with_geometry: true,
            skip_unbucketed: !params.include_unbucketed,
        },
    )?;

    fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("creating {}", settings.output_dir.display()))?;
    let sink = DryRunSink::new(&settings.bucket_name);

    for boundary in &boundaries {
        let (output_path, item) = extract_one(&params, mapping, &settings, boundary)?;
        sink.publish(&output_path, &item)?;
    }

    Ok(())
}

fn extract_one(
    params: &Extract,
    mapping: &ThemeMapping,
    settings: &Settings,
    boundary: &Boundary,
) -> Result<(PathBuf, CatalogItem)> {
    let geometry = boundary.geometry()?;
    let file_name = output_file_name(&boundary.iso3, mapping, &settings.release)?;
    let output_path = settings.output_dir.join(&file_name);
    let intermediate = settings.output_dir.join(format!("{file_name}.part"));

    info!(
        "extracting {} features for {} ({})",
        mapping.type_name, boundary.name, boundary.iso3
    );

    if params.vector {
        convert_vector(
            &params.path,
            &geometry,
            &intermediate,
            mapping.type_name,
            params.limit,
        )?;
    } else {
        convert_columnar(
            Path::new(&params.path),
            mapping,
            &geometry,
            &intermediate,
            mapping.type_name,
            params.limit,
        )?;
    }

    let stats = refine(
        &intermediate,
        &geometry,
        &output_path,
        mapping.type_name,
        RefineOptions {
            exact: params.exact,
        },
    )?;
    fs::remove_file(&intermediate)
        .with_context(|| format!("removing {}", intermediate.display()))?;

    // catalog metadata is read back out of the published name, the
    // same way the sync job sees it
    let parsed = parse_file_name(&file_name)?;

    Ok((
        output_path,
        CatalogItem {
            title: resource_title(&boundary.name, mapping),
            iso3: boundary.iso3.clone(),
            theme: mapping.theme.to_string(),
            type_name: mapping.type_name.to_string(),
            release: parsed.release,
            url: download_url(
                &settings.bucket_name,
                settings.aws_region.as_deref(),
                &file_name,
            ),
            feature_count: stats.written,
            file_name,
        },
    ))
}
