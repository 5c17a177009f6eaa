//! Final filtering stage: rewrites an intermediate extract against the
//! resolved boundary.
//!
//! By default the cut stays coarse, keeping every feature whose envelope
//! overlaps the boundary envelope. Border regions of neighboring
//! countries therefore overlap in the published files. The exact
//! per-feature intersection test is available as an opt-in.

use std::path::Path;

use gdal::vector::{Geometry, LayerAccess};
use log::info;

use crate::convert::{create_output_dataset, ConversionStats};
use crate::primitives::SpatialExtent;
use crate::util::{gdal_open_dataset, Result};

#[derive(Clone, Copy, Debug, Default)]
pub struct RefineOptions {
    /// Test every feature geometry against the boundary instead of the
    /// boundary envelope.
    pub exact: bool,
}

/// Copies the features of `intermediate` that pass the boundary filter
/// into a freshly indexed output file, schema unchanged.
pub fn refine(
    intermediate: &Path,
    boundary: &Geometry,
    output_path: &Path,
    layer_name: &str,
    options: RefineOptions,
) -> Result<ConversionStats> {
    let source = gdal_open_dataset(intermediate)?;
    let mut source_layer = source.layer(0)?;

    let fields: Vec<(String, _)> = source_layer
        .defn()
        .fields()
        .map(|field| (field.name(), field.field_type()))
        .collect();
    let field_defs: Vec<(&str, _)> = fields
        .iter()
        .map(|(name, field_type)| (name.as_str(), *field_type))
        .collect();
    let geometry_type = source_layer.defn().geometry_type();

    let mut output = create_output_dataset(output_path, layer_name, geometry_type, &field_defs)?;
    let mut output_layer = output.layer(0)?;

    let filter = if options.exact {
        boundary.clone()
    } else {
        let extent = SpatialExtent::from_geometry(boundary);
        Geometry::bbox(extent.xmin, extent.ymin, extent.xmax, extent.ymax)?
    };
    source_layer.set_spatial_filter(&filter);

    let mut stats = ConversionStats::default();
    for feature in source_layer.features() {
        stats.read += 1;

        let Some(geometry) = feature.geometry() else {
            continue;
        };
        if options.exact && !boundary.intersects(geometry) {
            continue;
        }

        let mut names = Vec::with_capacity(fields.len());
        let mut values = Vec::with_capacity(fields.len());
        for (name, value) in feature.fields() {
            if let Some(value) = value {
                names.push(name);
                values.push(value);
            }
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        output_layer.create_feature_fields(geometry.clone(), &name_refs, &values)?;
        stats.written += 1;
    }

    drop(output_layer);
    drop(output);

    info!(
        "refined {} of {} features into {} (exact: {})",
        stats.written,
        stats.read,
        output_path.display(),
        options.exact
    );
    Ok(stats)
}
