//! The streaming conversion stage: reads a (vector-driver or columnar)
//! feature source through a coarse bounding-box prefilter and writes a
//! spatially indexed per-country output file.

use std::path::Path;

use gdal::spatial_ref::{AxisMappingStrategy, SpatialRef};
use gdal::vector::{Geometry, LayerAccess, LayerOptions, OGRFieldType, OGRwkbGeometryType};
use gdal::{Dataset, DriverManager};

use crate::error;
use crate::util::Result;

mod columnar;
mod vector;

pub use columnar::convert_columnar;
pub use vector::convert_vector;

/// Driver of the output files. FlatGeobuf embeds its own spatial index.
pub const OUTPUT_DRIVER: &str = "FlatGeobuf";

/// Feature counters of one conversion run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConversionStats {
    /// Features/rows that survived the coarse prefilter.
    pub read: u64,
    /// Features written to the output layer.
    pub written: u64,
}

/// Creates the destination dataset with a single layer.
///
/// The spatial index is always requested; downstream consumers rely on
/// range queries over the published files. The index is finalized when
/// the dataset handle is dropped, so the caller must drop it before
/// touching the file again.
pub fn create_output_dataset(
    path: &Path,
    layer_name: &str,
    geometry_type: OGRwkbGeometryType::Type,
    fields: &[(&str, OGRFieldType::Type)],
) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name(OUTPUT_DRIVER)?;
    let mut dataset = driver.create_vector_only(path)?;

    let mut srs = SpatialRef::from_epsg(4326)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    let mut layer = dataset.create_layer(LayerOptions {
        name: layer_name,
        srs: Some(&srs),
        ty: geometry_type,
        options: Some(&["SPATIAL_INDEX=YES"]),
    })?;
    layer.create_defn_fields(fields)?;

    Ok(dataset)
}

/// Returns the multi-geometry counterpart of `geometry_type`, or the
/// type itself if it already is one.
pub fn multi_geometry_type(geometry_type: OGRwkbGeometryType::Type) -> OGRwkbGeometryType::Type {
    match geometry_type {
        OGRwkbGeometryType::wkbPoint => OGRwkbGeometryType::wkbMultiPoint,
        OGRwkbGeometryType::wkbLineString => OGRwkbGeometryType::wkbMultiLineString,
        OGRwkbGeometryType::wkbPolygon => OGRwkbGeometryType::wkbMultiPolygon,
        other => other,
    }
}

/// Normalizes a geometry to the target multi-type.
///
/// A single-part geometry is wrapped into a one-part multi geometry; a
/// geometry that already has the target type passes through, making the
/// normalization idempotent. Anything else aborts the conversion
/// instead of silently dropping the feature.
pub fn normalize_geometry(
    geometry: Geometry,
    target: OGRwkbGeometryType::Type,
) -> Result<Geometry> {
    let found = geometry.geometry_type();
    if found == target {
        return Ok(geometry);
    }

    let single = match target {
        OGRwkbGeometryType::wkbMultiPoint => OGRwkbGeometryType::wkbPoint,
        OGRwkbGeometryType::wkbMultiLineString => OGRwkbGeometryType::wkbLineString,
        OGRwkbGeometryType::wkbMultiPolygon => OGRwkbGeometryType::wkbPolygon,
        _ => OGRwkbGeometryType::wkbUnknown,
    };

    if found == single && single != OGRwkbGeometryType::wkbUnknown {
        let mut multi = Geometry::empty(target)?;
        multi.add_geometry(geometry)?;
        Ok(multi)
    } else {
        error::GeometryTypeMismatch {
            expected: gdal::vector::geometry_type_to_name(target),
            found: gdal::vector::geometry_type_to_name(found),
        }
        .fail()
    }
}
