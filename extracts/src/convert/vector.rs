//! Conversion mode for sources readable through an OGR vector driver
//! (shapefiles, GeoPackages, remote FlatGeobuf).

use std::path::Path;

use gdal::vector::{FieldValue, Geometry, LayerAccess};
use log::{debug, info};

use crate::convert::{create_output_dataset, multi_geometry_type, normalize_geometry};
use crate::schema;
use crate::util::{gdal_open_dataset, Result};

use super::ConversionStats;

const PROGRESS_INTERVAL: u64 = 100_000;

/// Streams one layer of a vector source into a spatially indexed output
/// file, keeping only features whose envelope overlaps the boundary.
///
/// The source schema is reconciled on the fly: multi-valued string
/// fields are flattened into delimited strings, everything else passes
/// through. An optional `limit` caps the number of written features.
pub fn convert_vector(
    source_path: &str,
    boundary: &Geometry,
    output_path: &Path,
    layer_name: &str,
    limit: Option<u64>,
) -> Result<ConversionStats> {
    let source = gdal_open_dataset(Path::new(source_path))?;
    let mut source_layer = source.layer(0)?;

    let adapted = schema::adapt(source_layer.defn());
    let field_defs: Vec<(&str, _)> = adapted
        .fields
        .iter()
        .map(|(name, field_type)| (name.as_str(), *field_type))
        .collect();

    let geometry_type = multi_geometry_type(source_layer.defn().geometry_type());
    let mut output = create_output_dataset(output_path, layer_name, geometry_type, &field_defs)?;
    let mut output_layer = output.layer(0)?;

    // Envelope prefilter; the exact cut happens in the refinement stage.
    source_layer.set_spatial_filter(boundary);

    let mut stats = ConversionStats::default();
    for feature in source_layer.features() {
        if let Some(cap) = limit {
            if stats.written >= cap {
                info!("feature cap of {cap} reached for {layer_name}");
                break;
            }
        }
        stats.read += 1;

        let geometry = match feature.geometry() {
            Some(geometry) => normalize_geometry(geometry.clone(), geometry_type)?,
            None => {
                debug!("skipping feature {:?} without geometry", feature.fid());
                continue;
            }
        };

        let mut source_values: Vec<Option<FieldValue>> =
            feature.fields().map(|(_, value)| value).collect();
        let mut names = Vec::with_capacity(adapted.plan.entries.len());
        let mut values = Vec::with_capacity(adapted.plan.entries.len());
        for entry in &adapted.plan.entries {
            let value = source_values
                .get_mut(entry.source_index)
                .and_then(Option::take);
            if let Some(value) = value {
                names.push(entry.name.as_str());
                values.push(entry.transform.apply(&entry.name, value)?);
            }
        }
        output_layer.create_feature_fields(geometry, &names, &values)?;

        stats.written += 1;
        if stats.written % PROGRESS_INTERVAL == 0 {
            info!("{} features written to {layer_name}", stats.written);
        }
    }

    // Flushes the layer and finalizes the spatial index.
    drop(output_layer);
    drop(output);

    info!(
        "converted {} of {} prefiltered features into {}",
        stats.written,
        stats.read,
        output_path.display()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdal::vector::{FieldValue, OGRFieldType, OGRwkbGeometryType};
    use gdal::{Dataset, DriverManager};

    fn source_fixture(path: &Path) {
        let driver = DriverManager::get_driver_by_name("FlatGeobuf").expect("driver");
        let mut dataset = driver.create_vector_only(path).expect("dataset");
        let mut layer = dataset
            .create_layer(gdal::vector::LayerOptions {
                name: "source",
                ty: OGRwkbGeometryType::wkbPolygon,
                ..Default::default()
            })
            .expect("layer");
        layer
            .create_defn_fields(&[
                ("name", OGRFieldType::OFTString),
                ("sources", OGRFieldType::OFTStringList),
            ])
            .expect("fields");

        let inside = Geometry::from_wkt("POLYGON ((0.2 0.2, 0.2 0.4, 0.4 0.4, 0.4 0.2, 0.2 0.2))")
            .expect("wkt");
        layer
            .create_feature_fields(
                inside,
                &["name", "sources"],
                &[
                    FieldValue::StringValue("inside".into()),
                    FieldValue::StringListValue(vec!["osm".into(), "meta".into()]),
                ],
            )
            .expect("feature");

        let outside = Geometry::from_wkt("POLYGON ((5 5, 5 6, 6 6, 6 5, 5 5))").expect("wkt");
        layer
            .create_feature_fields(
                outside,
                &["name"],
                &[FieldValue::StringValue("outside".into())],
            )
            .expect("feature");
    }

    #[test]
    fn boundary_filter_and_flattening() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("source.fgb");
        let output_path = dir.path().join("output.fgb");
        source_fixture(&source_path);

        let boundary =
            Geometry::from_wkt("MULTIPOLYGON (((0 0, 0 1, 1 1, 1 0, 0 0)))").expect("wkt");
        let stats = convert_vector(
            source_path.to_str().expect("utf-8 path"),
            &boundary,
            &output_path,
            "extract",
            None,
        )
        .expect("conversion");
        assert_eq!(stats.written, 1);

        let output = Dataset::open(&output_path).expect("output readable");
        let mut layer = output.layer(0).expect("layer");
        let feature = layer.features().next().expect("one feature");
        assert_eq!(
            feature.field("sources").expect("field"),
            Some(FieldValue::StringValue("osm,meta".into()))
        );
        assert_eq!(
            feature
                .geometry()
                .expect("geometry")
                .geometry_type(),
            OGRwkbGeometryType::wkbMultiPolygon
        );
    }

    #[test]
    fn zero_limit_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("source.fgb");
        let output_path = dir.path().join("empty.fgb");
        source_fixture(&source_path);

        let boundary =
            Geometry::from_wkt("MULTIPOLYGON (((-1 -1, -1 7, 7 7, 7 -1, -1 -1)))").expect("wkt");
        let stats = convert_vector(
            source_path.to_str().expect("utf-8 path"),
            &boundary,
            &output_path,
            "extract",
            Some(0),
        )
        .expect("conversion");
        assert_eq!(stats.written, 0);
        assert_eq!(stats.read, 0);
    }

    #[test]
    fn limit_caps_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("source.fgb");
        let output_path = dir.path().join("capped.fgb");
        source_fixture(&source_path);

        let boundary =
            Geometry::from_wkt("MULTIPOLYGON (((-1 -1, -1 7, 7 7, 7 -1, -1 -1)))").expect("wkt");
        let stats = convert_vector(
            source_path.to_str().expect("utf-8 path"),
            &boundary,
            &output_path,
            "extract",
            Some(1),
        )
        .expect("conversion");
        assert_eq!(stats.written, 1);
    }
}
