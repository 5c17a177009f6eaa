//! Conversion mode for columnar (GeoParquet) sources laid out as
//! `theme=<theme>/type=<type>` partitions.
//!
//! The per-row bounding box columns shipped with the source are pushed
//! down into the parquet reader as a row filter, so only candidate rows
//! are ever decoded. One record batch is held in memory at a time.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Float64Array, Int32Array,
    LargeBinaryArray, LargeStringArray, RecordBatch, StringArray, StructArray,
};
use arrow::compute::kernels::cmp::{gt, lt};
use arrow::compute::{and, cast};
use arrow::datatypes::{DataType, Float64Type, Int32Type};
use arrow::error::ArrowError;
use gdal::vector::{FieldValue, Geometry, LayerAccess};
use log::{debug, info};
use parquet::arrow::arrow_reader::{
    ArrowPredicateFn, ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder, RowFilter,
};
use parquet::arrow::ProjectionMask;
use snafu::{ensure, OptionExt};
use walkdir::WalkDir;

use crate::convert::{create_output_dataset, normalize_geometry};
use crate::error;
use crate::primitives::SpatialExtent;
use crate::schema;
use crate::theme::ThemeMapping;
use crate::util::Result;

use super::ConversionStats;

/// Name of the per-row bounding box struct column.
const BBOX_COLUMN: &str = "bbox";

/// Streams the rows of one theme partition into a spatially indexed
/// output file.
///
/// Row groups and rows whose `bbox` falls outside the boundary envelope
/// are skipped inside the parquet reader; the surviving rows are decoded
/// into features with the fixed field set of the theme, their geometries
/// normalized to the theme's multi-type. An optional `limit` caps the
/// number of written features.
pub fn convert_columnar(
    root: &Path,
    mapping: &ThemeMapping,
    boundary: &Geometry,
    output_path: &Path,
    layer_name: &str,
    limit: Option<u64>,
) -> Result<ConversionStats> {
    let partition = root
        .join(format!("theme={}", mapping.theme))
        .join(format!("type={}", mapping.type_name));
    ensure!(
        partition.is_dir(),
        error::PartitionNotFound {
            root,
            theme: mapping.theme,
            type_name: mapping.type_name,
        }
    );

    let mut files = Vec::new();
    for entry in WalkDir::new(&partition).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "parquet")
        {
            files.push(entry.into_path());
        }
    }
    ensure!(
        !files.is_empty(),
        error::PartitionNotFound {
            root,
            theme: mapping.theme,
            type_name: mapping.type_name,
        }
    );

    let extent = SpatialExtent::from_geometry(boundary);
    let mut output =
        create_output_dataset(output_path, layer_name, mapping.geometry_type, mapping.fields)?;
    let mut output_layer = output.layer(0)?;

    let batches = BatchStream {
        files: files.into_iter(),
        current: None,
        extent,
    };

    let mut stats = ConversionStats::default();
    let mut batch_count = 0u64;
    'batches: for batch in batches {
        let batch = batch?;
        batch_count += 1;
        debug!("batch {batch_count}: {} candidate rows", batch.num_rows());

        // Validates the geometry column and yields its WKB-tagged index.
        let tagged = schema::geoarrow_schema(&batch.schema())?;
        let geometry_index = tagged.index_of(schema::GEOMETRY_COLUMN)?;
        let wkb = WkbColumn::try_from_array(batch.column(geometry_index)).context(
            error::GeometryTypeMismatch {
                expected: "WKB binary geometry column",
                found: batch.column(geometry_index).data_type().to_string(),
            },
        )?;

        let attributes: Vec<(&str, AttributeColumn)> = mapping
            .fields
            .iter()
            .map(|(name, _)| (*name, AttributeColumn::bind(&batch, name)))
            .collect();

        for row in 0..batch.num_rows() {
            if let Some(cap) = limit {
                if stats.written >= cap {
                    info!("feature cap of {cap} reached for {layer_name}");
                    break 'batches;
                }
            }
            stats.read += 1;
            let bytes = wkb.value(row).context(error::GeometryTypeMismatch {
                expected: "WKB binary geometry",
                found: "null",
            })?;
            let geometry = normalize_geometry(Geometry::from_wkb(bytes)?, mapping.geometry_type)?;

            let mut names = Vec::with_capacity(attributes.len());
            let mut values = Vec::with_capacity(attributes.len());
            for (name, column) in &attributes {
                if let Some(value) = column.value(row) {
                    names.push(*name);
                    values.push(value);
                }
            }
            output_layer.create_feature_fields(geometry, &names, &values)?;
            stats.written += 1;
        }
    }

    // Flushes the layer and finalizes the spatial index.
    drop(output_layer);
    drop(output);

    info!(
        "converted {} of {} candidate rows from {} into {}",
        stats.written,
        stats.read,
        partition.display(),
        output_path.display()
    );
    Ok(stats)
}

/// Lazily pulls filtered record batches out of the partition files, one
/// reader at a time.
struct BatchStream {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<ParquetRecordBatchReader>,
    extent: SpatialExtent,
}

impl BatchStream {
    fn open_next(&mut self) -> Result<Option<ParquetRecordBatchReader>> {
        let Some(path) = self.files.next() else {
            return Ok(None);
        };
        debug!("reading {}", path.display());

        let file = File::open(&path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let mask = ProjectionMask::columns(builder.parquet_schema(), [BBOX_COLUMN]);
        let extent = self.extent;
        let predicate = ArrowPredicateFn::new(mask, move |batch| bbox_mask(&batch, &extent));
        let reader = builder
            .with_row_filter(RowFilter::new(vec![Box::new(predicate)]))
            .build()?;
        Ok(Some(reader))
    }
}

impl Iterator for BatchStream {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    // fully filtered-out batches carry no rows
                    Some(Ok(batch)) if batch.num_rows() == 0 => continue,
                    Some(Ok(batch)) => return Some(Ok(batch)),
                    Some(Err(err)) => return Some(Err(err.into())),
                    None => self.current = None,
                }
            } else {
                match self.open_next() {
                    Ok(Some(reader)) => self.current = Some(reader),
                    Ok(None) => return None,
                    Err(err) => return Some(Err(err)),
                }
            }
        }
    }
}

/// Envelope overlap test over the `bbox` struct column, evaluated inside
/// the parquet reader before the remaining columns are decoded.
fn bbox_mask(batch: &RecordBatch, extent: &SpatialExtent) -> Result<BooleanArray, ArrowError> {
    let bbox = batch
        .column_by_name(BBOX_COLUMN)
        .ok_or_else(|| ArrowError::SchemaError("source rows have no 'bbox' column".to_string()))?
        .as_struct_opt()
        .ok_or_else(|| ArrowError::SchemaError("'bbox' is not a struct column".to_string()))?;

    let xmin = bbox_side(bbox, "xmin")?;
    let xmax = bbox_side(bbox, "xmax")?;
    let ymin = bbox_side(bbox, "ymin")?;
    let ymax = bbox_side(bbox, "ymax")?;

    let west = lt(&xmin, &Float64Array::new_scalar(extent.xmax))?;
    let east = gt(&xmax, &Float64Array::new_scalar(extent.xmin))?;
    let south = lt(&ymin, &Float64Array::new_scalar(extent.ymax))?;
    let north = gt(&ymax, &Float64Array::new_scalar(extent.ymin))?;
    and(&and(&west, &east)?, &and(&south, &north)?)
}

fn bbox_side(bbox: &StructArray, name: &str) -> Result<Float64Array, ArrowError> {
    let column = bbox
        .column_by_name(name)
        .ok_or_else(|| ArrowError::SchemaError(format!("'bbox' has no '{name}' child")))?;
    // recent releases store the bbox sides as f32
    let column = cast(column, &DataType::Float64)?;
    Ok(column.as_primitive::<Float64Type>().clone())
}

enum WkbColumn<'a> {
    Binary(&'a BinaryArray),
    LargeBinary(&'a LargeBinaryArray),
}

impl<'a> WkbColumn<'a> {
    fn try_from_array(column: &'a ArrayRef) -> Option<Self> {
        if let Some(array) = column.as_binary_opt::<i32>() {
            Some(Self::Binary(array))
        } else {
            column.as_binary_opt::<i64>().map(Self::LargeBinary)
        }
    }

    fn value(&self, row: usize) -> Option<&[u8]> {
        match self {
            Self::Binary(array) => (!array.is_null(row)).then(|| array.value(row)),
            Self::LargeBinary(array) => (!array.is_null(row)).then(|| array.value(row)),
        }
    }
}

/// One bound attribute column of a batch. A column that is absent from
/// the source, or has a type the output field cannot take, reads as null
/// for every row.
enum AttributeColumn<'a> {
    Missing,
    Utf8(&'a StringArray),
    LargeUtf8(&'a LargeStringArray),
    Int32(&'a Int32Array),
}

impl<'a> AttributeColumn<'a> {
    fn bind(batch: &'a RecordBatch, name: &str) -> Self {
        let Some(column) = batch.column_by_name(name) else {
            return Self::Missing;
        };
        if let Some(array) = column.as_string_opt::<i32>() {
            Self::Utf8(array)
        } else if let Some(array) = column.as_string_opt::<i64>() {
            Self::LargeUtf8(array)
        } else if let Some(array) = column.as_primitive_opt::<Int32Type>() {
            Self::Int32(array)
        } else {
            Self::Missing
        }
    }

    fn value(&self, row: usize) -> Option<FieldValue> {
        match self {
            Self::Missing => None,
            Self::Utf8(array) => (!array.is_null(row))
                .then(|| FieldValue::StringValue(array.value(row).to_string())),
            Self::LargeUtf8(array) => (!array.is_null(row))
                .then(|| FieldValue::StringValue(array.value(row).to_string())),
            Self::Int32(array) => {
                (!array.is_null(row)).then(|| FieldValue::IntegerValue(array.value(row)))
            }
        }
    }
}
