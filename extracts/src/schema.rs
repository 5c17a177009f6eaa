use std::sync::Arc;

use arrow::datatypes::{Field, Schema, SchemaRef};
use gdal::vector::{Defn, FieldValue, OGRFieldType};
use snafu::ensure;

use crate::error;
use crate::util::Result;

/// Delimiter used when flattening multi-valued string fields.
pub const LIST_DELIMITER: &str = ",";

/// Name of the geometry column in columnar sources.
pub const GEOMETRY_COLUMN: &str = "geometry";

const ARROW_EXTENSION_KEY: &str = "ARROW:extension:name";
const GEOARROW_WKB: &str = "geoarrow.wkb";

/// Per-field copy instruction, applied once per source row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldTransform {
    /// Value is copied unchanged.
    Copy,
    /// A string list is joined into one delimited string.
    JoinStrings,
}

impl FieldTransform {
    /// Applies the transform to a single field value.
    pub fn apply(self, field: &str, value: FieldValue) -> Result<FieldValue> {
        match self {
            FieldTransform::Copy => Ok(value),
            FieldTransform::JoinStrings => {
                let FieldValue::StringListValue(values) = value else {
                    return error::FieldPlanMismatch { field }.fail();
                };
                Ok(FieldValue::StringValue(values.join(LIST_DELIMITER)))
            }
        }
    }
}

/// One entry of a [`FieldPlan`]: where the value comes from, what the
/// output field is called and how the value is rewritten.
#[derive(Clone, Debug)]
pub struct FieldPlanEntry {
    pub source_index: usize,
    pub name: String,
    pub transform: FieldTransform,
}

/// Precomputed mapping from a source layer schema to the output schema.
///
/// Built once per layer so that the per-row hot path does not repeat
/// name lookups or type dispatch.
#[derive(Clone, Debug, Default)]
pub struct FieldPlan {
    pub entries: Vec<FieldPlanEntry>,
}

/// Output field list plus the plan that fills it.
#[derive(Debug)]
pub struct AdaptedSchema {
    pub fields: Vec<(String, OGRFieldType::Type)>,
    pub plan: FieldPlan,
}

/// Reconciles a source layer definition against what the output driver
/// supports: multi-valued string fields become single delimited string
/// fields, all other fields pass through unchanged.
pub fn adapt(defn: &Defn) -> AdaptedSchema {
    let mut fields = Vec::new();
    let mut entries = Vec::new();

    for (source_index, field) in defn.fields().enumerate() {
        let name = field.name();
        let (field_type, transform) = match field.field_type() {
            OGRFieldType::OFTStringList => (OGRFieldType::OFTString, FieldTransform::JoinStrings),
            other => (other, FieldTransform::Copy),
        };
        fields.push((name.clone(), field_type));
        entries.push(FieldPlanEntry {
            source_index,
            name,
            transform,
        });
    }

    AdaptedSchema {
        fields,
        plan: FieldPlan { entries },
    }
}

/// Splits a flattened string back into the original list.
pub fn split_flattened(value: &str) -> Vec<String> {
    value.split(LIST_DELIMITER).map(str::to_string).collect()
}

/// Tags the geometry field of an arrow schema with the geoarrow WKB
/// extension metadata, so geometry-aware readers recognize the binary
/// encoding of the column.
pub fn geoarrow_schema(schema: &SchemaRef) -> Result<SchemaRef> {
    ensure!(
        schema.column_with_name(GEOMETRY_COLUMN).is_some(),
        error::ColumnMissing {
            column: GEOMETRY_COLUMN,
        }
    );

    let fields: Vec<Arc<Field>> = schema
        .fields()
        .iter()
        .map(|field| {
            if field.name() == GEOMETRY_COLUMN {
                let mut metadata = field.metadata().clone();
                metadata.insert(ARROW_EXTENSION_KEY.to_string(), GEOARROW_WKB.to_string());
                Arc::new(field.as_ref().clone().with_metadata(metadata))
            } else {
                Arc::clone(field)
            }
        })
        .collect();

    Ok(Arc::new(Schema::new_with_metadata(
        fields,
        schema.metadata().clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;
    use gdal::vector::LayerAccess;
    use gdal::DriverManager;

    #[test]
    fn string_lists_are_flattened() {
        let driver = DriverManager::get_driver_by_name("Memory").expect("memory driver");
        let mut dataset = driver
            .create_vector_only("schema-adapter-test")
            .expect("in-memory dataset");
        let mut layer = dataset
            .create_layer(Default::default())
            .expect("create layer");
        layer
            .create_defn_fields(&[
                ("name", OGRFieldType::OFTString),
                ("sources", OGRFieldType::OFTStringList),
                ("population", OGRFieldType::OFTInteger64),
            ])
            .expect("create fields");

        let adapted = adapt(layer.defn());

        assert_eq!(
            adapted.fields,
            vec![
                ("name".to_string(), OGRFieldType::OFTString),
                ("sources".to_string(), OGRFieldType::OFTString),
                ("population".to_string(), OGRFieldType::OFTInteger64),
            ]
        );
        assert_eq!(adapted.plan.entries[0].transform, FieldTransform::Copy);
        assert_eq!(
            adapted.plan.entries[1].transform,
            FieldTransform::JoinStrings
        );
        assert_eq!(adapted.plan.entries[2].source_index, 2);
    }

    #[test]
    fn join_round_trip() {
        let list = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let joined = FieldTransform::JoinStrings
            .apply("sources", FieldValue::StringListValue(list.clone()))
            .expect("string list");

        let FieldValue::StringValue(flat) = joined else {
            panic!("expected a flattened string");
        };
        assert_eq!(flat, "a,b,c");
        assert_eq!(split_flattened(&flat), list);
    }

    #[test]
    fn join_rejects_non_lists() {
        let err = FieldTransform::JoinStrings
            .apply("sources", FieldValue::IntegerValue(42))
            .expect_err("not a string list");
        assert!(matches!(
            err,
            crate::error::Error::FieldPlanMismatch { field } if field == "sources"
        ));
    }

    #[test]
    fn geometry_field_is_tagged() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, true),
            Field::new(GEOMETRY_COLUMN, DataType::Binary, true),
        ]));

        let tagged = geoarrow_schema(&schema).expect("geometry column present");
        let field = tagged.field_with_name(GEOMETRY_COLUMN).expect("present");
        assert_eq!(
            field.metadata().get(ARROW_EXTENSION_KEY).map(String::as_str),
            Some(GEOARROW_WKB)
        );
        // untouched fields keep their metadata
        assert!(tagged.field(0).metadata().is_empty());
    }

    #[test]
    fn missing_geometry_column_is_an_error() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![Field::new(
            "id",
            DataType::Utf8,
            true,
        )]));
        assert!(geoarrow_schema(&schema).is_err());
    }
}
