use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use gdal::vector::{Feature, FieldValue, Geometry, LayerAccess};
use gdal::Dataset;
use itertools::Itertools;
use log::debug;
use snafu::{ensure, OptionExt, ResultExt};

use crate::error;
use crate::util::Result;

/// Field names of the administrative boundary store.
const FIELD_ID: &str = "objectid";
const FIELD_ISO3: &str = "iso3";
const FIELD_NAME: &str = "adm0_name";
const FIELD_REGION: &str = "region";
const FIELD_DISPUTED: &str = "disputed";

/// Sentinel region bucket for records that belong to no bucket.
pub const REGION_NONE: &str = "none";

/// Value of the disputed flag marking the one authoritative record.
const DISPUTED_NO: &str = "no";

/// Key under which a caller requests one or more boundary records.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BoundaryKey {
    /// An ISO3 country code, e.g. `"LSO"`.
    Iso3(String),
    /// A stable object id of a single record.
    Id(i64),
}

impl BoundaryKey {
    pub fn iso3(code: &str) -> Self {
        Self::Iso3(code.to_uppercase())
    }
}

impl fmt::Display for BoundaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryKey::Iso3(code) => write!(f, "{code}"),
            BoundaryKey::Id(id) => write!(f, "{id}"),
        }
    }
}

/// One resolved administrative boundary.
///
/// When several records share an ISO3 code this is a derived value: the
/// authoritative record's attributes with the union of all geometries in
/// the group. The store itself is never mutated.
#[derive(Clone, Debug)]
pub struct Boundary {
    pub id: i64,
    pub iso3: String,
    pub name: String,
    pub region: String,
    /// WKB export of the (possibly merged) geometry. `None` when the
    /// caller resolved without geometry.
    pub wkb: Option<Vec<u8>>,
}

impl Boundary {
    /// Parses the WKB payload back into an OGR geometry.
    pub fn geometry(&self) -> Result<Geometry> {
        let wkb = self
            .wkb
            .as_deref()
            .context(error::BoundaryGeometryMissing {
                fid: self.id as u64,
            })?;
        Ok(Geometry::from_wkb(wkb)?)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ResolveOptions {
    /// Export geometries as WKB. Listing callers leave this off to skip
    /// the payload entirely.
    pub with_geometry: bool,
    /// Drop records whose region bucket is the `"none"` sentinel.
    pub skip_unbucketed: bool,
}

/// Read-only access to the local administrative boundary store.
pub struct BoundaryStore {
    dataset: Dataset,
}

/// A raw record as read from the store, before merging.
struct BoundaryRecord {
    id: i64,
    iso3: String,
    name: String,
    region: String,
    disputed: bool,
    geometry: Option<Geometry>,
}

impl BoundaryStore {
    /// Opens the boundary store at `path`. A missing or unreadable store
    /// is fatal for the whole run.
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path).context(error::DataSourceUnavailable { path })?;
        Ok(Self { dataset })
    }

    /// Wraps an already opened dataset, mainly for in-memory fixtures.
    pub fn from_dataset(dataset: Dataset) -> Self {
        Self { dataset }
    }

    /// Resolves the requested keys to one boundary per country.
    ///
    /// An empty key set selects all records (listing use case). With a
    /// non-empty key set every key must match at least one record,
    /// otherwise the whole resolution fails; a partial country list must
    /// never propagate downstream. Results are sorted by display name.
    pub fn resolve(&self, keys: &[BoundaryKey], options: ResolveOptions) -> Result<Vec<Boundary>> {
        let mut layer = self.dataset.layer(0)?;

        match attribute_filter(keys) {
            Some(filter) => layer.set_attribute_filter(&filter)?,
            None => layer.clear_attribute_filter(),
        }

        let mut records = Vec::new();
        for feature in layer.features() {
            let record = read_record(&feature, options.with_geometry)?;
            if options.skip_unbucketed && record.region == REGION_NONE {
                continue;
            }
            records.push(record);
        }
        debug!("boundary store matched {} record(s)", records.len());

        check_completeness(keys, &records)?;

        // Group by ISO3 and merge each group down to one authoritative
        // boundary. BTreeMap keeps grouping deterministic.
        let mut groups: BTreeMap<String, Vec<BoundaryRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(record.iso3.clone()).or_default().push(record);
        }

        let mut boundaries = Vec::with_capacity(groups.len());
        for (iso3, group) in groups {
            boundaries.push(merge_group(&iso3, group, options.with_geometry)?);
        }
        boundaries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(boundaries)
    }
}

/// Builds the OGR attribute filter expression for the requested keys,
/// or `None` for a select-all.
fn attribute_filter(keys: &[BoundaryKey]) -> Option<String> {
    if keys.is_empty() {
        return None;
    }

    let ids = keys
        .iter()
        .filter_map(|key| match key {
            BoundaryKey::Id(id) => Some(id.to_string()),
            BoundaryKey::Iso3(_) => None,
        })
        .join(", ");
    let codes = keys
        .iter()
        .filter_map(|key| match key {
            // single quotes doubled per SQL string literal rules
            BoundaryKey::Iso3(code) => Some(format!("'{}'", code.replace('\'', "''"))),
            BoundaryKey::Id(_) => None,
        })
        .join(", ");

    let mut clauses = Vec::new();
    if !ids.is_empty() {
        clauses.push(format!("{FIELD_ID} IN ({ids})"));
    }
    if !codes.is_empty() {
        clauses.push(format!("{FIELD_ISO3} IN ({codes})"));
    }
    Some(clauses.join(" OR "))
}

fn read_record(feature: &Feature, with_geometry: bool) -> Result<BoundaryRecord> {
    let geometry = if with_geometry {
        let fid = feature.fid().unwrap_or_default();
        Some(
            feature
                .geometry()
                .context(error::BoundaryGeometryMissing { fid })?
                .clone(),
        )
    } else {
        None
    };

    Ok(BoundaryRecord {
        id: require_int(feature, FIELD_ID)?,
        iso3: require_string(feature, FIELD_ISO3)?.to_uppercase(),
        name: require_string(feature, FIELD_NAME)?,
        region: optional_string(feature, FIELD_REGION)?.unwrap_or_default(),
        disputed: matches!(
            optional_string(feature, FIELD_DISPUTED)?.as_deref(),
            Some(value) if value != DISPUTED_NO
        ),
        geometry,
    })
}

fn require_string(feature: &Feature, column: &str) -> Result<String> {
    optional_string(feature, column)?.context(error::ColumnMissing { column })
}

fn optional_string(feature: &Feature, column: &str) -> Result<Option<String>> {
    match feature.field(column)? {
        Some(FieldValue::StringValue(value)) => Ok(Some(value)),
        Some(_) => error::ColumnMissing { column }.fail(),
        None => Ok(None),
    }
}

fn require_int(feature: &Feature, column: &str) -> Result<i64> {
    match feature.field(column)? {
        Some(FieldValue::IntegerValue(value)) => Ok(i64::from(value)),
        Some(FieldValue::Integer64Value(value)) => Ok(value),
        _ => error::ColumnMissing { column }.fail(),
    }
}

/// Verifies that every requested key matched at least one record.
fn check_completeness(keys: &[BoundaryKey], records: &[BoundaryRecord]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }

    let mut missing: Vec<String> = keys
        .iter()
        .filter(|key| {
            !records.iter().any(|record| match key {
                BoundaryKey::Iso3(code) => &record.iso3 == code,
                BoundaryKey::Id(id) => record.id == *id,
            })
        })
        .map(ToString::to_string)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        missing.sort();
        error::BoundaryNotFound { missing }.fail()
    }
}

/// Folds one ISO3 group into a single boundary.
///
/// A singleton group passes through. A larger group must contain exactly
/// one undisputed record; it provides the output attributes and anchors
/// the geometry union over the whole group.
fn merge_group(iso3: &str, group: Vec<BoundaryRecord>, with_geometry: bool) -> Result<Boundary> {
    let count = group.len();

    let anchor_index = if count == 1 {
        0
    } else {
        let authoritative: Vec<usize> = group
            .iter()
            .positions(|record| !record.disputed)
            .collect();
        ensure!(
            !authoritative.is_empty(),
            error::NoAuthoritativeBoundary { iso3, count }
        );
        ensure!(
            authoritative.len() == 1,
            error::AmbiguousAuthoritativeBoundary {
                iso3,
                count: authoritative.len(),
            }
        );
        authoritative[0]
    };

    let wkb = if with_geometry {
        let anchor_geometry = group[anchor_index]
            .geometry
            .as_ref()
            .context(error::BoundaryGeometryMissing {
                fid: group[anchor_index].id as u64,
            })?;

        let mut merged = anchor_geometry.clone();
        for (index, record) in group.iter().enumerate() {
            if index == anchor_index {
                continue;
            }
            let geometry =
                record
                    .geometry
                    .as_ref()
                    .context(error::BoundaryGeometryMissing {
                        fid: record.id as u64,
                    })?;
            merged = merged
                .union(geometry)
                .context(error::BoundaryUnionFailed { iso3 })?;
        }
        Some(merged.wkb()?)
    } else {
        None
    };

    let anchor = &group[anchor_index];
    Ok(Boundary {
        id: anchor.id,
        iso3: anchor.iso3.clone(),
        name: anchor.name.clone(),
        region: anchor.region.clone(),
        wkb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use gdal::vector::OGRFieldType;
    use gdal::DriverManager;

    struct Record {
        id: i64,
        iso3: &'static str,
        name: &'static str,
        region: &'static str,
        disputed: &'static str,
        wkt: &'static str,
    }

    const UNIT_SQUARE: &str = "MULTIPOLYGON (((0 0, 0 1, 1 1, 1 0, 0 0)))";
    const SHIFTED_SQUARE: &str = "MULTIPOLYGON (((0.5 0, 0.5 1, 1.5 1, 1.5 0, 0.5 0)))";
    const FAR_SQUARE: &str = "MULTIPOLYGON (((10 10, 10 11, 11 11, 11 10, 10 10)))";

    fn store(records: &[Record]) -> BoundaryStore {
        let driver = DriverManager::get_driver_by_name("Memory").expect("memory driver");
        let mut dataset = driver
            .create_vector_only("boundary-store-test")
            .expect("in-memory dataset");
        {
            let mut layer = dataset
                .create_layer(Default::default())
                .expect("create layer");
            layer
                .create_defn_fields(&[
                    (FIELD_ID, OGRFieldType::OFTInteger64),
                    (FIELD_ISO3, OGRFieldType::OFTString),
                    (FIELD_NAME, OGRFieldType::OFTString),
                    (FIELD_REGION, OGRFieldType::OFTString),
                    (FIELD_DISPUTED, OGRFieldType::OFTString),
                ])
                .expect("create fields");

            for record in records {
                layer
                    .create_feature_fields(
                        Geometry::from_wkt(record.wkt).expect("valid wkt"),
                        &[
                            FIELD_ID,
                            FIELD_ISO3,
                            FIELD_NAME,
                            FIELD_REGION,
                            FIELD_DISPUTED,
                        ],
                        &[
                            FieldValue::Integer64Value(record.id),
                            FieldValue::StringValue(record.iso3.to_string()),
                            FieldValue::StringValue(record.name.to_string()),
                            FieldValue::StringValue(record.region.to_string()),
                            FieldValue::StringValue(record.disputed.to_string()),
                        ],
                    )
                    .expect("insert record");
            }
        }
        BoundaryStore::from_dataset(dataset)
    }

    fn lesotho_fixture() -> BoundaryStore {
        store(&[
            Record {
                id: 1,
                iso3: "LSO",
                name: "Lesotho",
                region: "southern-africa",
                disputed: "no",
                wkt: UNIT_SQUARE,
            },
            Record {
                id: 2,
                iso3: "LSO",
                name: "Lesotho (claimed)",
                region: REGION_NONE,
                disputed: "yes",
                wkt: SHIFTED_SQUARE,
            },
            Record {
                id: 3,
                iso3: "AAA",
                name: "Aaaland",
                region: "nowhere",
                disputed: "no",
                wkt: FAR_SQUARE,
            },
        ])
    }

    #[test]
    fn merge_unions_geometries_and_keeps_authoritative_attributes() {
        let store = lesotho_fixture();
        let boundaries = store
            .resolve(
                &[BoundaryKey::iso3("lso")],
                ResolveOptions {
                    with_geometry: true,
                    ..Default::default()
                },
            )
            .expect("resolvable");

        assert_eq!(boundaries.len(), 1);
        let boundary = &boundaries[0];
        assert_eq!(boundary.id, 1);
        assert_eq!(boundary.name, "Lesotho");
        assert_eq!(boundary.region, "southern-africa");

        // two unit squares overlapping in [0.5,1]x[0,1]
        let area = boundary.geometry().expect("wkb present").area();
        assert!(approx_eq!(f64, area, 1.75, epsilon = 1e-9));
    }

    #[test]
    fn disputed_only_group_fails() {
        let store = store(&[
            Record {
                id: 1,
                iso3: "XYZ",
                name: "Claim A",
                region: REGION_NONE,
                disputed: "yes",
                wkt: UNIT_SQUARE,
            },
            Record {
                id: 2,
                iso3: "XYZ",
                name: "Claim B",
                region: REGION_NONE,
                disputed: "yes",
                wkt: SHIFTED_SQUARE,
            },
        ]);

        let err = store
            .resolve(&[BoundaryKey::iso3("XYZ")], ResolveOptions::default())
            .expect_err("no authoritative record");
        assert!(matches!(
            err,
            crate::error::Error::NoAuthoritativeBoundary { iso3, count: 2 } if iso3 == "XYZ"
        ));
    }

    #[test]
    fn missing_keys_are_reported() {
        let store = lesotho_fixture();
        let err = store
            .resolve(
                &[BoundaryKey::iso3("AAA"), BoundaryKey::iso3("BBB")],
                ResolveOptions::default(),
            )
            .expect_err("BBB does not exist");
        assert!(matches!(
            err,
            crate::error::Error::BoundaryNotFound { missing } if missing == vec!["BBB".to_string()]
        ));
    }

    #[test]
    fn listing_is_sorted_and_skips_geometry() {
        let store = lesotho_fixture();
        let boundaries = store
            .resolve(&[], ResolveOptions::default())
            .expect("select all");

        let names: Vec<&str> = boundaries.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Aaaland", "Lesotho"]);
        assert!(boundaries.iter().all(|b| b.wkb.is_none()));
    }

    #[test]
    fn resolve_by_object_id() {
        let store = lesotho_fixture();
        let boundaries = store
            .resolve(&[BoundaryKey::Id(3)], ResolveOptions::default())
            .expect("id exists");
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].iso3, "AAA");
    }

    #[test]
    fn unbucketed_records_can_be_skipped() {
        let store = lesotho_fixture();
        let boundaries = store
            .resolve(
                &[],
                ResolveOptions {
                    skip_unbucketed: true,
                    ..Default::default()
                },
            )
            .expect("select all");

        // the sentinel-bucket LSO claim is gone, the LSO group collapses
        // to the single authoritative record
        assert_eq!(boundaries.len(), 2);
        assert!(boundaries.iter().all(|b| b.region != REGION_NONE));
    }
}
