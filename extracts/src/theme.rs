use gdal::vector::{OGRFieldType, OGRwkbGeometryType};
use snafu::{ensure, OptionExt};

use crate::error;
use crate::util::Result;

/// One entry of the theme registry: an Overture `theme=<theme>/type=<type>`
/// partition together with the geometry type and the fixed field list the
/// extraction writes for it.
#[derive(Debug)]
pub struct ThemeMapping {
    pub theme: &'static str,
    pub type_name: &'static str,
    /// Geometry type of the output layer. Source geometries are normalized
    /// to this multi-type before writing.
    pub geometry_type: OGRwkbGeometryType::Type,
    pub fields: &'static [(&'static str, OGRFieldType::Type)],
}

const BUILDING_FIELDS: &[(&str, OGRFieldType::Type)] = &[
    ("id", OGRFieldType::OFTString),
    ("version", OGRFieldType::OFTInteger),
    ("subtype", OGRFieldType::OFTString),
    ("class", OGRFieldType::OFTString),
];

const TRANSPORTATION_FIELDS: &[(&str, OGRFieldType::Type)] = &[
    ("id", OGRFieldType::OFTString),
    ("version", OGRFieldType::OFTInteger),
    ("subtype", OGRFieldType::OFTString),
    ("class", OGRFieldType::OFTString),
];

/// The theme/type registry. Process-wide static configuration; built once,
/// never mutated.
pub const THEME_MAPPINGS: &[ThemeMapping] = &[
    ThemeMapping {
        theme: "buildings",
        type_name: "building",
        geometry_type: OGRwkbGeometryType::wkbMultiPolygon,
        fields: BUILDING_FIELDS,
    },
    ThemeMapping {
        theme: "buildings",
        type_name: "building_part",
        geometry_type: OGRwkbGeometryType::wkbMultiPolygon,
        fields: BUILDING_FIELDS,
    },
    ThemeMapping {
        theme: "transportation",
        type_name: "segment",
        geometry_type: OGRwkbGeometryType::wkbMultiLineString,
        fields: TRANSPORTATION_FIELDS,
    },
    ThemeMapping {
        theme: "transportation",
        type_name: "connector",
        geometry_type: OGRwkbGeometryType::wkbMultiLineString,
        fields: TRANSPORTATION_FIELDS,
    },
];

/// Looks a type name (e.g. `"segment"`) up in the registry.
///
/// This runs before any I/O so that a bad `--type` argument fails fast.
pub fn find_theme(type_name: &str) -> Result<&'static ThemeMapping> {
    THEME_MAPPINGS
        .iter()
        .find(|mapping| mapping.type_name == type_name)
        .context(error::ThemeNotFound { type_name })
}

/// Compacts a release string for use inside a file name,
/// e.g. `"2024-08-20.0"` becomes `"202408200"`.
///
/// File names are split on `_`, so the release component must not contain
/// separators of its own.
pub fn compact_release(release: &str) -> Result<String> {
    let (date, minor) = release
        .rsplit_once('.')
        .ok_or_else(|| error::Error::InvalidRelease {
            release: release.to_string(),
        })?;
    let digits: String = date.chars().filter(char::is_ascii_digit).collect();
    ensure!(
        digits.len() == 8 && minor.chars().all(|c| c.is_ascii_digit()) && !minor.is_empty(),
        error::InvalidRelease { release }
    );
    Ok(format!("{digits}{minor}"))
}

/// Recovers `"2024-08-20.0"` from the compact form `"202408200"`.
pub fn expand_release(compact: &str) -> Result<String> {
    ensure!(
        compact.len() >= 9 && compact.chars().all(|c| c.is_ascii_digit()),
        error::InvalidRelease { release: compact }
    );
    let (date, minor) = compact.split_at(8);
    Ok(format!(
        "{}-{}-{}.{}",
        &date[0..4],
        &date[4..6],
        &date[6..8],
        minor
    ))
}

/// Deterministic output file name: `<key>_<theme>_<type>_<release>.fgb`.
///
/// `key` is the lower-cased ISO3 code (or object id) of the extracted
/// boundary. Downstream upload and catalog sync key on this name.
pub fn output_file_name(key: &str, mapping: &ThemeMapping, release: &str) -> Result<String> {
    Ok(format!(
        "{}_{}_{}_{}.fgb",
        key.to_lowercase(),
        mapping.theme,
        mapping.type_name,
        compact_release(release)?
    ))
}

/// Components recovered from a published extract file name.
#[derive(Debug)]
pub struct ParsedFileName {
    pub key: String,
    pub mapping: &'static ThemeMapping,
    pub release: String,
}

/// Parses `<key>_<theme>_<type>_<release>.fgb` back into its parts.
///
/// This is how the catalog sync reads published files; the release
/// comes back in its expanded `"2024-08-20.0"` form.
pub fn parse_file_name(file_name: &str) -> Result<ParsedFileName> {
    let stem = file_name
        .strip_suffix(".fgb")
        .context(error::InvalidFileName { file_name })?;
    let (key, rest) = stem
        .split_once('_')
        .context(error::InvalidFileName { file_name })?;
    // type names may contain underscores, the release never does
    let (middle, compact) = rest
        .rsplit_once('_')
        .context(error::InvalidFileName { file_name })?;

    let mapping = THEME_MAPPINGS
        .iter()
        .find(|mapping| {
            middle
                .strip_prefix(mapping.theme)
                .and_then(|rest| rest.strip_prefix('_'))
                .is_some_and(|type_name| type_name == mapping.type_name)
        })
        .context(error::ThemeNotFound { type_name: middle })?;

    Ok(ParsedFileName {
        key: key.to_string(),
        mapping,
        release: expand_release(compact)?,
    })
}

/// Human-readable catalog resource title, e.g. `"Lesotho segment extract"`.
pub fn resource_title(boundary_name: &str, mapping: &ThemeMapping) -> String {
    format!("{boundary_name} {} extract", mapping.type_name)
}
