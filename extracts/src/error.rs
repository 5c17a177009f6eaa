use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[snafu(context(suffix(false)))] // disables default `Snafu` suffix
pub enum Error {
    #[snafu(display("Boundary store unavailable at {}: {source}", path.display()))]
    DataSourceUnavailable {
        path: PathBuf,
        source: gdal::errors::GdalError,
    },

    #[snafu(display("No boundary matches the requested key(s): {missing:?}"))]
    BoundaryNotFound { missing: Vec<String> },

    #[snafu(display(
        "All {count} boundary records for '{iso3}' are flagged as disputed, expected exactly one undisputed record"
    ))]
    NoAuthoritativeBoundary { iso3: String, count: usize },

    #[snafu(display(
        "Found {count} undisputed boundary records for '{iso3}', expected exactly one"
    ))]
    AmbiguousAuthoritativeBoundary { iso3: String, count: usize },

    #[snafu(display("Merging boundary geometries for '{iso3}' failed"))]
    BoundaryUnionFailed { iso3: String },

    #[snafu(display("Boundary record {fid} has no geometry"))]
    BoundaryGeometryMissing { fid: u64 },

    #[snafu(display("Unexpected geometry type: expected {expected}, found {found}"))]
    GeometryTypeMismatch { expected: String, found: String },

    #[snafu(display("Unknown Overture type '{type_name}'"))]
    ThemeNotFound { type_name: String },

    #[snafu(display("Invalid release string '{release}'"))]
    InvalidRelease { release: String },

    #[snafu(display("'{file_name}' is not a valid extract file name"))]
    InvalidFileName { file_name: String },

    #[snafu(display("Source layer has no '{column}' column"))]
    ColumnMissing { column: String },

    #[snafu(display("Field '{field}' does not match its field plan entry"))]
    FieldPlanMismatch { field: String },

    #[snafu(display(
        "No partition found under {} for theme={theme}/type={type_name}", root.display()
    ))]
    PartitionNotFound {
        root: PathBuf,
        theme: String,
        type_name: String,
    },

    #[snafu(display("GdalError: {source}"))]
    Gdal { source: gdal::errors::GdalError },

    #[snafu(display("ArrowError: {source}"))]
    Arrow { source: arrow::error::ArrowError },

    #[snafu(display("ParquetError: {source}"))]
    Parquet { source: parquet::errors::ParquetError },

    #[snafu(display("IOError: {source}"))]
    Io { source: std::io::Error },

    #[snafu(display("Invalid configuration: {source}"))]
    Config { source: config::ConfigError },
}

impl From<gdal::errors::GdalError> for Error {
    fn from(source: gdal::errors::GdalError) -> Self {
        Self::Gdal { source }
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(source: arrow::error::ArrowError) -> Self {
        Self::Arrow { source }
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(source: parquet::errors::ParquetError) -> Self {
        Self::Parquet { source }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}
