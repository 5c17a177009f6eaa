use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use snafu::ResultExt;

use crate::error;
use crate::util::Result;

/// Runtime settings of the extraction pipeline.
///
/// Sources are merged in order: built-in defaults, an optional TOML
/// file, then `EXTRACTS_`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    /// Local indexed vector store with the administrative boundaries.
    pub boundaries_path: PathBuf,
    /// Dataset release the extraction runs against, e.g. `"2024-08-20.0"`.
    pub release: String,
    /// Directory the per-country output files are written to.
    pub output_dir: PathBuf,
    /// Object-storage bucket the upload collaborator targets.
    pub bucket_name: String,
    /// Region of the bucket, if any.
    pub aws_region: Option<String>,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("boundaries_path", "./boundaries.fgb")
            .context(error::Config)?
            .set_default("release", "2024-08-20.0")
            .context(error::Config)?
            .set_default("output_dir", ".")
            .context(error::Config)?
            .set_default("bucket_name", "overturemaps-extracts")
            .context(error::Config)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file));
        }

        builder
            .add_source(Environment::with_prefix("EXTRACTS"))
            .build()
            .context(error::Config)?
            .try_deserialize()
            .context(error::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let settings = Settings::load(None).expect("defaults deserialize");
        assert_eq!(settings.boundaries_path, PathBuf::from("./boundaries.fgb"));
        assert_eq!(settings.release, "2024-08-20.0");
        assert_eq!(settings.bucket_name, "overturemaps-extracts");
        assert!(settings.aws_region.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("extracts.toml");
        std::fs::write(&path, "release = \"2025-01-01.1\"\n").expect("write config");

        let settings = Settings::load(Some(&path)).expect("valid config");
        assert_eq!(settings.release, "2025-01-01.1");
        assert_eq!(settings.bucket_name, "overturemaps-extracts");
    }
}
