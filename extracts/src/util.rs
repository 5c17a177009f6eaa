use std::path::Path;

use gdal::{Dataset, DatasetOptions};

use crate::error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Opens a GDAL dataset with the given `path`.
pub fn gdal_open_dataset(path: &Path) -> Result<Dataset> {
    gdal_open_dataset_ex(path, DatasetOptions::default())
}

/// Opens a GDAL dataset with the given `path` and `dataset_options`.
pub fn gdal_open_dataset_ex(path: &Path, dataset_options: DatasetOptions) -> Result<Dataset> {
    #[cfg(debug_assertions)]
    let dataset_options = {
        let mut dataset_options = dataset_options;
        dataset_options.open_flags |= gdal::GdalOpenFlags::GDAL_OF_VERBOSE_ERROR;
        dataset_options
    };

    Ok(Dataset::open_ex(path, dataset_options)?)
}
