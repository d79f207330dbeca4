use std::{
    fs,
    path::{Path, PathBuf},
};

use csv::StringRecord;
use ndarray::{Array2, ArrayView1};
use tracing::{debug, info};

use crate::Error;

/// Where a dataset lives and which columns are targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    subdir: String,
    targets: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            subdir: "train_data".into(),
            targets: vec!["VALENCE".into(), "AROUSAL".into()],
        }
    }
}

impl DatasetConfig {
    /// Reads CSV files from `subdir` instead of `train_data`.
    #[must_use]
    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = subdir.into();
        self
    }

    /// Uses `targets` as the target columns, in that order.
    #[must_use]
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn subdir(&self) -> &str {
        &self.subdir
    }

    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

/// Feature and target rows loaded from a directory of CSV files.
///
/// Empty cells load as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularDataset {
    features: Array2<f64>,
    targets: Array2<f64>,
    feature_names: Vec<String>,
    target_names: Vec<String>,
}

/// Column positions within one file.
struct Layout {
    feature_names: Vec<String>,
    feature_idx: Vec<usize>,
    target_idx: Vec<usize>,
}

impl TabularDataset {
    /// Loads `dir/train_data/*.csv` with `VALENCE` and `AROUSAL` as targets.
    ///
    /// # Errors
    ///
    /// See [`load_with`](Self::load_with).
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, Error> {
        Self::load_with(dir, &DatasetConfig::default())
    }

    /// Loads every CSV file directly inside `dir/<subdir>`, in path order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file cannot be read, no CSV
    /// file or no data row is found, a file lacks a target column, files
    /// disagree on their feature columns, or a cell is not a number.
    pub fn load_with(dir: impl AsRef<Path>, config: &DatasetConfig) -> Result<Self, Error> {
        let data_dir = dir.as_ref().join(&config.subdir);
        let files = csv_files(&data_dir)?;
        if files.is_empty() {
            return Err(Error::NoFiles(data_dir));
        }

        let mut feature_names: Option<Vec<String>> = None;
        let mut features = Vec::new();
        let mut targets = Vec::new();
        let mut rows = 0;

        for path in &files {
            let csv_err = |source| Error::Csv {
                path: path.clone(),
                source,
            };
            let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
            let headers = reader.headers().map_err(csv_err)?.clone();

            // Columns may sit in a different order in each file, but the
            // feature names must agree.
            let layout = Layout::from_headers(path, &headers, &config.targets)?;
            if let Some(expected) = &feature_names {
                if *expected != layout.feature_names {
                    return Err(Error::HeaderMismatch {
                        path: path.clone(),
                        expected: expected.clone(),
                        found: layout.feature_names,
                    });
                }
            } else {
                feature_names = Some(layout.feature_names.clone());
            }

            let mut file_rows = 0;
            for record in reader.records() {
                let record = record.map_err(csv_err)?;
                let line = record.position().map_or(0, csv::Position::line);
                let cell = |idx: usize| parse_cell(path, line, &headers, &record, idx);

                for &idx in &layout.feature_idx {
                    features.push(cell(idx)?);
                }
                for &idx in &layout.target_idx {
                    targets.push(cell(idx)?);
                }
                file_rows += 1;
            }
            debug!(path = %path.display(), rows = file_rows, "read csv file");
            rows += file_rows;
        }

        if rows == 0 {
            return Err(Error::NoRows(data_dir));
        }
        let feature_names = feature_names.unwrap_or_default();
        let features = Array2::from_shape_vec((rows, feature_names.len()), features)?;
        let targets = Array2::from_shape_vec((rows, config.targets.len()), targets)?;

        info!(
            dir = %data_dir.display(),
            files = files.len(),
            rows,
            features = feature_names.len(),
            "loaded dataset"
        );
        Ok(Self {
            features,
            targets,
            feature_names,
            target_names: config.targets.clone(),
        })
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The feature and target rows at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<(ArrayView1<'_, f64>, ArrayView1<'_, f64>)> {
        (idx < self.len()).then(|| (self.features.row(idx), self.targets.row(idx)))
    }

    #[must_use]
    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    #[must_use]
    pub fn targets(&self) -> &Array2<f64> {
        &self.targets
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }
}

impl Layout {
    fn from_headers(path: &Path, headers: &StringRecord, targets: &[String]) -> Result<Self, Error> {
        let target_idx = targets
            .iter()
            .map(|target| {
                headers
                    .iter()
                    .position(|h| h == target)
                    .ok_or_else(|| Error::MissingColumn {
                        path: path.to_path_buf(),
                        column: target.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (feature_idx, feature_names) = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !targets.iter().any(|t| t == h))
            .map(|(idx, h)| (idx, h.to_owned()))
            .unzip();

        Ok(Self {
            feature_names,
            feature_idx,
            target_idx,
        })
    }
}

/// Lists the `.csv` files directly inside `dir`, sorted by path.
fn csv_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let io_err = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn parse_cell(
    path: &Path,
    line: u64,
    headers: &StringRecord,
    record: &StringRecord,
    idx: usize,
) -> Result<f64, Error> {
    let value = record.get(idx).unwrap_or_default().trim();
    if value.is_empty() {
        return Ok(f64::NAN);
    }
    value.parse().map_err(|_| Error::ParseValue {
        path: path.to_path_buf(),
        line,
        column: headers.get(idx).unwrap_or_default().to_owned(),
        value: value.to_owned(),
    })
}
