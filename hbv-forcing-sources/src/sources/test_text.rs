//! Synthetic test forcing
//!
//! Delimited text with the columns `year month day pr Q pev`, one row per
//! day and no header. There is no temperature in these files, so a
//! constant warm placeholder keeps the downstream snow routine inactive.

use super::{numbered_lines, parse_date, parse_number};
use hbv_forcing_core::dataset::{ForcingDataset, DATASET_TITLE};
use hbv_forcing_core::errors::{ForcingError, ForcingResult};
use hbv_forcing_core::source::{resolve_path, ForcingPart, ForcingSource};
use hbv_forcing_core::variables::{
    UNIT_CELSIUS, UNIT_MM_PER_DAY, VAR_DISCHARGE, VAR_EVSPSBLPOT, VAR_PR, VAR_TAS,
};
use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Mean temperature used in place of observations (degC).
pub const PLACEHOLDER_TEMPERATURE: f64 = 25.0;

const COLUMNS: usize = 6;

/// Forcing read from a synthetic test table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestText {
    pub path: PathBuf,
}

impl TestText {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self, path: &Path) -> ForcingResult<ForcingDataset> {
        let mut dates = Vec::new();
        let (mut pr, mut discharge, mut pev) = (Vec::new(), Vec::new(), Vec::new());

        for (line, text) in numbered_lines(path)? {
            let fields: Vec<&str> = text.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() != COLUMNS {
                return Err(ForcingError::format(
                    path,
                    line,
                    format!(
                        "expected {COLUMNS} columns (year month day pr Q pev), found {}",
                        fields.len()
                    ),
                ));
            }
            dates.push(parse_date(path, line, fields[0], fields[1], fields[2])?);
            pr.push(parse_number(path, line, fields[3], "pr")?);
            discharge.push(parse_number(path, line, fields[4], "Q")?);
            pev.push(parse_number(path, line, fields[5], "pev")?);
        }
        debug!("Read {} rows from {}", dates.len(), path.display());

        let mut dataset = ForcingDataset::from_dates(&dates)?;
        dataset.insert_variable(VAR_PR.name, UNIT_MM_PER_DAY, Array1::from(pr))?;
        dataset.insert_variable(VAR_DISCHARGE.name, UNIT_MM_PER_DAY, Array1::from(discharge))?;
        dataset.insert_variable(VAR_EVSPSBLPOT.name, UNIT_MM_PER_DAY, Array1::from(pev))?;
        dataset.insert_constant(VAR_TAS.name, UNIT_CELSIUS, PLACEHOLDER_TEMPERATURE)?;
        dataset.set_attribute("title", DATASET_TITLE);
        dataset.push_history(&format!("created from test text {}", path.display()));
        Ok(dataset)
    }
}

#[typetag::serde]
impl ForcingSource for TestText {
    fn source_tag(&self) -> &'static str {
        "test"
    }

    fn produce(&self, directory: &Path) -> ForcingResult<Vec<ForcingPart>> {
        let dataset = self.read(&resolve_path(directory, &self.path))?;
        Ok(vec![ForcingPart::new(
            dataset,
            [VAR_PR.name, VAR_EVSPSBLPOT.name, VAR_TAS.name],
        )])
    }
}
