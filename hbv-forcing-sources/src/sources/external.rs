//! Externally prepared forcing datasets
//!
//! Either one dataset holding `pr`, `evspsblpot` and `tas`, or one dataset
//! per variable. Datasets following the Caravan naming convention
//! (`total_precipitation_sum`, `temperature_2m_min`, ... along `date`) are
//! renamed to the canonical names first.

use hbv_forcing_core::dataset::{ForcingDataset, TIME_DIMENSION};
use hbv_forcing_core::errors::{ForcingError, ForcingResult};
use hbv_forcing_core::source::{resolve_path, ForcingPart, ForcingSource};
use hbv_forcing_core::storage::read_dataset;
use hbv_forcing_core::variables::{VAR_EVSPSBLPOT, VAR_PR, VAR_TAS, VAR_TASMAX, VAR_TASMIN};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Caravan variable names and their canonical counterparts.
pub const ALTERNATE_NAMES: [(&str, &str); 5] = [
    ("total_precipitation_sum", "pr"),
    ("potential_evaporation_sum", "evspsblpot"),
    ("streamflow", "Q"),
    ("temperature_2m_min", "tasmin"),
    ("temperature_2m_max", "tasmax"),
];

/// Time dimension name used by Caravan datasets.
pub const ALTERNATE_DIMENSION: &str = "date";

/// Renames Caravan style variables and dimension to canonical form.
///
/// `tas` is recomputed as the mean of `tasmin` and `tasmax` when either was
/// renamed, or when `tas` is absent and both extremes are present.
/// Returns `true` if anything was renamed.
pub fn apply_alternate_naming(dataset: &mut ForcingDataset) -> ForcingResult<bool> {
    let mut renamed = false;
    let mut extremes_renamed = false;
    for (from, to) in ALTERNATE_NAMES {
        if dataset.rename_variable(from, to) {
            debug!("Renamed {from} to {to}");
            renamed = true;
            extremes_renamed |= to == VAR_TASMIN.name || to == VAR_TASMAX.name;
        }
    }
    renamed |= dataset.rename_dimension(ALTERNATE_DIMENSION, TIME_DIMENSION);

    let has_extremes = dataset.contains(VAR_TASMIN.name) && dataset.contains(VAR_TASMAX.name);
    if has_extremes && (extremes_renamed || !dataset.contains(VAR_TAS.name)) {
        dataset.insert_mean(VAR_TAS.name, VAR_TASMIN.name, VAR_TASMAX.name)?;
    }
    Ok(renamed)
}

/// Forcing read from existing dataset files.
///
/// Each path names the file holding that variable. Paths may repeat, and a
/// file named for several variables is read and persisted once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalDataset {
    pub pr: PathBuf,
    pub evspsblpot: PathBuf,
    pub tas: PathBuf,
}

impl ExternalDataset {
    pub fn new(
        pr: impl Into<PathBuf>,
        evspsblpot: impl Into<PathBuf>,
        tas: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pr: pr.into(),
            evspsblpot: evspsblpot.into(),
            tas: tas.into(),
        }
    }

    /// All variables from one file.
    pub fn combined(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(path.clone(), path.clone(), path)
    }

    pub fn is_combined(&self) -> bool {
        self.pr == self.evspsblpot && self.evspsblpot == self.tas
    }

    /// Files in first-use order with the variables each must provide.
    fn grouped(&self) -> Vec<(&Path, Vec<&'static str>)> {
        let mut groups: Vec<(&Path, Vec<&'static str>)> = Vec::new();
        for (variable, path) in [
            (VAR_PR.name, &self.pr),
            (VAR_EVSPSBLPOT.name, &self.evspsblpot),
            (VAR_TAS.name, &self.tas),
        ] {
            match groups.iter_mut().find(|(p, _)| *p == path.as_path()) {
                Some((_, variables)) => variables.push(variable),
                None => groups.push((path.as_path(), vec![variable])),
            }
        }
        groups
    }

    fn load(path: &Path) -> ForcingResult<ForcingDataset> {
        let mut dataset = read_dataset(path)?;
        if apply_alternate_naming(&mut dataset)? {
            info!("Applied Caravan naming to {}", path.display());
            dataset.push_history("renamed from Caravan conventions");
        }
        if dataset.dimension() != TIME_DIMENSION {
            return Err(ForcingError::Dataset(format!(
                "{} is indexed by `{}`, expected `{TIME_DIMENSION}`",
                path.display(),
                dataset.dimension()
            )));
        }
        dataset.normalize_units();
        Ok(dataset)
    }
}

#[typetag::serde]
impl ForcingSource for ExternalDataset {
    fn source_tag(&self) -> &'static str {
        "external"
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn produce(&self, directory: &Path) -> ForcingResult<Vec<ForcingPart>> {
        let mut parts = Vec::new();
        for (path, variables) in self.grouped() {
            let path = resolve_path(directory, path);
            let dataset = Self::load(&path)?;
            dataset.require(
                variables.iter().copied(),
                &format!("external dataset {}", path.display()),
            )?;
            parts.push(ForcingPart::new(dataset, variables));
        }
        Ok(parts)
    }
}
