//! Reading and writing forcing datasets.
//!
//! The format is picked from the file extension: `.json` documents are
//! always available, `.nc` files need the `netcdf` feature. Writes never
//! replace an existing file.

use crate::dataset::ForcingDataset;
use crate::errors::{ForcingError, ForcingResult};
use crate::naming::ArtifactFormat;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use log::{debug, info};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Time units used when writing NetCDF artifacts.
pub const CF_TIME_UNITS: &str = "days since 1970-01-01 00:00:00";

/// Reads a dataset and checks its invariants.
pub fn read_dataset(path: &Path) -> ForcingResult<ForcingDataset> {
    let dataset = match ArtifactFormat::from_path(path)? {
        ArtifactFormat::Json => {
            let text = fs::read_to_string(path)?;
            serde_json::from_str::<ForcingDataset>(&text)?
        }
        ArtifactFormat::NetCdf => read_netcdf(path)?,
    };
    dataset.validate()?;
    debug!(
        "Read {} rows and {} variables from {}",
        dataset.len(),
        dataset.variables().len(),
        path.display()
    );
    Ok(dataset)
}

/// Writes `dataset` to `path`.
///
/// Fails with [`ForcingError::ArtifactExists`] if the file is already there.
pub fn write_dataset(path: &Path, dataset: &ForcingDataset) -> ForcingResult<()> {
    match ArtifactFormat::from_path(path)? {
        ArtifactFormat::Json => {
            let body = serde_json::to_vec_pretty(dataset)?;
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => ForcingError::ArtifactExists(path.to_path_buf()),
                    _ => ForcingError::Io(e),
                })?;
            file.write_all(&body)?;
        }
        ArtifactFormat::NetCdf => write_netcdf(path, dataset)?,
    }
    Ok(())
}

/// Writes `dataset` as `directory/name` and returns the full path.
pub fn persist(directory: &Path, name: &str, dataset: &ForcingDataset) -> ForcingResult<PathBuf> {
    let path = directory.join(name);
    write_dataset(&path, dataset)?;
    info!("Persisted {} rows to {}", dataset.len(), path.display());
    Ok(path)
}

#[cfg(feature = "netcdf")]
fn read_netcdf(path: &Path) -> ForcingResult<ForcingDataset> {
    netcdf_io::read(path)
}

#[cfg(not(feature = "netcdf"))]
fn read_netcdf(path: &Path) -> ForcingResult<ForcingDataset> {
    Err(netcdf_unavailable(path))
}

#[cfg(feature = "netcdf")]
fn write_netcdf(path: &Path, dataset: &ForcingDataset) -> ForcingResult<()> {
    netcdf_io::write(path, dataset)
}

#[cfg(not(feature = "netcdf"))]
fn write_netcdf(path: &Path, _dataset: &ForcingDataset) -> ForcingResult<()> {
    Err(netcdf_unavailable(path))
}

#[cfg(not(feature = "netcdf"))]
fn netcdf_unavailable(path: &Path) -> ForcingError {
    ForcingError::Configuration(format!(
        "{} is a NetCDF file but NetCDF support was not compiled in (enable the `netcdf` feature)",
        path.display()
    ))
}

/// Decodes CF time values such as `days since 1980-01-01` into timestamps.
pub fn decode_cf_time(units: &str, values: &[f64]) -> ForcingResult<Vec<DateTime<Utc>>> {
    let (step_seconds, reference) = parse_cf_units(units)?;
    values
        .iter()
        .map(|v| {
            if !v.is_finite() {
                return Err(ForcingError::Dataset(format!(
                    "non-finite time value {v} ({units})"
                )));
            }
            let millis = (v * step_seconds * 1000.0).round();
            (millis.abs() < i64::MAX as f64)
                .then(|| Duration::try_milliseconds(millis as i64))
                .flatten()
                .and_then(|offset| reference.checked_add_signed(offset))
                .ok_or_else(|| {
                    ForcingError::Dataset(format!("time value {v} ({units}) is out of range"))
                })
        })
        .collect()
}

/// Encodes timestamps as fractional days since the Unix epoch.
pub fn encode_cf_days(time: &[DateTime<Utc>]) -> Vec<f64> {
    time.iter()
        .map(|t| t.timestamp_millis() as f64 / 86_400_000.0)
        .collect()
}

fn parse_cf_units(units: &str) -> ForcingResult<(f64, DateTime<Utc>)> {
    let invalid = || ForcingError::Dataset(format!("unsupported CF time units `{units}`"));
    let (step, reference) = units.split_once(" since ").ok_or_else(invalid)?;
    let step_seconds = match step.trim().to_ascii_lowercase().as_str() {
        "days" | "day" | "d" => 86_400.0,
        "hours" | "hour" | "h" => 3_600.0,
        "minutes" | "minute" | "min" => 60.0,
        "seconds" | "second" | "s" => 1.0,
        _ => return Err(invalid()),
    };

    let reference = reference.trim().trim_end_matches('Z').trim_end_matches(" UTC");
    let parsed = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(reference, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(reference, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(invalid)?;
    Ok((step_seconds, parsed.and_utc()))
}

#[cfg(feature = "netcdf")]
mod netcdf_io {
    //! Lumped NetCDF datasets: one time dimension, variables along it.

    use super::{decode_cf_time, encode_cf_days, CF_TIME_UNITS};
    use crate::dataset::{AttributeValue, ForcingDataset};
    use crate::errors::{ForcingError, ForcingResult};
    use log::warn;
    use ndarray::Array1;
    use netcdf::AttributeValue as NcValue;
    use std::path::Path;

    const TIME_DIMENSIONS: [&str; 2] = ["time", "date"];

    fn text_attribute(value: NcValue) -> Option<AttributeValue> {
        match value {
            NcValue::Str(s) => Some(AttributeValue::Text(s)),
            NcValue::Double(v) => Some(AttributeValue::Number(v)),
            NcValue::Float(v) => Some(AttributeValue::Number(v as f64)),
            NcValue::Int(v) => Some(AttributeValue::Number(v as f64)),
            NcValue::Short(v) => Some(AttributeValue::Number(v as f64)),
            _ => None,
        }
    }

    pub(super) fn read(path: &Path) -> ForcingResult<ForcingDataset> {
        let file = netcdf::open(path)?;

        let dimension = TIME_DIMENSIONS
            .iter()
            .find(|name| file.dimension(name).is_some())
            .ok_or_else(|| {
                ForcingError::Dataset(format!("{} has no time dimension", path.display()))
            })?
            .to_string();
        let n_time = file.dimension(&dimension).map(|d| d.len()).unwrap_or(0);

        let time_var = file.variable(&dimension).ok_or_else(|| {
            ForcingError::Dataset(format!(
                "{} has no `{dimension}` coordinate variable",
                path.display()
            ))
        })?;
        let time_units = match time_var.attribute("units").map(|a| a.value()).transpose()? {
            Some(NcValue::Str(units)) => units,
            _ => {
                return Err(ForcingError::Dataset(format!(
                    "`{dimension}` in {} has no CF units",
                    path.display()
                )))
            }
        };
        let raw_time: Vec<f64> = time_var.get_values::<f64, _>(..)?;
        let time = decode_cf_time(&time_units, &raw_time)?;

        let mut dataset = ForcingDataset::with_dimension(dimension.clone(), time)?;
        for attr in file.attributes() {
            if let Some(value) = text_attribute(attr.value()?) {
                dataset.set_attribute(attr.name(), value);
            }
        }

        let mut skipped = Vec::new();
        for variable in file.variables() {
            let name = variable.name();
            if name == dimension {
                continue;
            }
            let dims = variable.dimensions();
            let along_time = dims.iter().any(|d| d.name() == dimension);
            let size: usize = dims.iter().map(|d| d.len()).product();
            if !along_time || size != n_time {
                warn!(
                    "Skipping {name} in {}: not a lumped series along {dimension}",
                    path.display()
                );
                skipped.push(name);
                continue;
            }
            let values: Vec<f64> = variable.get_values::<f64, _>(..)?;
            let units = match variable.attribute("units").map(|a| a.value()).transpose()? {
                Some(NcValue::Str(units)) => units,
                _ => String::new(),
            };
            dataset.insert_variable(name, units, Array1::from(values))?;
        }
        if !skipped.is_empty() {
            dataset.push_history(&format!(
                "skipped non-lumped variable(s): {}",
                skipped.join(", ")
            ));
        }
        Ok(dataset)
    }

    pub(super) fn write(path: &Path, dataset: &ForcingDataset) -> ForcingResult<()> {
        if path.exists() {
            return Err(ForcingError::ArtifactExists(path.to_path_buf()));
        }
        let mut file = netcdf::create_with(path, netcdf::Options::NOCLOBBER)?;
        let dimension = dataset.dimension();
        file.add_dimension(dimension, dataset.len())?;

        for (key, value) in dataset.attributes() {
            match value {
                AttributeValue::Number(v) => file.add_attribute(key, *v)?,
                AttributeValue::Text(s) => file.add_attribute(key, s.as_str())?,
            };
        }

        let mut time_var = file.add_variable::<f64>(dimension, &[dimension])?;
        time_var.put_attribute("units", CF_TIME_UNITS)?;
        time_var.put_attribute("calendar", "standard")?;
        time_var.put_values(encode_cf_days(dataset.time()).as_slice(), ..)?;

        for (name, variable) in dataset.variables() {
            let mut var = file.add_variable::<f64>(name, &[dimension])?;
            var.put_attribute("units", variable.units.as_str())?;
            var.put_attribute("_FillValue", f64::NAN)?;
            var.put_values(variable.values.to_vec().as_slice(), ..)?;
        }
        Ok(())
    }
}
