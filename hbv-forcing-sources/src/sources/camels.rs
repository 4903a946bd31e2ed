//! CAMELS station forcing
//!
//! The lumped CAMELS forcing files (Newman et al., 2015) start with three
//! scalar lines followed by a fixed header:
//!
//! ```text
//! 40.5                      latitude (degrees)
//! 250                       elevation (m)
//! 100000000                 basin area (m^2)
//! Year Mnth Day Hr dayl(s) prcp(mm/day) srad(W/m2) swe(mm) tmax(C) tmin(C) vp(Pa)
//! 1980 01 01 12<TAB>30173.18<TAB>0.00<TAB>153.40<TAB>0.00<TAB>20.00<TAB>5.00<TAB>860.00
//! ```
//!
//! Data rows hold the space separated date and hour followed by seven
//! tab separated values. PET is not part of the file and is estimated from
//! radiation and the temperature range.

use super::{numbered_lines, parse_date, parse_integer, parse_number};
use hbv_forcing_core::dataset::{ForcingDataset, DATASET_TITLE};
use hbv_forcing_core::errors::{ForcingError, ForcingResult};
use hbv_forcing_core::pet::{estimate_pet, DEFAULT_ALPHA};
use hbv_forcing_core::source::{resolve_path, ForcingPart, ForcingSource};
use hbv_forcing_core::variables::{
    UNIT_CELSIUS, UNIT_MM_PER_DAY, VAR_EVSPSBLPOT, VAR_PR, VAR_TAS, VAR_TASMAX, VAR_TASMIN,
};
use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Date columns that open the header line.
pub const CAMELS_HEADER_PREFIX: [&str; 4] = ["Year", "Mnth", "Day", "Hr"];

/// Number of value columns after the date prefix.
const VALUE_COLUMNS: usize = 7;

/// Line holding the column header (1-based).
const HEADER_LINE: usize = 4;

const SRAD: &str = "srad";

/// Column labels that have a canonical forcing name.
const CANONICAL_NAMES: [(&str, &str); 3] = [("prcp", "pr"), ("tmax", "tasmax"), ("tmin", "tasmin")];

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

/// Contents of a CAMELS station file.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    /// unit: degrees
    pub latitude: f64,
    /// unit: m
    pub elevation: f64,
    /// unit: m^2
    pub basin_area: f64,
    /// All columns, with `prcp`, `tmax` and `tmin` renamed to `pr`,
    /// `tasmax` and `tasmin`
    pub dataset: ForcingDataset,
}

/// Splits `name(unit)` into its parts.
fn split_label(label: &str) -> (String, String) {
    match label.split_once('(') {
        Some((name, unit)) => {
            let unit = unit.trim_end_matches(')');
            let unit = if unit == "C" { UNIT_CELSIUS } else { unit };
            (name.to_string(), unit.to_string())
        }
        None => (label.to_string(), String::new()),
    }
}

fn canonical_name(name: &str) -> &str {
    CANONICAL_NAMES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

fn parse_header(path: &Path, line: usize, text: &str) -> ForcingResult<Vec<(String, String)>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < CAMELS_HEADER_PREFIX.len()
        || tokens[..CAMELS_HEADER_PREFIX.len()] != CAMELS_HEADER_PREFIX
    {
        return Err(ForcingError::format(
            path,
            line,
            format!("header must start with `{}`", CAMELS_HEADER_PREFIX.join(" ")),
        ));
    }
    let columns = &tokens[CAMELS_HEADER_PREFIX.len()..];
    if columns.len() != VALUE_COLUMNS {
        return Err(ForcingError::format(
            path,
            line,
            format!(
                "expected {VALUE_COLUMNS} columns after the date, found {}",
                columns.len()
            ),
        ));
    }

    let columns: Vec<(String, String)> = columns.iter().map(|c| split_label(c)).collect();
    for required in ["prcp", SRAD, "tmax", "tmin"] {
        if !columns.iter().any(|(name, _)| name == required) {
            return Err(ForcingError::format(
                path,
                line,
                format!("header has no `{required}` column"),
            ));
        }
    }
    Ok(columns)
}

/// Date tokens and value tokens of one data row.
fn split_row(text: &str) -> Option<(Vec<&str>, Vec<&str>)> {
    let tab_fields: Vec<&str> = text.split('\t').collect();
    if tab_fields.len() == VALUE_COLUMNS + 1 {
        let date: Vec<&str> = tab_fields[0].split_whitespace().collect();
        if date.len() == CAMELS_HEADER_PREFIX.len() {
            return Some((date, tab_fields[1..].to_vec()));
        }
    }
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() == CAMELS_HEADER_PREFIX.len() + VALUE_COLUMNS {
        let (date, values) = tokens.split_at(CAMELS_HEADER_PREFIX.len());
        return Some((date.to_vec(), values.to_vec()));
    }
    None
}

/// Reads a CAMELS station file.
///
/// Timestamps are truncated to the day; the hour column is checked but
/// otherwise ignored.
pub fn read_station_file(path: &Path) -> ForcingResult<StationRecord> {
    let lines = numbered_lines(path)?;
    let scalar = |index: usize, what: &str| -> ForcingResult<f64> {
        let (line, text) = lines.get(index).ok_or_else(|| {
            ForcingError::format(path, index + 1, format!("file ends before the {what} line"))
        })?;
        parse_number(path, *line, text, what)
    };
    let latitude = scalar(0, "latitude")?;
    let elevation = scalar(1, "elevation")?;
    let basin_area = scalar(2, "basin area")?;

    let header_text = lines
        .get(HEADER_LINE - 1)
        .map(|(_, text)| text.as_str())
        .ok_or_else(|| ForcingError::format(path, HEADER_LINE, "file ends before the header"))?;
    let columns = parse_header(path, HEADER_LINE, header_text)?;

    let mut dates = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); columns.len()];
    for (line, text) in lines.iter().skip(HEADER_LINE) {
        if text.trim().is_empty() {
            continue;
        }
        let (date, fields) = split_row(text).ok_or_else(|| {
            ForcingError::format(
                path,
                *line,
                format!(
                    "expected `Year Mnth Day Hr` and {VALUE_COLUMNS} values, found `{}`",
                    text.trim()
                ),
            )
        })?;
        dates.push(parse_date(path, *line, date[0], date[1], date[2])?);
        parse_integer(path, *line, date[3], "hour")?;
        for ((column, field), (name, _)) in values.iter_mut().zip(fields).zip(&columns) {
            column.push(parse_number(path, *line, field, name)?);
        }
    }
    debug!(
        "Read {} rows from CAMELS file {}",
        dates.len(),
        path.display()
    );

    let mut dataset = ForcingDataset::from_dates(&dates)?;
    for ((name, unit), column) in columns.iter().zip(values) {
        dataset.insert_variable(canonical_name(name), unit.as_str(), Array1::from(column))?;
    }
    Ok(StationRecord {
        latitude,
        elevation,
        basin_area,
        dataset,
    })
}

/// Forcing from a CAMELS station file with Priestley-Taylor PET.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CamelsText {
    pub path: PathBuf,
    /// Catchment Priestley-Taylor coefficient
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl CamelsText {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn with_alpha(self, alpha: f64) -> Self {
        Self { alpha, ..self }
    }

    /// Canonical dataset for a parsed station record.
    pub fn build(&self, record: StationRecord) -> ForcingResult<ForcingDataset> {
        let StationRecord {
            latitude,
            elevation,
            basin_area,
            mut dataset,
        } = record;

        let pet = match (
            dataset.values(SRAD),
            dataset.values(VAR_TASMIN.name),
            dataset.values(VAR_TASMAX.name),
        ) {
            (Some(srad), Some(t_min), Some(t_max)) => estimate_pet(
                srad,
                t_min,
                t_max,
                dataset.day_of_year().view(),
                self.alpha,
                elevation,
                latitude,
            )?,
            _ => {
                return Err(ForcingError::MissingVariables {
                    variables: dataset.missing([SRAD, VAR_TASMIN.name, VAR_TASMAX.name]),
                    context: "CAMELS PET estimate".to_string(),
                })
            }
        };
        dataset.insert_variable(VAR_EVSPSBLPOT.name, UNIT_MM_PER_DAY, pet)?;
        dataset.insert_mean(VAR_TAS.name, VAR_TASMIN.name, VAR_TASMAX.name)?;

        dataset.set_attribute("title", DATASET_TITLE);
        dataset.set_attribute("latitude", latitude);
        dataset.set_attribute("elevation", elevation);
        dataset.set_attribute("basin_area", basin_area);
        dataset.set_attribute("alpha", self.alpha);
        Ok(dataset)
    }
}

#[typetag::serde]
impl ForcingSource for CamelsText {
    fn source_tag(&self) -> &'static str {
        "CAMELS"
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn produce(&self, directory: &Path) -> ForcingResult<Vec<ForcingPart>> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(ForcingError::Configuration(format!(
                "alpha must be a positive number, got {}",
                self.alpha
            )));
        }
        let path = resolve_path(directory, &self.path);
        let mut dataset = self.build(read_station_file(&path)?)?;
        dataset.push_history(&format!("created from CAMELS file {}", path.display()));
        Ok(vec![ForcingPart::new(
            dataset,
            [VAR_PR.name, VAR_EVSPSBLPOT.name, VAR_TAS.name],
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;
    use std::fs;

    const HEADER: &str =
        "Year Mnth Day Hr dayl(s) prcp(mm/day) srad(W/m2) swe(mm) tmax(C) tmin(C) vp(Pa)";

    fn station_file(dir: &Path, header: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join("01013500_lump_cida_forcing_leap.txt");
        let mut body = format!("40.5\n250\n100000000\n{header}\n");
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn parses_header_scalars_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = station_file(
            dir.path(),
            HEADER,
            &[
                "1980 06 28 12\t52000\t1.5\t150\t0\t20\t5\t860",
                "1980 06 29 12\t52000\t0.0\t160\t0\t22\t6\t870",
            ],
        );
        let record = read_station_file(&path).unwrap();
        assert_eq!(record.latitude, 40.5);
        assert_eq!(record.elevation, 250.0);
        assert_eq!(record.basin_area, 1e8);

        let ds = &record.dataset;
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.values("pr").unwrap().to_vec(), vec![1.5, 0.0]);
        assert_eq!(ds.units("pr"), Some("mm/day"));
        assert_eq!(ds.units("tasmax"), Some("degC"));
        assert_eq!(ds.units("srad"), Some("W/m2"));
        assert!(ds.contains("dayl") && ds.contains("swe") && ds.contains("vp"));
        assert!(!ds.contains("prcp"));
    }

    #[test]
    fn accepts_space_separated_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = station_file(dir.path(), HEADER, &["1980 06 28 12 52000 1.5 150 0 20 5 860"]);
        let record = read_station_file(&path).unwrap();
        assert_eq!(record.dataset.values("tasmin").unwrap()[0], 5.0);
    }

    #[test]
    fn extra_header_column_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let header = format!("{HEADER} extra(x)");
        let path = station_file(dir.path(), &header, &[]);
        let err = read_station_file(&path).unwrap_err();
        assert!(matches!(err, ForcingError::Format { line: 4, .. }));
    }

    #[test]
    fn wrong_header_prefix_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let header = HEADER.replace("Mnth", "Month");
        let path = station_file(dir.path(), &header, &[]);
        assert!(matches!(
            read_station_file(&path),
            Err(ForcingError::Format { line: 4, .. })
        ));
    }

    #[test]
    fn short_row_reports_its_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = station_file(
            dir.path(),
            HEADER,
            &["1980 06 28 12\t52000\t1.5\t150\t0\t20\t5\t860", "1980 06 29 12\t52000\t0.0"],
        );
        assert!(matches!(
            read_station_file(&path),
            Err(ForcingError::Format { line: 6, .. })
        ));
    }

    #[test]
    fn truncated_file_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.txt");
        fs::write(&path, "40.5\n250\n").unwrap();
        assert!(matches!(
            read_station_file(&path),
            Err(ForcingError::Format { line: 3, .. })
        ));
    }

    #[test]
    fn builds_pet_and_mean_temperature() {
        let dir = tempfile::tempdir().unwrap();
        station_file(dir.path(), HEADER, &["1980 06 28 12\t52000\t1.5\t150\t0\t20\t5\t860"]);
        let source = CamelsText::new("01013500_lump_cida_forcing_leap.txt");
        let parts = source.produce(dir.path()).unwrap();
        let ds = &parts[0].dataset;

        assert_eq!(ds.values("tas").unwrap()[0], 12.5);
        let pet = ds.values("evspsblpot").unwrap()[0];
        assert!(pet.is_finite() && pet > 0.0 && pet < 10.0, "got {pet}");
        assert_eq!(ds.attribute("basin_area").and_then(|a| a.as_number()), Some(1e8));
        assert_eq!(
            ds.attribute("title").and_then(|a| a.as_text()),
            Some(DATASET_TITLE)
        );
    }

    #[test]
    fn alpha_scales_pet() {
        let dir = tempfile::tempdir().unwrap();
        station_file(dir.path(), HEADER, &["1980 06 28 12\t52000\t1.5\t150\t0\t20\t5\t860"]);
        let name = "01013500_lump_cida_forcing_leap.txt";
        let pet_for = |alpha: f64| {
            let parts = CamelsText::new(name)
                .with_alpha(alpha)
                .produce(dir.path())
                .unwrap();
            parts[0].dataset.values("evspsblpot").unwrap()[0]
        };
        assert!(is_close!(pet_for(1.0) * 1.26, pet_for(1.26)));
    }

    #[test]
    fn non_positive_alpha_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = CamelsText::new("x.txt")
            .with_alpha(0.0)
            .produce(dir.path())
            .unwrap_err();
        assert!(matches!(err, ForcingError::Configuration(_)));
    }

    #[test]
    fn alpha_defaults_when_deserialized() {
        let source: CamelsText = toml::from_str(r#"path = "basin.txt""#).unwrap();
        assert_eq!(source.alpha, DEFAULT_ALPHA);
    }
}
