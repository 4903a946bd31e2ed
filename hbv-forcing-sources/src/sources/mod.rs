mod camels;
mod external;
mod test_text;

pub use camels::{read_station_file, CamelsText, StationRecord, CAMELS_HEADER_PREFIX};
pub use external::{apply_alternate_naming, ExternalDataset, ALTERNATE_DIMENSION, ALTERNATE_NAMES};
pub use test_text::{TestText, PLACEHOLDER_TEMPERATURE};

use hbv_forcing_core::errors::{ForcingError, ForcingResult};
use std::fs;
use std::path::Path;

/// Lines of a text file, numbered from 1.
fn numbered_lines(path: &Path) -> ForcingResult<Vec<(usize, String)>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.to_string()))
        .collect())
}

fn parse_number(path: &Path, line: usize, token: &str, what: &str) -> ForcingResult<f64> {
    token.trim().parse::<f64>().map_err(|_| {
        ForcingError::format(path, line, format!("cannot read {what} from `{}`", token.trim()))
    })
}

/// Parses a calendar field that may be written as a float (`1990.0`).
fn parse_integer(path: &Path, line: usize, token: &str, what: &str) -> ForcingResult<i64> {
    let value = parse_number(path, line, token, what)?;
    if value.fract() != 0.0 || !value.is_finite() {
        return Err(ForcingError::format(
            path,
            line,
            format!("{what} must be a whole number, got `{}`", token.trim()),
        ));
    }
    Ok(value as i64)
}

fn parse_date(
    path: &Path,
    line: usize,
    year: &str,
    month: &str,
    day: &str,
) -> ForcingResult<chrono::NaiveDate> {
    let y = parse_integer(path, line, year, "year")?;
    let m = parse_integer(path, line, month, "month")?;
    let d = parse_integer(path, line, day, "day")?;
    i32::try_from(y)
        .ok()
        .zip(u32::try_from(m).ok())
        .zip(u32::try_from(d).ok())
        .and_then(|((y, m), d)| chrono::NaiveDate::from_ymd_opt(y, m, d))
        .ok_or_else(|| ForcingError::format(path, line, format!("invalid date {y}-{m}-{d}")))
}
