//! Unit normalization for forcing variables.
//!
//! Source datasets (reanalysis products in particular) report precipitation
//! and evaporation as a mass flux in `kg m-2 s-1` and temperature in Kelvin.
//! HBV expects depths in `mm/day` and temperatures in `degC`.
//!
//! | From | To | Transform |
//! |------|----|-----------|
//! | `kg m-2 s-1` | `mm/day` | `x * 86400` |
//! | `K` | `degC` | `x - 273.15` |
//!
//! Any other label passes through unchanged. The unit label is the only
//! guard against double conversion, so it is always rewritten together
//! with the values.

use crate::errors::{ForcingError, ForcingResult};
use crate::storage::{read_dataset, write_dataset};
use crate::variables::{UNIT_CELSIUS, UNIT_MM_PER_DAY};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Suffix added to the stem of a normalized artifact.
pub const CONVERTED_SUFFIX: &str = "_converted";

/// A deterministic affine conversion to a canonical unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionRule {
    /// Unit label after conversion
    pub target: &'static str,
    pub scale: f64,
    pub offset: f64,
}

impl ConversionRule {
    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

/// Mass flux of water to depth per day (1 kg m-2 == 1 mm).
pub const MASS_FLUX_TO_MM_PER_DAY: ConversionRule = ConversionRule {
    target: UNIT_MM_PER_DAY,
    scale: 86400.0,
    offset: 0.0,
};

pub const KELVIN_TO_CELSIUS: ConversionRule = ConversionRule {
    target: UNIT_CELSIUS,
    scale: 1.0,
    offset: -273.15,
};

/// Spellings of `kg m-2 s-1`, after [`compact_unit`].
const MASS_FLUX_SPELLINGS: [&str; 4] = ["kgm-2s-1", "kg/m2/s", "kg/m2s", "kg/(m2s)"];

const KELVIN_SPELLINGS: [&str; 3] = ["k", "kelvin", "degk"];

/// A conversion applied to one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    pub variable: String,
    pub from: String,
    pub to: String,
}

/// Removes separators and exponent markers so that `kg m^-2 s^-1`,
/// `kg m**-2 s**-1` and `kg·m⁻²·s⁻¹` compare equal.
fn compact_unit(label: &str) -> String {
    label
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => None,
            '*' | '^' | '·' | '.' | '_' => None,
            '⁻' => Some('-'),
            '¹' => Some('1'),
            '²' => Some('2'),
            '³' => Some('3'),
            c => Some(c.to_ascii_lowercase()),
        })
        .collect()
}

/// Conversion that brings `label` to a canonical unit, if one is needed.
pub fn rule_for(label: &str) -> Option<&'static ConversionRule> {
    let compact = compact_unit(label);
    if MASS_FLUX_SPELLINGS.contains(&compact.as_str()) {
        Some(&MASS_FLUX_TO_MM_PER_DAY)
    } else if KELVIN_SPELLINGS.contains(&compact.as_str()) {
        Some(&KELVIN_TO_CELSIUS)
    } else {
        None
    }
}

/// Name of the normalized copy of `name`: `forcing.json` -> `forcing_converted.json`.
pub fn converted_name(name: &str) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    match path.extension() {
        Some(ext) => format!("{stem}{CONVERTED_SUFFIX}.{}", ext.to_string_lossy()),
        None => format!("{stem}{CONVERTED_SUFFIX}"),
    }
}

/// Normalizes the units of a persisted artifact.
///
/// Reads `directory/name` and, if any required variable is not in canonical
/// units, writes the converted dataset to a `_converted` sibling and returns
/// its name. The source artifact is never modified. If nothing needs
/// converting the original name is returned, so running this on its own
/// output is a no-op. An existing `_converted` sibling is reused only when
/// it holds the converted variables in canonical units.
pub fn normalize_artifact(directory: &Path, name: &str) -> ForcingResult<String> {
    let mut dataset = read_dataset(&directory.join(name))?;
    let applied = dataset.normalize_units();
    if applied.is_empty() {
        return Ok(name.to_string());
    }

    let target_name = converted_name(name);
    let target = directory.join(&target_name);
    if target.exists() {
        let mut existing = read_dataset(&target)?;
        let complete = applied.iter().all(|c| existing.contains(&c.variable));
        if !complete || !existing.normalize_units().is_empty() {
            return Err(ForcingError::Dataset(format!(
                "{} exists but is not a canonical copy of {name}",
                target.display()
            )));
        }
        info!("Reusing existing normalized artifact {}", target.display());
        return Ok(target_name);
    }

    let summary = applied
        .iter()
        .map(|c| format!("{} {} -> {}", c.variable, c.from, c.to))
        .collect::<Vec<_>>()
        .join(", ");
    dataset.push_history(&format!("units normalized ({summary})"));
    write_dataset(&target, &dataset)?;
    info!("Wrote normalized artifact {}", target.display());
    Ok(target_name)
}
