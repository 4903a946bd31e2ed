//! Canonical forcing dataset
//!
//! A [`ForcingDataset`] is a daily, time-indexed table of named variables.
//! Each variable carries its `units` label and the dataset carries global
//! attributes (title, history, station constants). All ingestion paths
//! produce one, it is cropped to the requested window and then persisted.

use crate::errors::{ForcingError, ForcingResult};
use crate::units::{rule_for, UnitConversion};
use crate::variables::REQUIRED_VARIABLES;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use log::{debug, info};
use ndarray::{Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the canonical time dimension.
pub const TIME_DIMENSION: &str = "time";

/// Title attribute written on every assembled dataset.
pub const DATASET_TITLE: &str = "HBV forcing data";

/// Value of a global dataset attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            AttributeValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Number(_) => None,
            AttributeValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Number(v) => write!(f, "{v}"),
            AttributeValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// A single variable along the time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataVariable {
    pub units: String,
    #[serde(with = "non_finite_as_null")]
    pub values: Array1<f64>,
}

impl DataVariable {
    pub fn new(units: impl Into<String>, values: Array1<f64>) -> Self {
        Self {
            units: units.into(),
            values,
        }
    }
}

/// Daily forcing table.
///
/// Invariants, checked on construction and by [`ForcingDataset::validate`]:
/// - time stamps are strictly ascending with at most one per calendar day
/// - every variable has exactly one value per time stamp
///
/// Missing days are allowed and are not filled in, so row `i` is not
/// necessarily `start + i` days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcingDataset {
    #[serde(default)]
    attributes: BTreeMap<String, AttributeValue>,
    dimension: String,
    time: Vec<DateTime<Utc>>,
    #[serde(default)]
    variables: BTreeMap<String, DataVariable>,
}

impl ForcingDataset {
    /// Empty dataset over `time` along the canonical `time` dimension.
    pub fn new(time: Vec<DateTime<Utc>>) -> ForcingResult<Self> {
        Self::with_dimension(TIME_DIMENSION, time)
    }

    /// Empty dataset whose time axis is named `dimension`.
    ///
    /// External datasets may use a different name (e.g. `date`) until they
    /// are renamed to the canonical form.
    pub fn with_dimension(
        dimension: impl Into<String>,
        time: Vec<DateTime<Utc>>,
    ) -> ForcingResult<Self> {
        validate_time_axis(&time)?;
        Ok(Self {
            attributes: BTreeMap::new(),
            dimension: dimension.into(),
            time,
            variables: BTreeMap::new(),
        })
    }

    /// Dataset stamped at midnight UTC of each date.
    pub fn from_dates(dates: &[NaiveDate]) -> ForcingResult<Self> {
        let time = dates
            .iter()
            .map(|d| d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ForcingError::Dataset("date out of range".to_string()))?;
        Self::new(time)
    }

    /// Checks the dataset invariants.
    ///
    /// Deserialized datasets are not checked automatically.
    pub fn validate(&self) -> ForcingResult<()> {
        validate_time_axis(&self.time)?;
        for (name, variable) in &self.variables {
            if variable.values.len() != self.time.len() {
                return Err(ForcingError::Dataset(format!(
                    "variable {name} has {} values for {} time steps",
                    variable.values.len(),
                    self.time.len()
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    pub fn time(&self) -> &[DateTime<Utc>] {
        &self.time
    }

    /// Ordinal day of each time stamp (1 to 366).
    pub fn day_of_year(&self) -> Array1<f64> {
        self.time.iter().map(|t| t.ordinal() as f64).collect()
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Appends an entry to the `history` attribute.
    pub fn push_history(&mut self, entry: &str) {
        let history = match self.attributes.get("history").and_then(|h| h.as_text()) {
            Some(existing) if !existing.is_empty() => format!("{existing}; {entry}"),
            _ => entry.to_string(),
        };
        self.set_attribute("history", history);
    }

    pub fn variables(&self) -> &BTreeMap<String, DataVariable> {
        &self.variables
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    pub fn variable(&self, name: &str) -> Option<&DataVariable> {
        self.variables.get(name)
    }

    pub fn values(&self, name: &str) -> Option<ArrayView1<f64>> {
        self.variables.get(name).map(|v| v.values.view())
    }

    pub fn units(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(|v| v.units.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Adds or replaces a variable.
    pub fn insert_variable(
        &mut self,
        name: impl Into<String>,
        units: impl Into<String>,
        values: Array1<f64>,
    ) -> ForcingResult<()> {
        let name = name.into();
        if values.len() != self.time.len() {
            return Err(ForcingError::Dataset(format!(
                "variable {name} has {} values for {} time steps",
                values.len(),
                self.time.len()
            )));
        }
        self.variables
            .insert(name, DataVariable::new(units, values));
        Ok(())
    }

    /// Adds a variable holding the same value at every time step.
    pub fn insert_constant(
        &mut self,
        name: impl Into<String>,
        units: impl Into<String>,
        value: f64,
    ) -> ForcingResult<()> {
        let values = Array1::from_elem(self.time.len(), value);
        self.insert_variable(name, units, values)
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<DataVariable> {
        self.variables.remove(name)
    }

    /// Renames a variable, replacing any variable already called `to`.
    ///
    /// Returns `false` if `from` does not exist.
    pub fn rename_variable(&mut self, from: &str, to: &str) -> bool {
        match self.variables.remove(from) {
            Some(variable) => {
                self.variables.insert(to.to_string(), variable);
                true
            }
            None => false,
        }
    }

    /// Renames the time dimension. Returns `false` if it is not called `from`.
    pub fn rename_dimension(&mut self, from: &str, to: &str) -> bool {
        if self.dimension == from {
            self.dimension = to.to_string();
            true
        } else {
            false
        }
    }

    /// Stores the element-wise mean of two variables as `target`.
    ///
    /// `target` takes the units of `a`.
    pub fn insert_mean(&mut self, target: &str, a: &str, b: &str) -> ForcingResult<()> {
        let (first, second) = match (self.variables.get(a), self.variables.get(b)) {
            (Some(first), Some(second)) => (first, second),
            _ => {
                return Err(ForcingError::MissingVariables {
                    variables: [a, b]
                        .iter()
                        .filter(|n| !self.contains(n))
                        .map(|n| n.to_string())
                        .collect(),
                    context: format!("mean of {a} and {b}"),
                })
            }
        };
        let mean = (&first.values + &second.values) / 2.0;
        let units = first.units.clone();
        self.insert_variable(target, units, mean)
    }

    /// Names from `names` that are not present.
    pub fn missing<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        names
            .into_iter()
            .filter(|name| !self.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Fails with [`ForcingError::MissingVariables`] unless all `names` are present.
    pub fn require<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        context: &str,
    ) -> ForcingResult<()> {
        let missing = self.missing(names);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ForcingError::MissingVariables {
                variables: missing,
                context: context.to_string(),
            })
        }
    }

    /// Rows with `start <= time <= end`.
    ///
    /// Both bounds are inclusive. Cropping twice to the same window is a no-op.
    pub fn crop(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ForcingDataset {
        let indices: Vec<usize> = self
            .time
            .iter()
            .enumerate()
            .filter(|(_, t)| **t >= start && **t <= end)
            .map(|(i, _)| i)
            .collect();

        debug!(
            "Cropped {} of {} rows to [{start}, {end}]",
            indices.len(),
            self.time.len()
        );

        let variables = self
            .variables
            .iter()
            .map(|(name, variable)| {
                (
                    name.clone(),
                    DataVariable::new(
                        variable.units.clone(),
                        variable.values.select(Axis(0), &indices),
                    ),
                )
            })
            .collect();

        ForcingDataset {
            attributes: self.attributes.clone(),
            dimension: self.dimension.clone(),
            time: indices.iter().map(|&i| self.time[i]).collect(),
            variables,
        }
    }

    /// Converts the required forcing variables to canonical units.
    ///
    /// Variables are converted based on their `units` label, which is
    /// rewritten on conversion, so calling this again changes nothing.
    /// Returns the conversions that were applied.
    pub fn normalize_units(&mut self) -> Vec<UnitConversion> {
        let mut applied = Vec::new();
        for definition in REQUIRED_VARIABLES.iter() {
            let Some(variable) = self.variables.get_mut(definition.name) else {
                continue;
            };
            let Some(rule) = rule_for(&variable.units) else {
                continue;
            };
            variable.values.mapv_inplace(|v| rule.apply(v));
            let conversion = UnitConversion {
                variable: definition.name.to_string(),
                from: std::mem::replace(&mut variable.units, rule.target.to_string()),
                to: rule.target.to_string(),
            };
            info!(
                "Converted {} from {} to {}",
                conversion.variable, conversion.from, conversion.to
            );
            applied.push(conversion);
        }
        applied
    }
}

/// Rejects repeated or descending days. Gaps are accepted.
fn validate_time_axis(time: &[DateTime<Utc>]) -> ForcingResult<()> {
    for pair in time.windows(2) {
        if pair[1].date_naive() <= pair[0].date_naive() {
            return Err(ForcingError::Dataset(format!(
                "time axis must hold one ascending entry per day, found {} after {}",
                pair[1], pair[0]
            )));
        }
    }
    Ok(())
}

/// JSON has no NaN, so non-finite values are stored as `null`.
mod non_finite_as_null {
    use ndarray::Array1;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &Array1<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| v.is_finite().then_some(*v)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array1<f64>, D::Error> {
        let raw: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}
