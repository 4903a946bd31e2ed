//! Standard variable definitions for HBV forcing.
//!
//! Variable names follow the CMIP short-name convention used by the HBV
//! model wrapper:
//! - `pr` - precipitation
//! - `evspsblpot` - potential evapotranspiration
//! - `tas` - mean near-surface air temperature
//!
//! The canonical dataset must carry [`REQUIRED_VARIABLES`]; the remaining
//! definitions describe auxiliary columns some sources keep alongside them.
//!
//! ```rust
//! use hbv_forcing_core::variables::{find_variable, VAR_PR};
//!
//! assert_eq!(VAR_PR.name, "pr");
//! assert_eq!(find_variable("tas").unwrap().unit, "degC");
//! ```

/// Definition of a forcing variable with its canonical unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticVariableDefinition {
    /// Short name used as the variable key in datasets
    pub name: &'static str,
    /// Canonical unit after normalization
    pub unit: &'static str,
    pub description: &'static str,
}

impl StaticVariableDefinition {
    pub const fn new(name: &'static str, unit: &'static str, description: &'static str) -> Self {
        Self {
            name,
            unit,
            description,
        }
    }
}

/// Defines a static variable definition and makes it available to [`find_variable`].
macro_rules! define_static_variable {
    (
        $var_name:ident,
        name = $name:expr,
        unit = $unit:expr,
        description = $desc:expr $(,)?
    ) => {
        #[doc = concat!("Static variable definition for `", $name, "`")]
        pub static $var_name: StaticVariableDefinition =
            StaticVariableDefinition::new($name, $unit, $desc);
    };
}

/// Canonical label for water-depth fluxes.
pub const UNIT_MM_PER_DAY: &str = "mm/day";

/// Canonical label for temperatures.
pub const UNIT_CELSIUS: &str = "degC";

define_static_variable!(
    VAR_PR,
    name = "pr",
    unit = UNIT_MM_PER_DAY,
    description = "Precipitation",
);

define_static_variable!(
    VAR_EVSPSBLPOT,
    name = "evspsblpot",
    unit = UNIT_MM_PER_DAY,
    description = "Potential evapotranspiration",
);

define_static_variable!(
    VAR_TAS,
    name = "tas",
    unit = UNIT_CELSIUS,
    description = "Daily mean near-surface air temperature",
);

define_static_variable!(
    VAR_TASMIN,
    name = "tasmin",
    unit = UNIT_CELSIUS,
    description = "Daily minimum near-surface air temperature",
);

define_static_variable!(
    VAR_TASMAX,
    name = "tasmax",
    unit = UNIT_CELSIUS,
    description = "Daily maximum near-surface air temperature",
);

define_static_variable!(
    VAR_DISCHARGE,
    name = "Q",
    unit = UNIT_MM_PER_DAY,
    description = "Observed discharge expressed as a depth over the catchment",
);

/// Variables every canonical forcing dataset must expose.
pub static REQUIRED_VARIABLES: [&StaticVariableDefinition; 3] = [&VAR_PR, &VAR_EVSPSBLPOT, &VAR_TAS];

static ALL_VARIABLES: [&StaticVariableDefinition; 6] = [
    &VAR_PR,
    &VAR_EVSPSBLPOT,
    &VAR_TAS,
    &VAR_TASMIN,
    &VAR_TASMAX,
    &VAR_DISCHARGE,
];

/// Names of [`REQUIRED_VARIABLES`], in canonical order.
pub fn required_variable_names() -> Vec<&'static str> {
    REQUIRED_VARIABLES.iter().map(|v| v.name).collect()
}

/// Looks up a standard variable by short name.
pub fn find_variable(name: &str) -> Option<&'static StaticVariableDefinition> {
    ALL_VARIABLES.iter().copied().find(|v| v.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_variables_are_canonical() {
        assert_eq!(required_variable_names(), vec!["pr", "evspsblpot", "tas"]);
    }

    #[test]
    fn lookup_unknown_variable() {
        assert!(find_variable("srad").is_none());
        assert_eq!(find_variable("Q").unwrap().unit, UNIT_MM_PER_DAY);
    }
}
