//! Flat forcing configuration
//!
//! The user facing form of a forcing request: a single TOML table where the
//! source is chosen by which keys are present.
//!
//! ```toml
//! directory = "/data/forcing"
//! start_time = "1997-08-01T00:00:00Z"
//! end_time = "2000-08-31T00:00:00Z"
//! camels_file = "01620500_lump_cida_forcing_leap.txt"
//! alpha = 1.20
//! ```
//!
//! Exactly one of `test_file`, `camels_file` or the external paths
//! (`pr`, `evspsblpot`, `tas`) must be given. A single external path is
//! read as a combined dataset.

use crate::sources::{CamelsText, ExternalDataset, TestText};
use hbv_forcing_core::assembler::{parse_timestamp, ForcingRequest};
use hbv_forcing_core::errors::{ForcingError, ForcingResult};
use hbv_forcing_core::pet::DEFAULT_ALPHA;
use hbv_forcing_core::source::ForcingSource;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForcingConfig {
    pub directory: Option<PathBuf>,
    /// ISO-8601, UTC
    pub start_time: Option<String>,
    /// ISO-8601, UTC
    pub end_time: Option<String>,
    pub test_file: Option<PathBuf>,
    pub camels_file: Option<PathBuf>,
    pub pr: Option<PathBuf>,
    pub evspsblpot: Option<PathBuf>,
    pub tas: Option<PathBuf>,
    /// Priestley-Taylor coefficient, CAMELS only
    pub alpha: Option<f64>,
}

impl ForcingConfig {
    pub fn from_toml_str(text: &str) -> ForcingResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> ForcingResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Names of the source descriptors that are set.
    fn descriptors(&self) -> Vec<&'static str> {
        let mut active = Vec::new();
        if self.test_file.is_some() {
            active.push("test_file");
        }
        if self.camels_file.is_some() {
            active.push("camels_file");
        }
        if self.pr.is_some() || self.evspsblpot.is_some() || self.tas.is_some() {
            active.push("external (pr/evspsblpot/tas)");
        }
        active
    }

    fn external_source(&self) -> ForcingResult<ExternalDataset> {
        match (&self.pr, &self.evspsblpot, &self.tas) {
            (Some(pr), Some(evspsblpot), Some(tas)) => {
                Ok(ExternalDataset::new(pr, evspsblpot, tas))
            }
            (Some(path), None, None) | (None, Some(path), None) | (None, None, Some(path)) => {
                Ok(ExternalDataset::combined(path))
            }
            _ => Err(ForcingError::Configuration(
                "external forcing needs either one combined file or all of pr, evspsblpot and tas"
                    .to_string(),
            )),
        }
    }

    /// The single configured source.
    pub fn source(&self) -> ForcingResult<Box<dyn ForcingSource>> {
        let descriptors = self.descriptors();
        match descriptors.as_slice() {
            [] => {
                return Err(ForcingError::Configuration(
                    "no forcing source given, set test_file, camels_file or pr/evspsblpot/tas"
                        .to_string(),
                ))
            }
            [_] => {}
            several => {
                return Err(ForcingError::Configuration(format!(
                    "only one forcing source may be given, found {}",
                    several.join(", ")
                )))
            }
        }

        if self.alpha.is_some() && self.camels_file.is_none() {
            warn!("alpha is only used for CAMELS forcing and will be ignored");
        }

        if let Some(path) = &self.test_file {
            Ok(Box::new(TestText::new(path)))
        } else if let Some(path) = &self.camels_file {
            let alpha = self.alpha.unwrap_or(DEFAULT_ALPHA);
            if !(alpha.is_finite() && alpha > 0.0) {
                return Err(ForcingError::Configuration(format!(
                    "alpha must be a positive number, got {alpha}"
                )));
            }
            Ok(Box::new(CamelsText::new(path).with_alpha(alpha)))
        } else {
            Ok(Box::new(self.external_source()?))
        }
    }

    /// Validates the configuration and builds the request it describes.
    pub fn into_request(self) -> ForcingResult<ForcingRequest> {
        let directory = self
            .directory
            .clone()
            .ok_or_else(|| ForcingError::Configuration("no forcing directory given".to_string()))?;
        let start_time = self
            .start_time
            .as_deref()
            .ok_or_else(|| ForcingError::Configuration("no start_time given".to_string()))
            .and_then(parse_timestamp)?;
        let end_time = self
            .end_time
            .as_deref()
            .ok_or_else(|| ForcingError::Configuration("no end_time given".to_string()))
            .and_then(parse_timestamp)?;
        ForcingRequest::new(directory, start_time, end_time, self.source()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        directory = "/data/forcing"
        start_time = "1997-08-01T00:00:00Z"
        end_time = "2000-08-31T00:00:00Z"
    "#;

    fn config(extra: &str) -> ForcingConfig {
        ForcingConfig::from_toml_str(&format!("{BASE}\n{extra}")).unwrap()
    }

    #[test]
    fn camels_request() {
        let request = config("camels_file = \"basin.txt\"\nalpha = 1.2")
            .into_request()
            .unwrap();
        assert_eq!(request.source().source_tag(), "CAMELS");
        assert_eq!(request.directory(), Path::new("/data/forcing"));
    }

    #[test]
    fn single_external_path_is_combined() {
        let source = config("pr = \"caravan.nc\"").source().unwrap();
        assert_eq!(source.source_tag(), "external");
    }

    #[test]
    fn two_external_paths_are_ambiguous() {
        let err = config("pr = \"a.nc\"\nevspsblpot = \"b.nc\"")
            .source()
            .unwrap_err();
        assert!(matches!(err, ForcingError::Configuration(_)));
    }

    #[test]
    fn several_sources_are_rejected() {
        let err = config("test_file = \"t.txt\"\ncamels_file = \"c.txt\"")
            .into_request()
            .unwrap_err();
        match err {
            ForcingError::Configuration(message) => {
                assert!(message.contains("test_file") && message.contains("camels_file"))
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn no_source_is_rejected() {
        assert!(matches!(
            config("").into_request(),
            Err(ForcingError::Configuration(_))
        ));
    }

    #[test]
    fn missing_directory_is_rejected() {
        let cfg = ForcingConfig {
            directory: None,
            ..config("test_file = \"t.txt\"")
        };
        assert!(matches!(
            cfg.into_request(),
            Err(ForcingError::Configuration(_))
        ));
    }

    #[test]
    fn reversed_window_is_rejected() {
        let cfg = ForcingConfig {
            start_time: Some("2001-01-01".to_string()),
            ..config("test_file = \"t.txt\"")
        };
        assert!(matches!(
            cfg.into_request(),
            Err(ForcingError::Configuration(_))
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = ForcingConfig::from_toml_str(&format!("{BASE}\ncamel_file = \"typo.txt\""));
        assert!(matches!(result, Err(ForcingError::Toml(_))));
    }

    #[test]
    fn non_positive_alpha_is_rejected() {
        let err = config("camels_file = \"c.txt\"\nalpha = -1.0")
            .source()
            .unwrap_err();
        assert!(matches!(err, ForcingError::Configuration(_)));
    }
}
