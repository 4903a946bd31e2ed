//! Artifact naming strategies.
//!
//! Every persisted dataset gets a fresh file name. The default
//! [`TimestampNamer`] combines the source tag, the wall-clock minute and a
//! random suffix so that assemblies started in the same minute against the
//! same directory do not collide. [`SequentialNamer`] is deterministic and
//! intended for tests.

use crate::errors::{ForcingError, ForcingResult};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Prefix shared by all generated artifact names.
pub const ARTIFACT_PREFIX: &str = "HBV_forcing";

const SUFFIX_LENGTH: usize = 6;

/// On-disk format of a persisted dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArtifactFormat {
    /// Self-describing JSON document
    #[default]
    Json,
    /// NetCDF file with CF time encoding (requires the `netcdf` feature)
    NetCdf,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Json => "json",
            ArtifactFormat::NetCdf => "nc",
        }
    }

    /// Format implied by a file's extension.
    pub fn from_path(path: &Path) -> ForcingResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(ArtifactFormat::Json),
            Some("nc") | Some("nc4") => Ok(ArtifactFormat::NetCdf),
            _ => Err(ForcingError::Configuration(format!(
                "cannot infer dataset format of {}, expected a .json or .nc file",
                path.display()
            ))),
        }
    }
}

/// Generates names for persisted artifacts.
pub trait ArtifactNamer: Send + Sync {
    /// A file name (no directory) for a dataset produced by `source_tag`.
    fn artifact_name(&self, source_tag: &str, format: ArtifactFormat) -> String;
}

/// `HBV_forcing_<tag>_<YYYY-MM-DDTHH_MM>_<suffix>.<ext>`
#[derive(Debug, Clone, Default)]
pub struct TimestampNamer;

impl ArtifactNamer for TimestampNamer {
    fn artifact_name(&self, source_tag: &str, format: ArtifactFormat) -> String {
        let minute = Utc::now().format("%Y-%m-%dT%H_%M");
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LENGTH)
            .map(char::from)
            .collect();
        format!(
            "{ARTIFACT_PREFIX}_{source_tag}_{minute}_{suffix}.{}",
            format.extension()
        )
    }
}

/// `HBV_forcing_<tag>_<n>.<ext>` with `n` counting up from zero.
#[derive(Debug, Default)]
pub struct SequentialNamer {
    counter: AtomicUsize,
}

impl SequentialNamer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactNamer for SequentialNamer {
    fn artifact_name(&self, source_tag: &str, format: ArtifactFormat) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{ARTIFACT_PREFIX}_{source_tag}_{n}.{}", format.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn timestamp_names_have_expected_shape() {
        let name = TimestampNamer.artifact_name("CAMELS", ArtifactFormat::Json);
        assert!(name.starts_with("HBV_forcing_CAMELS_"));
        assert!(name.ends_with(".json"));
        assert!(!name.contains(':'));

        let stem = name.trim_end_matches(".json");
        let suffix = stem.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), SUFFIX_LENGTH);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn timestamp_names_differ_within_a_minute() {
        let names: HashSet<String> = (0..50)
            .map(|_| TimestampNamer.artifact_name("test", ArtifactFormat::NetCdf))
            .collect();
        assert_eq!(names.len(), 50);
    }

    #[test]
    fn sequential_names_count_up() {
        let namer = SequentialNamer::new();
        assert_eq!(
            namer.artifact_name("test", ArtifactFormat::Json),
            "HBV_forcing_test_0.json"
        );
        assert_eq!(
            namer.artifact_name("external", ArtifactFormat::NetCdf),
            "HBV_forcing_external_1.nc"
        );
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            ArtifactFormat::from_path(Path::new("a/b.nc")).unwrap(),
            ArtifactFormat::NetCdf
        );
        assert_eq!(
            ArtifactFormat::from_path(Path::new("b.json")).unwrap(),
            ArtifactFormat::Json
        );
        assert!(ArtifactFormat::from_path(Path::new("b.csv")).is_err());
    }
}
