//! Forcing sources
//!
//! A [`ForcingSource`] turns some raw input (a text file, an external
//! dataset) into one or more canonical [`ForcingDataset`]s. Sources are
//! trait objects serialized with `typetag`, so a request can be stored and
//! reloaded without knowing the concrete source type:
//!
//! ```toml
//! [source]
//! type = "CamelsText"
//! path = "01013500_lump_cida_forcing_leap.txt"
//! alpha = 1.26
//! ```

use crate::dataset::ForcingDataset;
use crate::errors::ForcingResult;
use std::fmt::Debug;
use std::path::Path;

/// One dataset produced by a source and the forcing variables it supplies.
///
/// A dataset may carry more variables than it `provides` (e.g. observed
/// discharge or raw radiation); only the provided ones are mapped to the
/// resulting artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingPart {
    pub dataset: ForcingDataset,
    pub provides: Vec<String>,
}

impl ForcingPart {
    pub fn new(dataset: ForcingDataset, provides: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            dataset,
            provides: provides.into_iter().map(Into::into).collect(),
        }
    }
}

/// A way of obtaining forcing data.
#[typetag::serde(tag = "type")]
pub trait ForcingSource: Debug + Send + Sync {
    /// Short tag used in artifact names (e.g. `CAMELS`).
    fn source_tag(&self) -> &'static str;

    /// Whether the source is fully supported.
    ///
    /// Unsupported sources still run but the assembler logs a warning.
    fn is_supported(&self) -> bool {
        false
    }

    /// Reads the raw input and builds canonical datasets.
    ///
    /// Relative paths are resolved against `directory`. Every part must
    /// already hold the variables it `provides` in canonical units.
    fn produce(&self, directory: &Path) -> ForcingResult<Vec<ForcingPart>>;
}

/// Resolves `path` against `directory` unless it is absolute.
pub fn resolve_path(directory: &Path, path: &Path) -> std::path::PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        directory.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_directory() {
        let dir = Path::new("/data/forcing");
        assert_eq!(
            resolve_path(dir, Path::new("basin.txt")),
            Path::new("/data/forcing/basin.txt")
        );
        assert_eq!(
            resolve_path(dir, Path::new("/elsewhere/basin.txt")),
            Path::new("/elsewhere/basin.txt")
        );
    }

    #[test]
    fn part_records_provided_variables() {
        let ds = ForcingDataset::new(vec![]).unwrap();
        let part = ForcingPart::new(ds, ["pr", "tas"]);
        assert_eq!(part.provides, vec!["pr".to_string(), "tas".to_string()]);
    }
}
