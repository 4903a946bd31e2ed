//! Forcing assembly
//!
//! [`ForcingAssembler::assemble`] takes a [`ForcingRequest`], asks its
//! source for canonical datasets, crops each to the requested window and
//! persists it under a freshly generated name. The caller gets back an
//! [`AssembledForcing`] record mapping each required variable to the
//! artifact that holds it.

use crate::dataset::DATASET_TITLE;
use crate::errors::{ForcingError, ForcingResult};
use crate::naming::{ArtifactFormat, ArtifactNamer, TimestampNamer};
use crate::source::ForcingSource;
use crate::storage::persist;
use crate::units::normalize_artifact;
use crate::variables::required_variable_names;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Parses an ISO-8601 timestamp.
///
/// Accepts RFC 3339 (`1997-08-01T00:00:00Z`), a naive date-time which is
/// taken as UTC, or a bare date meaning midnight UTC.
pub fn parse_timestamp(value: &str) -> ForcingResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(t.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| ForcingError::Configuration(format!("invalid timestamp `{value}`")))
}

mod timestamp {
    use super::parse_timestamp;
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

/// What forcing to build, where, and over which window.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForcingRequest {
    directory: PathBuf,
    #[serde(with = "timestamp")]
    start_time: DateTime<Utc>,
    #[serde(with = "timestamp")]
    end_time: DateTime<Utc>,
    source: Box<dyn ForcingSource>,
}

impl ForcingRequest {
    pub fn new(
        directory: impl Into<PathBuf>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        source: Box<dyn ForcingSource>,
    ) -> ForcingResult<Self> {
        let request = Self {
            directory: directory.into(),
            start_time,
            end_time,
            source,
        };
        request.validate()?;
        Ok(request)
    }

    /// Reads a request from TOML with a tagged `[source]` table.
    pub fn from_toml_str(text: &str) -> ForcingResult<Self> {
        let request: ForcingRequest = toml::from_str(text)?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> ForcingResult<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(ForcingError::Configuration(
                "no forcing directory given".to_string(),
            ));
        }
        if self.start_time > self.end_time {
            return Err(ForcingError::Configuration(format!(
                "start time {} is after end time {}",
                self.start_time, self.end_time
            )));
        }
        Ok(())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn source(&self) -> &dyn ForcingSource {
        self.source.as_ref()
    }
}

/// Artifacts produced by one assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledForcing {
    pub directory: PathBuf,
    pub source_tag: String,
    /// Canonical variable name to artifact file name in `directory`
    pub artifacts: BTreeMap<String, String>,
}

impl AssembledForcing {
    /// File name holding `variable`.
    pub fn artifact(&self, variable: &str) -> Option<&str> {
        self.artifacts.get(variable).map(String::as_str)
    }

    /// Full path of the artifact holding `variable`.
    pub fn path(&self, variable: &str) -> Option<PathBuf> {
        self.artifact(variable).map(|name| self.directory.join(name))
    }

    /// Distinct artifact names, in variable order.
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for name in self.artifacts.values() {
            if !files.contains(&name.as_str()) {
                files.push(name);
            }
        }
        files
    }

    /// Brings every artifact to canonical units.
    ///
    /// See [`normalize_artifact`]. Artifacts that are already canonical
    /// keep their name.
    pub fn normalize_units(&self) -> ForcingResult<AssembledForcing> {
        let mut renamed: BTreeMap<&str, String> = BTreeMap::new();
        for name in self.files() {
            renamed.insert(name, normalize_artifact(&self.directory, name)?);
        }
        let artifacts = self
            .artifacts
            .iter()
            .map(|(var, name)| {
                let target = renamed.get(name.as_str()).cloned().unwrap_or_else(|| name.clone());
                (var.clone(), target)
            })
            .collect();
        Ok(AssembledForcing {
            directory: self.directory.clone(),
            source_tag: self.source_tag.clone(),
            artifacts,
        })
    }
}

/// Runs forcing requests against the filesystem.
pub struct ForcingAssembler {
    namer: Box<dyn ArtifactNamer>,
    format: ArtifactFormat,
}

impl Default for ForcingAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ForcingAssembler {
    /// Timestamped names, JSON artifacts.
    pub fn new() -> Self {
        Self {
            namer: Box::new(TimestampNamer),
            format: ArtifactFormat::default(),
        }
    }

    pub fn with_namer(mut self, namer: impl ArtifactNamer + 'static) -> Self {
        self.namer = Box::new(namer);
        self
    }

    pub fn with_format(mut self, format: ArtifactFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Builds, crops and persists the forcing described by `request`.
    pub fn assemble(&self, request: &ForcingRequest) -> ForcingResult<AssembledForcing> {
        request.validate()?;
        let directory = request.directory();
        if !directory.is_dir() {
            return Err(ForcingError::Configuration(format!(
                "forcing directory {} does not exist",
                directory.display()
            )));
        }

        let source = request.source();
        let tag = source.source_tag();
        if !source.is_supported() {
            warn!(
                "Forcing source {tag} is not officially supported, results may need manual checks"
            );
        }

        let (start, end) = (request.start_time(), request.end_time());
        let context = format!("{tag} forcing");
        let mut prepared = Vec::new();
        for part in source.produce(directory)? {
            part.dataset
                .require(part.provides.iter().map(String::as_str), &context)?;

            let mut cropped = part.dataset.crop(start, end);
            if cropped.is_empty() {
                warn!("No {tag} forcing data between {start} and {end}");
            }
            if cropped.attribute("title").is_none() {
                cropped.set_attribute("title", DATASET_TITLE);
            }
            cropped.push_history(&format!("cropped to {start} .. {end}"));
            prepared.push((cropped, part.provides));
        }

        // Nothing is written until every required variable has a source.
        let provided: BTreeSet<&str> = prepared
            .iter()
            .flat_map(|(_, provides)| provides.iter().map(String::as_str))
            .collect();
        let missing: Vec<String> = required_variable_names()
            .into_iter()
            .filter(|name| !provided.contains(name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ForcingError::MissingVariables {
                variables: missing,
                context,
            });
        }

        let mut artifacts = BTreeMap::new();
        let mut written = Vec::new();
        for (dataset, provides) in prepared {
            let name = self.namer.artifact_name(tag, self.format);
            match persist(directory, &name, &dataset) {
                Ok(path) => written.push(path),
                Err(err) => {
                    for path in &written {
                        if let Err(cleanup) = fs::remove_file(path) {
                            warn!("Could not remove partial artifact {}: {cleanup}", path.display());
                        }
                    }
                    return Err(err);
                }
            }
            for variable in provides {
                artifacts.insert(variable, name.clone());
            }
        }

        info!(
            "Assembled {tag} forcing in {} ({} artifact(s))",
            directory.display(),
            artifacts.values().collect::<BTreeSet<_>>().len()
        );
        Ok(AssembledForcing {
            directory: directory.to_path_buf(),
            source_tag: tag.to_string(),
            artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ForcingDataset;
    use crate::naming::SequentialNamer;
    use crate::source::ForcingPart;
    use crate::storage::read_dataset;
    use chrono::TimeZone;
    use ndarray::array;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, d, 0, 0, 0).unwrap()
    }

    /// In-memory source with three days of canonical data.
    #[derive(Debug, Serialize, Deserialize)]
    struct FixedSource {
        tas_units: String,
        #[serde(default)]
        skip_tas: bool,
    }

    impl FixedSource {
        fn canonical() -> Self {
            Self {
                tas_units: "degC".to_string(),
                skip_tas: false,
            }
        }
    }

    #[typetag::serde]
    impl ForcingSource for FixedSource {
        fn source_tag(&self) -> &'static str {
            "fixed"
        }

        fn produce(&self, _directory: &Path) -> ForcingResult<Vec<ForcingPart>> {
            let mut ds = ForcingDataset::new(vec![day(1), day(2), day(3)])?;
            ds.insert_variable("pr", "mm/day", array![1.0, 2.0, 3.0])?;
            ds.insert_variable("evspsblpot", "mm/day", array![0.5, 0.5, 0.5])?;
            let mut provides = vec!["pr", "evspsblpot"];
            if !self.skip_tas {
                ds.insert_variable("tas", self.tas_units.as_str(), array![283.15, 284.15, 285.15])?;
                provides.push("tas");
            }
            Ok(vec![ForcingPart::new(ds, provides)])
        }
    }

    /// Same data as [`FixedSource`], one part per variable.
    #[derive(Debug, Serialize, Deserialize)]
    struct SplitSource;

    #[typetag::serde]
    impl ForcingSource for SplitSource {
        fn source_tag(&self) -> &'static str {
            "fixed"
        }

        fn produce(&self, directory: &Path) -> ForcingResult<Vec<ForcingPart>> {
            let whole = FixedSource::canonical().produce(directory)?.remove(0).dataset;
            ["pr", "evspsblpot", "tas"]
                .into_iter()
                .map(|name| {
                    let mut ds = whole.clone();
                    for other in whole.variable_names() {
                        if other != name {
                            ds.remove_variable(other);
                        }
                    }
                    Ok(ForcingPart::new(ds, [name]))
                })
                .collect()
        }
    }

    fn request(dir: &Path, source: FixedSource) -> ForcingRequest {
        ForcingRequest::new(dir, day(2), day(3), Box::new(source)).unwrap()
    }

    #[test]
    fn rejects_reversed_window() {
        let result = ForcingRequest::new(
            "/tmp",
            day(3),
            day(2),
            Box::new(FixedSource::canonical()),
        );
        assert!(matches!(result, Err(ForcingError::Configuration(_))));
    }

    #[test]
    fn rejects_missing_directory() {
        let req = request(Path::new("/definitely/not/here"), FixedSource::canonical());
        let err = ForcingAssembler::new().assemble(&req).unwrap_err();
        assert!(matches!(err, ForcingError::Configuration(_)));
    }

    #[test]
    fn assembles_cropped_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ForcingAssembler::new().with_namer(SequentialNamer::new());
        let result = assembler
            .assemble(&request(dir.path(), FixedSource::canonical()))
            .unwrap();

        assert_eq!(result.source_tag, "fixed");
        assert_eq!(result.artifact("pr"), Some("HBV_forcing_fixed_0.json"));
        assert_eq!(result.files(), vec!["HBV_forcing_fixed_0.json"]);

        let ds = read_dataset(&result.path("tas").unwrap()).unwrap();
        assert_eq!(ds.time(), &[day(2), day(3)]);
        assert_eq!(
            ds.attribute("title").and_then(|t| t.as_text()),
            Some(DATASET_TITLE)
        );
    }

    #[test]
    fn reports_missing_required_variable() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixedSource {
            tas_units: "degC".to_string(),
            skip_tas: true,
        };
        let err = ForcingAssembler::new()
            .with_namer(SequentialNamer::new())
            .assemble(&request(dir.path(), source))
            .unwrap_err();
        match err {
            ForcingError::MissingVariables { variables, .. } => assert_eq!(variables, vec!["tas"]),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn removes_written_parts_when_a_later_part_fails() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("HBV_forcing_fixed_2.json");
        fs::write(&taken, "{}").unwrap();

        let req = ForcingRequest::new(dir.path(), day(2), day(3), Box::new(SplitSource)).unwrap();
        let err = ForcingAssembler::new()
            .with_namer(SequentialNamer::new())
            .assemble(&req)
            .unwrap_err();
        assert!(matches!(err, ForcingError::ArtifactExists(_)));

        let left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![taken.file_name().unwrap().to_os_string()]);
    }

    #[test]
    fn normalizes_assembled_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixedSource {
            tas_units: "K".to_string(),
            skip_tas: false,
        };
        let result = ForcingAssembler::new()
            .with_namer(SequentialNamer::new())
            .assemble(&request(dir.path(), source))
            .unwrap();

        let normalized = result.normalize_units().unwrap();
        assert_eq!(normalized.artifact("tas"), Some("HBV_forcing_fixed_0_converted.json"));
        let ds = read_dataset(&normalized.path("tas").unwrap()).unwrap();
        assert_eq!(ds.units("tas"), Some("degC"));
        assert!((ds.values("tas").unwrap()[0] - 11.0).abs() < 1e-9);

        // Already canonical, so nothing changes on a second pass
        assert_eq!(normalized.normalize_units().unwrap(), normalized);
    }

    #[test]
    fn request_roundtrips_through_toml() {
        let text = r#"
            directory = "/data/forcing"
            start_time = "2000-01-02"
            end_time = "2000-01-03T00:00:00Z"

            [source]
            type = "FixedSource"
            tas_units = "degC"
        "#;
        let req = ForcingRequest::from_toml_str(text).unwrap();
        assert_eq!(req.start_time(), day(2));
        assert_eq!(req.end_time(), day(3));
        assert_eq!(req.source().source_tag(), "fixed");

        let back = toml::to_string(&req).unwrap();
        assert!(back.contains("type = \"FixedSource\""));
    }

    #[test]
    fn parses_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(1997, 8, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("1997-08-01T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("1997-08-01T00:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("1997-08-01").unwrap(), expected);
        assert_eq!(parse_timestamp("1997-08-01T02:00:00+02:00").unwrap(), expected);
        assert!(parse_timestamp("August 1st").is_err());
    }
}
