use std::path::PathBuf;
use thiserror::Error;

/// Error type for forcing assembly.
#[derive(Error, Debug)]
pub enum ForcingError {
    /// Directory or source descriptor missing, ambiguous or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A text source does not have the expected shape.
    #[error("format error in {path} (line {line}): {message}")]
    Format {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{context} is missing required variable(s): {}", .variables.join(", "))]
    MissingVariables {
        variables: Vec<String>,
        context: String,
    },
    #[error("invalid dataset: {0}")]
    Dataset(String),
    #[error("artifact {0} already exists and will not be overwritten")]
    ArtifactExists(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[cfg(feature = "netcdf")]
    #[error(transparent)]
    NetCdf(#[from] netcdf::Error),
}

impl ForcingError {
    pub fn format(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Convenience type for `Result<T, ForcingError>`.
pub type ForcingResult<T> = Result<T, ForcingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variables_are_named() {
        let err = ForcingError::MissingVariables {
            variables: vec!["tas".to_string(), "pr".to_string()],
            context: "forcing.json".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "forcing.json is missing required variable(s): tas, pr"
        );
    }

    #[test]
    fn format_error_carries_line() {
        let err = ForcingError::format("basin.txt", 4, "expected 7 columns, found 6");
        assert!(err.to_string().contains("line 4"));
        assert!(err.to_string().contains("basin.txt"));
    }
}
