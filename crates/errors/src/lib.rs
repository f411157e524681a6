use thiserror::Error;

/// Unified error type for the strata workspace.
///
/// Data-plane failures (unreadable files, parse errors, network timeouts)
/// are recovered close to where they happen and recorded on source
/// metadata; this enum is reserved for control-plane failures that a
/// caller can actually act on.
#[derive(Debug, Error)]
pub enum StrataError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("file error: {0}")]
    File(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("security error: {0}")]
    Security(String),

    #[error("profile error: {0}")]
    Profile(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("manager disposed")]
    Disposed,
}

pub type StrataResult<T> = Result<T, StrataError>;

impl StrataError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn profile<S: Into<String>>(msg: S) -> Self {
        Self::Profile(msg.into())
    }

    /// Whether the error came from loading or decoding source data, as
    /// opposed to caller misuse of the API.
    pub fn is_data_plane(&self) -> bool {
        matches!(
            self,
            StrataError::Parse(_)
                | StrataError::File(_)
                | StrataError::Network(_)
                | StrataError::Serialization(_)
        )
    }
}

impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        StrataError::File(err.to_string())
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for StrataError {
    fn from(err: toml::de::Error) -> Self {
        StrataError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for StrataError {
    fn from(err: serde_yaml::Error) -> Self {
        StrataError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for StrataError {
    fn from(err: reqwest::Error) -> Self {
        StrataError::Network(err.to_string())
    }
}

impl From<url::ParseError> for StrataError {
    fn from(err: url::ParseError) -> Self {
        StrataError::Parse(err.to_string())
    }
}

impl From<anyhow::Error> for StrataError {
    fn from(err: anyhow::Error) -> Self {
        StrataError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_constructors_map_to_variants() {
        assert!(matches!(
            StrataError::config("bad"),
            StrataError::Configuration(_)
        ));
        assert!(matches!(StrataError::parse("bad"), StrataError::Parse(_)));
        assert!(matches!(
            StrataError::validation("bad"),
            StrataError::Validation(_)
        ));
    }

    #[test]
    fn data_plane_classification() {
        assert!(StrataError::Parse("x".into()).is_data_plane());
        assert!(StrataError::Network("x".into()).is_data_plane());
        assert!(!StrataError::Configuration("x".into()).is_data_plane());
        assert!(!StrataError::Disposed.is_data_plane());
    }

    #[test]
    fn io_error_converts_to_file_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StrataError = io.into();
        assert!(matches!(err, StrataError::File(_)));
    }

    #[test]
    fn json_error_converts_to_parse_error() {
        let bad = serde_json::from_str::<serde_json::Value>("{nope");
        let err: StrataError = bad.unwrap_err().into();
        assert!(matches!(err, StrataError::Parse(_)));
        assert!(err.to_string().starts_with("parse error"));
    }
}
