use thiserror::Error;

/// Top-level error type shared by every Reflex crate.
///
/// Collaborator implementations (storage, HTTP, composer) report failures
/// through this type; the engine wraps it in its own error so that the `?`
/// operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReflexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ReflexError {
    fn from(err: toml::de::Error) -> Self {
        ReflexError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ReflexError {
    fn from(err: toml::ser::Error) -> Self {
        ReflexError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ReflexError {
    fn from(err: serde_json::Error) -> Self {
        ReflexError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Reflex operations.
pub type Result<T> = std::result::Result<T, ReflexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReflexError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = ReflexError::Timeout(2500);
        assert_eq!(err.to_string(), "Request timed out after 2500 ms");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ReflexError = io_err.into();
        assert!(matches!(err, ReflexError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: ReflexError = err.unwrap_err().into();
        assert!(matches!(err, ReflexError::Config(_)));
    }

    #[test]
    fn test_error_from_toml_ser() {
        let err = toml::to_string(&42u32).unwrap_err();
        let err: ReflexError = err.into();
        assert!(matches!(err, ReflexError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: ReflexError = err.unwrap_err().into();
        assert!(matches!(err, ReflexError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let value: serde_json::Value = serde_json::from_str(r#"{"ok":true}"#)?;
            Ok(value["ok"].to_string())
        }

        assert_eq!(inner().unwrap(), "true");
    }
}
