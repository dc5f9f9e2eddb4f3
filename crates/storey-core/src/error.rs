use thiserror::Error;

/// Top-level error type for the Storey system.
///
/// Subsystem crates either use this directly (storage, vector) or define
/// their own error type with a `From<StoreyError>` impl so that `?` works
/// across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for StoreyError {
    fn from(err: toml::de::Error) -> Self {
        StoreyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for StoreyError {
    fn from(err: toml::ser::Error) -> Self {
        StoreyError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for StoreyError {
    fn from(err: serde_json::Error) -> Self {
        StoreyError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Storey operations.
pub type Result<T> = std::result::Result<T, StoreyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreyError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(StoreyError, &str)> = vec![
            (
                StoreyError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                StoreyError::Search("index offline".to_string()),
                "Search error: index offline",
            ),
            (
                StoreyError::Embedding("empty text".to_string()),
                "Embedding error: empty text",
            ),
            (
                StoreyError::NotFound("product p-1".to_string()),
                "Not found: product p-1",
            ),
            (
                StoreyError::InvalidInput("quantity must be positive".to_string()),
                "Invalid input: quantity must be positive",
            ),
            (
                StoreyError::Api("bind failed".to_string()),
                "API error: bind failed",
            ),
            (
                StoreyError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StoreyError = io_err.into();
        assert!(matches!(err, StoreyError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: StoreyError = parsed.unwrap_err().into();
        assert!(matches!(err, StoreyError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: StoreyError = parsed.unwrap_err().into();
        assert!(matches!(err, StoreyError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
