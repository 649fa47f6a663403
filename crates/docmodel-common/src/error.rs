//! Error types for docmodel

use thiserror::Error;

/// Result type alias for docmodel operations
pub type Result<T> = std::result::Result<T, OdmError>;

/// MongoDB server code for duplicate key violations (E11000)
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Unified error type for all docmodel operations
#[derive(Error, Debug, Clone)]
pub enum OdmError {
    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A model or collection is declared inconsistently
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Duplicate key (E11000)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation timeout - retryable
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transient error that may succeed on retry
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OdmError {
    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, OdmError::Timeout(_) | OdmError::Transient(_))
    }

    /// Returns true if the server rejected a write because of a unique index
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, OdmError::Conflict(_))
    }
}

impl From<serde_json::Error> for OdmError {
    fn from(err: serde_json::Error) -> Self {
        OdmError::Serialization(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for OdmError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        let message = err.to_string();
        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write_error))
                if write_error.code == DUPLICATE_KEY_CODE =>
            {
                OdmError::Conflict(message)
            }
            ErrorKind::Command(command_error) if command_error.code == DUPLICATE_KEY_CODE => {
                OdmError::Conflict(message)
            }
            ErrorKind::InsertMany(insert_error)
                if insert_error
                    .write_errors
                    .as_ref()
                    .is_some_and(|errors| errors.iter().any(|e| e.code == DUPLICATE_KEY_CODE)) =>
            {
                OdmError::Conflict(message)
            }
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. } => OdmError::Connection(message),
            ErrorKind::InvalidArgument { .. } => OdmError::Query(message),
            ErrorKind::BsonSerialization(_) => OdmError::Serialization(message),
            ErrorKind::BsonDeserialization(_) => OdmError::Deserialization(message),
            _ if err.contains_label("TransientTransactionError")
                || err.contains_label("RetryableWriteError") =>
            {
                OdmError::Transient(message)
            }
            _ => OdmError::MongoDB(message),
        }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for OdmError {
    fn from(err: bson::ser::Error) -> Self {
        OdmError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for OdmError {
    fn from(err: bson::de::Error) -> Self {
        OdmError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::oid::Error> for OdmError {
    fn from(err: bson::oid::Error) -> Self {
        OdmError::Validation(format!("invalid ObjectId: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_mongodb() {
        let err = OdmError::MongoDB("connection refused".to_string());
        assert_eq!(err.to_string(), "MongoDB error: connection refused");
    }

    #[test]
    fn test_error_display_validation() {
        let err = OdmError::Validation("field required".to_string());
        assert_eq!(err.to_string(), "Validation error: field required");
    }

    #[test]
    fn test_error_display_configuration() {
        let err = OdmError::Configuration("User does not define a collection".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: User does not define a collection"
        );
    }

    #[test]
    fn test_error_display_conflict() {
        let err = OdmError::Conflict("E11000 duplicate key error".to_string());
        assert_eq!(err.to_string(), "Conflict: E11000 duplicate key error");
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: OdmError = json_err.into();
        assert!(matches!(err, OdmError::Serialization(_)));
    }

    #[test]
    fn test_is_retryable() {
        assert!(OdmError::Timeout("test".to_string()).is_retryable());
        assert!(OdmError::Transient("test".to_string()).is_retryable());
        assert!(!OdmError::Conflict("test".to_string()).is_retryable());
        assert!(!OdmError::Validation("test".to_string()).is_retryable());
        assert!(!OdmError::Query("test".to_string()).is_retryable());
    }

    #[cfg(feature = "mongodb-errors")]
    #[test]
    fn test_duplicate_key_maps_to_conflict() {
        use mongodb::error::{Error, ErrorKind, WriteError, WriteFailure};

        let write_error: WriteError = bson::from_document(bson::doc! {
            "code": DUPLICATE_KEY_CODE,
            "codeName": "DuplicateKey",
            "errmsg": "E11000 duplicate key error collection: test.users index: email_1",
        })
        .unwrap();
        let err: OdmError = Error::from(ErrorKind::Write(WriteFailure::WriteError(write_error))).into();
        assert!(matches!(err, OdmError::Conflict(_)));
        assert!(err.is_duplicate_key());
        assert!(err.to_string().contains("E11000"));

        let other: WriteError = bson::from_document(bson::doc! {
            "code": 121,
            "codeName": "DocumentValidationFailure",
            "errmsg": "Document failed validation",
        })
        .unwrap();
        let err: OdmError = Error::from(ErrorKind::Write(WriteFailure::WriteError(other))).into();
        assert!(matches!(err, OdmError::MongoDB(_)));
    }

    #[cfg(feature = "mongodb-errors")]
    #[test]
    fn test_io_error_maps_to_connection() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: OdmError = mongodb::error::Error::from(io_err).into();
        assert!(matches!(err, OdmError::Connection(_)));
        assert!(!err.is_retryable());
    }

    #[cfg(feature = "mongodb-errors")]
    #[tokio::test]
    async fn test_server_selection_maps_to_connection() {
        // Nothing listens on port 1, so selection gives up after the short timeout
        let client = mongodb::Client::with_uri_str(
            "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200&connectTimeoutMS=200",
        )
        .await
        .unwrap();
        let driver_err = client
            .database("docmodel_test")
            .run_command(bson::doc! { "ping": 1 })
            .await
            .unwrap_err();
        assert!(matches!(
            driver_err.kind.as_ref(),
            mongodb::error::ErrorKind::ServerSelection { .. }
        ));

        let err: OdmError = driver_err.into();
        assert!(matches!(err, OdmError::Connection(_)));
    }

    #[cfg(feature = "mongodb-errors")]
    #[test]
    fn test_from_bson_oid_error() {
        let oid_err = bson::oid::ObjectId::parse_str("nope").unwrap_err();
        let err: OdmError = oid_err.into();
        assert!(matches!(err, OdmError::Validation(_)));
    }
}
