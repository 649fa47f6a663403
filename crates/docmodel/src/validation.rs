//! Input checks for names and filter documents
//!
//! Collection names come from model declarations and filters from callers; both
//! are screened before they reach the driver.

use bson::{Bson, Document as BsonDocument};
use docmodel_common::{OdmError, Result};

use crate::config::get_config;

/// Collection name limit; the server caps the whole `db.collection` namespace at 255 bytes
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Maximum allowed length for field names
const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Operators that run server-side JavaScript
const DANGEROUS_OPERATORS: &[&str] = &["$where", "$function", "$accumulator"];

/// Collection name accepted by the server
///
/// - Not empty, at most 120 bytes
/// - No null bytes or `$`
/// - No empty `.`-separated segment (leading, trailing or doubled dots)
/// - Not in the reserved `system.` namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedCollectionName {
    name: String,
}

impl ValidatedCollectionName {
    pub fn new(name: &str) -> Result<Self> {
        let invalid = |reason: &str| -> Result<Self> {
            Err(OdmError::Validation(format!(
                "Invalid collection name '{}': {}",
                name.escape_default(),
                reason
            )))
        };

        if name.is_empty() {
            return invalid("cannot be empty");
        }
        if name.len() > MAX_COLLECTION_NAME_LENGTH {
            return invalid(&format!("exceeds maximum length of {} bytes", MAX_COLLECTION_NAME_LENGTH));
        }
        if name.contains('\0') {
            return invalid("cannot contain null bytes");
        }
        if name.contains('$') {
            return invalid("cannot contain '$'");
        }
        if name.split('.').any(str::is_empty) {
            return invalid("cannot start or end with '.' or contain '..'");
        }
        if name.starts_with("system.") {
            return invalid("the 'system.' prefix is reserved");
        }

        Ok(ValidatedCollectionName {
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn into_string(self) -> String {
        self.name
    }
}

impl AsRef<str> for ValidatedCollectionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Validated field name used as a filter or projection key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFieldName {
    name: String,
}

impl ValidatedFieldName {
    /// `allow_operators` permits a leading `$` (e.g. `$and`, `$text`)
    pub fn new(name: &str, allow_operators: bool) -> Result<Self> {
        if name.is_empty() {
            return Err(OdmError::Validation("Field name cannot be empty".to_string()));
        }

        if name.len() > MAX_FIELD_NAME_LENGTH {
            return Err(OdmError::Validation(format!(
                "Field name exceeds maximum length of {} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }

        if name.contains('\0') {
            return Err(OdmError::Validation(
                "Field name cannot contain null bytes".to_string(),
            ));
        }

        if name.starts_with('$') && !allow_operators {
            return Err(OdmError::Validation(format!(
                "Field name cannot start with '$' (reserved for operators): '{}'",
                name
            )));
        }

        Ok(ValidatedFieldName {
            name: name.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for ValidatedFieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Rejects filters containing operators that execute JavaScript on the server
pub fn validate_query(query: &BsonDocument) -> Result<()> {
    for (key, value) in query {
        if DANGEROUS_OPERATORS.contains(&key.as_str()) {
            return Err(OdmError::Validation(format!(
                "Dangerous operator '{}' is not allowed for security reasons",
                key
            )));
        }
        validate_nested(value)?;
    }
    Ok(())
}

fn validate_nested(value: &Bson) -> Result<()> {
    match value {
        Bson::Document(doc) => validate_query(doc),
        Bson::Array(items) => items.iter().try_for_each(validate_nested),
        _ => Ok(()),
    }
}

/// Checks that an update document only contains update operators
///
/// Plain field keys would make the server replace the whole document, which is
/// what `save` and `find_one_and_replace` are for.
///
/// Dangerous operators are rejected too while `OdmConfig::validate_queries` is on.
pub fn validate_update(update: &BsonDocument) -> Result<()> {
    check_update(update, get_config().validate_queries)
}

fn check_update(update: &BsonDocument, check_operators: bool) -> Result<()> {
    if update.is_empty() {
        return Err(OdmError::Query("Update document cannot be empty".to_string()));
    }
    if let Some(key) = update.keys().find(|key| !key.starts_with('$')) {
        return Err(OdmError::Query(format!(
            "Update document must only contain update operators, found field '{}'",
            key
        )));
    }
    if check_operators {
        validate_query(update)?;
    }
    Ok(())
}
