//! Declarative field schemas
//!
//! Serde already rejects values of the wrong Rust type when a document is read.
//! A [`Schema`] adds the rules the type system cannot express (required
//! `Option` fields, string lengths, numeric ranges, formats) and is checked on
//! the serialized BSON before any write reaches the driver.
//!
//! ```
//! use bson::doc;
//! use docmodel::{FieldType, Schema};
//!
//! let schema = Schema::new()
//!     .field("name", FieldType::string().min_length(1))
//!     .field("age", FieldType::int().minimum(0))
//!     .optional("email", FieldType::email());
//!
//! assert!(schema.validate(&doc! { "name": "Ann", "age": 31 }).is_ok());
//! assert!(schema.validate(&doc! { "age": -1 }).is_err());
//! ```

use std::fmt;

use bson::{Bson, Document as BsonDocument};
use chrono::{DateTime, Utc};
use docmodel_common::{OdmError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// Errors
// ============================================================================

/// Classification of validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Type mismatch (expected string, got int32)
    TypeError,
    /// Constraint violation (too long, out of range)
    ValueError,
    /// Required field missing
    Missing,
    /// Field not declared and the schema forbids extras
    ExtraForbidden,
    /// Invalid format (email, URL)
    FormatError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeError => write!(f, "type_error"),
            Self::ValueError => write!(f, "value_error"),
            Self::Missing => write!(f, "missing"),
            Self::ExtraForbidden => write!(f, "extra_forbidden"),
            Self::FormatError => write!(f, "format_error"),
        }
    }
}

/// A single field violation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted path to the field (`address.city`, `tags[2]`)
    pub path: String,
    pub message: String,
    pub kind: ErrorKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.path, self.message, self.kind)
    }
}

/// Every violation found in one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    fn add(&mut self, path: &str, kind: ErrorKind, message: impl Into<String>) {
        self.errors.push(ValidationError {
            path: path.to_string(),
            message: message.into(),
            kind,
        });
    }

    /// Errors at exactly `path`
    pub fn at(&self, path: &str) -> Vec<&ValidationError> {
        self.errors.iter().filter(|e| e.path == path).collect()
    }

    fn into_result(self) -> std::result::Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "; {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationErrors> for OdmError {
    fn from(errors: ValidationErrors) -> Self {
        OdmError::Validation(errors.to_string())
    }
}

// ============================================================================
// Constraints
// ============================================================================

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap()
});

/// Predefined string formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Email,
    Url,
}

impl StringFormat {
    fn matches(self, value: &str) -> bool {
        match self {
            StringFormat::Email => EMAIL_REGEX.is_match(value),
            StringFormat::Url => URL_REGEX.is_match(value),
        }
    }

    fn name(self) -> &'static str {
        match self {
            StringFormat::Email => "email",
            StringFormat::Url => "URL",
        }
    }
}

/// Constraints for string fields (lengths in characters, not bytes)
#[derive(Debug, Clone, Default)]
pub struct StringConstraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub format: Option<StringFormat>,
}

/// Inclusive bounds for numeric fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericConstraints<T> {
    pub minimum: Option<T>,
    pub maximum: Option<T>,
}

/// Inclusive bounds for datetime fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateTimeConstraints {
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
}

// ============================================================================
// Field types
// ============================================================================

/// Expected BSON type of a field
#[derive(Debug, Clone)]
pub enum FieldType {
    String(StringConstraints),
    /// Int32 or Int64
    Int(NumericConstraints<i64>),
    /// Double; integers are accepted
    Double(NumericConstraints<f64>),
    Bool,
    DateTime(DateTimeConstraints),
    ObjectId,
    Binary,
    Array {
        items: Box<FieldType>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    /// Embedded document with its own schema
    Object(Schema),
    /// Null or the inner type
    Optional(Box<FieldType>),
    Any,
}

impl FieldType {
    pub fn string() -> Self {
        FieldType::String(StringConstraints::default())
    }

    pub fn email() -> Self {
        FieldType::String(StringConstraints {
            format: Some(StringFormat::Email),
            ..Default::default()
        })
    }

    pub fn url() -> Self {
        FieldType::String(StringConstraints {
            format: Some(StringFormat::Url),
            ..Default::default()
        })
    }

    pub fn int() -> Self {
        FieldType::Int(NumericConstraints::default())
    }

    pub fn double() -> Self {
        FieldType::Double(NumericConstraints::default())
    }

    pub fn datetime() -> Self {
        FieldType::DateTime(DateTimeConstraints::default())
    }

    pub fn array(items: FieldType) -> Self {
        FieldType::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
    }

    pub fn object(schema: Schema) -> Self {
        FieldType::Object(schema)
    }

    pub fn nullable(self) -> Self {
        FieldType::Optional(Box::new(self))
    }

    /// Minimum string length or array size; no effect on other types
    pub fn min_length(mut self, min: usize) -> Self {
        match &mut self {
            FieldType::String(c) => c.min_length = Some(min),
            FieldType::Array { min_items, .. } => *min_items = Some(min),
            _ => {}
        }
        self
    }

    /// Maximum string length or array size; no effect on other types
    pub fn max_length(mut self, max: usize) -> Self {
        match &mut self {
            FieldType::String(c) => c.max_length = Some(max),
            FieldType::Array { max_items, .. } => *max_items = Some(max),
            _ => {}
        }
        self
    }

    /// Regex the whole string must match
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| OdmError::Configuration(format!("Invalid regex pattern '{}': {}", pattern, e)))?;
        if let FieldType::String(c) = &mut self {
            c.pattern = Some(regex);
        }
        Ok(self)
    }

    pub fn minimum(mut self, min: i64) -> Self {
        match &mut self {
            FieldType::Int(c) => c.minimum = Some(min),
            FieldType::Double(c) => c.minimum = Some(min as f64),
            _ => {}
        }
        self
    }

    pub fn maximum(mut self, max: i64) -> Self {
        match &mut self {
            FieldType::Int(c) => c.maximum = Some(max),
            FieldType::Double(c) => c.maximum = Some(max as f64),
            _ => {}
        }
        self
    }

    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        if let FieldType::DateTime(c) = &mut self {
            c.not_before = Some(at);
        }
        self
    }

    pub fn not_after(mut self, at: DateTime<Utc>) -> Self {
        if let FieldType::DateTime(c) = &mut self {
            c.not_after = Some(at);
        }
        self
    }

    /// Human-readable type name
    pub fn type_name(&self) -> String {
        match self {
            FieldType::String(_) => "string".to_string(),
            FieldType::Int(_) => "int".to_string(),
            FieldType::Double(_) => "double".to_string(),
            FieldType::Bool => "bool".to_string(),
            FieldType::DateTime(_) => "datetime".to_string(),
            FieldType::ObjectId => "objectid".to_string(),
            FieldType::Binary => "binary".to_string(),
            FieldType::Array { items, .. } => format!("array<{}>", items.type_name()),
            FieldType::Object(_) => "object".to_string(),
            FieldType::Optional(inner) => format!("optional<{}>", inner.type_name()),
            FieldType::Any => "any".to_string(),
        }
    }

    fn accepts_null(&self) -> bool {
        matches!(self, FieldType::Optional(_) | FieldType::Any)
    }
}

/// Get the BSON type name for error messages
fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binary",
        Bson::ObjectId(_) => "objectid",
        Bson::DateTime(_) => "datetime",
        Bson::Decimal128(_) => "decimal128",
        _ => "unknown",
    }
}

// ============================================================================
// Schema
// ============================================================================

/// One declared field
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// Name as stored in MongoDB (after serde renames)
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

/// Ordered set of field declarations for a document
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub fields: Vec<FieldSchema>,
    /// Reject keys that are not declared (`_id` is always allowed)
    pub forbid_extra: bool,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required field
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    /// Declare a field that may be absent
    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    pub fn forbid_extra(mut self) -> Self {
        self.forbid_extra = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && !self.forbid_extra
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Collect every violation in `document`
    pub fn validate(&self, document: &BsonDocument) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.validate_into("", document, &mut errors);
        errors.into_result()
    }

    /// [`validate`](Self::validate) mapped onto the crate error type
    pub fn check(&self, document: &BsonDocument) -> Result<()> {
        self.validate(document).map_err(OdmError::from)
    }

    fn validate_into(&self, prefix: &str, document: &BsonDocument, errors: &mut ValidationErrors) {
        for field in &self.fields {
            let path = join_path(prefix, &field.name);
            match document.get(&field.name) {
                None if field.required => errors.add(&path, ErrorKind::Missing, "Field required"),
                None => {}
                Some(Bson::Null) if field.required && !field.field_type.accepts_null() => {
                    errors.add(&path, ErrorKind::Missing, "Field required (got null)")
                }
                Some(Bson::Null) if !field.required => {}
                Some(value) => validate_value(&path, value, &field.field_type, errors),
            }
        }

        if self.forbid_extra {
            for key in document.keys() {
                if key != "_id" && self.get(key).is_none() {
                    errors.add(
                        &join_path(prefix, key),
                        ErrorKind::ExtraForbidden,
                        "Extra fields not permitted",
                    );
                }
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn type_error(path: &str, expected: &FieldType, value: &Bson, errors: &mut ValidationErrors) {
    errors.add(
        path,
        ErrorKind::TypeError,
        format!(
            "expected type '{}', got '{}'",
            expected.type_name(),
            bson_type_name(value)
        ),
    );
}

fn validate_value(path: &str, value: &Bson, expected: &FieldType, errors: &mut ValidationErrors) {
    match (expected, value) {
        (FieldType::Any, _) => {}

        (FieldType::Optional(_), Bson::Null) => {}
        (FieldType::Optional(inner), _) => validate_value(path, value, inner, errors),

        (FieldType::String(constraints), Bson::String(s)) => {
            validate_string(path, s, constraints, errors)
        }

        (FieldType::Int(constraints), Bson::Int32(n)) => {
            validate_range(path, i64::from(*n), constraints, errors)
        }
        (FieldType::Int(constraints), Bson::Int64(n)) => validate_range(path, *n, constraints, errors),

        (FieldType::Double(constraints), Bson::Double(n)) => {
            if n.is_nan() {
                errors.add(path, ErrorKind::ValueError, "NaN is not allowed");
            } else {
                validate_range(path, *n, constraints, errors)
            }
        }
        (FieldType::Double(constraints), Bson::Int32(n)) => {
            validate_range(path, f64::from(*n), constraints, errors)
        }
        (FieldType::Double(constraints), Bson::Int64(n)) => {
            validate_range(path, *n as f64, constraints, errors)
        }

        (FieldType::Bool, Bson::Boolean(_)) => {}
        (FieldType::ObjectId, Bson::ObjectId(_)) => {}
        (FieldType::Binary, Bson::Binary(_)) => {}

        (FieldType::DateTime(constraints), Bson::DateTime(dt)) => {
            let at = dt.to_chrono();
            if constraints.not_before.is_some_and(|min| at < min) {
                errors.add(path, ErrorKind::ValueError, format!("{} is too early", at));
            }
            if constraints.not_after.is_some_and(|max| at > max) {
                errors.add(path, ErrorKind::ValueError, format!("{} is too late", at));
            }
        }

        (FieldType::Array { items, min_items, max_items }, Bson::Array(values)) => {
            if let Some(min) = min_items {
                if values.len() < *min {
                    errors.add(
                        path,
                        ErrorKind::ValueError,
                        format!("Array must have at least {} items (got {})", min, values.len()),
                    );
                }
            }
            if let Some(max) = max_items {
                if values.len() > *max {
                    errors.add(
                        path,
                        ErrorKind::ValueError,
                        format!("Array must have at most {} items (got {})", max, values.len()),
                    );
                }
            }
            for (index, item) in values.iter().enumerate() {
                validate_value(&format!("{}[{}]", path, index), item, items, errors);
            }
        }

        (FieldType::Object(schema), Bson::Document(doc)) => schema.validate_into(path, doc, errors),

        (expected, value) => type_error(path, expected, value, errors),
    }
}

fn validate_string(path: &str, s: &str, constraints: &StringConstraints, errors: &mut ValidationErrors) {
    let char_count = s.chars().count();

    if let Some(min) = constraints.min_length {
        if char_count < min {
            errors.add(
                path,
                ErrorKind::ValueError,
                format!("String must be at least {} characters (got {})", min, char_count),
            );
        }
    }

    if let Some(max) = constraints.max_length {
        if char_count > max {
            errors.add(
                path,
                ErrorKind::ValueError,
                format!("String must be at most {} characters (got {})", max, char_count),
            );
        }
    }

    if let Some(pattern) = &constraints.pattern {
        if !pattern.is_match(s) {
            errors.add(
                path,
                ErrorKind::ValueError,
                format!("String does not match pattern: {}", pattern.as_str()),
            );
        }
    }

    if let Some(format) = constraints.format {
        if !format.matches(s) {
            errors.add(path, ErrorKind::FormatError, format!("Invalid {} format", format.name()));
        }
    }
}

fn validate_range<T>(path: &str, n: T, constraints: &NumericConstraints<T>, errors: &mut ValidationErrors)
where
    T: PartialOrd + fmt::Display + Copy,
{
    if let Some(min) = constraints.minimum {
        if n < min {
            errors.add(path, ErrorKind::ValueError, format!("Value must be >= {} (got {})", min, n));
        }
    }
    if let Some(max) = constraints.maximum {
        if n > max {
            errors.add(path, ErrorKind::ValueError, format!("Value must be <= {} (got {})", max, n));
        }
    }
}
