//! ObjectId coercion for identifier fields
//!
//! Documents written by other tools sometimes store ids as hex strings or raw
//! 12-byte binaries. The serde helpers here let a model field accept any of
//! those forms while always holding a real [`ObjectId`].
//!
//! ```
//! use bson::oid::ObjectId;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Comment {
//!     #[serde(deserialize_with = "docmodel::id::deserialize_object_id")]
//!     author: ObjectId,
//! }
//!
//! let comment: Comment =
//!     bson::from_document(bson::doc! { "author": "507f1f77bcf86cd799439011" }).unwrap();
//! assert_eq!(comment.author.to_hex(), "507f1f77bcf86cd799439011");
//! ```

use bson::{oid::ObjectId, spec::BinarySubtype, Bson};
use docmodel_common::{OdmError, Result};
use serde::{de::Error as _, Deserialize, Deserializer};

use crate::config::ObjectIdConversionMode;

/// Checks if a string has valid ObjectId format (24 hex characters)
pub fn is_object_id_hex(value: &str) -> bool {
    value.len() == 24 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Coerce a BSON value into an ObjectId
///
/// Accepts an ObjectId, a 24-character hex string or a 12-byte generic binary.
pub fn coerce_object_id(value: &Bson) -> Result<ObjectId> {
    match value {
        Bson::ObjectId(oid) => Ok(*oid),
        Bson::String(s) => Ok(ObjectId::parse_str(s)?),
        Bson::Binary(bin) if bin.subtype == BinarySubtype::Generic => {
            let bytes: [u8; 12] = bin.bytes.as_slice().try_into().map_err(|_| {
                OdmError::Validation(format!(
                    "invalid ObjectId: expected 12 bytes, got {}",
                    bin.bytes.len()
                ))
            })?;
            Ok(ObjectId::from_bytes(bytes))
        }
        other => Err(OdmError::Validation(format!(
            "invalid ObjectId: cannot convert {:?} value",
            other.element_type()
        ))),
    }
}

/// Decide whether a value stored under `_id` in a filter becomes an ObjectId
///
/// `explicit` is true when the caller passed the value as an identifier
/// (`Query::id`), which is the only case `TypeHinted` converts.
pub(crate) fn coerce_id_value(value: Bson, explicit: bool, mode: ObjectIdConversionMode) -> Bson {
    let convert = match mode {
        ObjectIdConversionMode::Strict => false,
        ObjectIdConversionMode::TypeHinted => explicit,
        ObjectIdConversionMode::Lenient => true,
    };

    match value {
        Bson::String(s) if convert && is_object_id_hex(&s) => match ObjectId::parse_str(&s) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => Bson::String(s),
        },
        other => other,
    }
}

/// Serde helper accepting an ObjectId, hex string or 12-byte binary
pub fn deserialize_object_id<'de, D>(deserializer: D) -> std::result::Result<ObjectId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Bson::deserialize(deserializer)?;
    coerce_object_id(&value).map_err(D::Error::custom)
}

/// Optional variant of [`deserialize_object_id`]; null and missing become `None`
///
/// Pair with `#[serde(default)]` so a missing field is accepted.
pub fn deserialize_optional_object_id<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<ObjectId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Bson>::deserialize(deserializer)? {
        None | Some(Bson::Null) => Ok(None),
        Some(value) => coerce_object_id(&value).map(Some).map_err(D::Error::custom),
    }
}
