//! Filter builder
//!
//! Keys follow the `field__op` convention: `age__lt` becomes
//! `{"age": {"$lt": ...}}` and snake_case operators are camel-cased
//! (`tags__bits_all_set` becomes `$bitsAllSet`). Conditions on the same field
//! are merged; contradicting conditions are rejected.
//!
//! ```
//! use bson::doc;
//! use docmodel::q;
//!
//! let query = q!(age = 20, age__lt = 50).unwrap();
//! assert_eq!(query.into_document(), doc! { "age": { "$eq": 20, "$lt": 50 } });
//! ```

use bson::{Bson, Document as BsonDocument};
use docmodel_common::{OdmError, Result};

use crate::config::get_config;
use crate::id::coerce_id_value;
use crate::validation::ValidatedFieldName;

const ID_FIELD: &str = "_id";

/// Options for a `$text` search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextOptions {
    pub language: Option<String>,
    pub case_sensitive: Option<bool>,
    pub diacritic_sensitive: Option<bool>,
}

/// A MongoDB filter document under construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    document: BsonDocument,
}

impl Query {
    /// Empty filter (matches every document)
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing filter document as-is
    pub fn from_document(document: BsonDocument) -> Self {
        Self { document }
    }

    /// `{"_id": value}`
    ///
    /// Hex strings are converted to ObjectIds unless the conversion mode is
    /// `Strict`. A null id matches nothing.
    pub fn id(value: impl Into<Bson>) -> Self {
        match value.into() {
            Bson::Null => Self::nothing(),
            value => {
                let mode = get_config().objectid_mode;
                Self {
                    document: bson::doc! { ID_FIELD: coerce_id_value(value, true, mode) },
                }
            }
        }
    }

    /// `{"_id": {"$in": [...]}}`, skipping nulls
    ///
    /// A single id collapses to an equality match and no ids at all matches
    /// nothing.
    pub fn ids<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let mode = get_config().objectid_mode;
        let mut ids: Vec<Bson> = values
            .into_iter()
            .map(Into::into)
            .filter(|value| !matches!(value, Bson::Null))
            .map(|value| coerce_id_value(value, true, mode))
            .collect();

        match ids.len() {
            0 => Self::nothing(),
            1 => Self {
                document: bson::doc! { ID_FIELD: ids.remove(0) },
            },
            _ => Self {
                document: bson::doc! { ID_FIELD: { "$in": ids } },
            },
        }
    }

    // NaN never equals a stored id
    fn nothing() -> Self {
        Self {
            document: bson::doc! { ID_FIELD: f64::NAN },
        }
    }

    /// Add a condition; `key` is `field` or `field__op`
    pub fn filter(mut self, key: &str, value: impl Into<Bson>) -> Result<Self> {
        let (field, op) = split_key(key)?;
        let value = if field == ID_FIELD {
            coerce_ids(value.into(), get_config().objectid_mode)
        } else {
            value.into()
        };
        self.merge_condition(&field, op, value)?;
        Ok(self)
    }

    /// Merge every condition of `other` into this query
    pub fn extend(mut self, other: impl Into<Query>) -> Result<Self> {
        for (field, value) in other.into().document {
            match value {
                Bson::Document(ops) if !field.starts_with('$') && is_operator_document(&ops) => {
                    for (op, value) in ops {
                        self.merge_condition(&field, Some(op), value)?;
                    }
                }
                value => self.merge_condition(&field, None, value)?,
            }
        }
        Ok(self)
    }

    /// Add a `$jsonSchema` condition
    pub fn schema(mut self, json_schema: BsonDocument) -> Result<Self> {
        self.merge_condition("$jsonSchema", None, Bson::Document(json_schema))?;
        Ok(self)
    }

    /// Add a `$text` search
    pub fn text(mut self, search: impl Into<String>, options: TextOptions) -> Result<Self> {
        let mut text = bson::doc! { "$search": search.into() };
        if let Some(language) = options.language {
            text.insert("$language", language);
        }
        if let Some(case_sensitive) = options.case_sensitive {
            text.insert("$caseSensitive", case_sensitive);
        }
        if let Some(diacritic_sensitive) = options.diacritic_sensitive {
            text.insert("$diacriticSensitive", diacritic_sensitive);
        }
        self.merge_condition("$text", None, Bson::Document(text))?;
        Ok(self)
    }

    /// Attach a `$comment`, replacing any previous one
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.document.insert("$comment", comment.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    pub fn as_document(&self) -> &BsonDocument {
        &self.document
    }

    pub fn into_document(self) -> BsonDocument {
        self.document
    }

    fn merge_condition(&mut self, field: &str, op: Option<String>, value: Bson) -> Result<()> {
        let Some(existing) = self.document.get_mut(field) else {
            let condition = match op {
                Some(op) => Bson::Document(bson::doc! { op: value }),
                None => value,
            };
            self.document.insert(field, condition);
            return Ok(());
        };

        // Top-level `$` fields such as `$text` hold a single value, never an operator map
        if let Bson::Document(ops) = &mut *existing {
            if !field.starts_with('$') && is_operator_document(ops) {
                let op = op.unwrap_or_else(|| "$eq".to_string());
                return match ops.get(&op) {
                    Some(current) if *current == value => Ok(()),
                    Some(_) => Err(conflict(field, Some(&op))),
                    None => {
                        ops.insert(op, value);
                        Ok(())
                    }
                };
            }
        }

        match op.as_deref() {
            None | Some("$eq") if *existing == value => Ok(()),
            None | Some("$eq") => Err(conflict(field, op.as_deref())),
            Some(op) => {
                let equal = existing.clone();
                *existing = Bson::Document(bson::doc! { "$eq": equal, op: value });
                Ok(())
            }
        }
    }
}

fn conflict(field: &str, op: Option<&str>) -> OdmError {
    match op {
        Some(op) => OdmError::Query(format!("Conflicting values for '{}' ({})", field, op)),
        None => OdmError::Query(format!("Conflicting values for '{}'", field)),
    }
}

impl From<BsonDocument> for Query {
    fn from(document: BsonDocument) -> Self {
        Self::from_document(document)
    }
}

impl From<Query> for BsonDocument {
    fn from(query: Query) -> Self {
        query.document
    }
}

/// Build a [`Query`] from `field = value` / `field__op = value` pairs
///
/// Evaluates to `Result<Query>`.
#[macro_export]
macro_rules! q {
    () => {
        $crate::Result::<$crate::Query>::Ok($crate::Query::new())
    };
    ($($key:ident = $value:expr),+ $(,)?) => {
        $crate::Result::<$crate::Query>::Ok($crate::Query::new())
            $(.and_then(|query| query.filter(stringify!($key), $value)))+
    };
}

fn split_key(key: &str) -> Result<(String, Option<String>)> {
    let (field, op) = match key.rsplit_once("__") {
        Some((field, op)) if !field.is_empty() => (field, Some(op)),
        _ => (key, None),
    };

    if let Some(op) = op {
        if op.is_empty() {
            return Err(OdmError::Query(format!("Missing operator in filter key '{}'", key)));
        }
    }

    let field = ValidatedFieldName::new(field, op.is_none())?;
    Ok((field.as_str().to_string(), op.map(operator_name)))
}

/// `bits_all_set` -> `$bitsAllSet`
fn operator_name(op: &str) -> String {
    let op = op.trim_start_matches('$');
    let mut name = String::with_capacity(op.len() + 1);
    name.push('$');
    let mut upper = false;
    for c in op.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            name.extend(c.to_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name
}

fn is_operator_document(document: &BsonDocument) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

fn coerce_ids(value: Bson, mode: crate::config::ObjectIdConversionMode) -> Bson {
    match value {
        Bson::Array(values) => Bson::Array(
            values
                .into_iter()
                .map(|value| coerce_id_value(value, false, mode))
                .collect(),
        ),
        value => coerce_id_value(value, false, mode),
    }
}
