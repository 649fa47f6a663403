//! Supporting functions used by model inheritance, index and view management

use bson::{Bson, Document as BsonDocument};
use docmodel_common::{OdmError, Result};
use mongodb::{results::CollectionSpecification, IndexModel};

/// Merge two values during meta inheritance
///
/// Arrays are concatenated (`parent` first) and documents are unioned with the
/// keys of `child` winning. Other value types cannot be merged.
pub fn merge_values(parent: &Bson, child: &Bson) -> Result<Bson> {
    match (parent, child) {
        (Bson::Array(a), Bson::Array(b)) => {
            let mut merged = a.clone();
            merged.extend(b.iter().cloned());
            Ok(Bson::Array(merged))
        }
        (Bson::Document(a), Bson::Document(b)) => {
            let mut merged = a.clone();
            for (key, value) in b {
                merged.insert(key.clone(), value.clone());
            }
            Ok(Bson::Document(merged))
        }
        _ => Err(OdmError::Configuration(format!(
            "Cannot merge value of type {:?} into value of type {:?}",
            child.element_type(),
            parent.element_type()
        ))),
    }
}

/// Name MongoDB gives an index when none is specified (`name_1_age_-1`)
pub fn default_index_name(keys: &BsonDocument) -> String {
    keys.iter()
        .map(|(field, direction)| {
            let direction = match direction {
                Bson::String(s) => s.clone(),
                Bson::Int32(n) => n.to_string(),
                Bson::Int64(n) => n.to_string(),
                Bson::Double(n) => n.to_string(),
                other => other.to_string(),
            };
            format!("{}_{}", field, direction)
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// The document a declared index would produce on the server
///
/// The index gets its default name if it has none. The `v` and `ns` fields the
/// server adds are never part of a declaration.
pub fn index_document(index: &IndexModel) -> Result<BsonDocument> {
    let mut document = bson::to_document(index)?;
    if !document.contains_key("name") {
        document.insert("name", default_index_name(&index.keys));
    }
    document.remove("v");
    document.remove("ns");
    Ok(document)
}

/// Compares a declared index with an index loaded from the database
pub fn equal_indexes(index: &IndexModel, db_index: &IndexModel) -> bool {
    match (index_document(index), index_document(db_index)) {
        (Ok(declared), Ok(existing)) => normalize_numbers(&declared) == normalize_numbers(&existing),
        _ => false,
    }
}

/// Compares index key specifications, field order included
pub fn equal_keys(keys: &BsonDocument, other: &BsonDocument) -> bool {
    keys.len() == other.len()
        && keys
            .iter()
            .zip(other.iter())
            .all(|((field, direction), (other_field, other_direction))| {
                field == other_field && normalize_value(direction) == normalize_value(other_direction)
            })
}

/// Compares a view declaration with a collection listed by the server
pub fn equal_views(
    name: &str,
    view_on: &str,
    pipeline: &[BsonDocument],
    collection: &CollectionSpecification,
) -> bool {
    collection.name == name
        && collection.options.view_on.as_deref() == Some(view_on)
        && collection.options.pipeline.as_deref().unwrap_or_default() == pipeline
}

// Index keys come back from the server as Int32 or Double depending on how they
// were created, so numbers are compared as f64
fn normalize_numbers(document: &BsonDocument) -> BsonDocument {
    document
        .iter()
        .map(|(key, value)| (key.clone(), normalize_value(value)))
        .collect()
}

fn normalize_value(value: &Bson) -> Bson {
    match value {
        Bson::Int32(n) => Bson::Double(f64::from(*n)),
        Bson::Int64(n) => Bson::Double(*n as f64),
        Bson::Document(doc) => Bson::Document(normalize_numbers(doc)),
        Bson::Array(items) => Bson::Array(items.iter().map(normalize_value).collect()),
        other => other.clone(),
    }
}
