//! Async object-document mapper for MongoDB
//!
//! Models are plain serde structs. Implementing [`MongoDocument`] ties a type to a
//! collection and gives it read operations; [`Document`] adds an `_id` and the write
//! side (insert, save, reload, delete). Views are modelled with [`ComputedDocument`].
//!
//! # Features
//! - Per-model collection configuration with inheritance ([`CollectionMeta`])
//! - Declarative field schemas checked before any write ([`Schema`])
//! - ObjectId coercion for identifier fields ([`id`])
//! - Filter builder with `field__op` keys ([`Query`], [`q!`])
//! - Index reconciliation ([`IndexManager`])
//!
//! # Example
//!
//! ```ignore
//! use bson::oid::ObjectId;
//! use docmodel::{CollectionMeta, Document, MongoDocument};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     id: Option<ObjectId>,
//!     name: String,
//! }
//!
//! impl MongoDocument for User {
//!     fn meta() -> CollectionMeta {
//!         CollectionMeta::new("users")
//!     }
//! }
//!
//! impl Document for User {
//!     fn id(&self) -> Option<ObjectId> {
//!         self.id
//!     }
//!
//!     fn set_id(&mut self, id: ObjectId) {
//!         self.id = Some(id);
//!     }
//! }
//!
//! docmodel::init("mongodb://localhost:27017/app").await?;
//! let mut user = User { id: None, name: "John".into() };
//! user.insert().await?;
//! ```

pub mod config;
pub mod connection;
pub mod document;
pub mod helpers;
pub mod id;
pub mod index;
pub mod meta;
pub mod query;
pub mod schema;
pub mod validation;
pub mod view;

pub use config::{configure, get_config, set_config, ObjectIdConversionMode, OdmConfig};
pub use connection::{
    bind, bind_client, close, connection, database, init, is_connected, reset, Connection,
    PoolConfig,
};
pub use docmodel_common::{OdmError, Result};
pub use document::{Document, DocumentStream, MongoDocument};
pub use index::{IndexManager, IndexPlan};
pub use meta::CollectionMeta;
pub use query::{Query, TextOptions};
pub use schema::{FieldSchema, FieldType, Schema, StringFormat, ValidationError, ValidationErrors};
pub use validation::{validate_query, validate_update, ValidatedCollectionName, ValidatedFieldName};
pub use view::ComputedDocument;

// Driver types that appear in the public API
pub use bson;
pub use mongodb;
