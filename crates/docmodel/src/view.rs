//! Read-only models backed by a MongoDB view
//!
//! A computed document declares a `source` collection and an aggregation
//! pipeline in its [`CollectionMeta`](crate::CollectionMeta). The view itself is
//! created with [`ComputedDocument::ensure_collection`]; reads go through the
//! usual [`MongoDocument`] operations.

use async_trait::async_trait;
use bson::Document as BsonDocument;
use docmodel_common::{OdmError, Result};
use futures::TryStreamExt;
use mongodb::{
    options::CreateCollectionOptions,
    results::{CollectionSpecification, CollectionType},
};
use tracing::{info, instrument};

use crate::config::get_config;
use crate::document::MongoDocument;
use crate::helpers::equal_views;
use crate::validation::{validate_query, ValidatedCollectionName};

#[async_trait]
pub trait ComputedDocument: MongoDocument {
    /// Collection the view reads from
    fn source() -> Result<ValidatedCollectionName> {
        match Self::meta().source {
            Some(source) => ValidatedCollectionName::new(&source),
            None => Err(OdmError::Configuration(format!(
                "{} does not define a source view.",
                Self::model_name()
            ))),
        }
    }

    /// Create the view, replacing an outdated one
    ///
    /// A regular collection with the view's name is dropped when `force` is set
    /// and is an error otherwise.
    #[instrument(fields(model = Self::model_name()))]
    async fn ensure_collection(force: bool) -> Result<()> {
        let meta = Self::meta();
        let name = meta.collection_name(Self::model_name())?;
        let source = Self::source()?;
        if get_config().validate_queries {
            meta.pipeline.iter().try_for_each(validate_query)?;
        }

        let db = Self::db()?;
        let collections: Vec<CollectionSpecification> =
            db.list_collections().await?.try_collect().await?;

        if let Some(existing) = collections.iter().find(|c| c.name == name.as_str()) {
            match existing.collection_type {
                CollectionType::View => {
                    if equal_views(name.as_str(), source.as_str(), &meta.pipeline, existing) {
                        return Ok(());
                    }
                    info!(view = %name, "Replacing outdated view");
                }
                _ if force => info!(collection = %name, "Dropping collection to make room for view"),
                _ => {
                    return Err(OdmError::Configuration(format!(
                        "Collection {} does already exist.",
                        name
                    )))
                }
            }
            db.collection::<BsonDocument>(name.as_str()).drop().await?;
        }

        let options = CreateCollectionOptions::builder()
            .view_on(source.into_string())
            .pipeline(meta.pipeline.clone())
            .collation(meta.collation.clone())
            .write_concern(meta.write_concern.clone())
            .build();
        db.create_collection(name.as_str()).with_options(options).await?;
        info!(view = %name, "Created view");
        Ok(())
    }
}
