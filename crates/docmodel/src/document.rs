//! Model traits
//!
//! [`MongoDocument`] binds a serde type to a collection and provides the read
//! side. [`Document`] adds an `_id` and the write side. Every write serializes
//! the model and checks it against [`MongoDocument::schema`] before the driver
//! is called.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document as BsonDocument};
use docmodel_common::{OdmError, Result};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use mongodb::{
    options::{FindOneAndReplaceOptions, FindOneAndUpdateOptions, FindOptions, ReplaceOptions, ReturnDocument},
    results::UpdateResult,
    Collection, Database,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crate::config::get_config;
use crate::connection;
use crate::index::IndexManager;
use crate::meta::CollectionMeta;
use crate::schema::Schema;
use crate::validation::{validate_query, validate_update, ValidatedCollectionName};

/// Stream of models decoded from a cursor
pub type DocumentStream<T> = BoxStream<'static, Result<T>>;

/// A model stored in (or read from) a MongoDB collection
///
/// # Example
///
/// ```ignore
/// use docmodel::{CollectionMeta, MongoDocument};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Order {
///     total: f64,
/// }
///
/// impl MongoDocument for Order {
///     fn meta() -> CollectionMeta {
///         CollectionMeta::new("orders")
///     }
/// }
///
/// let big = Order::count_documents(doc! { "total": { "$gt": 100.0 } }).await?;
/// ```
#[async_trait]
pub trait MongoDocument: Serialize + DeserializeOwned + Send + Sync + Sized + 'static {
    /// Collection configuration of this model
    fn meta() -> CollectionMeta;

    /// Type name used in error messages
    fn model_name() -> &'static str {
        let name = std::any::type_name::<Self>();
        // `a::Wrapper<b::Inner>` names the model `Wrapper`
        let path = name.split('<').next().unwrap_or(name);
        path.rsplit("::").next().unwrap_or(path)
    }

    /// Field rules checked before writes and after reads (empty by default)
    fn schema() -> Schema {
        Schema::new()
    }

    /// Database holding the collection; the globally bound one by default
    fn db() -> Result<Database> {
        connection::database()
    }

    fn collection_name() -> Result<ValidatedCollectionName> {
        Self::meta().collection_name(Self::model_name())
    }

    /// Collection handle configured with the model's concerns and read preference
    fn collection() -> Result<Collection<BsonDocument>> {
        let meta = Self::meta();
        let name = meta.collection_name(Self::model_name())?;
        Ok(Self::db()?.collection_with_options(name.as_str(), meta.collection_options()))
    }

    fn to_bson(&self) -> Result<BsonDocument> {
        Ok(bson::to_document(self)?)
    }

    /// Decode a raw document, checking it against the schema first
    fn from_bson(document: BsonDocument) -> Result<Self> {
        Self::schema().check(&document)?;
        Ok(bson::from_document(document)?)
    }

    fn validate(&self) -> Result<()> {
        Self::schema().check(&self.to_bson()?)
    }

    async fn find(filter: BsonDocument) -> Result<DocumentStream<Self>> {
        Self::find_with_options(filter, None).await
    }

    /// Stream matching documents; sort, skip, limit and projection go in `options`
    #[instrument(skip(filter, options), fields(model = Self::model_name()))]
    async fn find_with_options(
        filter: BsonDocument,
        options: Option<FindOptions>,
    ) -> Result<DocumentStream<Self>> {
        let filter = checked_filter(filter)?;
        let cursor = Self::collection()?.find(filter).with_options(options).await?;

        Ok(cursor
            .map(|document| document.map_err(OdmError::from).and_then(Self::from_bson))
            .boxed())
    }

    async fn find_all() -> Result<Vec<Self>> {
        Self::to_list(Self::find(doc! {}).await?).await
    }

    /// Drain a stream into a vector, stopping at the first error
    async fn to_list(stream: DocumentStream<Self>) -> Result<Vec<Self>> {
        stream.try_collect().await
    }

    #[instrument(skip(filter), fields(model = Self::model_name()))]
    async fn find_one(filter: BsonDocument) -> Result<Option<Self>> {
        let filter = checked_filter(filter)?;
        match Self::collection()?.find_one(filter).await? {
            Some(document) => Ok(Some(Self::from_bson(document)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(filter), fields(model = Self::model_name()))]
    async fn count_documents(filter: BsonDocument) -> Result<u64> {
        let filter = checked_filter(filter)?;
        Ok(Self::collection()?.count_documents(filter).await?)
    }

    /// Count from collection metadata, without a filter
    async fn estimated_document_count() -> Result<u64> {
        Ok(Self::collection()?.estimated_document_count().await?)
    }
}

/// A writable model with an ObjectId `_id`
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     id: Option<ObjectId>,
///     name: String,
/// }
///
/// impl Document for User {
///     fn id(&self) -> Option<ObjectId> {
///         self.id
///     }
///
///     fn set_id(&mut self, id: ObjectId) {
///         self.id = Some(id);
///     }
/// }
/// ```
#[async_trait]
pub trait Document: MongoDocument {
    fn id(&self) -> Option<ObjectId>;

    fn set_id(&mut self, id: ObjectId);

    /// The document as written to MongoDB; a null `_id` is left out
    fn mongo(&self) -> Result<BsonDocument> {
        self.mongo_with(&[], &[])
    }

    /// Like [`mongo`](Self::mongo), keeping only `include` (when non-empty)
    /// and dropping `exclude`
    fn mongo_with(&self, include: &[&str], exclude: &[&str]) -> Result<BsonDocument> {
        let document = self.to_bson()?;
        Ok(document
            .into_iter()
            .filter(|(key, value)| !(key == "_id" && matches!(value, Bson::Null)))
            .filter(|(key, _)| include.is_empty() || include.contains(&key.as_str()))
            .filter(|(key, _)| !exclude.contains(&key.as_str()))
            .collect())
    }

    /// Insert the document and store the id it was given
    ///
    /// Returns `false` if a document with the same unique key already exists.
    #[instrument(skip(self), fields(model = Self::model_name()))]
    async fn insert(&mut self) -> Result<bool> {
        let document = self.mongo()?;
        Self::schema().check(&document)?;

        match Self::collection()?.insert_one(document).await {
            Ok(result) => {
                if let Bson::ObjectId(id) = result.inserted_id {
                    self.set_id(id);
                }
                debug!(id = ?self.id(), "Inserted document");
                Ok(true)
            }
            Err(err) => {
                let err = OdmError::from(err);
                if err.is_duplicate_key() {
                    debug!(error = %err, "Insert rejected as duplicate");
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Insert several documents in one call; ids are assigned in order
    #[instrument(skip(objects), fields(model = Self::model_name(), count = objects.len()))]
    async fn insert_many(objects: &mut [Self]) -> Result<()> {
        let schema = Self::schema();
        let documents = objects
            .iter()
            .map(|object| {
                let document = object.mongo()?;
                schema.check(&document)?;
                Ok(document)
            })
            .collect::<Result<Vec<_>>>()?;

        if documents.is_empty() {
            return Ok(());
        }

        let result = Self::collection()?.insert_many(documents).await?;
        for (index, id) in result.inserted_ids {
            if let (Some(object), Bson::ObjectId(id)) = (objects.get_mut(index), id) {
                object.set_id(id);
            }
        }
        Ok(())
    }

    /// Replace the stored document by `_id`, inserting it when `upsert` is set
    ///
    /// A document without an id is inserted (or skipped without `upsert`).
    /// Returns true if a document was inserted or modified.
    #[instrument(skip(self), fields(model = Self::model_name()))]
    async fn save(&mut self, upsert: bool) -> Result<bool> {
        let document = self.mongo()?;
        Self::schema().check(&document)?;

        let Some(id) = self.id() else {
            return if upsert { self.insert().await } else { Ok(false) };
        };

        let result = Self::collection()?
            .replace_one(doc! { "_id": id }, document)
            .with_options(ReplaceOptions::builder().upsert(upsert).build())
            .await?;

        if let Some(Bson::ObjectId(upserted)) = &result.upserted_id {
            self.set_id(*upserted);
        }
        debug!(
            matched = result.matched_count,
            modified = result.modified_count,
            "Saved document"
        );
        Ok(result.upserted_id.is_some() || result.modified_count > 0)
    }

    /// Refresh every field from the database
    ///
    /// Returns `false` (leaving `self` untouched) if the document is gone.
    #[instrument(skip(self), fields(model = Self::model_name()))]
    async fn reload(&mut self) -> Result<bool> {
        let id = self.id().ok_or_else(|| {
            OdmError::Query(format!("Cannot reload a {} without an _id", Self::model_name()))
        })?;

        match Self::collection()?.find_one(doc! { "_id": id }).await? {
            Some(document) => {
                *self = Self::from_bson(document)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete this document by `_id`, or by its full contents when it has none
    #[instrument(skip(self), fields(model = Self::model_name()))]
    async fn delete(&self) -> Result<bool> {
        let filter = match self.id() {
            Some(id) => doc! { "_id": id },
            None => self.mongo()?,
        };
        let result = Self::collection()?.delete_one(filter).await?;
        Ok(result.deleted_count == 1)
    }

    /// Delete the given documents by `_id`, returning how many were removed
    #[instrument(skip(objects), fields(model = Self::model_name(), count = objects.len()))]
    async fn delete_many(objects: &[Self]) -> Result<u64> {
        let ids: Vec<ObjectId> = objects.iter().filter_map(|object| object.id()).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let result = Self::collection()?
            .delete_many(doc! { "_id": { "$in": ids } })
            .await?;
        Ok(result.deleted_count)
    }

    async fn delete_by_id(id: ObjectId) -> Result<bool> {
        let result = Self::collection()?.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count == 1)
    }

    async fn find_by_id(id: ObjectId) -> Result<Option<Self>> {
        Self::find_one(doc! { "_id": id }).await
    }

    #[instrument(skip(filter), fields(model = Self::model_name()))]
    async fn find_one_and_delete(filter: BsonDocument) -> Result<Option<Self>> {
        let filter = checked_filter(filter)?;
        match Self::collection()?.find_one_and_delete(filter).await? {
            Some(document) => Ok(Some(Self::from_bson(document)?)),
            None => Ok(None),
        }
    }

    /// Replace the first match with `replacement`, returning the document from
    /// before or after the change
    ///
    /// With [`ReturnDocument::After`] the stored document is also written back
    /// into `replacement`, so it picks up the matched `_id`.
    #[instrument(skip(filter, replacement), fields(model = Self::model_name()))]
    async fn find_one_and_replace(
        filter: BsonDocument,
        replacement: &mut Self,
        return_document: ReturnDocument,
    ) -> Result<Option<Self>> {
        let filter = checked_filter(filter)?;
        let document = replacement.mongo()?;
        Self::schema().check(&document)?;

        let refresh = matches!(return_document, ReturnDocument::After);
        let options = FindOneAndReplaceOptions::builder()
            .return_document(return_document)
            .build();
        let Some(stored) = Self::collection()?
            .find_one_and_replace(filter, document)
            .with_options(options)
            .await?
        else {
            return Ok(None);
        };

        if refresh {
            *replacement = Self::from_bson(stored.clone())?;
        }
        Ok(Some(Self::from_bson(stored)?))
    }

    /// Apply an operator update to the first match
    #[instrument(skip(filter, update), fields(model = Self::model_name()))]
    async fn find_one_and_update(
        filter: BsonDocument,
        update: BsonDocument,
        return_document: ReturnDocument,
    ) -> Result<Option<Self>> {
        let filter = checked_filter(filter)?;
        validate_update(&update)?;

        let options = FindOneAndUpdateOptions::builder()
            .return_document(return_document)
            .build();
        match Self::collection()?
            .find_one_and_update(filter, update)
            .with_options(options)
            .await?
        {
            Some(document) => Ok(Some(Self::from_bson(document)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(filter, update), fields(model = Self::model_name()))]
    async fn update_one(filter: BsonDocument, update: BsonDocument) -> Result<UpdateResult> {
        let filter = checked_filter(filter)?;
        validate_update(&update)?;
        Ok(Self::collection()?.update_one(filter, update).await?)
    }

    #[instrument(skip(filter, update), fields(model = Self::model_name()))]
    async fn update_many(filter: BsonDocument, update: BsonDocument) -> Result<UpdateResult> {
        let filter = checked_filter(filter)?;
        validate_update(&update)?;
        Ok(Self::collection()?.update_many(filter, update).await?)
    }

    /// Reconcile the collection's indexes with `meta().indexes`
    ///
    /// With `drop`, indexes that are not declared are removed.
    async fn ensure_indexes(drop: bool) -> Result<()> {
        let indexes = Self::meta().indexes;
        IndexManager::new(Self::collection()?)
            .ensure_indexes(&indexes, drop)
            .await
    }
}

fn checked_filter(filter: BsonDocument) -> Result<BsonDocument> {
    if get_config().validate_queries {
        validate_query(&filter)?;
    }
    Ok(filter)
}
