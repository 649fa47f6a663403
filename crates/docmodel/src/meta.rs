//! Per-model collection configuration
//!
//! Every model describes its collection with a [`CollectionMeta`]. Metas compose
//! the way model hierarchies do: a base type publishes a fragment (no collection
//! name, shared indexes) and concrete models [`inherit`](CollectionMeta::inherit)
//! from it. Scalar settings on the child win; index lists, view pipelines and
//! the option keys listed in [`merge`](CollectionMeta::merge) are combined.

use std::collections::BTreeSet;

use bson::{Bson, Document as BsonDocument};
use docmodel_common::{OdmError, Result};
use mongodb::{
    options::{
        Collation, CollectionOptions, ReadConcern, ReadPreference, SelectionCriteria, WriteConcern,
    },
    IndexModel,
};

use crate::helpers::merge_values;
use crate::validation::ValidatedCollectionName;

/// Collection configuration for a model
#[derive(Debug, Clone, Default)]
pub struct CollectionMeta {
    /// Collection (or view) name; required for every concrete model
    pub collection: Option<String>,
    /// Indexes maintained by `ensure_indexes`
    pub indexes: Vec<IndexModel>,
    /// Defaults to the database's read concern
    pub read_concern: Option<ReadConcern>,
    /// Defaults to the database's write concern
    pub write_concern: Option<WriteConcern>,
    /// Defaults to the database's read preference
    pub selection_criteria: Option<SelectionCriteria>,
    /// View source collection
    pub source: Option<String>,
    /// View aggregation pipeline
    pub pipeline: Vec<BsonDocument>,
    /// View collation
    pub collation: Option<Collation>,
    /// Free-form model options, available to application code
    pub options: BsonDocument,
    /// Keys of `options` merged with the parent's value instead of replacing it
    pub merge: BTreeSet<String>,
}

impl CollectionMeta {
    /// Meta for a concrete model stored in `collection`
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..Default::default()
        }
    }

    /// Meta fragment for an abstract base (no collection of its own)
    pub fn fragment() -> Self {
        Self::default()
    }

    pub fn index(mut self, index: IndexModel) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.read_concern = Some(read_concern);
        self
    }

    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = Some(write_concern);
        self
    }

    pub fn read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.selection_criteria = Some(SelectionCriteria::ReadPreference(read_preference));
        self
    }

    /// Back this model by a view over `source`
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn stage(mut self, stage: BsonDocument) -> Self {
        self.pipeline.push(stage);
        self
    }

    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Set a model option
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Mark an option key as merged on inheritance
    pub fn merge_option(mut self, key: impl Into<String>) -> Self {
        self.merge.insert(key.into());
        self
    }

    /// Combine this (child) meta with the meta of its parent
    ///
    /// Merge keys accumulate transitively: a grandchild merges every key its
    /// ancestors declared.
    pub fn inherit(self, parent: &CollectionMeta) -> Result<Self> {
        let mut indexes = parent.indexes.clone();
        indexes.extend(self.indexes);

        let mut pipeline = parent.pipeline.clone();
        pipeline.extend(self.pipeline);

        let merge: BTreeSet<String> = parent.merge.union(&self.merge).cloned().collect();

        let mut options = parent.options.clone();
        for (key, value) in self.options {
            let merged = match parent.options.get(&key) {
                Some(inherited) if merge.contains(&key) => merge_values(inherited, &value)?,
                _ => value,
            };
            options.insert(key, merged);
        }

        Ok(Self {
            collection: self.collection.or_else(|| parent.collection.clone()),
            indexes,
            read_concern: self.read_concern.or_else(|| parent.read_concern.clone()),
            write_concern: self.write_concern.or_else(|| parent.write_concern.clone()),
            selection_criteria: self
                .selection_criteria
                .or_else(|| parent.selection_criteria.clone()),
            source: self.source.or_else(|| parent.source.clone()),
            pipeline,
            collation: self.collation.or_else(|| parent.collation.clone()),
            options,
            merge,
        })
    }

    /// The validated collection name, or an error naming the model
    pub fn collection_name(&self, model_name: &str) -> Result<ValidatedCollectionName> {
        match &self.collection {
            Some(name) => ValidatedCollectionName::new(name),
            None => Err(OdmError::Configuration(format!(
                "{} is not abstract and does not define a collection.",
                model_name
            ))),
        }
    }

    /// Driver options for the collection handle
    pub fn collection_options(&self) -> CollectionOptions {
        CollectionOptions::builder()
            .read_concern(self.read_concern.clone())
            .write_concern(self.write_concern.clone())
            .selection_criteria(self.selection_criteria.clone())
            .build()
    }
}
