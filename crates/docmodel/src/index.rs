//! Index reconciliation
//!
//! [`IndexManager`] compares the indexes declared for a model with the ones on
//! the server. Unchanged indexes are left alone, changed ones are dropped and
//! recreated, and missing ones are created in a single call.

use std::collections::BTreeMap;

use bson::Document as BsonDocument;
use docmodel_common::Result;
use futures::TryStreamExt;
use mongodb::{error::ErrorKind, Collection, IndexModel};
use tracing::{debug, info, instrument};

use crate::helpers::{default_index_name, equal_indexes, equal_keys};

/// Server error code for a missing collection
const NAMESPACE_NOT_FOUND: i32 = 26;

/// Name of the index MongoDB maintains on `_id`
const ID_INDEX: &str = "_id_";

/// Changes needed to bring a collection in line with its declared indexes
#[derive(Debug, Clone, Default)]
pub struct IndexPlan {
    /// Existing indexes whose options changed; dropped before creation
    pub replace: Vec<String>,
    /// Indexes to create
    pub create: Vec<IndexModel>,
    /// Undeclared indexes dropped after creation
    pub remove: Vec<String>,
}

impl IndexPlan {
    pub fn is_empty(&self) -> bool {
        self.replace.is_empty() && self.create.is_empty() && self.remove.is_empty()
    }
}

/// Brings the indexes of one collection into a declared state
pub struct IndexManager {
    collection: Collection<BsonDocument>,
    db_indexes: Option<BTreeMap<String, IndexModel>>,
}

impl IndexManager {
    pub fn new(collection: Collection<BsonDocument>) -> Self {
        Self {
            collection,
            db_indexes: None,
        }
    }

    /// Load the existing indexes (except `_id_`) from the server
    ///
    /// A collection that does not exist yet has no indexes.
    pub async fn load_db_indexes(&mut self) -> Result<()> {
        let indexes: Vec<IndexModel> = match self.collection.list_indexes().await {
            Ok(cursor) => cursor.try_collect().await?,
            Err(err) => match err.kind.as_ref() {
                ErrorKind::Command(command) if command.code == NAMESPACE_NOT_FOUND => Vec::new(),
                _ => return Err(err.into()),
            },
        };

        self.db_indexes = Some(
            indexes
                .into_iter()
                .map(|index| (index_name(&index), index))
                .filter(|(name, _)| name != ID_INDEX)
                .collect(),
        );
        Ok(())
    }

    /// The loaded index with the given keys
    ///
    /// Returns `None` when nothing matches or [`load_db_indexes`](Self::load_db_indexes)
    /// has not been called.
    pub fn get_db_index(&self, keys: &BsonDocument) -> Option<&IndexModel> {
        self.db_indexes
            .as_ref()?
            .values()
            .find(|index| equal_keys(&index.keys, keys))
    }

    /// Make the collection's indexes match `indexes`
    ///
    /// With `drop`, existing indexes that are not declared are removed.
    #[instrument(skip(self, indexes), fields(collection = %self.collection.name(), declared = indexes.len()))]
    pub async fn ensure_indexes(&mut self, indexes: &[IndexModel], drop: bool) -> Result<()> {
        self.load_db_indexes().await?;
        let plan = plan_indexes(indexes, self.db_indexes.clone().unwrap_or_default(), drop);

        if plan.is_empty() {
            debug!("Indexes up to date");
            return Ok(());
        }

        for name in &plan.replace {
            info!(index = %name, "Dropping changed index");
            self.collection.drop_index(name.as_str()).await?;
        }

        if !plan.create.is_empty() {
            info!(count = plan.create.len(), "Creating indexes");
            self.collection.create_indexes(plan.create).await?;
        }

        for name in &plan.remove {
            info!(index = %name, "Dropping undeclared index");
            self.collection.drop_index(name.as_str()).await?;
        }

        self.db_indexes = None;
        Ok(())
    }
}

/// Compute the changes from `existing` (keyed by name) to `declared`
pub fn plan_indexes(
    declared: &[IndexModel],
    mut existing: BTreeMap<String, IndexModel>,
    drop: bool,
) -> IndexPlan {
    let mut plan = IndexPlan::default();

    for index in declared {
        let matching = existing
            .iter()
            .find(|(_, db_index)| equal_keys(&db_index.keys, &index.keys))
            .map(|(name, db_index)| (name.clone(), equal_indexes(index, db_index)));

        match matching {
            None => plan.create.push(index.clone()),
            Some((name, true)) => {
                existing.remove(&name);
            }
            Some((name, false)) => {
                existing.remove(&name);
                plan.replace.push(name);
                plan.create.push(index.clone());
            }
        }
    }

    if drop {
        plan.remove = existing.into_keys().collect();
    }
    plan
}

fn index_name(index: &IndexModel) -> String {
    index
        .options
        .as_ref()
        .and_then(|options| options.name.clone())
        .unwrap_or_else(|| default_index_name(&index.keys))
}
