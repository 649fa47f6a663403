//! Integration tests for view-backed models.
//!
//! These tests require a MongoDB server.
//! Set MONGODB_URI (default mongodb://localhost:27017/docmodel_test) and run with --ignored.

mod common;

use docmodel::bson::doc;
use docmodel::mongodb::Database;
use docmodel::{CollectionMeta, ComputedDocument, MongoDocument, OdmError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct AdultNames {
    name: String,
}

impl MongoDocument for AdultNames {
    fn meta() -> CollectionMeta {
        CollectionMeta::new("adult_names")
            .source("people")
            .stage(doc! { "$match": { "age": { "$gte": 18 } } })
            .stage(doc! { "$project": { "_id": 0, "name": 1 } })
    }

    fn db() -> Result<Database> {
        common::test_db()
    }
}

impl ComputedDocument for AdultNames {}

async fn seed_people(conn: &docmodel::Connection) -> Result<()> {
    conn.get_collection("people")
        .insert_many(vec![
            doc! { "name": "Ann", "age": 34 },
            doc! { "name": "Ben", "age": 12 },
            doc! { "name": "Cid", "age": 18 },
        ])
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore] // Only run with --ignored flag when database is available
async fn test_view_is_created_and_queried() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("view_create").await?;
    seed_people(&conn).await?;

    AdultNames::ensure_collection(false).await?;
    // Identical view is left in place
    AdultNames::ensure_collection(false).await?;

    let mut names: Vec<String> = AdultNames::find_all().await?.into_iter().map(|a| a.name).collect();
    names.sort();
    assert_eq!(names, vec!["Ann".to_string(), "Cid".to_string()]);

    common::teardown(&conn).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_existing_collection_requires_force() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("view_force").await?;
    seed_people(&conn).await?;
    conn.get_collection("adult_names").insert_one(doc! { "name": "stale" }).await?;

    let err = AdultNames::ensure_collection(false).await.unwrap_err();
    assert!(matches!(err, OdmError::Configuration(_)));

    AdultNames::ensure_collection(true).await?;
    assert_eq!(AdultNames::count_documents(doc! {}).await?, 2);

    common::teardown(&conn).await?;
    Ok(())
}
