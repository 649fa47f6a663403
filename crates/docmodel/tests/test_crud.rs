//! Integration tests for document CRUD operations.
//!
//! These tests require a MongoDB server.
//! Set MONGODB_URI (default mongodb://localhost:27017/docmodel_test) and run with --ignored.

mod common;

use docmodel::bson::{doc, oid::ObjectId};
use docmodel::mongodb::{
    options::{FindOptions, IndexOptions, ReturnDocument},
    Database, IndexModel,
};
use docmodel::{q, CollectionMeta, Document, FieldType, MongoDocument, OdmError, Query, Result, Schema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    age: i32,
    email: Option<String>,
}

impl User {
    fn new(name: &str, age: i32) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            age,
            email: Some(format!("{}@example.com", name.to_lowercase())),
        }
    }
}

impl MongoDocument for User {
    fn meta() -> CollectionMeta {
        CollectionMeta::new("users").index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
    }

    fn schema() -> Schema {
        Schema::new()
            .field("name", FieldType::string().min_length(1))
            .field("age", FieldType::int().minimum(0))
            .field("email", FieldType::email())
    }

    fn db() -> Result<Database> {
        common::test_db()
    }
}

impl Document for User {
    fn id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Post {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    title: String,
}

impl MongoDocument for Post {
    fn meta() -> CollectionMeta {
        CollectionMeta::new("posts")
    }

    fn db() -> Result<Database> {
        common::test_db()
    }
}

impl Document for Post {
    fn id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }
}

#[tokio::test]
#[ignore] // Only run with --ignored flag when database is available
async fn test_insert_and_find_by_id() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("insert_find").await?;

    let mut user = User::new("Alice", 30);
    assert!(user.insert().await?);
    let id = user.id.expect("insert assigns an id");

    let found = User::find_by_id(id).await?.expect("User should exist");
    assert_eq!(found, user);

    common::teardown(&conn).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_models_use_declared_collections() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("collections").await?;

    User::new("Bob", 41).insert().await?;
    Post { id: None, title: "Hello".to_string() }.insert().await?;

    let mut names = conn.list_collection_names().await?;
    names.sort();
    assert_eq!(names, vec!["posts".to_string(), "users".to_string()]);
    assert_eq!(User::estimated_document_count().await?, 1);
    assert_eq!(Post::estimated_document_count().await?, 1);

    common::teardown(&conn).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_missing_required_field_is_not_written() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("missing_field").await?;

    let mut user = User {
        email: None,
        ..User::new("Carol", 25)
    };
    let err = user.insert().await.unwrap_err();
    assert!(matches!(err, OdmError::Validation(_)));
    assert!(err.to_string().contains("email"));
    assert!(user.id.is_none());
    assert_eq!(User::count_documents(doc! {}).await?, 0);

    common::teardown(&conn).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_delete_then_find_returns_none() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("delete").await?;

    let mut user = User::new("Dave", 52);
    user.insert().await?;
    let id = user.id.expect("insert assigns an id");

    assert!(user.delete().await?);
    assert!(User::find_by_id(id).await?.is_none());
    assert!(!user.delete().await?);
    assert!(!User::delete_by_id(id).await?);

    common::teardown(&conn).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_insert_many_and_queries() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("insert_many").await?;

    let mut users = vec![User::new("Eve", 20), User::new("Frank", 35), User::new("Grace", 48)];
    User::insert_many(&mut users).await?;
    assert!(users.iter().all(|u| u.id.is_some()));

    let stored = User::find_all().await?;
    assert_eq!(stored.len(), 3);

    let older = q!(age__gte = 30)?.into_document();
    assert_eq!(User::count_documents(older.clone()).await?, 2);

    let options = FindOptions::builder().sort(doc! { "age": -1 }).limit(1_i64).build();
    let oldest = User::to_list(User::find_with_options(older, Some(options)).await?).await?;
    assert_eq!(oldest.len(), 1);
    assert_eq!(oldest[0].name, "Grace");

    let by_ids = Query::ids(users.iter().filter_map(|u| u.id).take(2)).into_document();
    assert_eq!(User::count_documents(by_ids).await?, 2);

    assert_eq!(User::delete_many(&users[..2]).await?, 2);
    assert_eq!(User::count_documents(doc! {}).await?, 1);

    common::teardown(&conn).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_save_and_reload() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("save_reload").await?;

    // Without an id, save inserts
    let mut user = User::new("Heidi", 28);
    assert!(user.save(true).await?);
    let id = user.id.expect("save assigns an id");

    user.age = 29;
    assert!(user.save(true).await?);
    // Nothing changed
    assert!(!user.save(true).await?);

    let mut copy = User::find_by_id(id).await?.expect("User should exist");
    User::update_one(doc! { "_id": id }, doc! { "$set": { "age": 30 } }).await?;
    assert!(copy.reload().await?);
    assert_eq!(copy.age, 30);

    // Upsert with a preset id
    let mut fresh = User {
        id: Some(ObjectId::new()),
        ..User::new("Ivan", 60)
    };
    assert!(!fresh.clone().save(false).await?);
    assert!(fresh.save(true).await?);
    assert_eq!(User::count_documents(doc! {}).await?, 2);

    copy.delete().await?;
    assert!(!copy.reload().await?);

    common::teardown(&conn).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_duplicate_key_insert_returns_false() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("duplicate").await?;
    User::ensure_indexes(true).await?;

    assert!(User::new("Judy", 33).insert().await?);
    let mut twin = User::new("Judy", 34);
    assert!(!twin.insert().await?);
    assert!(twin.id.is_none());

    common::teardown(&conn).await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_find_one_and_modify() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let conn = common::setup("find_and_modify").await?;

    let mut user = User::new("Karl", 40);
    user.insert().await?;
    let id = user.id.expect("insert assigns an id");

    let before = User::find_one_and_update(
        doc! { "_id": id },
        doc! { "$inc": { "age": 1 } },
        ReturnDocument::Before,
    )
    .await?
    .expect("User should exist");
    assert_eq!(before.age, 40);

    // The replacement carries no id; the stored one is written back into it
    let mut replacement = User {
        id: None,
        age: 50,
        ..user.clone()
    };
    let after = User::find_one_and_replace(doc! { "_id": id }, &mut replacement, ReturnDocument::After)
        .await?
        .expect("User should exist");
    assert_eq!(after.age, 50);
    assert_eq!(replacement, after);
    assert_eq!(replacement.id, Some(id));

    let mut older = User { age: 51, ..after.clone() };
    let previous = User::find_one_and_replace(doc! { "_id": id }, &mut older, ReturnDocument::Before)
        .await?
        .expect("User should exist");
    assert_eq!(previous.age, 50);
    assert_eq!(older.age, 51);

    let deleted = User::find_one_and_delete(doc! { "name": "Karl" })
        .await?
        .expect("User should exist");
    assert_eq!(deleted.id, Some(id));
    assert!(User::find_one(doc! { "name": "Karl" }).await?.is_none());

    common::teardown(&conn).await?;
    Ok(())
}
