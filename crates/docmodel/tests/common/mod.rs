//! Shared setup for integration tests.
//!
//! Each test gets its own database so tests can run in parallel. Models used in
//! tests resolve their database through `test_db` instead of the global binding.

#![allow(dead_code)]

use std::cell::RefCell;

use docmodel::mongodb::Database;
use docmodel::{Connection, OdmError, Result};

pub const DEFAULT_URI: &str = "mongodb://localhost:27017/docmodel_test";

thread_local! {
    // #[tokio::test] runs on a current-thread runtime, one thread per test
    static TEST_DB: RefCell<Option<Database>> = const { RefCell::new(None) };
}

pub fn mongodb_uri() -> String {
    std::env::var("MONGODB_URI").unwrap_or_else(|_| DEFAULT_URI.to_string())
}

/// Connect and select a fresh database named after the test
pub async fn setup(test_name: &str) -> Result<Connection> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("docmodel=debug")
        .with_test_writer()
        .try_init();

    let base = Connection::new(&mongodb_uri()).await?;
    let conn = base.with_database(&format!("{}_{}", base.database_name(), test_name));
    conn.drop_database().await?;

    TEST_DB.with(|db| *db.borrow_mut() = Some(conn.database().clone()));
    Ok(conn)
}

pub fn test_db() -> Result<Database> {
    TEST_DB
        .with(|db| db.borrow().clone())
        .ok_or_else(|| OdmError::Connection("Test database not set up".to_string()))
}

pub async fn teardown(conn: &Connection) -> Result<()> {
    TEST_DB.with(|db| *db.borrow_mut() = None);
    conn.drop_database().await
}
