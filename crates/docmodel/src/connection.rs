//! MongoDB connection management and the process-wide database binding
//!
//! Models do not carry a database handle. They resolve it through the global
//! binding set up once with [`init`], [`bind`] or [`bind_client`].

use bson::{doc, Document as BsonDocument};
use docmodel_common::{OdmError, Result};
use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Environment variable holding the connection string
pub const MONGODB_URI_ENV: &str = "MONGODB_URI";

/// Environment variable overriding the database named in the connection string
pub const MONGODB_DATABASE_ENV: &str = "MONGODB_DATABASE";

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: Some(0),
            max_pool_size: Some(10),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("docmodel".to_string()),
        }
    }
}

impl PoolConfig {
    fn apply(self, client_options: &mut ClientOptions) {
        if let Some(min) = self.min_pool_size {
            client_options.min_pool_size = Some(min);
        }
        if let Some(max) = self.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = self.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(connect) = self.connect_timeout {
            client_options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = self.server_selection_timeout {
            client_options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = self.app_name {
            client_options.app_name = Some(app);
        }
    }
}

/// MongoDB connection: a pooled client plus the database models read and write
#[derive(Debug, Clone)]
pub struct Connection {
    client: Client,
    database: Database,
}

impl Connection {
    /// Create a new MongoDB connection with default pool settings
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_config(connection_string, PoolConfig::default()).await
    }

    /// Create a new MongoDB connection with custom pool configuration
    ///
    /// The connection string must name a default database.
    pub async fn with_config(connection_string: &str, config: PoolConfig) -> Result<Self> {
        let mut client_options = ClientOptions::parse(connection_string).await?;
        config.apply(&mut client_options);

        // Stable API keeps server behaviour pinned across upgrades
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)?;

        let database = client.default_database().ok_or_else(|| {
            OdmError::Connection("No default database specified in connection string".to_string())
        })?;

        Ok(Self { client, database })
    }

    /// Create a connection from `MONGODB_URI` (and `MONGODB_DATABASE`), reading `.env` first
    pub async fn from_env() -> Result<Self> {
        // A missing .env file is not an error
        let _ = dotenvy::dotenv();

        let uri = std::env::var(MONGODB_URI_ENV)
            .map_err(|_| OdmError::Configuration(format!("{} is not set", MONGODB_URI_ENV)))?;
        let connection = Self::new(&uri).await?;

        match std::env::var(MONGODB_DATABASE_ENV) {
            Ok(name) if !name.is_empty() => Ok(connection.with_database(&name)),
            _ => Ok(connection),
        }
    }

    /// Wrap an existing client and one of its databases
    pub fn from_database(client: Client, database: Database) -> Self {
        Self { client, database }
    }

    /// Same client, different database
    pub fn with_database(&self, name: &str) -> Self {
        Self {
            client: self.client.clone(),
            database: self.client.database(name),
        }
    }

    /// Get a reference to the database
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the database name
    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    /// Get a reference to the client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get a collection by name (returns untyped BsonDocument collection)
    pub fn get_collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }

    /// Check if the connection is healthy by pinging the server
    #[instrument(skip(self), fields(database = %self.database_name()))]
    pub async fn ping(&self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.database.run_command(doc! { "ping": 1 })).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(OdmError::Connection(format!("Ping failed: {}", e))),
            Err(_) => Err(OdmError::Timeout(format!("Ping did not complete within {:?}", timeout))),
        }
    }

    /// List all collection names in the current database
    pub async fn list_collection_names(&self) -> Result<Vec<String>> {
        let names = self.database.list_collection_names().await?;
        Ok(names)
    }

    /// Drop the current database (use with caution!)
    #[instrument(skip(self), fields(database = %self.database_name()))]
    pub async fn drop_database(&self) -> Result<()> {
        self.database.drop().await?;
        Ok(())
    }
}

// Global connection instance
static CONNECTION: RwLock<Option<Arc<Connection>>> = parking_lot::const_rwlock(None);

/// Connect to `connection_string` and bind the result globally
///
/// Fails if a connection is already bound; call [`close`] first to rebind.
pub async fn init(connection_string: &str) -> Result<()> {
    let conn = Connection::new(connection_string).await?;
    bind(conn)
}

/// Bind an existing connection globally
pub fn bind(conn: Connection) -> Result<()> {
    let mut slot = CONNECTION.write();
    if slot.is_some() {
        return Err(OdmError::Connection(
            "MongoDB already initialized. Call close() first to reinitialize.".to_string(),
        ));
    }
    info!(database = conn.database_name(), "Bound MongoDB connection");
    *slot = Some(Arc::new(conn));
    Ok(())
}

/// Bind a database of an existing driver client globally
pub fn bind_client(client: &Client, database_name: &str) -> Result<()> {
    bind(Connection::from_database(client.clone(), client.database(database_name)))
}

/// Get the bound connection
pub fn connection() -> Result<Arc<Connection>> {
    CONNECTION.read().clone().ok_or_else(|| {
        OdmError::Connection("MongoDB not initialized. Call init() first.".to_string())
    })
}

/// Get the bound database
pub fn database() -> Result<Database> {
    Ok(connection()?.database().clone())
}

/// Get connection status
pub fn is_connected() -> bool {
    CONNECTION.read().is_some()
}

/// Release the bound connection so that [`init`] can be called again
pub fn close() -> Result<()> {
    let conn = CONNECTION
        .write()
        .take()
        .ok_or_else(|| OdmError::Connection("No active connection to close".to_string()))?;

    // The pool is released once the last handle to the client is dropped
    info!(database = conn.database_name(), "Closed MongoDB connection");
    drop(conn);
    Ok(())
}

/// Clear the binding whether or not one exists
pub fn reset() {
    *CONNECTION.write() = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_pool_size, Some(0));
        assert_eq!(config.max_pool_size, Some(10));
        assert_eq!(config.app_name, Some("docmodel".to_string()));
    }

    #[test]
    fn test_pool_config_applies_to_client_options() {
        let mut options = ClientOptions::default();
        let config = PoolConfig {
            min_pool_size: Some(2),
            max_pool_size: Some(50),
            max_idle_time: Some(Duration::from_secs(300)),
            connect_timeout: Some(Duration::from_secs(5)),
            server_selection_timeout: None,
            app_name: Some("my-app".to_string()),
        };
        config.apply(&mut options);

        assert_eq!(options.min_pool_size, Some(2));
        assert_eq!(options.max_pool_size, Some(50));
        assert_eq!(options.max_idle_time, Some(Duration::from_secs(300)));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.server_selection_timeout, None);
        assert_eq!(options.app_name.as_deref(), Some("my-app"));
    }

    #[tokio::test]
    async fn test_connection_requires_default_database() {
        let result = Connection::new("mongodb://localhost:27017").await;
        assert!(matches!(result, Err(OdmError::Connection(_))));
    }

    #[tokio::test]
    async fn test_with_database_switches_name() {
        let conn = Connection::new("mongodb://localhost:27017/first").await.unwrap();
        assert_eq!(conn.database_name(), "first");
        assert_eq!(conn.with_database("second").database_name(), "second");
    }
}
