//! MongoDB connection establishment with pool configuration

use bson::doc;
use docbridge_common::{DocBridgeError, Result};
use mongodb::{options::ClientOptions, Client, Database};
use std::time::Duration;

/// Connection pool configuration handed to the driver
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool (driver default: 0)
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool (default: 20)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed
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
            min_pool_size: None,
            max_pool_size: Some(20),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("docbridge".to_string()),
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
        // An app name embedded in the URL wins over the default one.
        if client_options.app_name.is_none() {
            client_options.app_name = self.app_name;
        }
    }
}

/// An established session bound to one database
#[derive(Clone)]
pub struct Connection {
    database: Database,
}

impl Connection {
    /// Open a connection to `connection_string` and select `database_name`
    ///
    /// The server is pinged before returning so that an unreachable server
    /// surfaces here rather than on the first operation.
    pub async fn connect(connection_string: &str, database_name: &str, config: PoolConfig) -> Result<Self> {
        if database_name.trim().is_empty() {
            return Err(DocBridgeError::Configuration(
                "Database name cannot be empty".to_string(),
            ));
        }

        let mut client_options = ClientOptions::parse(connection_string)
            .await
            .map_err(|e| DocBridgeError::Connection(e.to_string()))?;
        config.apply(&mut client_options);

        let client = Client::with_options(client_options)
            .map_err(|e| DocBridgeError::Connection(e.to_string()))?;
        let database = client.database(database_name);

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DocBridgeError::Connection(format!("Ping failed: {}", e)))?;

        Ok(Self { database })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_pool_size, None);
        assert_eq!(config.max_pool_size, Some(20));
        assert_eq!(config.app_name, Some("docbridge".to_string()));
    }

    #[tokio::test]
    async fn test_apply_keeps_url_app_name() {
        let mut options = ClientOptions::parse("mongodb://localhost:27017/?appname=garage")
            .await
            .unwrap();
        PoolConfig::default().apply(&mut options);
        assert_eq!(options.app_name.as_deref(), Some("garage"));
        assert_eq!(options.max_pool_size, Some(20));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = Connection::connect("not-a-mongodb-url", "game", PoolConfig::default()).await;
        assert!(matches!(result, Err(DocBridgeError::Connection(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_blank_database() {
        let result = Connection::connect("mongodb://localhost:27017", " ", PoolConfig::default()).await;
        assert!(matches!(result, Err(DocBridgeError::Configuration(_))));
    }
}
