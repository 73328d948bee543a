//! The data access facade
//!
//! A [`Facade`] owns the connection state and runs the validated CRUD
//! operations. Every operation follows the same protocol:
//!
//! 1. readiness check (a connected store must exist)
//! 2. params must be a JSON object
//! 3. `params.collection` must name a valid collection
//! 4. optional `query` / `update` / `options` default to empty documents
//! 5. one delegated store call
//! 6. the driver result is translated, or its error reported
//!
//! Steps 1-3 (and the `documents` check for inserts) reject the call before
//! the database is touched. How a rejection reaches the host is decided by
//! [`crate::host::RejectionPolicy`].

use bson::Document;
use docbridge_common::{categorize_error, sanitize_error, DocBridgeError, ErrorCategory, Result};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Level};

use crate::connection::Connection;
use crate::params;
use crate::settings::Settings;
use crate::store::{DocumentStore, FindRequest, MongoStore, WriteScope};
use crate::translate::{dense_ids, export_documents};
use crate::validation::ValidatedCollectionName;
use crate::LOG_TARGET;

const EVENT_CAPACITY: usize = 16;

/// Operation names as they appear in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Find,
    Update,
    Count,
    Delete,
    CollectionExists,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Find => "find",
            Operation::Update => "update",
            Operation::Count => "count",
            Operation::Delete => "delete",
            Operation::CollectionExists => "collectionExists",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Successful payload of an operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    /// Inserted count and string ids aligned with the input documents
    Inserted { count: u64, ids: Vec<Option<String>> },
    /// Found documents, ObjectIds already translated to strings
    Documents(Vec<Document>),
    Modified(u64),
    Counted(u64),
    Deleted(u64),
    Exists(bool),
}

/// Why an operation did not produce an output
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("Database is not connected.")]
    NotConnected,

    #[error("{operation}: Invalid params object.")]
    InvalidParams { operation: Operation },

    #[error("{operation}: Invalid collection \"{collection}\"")]
    InvalidCollection { operation: Operation, collection: String },

    #[error("{operation}: Invalid 'params.documents' value. Expected an array of objects.")]
    InvalidDocuments { operation: Operation },

    #[error("{operation}: Invalid 'params.{field}' value: {message}")]
    InvalidArgument {
        operation: Operation,
        field: &'static str,
        message: String,
    },

    /// The store call itself failed; the message is the driver's
    #[error("{message}")]
    Driver { operation: Operation, message: String },
}

impl OperationError {
    /// True when the call was refused before reaching the database
    pub fn is_rejection(&self) -> bool {
        !matches!(self, OperationError::Driver { .. })
    }
}

pub type OperationResult = std::result::Result<OperationOutput, OperationError>;

/// Lifecycle of the shared connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected { database: String },
    Failed { reason: String },
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => f.write_str("disconnected"),
            ConnectionStatus::Connecting => f.write_str("connecting"),
            ConnectionStatus::Connected { database } => write!(f, "connected ({})", database),
            ConnectionStatus::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Events published to the host's event bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacadeEvent {
    DatabaseConnected { database: String },
}

impl FacadeEvent {
    /// Event name the host registers handlers under
    pub fn name(&self) -> &'static str {
        match self {
            FacadeEvent::DatabaseConnected { .. } => "onDatabaseConnect",
        }
    }
}

struct Slot {
    status: ConnectionStatus,
    store: Option<Arc<dyn DocumentStore>>,
}

/// CRUD facade over one shared database handle
pub struct Facade {
    slot: RwLock<Slot>,
    events: broadcast::Sender<FacadeEvent>,
}

impl Default for Facade {
    fn default() -> Self {
        Self::new()
    }
}

impl Facade {
    /// A disconnected facade; every operation is rejected until a store is attached
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            slot: RwLock::new(Slot {
                status: ConnectionStatus::Disconnected,
                store: None,
            }),
            events,
        }
    }

    /// A facade already connected to `store`
    pub fn with_store(database: impl Into<String>, store: Arc<dyn DocumentStore>) -> Self {
        let facade = Self::new();
        facade.connect_with(database, store);
        facade
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, Slot> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Slot> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.read_slot().status.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.read_slot().store.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FacadeEvent> {
        self.events.subscribe()
    }

    /// Start connecting in the background
    ///
    /// Logs one error per unset setting and returns `None` when the settings
    /// are incomplete; the facade then stays disconnected. No retry is made
    /// if the connection attempt fails.
    pub fn bootstrap(self: &Arc<Self>, settings: Settings) -> Option<JoinHandle<()>> {
        let missing = settings.missing();
        if !missing.is_empty() {
            for variable in missing {
                error!(target: LOG_TARGET, "Convar \"{}\" not set", variable);
            }
            return None;
        }

        if !self.begin_connecting() {
            return None;
        }

        let facade = Arc::clone(self);
        Some(tokio::spawn(async move {
            // Failure is recorded in the status and logged by establish().
            let _ = facade.establish(&settings).await;
        }))
    }

    /// Connect and wait for the outcome
    pub async fn connect(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        if !self.begin_connecting() {
            return Err(DocBridgeError::Connection(format!(
                "Cannot connect while {}",
                self.status()
            )));
        }
        self.establish(settings).await
    }

    /// Attach an established store and publish `onDatabaseConnect`
    ///
    /// The handle is written once: returns false if a store is already attached.
    pub fn connect_with(&self, database: impl Into<String>, store: Arc<dyn DocumentStore>) -> bool {
        let database = database.into();
        {
            let mut slot = self.write_slot();
            if slot.store.is_some() {
                warn!(target: LOG_TARGET, "Database handle already set; ignoring new connection");
                return false;
            }
            slot.store = Some(store);
            slot.status = ConnectionStatus::Connected {
                database: database.clone(),
            };
        }

        info!(target: LOG_TARGET, "Connected to database \"{}\".", database);
        // Nobody may be listening yet; that is fine.
        let _ = self.events.send(FacadeEvent::DatabaseConnected { database });
        true
    }

    fn begin_connecting(&self) -> bool {
        let mut slot = self.write_slot();
        let idle = matches!(
            slot.status,
            ConnectionStatus::Disconnected | ConnectionStatus::Failed { .. }
        );
        if idle && slot.store.is_none() {
            slot.status = ConnectionStatus::Connecting;
            return true;
        }

        warn!(target: LOG_TARGET, "Connection attempt ignored while {}", slot.status);
        false
    }

    async fn establish(&self, settings: &Settings) -> Result<()> {
        match Connection::connect(&settings.url, &settings.database, settings.pool.clone()).await {
            Ok(connection) => {
                let store = Arc::new(MongoStore::from_connection(&connection));
                self.connect_with(connection.database_name(), store);
                Ok(())
            }
            Err(err) => {
                let reason = sanitize_error(&err.to_string(), false);
                error!(target: LOG_TARGET, "Failed to connect: {}", reason);
                self.write_slot().status = ConnectionStatus::Failed {
                    reason: reason.clone(),
                };
                Err(DocBridgeError::Connection(reason))
            }
        }
    }

    fn ready(&self) -> std::result::Result<Arc<dyn DocumentStore>, OperationError> {
        self.read_slot()
            .store
            .clone()
            .ok_or_else(|| reject(OperationError::NotConnected))
    }

    /// Steps 1-3 of the protocol
    fn prepare<'p>(
        &self,
        operation: Operation,
        params: &'p Value,
    ) -> std::result::Result<(Arc<dyn DocumentStore>, &'p Map<String, Value>, ValidatedCollectionName), OperationError> {
        let store = self.ready()?;
        let map = params::check_params(params).ok_or_else(|| reject(OperationError::InvalidParams { operation }))?;
        let collection = resolve_collection(operation, map)?;
        Ok((store, map, collection))
    }

    /// Insert `params.documents`
    pub async fn insert(&self, params: &Value) -> OperationResult {
        let operation = Operation::Insert;
        let (store, map, collection) = self.prepare(operation, params)?;

        let documents = params::documents(map)
            .ok_or_else(|| reject(OperationError::InvalidDocuments { operation }))?
            .map_err(|err| {
                reject(OperationError::InvalidArgument {
                    operation,
                    field: "documents",
                    message: err.to_string(),
                })
            })?;
        let options = argument(operation, "options", map)?;
        let len = documents.len();

        match store.insert_many(collection.as_str(), documents, options).await {
            Ok(outcome) => {
                let count = outcome.inserted_count();
                debug!(target: LOG_TARGET, collection = %collection, "inserted {} documents", count);
                Ok(OperationOutput::Inserted {
                    count,
                    ids: dense_ids(outcome.inserted_ids, len),
                })
            }
            Err(err) => Err(driver_failure(operation, err)),
        }
    }

    /// Insert `params.document` as a one-element `documents` array
    pub async fn insert_one(&self, params: &Value) -> OperationResult {
        self.insert(&params::single_document_params(params)).await
    }

    /// Find documents matching `params.query`, honouring `params.limit`
    pub async fn find(&self, params: &Value) -> OperationResult {
        let operation = Operation::Find;
        let (store, map, collection) = self.prepare(operation, params)?;

        let request = FindRequest {
            filter: argument(operation, "query", map)?,
            options: argument(operation, "options", map)?,
            limit: params::limit(map),
        };

        match store.find(collection.as_str(), request).await {
            Ok(documents) => {
                debug!(target: LOG_TARGET, collection = %collection, "found {} documents", documents.len());
                Ok(OperationOutput::Documents(export_documents(documents)))
            }
            Err(err) => Err(driver_failure(operation, err)),
        }
    }

    /// `find` with the limit forced to 1
    pub async fn find_one(&self, params: &Value) -> OperationResult {
        self.find(&params::limit_one_params(params)).await
    }

    /// Apply `params.update` to the documents matching `params.query`
    pub async fn update(&self, params: &Value, scope: WriteScope) -> OperationResult {
        let operation = Operation::Update;
        let (store, map, collection) = self.prepare(operation, params)?;

        let filter = argument(operation, "query", map)?;
        let update = argument(operation, "update", map)?;
        let options = argument(operation, "options", map)?;

        match store.update(collection.as_str(), filter, update, options, scope).await {
            Ok(modified) => Ok(OperationOutput::Modified(modified)),
            Err(err) => Err(driver_failure(operation, err)),
        }
    }

    pub async fn update_one(&self, params: &Value) -> OperationResult {
        self.update(params, WriteScope::One).await
    }

    pub async fn count(&self, params: &Value) -> OperationResult {
        let operation = Operation::Count;
        let (store, map, collection) = self.prepare(operation, params)?;

        let filter = argument(operation, "query", map)?;
        let options = argument(operation, "options", map)?;

        match store.count(collection.as_str(), filter, options).await {
            Ok(count) => Ok(OperationOutput::Counted(count)),
            Err(err) => Err(driver_failure(operation, err)),
        }
    }

    pub async fn delete(&self, params: &Value, scope: WriteScope) -> OperationResult {
        let operation = Operation::Delete;
        let (store, map, collection) = self.prepare(operation, params)?;

        let filter = argument(operation, "query", map)?;
        let options = argument(operation, "options", map)?;

        match store.delete(collection.as_str(), filter, options, scope).await {
            Ok(deleted) => Ok(OperationOutput::Deleted(deleted)),
            Err(err) => Err(driver_failure(operation, err)),
        }
    }

    pub async fn delete_one(&self, params: &Value) -> OperationResult {
        self.delete(params, WriteScope::One).await
    }

    /// Whether a collection called `name` exists in the database
    pub async fn collection_exists(&self, name: &str) -> OperationResult {
        let operation = Operation::CollectionExists;
        let store = self.ready()?;
        if name.is_empty() {
            return Err(reject(OperationError::InvalidCollection {
                operation,
                collection: String::new(),
            }));
        }

        match store.collection_exists(name).await {
            Ok(exists) => Ok(OperationOutput::Exists(exists)),
            Err(err) => Err(driver_failure(operation, err)),
        }
    }
}

fn reject(err: OperationError) -> OperationError {
    error!(target: LOG_TARGET, "{}", err);
    err
}

fn driver_failure(operation: Operation, err: DocBridgeError) -> OperationError {
    let message = err.message().to_string();
    let category = categorize_error(&message);
    let logged = sanitize_error(&message, false);

    if failure_level(category) == Level::WARN {
        warn!(target: LOG_TARGET, category = category.label(), "{}: Error \"{}\".", operation, logged);
    } else {
        error!(target: LOG_TARGET, category = category.label(), "{}: Error \"{}\".", operation, logged);
    }
    OperationError::Driver { operation, message }
}

/// Rejected writes and bad commands are the caller's doing; anything else
/// points at the server or the network.
fn failure_level(category: ErrorCategory) -> Level {
    match category {
        ErrorCategory::Validation | ErrorCategory::Operation => Level::WARN,
        ErrorCategory::Connection
        | ErrorCategory::Authentication
        | ErrorCategory::Timeout
        | ErrorCategory::Unknown => Level::ERROR,
    }
}

fn resolve_collection(
    operation: Operation,
    map: &Map<String, Value>,
) -> std::result::Result<ValidatedCollectionName, OperationError> {
    let invalid = || {
        reject(OperationError::InvalidCollection {
            operation,
            collection: params::describe(map.get("collection")),
        })
    };

    let name = params::collection_name(map).ok_or_else(invalid)?;
    ValidatedCollectionName::new(name).map_err(|err| {
        debug!(target: LOG_TARGET, "{}", err);
        invalid()
    })
}

fn argument(
    operation: Operation,
    field: &'static str,
    map: &Map<String, Value>,
) -> std::result::Result<Document, OperationError> {
    params::safe_object_argument(map.get(field)).map_err(|err| {
        reject(OperationError::InvalidArgument {
            operation,
            field,
            message: err.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Insert.name(), "insert");
        assert_eq!(Operation::CollectionExists.to_string(), "collectionExists");
    }

    #[test]
    fn test_error_messages() {
        let err = OperationError::InvalidCollection {
            operation: Operation::Find,
            collection: "undefined".to_string(),
        };
        assert_eq!(err.to_string(), "find: Invalid collection \"undefined\"");
        assert_eq!(OperationError::NotConnected.to_string(), "Database is not connected.");

        let driver = OperationError::Driver {
            operation: Operation::Update,
            message: "boom".to_string(),
        };
        assert_eq!(driver.to_string(), "boom");
        assert!(!driver.is_rejection());
        assert!(OperationError::InvalidParams { operation: Operation::Count }.is_rejection());
    }

    #[test]
    fn test_new_facade_is_disconnected() {
        let facade = Facade::new();
        assert!(!facade.is_connected());
        assert_eq!(facade.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_operations_rejected_while_disconnected() {
        let facade = Facade::new();
        let params = json!({ "collection": "players" });
        assert_eq!(facade.find(&params).await, Err(OperationError::NotConnected));
        assert_eq!(facade.count(&params).await, Err(OperationError::NotConnected));
        assert_eq!(facade.collection_exists("players").await, Err(OperationError::NotConnected));
    }

    #[test]
    fn test_bootstrap_with_unset_settings_stays_disconnected() {
        let facade = Arc::new(Facade::new());
        let handle = facade.bootstrap(Settings::new("changeme", "changeme"));
        assert!(handle.is_none());
        assert_eq!(facade.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_moves_to_failed() {
        let facade = Arc::new(Facade::new());
        let handle = facade
            .bootstrap(Settings::new("definitely-not-a-url", "game"))
            .expect("settings are complete");
        handle.await.unwrap();

        assert!(!facade.is_connected());
        assert!(matches!(facade.status(), ConnectionStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_connect_validates_settings() {
        let facade = Facade::new();
        let err = facade.connect(&Settings::new("mongodb://localhost", "changeme")).await.unwrap_err();
        assert!(matches!(err, DocBridgeError::Configuration(_)));
        assert_eq!(facade.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Connecting.to_string(), "connecting");
        assert_eq!(
            ConnectionStatus::Connected { database: "game".into() }.to_string(),
            "connected (game)"
        );
    }

    #[test]
    fn test_driver_failure_keeps_driver_message() {
        let err = driver_failure(
            Operation::Insert,
            DocBridgeError::MongoDB("E11000 duplicate key error".to_string()),
        );
        assert_eq!(
            err,
            OperationError::Driver {
                operation: Operation::Insert,
                message: "E11000 duplicate key error".to_string(),
            }
        );
        assert_eq!(err.to_string(), "E11000 duplicate key error");
    }

    #[test]
    fn test_failure_level_by_category() {
        assert_eq!(failure_level(categorize_error("invalid update document")), Level::WARN);
        assert_eq!(failure_level(categorize_error("Command failed")), Level::WARN);
        assert_eq!(failure_level(categorize_error("connection refused")), Level::ERROR);
        assert_eq!(failure_level(categorize_error("Server selection timeout")), Level::ERROR);
        assert_eq!(failure_level(categorize_error("E11000 duplicate key error")), Level::ERROR);
    }

    #[test]
    fn test_event_name() {
        let event = FacadeEvent::DatabaseConnected { database: "game".into() };
        assert_eq!(event.name(), "onDatabaseConnect");
    }
}
