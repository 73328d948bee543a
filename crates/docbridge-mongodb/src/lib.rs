//! MongoDB data access facade for docbridge
//!
//! This crate exposes a fixed set of CRUD operations (insert, find, update,
//! count, delete, collection existence) against one shared database handle,
//! and adapts them to a host runtime that calls exports by name.
//!
//! # Layers
//! - [`Facade`]: connection state machine plus the validated operations,
//!   returning `Result<OperationOutput, OperationError>`
//! - [`DocumentStore`]: the seam to the driver; [`MongoStore`] is the real one
//! - [`ExportHost`]: callback-or-return adapter producing [`ResultTuple`]s

pub mod connection;
pub mod facade;
pub mod host;
pub mod params;
pub mod settings;
pub mod store;
pub mod translate;
pub mod validation;

pub use connection::{Connection, PoolConfig};
pub use docbridge_common::{DocBridgeError, Result};
pub use facade::{ConnectionStatus, Facade, FacadeEvent, Operation, OperationError, OperationOutput, OperationResult};
pub use host::{safe_callback, Callback, ExportHost, RejectionPolicy, ResultTuple, EXPORTS};
pub use settings::Settings;
pub use store::{DocumentStore, FindRequest, InsertOutcome, MongoStore, WriteScope};
pub use validation::ValidatedCollectionName;

/// Tracing target used for every diagnostic this crate emits
pub const LOG_TARGET: &str = "mongodb";
