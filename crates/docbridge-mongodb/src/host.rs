//! Host export layer
//!
//! Hosts call exports by name with positional JSON arguments and an optional
//! completion callback. When a callback is supplied it receives the result
//! tuple; otherwise the tuple is returned to the caller.
//!
//! # Example
//! ```rust,ignore
//! let host = ExportHost::new(facade);
//! let tuple = host
//!     .call("find", &[json!({ "collection": "players", "query": { "job": "police" } })], None)
//!     .await?;
//! ```

use serde_json::Value;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

use docbridge_common::{DocBridgeError, Result};

use crate::facade::{Facade, OperationOutput, OperationResult};
use crate::params;
use crate::store::WriteScope;
use crate::translate::to_host_value;
use crate::LOG_TARGET;

/// Every export name the host can call
pub const EXPORTS: &[&str] = &[
    "isConnected",
    "collectionExists",
    "insert",
    "insertOne",
    "find",
    "findOne",
    "update",
    "updateOne",
    "count",
    "delete",
    "deleteOne",
];

/// `(success, ...payload)` as handed to the host
///
/// On failure the payload is exactly one message string.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTuple(Vec<Value>);

impl ResultTuple {
    pub fn success(payload: Vec<Value>) -> Self {
        let mut values = Vec::with_capacity(payload.len() + 1);
        values.push(Value::Bool(true));
        values.extend(payload);
        Self(values)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self(vec![Value::Bool(false), Value::String(message.into())])
    }

    pub fn is_success(&self) -> bool {
        matches!(self.0.first(), Some(Value::Bool(true)))
    }

    pub fn payload(&self) -> &[Value] {
        self.0.get(1..).unwrap_or(&[])
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }

    /// The tuple as a JSON array
    pub fn to_value(&self) -> Value {
        Value::Array(self.0.clone())
    }
}

impl From<OperationOutput> for ResultTuple {
    fn from(output: OperationOutput) -> Self {
        match output {
            OperationOutput::Inserted { count, ids } => {
                let ids = ids.into_iter().map(|id| id.map_or(Value::Null, Value::String)).collect();
                ResultTuple::success(vec![Value::from(count), Value::Array(ids)])
            }
            OperationOutput::Documents(documents) => {
                let documents = documents.into_iter().map(to_host_value).collect();
                ResultTuple::success(vec![Value::Array(documents)])
            }
            OperationOutput::Modified(n) | OperationOutput::Counted(n) | OperationOutput::Deleted(n) => {
                ResultTuple::success(vec![Value::from(n)])
            }
            OperationOutput::Exists(exists) => ResultTuple::success(vec![Value::Bool(exists)]),
        }
    }
}

/// Completion callback; receives the result tuple spread as positional values
pub type Callback = Box<dyn FnOnce(&[Value]) + Send>;

/// Invoke `callback` with `tuple`, catching and logging a panic
///
/// Returns false if the callback panicked.
pub fn safe_callback(callback: Callback, tuple: &ResultTuple) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback(tuple.as_slice()))) {
        Ok(()) => true,
        Err(panic) => {
            error!(target: LOG_TARGET, "Callback panicked: {}", panic_message(panic.as_ref()));
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// What a caller sees when a call is refused before reaching the database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RejectionPolicy {
    /// Return nothing and never invoke the callback. Callers waiting on the
    /// callback will wait forever; kept for compatibility with existing scripts.
    #[default]
    Silent,
    /// Deliver `(false, message)` exactly like a driver error
    Report,
}

/// Dispatches named exports to a [`Facade`]
#[derive(Clone)]
pub struct ExportHost {
    facade: Arc<Facade>,
    policy: RejectionPolicy,
}

impl ExportHost {
    pub fn new(facade: Arc<Facade>) -> Self {
        Self {
            facade,
            policy: RejectionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RejectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn facade(&self) -> &Arc<Facade> {
        &self.facade
    }

    pub fn policy(&self) -> RejectionPolicy {
        self.policy
    }

    pub fn is_connected(&self) -> bool {
        self.facade.is_connected()
    }

    /// Call an export by name
    ///
    /// `args` are the export's positional arguments without the callback:
    /// `[params]` for most exports, `[params, isUpdateOne]` for `update`,
    /// `[params, isDeleteOne]` for `delete`, `[name]` for `collectionExists`.
    ///
    /// Returns `Ok(None)` when the tuple went to the callback or the call was
    /// silently rejected, and an error only for an unknown export name.
    pub async fn call(&self, name: &str, args: &[Value], callback: Option<Callback>) -> Result<Option<ResultTuple>> {
        let null = Value::Null;
        let params = args.first().unwrap_or(&null);
        let flag = params::is_truthy(args.get(1));

        let result = match name {
            "isConnected" => {
                let tuple = ResultTuple::success(vec![Value::Bool(self.is_connected())]);
                return Ok(deliver(tuple, callback));
            }
            "collectionExists" => {
                let collection = params.as_str().unwrap_or_default();
                self.facade.collection_exists(collection).await
            }
            "insert" => self.facade.insert(params).await,
            "insertOne" => self.facade.insert_one(params).await,
            "find" => self.facade.find(params).await,
            "findOne" => self.facade.find_one(params).await,
            "update" => self.facade.update(params, WriteScope::from_flag(flag)).await,
            "updateOne" => self.facade.update_one(params).await,
            "count" => self.facade.count(params).await,
            "delete" => self.facade.delete(params, WriteScope::from_flag(flag)).await,
            "deleteOne" => self.facade.delete_one(params).await,
            other => {
                return Err(DocBridgeError::Validation(format!(
                    "Unknown export '{}'. Available exports: {}",
                    other,
                    EXPORTS.join(", ")
                )))
            }
        };

        Ok(self.complete(result, callback))
    }

    fn complete(&self, result: OperationResult, callback: Option<Callback>) -> Option<ResultTuple> {
        let tuple = match result {
            Ok(output) => ResultTuple::from(output),
            Err(err) if err.is_rejection() && self.policy == RejectionPolicy::Silent => return None,
            Err(err) => ResultTuple::failure(err.to_string()),
        };
        deliver(tuple, callback)
    }
}

fn deliver(tuple: ResultTuple, callback: Option<Callback>) -> Option<ResultTuple> {
    match callback {
        Some(callback) => {
            safe_callback(callback, &tuple);
            None
        }
        None => Some(tuple),
    }
}
