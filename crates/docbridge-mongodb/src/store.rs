//! The seam between the facade and the database driver
//!
//! The facade only ever talks to a [`DocumentStore`]. [`MongoStore`] forwards
//! to the `mongodb` driver; tests substitute an in-memory fake.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use docbridge_common::Result;
use futures::TryStreamExt;
use mongodb::options::{CountOptions, DeleteOptions, FindOptions, InsertManyOptions, UpdateOptions};
use mongodb::{Collection, Database};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::connection::Connection;

/// Whether a write touches the first match or every match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteScope {
    One,
    Many,
}

impl WriteScope {
    pub fn from_flag(one: bool) -> Self {
        if one {
            WriteScope::One
        } else {
            WriteScope::Many
        }
    }
}

/// Result of a bulk insert: ids keyed by input position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOutcome {
    pub inserted_ids: HashMap<usize, Bson>,
}

impl InsertOutcome {
    pub fn inserted_count(&self) -> u64 {
        self.inserted_ids.len() as u64
    }
}

/// A validated find request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindRequest {
    pub filter: Document,
    /// Driver options in their camelCase wire form (`sort`, `projection`, `skip`, ...)
    pub options: Document,
    pub limit: Option<i64>,
}

/// Database operations the facade delegates to
///
/// `options` arguments are the raw option mappings supplied by the host; an
/// implementation decides how to interpret them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_many(&self, collection: &str, documents: Vec<Document>, options: Document) -> Result<InsertOutcome>;

    async fn find(&self, collection: &str, request: FindRequest) -> Result<Vec<Document>>;

    /// Returns the number of modified documents
    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Document,
        scope: WriteScope,
    ) -> Result<u64>;

    async fn count(&self, collection: &str, filter: Document, options: Document) -> Result<u64>;

    /// Returns the number of deleted documents
    async fn delete(&self, collection: &str, filter: Document, options: Document, scope: WriteScope) -> Result<u64>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;
}

/// [`DocumentStore`] backed by a live MongoDB database
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn from_connection(connection: &Connection) -> Self {
        Self::new(connection.database().clone())
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }
}

/// Option key hosts send as milliseconds; the driver reads it as a `Duration`
const MAX_TIME_MS: &str = "maxTimeMS";

/// Deserialize a host options mapping into the driver's options struct
///
/// An empty mapping means "driver defaults".
fn driver_options<T: DeserializeOwned>(mut options: Document) -> Result<Option<T>> {
    if options.is_empty() {
        return Ok(None);
    }
    millis_to_duration(&mut options, MAX_TIME_MS);
    Ok(Some(bson::from_document(options)?))
}

/// Rewrite a non-negative millisecond count under `key` into serde's
/// `Duration` shape. Other values are left for the driver to reject.
fn millis_to_duration(options: &mut Document, key: &str) {
    let millis = match options.get(key) {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) if n.is_finite() => n.trunc() as i64,
        _ => return,
    };
    let Ok(millis) = u64::try_from(millis) else {
        return;
    };

    let duration = Duration::from_millis(millis);
    options.insert(
        key,
        doc! {
            "secs": duration.as_secs() as i64,
            "nanos": i64::from(duration.subsec_nanos()),
        },
    );
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_many(&self, collection: &str, documents: Vec<Document>, options: Document) -> Result<InsertOutcome> {
        let options: Option<InsertManyOptions> = driver_options(options)?;
        let result = self
            .collection(collection)
            .insert_many(documents)
            .with_options(options)
            .await?;

        Ok(InsertOutcome {
            inserted_ids: result.inserted_ids,
        })
    }

    async fn find(&self, collection: &str, request: FindRequest) -> Result<Vec<Document>> {
        let mut options: FindOptions = driver_options(request.options)?.unwrap_or_default();
        if let Some(limit) = request.limit {
            options.limit = Some(limit);
        }

        let cursor = self
            .collection(collection)
            .find(request.filter)
            .with_options(options)
            .await?;

        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Document,
        scope: WriteScope,
    ) -> Result<u64> {
        let options: Option<UpdateOptions> = driver_options(options)?;
        let collection = self.collection(collection);

        let result = match scope {
            WriteScope::One => collection.update_one(filter, update).with_options(options).await?,
            WriteScope::Many => collection.update_many(filter, update).with_options(options).await?,
        };

        Ok(result.modified_count)
    }

    async fn count(&self, collection: &str, filter: Document, options: Document) -> Result<u64> {
        let options: Option<CountOptions> = driver_options(options)?;
        let count = self
            .collection(collection)
            .count_documents(filter)
            .with_options(options)
            .await?;

        Ok(count)
    }

    async fn delete(&self, collection: &str, filter: Document, options: Document, scope: WriteScope) -> Result<u64> {
        let options: Option<DeleteOptions> = driver_options(options)?;
        let collection = self.collection(collection);

        let result = match scope {
            WriteScope::One => collection.delete_one(filter).with_options(options).await?,
            WriteScope::Many => collection.delete_many(filter).with_options(options).await?,
        };

        Ok(result.deleted_count)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .database
            .list_collection_names()
            .filter(doc! { "name": name })
            .await?;

        Ok(!names.is_empty())
    }
}
