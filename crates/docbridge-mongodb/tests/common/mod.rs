//! In-memory `DocumentStore` used by the integration tests.
//!
//! Supports equality filters, `$set` updates and limits, and records every
//! call so tests can assert that rejected operations never reached the store.

#![allow(dead_code)]

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use docbridge_common::{DocBridgeError, Result};
use docbridge_mongodb::{DocumentStore, FindRequest, InsertOutcome, WriteScope};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    calls: AtomicUsize,
    last_filter: Mutex<Option<Document>>,
    last_options: Mutex<Option<Document>>,
    last_limit: Mutex<Option<i64>>,
    fail_next: Mutex<Option<String>>,
    skip_id_at: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of store calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next call fail with a driver-style error
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    /// Leave the id at `index` out of the next insert result
    pub fn skip_id_at(&self, index: usize) {
        *self.skip_id_at.lock().unwrap() = Some(index);
    }

    pub fn last_filter(&self) -> Option<Document> {
        self.last_filter.lock().unwrap().clone()
    }

    pub fn last_options(&self) -> Option<Document> {
        self.last_options.lock().unwrap().clone()
    }

    pub fn last_limit(&self) -> Option<i64> {
        *self.last_limit.lock().unwrap()
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seed(&self, collection: &str, documents: Vec<Document>) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    fn begin(&self, filter: &Document, options: &Document) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_filter.lock().unwrap() = Some(filter.clone());
        *self.last_options.lock().unwrap() = Some(options.clone());
        match self.fail_next.lock().unwrap().take() {
            Some(message) => Err(DocBridgeError::MongoDB(message)),
            None => Ok(()),
        }
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

fn apply_set(document: &mut Document, update: &Document) -> Result<bool> {
    let mut changed = false;
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(DocBridgeError::MongoDB(format!("Modifier {} requires a document", operator)));
        };
        if operator != "$set" {
            return Err(DocBridgeError::MongoDB(format!("Unknown modifier: {}", operator)));
        }
        for (field, value) in fields {
            if document.get(field) != Some(value) {
                document.insert(field.clone(), value.clone());
                changed = true;
            }
        }
    }
    Ok(changed)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_many(&self, collection: &str, documents: Vec<Document>, options: Document) -> Result<InsertOutcome> {
        self.begin(&Document::new(), &options)?;
        if documents.is_empty() {
            return Err(DocBridgeError::MongoDB("No documents provided".to_string()));
        }

        let skip = self.skip_id_at.lock().unwrap().take();
        let mut outcome = InsertOutcome::default();
        let mut stored = Vec::with_capacity(documents.len());

        for (index, mut document) in documents.into_iter().enumerate() {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            if skip != Some(index) {
                outcome.inserted_ids.insert(index, document.get("_id").cloned().unwrap_or(Bson::Null));
                stored.push(document);
            }
        }

        self.seed(collection, stored);
        Ok(outcome)
    }

    async fn find(&self, collection: &str, request: FindRequest) -> Result<Vec<Document>> {
        self.begin(&request.filter, &request.options)?;
        *self.last_limit.lock().unwrap() = request.limit;

        let limit = request.limit.map_or(usize::MAX, |n| n.unsigned_abs() as usize);
        Ok(self
            .documents(collection)
            .into_iter()
            .filter(|document| matches(document, &request.filter))
            .take(limit)
            .collect())
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        options: Document,
        scope: WriteScope,
    ) -> Result<u64> {
        self.begin(&filter, &options)?;
        if update.is_empty() {
            return Err(DocBridgeError::MongoDB("Update document requires atomic operators".to_string()));
        }

        let mut collections = self.collections.lock().unwrap();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut modified = 0;
        for document in documents.iter_mut().filter(|document| matches(document, &filter)) {
            if apply_set(document, &update)? {
                modified += 1;
            }
            if scope == WriteScope::One {
                break;
            }
        }
        Ok(modified)
    }

    async fn count(&self, collection: &str, filter: Document, options: Document) -> Result<u64> {
        self.begin(&filter, &options)?;
        Ok(self
            .documents(collection)
            .iter()
            .filter(|document| matches(document, &filter))
            .count() as u64)
    }

    async fn delete(&self, collection: &str, filter: Document, options: Document, scope: WriteScope) -> Result<u64> {
        self.begin(&filter, &options)?;

        let mut collections = self.collections.lock().unwrap();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut deleted = 0;
        documents.retain(|document| {
            let hit = matches(document, &filter) && (scope == WriteScope::Many || deleted == 0);
            if hit {
                deleted += 1;
            }
            !hit
        });
        Ok(deleted)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.begin(&Document::new(), &Document::new())?;
        Ok(self.collections.lock().unwrap().contains_key(name))
    }
}
