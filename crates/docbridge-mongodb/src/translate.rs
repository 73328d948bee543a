//! Translation of driver results into host-friendly values
//!
//! Hosts cannot hold driver ObjectIds, so every ObjectId in a returned
//! document is replaced by its 24-character hex string. Everything else is
//! left as it is and rendered as relaxed extended JSON at the boundary.

use bson::{Bson, Document};
use serde_json::Value;
use std::collections::HashMap;

/// Replace every ObjectId inside `value` with its hex string
pub fn export_value(value: Bson) -> Bson {
    match value {
        Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
        Bson::Document(document) => Bson::Document(export_document(document)),
        Bson::Array(items) => Bson::Array(items.into_iter().map(export_value).collect()),
        other => other,
    }
}

pub fn export_document(document: Document) -> Document {
    document
        .into_iter()
        .map(|(key, value)| (key, export_value(value)))
        .collect()
}

pub fn export_documents(documents: Vec<Document>) -> Vec<Document> {
    documents.into_iter().map(export_document).collect()
}

/// String form of an inserted id
///
/// ObjectIds become hex, strings are kept, anything else is rendered as
/// relaxed extended JSON text (`42`, `{"a":1}`).
pub fn id_to_string(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => other.into_relaxed_extjson().to_string(),
    }
}

/// Rebuild a dense id list aligned with the `len` input documents
///
/// The driver keys ids by input position. Missing positions stay `None`
/// so later ids keep their place; positions past the input are dropped.
pub fn dense_ids(inserted_ids: HashMap<usize, Bson>, len: usize) -> Vec<Option<String>> {
    let mut ids = vec![None; len];
    for (index, id) in inserted_ids {
        if let Some(slot) = ids.get_mut(index) {
            *slot = Some(id_to_string(id));
        }
    }
    ids
}

/// Render a document as relaxed extended JSON for the host
pub fn to_host_value(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}
