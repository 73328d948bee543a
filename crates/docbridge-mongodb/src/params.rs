//! Coercion of host-supplied parameter mappings
//!
//! Hosts hand over loosely typed JSON. Every helper here is defensive: an
//! optional mapping that is absent or not an object becomes an empty
//! document instead of `null` reaching the driver.

use bson::{Bson, Document};
use docbridge_common::{DocBridgeError, Result};
use serde_json::{Map, Value};

/// Borrow `params` as a mapping, or `None` for null and primitives
pub fn check_params(params: &Value) -> Option<&Map<String, Value>> {
    params.as_object()
}

/// Coerce an optional argument to a BSON document
///
/// Absent values and non-objects become an empty document. Objects are
/// converted as extended JSON, so `{"$oid": "..."}` yields an ObjectId.
pub fn safe_object_argument(value: Option<&Value>) -> Result<Document> {
    match value {
        Some(Value::Object(map)) => object_to_document(map),
        _ => Ok(Document::new()),
    }
}

/// Convert one JSON object into a BSON document
pub fn object_to_document(map: &Map<String, Value>) -> Result<Document> {
    match Bson::try_from(Value::Object(map.clone()))? {
        Bson::Document(document) => Ok(document),
        // Extended JSON wrappers such as {"$oid": ...} parse to scalars.
        other => Err(DocBridgeError::Validation(format!(
            "Expected a document, got {:?}",
            other.element_type()
        ))),
    }
}

/// Collection name from `params.collection`, if it is a non-empty string
pub fn collection_name(params: &Map<String, Value>) -> Option<&str> {
    params
        .get("collection")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

/// The `documents` array converted to BSON
///
/// Returns `None` when the field is missing, not an array, or holds an
/// element that is not an object, and `Some(Err(..))` when an object is not
/// valid extended JSON.
pub fn documents(params: &Map<String, Value>) -> Option<Result<Vec<Document>>> {
    let objects = params
        .get("documents")?
        .as_array()?
        .iter()
        .map(Value::as_object)
        .collect::<Option<Vec<_>>>()?;
    Some(objects.into_iter().map(object_to_document).collect())
}

/// Non-zero `limit` value, truncating fractional numbers
///
/// Zero and non-numbers mean "no limit". A negative limit is passed on; the
/// driver returns at most that many documents in a single batch.
pub fn limit(params: &Map<String, Value>) -> Option<i64> {
    let value = params.get("limit")?;
    let limit = match value.as_i64() {
        Some(n) => n,
        None => value.as_f64()?.trunc() as i64,
    };
    (limit != 0).then_some(limit)
}

/// Rewrite `{document: D, ...}` into `{documents: [D], ...}`
///
/// Non-object params are returned untouched so the insert path rejects them.
pub fn single_document_params(params: &Value) -> Value {
    let Some(map) = check_params(params) else {
        return params.clone();
    };
    let mut map = map.clone();
    let document = map.remove("document").unwrap_or(Value::Null);
    map.insert("documents".to_string(), Value::Array(vec![document]));
    Value::Object(map)
}

/// Copy of `params` with `limit` forced to 1
pub fn limit_one_params(params: &Value) -> Value {
    let Some(map) = check_params(params) else {
        return params.clone();
    };
    let mut map = map.clone();
    map.insert("limit".to_string(), Value::from(1));
    Value::Object(map)
}

/// JavaScript-style truthiness for positional flags
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Render a raw host value for a log line, `undefined` when absent
pub fn describe(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
