//! Facade-level operation results.
//!
//! These carry exactly the fields callers rely on (counts, identifiers,
//! returned documents, acknowledgement) independent of the driver in use.

use std::collections::BTreeMap;

use bson::{Bson, Document};
use futures::TryStreamExt;

use crate::driver::DocumentCursor;
use crate::error::FacadeResult;

/// Result of `insert_one`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// Whether the write was acknowledged.
    pub acknowledged: bool,
    /// Always `1` on success.
    pub inserted_count: u64,
    /// Identifier of the inserted document.
    pub inserted_id: Bson,
    /// The inserted document, including its `_id`.
    pub ops: Vec<Document>,
}

/// Result of `insert_many`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    /// Whether the write was acknowledged.
    pub acknowledged: bool,
    /// Number of inserted documents.
    pub inserted_count: u64,
    /// Identifiers keyed by the position of the document in the input.
    pub inserted_ids: BTreeMap<usize, Bson>,
    /// The inserted documents, in input order, including their `_id`s.
    pub ops: Vec<Document>,
}

/// Result of `update_many`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResult {
    /// Whether the write was acknowledged.
    pub acknowledged: bool,
    /// Number of documents matched by the filter.
    pub matched_count: u64,
    /// Number of documents actually changed.
    pub modified_count: u64,
    /// `1` when an upsert inserted a document, else `0`.
    pub upserted_count: u64,
    /// Identifier of the upserted document.
    pub upserted_id: Option<Bson>,
}

/// Result of `delete_many`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResult {
    /// Whether the write was acknowledged.
    pub acknowledged: bool,
    /// Number of deleted documents.
    pub deleted_count: u64,
}

/// Write outcome reported by a find-and-modify command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastErrorObject {
    /// Number of documents affected (0 or 1).
    pub n: u64,
    /// An existing document was updated or replaced.
    pub updated_existing: bool,
    /// Identifier of the document inserted by an upsert.
    pub upserted: Option<Bson>,
}

/// Result of the `find_one_and_*` family.
#[derive(Debug, Clone, PartialEq)]
pub struct FindAndModifyResult {
    /// The original or modified document, per `return_original`.
    pub value: Option<Document>,
    /// Write outcome.
    pub last_error_object: LastErrorObject,
    /// `1.0` on success.
    pub ok: f64,
}

impl FindAndModifyResult {
    /// Parse the reply of a `findAndModify` command.
    pub fn from_reply(reply: &Document) -> Self {
        let last_error_object = reply
            .get_document("lastErrorObject")
            .map(|leo| LastErrorObject {
                n: leo.get("n").and_then(bson_as_u64).unwrap_or(0),
                updated_existing: leo.get_bool("updatedExisting").unwrap_or(false),
                upserted: leo.get("upserted").cloned(),
            })
            .unwrap_or_default();

        let value = match reply.get("value") {
            Some(Bson::Document(doc)) => Some(doc.clone()),
            _ => None,
        };

        let ok = match reply.get("ok") {
            Some(Bson::Double(f)) => *f,
            Some(other) => bson_as_u64(other).unwrap_or(0) as f64,
            None => 0.0,
        };

        Self {
            value,
            last_error_object,
            ok,
        }
    }
}

/// Output of `find`: documents, or a lazy cursor when requested.
pub enum FindOutput {
    /// Materialized documents, in result order.
    Documents(Vec<Document>),
    /// Lazy handle over the result set.
    Cursor(DocumentCursor),
}

impl FindOutput {
    /// Check whether this output is a lazy cursor.
    pub fn is_cursor(&self) -> bool {
        matches!(self, Self::Cursor(_))
    }

    /// Materialized documents, or `None` for cursor output.
    pub fn documents(&self) -> Option<&[Document]> {
        match self {
            Self::Documents(docs) => Some(docs),
            Self::Cursor(_) => None,
        }
    }

    /// Collect into documents, draining the cursor if needed.
    pub async fn into_documents(self) -> FacadeResult<Vec<Document>> {
        match self {
            Self::Documents(docs) => Ok(docs),
            Self::Cursor(cursor) => cursor.try_collect().await,
        }
    }

    /// Take the cursor, or `None` for materialized output.
    pub fn into_cursor(self) -> Option<DocumentCursor> {
        match self {
            Self::Cursor(cursor) => Some(cursor),
            Self::Documents(_) => None,
        }
    }
}

impl std::fmt::Debug for FindOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Documents(docs) => f.debug_tuple("Documents").field(docs).finish(),
            Self::Cursor(_) => f.write_str("Cursor(..)"),
        }
    }
}

fn bson_as_u64(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(n) => u64::try_from(*n).ok(),
        Bson::Int64(n) => u64::try_from(*n).ok(),
        Bson::Double(f) if *f >= 0.0 => Some(*f as u64),
        _ => None,
    }
}
