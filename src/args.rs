//! Per-operation arguments.
//!
//! Every field is optional so that an omitted argument can be told apart from
//! an empty one. Required fields are checked by the [`Client`](crate::Client)
//! before anything is sent to the driver.

use bson::Document;

use crate::index::IndexSpec;

/// Arguments for `insert_one`.
#[derive(Debug, Clone, Default)]
pub struct InsertOneArgs {
    /// Document to insert; `{}` when omitted.
    pub doc: Option<Document>,
}

impl InsertOneArgs {
    /// Insert the given document.
    pub fn doc(doc: Document) -> Self {
        Self { doc: Some(doc) }
    }
}

/// Arguments for `insert_many`.
#[derive(Debug, Clone, Default)]
pub struct InsertManyArgs {
    /// Documents to insert, in order.
    pub docs: Option<Vec<Document>>,
}

impl InsertManyArgs {
    /// Insert the given documents.
    pub fn docs(docs: Vec<Document>) -> Self {
        Self { docs: Some(docs) }
    }
}

/// Arguments for `find`.
#[derive(Debug, Clone, Default)]
pub struct FindArgs {
    /// Query filter; `{}` when omitted.
    pub query: Option<Document>,
    /// Fields to include or exclude.
    pub projection: Option<Document>,
    /// Deprecated alias of `projection`, used only when `projection` is unset.
    pub project: Option<Document>,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
    /// Return a lazy cursor instead of a materialized `Vec`.
    pub cursor: bool,
}

impl FindArgs {
    /// Create empty find arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the query filter.
    pub fn query(mut self, query: Document) -> Self {
        self.query = Some(query);
        self
    }

    /// Set the projection.
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Set the projection through its deprecated name.
    #[deprecated(note = "use `projection` instead")]
    pub fn project(mut self, projection: Document) -> Self {
        self.project = Some(projection);
        self
    }

    /// Set the sort specification.
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the number of documents to skip.
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the maximum number of documents.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Request a lazy cursor.
    pub fn cursor(mut self, enabled: bool) -> Self {
        self.cursor = enabled;
        self
    }

    /// The projection in effect, honouring the deprecated alias.
    pub fn effective_projection(&self) -> Option<&Document> {
        self.projection.as_ref().or(self.project.as_ref())
    }
}

/// Arguments for `count`.
#[derive(Debug, Clone, Default)]
pub struct CountArgs {
    /// Query filter; `{}` when omitted.
    pub query: Option<Document>,
}

impl CountArgs {
    /// Count documents matching `query`.
    pub fn query(query: Document) -> Self {
        Self { query: Some(query) }
    }
}

/// Arguments for `distinct`.
#[derive(Debug, Clone, Default)]
pub struct DistinctArgs {
    /// Field whose distinct values are returned.
    pub key: Option<String>,
    /// Query filter; `{}` when omitted.
    pub query: Option<Document>,
}

impl DistinctArgs {
    /// Distinct values of `key`.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            query: None,
        }
    }

    /// Restrict to documents matching `query`.
    pub fn query(mut self, query: Document) -> Self {
        self.query = Some(query);
        self
    }
}

/// Options shared by update operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a document when nothing matches.
    pub upsert: bool,
}

/// Arguments for `update_many`.
#[derive(Debug, Clone, Default)]
pub struct UpdateManyArgs {
    /// Selects the documents to update.
    pub filter: Option<Document>,
    /// Update document with at least one `$` operator.
    pub update: Option<Document>,
    /// Update options.
    pub options: UpdateOptions,
}

impl UpdateManyArgs {
    /// Update documents matching `filter` with `update`.
    pub fn new(filter: Document, update: Document) -> Self {
        Self {
            filter: Some(filter),
            update: Some(update),
            options: UpdateOptions::default(),
        }
    }

    /// Enable or disable upsert.
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.options.upsert = upsert;
        self
    }
}

/// Arguments for `delete_many`.
#[derive(Debug, Clone, Default)]
pub struct DeleteManyArgs {
    /// Selects the documents to delete. `{}` deletes everything.
    pub filter: Option<Document>,
}

impl DeleteManyArgs {
    /// Delete documents matching `filter`.
    pub fn filter(filter: Document) -> Self {
        Self {
            filter: Some(filter),
        }
    }
}

/// Options for the `find_one_and_*` family.
#[derive(Debug, Clone, PartialEq)]
pub struct FindAndModifyOptions {
    /// Return the document as it was before the change. Defaults to `true`.
    pub return_original: bool,
    /// Insert a document when nothing matches. Ignored by delete.
    pub upsert: bool,
    /// Picks the document when several match.
    pub sort: Option<Document>,
    /// Fields to include or exclude from the returned document.
    pub projection: Option<Document>,
}

impl Default for FindAndModifyOptions {
    fn default() -> Self {
        Self {
            return_original: true,
            upsert: false,
            sort: None,
            projection: None,
        }
    }
}

impl FindAndModifyOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose between the original and the modified document.
    pub fn return_original(mut self, original: bool) -> Self {
        self.return_original = original;
        self
    }

    /// Enable or disable upsert.
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    /// Set the sort used to pick among several matches.
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the projection of the returned document.
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Arguments for `find_one_and_update`.
#[derive(Debug, Clone, Default)]
pub struct FindOneAndUpdateArgs {
    /// Selects the document.
    pub filter: Option<Document>,
    /// Update document.
    pub update: Option<Document>,
    /// Options.
    pub options: FindAndModifyOptions,
}

impl FindOneAndUpdateArgs {
    /// Update the first document matching `filter`.
    pub fn new(filter: Document, update: Document) -> Self {
        Self {
            filter: Some(filter),
            update: Some(update),
            options: FindAndModifyOptions::default(),
        }
    }

    /// Replace the options.
    pub fn options(mut self, options: FindAndModifyOptions) -> Self {
        self.options = options;
        self
    }
}

/// Arguments for `find_one_and_replace`.
#[derive(Debug, Clone, Default)]
pub struct FindOneAndReplaceArgs {
    /// Selects the document.
    pub filter: Option<Document>,
    /// New document body; the `_id` is kept.
    pub replacement: Option<Document>,
    /// Options.
    pub options: FindAndModifyOptions,
}

impl FindOneAndReplaceArgs {
    /// Replace the first document matching `filter`.
    pub fn new(filter: Document, replacement: Document) -> Self {
        Self {
            filter: Some(filter),
            replacement: Some(replacement),
            options: FindAndModifyOptions::default(),
        }
    }

    /// Replace the options.
    pub fn options(mut self, options: FindAndModifyOptions) -> Self {
        self.options = options;
        self
    }
}

/// Arguments for `find_one_and_delete`.
#[derive(Debug, Clone, Default)]
pub struct FindOneAndDeleteArgs {
    /// Selects the document.
    pub filter: Option<Document>,
    /// Options; only `sort` and `projection` apply.
    pub options: FindAndModifyOptions,
}

impl FindOneAndDeleteArgs {
    /// Delete the first document matching `filter`.
    pub fn new(filter: Document) -> Self {
        Self {
            filter: Some(filter),
            options: FindAndModifyOptions::default(),
        }
    }

    /// Replace the options.
    pub fn options(mut self, options: FindAndModifyOptions) -> Self {
        self.options = options;
        self
    }
}

/// Options for `create_index`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Explicit index name; generated from the keys when unset.
    pub name: Option<String>,
    /// Reject duplicate keys.
    pub unique: bool,
    /// Skip documents missing the indexed fields.
    pub sparse: bool,
    /// Build in the background (ignored by servers 4.2+).
    pub background: bool,
    /// TTL in seconds for date-valued keys.
    pub expire_after_secs: Option<u64>,
}

/// Arguments for `create_index`.
#[derive(Debug, Clone, Default)]
pub struct CreateIndexArgs {
    /// A field name or a key document of field → direction.
    pub field_or_spec: Option<IndexSpec>,
    /// Index options.
    pub options: IndexOptions,
}

impl CreateIndexArgs {
    /// Index the given field or key specification.
    pub fn new(field_or_spec: impl Into<IndexSpec>) -> Self {
        Self {
            field_or_spec: Some(field_or_spec.into()),
            options: IndexOptions::default(),
        }
    }

    /// Name the index explicitly.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// Make the index unique.
    pub fn unique(mut self, unique: bool) -> Self {
        self.options.unique = unique;
        self
    }

    /// Make the index sparse.
    pub fn sparse(mut self, sparse: bool) -> Self {
        self.options.sparse = sparse;
        self
    }
}

/// Arguments for `create_collection`.
#[derive(Debug, Clone, Default)]
pub struct CreateCollectionArgs {
    /// Name of the collection to create.
    pub name: Option<String>,
}

impl CreateCollectionArgs {
    /// Create the named collection.
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Arguments for `aggregate`.
#[derive(Debug, Clone, Default)]
pub struct AggregateArgs {
    /// Ordered stage documents.
    pub pipeline: Option<Vec<Document>>,
}

impl AggregateArgs {
    /// Run the given pipeline.
    pub fn pipeline(pipeline: Vec<Document>) -> Self {
        Self {
            pipeline: Some(pipeline),
        }
    }
}

/// Check that every top-level key of `update` is an operator.
pub fn is_operator_update(update: &Document) -> bool {
    !update.is_empty() && update.keys().all(|k| k.starts_with('$'))
}

/// Check that no top-level key of `replacement` is an operator.
pub fn is_plain_replacement(replacement: &Document) -> bool {
    !replacement.keys().any(|k| k.starts_with('$'))
}
