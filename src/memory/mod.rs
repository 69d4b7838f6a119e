//! In-process [`DocumentDriver`] for tests and local development.
//!
//! Collections live in memory for the lifetime of the driver. The supported
//! query, update and aggregation subset covers equality and comparison
//! filters, `$set`/`$unset`/`$inc`/`$setOnInsert`/`$push`, projections,
//! sorting, and the `$match`/`$project`/`$group`/`$sort`/`$skip`/`$limit`/`$count`
//! stages. Anything else is rejected with a server-style error.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mongo_facade::{Client, FacadeConfig, memory::MemoryDriver};
//!
//! let config = FacadeConfig::new("localhost", 27017, "test");
//! let client = Client::with_driver(config, Arc::new(MemoryDriver::new("test")))?;
//! client.connect().await?;
//! ```

mod aggregate;
mod query;
mod update;
mod value;

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::args::{IndexOptions, is_operator_update};
use crate::config::FacadeConfig;
use crate::driver::{DocumentCursor, DocumentDriver, FindAndModify, FindOptions, ModifyAction};
use crate::error::{FacadeError, FacadeResult, messages};
use crate::index::index_name;
use crate::results::{DeleteResult, FindAndModifyResult, LastErrorObject, UpdateResult};

pub use aggregate::run_pipeline;
pub use query::{matches, project, sort_documents};
pub use update::apply_update;
pub use value::{compare, get_path, values_equal};

const DUPLICATE_KEY: i32 = 11000;
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone)]
struct IndexEntry {
    name: String,
    keys: Document,
    unique: bool,
}

#[derive(Debug, Clone)]
struct MemoryCollection {
    docs: Vec<Document>,
    indexes: Vec<IndexEntry>,
}

impl MemoryCollection {
    fn new() -> Self {
        Self {
            docs: Vec::new(),
            indexes: vec![IndexEntry {
                name: ID_INDEX.to_string(),
                keys: bson::doc! { "_id": 1 },
                unique: true,
            }],
        }
    }

    fn index_key(doc: &Document, keys: &Document) -> Vec<Bson> {
        keys.keys()
            .map(|path| get_path(doc, path).cloned().unwrap_or(Bson::Null))
            .collect()
    }

    /// Reject `candidate` if it collides with another document on a unique index.
    fn check_unique(
        &self,
        namespace: &str,
        candidate: &Document,
        skip: Option<usize>,
    ) -> FacadeResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key = Self::index_key(candidate, &index.keys);
            let clash = self.docs.iter().enumerate().any(|(pos, existing)| {
                Some(pos) != skip
                    && Self::index_key(existing, &index.keys)
                        .iter()
                        .zip(key.iter())
                        .all(|(a, b)| values_equal(a, b))
            });
            if clash {
                return Err(duplicate_key(namespace, &index.name, &index.keys, &key));
            }
        }
        Ok(())
    }

    fn first_match(
        &self,
        filter: &Document,
        sort: Option<&Document>,
    ) -> FacadeResult<Option<usize>> {
        let mut candidates = Vec::new();
        for (pos, doc) in self.docs.iter().enumerate() {
            if matches(doc, filter)? {
                candidates.push(pos);
            }
        }

        match sort {
            Some(sort) => {
                let keys = query::sort_keys(sort)?;
                candidates.sort_by(|a, b| query::compare_by(&self.docs[*a], &self.docs[*b], &keys));
                Ok(candidates.first().copied())
            }
            None => Ok(candidates.first().copied()),
        }
    }
}

fn duplicate_key(namespace: &str, index: &str, keys: &Document, values: &[Bson]) -> FacadeError {
    let rendered: Vec<String> = keys
        .keys()
        .zip(values.iter())
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();
    FacadeError::server_code(
        DUPLICATE_KEY,
        format!(
            "E11000 duplicate key error collection: {} index: {} dup key: {{ {} }}",
            namespace,
            index,
            rendered.join(", ")
        ),
    )
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    closed: bool,
    collections: IndexMap<String, MemoryCollection>,
}

/// A [`DocumentDriver`] that keeps every collection in process memory.
pub struct MemoryDriver {
    database: String,
    state: RwLock<State>,
}

impl MemoryDriver {
    /// Create an empty in-memory database.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            state: RwLock::new(State::default()),
        }
    }

    /// Create an empty in-memory database named after `config.name`.
    pub fn from_config(config: &FacadeConfig) -> Self {
        Self::new(config.name.clone())
    }

    /// Snapshot of a collection's documents in natural order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.state
            .read()
            .collections
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }

    /// Names of the indexes on a collection.
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.state
            .read()
            .collections
            .get(collection)
            .map(|c| c.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default()
    }

    fn namespace(&self, collection: &str) -> String {
        format!("{}.{}", self.database, collection)
    }

    fn ensure_open(state: &State) -> FacadeResult<()> {
        if state.connected {
            Ok(())
        } else if state.closed {
            Err(FacadeError::Closed)
        } else {
            Err(FacadeError::NotConnected)
        }
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> FacadeResult<T>) -> FacadeResult<T> {
        let state = self.state.read();
        Self::ensure_open(&state)?;
        f(&state)
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> FacadeResult<T>) -> FacadeResult<T> {
        let mut state = self.state.write();
        Self::ensure_open(&state)?;
        f(&mut state)
    }

    fn insert_into(
        &self,
        coll: &mut MemoryCollection,
        collection: &str,
        mut doc: Document,
    ) -> FacadeResult<Bson> {
        if !doc.contains_key("_id") {
            let mut with_id = Document::new();
            with_id.insert("_id", ObjectId::new());
            for (key, value) in doc {
                with_id.insert(key, value);
            }
            doc = with_id;
        }
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        coll.check_unique(&self.namespace(collection), &doc, None)?;
        coll.docs.push(doc);
        Ok(id)
    }

    fn replace_body(original: &Document, replacement: &Document) -> FacadeResult<Document> {
        let id = original.get("_id").cloned().unwrap_or(Bson::Null);
        if let Some(new_id) = replacement.get("_id") {
            if !values_equal(new_id, &id) {
                return Err(FacadeError::server_code(
                    66,
                    "After applying the update, the (immutable) field '_id' was found to have been altered",
                ));
            }
        }

        let mut out = Document::new();
        out.insert("_id", id);
        for (key, value) in replacement {
            if key != "_id" {
                out.insert(key.clone(), value.clone());
            }
        }
        Ok(out)
    }

    /// The document `action` turns `original` into, or `None` for a delete.
    fn apply_action(original: &Document, action: &ModifyAction) -> FacadeResult<Option<Document>> {
        match action {
            ModifyAction::Update(update) => {
                let mut next = original.clone();
                apply_update(&mut next, update, false)?;
                Ok(Some(next))
            }
            ModifyAction::Replace(replacement) => Self::replace_body(original, replacement).map(Some),
            ModifyAction::Delete => Ok(None),
        }
    }

    /// The document an upsert inserts when nothing matched `filter`.
    fn upsert_body(filter: &Document, action: &ModifyAction) -> FacadeResult<Option<Document>> {
        let seed = query::equality_seed(filter);
        match action {
            ModifyAction::Update(update) => {
                let mut next = seed;
                apply_update(&mut next, update, true)?;
                Ok(Some(next))
            }
            ModifyAction::Replace(replacement) => {
                let mut next = Document::new();
                if let Some(id) = replacement.get("_id").or_else(|| seed.get("_id")) {
                    next.insert("_id", id.clone());
                }
                for (key, value) in replacement {
                    if key != "_id" {
                        next.insert(key.clone(), value.clone());
                    }
                }
                Ok(Some(next))
            }
            ModifyAction::Delete => Ok(None),
        }
    }

    fn modify(
        &self,
        coll: &mut MemoryCollection,
        collection: &str,
        request: &FindAndModify,
    ) -> FacadeResult<FindAndModifyResult> {
        let namespace = self.namespace(collection);
        let found = coll.first_match(&request.filter, request.sort.as_ref())?;

        let (value, last_error_object) = match found {
            Some(pos) => match Self::apply_action(&coll.docs[pos], &request.action)? {
                None => {
                    let removed = coll.docs.remove(pos);
                    (Some(removed), LastErrorObject { n: 1, ..Default::default() })
                }
                Some(updated) => {
                    coll.check_unique(&namespace, &updated, Some(pos))?;
                    let original = std::mem::replace(&mut coll.docs[pos], updated);
                    let value = if request.return_new {
                        coll.docs[pos].clone()
                    } else {
                        original
                    };
                    (
                        Some(value),
                        LastErrorObject {
                            n: 1,
                            updated_existing: true,
                            upserted: None,
                        },
                    )
                }
            },
            None if request.upsert => match Self::upsert_body(&request.filter, &request.action)? {
                Some(inserted) => {
                    let id = self.insert_into(coll, collection, inserted)?;
                    let value = if request.return_new {
                        coll.docs.last().cloned()
                    } else {
                        None
                    };
                    (
                        value,
                        LastErrorObject {
                            n: 1,
                            updated_existing: false,
                            upserted: Some(id),
                        },
                    )
                }
                None => (None, LastErrorObject::default()),
            },
            None => (None, LastErrorObject::default()),
        };

        let value = match (value, &request.projection) {
            (Some(doc), Some(projection)) => Some(project(&doc, projection)?),
            (value, _) => value,
        };

        Ok(FindAndModifyResult {
            value,
            last_error_object,
            ok: 1.0,
        })
    }
}

#[async_trait]
impl DocumentDriver for MemoryDriver {
    async fn connect(&self) -> FacadeResult<()> {
        let mut state = self.state.write();
        if state.connected {
            return Err(FacadeError::connection("client is already connected"));
        }
        state.connected = true;
        state.closed = false;
        debug!(database = %self.database, "In-memory session established");
        Ok(())
    }

    async fn close(&self) -> FacadeResult<()> {
        let mut state = self.state.write();
        if state.connected {
            state.connected = false;
            state.closed = true;
            debug!(database = %self.database, "In-memory session closed");
        }
        Ok(())
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> FacadeResult<Bson> {
        self.write(|state| {
            let coll = state
                .collections
                .entry(collection.to_string())
                .or_insert_with(MemoryCollection::new);
            self.insert_into(coll, collection, doc)
        })
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> FacadeResult<Vec<Bson>> {
        self.write(|state| {
            let coll = state
                .collections
                .entry(collection.to_string())
                .or_insert_with(MemoryCollection::new);
            docs.into_iter()
                .map(|doc| self.insert_into(coll, collection, doc))
                .collect()
        })
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> FacadeResult<DocumentCursor> {
        let docs = self.read(|state| {
            let mut docs = Vec::new();
            if let Some(coll) = state.collections.get(collection) {
                for doc in &coll.docs {
                    if matches(doc, &filter)? {
                        docs.push(doc.clone());
                    }
                }
            }
            Ok(docs)
        })?;

        let mut docs = docs;
        if let Some(ref sort) = options.sort {
            sort_documents(&mut docs, sort)?;
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            Some(0) | None => usize::MAX,
            Some(n) => n.unsigned_abs() as usize,
        };

        let docs = docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match options.projection {
                Some(ref projection) => project(&doc, projection),
                None => Ok(doc),
            })
            .collect::<FacadeResult<Vec<_>>>()?;

        Ok(DocumentCursor::from_documents(docs))
    }

    async fn count(&self, collection: &str, filter: Document) -> FacadeResult<u64> {
        self.read(|state| {
            let mut count = 0;
            if let Some(coll) = state.collections.get(collection) {
                for doc in &coll.docs {
                    if matches(doc, &filter)? {
                        count += 1;
                    }
                }
            }
            Ok(count)
        })
    }

    async fn distinct(
        &self,
        collection: &str,
        key: &str,
        filter: Document,
    ) -> FacadeResult<Vec<Bson>> {
        self.read(|state| {
            let mut values: Vec<Bson> = Vec::new();
            let mut add = |value: &Bson| {
                if !values.iter().any(|v| values_equal(v, value)) {
                    values.push(value.clone());
                }
            };

            if let Some(coll) = state.collections.get(collection) {
                for doc in &coll.docs {
                    if !matches(doc, &filter)? {
                        continue;
                    }
                    match get_path(doc, key) {
                        Some(Bson::Array(items)) => items.iter().for_each(&mut add),
                        Some(value) => add(value),
                        None => {}
                    }
                }
            }
            Ok(values)
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> FacadeResult<UpdateResult> {
        if !is_operator_update(&update) {
            return Err(FacadeError::server_code(9, messages::UPDATE_NO_ATOMIC));
        }

        self.write(|state| {
            let namespace = self.namespace(collection);
            let mut scratch = state
                .collections
                .get(collection)
                .cloned()
                .unwrap_or_else(MemoryCollection::new);

            let mut matched = Vec::new();
            for (pos, doc) in scratch.docs.iter().enumerate() {
                if matches(doc, &filter)? {
                    matched.push(pos);
                }
            }

            let result = if matched.is_empty() && upsert {
                let mut seeded = query::equality_seed(&filter);
                apply_update(&mut seeded, &update, true)?;
                let id = self.insert_into(&mut scratch, collection, seeded)?;
                UpdateResult {
                    acknowledged: true,
                    matched_count: 0,
                    modified_count: 0,
                    upserted_count: 1,
                    upserted_id: Some(id),
                }
            } else {
                let mut modified = 0;
                for &pos in &matched {
                    let mut next = scratch.docs[pos].clone();
                    if apply_update(&mut next, &update, false)? {
                        scratch.check_unique(&namespace, &next, Some(pos))?;
                        scratch.docs[pos] = next;
                        modified += 1;
                    }
                }
                UpdateResult {
                    acknowledged: true,
                    matched_count: matched.len() as u64,
                    modified_count: modified,
                    upserted_count: 0,
                    upserted_id: None,
                }
            };

            state.collections.insert(collection.to_string(), scratch);
            Ok(result)
        })
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> FacadeResult<DeleteResult> {
        self.write(|state| {
            let Some(coll) = state.collections.get_mut(collection) else {
                return Ok(DeleteResult {
                    acknowledged: true,
                    deleted_count: 0,
                });
            };

            // Evaluate every match before removing anything.
            let doomed = coll
                .docs
                .iter()
                .map(|doc| matches(doc, &filter))
                .collect::<FacadeResult<Vec<bool>>>()?;
            let deleted = doomed.iter().filter(|d| **d).count() as u64;

            let mut flags = doomed.into_iter();
            coll.docs.retain(|_| !flags.next().unwrap_or(false));

            Ok(DeleteResult {
                acknowledged: true,
                deleted_count: deleted,
            })
        })
    }

    async fn find_and_modify(
        &self,
        collection: &str,
        request: FindAndModify,
    ) -> FacadeResult<FindAndModifyResult> {
        debug!(
            collection = %collection,
            action = request.action_name(),
            "In-memory findAndModify"
        );

        self.write(|state| {
            let coll = state
                .collections
                .entry(collection.to_string())
                .or_insert_with(MemoryCollection::new);

            let mut scratch = coll.clone();
            let result = self.modify(&mut scratch, collection, &request)?;
            *coll = scratch;
            Ok(result)
        })
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
    ) -> FacadeResult<String> {
        let name = match options.name {
            Some(name) => name,
            None => index_name(&keys)?,
        };

        self.write(|state| {
            let namespace = self.namespace(collection);
            let coll = state
                .collections
                .entry(collection.to_string())
                .or_insert_with(MemoryCollection::new);

            if let Some(existing) = coll.indexes.iter().find(|i| i.name == name) {
                if existing.keys == keys && existing.unique == options.unique {
                    return Ok(name);
                }
                return Err(FacadeError::server_code(
                    INDEX_KEY_SPECS_CONFLICT,
                    format!(
                        "An existing index has the same name as the requested index. Requested index: {}",
                        name
                    ),
                ));
            }

            if options.unique {
                for (pos, doc) in coll.docs.iter().enumerate() {
                    let key = MemoryCollection::index_key(doc, &keys);
                    let clash = coll.docs[pos + 1..].iter().any(|other| {
                        MemoryCollection::index_key(other, &keys)
                            .iter()
                            .zip(key.iter())
                            .all(|(a, b)| values_equal(a, b))
                    });
                    if clash {
                        return Err(duplicate_key(&namespace, &name, &keys, &key));
                    }
                }
            }

            coll.indexes.push(IndexEntry {
                name: name.clone(),
                keys,
                unique: options.unique,
            });
            Ok(name)
        })
    }

    async fn create_collection(&self, name: &str) -> FacadeResult<()> {
        self.write(|state| {
            if state.collections.contains_key(name) {
                return Err(FacadeError::server_code(
                    NAMESPACE_EXISTS,
                    format!("Collection already exists. NS: {}", self.namespace(name)),
                ));
            }
            state
                .collections
                .insert(name.to_string(), MemoryCollection::new());
            Ok(())
        })
    }

    async fn list_collections(&self) -> FacadeResult<Vec<String>> {
        self.read(|state| Ok(state.collections.keys().cloned().collect()))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> FacadeResult<DocumentCursor> {
        let docs = self.read(|state| {
            Ok(state
                .collections
                .get(collection)
                .map(|c| c.docs.clone())
                .unwrap_or_default())
        })?;

        let out = run_pipeline(docs, &pipeline)?;
        Ok(DocumentCursor::from_documents(out))
    }
}
