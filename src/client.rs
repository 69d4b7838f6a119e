//! The client facade.
//!
//! [`Client`] exposes one async method per operation. Each method checks and
//! defaults its arguments, verifies the connection state, then delegates to
//! the configured [`DocumentDriver`].

use std::sync::Arc;

use bson::{Bson, Document, oid::ObjectId};
use futures::TryStreamExt;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::args::{
    AggregateArgs, CountArgs, CreateCollectionArgs, CreateIndexArgs, DeleteManyArgs, DistinctArgs,
    FindAndModifyOptions, FindArgs, FindOneAndDeleteArgs, FindOneAndReplaceArgs,
    FindOneAndUpdateArgs, InsertManyArgs, InsertOneArgs, UpdateManyArgs, is_operator_update,
    is_plain_replacement,
};
use crate::config::FacadeConfig;
use crate::driver::{DocumentDriver, FindAndModify, FindOptions, ModifyAction};
use crate::error::{FacadeError, FacadeResult, messages};
use crate::index::index_name;
use crate::memory::MemoryDriver;
use crate::mongo::MongoDriver;
use crate::results::{
    DeleteResult, FindAndModifyResult, FindOutput, InsertManyResult, InsertOneResult, UpdateResult,
};

/// Lifecycle of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, not yet connected.
    Idle,
    /// Connected; operations are accepted.
    Connected,
    /// Closed; the client cannot be reused.
    Closed,
}

/// Async facade over a document database.
///
/// Cloning is cheap; clones share the driver and the connection state.
///
/// ```rust,ignore
/// use mongo_facade::prelude::*;
///
/// let client = Client::new(FacadeConfig::new("localhost", 27017, "app"))?;
/// client.connect().await?;
///
/// let inserted = client
///     .insert_one("docs", InsertOneArgs::doc(doc! { "title": "hello" }))
///     .await?;
/// let docs = client
///     .find("docs", FindArgs::new().query(doc! { "title": "hello" }))
///     .await?
///     .into_documents()
///     .await?;
///
/// client.close().await?;
/// ```
#[derive(Clone)]
pub struct Client {
    config: Arc<FacadeConfig>,
    driver: Arc<dyn DocumentDriver>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl Client {
    /// Create a client backed by a MongoDB server.
    ///
    /// Nothing is contacted until [`connect`](Self::connect).
    pub fn new(config: FacadeConfig) -> FacadeResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let driver = Arc::new(MongoDriver::new(config.clone()));
        Ok(Self::from_parts(config, driver))
    }

    /// Create a client backed by an in-process [`MemoryDriver`].
    pub fn in_memory(config: FacadeConfig) -> FacadeResult<Self> {
        config.validate()?;
        let driver = Arc::new(MemoryDriver::from_config(&config));
        Ok(Self::from_parts(Arc::new(config), driver))
    }

    /// Create a client over any driver.
    pub fn with_driver(
        config: FacadeConfig,
        driver: Arc<dyn DocumentDriver>,
    ) -> FacadeResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(Arc::new(config), driver))
    }

    // Callers validate `config` first.
    fn from_parts(config: Arc<FacadeConfig>, driver: Arc<dyn DocumentDriver>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            driver,
            state: Arc::new(state),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    /// Name of the database operations run against.
    pub fn database_name(&self) -> &str {
        self.driver.database_name()
    }

    /// Get the underlying driver.
    pub fn driver(&self) -> &Arc<dyn DocumentDriver> {
        &self.driver
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Check whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch connection state changes.
    ///
    /// The receiver starts at the current state, so subscribing after
    /// `connect` still observes [`ConnectionState::Connected`].
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Resolve once the client is connected.
    ///
    /// Fails with [`FacadeError::Closed`] if the client closes first.
    pub async fn wait_connected(&self) -> FacadeResult<()> {
        let mut rx = self.state.subscribe();
        let state = *rx
            .wait_for(|s| *s != ConnectionState::Idle)
            .await
            .map_err(|_| FacadeError::Closed)?;

        match state {
            ConnectionState::Connected => Ok(()),
            _ => Err(FacadeError::Closed),
        }
    }

    /// Open the driver session.
    ///
    /// Resolves after [`ConnectionState::Connected`] has been published.
    pub async fn connect(&self) -> FacadeResult<()> {
        match self.state() {
            ConnectionState::Idle => {}
            ConnectionState::Connected => {
                return Err(FacadeError::connection("client is already connected"));
            }
            ConnectionState::Closed => return Err(FacadeError::Closed),
        }

        self.driver.connect().await?;
        self.state.send_replace(ConnectionState::Connected);

        info!(database = %self.database_name(), "Client connected");
        Ok(())
    }

    /// Release the driver session.
    ///
    /// A no-op when the client is not connected.
    pub async fn close(&self) -> FacadeResult<()> {
        if self.state() != ConnectionState::Connected {
            debug!(state = ?self.state(), "Close on a client that is not connected");
            return Ok(());
        }

        self.driver.close().await?;
        self.state.send_replace(ConnectionState::Closed);

        info!(database = %self.database_name(), "Client closed");
        Ok(())
    }

    fn ensure_connected(&self) -> FacadeResult<()> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Idle => Err(FacadeError::NotConnected),
            ConnectionState::Closed => Err(FacadeError::Closed),
        }
    }

    /// Insert a single document. An omitted document inserts `{}`.
    pub async fn insert_one(
        &self,
        collection: &str,
        args: InsertOneArgs,
    ) -> FacadeResult<InsertOneResult> {
        check_collection(collection)?;
        let doc = with_id(args.doc.unwrap_or_default());
        self.ensure_connected()?;

        debug!(collection = %collection, operation = "insert_one", "Inserting document");
        let inserted_id = self.driver.insert_one(collection, doc.clone()).await?;

        Ok(InsertOneResult {
            acknowledged: true,
            inserted_count: 1,
            inserted_id,
            ops: vec![doc],
        })
    }

    /// Insert documents in order.
    pub async fn insert_many(
        &self,
        collection: &str,
        args: InsertManyArgs,
    ) -> FacadeResult<InsertManyResult> {
        check_collection(collection)?;
        let docs = args
            .docs
            .ok_or_else(|| FacadeError::argument(messages::DOCS_NOT_SEQUENCE))?;
        if docs.is_empty() {
            return Err(FacadeError::argument(messages::DOCS_EMPTY));
        }
        let docs: Vec<Document> = docs.into_iter().map(with_id).collect();
        self.ensure_connected()?;

        debug!(
            collection = %collection,
            operation = "insert_many",
            count = docs.len(),
            "Inserting documents"
        );
        let ids = self.driver.insert_many(collection, docs.clone()).await?;

        Ok(InsertManyResult {
            acknowledged: true,
            inserted_count: ids.len() as u64,
            inserted_ids: ids.into_iter().enumerate().collect(),
            ops: docs,
        })
    }

    /// Run a query.
    ///
    /// Returns materialized documents unless `args.cursor` is set.
    pub async fn find(&self, collection: &str, args: FindArgs) -> FacadeResult<FindOutput> {
        check_collection(collection)?;
        let options = FindOptions {
            projection: args.effective_projection().cloned(),
            sort: args.sort,
            skip: args.skip,
            limit: args.limit,
        };
        let query = args.query.unwrap_or_default();
        self.ensure_connected()?;

        debug!(
            collection = %collection,
            operation = "find",
            cursor = args.cursor,
            "Running query"
        );
        let cursor = self.driver.find(collection, query, options).await?;

        if args.cursor {
            Ok(FindOutput::Cursor(cursor))
        } else {
            Ok(FindOutput::Documents(cursor.try_collect().await?))
        }
    }

    /// Count matching documents.
    pub async fn count(&self, collection: &str, args: CountArgs) -> FacadeResult<u64> {
        check_collection(collection)?;
        let query = args.query.unwrap_or_default();
        self.ensure_connected()?;

        debug!(collection = %collection, operation = "count", "Counting documents");
        self.driver.count(collection, query).await
    }

    /// Distinct values of a field, without duplicates.
    pub async fn distinct(&self, collection: &str, args: DistinctArgs) -> FacadeResult<Vec<Bson>> {
        check_collection(collection)?;
        let key = args
            .key
            .ok_or_else(|| FacadeError::argument(messages::DISTINCT_KEY_MISSING))?;
        let query = args.query.unwrap_or_default();
        self.ensure_connected()?;

        debug!(collection = %collection, operation = "distinct", key = %key, "Listing distinct values");
        self.driver.distinct(collection, &key, query).await
    }

    /// Update every matching document.
    pub async fn update_many(
        &self,
        collection: &str,
        args: UpdateManyArgs,
    ) -> FacadeResult<UpdateResult> {
        check_collection(collection)?;
        let filter = args
            .filter
            .ok_or_else(|| FacadeError::argument(messages::SELECTOR_INVALID))?;
        let update = args
            .update
            .filter(is_operator_update)
            .ok_or_else(|| FacadeError::argument(messages::UPDATE_NO_ATOMIC))?;
        self.ensure_connected()?;

        debug!(
            collection = %collection,
            operation = "update_many",
            upsert = args.options.upsert,
            "Updating documents"
        );
        self.driver
            .update_many(collection, filter, update, args.options.upsert)
            .await
    }

    /// Delete every matching document.
    pub async fn delete_many(
        &self,
        collection: &str,
        args: DeleteManyArgs,
    ) -> FacadeResult<DeleteResult> {
        check_collection(collection)?;
        let filter = require_filter(args.filter)?;
        self.ensure_connected()?;

        debug!(collection = %collection, operation = "delete_many", "Deleting documents");
        self.driver.delete_many(collection, filter).await
    }

    /// Update one document, returning it.
    pub async fn find_one_and_update(
        &self,
        collection: &str,
        args: FindOneAndUpdateArgs,
    ) -> FacadeResult<FindAndModifyResult> {
        check_collection(collection)?;
        let filter = require_filter(args.filter)?;
        let update = args
            .update
            .ok_or_else(|| FacadeError::argument(messages::UPDATE_NOT_OBJECT))?;
        if !is_operator_update(&update) {
            return Err(FacadeError::argument(messages::UPDATE_NO_ATOMIC));
        }

        let request = modify_request(filter, ModifyAction::Update(update), args.options);
        self.find_and_modify(collection, request).await
    }

    /// Replace one document's body, returning it.
    pub async fn find_one_and_replace(
        &self,
        collection: &str,
        args: FindOneAndReplaceArgs,
    ) -> FacadeResult<FindAndModifyResult> {
        check_collection(collection)?;
        let filter = require_filter(args.filter)?;
        let replacement = args
            .replacement
            .ok_or_else(|| FacadeError::argument(messages::REPLACEMENT_NOT_OBJECT))?;
        if !is_plain_replacement(&replacement) {
            return Err(FacadeError::argument(messages::REPLACEMENT_HAS_ATOMIC));
        }

        let request = modify_request(filter, ModifyAction::Replace(replacement), args.options);
        self.find_and_modify(collection, request).await
    }

    /// Delete one document, returning it.
    pub async fn find_one_and_delete(
        &self,
        collection: &str,
        args: FindOneAndDeleteArgs,
    ) -> FacadeResult<FindAndModifyResult> {
        check_collection(collection)?;
        let filter = require_filter(args.filter)?;

        let mut request = modify_request(filter, ModifyAction::Delete, args.options);
        request.upsert = false;
        request.return_new = false;
        self.find_and_modify(collection, request).await
    }

    async fn find_and_modify(
        &self,
        collection: &str,
        request: FindAndModify,
    ) -> FacadeResult<FindAndModifyResult> {
        self.ensure_connected()?;

        debug!(
            collection = %collection,
            operation = "find_and_modify",
            action = request.action_name(),
            upsert = request.upsert,
            "Modifying one document"
        );
        self.driver.find_and_modify(collection, request).await
    }

    /// Create an index, returning its name.
    ///
    /// Without an explicit `name` option the name is derived from the keys,
    /// e.g. `title_-1`.
    pub async fn create_index(
        &self,
        collection: &str,
        args: CreateIndexArgs,
    ) -> FacadeResult<String> {
        check_collection(collection)?;
        let keys = args
            .field_or_spec
            .ok_or_else(|| FacadeError::argument(messages::INDEX_KEYS_EMPTY))?
            .to_keys()?;
        let mut options = args.options;
        if options.name.is_none() {
            options.name = Some(index_name(&keys)?);
        }
        self.ensure_connected()?;

        debug!(
            collection = %collection,
            operation = "create_index",
            name = ?options.name,
            "Creating index"
        );
        self.driver.create_index(collection, keys, options).await
    }

    /// Create a collection.
    pub async fn create_collection(&self, args: CreateCollectionArgs) -> FacadeResult<()> {
        let name = args
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| FacadeError::argument(messages::COLLECTION_NAME_MISSING))?;
        self.ensure_connected()?;

        debug!(collection = %name, operation = "create_collection", "Creating collection");
        self.driver.create_collection(&name).await
    }

    /// Names of the collections in the database.
    pub async fn list_collections(&self) -> FacadeResult<Vec<String>> {
        self.ensure_connected()?;

        debug!(operation = "list_collections", "Listing collections");
        self.driver.list_collections().await
    }

    /// Run an aggregation pipeline and collect its output.
    pub async fn aggregate(
        &self,
        collection: &str,
        args: AggregateArgs,
    ) -> FacadeResult<Vec<Document>> {
        check_collection(collection)?;
        let pipeline = args
            .pipeline
            .ok_or_else(|| FacadeError::argument(messages::PIPELINE_NOT_SEQUENCE))?;
        for stage in &pipeline {
            check_stage(stage)?;
        }
        self.ensure_connected()?;

        debug!(
            collection = %collection,
            operation = "aggregate",
            stages = pipeline.len(),
            "Running aggregation"
        );
        let cursor = self.driver.aggregate(collection, pipeline).await?;
        cursor.try_collect().await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("database", &self.database_name())
            .field("state", &self.state())
            .finish()
    }
}

fn check_collection(collection: &str) -> FacadeResult<()> {
    if collection.is_empty() {
        return Err(FacadeError::argument(messages::COLLECTION_NAME_EMPTY));
    }
    Ok(())
}

fn require_filter(filter: Option<Document>) -> FacadeResult<Document> {
    filter.ok_or_else(|| FacadeError::argument(messages::FILTER_NOT_OBJECT))
}

fn check_stage(stage: &Document) -> FacadeResult<()> {
    let mut keys = stage.keys();
    match (keys.next(), keys.next()) {
        (Some(name), None) if name.starts_with('$') => Ok(()),
        (Some(name), None) => Err(FacadeError::argument(format!(
            "Unrecognized pipeline stage name: '{}'",
            name
        ))),
        _ => Err(FacadeError::argument(messages::PIPELINE_STAGE_SHAPE)),
    }
}

/// Put a generated `_id` first when the document has none.
fn with_id(doc: Document) -> Document {
    if doc.contains_key("_id") {
        return doc;
    }

    let mut out = Document::new();
    out.insert("_id", ObjectId::new());
    for (key, value) in doc {
        out.insert(key, value);
    }
    out
}

fn modify_request(
    filter: Document,
    action: ModifyAction,
    options: FindAndModifyOptions,
) -> FindAndModify {
    FindAndModify {
        filter,
        action,
        sort: options.sort,
        projection: options.projection,
        upsert: options.upsert,
        return_new: !options.return_original,
    }
}
