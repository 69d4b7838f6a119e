//! The driver seam the facade delegates to.
//!
//! [`DocumentDriver`] is implemented by [`MongoDriver`](crate::mongo::MongoDriver)
//! for real servers and by [`MemoryDriver`](crate::memory::MemoryDriver) for
//! in-process use. Drivers receive arguments that the facade has already
//! checked and defaulted.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::args::IndexOptions;
use crate::error::FacadeResult;
use crate::results::{DeleteResult, FindAndModifyResult, UpdateResult};

/// Lazy handle over a result set.
///
/// Documents are pulled from the driver as the stream is polled.
pub struct DocumentCursor {
    inner: BoxStream<'static, FacadeResult<Document>>,
}

impl DocumentCursor {
    /// Wrap a driver stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = FacadeResult<Document>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// A cursor over documents already in memory.
    pub fn from_documents(docs: Vec<Document>) -> Self {
        Self::new(futures::stream::iter(docs.into_iter().map(Ok)))
    }
}

impl Stream for DocumentCursor {
    type Item = FacadeResult<Document>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Query modifiers passed to [`DocumentDriver::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Fields to include or exclude.
    pub projection: Option<Document>,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Documents to skip.
    pub skip: Option<u64>,
    /// Maximum documents to return; `0` means no limit.
    pub limit: Option<i64>,
}

/// What a find-and-modify does to the selected document.
#[derive(Debug, Clone, PartialEq)]
pub enum ModifyAction {
    /// Apply an update document.
    Update(Document),
    /// Replace the body, keeping `_id`.
    Replace(Document),
    /// Remove the document.
    Delete,
}

/// A single find-and-modify request.
#[derive(Debug, Clone, PartialEq)]
pub struct FindAndModify {
    /// Selects the document.
    pub filter: Document,
    /// Change to apply.
    pub action: ModifyAction,
    /// Picks among several matches.
    pub sort: Option<Document>,
    /// Projection of the returned document.
    pub projection: Option<Document>,
    /// Insert when nothing matches.
    pub upsert: bool,
    /// Return the modified document instead of the original.
    pub return_new: bool,
}

impl FindAndModify {
    /// Short name of the action, for logging.
    pub fn action_name(&self) -> &'static str {
        match self.action {
            ModifyAction::Update(_) => "update",
            ModifyAction::Replace(_) => "replace",
            ModifyAction::Delete => "delete",
        }
    }
}

/// A document store the facade can delegate to.
///
/// Every method targets the database chosen at construction; collection
/// names are resolved per call.
#[async_trait]
pub trait DocumentDriver: Send + Sync {
    /// Establish the session.
    async fn connect(&self) -> FacadeResult<()>;

    /// Tear the session down.
    async fn close(&self) -> FacadeResult<()>;

    /// Name of the database operations run against.
    fn database_name(&self) -> &str;

    /// Insert one document, returning its `_id`.
    async fn insert_one(&self, collection: &str, doc: Document) -> FacadeResult<Bson>;

    /// Insert documents in order, returning their `_id`s in input order.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> FacadeResult<Vec<Bson>>;

    /// Run a query, returning a lazy cursor.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> FacadeResult<DocumentCursor>;

    /// Count documents matching `filter`.
    async fn count(&self, collection: &str, filter: Document) -> FacadeResult<u64>;

    /// Distinct values of `key` among documents matching `filter`.
    async fn distinct(&self, collection: &str, key: &str, filter: Document)
    -> FacadeResult<Vec<Bson>>;

    /// Update every document matching `filter`.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> FacadeResult<UpdateResult>;

    /// Delete every document matching `filter`.
    async fn delete_many(&self, collection: &str, filter: Document) -> FacadeResult<DeleteResult>;

    /// Atomically select and modify one document.
    async fn find_and_modify(
        &self,
        collection: &str,
        request: FindAndModify,
    ) -> FacadeResult<FindAndModifyResult>;

    /// Create an index, returning its name.
    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
    ) -> FacadeResult<String>;

    /// Create a collection.
    async fn create_collection(&self, name: &str) -> FacadeResult<()>;

    /// Names of the collections in the database.
    async fn list_collections(&self) -> FacadeResult<Vec<String>>;

    /// Run an aggregation pipeline, returning a lazy cursor.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> FacadeResult<DocumentCursor>;
}
