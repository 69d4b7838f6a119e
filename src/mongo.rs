//! MongoDB-backed driver with built-in connection pooling.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::options::{self, ClientOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::args::IndexOptions;
use crate::config::FacadeConfig;
use crate::driver::{DocumentCursor, DocumentDriver, FindAndModify, FindOptions, ModifyAction};
use crate::error::{FacadeError, FacadeResult};
use crate::results::{DeleteResult, FindAndModifyResult, UpdateResult};

#[derive(Clone)]
struct Session {
    client: Client,
    database: Database,
}

/// [`DocumentDriver`] over the official MongoDB driver.
///
/// Construction is lazy; the server is contacted on [`connect`](DocumentDriver::connect).
/// The MongoDB driver pools connections internally, so a single session is
/// shared by every operation.
pub struct MongoDriver {
    config: Arc<FacadeConfig>,
    session: RwLock<Option<Session>>,
}

impl MongoDriver {
    /// Create a driver for the given configuration.
    pub fn new(config: impl Into<Arc<FacadeConfig>>) -> Self {
        Self {
            config: config.into(),
            session: RwLock::new(None),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    /// The underlying database handle, while connected.
    pub fn database(&self) -> FacadeResult<Database> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.database.clone())
            .ok_or(FacadeError::NotConnected)
    }

    /// The underlying MongoDB client, while connected.
    pub fn inner(&self) -> FacadeResult<Client> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(FacadeError::NotConnected)
    }

    fn collection(&self, name: &str) -> FacadeResult<Collection<Document>> {
        Ok(self.database()?.collection(name))
    }

    async fn open(&self, options: ClientOptions) -> FacadeResult<Session> {
        let client = Client::with_options(options)
            .map_err(|e| FacadeError::connection(format!("failed to create client: {}", e)))?;
        let database = client.database(&self.config.name);

        database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| FacadeError::connection(format!("server unreachable: {}", e)))?;

        Ok(Session { client, database })
    }
}

#[async_trait]
impl DocumentDriver for MongoDriver {
    async fn connect(&self) -> FacadeResult<()> {
        if self.session.read().is_some() {
            return Err(FacadeError::connection("client is already connected"));
        }

        let options = self.config.to_client_options().await?;
        let session = self.open(options).await?;

        let mut slot = self.session.write();
        if slot.is_some() {
            return Err(FacadeError::connection("client is already connected"));
        }
        *slot = Some(session);

        info!(
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.name,
            "MongoDB session established"
        );
        Ok(())
    }

    async fn close(&self) -> FacadeResult<()> {
        let session = self.session.write().take();
        if let Some(session) = session {
            session.client.shutdown().await;
            info!(database = %self.config.name, "MongoDB session closed");
        }
        Ok(())
    }

    fn database_name(&self) -> &str {
        &self.config.name
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> FacadeResult<Bson> {
        let result = self.collection(collection)?.insert_one(doc, None).await?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> FacadeResult<Vec<Bson>> {
        let count = docs.len();
        let mut result = self.collection(collection)?.insert_many(docs, None).await?;

        let mut ids = Vec::with_capacity(count);
        for index in 0..count {
            let id = result.inserted_ids.remove(&index).ok_or_else(|| {
                FacadeError::server(format!("missing inserted id for document {}", index))
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        find_options: FindOptions,
    ) -> FacadeResult<DocumentCursor> {
        let mut driver_options = options::FindOptions::default();
        driver_options.projection = find_options.projection;
        driver_options.sort = find_options.sort;
        driver_options.skip = find_options.skip;
        driver_options.limit = find_options.limit;

        let cursor = self
            .collection(collection)?
            .find(filter, driver_options)
            .await?;
        Ok(DocumentCursor::new(cursor.map_err(FacadeError::from)))
    }

    async fn count(&self, collection: &str, filter: Document) -> FacadeResult<u64> {
        let count = self
            .collection(collection)?
            .count_documents(filter, None)
            .await?;
        Ok(count)
    }

    async fn distinct(
        &self,
        collection: &str,
        key: &str,
        filter: Document,
    ) -> FacadeResult<Vec<Bson>> {
        let values = self
            .collection(collection)?
            .distinct(key, filter, None)
            .await?;
        Ok(values)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> FacadeResult<UpdateResult> {
        let mut update_options = options::UpdateOptions::default();
        update_options.upsert = Some(upsert);

        let result = self
            .collection(collection)?
            .update_many(filter, update, update_options)
            .await?;

        Ok(UpdateResult {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_count: u64::from(result.upserted_id.is_some()),
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> FacadeResult<DeleteResult> {
        let result = self
            .collection(collection)?
            .delete_many(filter, None)
            .await?;

        Ok(DeleteResult {
            acknowledged: true,
            deleted_count: result.deleted_count,
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
            "Issuing findAndModify"
        );

        let mut command = doc! { "findAndModify": collection, "query": request.filter };
        if let Some(sort) = request.sort {
            command.insert("sort", sort);
        }
        if let Some(projection) = request.projection {
            command.insert("fields", projection);
        }
        match request.action {
            ModifyAction::Update(body) | ModifyAction::Replace(body) => {
                command.insert("update", body);
                command.insert("new", request.return_new);
                command.insert("upsert", request.upsert);
            }
            ModifyAction::Delete => {
                command.insert("remove", true);
            }
        }

        let reply = self.database()?.run_command(command, None).await?;
        Ok(FindAndModifyResult::from_reply(&reply))
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        index_options: IndexOptions,
    ) -> FacadeResult<String> {
        let mut driver_options = options::IndexOptions::default();
        driver_options.name = index_options.name;
        driver_options.unique = Some(index_options.unique);
        driver_options.sparse = index_options.sparse.then_some(true);
        driver_options.background = index_options.background.then_some(true);
        driver_options.expire_after = index_options
            .expire_after_secs
            .map(std::time::Duration::from_secs);

        let model = IndexModel::builder()
            .keys(keys)
            .options(driver_options)
            .build();

        let result = self
            .collection(collection)?
            .create_index(model, None)
            .await?;
        Ok(result.index_name)
    }

    async fn create_collection(&self, name: &str) -> FacadeResult<()> {
        self.database()?.create_collection(name, None).await?;
        Ok(())
    }

    async fn list_collections(&self) -> FacadeResult<Vec<String>> {
        let names = self.database()?.list_collection_names(None).await?;
        Ok(names)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> FacadeResult<DocumentCursor> {
        let cursor = self
            .collection(collection)?
            .aggregate(pipeline, None)
            .await?;
        Ok(DocumentCursor::new(cursor.map_err(FacadeError::from)))
    }
}
