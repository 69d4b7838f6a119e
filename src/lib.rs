//! # mongo-facade
//!
//! A small async facade over a document database.
//!
//! This crate provides:
//! - A [`Client`] with one async method per operation: insert, find, count,
//!   distinct, update, delete, find-and-modify, index and collection
//!   management, and aggregation
//! - Argument checking with stable error messages before anything reaches
//!   the server
//! - Facade-level result types independent of the driver's reply shapes
//! - A MongoDB-backed driver and an in-memory driver behind one trait
//!
//! ## Example
//!
//! ```rust,ignore
//! use mongo_facade::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), FacadeError> {
//!     let client = Client::new(FacadeConfig::new("localhost", 27017, "mydb"))?;
//!     client.connect().await?;
//!
//!     client
//!         .insert_many(
//!             "docs",
//!             InsertManyArgs::docs(vec![doc! { "title": "doc1" }, doc! { "title": "doc2" }]),
//!         )
//!         .await?;
//!
//!     let counts = client
//!         .aggregate(
//!             "docs",
//!             AggregateArgs::pipeline(vec![
//!                 doc! { "$match": {} },
//!                 doc! { "$group": { "_id": null, "count": { "$sum": 1 } } },
//!             ]),
//!         )
//!         .await?;
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a server
//!
//! [`Client::in_memory`] swaps the MongoDB driver for [`memory::MemoryDriver`],
//! which implements the query, update and aggregation subset the facade uses.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod args;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod index;
pub mod logging;
pub mod memory;
pub mod mongo;
pub mod results;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use client::{Client, ConnectionState};
pub use config::{FacadeConfig, FacadeConfigBuilder};
pub use driver::{DocumentCursor, DocumentDriver};
pub use error::{ErrorKind, FacadeError, FacadeResult};
pub use index::IndexSpec;
pub use memory::MemoryDriver;
pub use mongo::MongoDriver;
pub use results::{
    DeleteResult, FindAndModifyResult, FindOutput, InsertManyResult, InsertOneResult,
    LastErrorObject, UpdateResult,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::args::*;
    pub use crate::client::{Client, ConnectionState};
    pub use crate::config::{FacadeConfig, FacadeConfigBuilder};
    pub use crate::error::{FacadeError, FacadeResult};
    pub use crate::results::*;
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
