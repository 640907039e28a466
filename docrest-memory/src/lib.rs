//! In-memory service for docrest.
//!
//! This crate provides [`MemoryTransport`], a thread-safe implementation of the
//! [`Transport`](docrest_core::transport::Transport) trait that keeps every row in
//! memory and answers the same paths and payloads as the remote service. It is
//! meant for development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes through an async-aware RwLock
//! - **Query support** - `where` clauses with every query operator, ordering and paging
//! - **Field operations** - `Increment` and `Delete` updates
//! - **Batches** - Per-item results in submission order
//! - **Cloud functions** - Handlers registered on the builder
//!
//! # Quick Start
//!
//! ```ignore
//! use docrest::{Client, memory::MemoryTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder(MemoryTransport::new())
//!         .register::<GameScore>()
//!         .build()?;
//!
//!     let mut score = client.create::<GameScore>()?;
//!     score.set("score", 1337)?;
//!     score.save(&client).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrest_memory;

pub mod evaluator;
pub mod transport;

pub use transport::{FunctionHandler, MemoryTransport, MemoryTransportBuilder};
