//! A typed object mapping layer over Parse-style document REST services.
//!
//! This crate is the entry point of the docrest framework. It re-exports the core
//! types from `docrest-core` and the in-memory service from `docrest-memory`.
//!
//! # Features
//!
//! - **Declared resources** - Classes with field defaults, lazily produced defaults and many-to-many attributes
//! - **Wire marshalling** - Pointers, dates, bytes, geo-points and files in their `__type` wire form
//! - **Queries** - `attribute__op` criteria, ordering, paging, counting and bulk deletion
//! - **Batches** - Many creates, updates or deletes per request
//! - **Pluggable transport** - Anything implementing [`transport::Transport`]
//!
//! # Quick Start
//!
//! ```ignore
//! use docrest::{prelude::*, memory::MemoryTransport};
//!
//! pub struct GameScore;
//!
//! impl Resource for GameScore {
//!     fn class_name() -> &'static str {
//!         "GameScore"
//!     }
//!
//!     fn declare(schema: SchemaBuilder) -> SchemaBuilder {
//!         schema.field("score", Field::new().default(0))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentResult<()> {
//!     let client = Client::builder(MemoryTransport::new())
//!         .register::<GameScore>()
//!         .build()?;
//!
//!     let scores = client.query::<GameScore>()?;
//!     scores.create([("player", "Sean Plott"), ("cheat_mode", "off")]).await?;
//!
//!     let top = scores
//!         .filter("score__gte", 1000)?
//!         .order_by("score", true)
//!         .limit(10)
//!         .fetch()
//!         .await?;
//!
//!     println!("top scores: {top:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Many-to-many
//!
//! A many-to-many attribute is backed by a join class holding one row per edge.
//!
//! ```ignore
//! impl Resource for Customer {
//!     fn class_name() -> &'static str {
//!         "Customer"
//!     }
//!
//!     fn declare(schema: SchemaBuilder) -> SchemaBuilder {
//!         schema.many_to_many("addresses", ManyToMany::new("Address"))
//!     }
//! }
//!
//! let addresses = customer.related(&client, "addresses")?;
//! addresses.add([&home, &office]).await?;
//! let saved = addresses.all().await?.fetch().await?;
//! ```
//!
//! # Transports
//!
//! - [`memory`] - In-memory service for development and testing

pub mod prelude;

pub use docrest_core::{
    batch, client, config, error, field, function, marshal, object, query, registry, relation, schema,
    transport, types, user, value,
};

pub use docrest_core::client::Client;

/// In-memory transport implementations.
pub mod memory {
    pub use docrest_memory::{FunctionHandler, MemoryTransport, MemoryTransportBuilder};
}
