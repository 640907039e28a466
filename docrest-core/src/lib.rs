//! An object mapping layer over a Parse-style document REST service.
//!
//! This crate is the core of the docrest project and provides:
//!
//! - **Wire types** ([`types`], [`value`], [`marshal`]) - `__type`-tagged values and their conversion to and from native values
//! - **Schemas** ([`field`], [`schema`], [`registry`]) - Field declarations with defaults, resource classes and name resolution
//! - **Resources** ([`object`]) - Instances with identity, timestamps and a create/update/delete lifecycle
//! - **Queries** ([`query`]) - `attribute__op` criteria translated into the service's `where` protocol
//! - **Relations** ([`relation`]) - Many-to-many attributes backed by join resources
//! - **Batches** ([`batch`]) - Two-phase staging and submission of many mutations
//! - **Transport** ([`transport`]) - The interface to the remote service
//! - **Client** ([`client`], [`config`]) - Ties the transport, the registry and the configuration together
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docrest_core::{client::Client, field::Field, schema::{Resource, SchemaBuilder}};
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
//! let client = Client::builder(transport).register::<GameScore>().build()?;
//! let mut score = client.create::<GameScore>()?;
//! score.set("player", "Sean Plott")?;
//! score.save(&client).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrest_core;

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod field;
pub mod function;
pub mod marshal;
pub mod object;
pub mod query;
pub mod registry;
pub mod relation;
pub mod schema;
pub mod transport;
pub mod types;
pub mod user;
pub mod value;
