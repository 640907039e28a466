//! Convenient re-exports of commonly used types from docrest.
//!
//! ```ignore
//! use docrest::prelude::*;
//! ```

pub use docrest_core::{
    batch::Batcher,
    client::{Client, ClientBuilder},
    config::ClientConfig,
    error::{DocumentError, DocumentResult},
    field::{DefaultProvider, Field, ManyToMany, Sequence},
    function::Function,
    object::Object,
    query::{FieldOp, Query, QueryManager, Queryset, SortDirection},
    relation::ManyToManyManager,
    schema::{Resource, Schema, SchemaBuilder},
    transport::{Transport, TransportBuilder},
    types::{Bytes, File, GeoPoint, JsonMap, Pointer},
    user::User,
    value::Value,
};
