#![allow(dead_code)]

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docrest::{memory::MemoryTransport, prelude::*};

/// Installs a test subscriber once; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Order;

impl Resource for Order {
    fn class_name() -> &'static str {
        "Order"
    }

    fn declare(schema: SchemaBuilder) -> SchemaBuilder {
        schema
            .field("total", Field::new().default(0))
            .field("number", Field::new().default_with(Arc::new(|| Value::from(5))))
    }
}

pub struct GameScore;

impl Resource for GameScore {
    fn class_name() -> &'static str {
        "GameScore"
    }
}

pub struct Address;

impl Resource for Address {
    fn class_name() -> &'static str {
        "Address"
    }
}

pub struct Customer;

impl Resource for Customer {
    fn class_name() -> &'static str {
        "Customer"
    }

    fn declare(schema: SchemaBuilder) -> SchemaBuilder {
        schema.many_to_many("addresses", ManyToMany::new("Address"))
    }
}

pub fn client_with(transport: MemoryTransport, config: ClientConfig) -> Client {
    init_tracing();

    Client::builder(transport)
        .config(config)
        .register::<Order>()
        .register::<GameScore>()
        .register::<Address>()
        .register::<Customer>()
        .build()
        .unwrap()
}

pub fn client() -> (Client, MemoryTransport) {
    let transport = MemoryTransport::new();
    (client_with(transport.clone(), ClientConfig::default()), transport)
}

/// Saves one `GameScore` per score, in the given order.
pub async fn scores(client: &Client, scores: &[i64]) -> Vec<Object> {
    let manager = client.query::<GameScore>().unwrap();
    let mut saved = Vec::with_capacity(scores.len());

    for score in scores {
        saved.push(manager.create([("score", *score)]).await.unwrap());
    }

    saved
}

pub fn score_values(objects: &[Object]) -> Vec<i64> {
    objects.iter().filter_map(|object| object.get_i64("score")).collect()
}
