mod common;

use common::{GameScore, Order, client, client_with};
use docrest::{memory::MemoryTransport, prelude::*};

fn orders(client: &Client, totals: &[i64]) -> Vec<Object> {
    let schema = client.schema::<Order>().unwrap();
    totals
        .iter()
        .map(|total| Object::with_attrs(schema.clone(), [("total", *total)]).unwrap())
        .collect()
}

#[tokio::test]
async fn batch_save_creates_then_updates() {
    let (client, transport) = client();
    let mut items = orders(&client, &[1, 2, 3]);

    client.batcher().batch_save(&mut items).await.unwrap();

    assert!(items.iter().all(Object::is_saved));
    assert_eq!(transport.row_count("Order").await, 3);

    for item in &mut items {
        let total = item.get_i64("total").unwrap();
        item.set("total", total * 10).unwrap();
    }
    client.batcher().batch_save(&mut items).await.unwrap();

    let totals = client
        .query::<Order>()
        .unwrap()
        .all()
        .order_by("total", false)
        .fetch()
        .await
        .unwrap()
        .iter()
        .filter_map(|order| order.get_i64("total"))
        .collect::<Vec<_>>();
    assert_eq!(totals, vec![10, 20, 30]);
    assert_eq!(transport.row_count("Order").await, 3);
}

#[tokio::test]
async fn batches_are_chunked() {
    let transport = MemoryTransport::new();
    let client = client_with(
        transport.clone(),
        ClientConfig::builder().batch_size(2).build().unwrap(),
    );
    let mut items = orders(&client, &[1, 2, 3, 4, 5]);

    client.batcher().batch_save(&mut items).await.unwrap();
    assert_eq!(transport.row_count("Order").await, 5);

    client.batcher().batch_delete(&mut items).await.unwrap();
    assert_eq!(transport.row_count("Order").await, 0);
    assert!(items.iter().all(|item| !item.is_saved()));
}

#[tokio::test]
async fn failed_items_do_not_stop_the_others() {
    let (client, transport) = client();
    let mut items = orders(&client, &[1, 2, 3]);
    client.batcher().batch_save(&mut items).await.unwrap();

    // Removed behind the batcher's back, so its deletion fails.
    transport
        .delete(&items[1].path().unwrap())
        .await
        .unwrap();

    let result = client.batcher().batch_delete(&mut items).await;

    assert!(matches!(
        result,
        Err(DocumentError::BatchItem { index: 1, code: 101, .. })
    ));
    assert!(!items[0].is_saved());
    assert!(items[1].is_saved());
    assert!(!items[2].is_saved());
    assert_eq!(transport.row_count("Order").await, 0);
}

#[tokio::test]
async fn empty_and_unsaved_batches_are_rejected() {
    let (client, transport) = client();

    assert_eq!(client.batcher().batch_save(&mut []).await, Err(DocumentError::EmptyBatch));

    let mut unsaved = orders(&client, &[1]);
    let mut mixed = vec![client.query::<GameScore>().unwrap().create([("score", 1)]).await.unwrap()];
    mixed.append(&mut unsaved);

    assert_eq!(
        client.batcher().batch_delete(&mut mixed).await,
        Err(DocumentError::UnsavedReference("Order".into()))
    );
    assert_eq!(transport.row_count("GameScore").await, 1);
}
