mod common;

use chrono::{Duration, Utc};

use common::{GameScore, Order, client, score_values, scores};
use docrest::prelude::*;

#[tokio::test]
async fn comparisons_combine() {
    let (client, _) = client();
    scores(&client, &[1, 2, 3, 4, 5]).await;

    let manager = client.query::<GameScore>().unwrap();
    let between = manager
        .filter("score__lt", 4)
        .unwrap()
        .filter("score__gt", 2)
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(score_values(&between), vec![3]);

    let ascending = manager.filter("score__gte", 3).unwrap().order_by("score", false);
    assert_eq!(score_values(&ascending.fetch().await.unwrap()), vec![3, 4, 5]);

    let excluded = manager
        .filter("score__nin", vec![Value::from(1), Value::from(5)])
        .unwrap()
        .order_by("score", true);
    assert_eq!(score_values(&excluded.fetch().await.unwrap()), vec![4, 3, 2]);

    let not_two = manager.filter("score__ne", 2).unwrap();
    assert_eq!(not_two.count().await.unwrap(), 4);
}

#[tokio::test]
async fn equality_after_operator_is_overwritten() {
    let (client, _) = client();
    scores(&client, &[1, 2, 3]).await;

    let manager = client.query::<GameScore>().unwrap();
    let exact = manager
        .filter("score__gt", 1)
        .unwrap()
        .filter("score", 1)
        .unwrap();

    assert_eq!(score_values(&exact.fetch().await.unwrap()), vec![1]);
}

#[tokio::test]
async fn ordering_and_paging_copy_the_queryset() {
    let (client, _) = client();
    scores(&client, &[30, 10, 50, 20, 40]).await;

    let all = client.query::<GameScore>().unwrap().all();
    let sorted = all.order_by("score", true);
    let page = sorted.skip(1).limit(2);

    assert_eq!(score_values(&page.fetch().await.unwrap()), vec![40, 30]);
    assert_eq!(score_values(&sorted.fetch().await.unwrap()), vec![50, 40, 30, 20, 10]);
    assert_eq!(all.fetch().await.unwrap().len(), 5);

    let third = sorted.nth(2).await.unwrap().unwrap();
    assert_eq!(third.get_i64("score"), Some(30));
    assert!(sorted.nth(5).await.unwrap().is_none());
}

#[tokio::test]
async fn get_requires_exactly_one_match() {
    let (client, _) = client();
    scores(&client, &[1, 2, 2]).await;

    let manager = client.query::<GameScore>().unwrap();

    let one = manager.get("score", 1).await.unwrap();
    assert_eq!(one.get_i64("score"), Some(1));

    assert_eq!(
        manager.get("score", 9).await,
        Err(DocumentError::DoesNotExist("GameScore".into()))
    );
    assert_eq!(
        manager.get("score", 2).await,
        Err(DocumentError::MultipleResultsReturned("GameScore".into(), 2))
    );
}

#[tokio::test]
async fn exists_agrees_with_count() {
    let (client, _) = client();
    scores(&client, &[1, 2, 3]).await;

    let manager = client.query::<GameScore>().unwrap();

    for threshold in [0, 2, 3, 10] {
        let matching = manager.filter("score__gt", threshold).unwrap();
        let count = matching.count().await.unwrap();
        assert_eq!(matching.exists().await.unwrap(), count > 0, "threshold {threshold}");
    }

    assert_eq!(manager.count().await.unwrap(), 3);
}

#[tokio::test]
async fn delete_removes_matches_only() {
    let (client, transport) = client();
    scores(&client, &[1, 2, 3, 4]).await;

    let manager = client.query::<GameScore>().unwrap();
    manager.filter("score__lte", 2).unwrap().delete().await.unwrap();

    assert_eq!(transport.row_count("GameScore").await, 2);
    let remaining = manager.all().order_by("score", false).fetch().await.unwrap();
    assert_eq!(score_values(&remaining), vec![3, 4]);

    // Nothing left to match.
    manager.filter("score__lte", 2).unwrap().delete().await.unwrap();
    assert_eq!(transport.row_count("GameScore").await, 2);
}

#[tokio::test]
async fn resources_filter_as_pointers() {
    let (client, _) = client();
    let [mut first, mut second] = [client.create::<Order>().unwrap(), client.create::<Order>().unwrap()];
    first.save(&client).await.unwrap();
    second.save(&client).await.unwrap();

    let manager = client.query::<GameScore>().unwrap();
    manager.create([("order", Value::from(&first)), ("score", Value::from(1))]).await.unwrap();
    manager.create([("order", Value::from(&second)), ("score", Value::from(2))]).await.unwrap();

    let found = manager.get("order", &first).await.unwrap();
    assert_eq!(found.get_i64("score"), Some(1));
    assert_eq!(found.get("order").and_then(Value::as_object), Some(&first));

    let unsaved = client.create::<Order>().unwrap();
    assert_eq!(
        manager.filter("order", &unsaved).map(|_| ()),
        Err(DocumentError::UnsavedReference("Order".into()))
    );
}

#[tokio::test]
async fn dates_compare_by_instant() {
    let (client, _) = client();
    let manager = client.query::<GameScore>().unwrap();

    let now = Utc::now();
    manager.create([("at", now - Duration::hours(2))]).await.unwrap();
    manager.create([("at", now + Duration::hours(2))]).await.unwrap();

    assert_eq!(manager.filter("at__gt", now).unwrap().count().await.unwrap(), 1);
    assert_eq!(manager.filter("createdAt__lte", Utc::now()).unwrap().count().await.unwrap(), 2);
}
