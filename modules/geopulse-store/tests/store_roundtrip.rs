//! Database round-trip tests. Ignored by default; run against a real
//! Postgres with:
//!
//!   DATABASE_URL=postgres://... cargo test -p geopulse-store -- --ignored

use chrono::Utc;

use geopulse_store::{ClusterStore, ItemStore, NewCluster, NewItem, UpsertOutcome};

fn new_item(source_id: &str) -> NewItem {
    NewItem {
        source: "rss".to_string(),
        source_id: source_id.to_string(),
        collected_at: Utc::now(),
        published_at: Some(Utc::now()),
        title: Some("Earthquake strikes Tokyo".to_string()),
        text: None,
        url: Some(source_id.to_string()),
        author: None,
        media_urls: None,
        entities: None,
        location_name: Some("Tokyo".to_string()),
        lat: Some(35.6895),
        lon: Some(139.6917),
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn upsert_is_idempotent_and_counts_stay_consistent() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
    let pool = geopulse_store::connect(&url).await.expect("connect");
    let items = ItemStore::new(pool.clone());
    let clusters = ClusterStore::new(pool);

    let source_id = format!("https://example.com/{}", uuid_ish());
    let item = new_item(&source_id);

    let first = items.upsert(&item).await.expect("first upsert");
    let id = match first {
        UpsertOutcome::Inserted(id) => id,
        UpsertOutcome::Duplicate => panic!("fresh key must insert"),
    };
    assert_eq!(
        items.upsert(&item).await.expect("second upsert"),
        UpsertOutcome::Duplicate,
        "processing the same record twice must leave one row"
    );

    let existing = items
        .existing_source_ids("rss", &[source_id.clone()])
        .await
        .expect("existence query");
    assert!(existing.contains(&source_id));

    let cluster = clusters
        .create(&NewCluster {
            title: Some("Earthquake strikes Tokyo".to_string()),
            representative_lat: Some(35.6895),
            representative_lon: Some(139.6917),
            representative_location_name: Some("Tokyo".to_string()),
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
        })
        .await
        .expect("create cluster");

    clusters.assign_item(id, cluster.cluster_id).await.expect("assign");
    let reloaded = clusters.get(cluster.cluster_id).await.expect("get").expect("exists");
    assert_eq!(reloaded.item_count, 1, "item_count must track assignments");

    clusters.recalculate_stats(1).await.expect("recalculate");
    let reloaded = clusters.get(cluster.cluster_id).await.expect("get").expect("exists");
    assert!(reloaded.representative_lat.is_some(), "located member implies coordinates");
}

fn uuid_ish() -> String {
    format!("{}-{}", std::process::id(), Utc::now().timestamp_nanos_opt().unwrap_or_default())
}
