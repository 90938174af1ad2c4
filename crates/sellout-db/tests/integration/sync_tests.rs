//! End-to-end sync runs: crawler directory in, PostgreSQL rows out.

use std::path::{Path, PathBuf};

use sellout_core::models::EntityKind;
use sellout_core::timestamp::{self, Timestamp};
use sellout_core::traits::{EntityStore, EntityTransaction, WatermarkStore};
use sellout_core::{
    DirectoryDictionarySource, DirectorySource, FileWatermarkStore, SilentReporter, SyncService,
};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::integration::common::{at, setup_test_db};

fn raw_event(id: i64, venue_id: i64, sold_out: bool) -> Value {
    json!({
        "id": id.to_string(),
        "name": {"text": format!("Event {}", id)},
        "start": {"local": "2019-07-01T20:00:00"},
        "end": {"local": "2019-07-01T23:00:00"},
        "published": "2019-05-01T12:00:00Z",
        "venue_id": venue_id.to_string(),
        "subcategory_id": "3008",
        "format_id": "6",
        "is_free": false,
        "capacity": "300",
        "ticket_availability": {
            "has_available_tickets": !sold_out,
            "is_sold_out": sold_out,
            "start_sales_date": {"local": "2019-05-02T10:00:00"},
            "minimum_ticket_price": {"major_value": "20.00"},
            "maximum_ticket_price": {"major_value": "35.00"}
        },
        "venue": {
            "name": format!("Venue {}", venue_id),
            "address": {"city": "Austin"},
            "capacity": 800
        }
    })
}

/// Path of a crawler page: `root/raw/Y/M/D/H_M_S_1.json`.
fn page_path(root: &Path, pull_time: Timestamp) -> PathBuf {
    use chrono::{Datelike, Timelike};
    let dir = root
        .join("raw")
        .join(pull_time.year().to_string())
        .join(pull_time.month().to_string())
        .join(pull_time.day().to_string());
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!(
        "{}_{}_{}_1.json",
        pull_time.hour(),
        pull_time.minute(),
        pull_time.second()
    ))
}

/// Writes one crawler page stamped with `pull_time`.
fn write_page(root: &Path, pull_time: Timestamp, events: Vec<Value>) {
    let body = json!({
        "events": events,
        "PullTime": timestamp::format_pull_time(pull_time),
    });
    std::fs::write(page_path(root, pull_time), serde_json::to_vec(&body).unwrap()).unwrap();
}

/// Test 1: Verify a run applies snapshots in order and records the sell-out
#[tokio::test]
async fn test_run_applies_crawler_directory() {
    let (store, _pool, _container) = setup_test_db().await;
    let dir = TempDir::new().unwrap();
    write_page(
        dir.path(),
        at(10, 12, 0),
        vec![raw_event(1, 50, false), raw_event(2, 50, false)],
    );
    write_page(
        dir.path(),
        at(11, 12, 0),
        vec![raw_event(1, 50, true), raw_event(2, 50, false)],
    );

    let watermark = FileWatermarkStore::new(dir.path().join("watermark"));
    let service = SyncService::new(
        store.clone(),
        DirectorySource::new(dir.path()),
        watermark.clone(),
    );

    // Act
    let summary = service.run().await.expect("run should succeed");

    // Assert
    assert!(summary.status.is_completed());
    assert_eq!(summary.applied, 2);
    assert_eq!(summary.events.created, 2);
    assert_eq!(summary.venues.created, 1, "shared venue inserted once");
    assert_eq!(summary.watermark_after, at(11, 12, 0));
    assert_eq!(watermark.read().await.unwrap(), at(11, 12, 0));

    let mut tx = store.begin().await.unwrap();
    let sold = tx.get_event(1).await.unwrap().expect("event 1 stored");
    let open = tx.get_event(2).await.unwrap().expect("event 2 stored");
    tx.rollback().await.unwrap();

    assert!(sold.is_sold_out);
    assert_eq!(sold.sold_out_date, at(11, 12, 0));
    assert_eq!(sold.last_info_date, at(11, 12, 0));
    assert!(!open.is_sold_out);
    assert_eq!(open.sold_out_date, timestamp::never_sold_out());
    assert_eq!(
        open.last_info_date,
        at(10, 12, 0),
        "unchanged record keeps its provenance"
    );
}

/// Test 2: Verify a second run re-applies the boundary snapshot without writes
#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (store, _pool, _container) = setup_test_db().await;
    let dir = TempDir::new().unwrap();
    write_page(dir.path(), at(10, 12, 0), vec![raw_event(1, 50, false)]);
    write_page(dir.path(), at(11, 12, 0), vec![raw_event(1, 50, true)]);

    let service = SyncService::new(
        store.clone(),
        DirectorySource::new(dir.path()),
        FileWatermarkStore::new(dir.path().join("watermark")),
    );
    service.run().await.expect("first run should succeed");
    let before = store.get_stats().await.unwrap();

    // Act
    let summary = service
        .run_with_progress(&SilentReporter)
        .await
        .expect("second run should succeed");

    // Assert
    assert_eq!(summary.pending, 1, "only the boundary snapshot is pending");
    assert_eq!(summary.events.created, 0);
    assert_eq!(summary.events.updated, 0);
    assert_eq!(summary.venues.updated, 0);
    let after = store.get_stats().await.unwrap();
    assert_eq!(before.events, after.events);
    assert_eq!(before.latest_info_date, after.latest_info_date);
}

/// Test 3: Verify dictionaries are loaded and renamed from the crawler dumps
#[tokio::test]
async fn test_refresh_dictionaries() {
    let (store, _pool, _container) = setup_test_db().await;
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("formats.json"),
        r#"{"formats": [{"id": "6", "name": "Concert"}, {"id": "100", "name": "Other"}]}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("subcategories.json"),
        r#"{"subcategories": [{"id": "3008", "name": "Rock"}]}"#,
    )
    .unwrap();

    let service = SyncService::new(
        store.clone(),
        DirectorySource::new(dir.path()),
        FileWatermarkStore::new(dir.path().join("watermark")),
    );
    let dictionaries = DirectoryDictionarySource::new(dir.path());
    let first = service
        .refresh_dictionaries(&dictionaries, &SilentReporter)
        .await
        .expect("refresh should succeed");
    assert_eq!(first.formats.created, 2);
    assert_eq!(first.categories.created, 1);

    std::fs::write(
        dir.path().join("subcategories.json"),
        r#"{"subcategories": [{"id": "3008", "name": "Rock & Roll"}]}"#,
    )
    .unwrap();
    let second = service
        .refresh_dictionaries(&dictionaries, &SilentReporter)
        .await
        .expect("refresh should succeed");
    assert_eq!(second.formats.unchanged, 2);
    assert_eq!(second.categories.updated, 1);

    let mut tx = store.begin().await.unwrap();
    let rock = tx
        .get_named(EntityKind::Category, 3008)
        .await
        .unwrap()
        .expect("category stored");
    assert_eq!(rock.name, "Rock & Roll");
}

/// Test 4: Verify an empty page rewritten by the crawler is applied on the next run
#[tokio::test]
async fn test_rewritten_empty_page_is_applied_next_run() {
    let (store, _pool, _container) = setup_test_db().await;
    let dir = TempDir::new().unwrap();
    write_page(dir.path(), at(1, 10, 0), vec![raw_event(1, 50, false)]);
    std::fs::write(page_path(dir.path(), at(2, 10, 0)), b"").unwrap();
    write_page(dir.path(), at(3, 10, 0), vec![raw_event(3, 50, false)]);

    let watermark = FileWatermarkStore::new(dir.path().join("watermark"));
    let service = SyncService::new(
        store.clone(),
        DirectorySource::new(dir.path()),
        watermark.clone(),
    );
    let first = service.run().await.expect("first run should succeed");
    assert_eq!(first.skipped.len(), 1);
    assert_eq!(first.applied, 2, "later pages are still applied");
    assert_eq!(watermark.read().await.unwrap(), at(2, 10, 0));

    // Act
    write_page(dir.path(), at(2, 10, 0), vec![raw_event(2, 50, true)]);
    let second = service.run().await.expect("second run should succeed");

    // Assert
    assert!(second.skipped.is_empty());
    assert_eq!(second.pending, 2);
    assert_eq!(second.events.created, 1, "only the rewritten page adds rows");
    assert_eq!(watermark.read().await.unwrap(), at(3, 10, 0));

    let mut tx = store.begin().await.unwrap();
    let late = tx.get_event(2).await.unwrap().expect("event 2 stored");
    tx.rollback().await.unwrap();
    assert!(late.is_sold_out);
    assert_eq!(late.sold_out_date, at(2, 10, 0));
}
