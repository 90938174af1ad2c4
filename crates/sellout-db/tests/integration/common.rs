//! Test utilities for integration tests.
//!
//! Provides helper functions to set up isolated PostgreSQL containers with
//! the sellout schema applied, plus row fixtures.

#![allow(dead_code)]

use chrono::NaiveDate;
use sellout_core::models::{DEFAULT_CAPACITY, EventRow, VenueRow};
use sellout_core::timestamp::{self, Timestamp};
use sellout_db::PgEntityStore;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Sets up a PostgreSQL container and returns a migrated store.
///
/// Each call creates a fresh, isolated database container. The container is
/// automatically cleaned up when the returned `ContainerAsync` is dropped.
///
/// # Returns
///
/// A tuple of (PgEntityStore, PgPool, ContainerAsync) - keep the container
/// alive for the test duration.
pub async fn setup_test_db() -> (PgEntityStore, PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "postgres")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

    // The server restarts once during initdb, so the first attempts may fail
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!(
                        "Failed to connect to database after {} retries: {}",
                        MAX_RETRIES, e
                    );
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    let store = PgEntityStore::new(pool.clone());
    store.migrate().await.expect("Failed to run migrations");

    (store, pool, container)
}

/// 2019-06-`day` `hour`:`minute`:00
pub fn at(day: u32, hour: u32, minute: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(2019, 6, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// A fully populated, available event first seen at `info_date`.
pub fn sample_event(id: i64, venue_id: i64, info_date: Timestamp) -> EventRow {
    EventRow {
        id,
        name: format!("Event {}", id),
        start_date: at(30, 20, 0),
        end_date: at(30, 23, 0),
        published_date: at(1, 12, 0),
        on_sale_date: at(2, 10, 0),
        venue_id,
        category_id: 3008,
        format_id: 6,
        inventory_type: Some("limited".to_string()),
        is_free: false,
        is_reserved_seating: true,
        is_available: true,
        has_wait_list: false,
        min_price: Some(20.0),
        max_price: Some(35.5),
        capacity: 300,
        age_restriction: Some("18+".to_string()),
        door_time: None,
        presented_by: Some("Local Promoter".to_string()),
        is_online: false,
        url: Some(format!("https://tickets.example/e/{}", id)),
        is_sold_out: false,
        sold_out_date: timestamp::never_sold_out(),
        last_info_date: info_date,
    }
}

pub fn sample_venue(id: i64) -> VenueRow {
    VenueRow {
        id,
        name: format!("Venue {}", id),
        city: Some("Austin".to_string()),
        capacity: DEFAULT_CAPACITY,
        age_restriction: None,
    }
}
