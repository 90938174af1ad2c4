//! Entity repository for PostgreSQL.
//!
//! [`PgEntityStore`] owns the pool; every snapshot is applied through one
//! [`PgEntityTransaction`], which wraps a single `sqlx` transaction so that a
//! failed snapshot leaves no partial writes behind.

use std::collections::HashSet;

use sellout_core::diff::{EventChange, VenueChange};
use sellout_core::error::SyncError;
use sellout_core::models::{DatabaseStats, EntityKind, EventRow, NamedRow, VenueRow};
use sellout_core::timestamp::Timestamp;
use sellout_core::traits::{EntityStore, EntityTransaction};
use sqlx::migrate::Migrator;
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

/// Column list for SELECT and INSERT queries. Must remain a const literal to
/// ensure SQL safety since format!() bypasses sqlx compile-time validation.
const EVENT_COLUMNS: &str = "id, name, start_date, end_date, published_date, on_sale_date, venue_id, category_id, format_id, inventory_type, is_free, is_reserved_seating, is_available, has_wait_list, min_price, max_price, capacity, age_restriction, door_time, presented_by, is_online, url, is_sold_out, sold_out_date, last_info_date";

const VENUE_COLUMNS: &str = "id, name, city, capacity, age_restriction";

/// Rows per INSERT statement. 25 event columns keep a full batch well under
/// the 65535 bind parameter limit.
const INSERT_BATCH_SIZE: usize = 1000;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Repository for event, venue, format and category rows.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use sellout_db::PgEntityStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/sellout")
///     .await?;
///
/// let store = PgEntityStore::new(pool);
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgEntityStore {
    pool: Pool<Postgres>,
}

impl PgEntityStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), SyncError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| SyncError::DatabaseError(e.into()))?;
        tracing::debug!("Schema migrations applied");
        Ok(())
    }

    /// Checks database connectivity by executing a simple query.
    pub async fn health_check(&self) -> Result<(), SyncError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(SyncError::DatabaseError)?;
        Ok(())
    }

    /// Row counts for every entity table plus the newest provenance time.
    pub async fn get_stats(&self) -> Result<DatabaseStats, SyncError> {
        let row: StatsRow = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM events) AS events,
                (SELECT COUNT(*) FROM venues) AS venues,
                (SELECT COUNT(*) FROM formats) AS formats,
                (SELECT COUNT(*) FROM categories) AS categories,
                (SELECT COUNT(*) FROM events WHERE is_sold_out) AS sold_out_events,
                (SELECT MAX(last_info_date) FROM events) AS latest_info_date
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(SyncError::DatabaseError)?;

        Ok(DatabaseStats {
            events: row.events.unwrap_or(0),
            venues: row.venues.unwrap_or(0),
            formats: row.formats.unwrap_or(0),
            categories: row.categories.unwrap_or(0),
            sold_out_events: row.sold_out_events.unwrap_or(0),
            latest_info_date: row.latest_info_date,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    events: Option<i64>,
    venues: Option<i64>,
    formats: Option<i64>,
    categories: Option<i64>,
    sold_out_events: Option<i64>,
    latest_info_date: Option<Timestamp>,
}

impl EntityStore for PgEntityStore {
    type Transaction = PgEntityTransaction;

    async fn begin(&self) -> Result<PgEntityTransaction, SyncError> {
        let tx = self.pool.begin().await.map_err(SyncError::DatabaseError)?;
        Ok(PgEntityTransaction { tx })
    }
}

/// One open PostgreSQL transaction.
///
/// Dropping it without [`EntityTransaction::commit`] rolls back.
pub struct PgEntityTransaction {
    tx: Transaction<'static, Postgres>,
}

impl EntityTransaction for PgEntityTransaction {
    async fn existing_ids(&mut self, kind: EntityKind) -> Result<HashSet<i64>, SyncError> {
        let sql = format!("SELECT id FROM {}", kind.table());
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(SyncError::DatabaseError)?;
        Ok(ids.into_iter().collect())
    }

    async fn get_event(&mut self, id: i64) -> Result<Option<EventRow>, SyncError> {
        let sql = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(SyncError::DatabaseError)?;
        Ok(row)
    }

    async fn get_venue(&mut self, id: i64) -> Result<Option<VenueRow>, SyncError> {
        let sql = format!("SELECT {} FROM venues WHERE id = $1", VENUE_COLUMNS);
        let row = sqlx::query_as::<_, VenueRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(SyncError::DatabaseError)?;
        Ok(row)
    }

    async fn get_named(
        &mut self,
        kind: EntityKind,
        id: i64,
    ) -> Result<Option<NamedRow>, SyncError> {
        let sql = format!("SELECT id, name FROM {} WHERE id = $1", kind.table());
        let row = sqlx::query_as::<_, NamedRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(SyncError::DatabaseError)?;
        Ok(row)
    }

    async fn insert_events(&mut self, rows: &[EventRow]) -> Result<u64, SyncError> {
        let mut written = 0;
        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO events ({}) ", EVENT_COLUMNS));
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(row.name.clone())
                    .push_bind(row.start_date)
                    .push_bind(row.end_date)
                    .push_bind(row.published_date)
                    .push_bind(row.on_sale_date)
                    .push_bind(row.venue_id)
                    .push_bind(row.category_id)
                    .push_bind(row.format_id)
                    .push_bind(row.inventory_type.clone())
                    .push_bind(row.is_free)
                    .push_bind(row.is_reserved_seating)
                    .push_bind(row.is_available)
                    .push_bind(row.has_wait_list)
                    .push_bind(row.min_price)
                    .push_bind(row.max_price)
                    .push_bind(row.capacity)
                    .push_bind(row.age_restriction.clone())
                    .push_bind(row.door_time.clone())
                    .push_bind(row.presented_by.clone())
                    .push_bind(row.is_online)
                    .push_bind(row.url.clone())
                    .push_bind(row.is_sold_out)
                    .push_bind(row.sold_out_date)
                    .push_bind(row.last_info_date);
            });
            let result = qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(SyncError::DatabaseError)?;
            written += result.rows_affected();
        }
        tracing::debug!(rows = written, "Inserted events");
        Ok(written)
    }

    async fn insert_venues(&mut self, rows: &[VenueRow]) -> Result<u64, SyncError> {
        let mut written = 0;
        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO venues ({}) ", VENUE_COLUMNS));
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(row.name.clone())
                    .push_bind(row.city.clone())
                    .push_bind(row.capacity)
                    .push_bind(row.age_restriction.clone());
            });
            let result = qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(SyncError::DatabaseError)?;
            written += result.rows_affected();
        }
        tracing::debug!(rows = written, "Inserted venues");
        Ok(written)
    }

    async fn insert_named(
        &mut self,
        kind: EntityKind,
        rows: &[NamedRow],
    ) -> Result<u64, SyncError> {
        let mut written = 0;
        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} (id, name) ", kind.table()));
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.id).push_bind(row.name.clone());
            });
            let result = qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(SyncError::DatabaseError)?;
            written += result.rows_affected();
        }
        tracing::debug!(kind = %kind, rows = written, "Inserted dictionary entries");
        Ok(written)
    }

    async fn update_event(&mut self, id: i64, changes: &[EventChange]) -> Result<(), SyncError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE events SET ");
        {
            let mut set = qb.separated(", ");
            for change in changes {
                set.push(change.column());
                set.push_unseparated(" = ");
                match change {
                    EventChange::Name(v) => set.push_bind_unseparated(v.clone()),
                    EventChange::StartDate(v)
                    | EventChange::EndDate(v)
                    | EventChange::PublishedDate(v)
                    | EventChange::OnSaleDate(v)
                    | EventChange::SoldOutDate(v)
                    | EventChange::LastInfoDate(v) => set.push_bind_unseparated(*v),
                    EventChange::VenueId(v)
                    | EventChange::CategoryId(v)
                    | EventChange::FormatId(v) => set.push_bind_unseparated(*v),
                    EventChange::InventoryType(v)
                    | EventChange::AgeRestriction(v)
                    | EventChange::DoorTime(v)
                    | EventChange::PresentedBy(v)
                    | EventChange::Url(v) => set.push_bind_unseparated(v.clone()),
                    EventChange::IsFree(v)
                    | EventChange::IsReservedSeating(v)
                    | EventChange::IsAvailable(v)
                    | EventChange::HasWaitList(v)
                    | EventChange::IsOnline(v)
                    | EventChange::IsSoldOut(v) => set.push_bind_unseparated(*v),
                    EventChange::MinPrice(v) | EventChange::MaxPrice(v) => {
                        set.push_bind_unseparated(*v)
                    }
                    EventChange::Capacity(v) => set.push_bind_unseparated(*v),
                };
            }
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(SyncError::DatabaseError)?;
        if result.rows_affected() == 0 {
            return Err(SyncError::DatabaseError(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    async fn update_venue(&mut self, id: i64, changes: &[VenueChange]) -> Result<(), SyncError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE venues SET ");
        {
            let mut set = qb.separated(", ");
            for change in changes {
                set.push(change.column());
                set.push_unseparated(" = ");
                match change {
                    VenueChange::Name(v) => set.push_bind_unseparated(v.clone()),
                    VenueChange::City(v) | VenueChange::AgeRestriction(v) => {
                        set.push_bind_unseparated(v.clone())
                    }
                    VenueChange::Capacity(v) => set.push_bind_unseparated(*v),
                };
            }
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(SyncError::DatabaseError)?;
        if result.rows_affected() == 0 {
            return Err(SyncError::DatabaseError(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    async fn update_named(
        &mut self,
        kind: EntityKind,
        id: i64,
        name: &str,
    ) -> Result<(), SyncError> {
        let sql = format!("UPDATE {} SET name = $1 WHERE id = $2", kind.table());
        let result = sqlx::query(&sql)
            .bind(name)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(SyncError::DatabaseError)?;
        if result.rows_affected() == 0 {
            return Err(SyncError::DatabaseError(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), SyncError> {
        self.tx.commit().await.map_err(SyncError::DatabaseError)
    }

    async fn rollback(self) -> Result<(), SyncError> {
        self.tx.rollback().await.map_err(SyncError::DatabaseError)
    }
}
