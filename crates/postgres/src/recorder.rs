//! Recorder implementations over sqlx/PostgreSQL.

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use chronicle_core::AggregateId;
use chronicle_persistence::{
    AggregateRecorder, ApplicationRecorder, EventSelect, Notification, NotificationId,
    PersistenceError, ProcessRecorder, StoredItem, Tracking,
};

/// Resolve the tokio runtime these blocking facades bridge into.
fn runtime() -> Result<tokio::runtime::Handle, PersistenceError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        PersistenceError::datastore(
            "postgres recorders require a tokio runtime; construct one before using them",
        )
    })
}

/// Map sqlx errors onto the persistence error model.
///
/// SQLSTATE 23505 (unique violation) is the optimistic-concurrency /
/// tracking collision signal; everything else is an unrecoverable datastore
/// failure. An error after a write was issued is surfaced, never swallowed;
/// the transaction it belonged to is rolled back, so the write has no
/// visible effect.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PersistenceError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                PersistenceError::integrity(format!(
                    "unique constraint violated in {operation}: {}",
                    db_err.message()
                ))
            } else {
                PersistenceError::datastore(format!(
                    "database error in {operation}: {}",
                    db_err.message()
                ))
            }
        }
        _ => PersistenceError::datastore(format!("sqlx error in {operation}: {err}")),
    }
}

/// Only ever interpolate identifiers we generated ourselves.
pub(crate) fn sanitize_table_name(name: &str) -> String {
    let mut table: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if table.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        table.insert(0, 't');
    }
    table
}

#[derive(Debug)]
struct StoredItemRow {
    originator_id: uuid::Uuid,
    originator_version: i64,
    topic: String,
    state: Vec<u8>,
}

impl<'r> FromRow<'r, PgRow> for StoredItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredItemRow {
            originator_id: row.try_get("originator_id")?,
            originator_version: row.try_get("originator_version")?,
            topic: row.try_get("topic")?,
            state: row.try_get("state")?,
        })
    }
}

impl From<StoredItemRow> for StoredItem {
    fn from(row: StoredItemRow) -> Self {
        StoredItem {
            originator_id: AggregateId::from_uuid(row.originator_id),
            originator_version: row.originator_version as u64,
            topic: row.topic,
            state: row.state,
        }
    }
}

#[derive(Debug)]
struct NotificationRow {
    notification_id: i64,
    originator_id: uuid::Uuid,
    originator_version: i64,
    topic: String,
    state: Vec<u8>,
}

impl<'r> FromRow<'r, PgRow> for NotificationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(NotificationRow {
            notification_id: row.try_get("notification_id")?,
            originator_id: row.try_get("originator_id")?,
            originator_version: row.try_get("originator_version")?,
            topic: row.try_get("topic")?,
            state: row.try_get("state")?,
        })
    }
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.notification_id as u64,
            originator_id: AggregateId::from_uuid(row.originator_id),
            originator_version: row.originator_version as u64,
            topic: row.topic,
            state: row.state,
        }
    }
}

async fn select_events_sql(
    pool: &PgPool,
    table: &str,
    originator_id: AggregateId,
    select: &EventSelect,
) -> Result<Vec<StoredItem>, PersistenceError> {
    let order = if select.desc { "DESC" } else { "ASC" };
    let sql = format!(
        "SELECT originator_id, originator_version, topic, state \
         FROM {table} \
         WHERE originator_id = $1 \
           AND ($2::bigint IS NULL OR originator_version > $2) \
           AND ($3::bigint IS NULL OR originator_version <= $3) \
         ORDER BY originator_version {order} \
         LIMIT $4"
    );
    let rows = sqlx::query(&sql)
        .bind(originator_id.as_uuid())
        .bind(select.gt.map(|v| v as i64))
        .bind(select.lte.map(|v| v as i64))
        .bind(select.limit.map(|l| l as i64))
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("select_events", e))?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let item = StoredItemRow::from_row(&row)
            .map_err(|e| PersistenceError::datastore(format!("malformed event row: {e}")))?;
        items.push(item.into());
    }
    Ok(items)
}

async fn insert_items(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    items: &[StoredItem],
    first_notification_id: Option<u64>,
) -> Result<(), PersistenceError> {
    let sql = if first_notification_id.is_some() {
        format!(
            "INSERT INTO {table} (originator_id, originator_version, topic, state, notification_id) \
             VALUES ($1, $2, $3, $4, $5)"
        )
    } else {
        format!(
            "INSERT INTO {table} (originator_id, originator_version, topic, state) \
             VALUES ($1, $2, $3, $4)"
        )
    };
    for (offset, item) in items.iter().enumerate() {
        let mut query = sqlx::query(&sql)
            .bind(item.originator_id.as_uuid())
            .bind(item.originator_version as i64)
            .bind(&item.topic)
            .bind(&item.state);
        if let Some(first) = first_notification_id {
            query = query.bind((first + offset as u64) as i64);
        }
        query
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_events", e))?;
    }
    Ok(())
}

/// Serialize writers and read the current notification high-water mark.
///
/// The exclusive lock is what keeps the id sequence dense: a transaction
/// that aborts after taking the lock releases it without publishing ids.
async fn lock_and_max_notification_id(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
) -> Result<u64, PersistenceError> {
    sqlx::query(&format!("LOCK TABLE {table} IN EXCLUSIVE MODE"))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_table", e))?;
    let row = sqlx::query(&format!(
        "SELECT COALESCE(MAX(notification_id), 0) AS max_id FROM {table}"
    ))
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("max_notification_id", e))?;
    let max_id: i64 = row
        .try_get("max_id")
        .map_err(|e| PersistenceError::datastore(format!("malformed max_id row: {e}")))?;
    Ok(max_id as u64)
}

/// Per-originator log without a notification sequence (snapshots).
#[derive(Debug, Clone)]
pub struct PostgresAggregateRecorder {
    pool: Arc<PgPool>,
    events_table: String,
}

impl PostgresAggregateRecorder {
    pub fn new(pool: Arc<PgPool>, events_table: &str) -> Self {
        Self {
            pool,
            events_table: sanitize_table_name(events_table),
        }
    }

    pub async fn create_table(&self) -> Result<(), PersistenceError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} ( \
               originator_id UUID NOT NULL, \
               originator_version BIGINT NOT NULL, \
               topic TEXT NOT NULL, \
               state BYTEA NOT NULL, \
               PRIMARY KEY (originator_id, originator_version) \
             )",
            self.events_table
        ))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_table", e))?;
        Ok(())
    }

    async fn insert(&self, items: &[StoredItem]) -> Result<(), PersistenceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        insert_items(&mut tx, &self.events_table, items, None).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }
}

impl AggregateRecorder for PostgresAggregateRecorder {
    #[instrument(skip(self, items), fields(table = %self.events_table, count = items.len()), err)]
    fn insert_events(&self, items: &[StoredItem]) -> Result<Vec<NotificationId>, PersistenceError> {
        if items.is_empty() {
            return Ok(vec![]);
        }
        runtime()?.block_on(self.insert(items))?;
        Ok(vec![])
    }

    fn select_events(
        &self,
        originator_id: AggregateId,
        select: &EventSelect,
    ) -> Result<Vec<StoredItem>, PersistenceError> {
        if select.limit == Some(0) {
            return Ok(vec![]);
        }
        runtime()?.block_on(select_events_sql(
            &self.pool,
            &self.events_table,
            originator_id,
            select,
        ))
    }
}

/// Application recorder: events plus the gap-free notification log.
#[derive(Debug, Clone)]
pub struct PostgresApplicationRecorder {
    pool: Arc<PgPool>,
    events_table: String,
}

impl PostgresApplicationRecorder {
    pub fn new(pool: Arc<PgPool>, events_table: &str) -> Self {
        Self {
            pool,
            events_table: sanitize_table_name(events_table),
        }
    }

    pub async fn create_table(&self) -> Result<(), PersistenceError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} ( \
               originator_id UUID NOT NULL, \
               originator_version BIGINT NOT NULL, \
               topic TEXT NOT NULL, \
               state BYTEA NOT NULL, \
               notification_id BIGINT NOT NULL UNIQUE, \
               PRIMARY KEY (originator_id, originator_version) \
             )",
            self.events_table
        ))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_table", e))?;
        Ok(())
    }

    async fn insert(&self, items: &[StoredItem]) -> Result<Vec<NotificationId>, PersistenceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        let max_id = lock_and_max_notification_id(&mut tx, &self.events_table).await?;
        insert_items(&mut tx, &self.events_table, items, Some(max_id + 1)).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok((max_id + 1..=max_id + items.len() as u64).collect())
    }

    async fn select_notifications_sql(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, PersistenceError> {
        let sql = format!(
            "SELECT originator_id, originator_version, topic, state, notification_id \
             FROM {} \
             WHERE notification_id >= $1 \
             ORDER BY notification_id ASC \
             LIMIT $2",
            self.events_table
        );
        let rows = sqlx::query(&sql)
            .bind(start.max(1) as i64)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("select_notifications", e))?;

        let mut notifications = Vec::with_capacity(rows.len());
        for row in rows {
            let notification = NotificationRow::from_row(&row).map_err(|e| {
                PersistenceError::datastore(format!("malformed notification row: {e}"))
            })?;
            notifications.push(notification.into());
        }
        Ok(notifications)
    }

    async fn max_id(&self) -> Result<NotificationId, PersistenceError> {
        let row = sqlx::query(&format!(
            "SELECT COALESCE(MAX(notification_id), 0) AS max_id FROM {}",
            self.events_table
        ))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("max_notification_id", e))?;
        let max_id: i64 = row
            .try_get("max_id")
            .map_err(|e| PersistenceError::datastore(format!("malformed max_id row: {e}")))?;
        Ok(max_id as u64)
    }
}

impl AggregateRecorder for PostgresApplicationRecorder {
    #[instrument(skip(self, items), fields(table = %self.events_table, count = items.len()), err)]
    fn insert_events(&self, items: &[StoredItem]) -> Result<Vec<NotificationId>, PersistenceError> {
        if items.is_empty() {
            return Ok(vec![]);
        }
        runtime()?.block_on(self.insert(items))
    }

    fn select_events(
        &self,
        originator_id: AggregateId,
        select: &EventSelect,
    ) -> Result<Vec<StoredItem>, PersistenceError> {
        if select.limit == Some(0) {
            return Ok(vec![]);
        }
        runtime()?.block_on(select_events_sql(
            &self.pool,
            &self.events_table,
            originator_id,
            select,
        ))
    }
}

impl ApplicationRecorder for PostgresApplicationRecorder {
    fn select_notifications(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, PersistenceError> {
        runtime()?.block_on(self.select_notifications_sql(start, limit))
    }

    fn max_notification_id(&self) -> Result<NotificationId, PersistenceError> {
        runtime()?.block_on(self.max_id())
    }
}

/// Process recorder: events, notifications and tracking in one transaction.
#[derive(Debug, Clone)]
pub struct PostgresProcessRecorder {
    events: PostgresApplicationRecorder,
    tracking_table: String,
}

impl PostgresProcessRecorder {
    pub fn new(pool: Arc<PgPool>, events_table: &str, tracking_table: &str) -> Self {
        Self {
            events: PostgresApplicationRecorder::new(pool, events_table),
            tracking_table: sanitize_table_name(tracking_table),
        }
    }

    pub async fn create_table(&self) -> Result<(), PersistenceError> {
        self.events.create_table().await?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} ( \
               application_name TEXT NOT NULL, \
               notification_id BIGINT NOT NULL, \
               PRIMARY KEY (application_name, notification_id) \
             )",
            self.tracking_table
        ))
        .execute(&*self.events.pool)
        .await
        .map_err(|e| map_sqlx_error("create_table", e))?;
        Ok(())
    }

    async fn insert(
        &self,
        items: &[StoredItem],
        tracking: Option<&Tracking>,
    ) -> Result<Vec<NotificationId>, PersistenceError> {
        let mut tx = self
            .events
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let ids = if items.is_empty() {
            Vec::new()
        } else {
            let max_id = lock_and_max_notification_id(&mut tx, &self.events.events_table).await?;
            insert_items(&mut tx, &self.events.events_table, items, Some(max_id + 1)).await?;
            (max_id + 1..=max_id + items.len() as u64).collect()
        };

        if let Some(tracking) = tracking {
            sqlx::query(&format!(
                "INSERT INTO {} (application_name, notification_id) VALUES ($1, $2)",
                self.tracking_table
            ))
            .bind(&tracking.application_name)
            .bind(tracking.notification_id as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_tracking", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(ids)
    }

    async fn max_tracking(&self, application_name: &str) -> Result<u64, PersistenceError> {
        let row = sqlx::query(&format!(
            "SELECT COALESCE(MAX(notification_id), 0) AS max_id FROM {} \
             WHERE application_name = $1",
            self.tracking_table
        ))
        .bind(application_name)
        .fetch_one(&*self.events.pool)
        .await
        .map_err(|e| map_sqlx_error("max_tracking_id", e))?;
        let max_id: i64 = row
            .try_get("max_id")
            .map_err(|e| PersistenceError::datastore(format!("malformed max_id row: {e}")))?;
        Ok(max_id as u64)
    }
}

impl AggregateRecorder for PostgresProcessRecorder {
    fn insert_events(&self, items: &[StoredItem]) -> Result<Vec<NotificationId>, PersistenceError> {
        self.insert_tracked(items, None)
    }

    fn select_events(
        &self,
        originator_id: AggregateId,
        select: &EventSelect,
    ) -> Result<Vec<StoredItem>, PersistenceError> {
        self.events.select_events(originator_id, select)
    }
}

impl ApplicationRecorder for PostgresProcessRecorder {
    fn select_notifications(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, PersistenceError> {
        self.events.select_notifications(start, limit)
    }

    fn max_notification_id(&self) -> Result<NotificationId, PersistenceError> {
        self.events.max_notification_id()
    }
}

impl ProcessRecorder for PostgresProcessRecorder {
    #[instrument(
        skip(self, items, tracking),
        fields(table = %self.events.events_table, count = items.len()),
        err
    )]
    fn insert_tracked(
        &self,
        items: &[StoredItem],
        tracking: Option<Tracking>,
    ) -> Result<Vec<NotificationId>, PersistenceError> {
        if items.is_empty() && tracking.is_none() {
            return Ok(vec![]);
        }
        runtime()?.block_on(self.insert(items, tracking.as_ref()))
    }

    fn max_tracking_id(
        &self,
        application_name: &str,
    ) -> Result<NotificationId, PersistenceError> {
        runtime()?.block_on(self.max_tracking(application_name))
    }
}
