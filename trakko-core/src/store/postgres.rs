//! Postgres-backed record store.
//!
//! Records live in one table keyed by `(family, event_id)`; versions come
//! from the `records_version_seq` sequence. Every successful write issues
//! `pg_notify('trakko_records', '<family>/<eventId>')` inside its
//! transaction, and a [`PgListener`] task fans those notifications out to
//! local watchers, so watches also observe writes made by other processes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::task::JoinHandle;

use super::{
    CommitOutcome, Entry, KeyFamily, KeyWatcher, RecordKey, RecordStore, StoreError,
    Versionstamp, WatchRegistry,
};

/// Notification channel carrying changed record keys.
pub const NOTIFY_CHANNEL: &str = "trakko_records";

const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct PgStore {
    pool: PgPool,
    watches: Arc<WatchRegistry>,
    listener: JoinHandle<()>,
}

impl PgStore {
    /// Connect the change listener and return a ready store.
    pub async fn connect(pool: PgPool) -> Result<Self, StoreError> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let watches = Arc::new(WatchRegistry::new());
        let listener = tokio::spawn(run_listener(listener, Arc::clone(&watches)));

        Ok(Self {
            pool,
            watches,
            listener,
        })
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn run_listener(mut listener: PgListener, watches: Arc<WatchRegistry>) {
    tracing::info!(channel = NOTIFY_CHANNEL, "record change listener started");
    loop {
        match listener.try_recv().await {
            Ok(Some(notification)) => match notification.payload().parse::<RecordKey>() {
                Ok(key) => watches.notify(&key),
                Err(_) => tracing::warn!(
                    payload = notification.payload(),
                    "ignoring notification for unknown key"
                ),
            },
            Ok(None) => {
                // The connection dropped and sqlx reconnected; anything sent
                // in between is lost, so every watcher has to re-read.
                tracing::warn!("record change listener reconnected");
                watches.notify_all();
            }
            Err(e) => {
                tracing::error!(error = %e, "record change listener failed");
                tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                watches.notify_all();
            }
        }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    #[tracing::instrument(skip_all, err, name = "SQL:GetRecord")]
    async fn get(&self, key: &RecordKey) -> Result<Entry, StoreError> {
        let row: Option<(Value, i64)> = sqlx::query_as(
            r#"
            SELECT value, version
            FROM records
            WHERE family = $1 AND event_id = $2
            "#,
        )
        .bind(key.family.as_str())
        .bind(key.event_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((value, version)) => Entry {
                value: Some(value),
                version: Some(Versionstamp::new(version)),
            },
            None => Entry::absent(),
        })
    }

    #[tracing::instrument(skip_all, err, name = "SQL:CommitRecord")]
    async fn commit(
        &self,
        key: &RecordKey,
        expected: Option<Versionstamp>,
        value: Value,
    ) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let version: Option<i64> = match expected {
            None => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO records (family, event_id, value, version)
                    VALUES ($1, $2, $3, nextval('records_version_seq'))
                    ON CONFLICT (family, event_id) DO NOTHING
                    RETURNING version
                    "#,
                )
                .bind(key.family.as_str())
                .bind(key.event_id.as_str())
                .bind(&value)
                .fetch_optional(&mut *tx)
                .await?
            }
            Some(expected) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE records
                    SET value = $3, version = nextval('records_version_seq')
                    WHERE family = $1 AND event_id = $2 AND version = $4
                    RETURNING version
                    "#,
                )
                .bind(key.family.as_str())
                .bind(key.event_id.as_str())
                .bind(&value)
                .bind(expected.get())
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let Some(version) = version else {
            tx.rollback().await?;
            return Ok(CommitOutcome::VersionMismatch);
        };

        notify(&mut tx, key).await?;
        tx.commit().await?;
        Ok(CommitOutcome::Committed(Versionstamp::new(version)))
    }

    #[tracing::instrument(skip_all, err, name = "SQL:DeleteRecord")]
    async fn delete(&self, key: &RecordKey) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            DELETE FROM records
            WHERE family = $1 AND event_id = $2
            "#,
        )
        .bind(key.family.as_str())
        .bind(key.event_id.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            notify(&mut tx, key).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:ListRecords")]
    async fn list(&self, family: KeyFamily) -> Result<Vec<(RecordKey, Entry)>, StoreError> {
        let rows: Vec<(String, Value, i64)> = sqlx::query_as(
            r#"
            SELECT event_id, value, version
            FROM records
            WHERE family = $1
            "#,
        )
        .bind(family.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(event_id, value, version)| {
                let Ok(event_id) = event_id.parse() else {
                    tracing::warn!(%event_id, "skipping record with malformed event id");
                    return None;
                };
                Some((
                    RecordKey { family, event_id },
                    Entry {
                        value: Some(value),
                        version: Some(Versionstamp::new(version)),
                    },
                ))
            })
            .collect())
    }

    fn watch(&self, key: &RecordKey) -> KeyWatcher {
        self.watches.subscribe(key)
    }
}

async fn notify(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    key: &RecordKey,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(NOTIFY_CHANNEL)
        .bind(key.to_string())
        .execute(&mut **tx)
        .await?;
    Ok(())
}
