use std::collections::BTreeMap;

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::store::MemoryStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn load_state(pool: &PgPool) -> anyhow::Result<MemoryStore> {
    let rows = sqlx::query("SELECT key, value::text AS value FROM learning_path.learning_state")
        .fetch_all(pool)
        .await
        .context("failed to read learning state")?;

    let mut entries = BTreeMap::new();
    for row in rows {
        entries.insert(row.get::<String, _>("key"), row.get::<String, _>("value"));
    }
    debug!(keys = entries.len(), "learning state loaded from Postgres");

    Ok(MemoryStore::from_entries(entries))
}

/// Writes keys changed in `store` since it was loaded: upserts for new
/// values, deletes for removed keys. Returns the number of keys written.
pub async fn persist_state(pool: &PgPool, store: &MemoryStore) -> anyhow::Result<usize> {
    let changes = store.changes()?;
    if changes.is_empty() {
        debug!("learning state unchanged");
        return Ok(0);
    }
    let mut tx = pool.begin().await?;

    for (key, value) in &changes {
        match value {
            Some(value) => {
                sqlx::query(
                    r#"
                    INSERT INTO learning_path.learning_state (key, value, updated_at)
                    VALUES ($1, $2::jsonb, now())
                    ON CONFLICT (key) DO UPDATE
                    SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to write {key}"))?;
            }
            None => {
                sqlx::query("DELETE FROM learning_path.learning_state WHERE key = $1")
                    .bind(key)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("failed to delete {key}"))?;
            }
        }
    }

    tx.commit().await?;
    store.clear_changes()?;
    Ok(changes.len())
}
