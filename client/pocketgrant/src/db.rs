//! Database layer: migrations, event queries and cursor management.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::Result;
use crate::events::{EventRecord, GrantEvent};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    // Every connection to `:memory:` opens its own database.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Cursor helpers
// ─────────────────────────────────────────────────────────

/// Last block fully indexed, or `None` when nothing has been indexed yet.
pub async fn get_last_block(pool: &SqlitePool) -> Result<Option<u64>> {
    let row: Option<(Option<i64>,)> =
        sqlx::query_as("SELECT last_block FROM indexer_cursor WHERE id = 1")
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(v,)| v).and_then(|v| u64::try_from(v).ok()))
}

pub async fn save_cursor(pool: &SqlitePool, last_block: u64) -> Result<()> {
    sqlx::query("UPDATE indexer_cursor SET last_block = ?1 WHERE id = 1")
        .bind(last_block as i64)
        .execute(pool)
        .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Event writes
// ─────────────────────────────────────────────────────────

/// Persist a batch of decoded events in one transaction. Events already
/// stored under the same `(tx_hash, log_index)` are silently ignored, so
/// re-indexing a block range is harmless. Returns the number of new rows.
pub async fn insert_events(pool: &SqlitePool, events: &[GrantEvent]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;
    for ev in events {
        let rows_affected = sqlx::query(
            r#"
            INSERT OR IGNORE INTO events
                (event_type, program_id, actor, amount, mode, block_number,
                 tx_hash, log_index, contract)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&ev.event_type)
        .bind(ev.program_id)
        .bind(&ev.actor)
        .bind(&ev.amount)
        .bind(ev.mode)
        .bind(ev.block_number)
        .bind(&ev.tx_hash)
        .bind(ev.log_index)
        .bind(&ev.contract)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        count += rows_affected as usize;
    }
    tx.commit().await?;
    Ok(count)
}

// ─────────────────────────────────────────────────────────
// Event reads
// ─────────────────────────────────────────────────────────

const SELECT_EVENTS: &str = r#"
    SELECT id, event_type, program_id, actor, amount, mode, block_number,
           tx_hash, log_index, contract, created_at
    FROM   events
"#;

/// All events for one program, in chain order.
pub async fn get_events_for_program(pool: &SqlitePool, program_id: u64) -> Result<Vec<EventRecord>> {
    let sql = format!("{SELECT_EVENTS} WHERE program_id = ?1 ORDER BY block_number ASC, log_index ASC");
    let rows = sqlx::query_as::<_, EventRecord>(&sql)
        .bind(program_id as i64)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Most recent events first, at most `limit`.
pub async fn get_recent_events(pool: &SqlitePool, limit: u32) -> Result<Vec<EventRecord>> {
    let sql = format!("{SELECT_EVENTS} ORDER BY block_number DESC, log_index DESC LIMIT ?1");
    let rows = sqlx::query_as::<_, EventRecord>(&sql)
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// `program_created` events whose provider is `actor` (lowercase hex).
pub async fn get_programs_by_provider(pool: &SqlitePool, actor: &str) -> Result<Vec<EventRecord>> {
    let sql = format!(
        "{SELECT_EVENTS} WHERE event_type = 'program_created' AND actor = ?1 \
         ORDER BY program_id ASC"
    );
    let rows = sqlx::query_as::<_, EventRecord>(&sql)
        .bind(actor)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
