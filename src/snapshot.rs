use crate::lock::RawLockRow;
use anyhow::{Context, Result};
use futures::TryStreamExt;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{Connection, PgConnection, Row};
use tracing::{debug, info};

/// Relation locks in the current database, leaving out the locks taken
/// by the session running this query.
pub const SELECT_ALL_LOCKS: &str = r#"
SELECT l.pid, l.relation, l.relation::regclass::text AS relname,
       l.mode, l.granted, COALESCE(a.query, '') AS query
  FROM pg_locks l JOIN pg_stat_activity a USING (pid)
 WHERE l.locktype = 'relation'
   AND l.pid != pg_backend_pid()
   AND l.database = (SELECT oid FROM pg_database WHERE datname = current_database())
"#;

/// One read of the server lock table.
#[derive(Debug, Clone, Default)]
pub struct LockSnapshot {
    pub database: String,
    pub rows: Vec<RawLockRow>,
}

fn raw_lock_row(row: &PgRow) -> Result<RawLockRow, sqlx::Error> {
    Ok(RawLockRow {
        pid: row.try_get("pid")?,
        relation_oid: row.try_get::<Option<Oid>, _>("relation")?.map(|oid| oid.0),
        relation_name: row.try_get("relname")?,
        mode: row.try_get("mode")?,
        granted: row.try_get("granted")?,
        query: row.try_get("query")?,
    })
}

pub async fn connect(options: &PgConnectOptions) -> Result<PgConnection> {
    let conn = PgConnection::connect_with(options)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to database");
    Ok(conn)
}

/// Read the database name and every relation lock row.
pub async fn fetch_snapshot(conn: &mut PgConnection) -> Result<LockSnapshot> {
    let database: String = sqlx::query_scalar("SELECT current_database()")
        .fetch_one(&mut *conn)
        .await
        .context("Failed to query current database")?;
    info!(database = %database, "Reading lock table");

    let mut rows = vec![];
    let mut stream = sqlx::query(SELECT_ALL_LOCKS).fetch(&mut *conn);
    while let Some(row) = stream
        .try_next()
        .await
        .context("Failed to query pg_locks")?
    {
        rows.push(raw_lock_row(&row).context("Failed to decode lock row")?);
    }
    debug!(rows = rows.len(), "Fetched lock rows");
    Ok(LockSnapshot { database, rows })
}
