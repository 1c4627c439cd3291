use crate::config::AppPaths;
use crate::error::Result;
use crate::models::ScanRecord;
use crate::schema;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Number of scans the home view shows.
pub const RECENT_SCANS: usize = 5;

/// Initializes the database connection pool and runs migrations.
pub fn init_database(paths: &AppPaths) -> Result<DbPool> {
    log::info!("Database path: {}", paths.db_path.display());

    if let Some(parent) = paths.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(&paths.db_path);
    let pool = r2d2::Pool::new(manager)?;

    run_migrations(&pool.get()?)?;

    Ok(pool)
}

/// Applies all pending database migrations.
fn run_migrations(connection: &DbConnection) -> Result<()> {
    log::debug!("Running database migrations...");
    connection.execute_batch(schema::MIGRATION_0001)?;
    Ok(())
}

/// Writes `scan`, replacing any earlier scan with the same id for that user.
pub fn insert_scan(conn: &Connection, scan: &ScanRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO scans (user_id, id, timestamp, image_path, condition, confidence, recommendations)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            scan.user_id,
            scan.id,
            scan.timestamp,
            scan.image_path,
            scan.condition,
            scan.confidence,
            scan.recommendations
        ],
    )?;
    log::info!("Saved scan {} for user {}", scan.id, scan.user_id);
    Ok(())
}

/// Scans for `user_id`, newest first.
pub fn list_scans(conn: &Connection, user_id: &str, limit: Option<usize>) -> Result<Vec<ScanRecord>> {
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    let mut stmt = conn.prepare(
        "SELECT id, user_id, timestamp, image_path, condition, confidence, recommendations
         FROM scans
         WHERE user_id = ?1
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], scan_from_row)?;
    let mut scans = Vec::new();
    for row in rows {
        scans.push(row?);
    }
    Ok(scans)
}

pub fn get_scan(conn: &Connection, user_id: &str, id: &str) -> Result<Option<ScanRecord>> {
    let scan = conn
        .query_row(
            "SELECT id, user_id, timestamp, image_path, condition, confidence, recommendations
             FROM scans
             WHERE user_id = ?1 AND id = ?2",
            params![user_id, id],
            scan_from_row,
        )
        .optional()?;
    Ok(scan)
}

fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<ScanRecord> {
    Ok(ScanRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        timestamp: row.get(2)?,
        image_path: row.get(3)?,
        condition: row.get(4)?,
        confidence: row.get(5)?,
        recommendations: row.get(6)?,
    })
}

#[cfg(test)]
pub(crate) fn init_memory_database() -> Result<DbPool> {
    // Every in-memory connection is its own database, so keep exactly one.
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(SqliteConnectionManager::memory())?;
    run_migrations(&pool.get()?)?;
    Ok(pool)
}
