/// MIGRATION 0001: Scan history.
pub const MIGRATION_0001: &str = r#"
-- Scans Table: One row per confident analysis, keyed by user.
CREATE TABLE IF NOT EXISTS scans (
    user_id TEXT NOT NULL,
    id TEXT NOT NULL, -- local timestamp, %Y%m%d_%H%M%S
    timestamp INTEGER NOT NULL, -- Stored as Unix timestamp
    image_path TEXT NOT NULL,
    condition TEXT NOT NULL,
    confidence REAL NOT NULL, -- 0.0 to 1.0
    recommendations TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    PRIMARY KEY (user_id, id)
);

CREATE INDEX IF NOT EXISTS idx_scans_user_timestamp ON scans (user_id, timestamp DESC);
"#;
