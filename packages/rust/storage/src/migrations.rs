//! SQL migration definitions for the RFQScope database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: runs, stage_events, generation_cache",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per run id; re-running a run id updates it
CREATE TABLE IF NOT EXISTS runs (
    run_id        TEXT PRIMARY KEY,
    model         TEXT NOT NULL,
    status        TEXT NOT NULL,
    started_at    TEXT NOT NULL,
    finished_at   TEXT,
    failures_json TEXT
);

-- Stage outcomes, appended as they happen
CREATE TABLE IF NOT EXISTS stage_events (
    id          TEXT PRIMARY KEY,
    run_id      TEXT NOT NULL REFERENCES runs(run_id) ON DELETE CASCADE,
    stage       TEXT NOT NULL,
    role        TEXT NOT NULL,
    status      TEXT NOT NULL,
    message     TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stage_events_run ON stage_events(run_id);

-- Successful generations, keyed by prompt hash, model and temperature
CREATE TABLE IF NOT EXISTS generation_cache (
    prompt_hash TEXT NOT NULL,
    model       TEXT NOT NULL,
    temperature TEXT NOT NULL,
    response    TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (prompt_hash, model, temperature)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
