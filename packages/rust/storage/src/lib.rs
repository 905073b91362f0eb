//! libSQL storage layer (embedded, local file).
//!
//! The [`Storage`] struct wraps a libSQL database holding the run ledger
//! (`runs`, `stage_events`) and the generation cache that makes a failed run
//! resumable: re-running the same run id replays every generation that
//! already succeeded instead of calling the service again.
//!
//! The database lives at `{output_root}/indexes/rfqscope.db`.

mod migrations;

use std::path::{Path, PathBuf};

use chrono::Utc;
use libsql::{Connection, Database, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rfqscope_shared::{Result, RfqScopeError, RunId, Stage};

/// Database file name under `{output_root}/indexes/`.
pub const DB_FILE_NAME: &str = "rfqscope.db";

/// Database path for an output root.
pub fn db_path(output_root: &Path) -> PathBuf {
    output_root.join("indexes").join(DB_FILE_NAME)
}

fn storage_err(e: libsql::Error) -> RfqScopeError {
    RfqScopeError::Storage(e.to_string())
}

/// Temperatures are stored as fixed-precision text so cache lookups never
/// depend on float equality.
fn temperature_key(temperature: f32) -> String {
    format!("{temperature:.2}")
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(RfqScopeError::Storage(format!("unknown run status: {other}"))),
        }
    }
}

/// A row of the `runs` table.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub model: String,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub failures_json: Option<String>,
}

/// Outcome of one stage for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// A row of the `stage_events` table.
#[derive(Debug, Clone)]
pub struct StageEvent {
    pub stage: String,
    pub role: String,
    pub status: String,
    pub message: Option<String>,
    pub recorded_at: String,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RfqScopeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    RfqScopeError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Run ledger
    // -----------------------------------------------------------------------

    /// Record the start of a run. Re-running a run id resets its status.
    pub async fn begin_run(&self, run_id: &RunId, model: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (run_id, model, status, started_at, finished_at, failures_json)
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL)
                 ON CONFLICT(run_id) DO UPDATE SET
                    model = excluded.model,
                    status = excluded.status,
                    started_at = excluded.started_at,
                    finished_at = NULL,
                    failures_json = NULL",
                params![
                    run_id.as_str(),
                    model,
                    RunStatus::Running.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Record the end of a run, with the serialized failures if any.
    pub async fn finish_run(
        &self,
        run_id: &RunId,
        status: RunStatus,
        failures_json: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET status = ?2, finished_at = ?3, failures_json = ?4 WHERE run_id = ?1",
                params![run_id.as_str(), status.as_str(), now.as_str(), failures_json],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a run by id.
    pub async fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT run_id, model, status, started_at, finished_at, failures_json
                 FROM runs WHERE run_id = ?1",
                params![run_id.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let status: String = row.get(2).map_err(storage_err)?;
                Ok(Some(RunRecord {
                    run_id: row.get(0).map_err(storage_err)?,
                    model: row.get(1).map_err(storage_err)?,
                    status: RunStatus::parse(&status)?,
                    started_at: row.get(3).map_err(storage_err)?,
                    finished_at: row.get::<Option<String>>(4).map_err(storage_err)?,
                    failures_json: row.get::<Option<String>>(5).map_err(storage_err)?,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Append a stage outcome to the ledger.
    pub async fn record_stage(
        &self,
        run_id: &RunId,
        stage: Stage,
        role: &str,
        status: StageStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO stage_events (id, run_id, stage, role, status, message, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    run_id.as_str(),
                    stage.as_str(),
                    role,
                    status.as_str(),
                    message,
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Stage events of a run, oldest first.
    pub async fn list_stage_events(&self, run_id: &RunId) -> Result<Vec<StageEvent>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stage, role, status, message, recorded_at
                 FROM stage_events WHERE run_id = ?1 ORDER BY recorded_at, id",
                params![run_id.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            events.push(StageEvent {
                stage: row.get(0).map_err(storage_err)?,
                role: row.get(1).map_err(storage_err)?,
                status: row.get(2).map_err(storage_err)?,
                message: row.get::<Option<String>>(3).map_err(storage_err)?,
                recorded_at: row.get(4).map_err(storage_err)?,
            });
        }
        Ok(events)
    }

    // -----------------------------------------------------------------------
    // Generation cache
    // -----------------------------------------------------------------------

    /// Look up a cached generation.
    pub async fn get_cached_generation(
        &self,
        prompt_hash: &str,
        model: &str,
        temperature: f32,
    ) -> Result<Option<String>> {
        let temperature = temperature_key(temperature);
        let mut rows = self
            .conn
            .query(
                "SELECT response FROM generation_cache
                 WHERE prompt_hash = ?1 AND model = ?2 AND temperature = ?3",
                params![prompt_hash, model, temperature.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Store a successful generation (upserts).
    pub async fn put_cached_generation(
        &self,
        prompt_hash: &str,
        model: &str,
        temperature: f32,
        response: &str,
    ) -> Result<()> {
        let temperature = temperature_key(temperature);
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO generation_cache (prompt_hash, model, temperature, response, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(prompt_hash, model, temperature) DO UPDATE SET
                    response = excluded.response,
                    created_at = excluded.created_at",
                params![prompt_hash, model, temperature.as_str(), response, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Number of cached generations.
    pub async fn cached_generation_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM generation_cache", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(storage_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("rfqscope_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn run_id() -> RunId {
        Uuid::now_v7().to_string().parse().expect("run id")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("rfqscope_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[test]
    fn db_path_is_under_indexes() {
        let path = db_path(Path::new("/out"));
        assert_eq!(path, Path::new("/out/indexes/rfqscope.db"));
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;
        let id = run_id();

        storage.begin_run(&id, "gpt-4o").await.expect("begin run");
        let run = storage.get_run(&id).await.expect("get run").expect("run exists");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());

        storage
            .finish_run(&id, RunStatus::Failed, Some(r#"[{"stage":"summary"}]"#))
            .await
            .expect("finish run");
        let run = storage.get_run(&id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.finished_at.is_some());
        assert!(run.failures_json.unwrap().contains("summary"));

        // Re-running resets the row.
        storage.begin_run(&id, "gpt-4o").await.expect("re-begin run");
        let run = storage.get_run(&id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.failures_json.is_none());
    }

    #[tokio::test]
    async fn unknown_run_is_none() {
        let storage = test_storage().await;
        assert!(storage.get_run(&run_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stage_events_in_order() {
        let storage = test_storage().await;
        let id = run_id();
        storage.begin_run(&id, "m").await.unwrap();

        storage
            .record_stage(&id, Stage::Summary, "customer", StageStatus::Succeeded, None)
            .await
            .unwrap();
        storage
            .record_stage(
                &id,
                Stage::Summary,
                "vendor:provider1",
                StageStatus::Failed,
                Some("timeout"),
            )
            .await
            .unwrap();

        let events = storage.list_stage_events(&id).await.expect("list events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].role, "customer");
        assert_eq!(events[1].status, "failed");
        assert_eq!(events[1].message.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn generation_cache_keys_on_model_and_temperature() {
        let storage = test_storage().await;

        assert!(
            storage
                .get_cached_generation("h1", "gpt-4o", 0.0)
                .await
                .unwrap()
                .is_none()
        );

        storage
            .put_cached_generation("h1", "gpt-4o", 0.0, "summary")
            .await
            .expect("put cache");

        let hit = storage.get_cached_generation("h1", "gpt-4o", 0.0).await.unwrap();
        assert_eq!(hit.as_deref(), Some("summary"));

        assert!(
            storage
                .get_cached_generation("h1", "gpt-4o", 0.3)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            storage
                .get_cached_generation("h1", "other-model", 0.0)
                .await
                .unwrap()
                .is_none()
        );

        storage
            .put_cached_generation("h1", "gpt-4o", 0.0, "newer")
            .await
            .expect("upsert cache");
        assert_eq!(
            storage
                .get_cached_generation("h1", "gpt-4o", 0.0)
                .await
                .unwrap()
                .as_deref(),
            Some("newer")
        );
        assert_eq!(storage.cached_generation_count().await.unwrap(), 1);
    }
}
