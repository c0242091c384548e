//! SQLite Circuit State Store with Connection Pooling
//!
//! Durable [`CircuitStateStore`] shared by every process pointing at the
//! same file:
//! - Connection pooling via r2d2 for concurrent access
//! - Version-tracked migrations
//! - WAL mode so readers never block the breaker's writes

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use super::CircuitStateStore;
use crate::resilience::{CircuitRecord, CircuitState};
use crate::types::{ResilienceError, Result, ResultExt};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = include_str!("schema.sql");

/// Current schema version for migration tracking
const SCHEMA_VERSION: u32 = 2;

/// Migration definitions
struct Migration {
    version: u32,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 2,
    description: "Index circuit state for status queries",
    up: "CREATE INDEX IF NOT EXISTS idx_circuit_states_state ON circuit_states(state)",
}];

/// Connection pool configuration
///
/// Pool size is dynamically calculated based on CPU cores.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,
    /// Minimum idle connections to keep ready
    pub min_idle: u32,
    /// Timeout for acquiring a connection (seconds)
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    /// Minimum pool size regardless of CPU count
    const MIN_POOL_SIZE: u32 = 2;
    /// Maximum pool size regardless of CPU count
    const MAX_POOL_SIZE: u32 = 16;

    /// Formula: clamp(cores, MIN, MAX). Circuit updates are tiny, one
    /// connection per core is plenty.
    pub fn optimal_pool_size() -> u32 {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        cores.clamp(Self::MIN_POOL_SIZE, Self::MAX_POOL_SIZE)
    }

    /// Create config with automatic pool sizing based on CPU cores
    pub fn auto() -> Self {
        let max_size = Self::optimal_pool_size();
        Self {
            max_size,
            min_idle: (max_size / 4).max(1),
            connection_timeout_secs: 10,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open database with connection pooling at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default())
    }

    /// Open database with custom pool configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(std::time::Duration::from_secs(
                config.connection_timeout_secs,
            ))
            .build(manager)
            .map_err(|e| {
                ResilienceError::Storage(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self { pool })
    }

    /// Open an in-memory database for testing or temporary use.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();

        let pool = Pool::builder().max_size(1).build(manager).map_err(|e| {
            ResilienceError::Storage(format!("Failed to create in-memory pool: {}", e))
        })?;

        Ok(Self { pool })
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA wal_autocheckpoint = 1000;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            ResilienceError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    /// Create the schema on a fresh database, or migrate an older one.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        let current_version = Self::user_version(&conn);

        conn.execute_batch(SCHEMA)
            .with_context("Failed to initialize database schema")?;

        if current_version == 0 {
            // schema.sql already carries every migration
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to set schema version")?;
            return Ok(());
        }

        drop(conn);
        self.migrate(current_version)
    }

    fn user_version(conn: &Connection) -> u32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0)
    }

    fn migrate(&self, current_version: u32) -> Result<()> {
        let conn = self.conn()?;

        for migration in MIGRATIONS {
            if migration.version > current_version {
                conn.execute_batch(migration.up).with_context_fn(|| {
                    format!(
                        "Failed to apply migration {}: {}",
                        migration.version, migration.description
                    )
                })?;

                tracing::info!(
                    "Applied migration {}: {}",
                    migration.version,
                    migration.description
                );
            }
        }

        if current_version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to update schema version")?;
        }

        Ok(())
    }
}

// =============================================================================
// Circuit State Rows
// =============================================================================

struct CircuitRow {
    model_id: String,
    state: String,
    consecutive_failures: u32,
    opened_at: Option<String>,
    last_failure_reason: Option<String>,
}

impl CircuitRow {
    const COLUMNS: &'static str =
        "model_id, state, consecutive_failures, opened_at, last_failure_reason";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            model_id: row.get(0)?,
            state: row.get(1)?,
            consecutive_failures: row.get(2)?,
            opened_at: row.get(3)?,
            last_failure_reason: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<CircuitRecord> {
        let state: CircuitState = self.state.parse()?;
        let opened_at = self.opened_at.and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .inspect_err(|e| {
                    tracing::warn!(
                        model = %self.model_id,
                        value = %raw,
                        error = %e,
                        "Ignoring unparseable opened_at"
                    );
                })
                .ok()
        });

        Ok(CircuitRecord {
            model_id: self.model_id,
            state,
            consecutive_failures: self.consecutive_failures,
            opened_at,
            last_failure_reason: self.last_failure_reason,
        })
    }
}

impl CircuitStateStore for Database {
    fn get_state(&self, model_id: &str) -> Result<CircuitRecord> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM circuit_states WHERE model_id = ?1",
                    CircuitRow::COLUMNS
                ),
                params![model_id],
                CircuitRow::from_row,
            )
            .optional()
            .with_context_fn(|| format!("Failed to load circuit state for '{}'", model_id))?;

        match row {
            Some(row) => row.into_record(),
            None => Ok(CircuitRecord::closed(model_id)),
        }
    }

    fn put_state(&self, record: &CircuitRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO circuit_states
                (model_id, state, consecutive_failures, opened_at, last_failure_reason, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(model_id) DO UPDATE SET
                state = excluded.state,
                consecutive_failures = excluded.consecutive_failures,
                opened_at = excluded.opened_at,
                last_failure_reason = excluded.last_failure_reason,
                updated_at = excluded.updated_at",
            params![
                record.model_id,
                record.state.to_string(),
                record.consecutive_failures,
                record.opened_at.map(|t| t.to_rfc3339()),
                record.last_failure_reason,
                Utc::now().to_rfc3339(),
            ],
        )
        .with_context_fn(|| format!("Failed to store circuit state for '{}'", record.model_id))?;
        Ok(())
    }

    fn list_states(&self) -> Result<Vec<CircuitRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM circuit_states ORDER BY model_id",
                CircuitRow::COLUMNS
            ))
            .with_context("Failed to prepare circuit state query")?;

        let rows = stmt
            .query_map([], CircuitRow::from_row)
            .with_context("Failed to list circuit states")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context("Failed to read circuit state row")?;

        rows.into_iter().map(CircuitRow::into_record).collect()
    }
}
