//! DuckDB case store.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use docket_core::{Case, SyncWatermark};
use duckdb::{Connection, params};
use tracing::{debug, info};

use crate::{CaseStore, StoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cases (
    rol       VARCHAR PRIMARY KEY,
    admission DATE NOT NULL,
    body      VARCHAR NOT NULL
)";

/// DuckDB-backed [`CaseStore`].
///
/// One row per case: the docket code, its admission date (indexed for
/// watermark lookups) and the full case as JSON. Cases are only ever written
/// whole, so the body column is the source of truth.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and [`open_persistent`](Self::open_persistent)
/// for a database that survives across runs.
pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), cases = store.case_count()?, "opened case store");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored cases.
    pub fn case_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT count(*) FROM cases", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Other(format!("mutex poisoned: {e}")))?;
        f(&conn)
    }
}

fn select_case(conn: &Connection, rol: &str) -> Result<Option<Case>, StoreError> {
    let mut stmt = conn.prepare("SELECT body FROM cases WHERE rol = ?")?;
    let mut rows = stmt.query(params![rol])?;
    match rows.next()? {
        Some(row) => {
            let body: String = row.get(0)?;
            Ok(Some(serde_json::from_str(&body)?))
        }
        None => Ok(None),
    }
}

/// Overwrite the row for `rol`; returns the number of rows touched.
fn update_case(conn: &Connection, rol: &str, case: &Case) -> Result<usize, StoreError> {
    let body = serde_json::to_string(case)?;
    let touched = conn.execute(
        "UPDATE cases SET admission = CAST(? AS DATE), body = ? WHERE rol = ?",
        params![case.admission.to_string(), body, rol],
    )?;
    Ok(touched)
}

#[async_trait]
impl CaseStore for DuckStore {
    async fn find(&self, rol: &str) -> Result<Option<Case>, StoreError> {
        self.with_conn(|conn| select_case(conn, rol))
    }

    async fn insert(&self, case: &Case) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            if select_case(conn, &case.rol)?.is_some() {
                return Err(StoreError::Duplicate(case.rol.clone()));
            }
            let body = serde_json::to_string(case)?;
            conn.execute(
                "INSERT INTO cases (rol, admission, body) VALUES (?, CAST(? AS DATE), ?)",
                params![case.rol, case.admission.to_string(), body],
            )?;
            debug!(rol = %case.rol, "inserted case");
            Ok(())
        })
    }

    async fn replace(&self, rol: &str, case: &Case) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            if update_case(conn, rol, case)? == 0 {
                return Err(StoreError::NotFound(rol.to_string()));
            }
            debug!(rol, "replaced case");
            Ok(())
        })
    }

    async fn pull_document(&self, rol: &str, identity: &str) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let mut case =
                select_case(conn, rol)?.ok_or_else(|| StoreError::NotFound(rol.to_string()))?;
            let removed = case.pull_document(identity);
            if removed > 0 {
                update_case(conn, rol, &case)?;
                debug!(rol, identity, removed, "pulled document");
            }
            Ok(removed)
        })
    }

    async fn watermark(&self) -> Result<Option<SyncWatermark>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT rol, CAST(admission AS VARCHAR) FROM cases \
                 ORDER BY admission DESC, rol DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let rol: String = row.get(0)?;
            let raw: String = row.get(1)?;
            let admission = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|e| StoreError::Other(format!("bad admission date {raw:?}: {e}")))?;
            Ok(Some(SyncWatermark { rol, admission }))
        })
    }
}
