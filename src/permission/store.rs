//! Durable workflow grants

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermissionStoreError {
    #[error("failed to open grant database at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("grant database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// An "allow always" decision for one workflow
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGrant {
    pub workflow_id: String,
    pub workflow_name: String,
    pub granted_at: DateTime<Utc>,
}

/// SQLite-backed grant table
///
/// In-memory stores last for the process; file stores survive restarts.
pub struct GrantStore {
    conn: Mutex<Connection>,
}

impl GrantStore {
    pub fn in_memory() -> Result<Self, PermissionStoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open or create the grant database at `path`
    pub fn open(path: &Path) -> Result<Self, PermissionStoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PermissionStoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|source| PermissionStoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        init_schema(&conn)?;

        tracing::debug!(path = %path.display(), "opened grant database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record (or refresh) an always-grant
    pub fn grant(&self, workflow_id: &str, workflow_name: &str) -> Result<(), PermissionStoreError> {
        let now = Utc::now().to_rfc3339();
        self.lock().execute(
            "INSERT INTO permission_grants (workflow_id, workflow_name, granted_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(workflow_id) DO UPDATE SET
                workflow_name = excluded.workflow_name,
                granted_at = excluded.granted_at",
            (workflow_id, workflow_name, &now),
        )?;
        Ok(())
    }

    pub fn has(&self, workflow_id: &str) -> Result<bool, PermissionStoreError> {
        let found = self
            .lock()
            .query_row(
                "SELECT 1 FROM permission_grants WHERE workflow_id = ?1",
                [workflow_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Remove one grant; true if it existed
    pub fn revoke(&self, workflow_id: &str) -> Result<bool, PermissionStoreError> {
        let removed = self.lock().execute(
            "DELETE FROM permission_grants WHERE workflow_id = ?1",
            [workflow_id],
        )?;
        Ok(removed > 0)
    }

    /// All grants, oldest first
    pub fn list(&self) -> Result<Vec<WorkflowGrant>, PermissionStoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT workflow_id, workflow_name, granted_at
             FROM permission_grants ORDER BY granted_at, workflow_id",
        )?;

        let grants = stmt
            .query_map([], |row| {
                let granted_at: String = row.get(2)?;
                Ok(WorkflowGrant {
                    workflow_id: row.get(0)?,
                    workflow_name: row.get(1)?,
                    granted_at: DateTime::parse_from_rfc3339(&granted_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(grants)
    }

    /// Remove every grant; returns how many were removed
    pub fn clear(&self) -> Result<usize, PermissionStoreError> {
        Ok(self.lock().execute("DELETE FROM permission_grants", [])?)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS permission_grants (
            workflow_id TEXT PRIMARY KEY,
            workflow_name TEXT NOT NULL,
            granted_at TEXT NOT NULL
        );
        "#,
    )
}
