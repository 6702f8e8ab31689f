// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All statements run on tokio-rusqlite's single background thread. That
//! thread is the serialization point for every read-merge-write sequence in
//! the query modules. Do NOT create additional Connection instances for writes.

use std::path::Path;

use mirrorgate_core::MirrorgateError;
use rusqlite::ErrorCode;
use tracing::debug;

/// Handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and run pending migrations.
    pub async fn open(path: &str) -> Result<Self, MirrorgateError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing the journal mode explicitly.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, MirrorgateError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| MirrorgateError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| MirrorgateError::Storage {
                source: Box::new(e),
            })?;

        let journal = if wal_mode { "WAL" } else { "DELETE" };
        let migrated = conn
            .call(move |conn| -> Result<_, rusqlite::Error> {
                conn.execute_batch(&format!(
                    "PRAGMA journal_mode = {journal};
                     PRAGMA synchronous = NORMAL;
                     PRAGMA foreign_keys = ON;
                     PRAGMA busy_timeout = 5000;"
                ))?;
                Ok(crate::migrations::run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)?;
        migrated?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The shared connection. Every query goes through `connection().call(..)`.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), MirrorgateError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(map_tr_err)
    }

    /// Flush the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), MirrorgateError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Convert a tokio-rusqlite error into a [`MirrorgateError`].
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> MirrorgateError {
    match e {
        tokio_rusqlite::Error::Error(err) => map_sql_err(err),
        other => MirrorgateError::Storage {
            source: Box::new(other),
        },
    }
}

/// Classify a SQLite error. Uniqueness violations become `Conflict`; column
/// conversion failures become `Decode`.
pub(crate) fn map_sql_err(err: rusqlite::Error) -> MirrorgateError {
    if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        let extended = err.sqlite_error().map(|e| e.extended_code);
        if matches!(
            extended,
            Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
                | Some(rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        ) {
            let key = match &err {
                rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
                other => other.to_string(),
            };
            return MirrorgateError::Conflict {
                entity: conflict_entity(&key),
                key,
            };
        }
    }
    match err {
        rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
            MirrorgateError::Decode {
                entity: "row",
                detail: err.to_string(),
            }
        }
        other => MirrorgateError::Storage {
            source: Box::new(other),
        },
    }
}

// "UNIQUE constraint failed: sync_relations.local_message_id"
fn conflict_entity(message: &str) -> &'static str {
    if message.contains("sync_relations.") {
        "relation"
    } else if message.contains("messages.") {
        "message"
    } else if message.contains("chats.") {
        "chat"
    } else {
        "row"
    }
}
