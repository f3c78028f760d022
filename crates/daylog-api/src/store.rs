//! SQLite persistence for accounts, raw logs, and their overwrite history.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use daylog_core::util::now_utc;
use daylog_core::{BackupRecord, LogDate, LogPush, ServerLogRecord};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub password_hash: String,
}

/// Server-side log storage. Every overwrite snapshots the prior record first.
#[derive(Clone)]
pub struct ServerLogStore {
    conn: Arc<Mutex<Connection>>,
}

impl ServerLogStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        Self::from_connection(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, AppError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::internal("database connection lock poisoned"))
    }

    // ===== Users =====

    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRow, AppError> {
        let conn = self.connection()?;
        let user = UserRow {
            id: uuid::Uuid::new_v4().to_string(),
            password_hash: password_hash.to_string(),
        };
        let inserted = conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id,
                username,
                user.password_hash,
                now_utc().timestamp_millis()
            ],
        );
        match inserted {
            Ok(_) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(error, _))
                if error.code == ErrorCode::ConstraintViolation =>
            {
                Err(AppError::conflict("username is already taken"))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn find_user(&self, username: &str) -> Result<Option<UserRow>, AppError> {
        let conn = self.connection()?;
        let user = conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        password_hash: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    // ===== Raw logs =====

    pub fn get(&self, user_id: &str, date: LogDate) -> Result<Option<ServerLogRecord>, AppError> {
        let conn = self.connection()?;
        Ok(select_log(&conn, user_id, date)?)
    }

    pub fn get_all(&self, user_id: &str) -> Result<Vec<ServerLogRecord>, AppError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, date, content, content_hash, parent_hash, updated_at, version
             FROM raw_logs WHERE user_id = ?1 ORDER BY date",
        )?;
        let logs = stmt
            .query_map([user_id], log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Unconditional overwrite, backing up any prior record in the same transaction.
    pub fn put(&self, user_id: &str, push: &LogPush) -> Result<ServerLogRecord, AppError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let record = put_in(&tx, user_id, push)?;
        tx.commit()?;
        Ok(record)
    }

    /// Apply every push in one transaction; each one still goes through `put`.
    pub fn bulk_put(
        &self,
        user_id: &str,
        pushes: &[LogPush],
    ) -> Result<Vec<ServerLogRecord>, AppError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let records = pushes
            .iter()
            .map(|push| put_in(&tx, user_id, push))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;
        Ok(records)
    }

    /// Backups for one date, oldest first.
    pub fn get_backups(&self, user_id: &str, date: LogDate) -> Result<Vec<BackupRecord>, AppError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, backup_id, date, content, original_updated_at, original_version, backed_up_at
             FROM raw_log_backups
             WHERE user_id = ?1 AND backup_id LIKE ?2
             ORDER BY backup_id, id",
        )?;
        let prefix = format!("{date}#%");
        let backups = stmt
            .query_map(params![user_id, prefix], backup_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(backups)
    }
}

fn put_in(tx: &Transaction<'_>, user_id: &str, push: &LogPush) -> rusqlite::Result<ServerLogRecord> {
    let now = now_utc();
    let version = match select_log(tx, user_id, push.date)? {
        Some(prior) => {
            tx.execute(
                "INSERT INTO raw_log_backups
                    (user_id, backup_id, date, content, original_updated_at, original_version, backed_up_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user_id,
                    BackupRecord::backup_id_for(push.date, now),
                    push.date.key(),
                    prior.content,
                    prior.updated_at.timestamp_millis(),
                    prior.version,
                    now.timestamp_millis()
                ],
            )?;
            prior.version + 1
        }
        None => 1,
    };

    tx.execute(
        "INSERT INTO raw_logs (user_id, date, content, content_hash, parent_hash, updated_at, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id, date) DO UPDATE SET
            content = excluded.content,
            content_hash = excluded.content_hash,
            parent_hash = excluded.parent_hash,
            updated_at = excluded.updated_at,
            version = excluded.version",
        params![
            user_id,
            push.date.key(),
            push.content,
            push.content_hash,
            push.parent_hash,
            now.timestamp_millis(),
            version
        ],
    )?;

    Ok(ServerLogRecord {
        user_id: user_id.to_string(),
        date: push.date,
        content: push.content.clone(),
        content_hash: push.content_hash.clone(),
        parent_hash: push.parent_hash.clone(),
        updated_at: now,
        version,
    })
}

fn select_log(
    conn: &Connection,
    user_id: &str,
    date: LogDate,
) -> rusqlite::Result<Option<ServerLogRecord>> {
    conn.query_row(
        "SELECT user_id, date, content, content_hash, parent_hash, updated_at, version
         FROM raw_logs WHERE user_id = ?1 AND date = ?2",
        params![user_id, date.key()],
        log_from_row,
    )
    .optional()
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<ServerLogRecord> {
    Ok(ServerLogRecord {
        user_id: row.get(0)?,
        date: date_column(row, 1)?,
        content: row.get(2)?,
        content_hash: row.get(3)?,
        parent_hash: row.get(4)?,
        updated_at: millis_column(row, 5)?,
        version: row.get(6)?,
    })
}

fn backup_from_row(row: &Row<'_>) -> rusqlite::Result<BackupRecord> {
    Ok(BackupRecord {
        user_id: row.get(0)?,
        backup_id: row.get(1)?,
        date: date_column(row, 2)?,
        content: row.get(3)?,
        original_updated_at: millis_column(row, 4)?,
        original_version: row.get(5)?,
        backed_up_at: millis_column(row, 6)?,
    })
}

fn date_column(row: &Row<'_>, index: usize) -> rusqlite::Result<LogDate> {
    let raw: String = row.get(index)?;
    raw.parse()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

fn millis_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(index)?;
    DateTime::from_timestamp_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(index, millis))
}

fn migrate(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);",
    )?;
    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if version < 1 {
        let tx = conn.transaction()?;
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS raw_logs (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                parent_hash TEXT,
                updated_at INTEGER NOT NULL,
                version INTEGER NOT NULL,
                PRIMARY KEY (user_id, date)
            );

            CREATE TABLE IF NOT EXISTS raw_log_backups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                backup_id TEXT NOT NULL,
                date TEXT NOT NULL,
                content TEXT NOT NULL,
                original_updated_at INTEGER NOT NULL,
                original_version INTEGER NOT NULL,
                backed_up_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_raw_log_backups_user_backup
                ON raw_log_backups(user_id, backup_id);

            INSERT INTO schema_version (version) VALUES (1);",
        )?;
        tx.commit()?;
        tracing::info!("Migrated server store to version 1");
    }

    Ok(())
}
