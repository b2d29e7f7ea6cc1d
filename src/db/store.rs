//! SQLite service registry.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("connection lock poisoned")]
    Poisoned,
    #[error("Not found")]
    NotFound,
    #[cfg(test)]
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Thread-safe registry store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000001_services.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Services ---

    /// Get every service with health checking enabled.
    pub fn get_monitored_services(&self) -> Result<Vec<MonitoredTarget>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, url FROM services WHERE check_health = 1 AND url != '' ORDER BY id ASC",
        )?;

        let targets = stmt
            .query_map([], |row| {
                Ok(MonitoredTarget {
                    id: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(targets)
    }

    /// Record the latest health status of a service.
    ///
    /// Unknown ids are reported as `NotFound`.
    pub fn update_service_health(
        &self,
        id: &str,
        status: HealthStatus,
        last_checked: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE services SET health_status = ?1, last_checked = ?2 WHERE id = ?3",
            params![
                status.as_str(),
                last_checked.format(DB_TIME_FORMAT).to_string(),
                id
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

/// Fixture helpers for tests that seed and inspect the registry.
#[cfg(test)]
impl Store {
    /// Insert or replace a service entry.
    pub fn add_service(&self, service: &Service) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO services (id, name, url, check_health) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name, url = excluded.url, check_health = excluded.check_health",
            params![service.id, service.name, service.url, service.check_health],
        )?;
        Ok(())
    }

    /// Get the recorded health state of a service.
    pub fn get_service_health(&self, id: &str) -> Result<ServiceHealthState, DbError> {
        use rusqlite::OptionalExtension;

        let conn = self.conn()?;
        let row: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT health_status, last_checked FROM services WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (status, last_checked) = row.ok_or(DbError::NotFound)?;
        Ok(ServiceHealthState {
            health_status: status.and_then(|s| s.parse().ok()),
            last_checked: last_checked.and_then(|s| parse_db_time(&s)),
        })
    }
}

/// Parse a datetime string from the database.
#[cfg(test)]
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [DB_TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
