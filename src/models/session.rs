use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::params;

use crate::db::DbPool;

pub struct Session;

impl Session {
    pub fn create(
        pool: &DbPool,
        user_id: i64,
        ip_hash: Option<&str>,
        ttl_hours: i64,
    ) -> Result<String, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let expires = now + Duration::hours(ttl_hours.max(1));

        conn.execute(
            "INSERT INTO sessions (id, user_id, created_at, expires_at, ip_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, user_id, now, expires, ip_hash],
        )
        .map_err(|e| e.to_string())?;

        Ok(session_id)
    }

    /// User id behind a live session.
    pub fn user_id(pool: &DbPool, session_id: &str, now: NaiveDateTime) -> Option<i64> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT user_id FROM sessions WHERE id = ?1 AND expires_at > ?2",
            params![session_id, now],
            |row| row.get(0),
        )
        .ok()
    }

    pub fn destroy(pool: &DbPool, session_id: &str) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn cleanup_expired(pool: &DbPool, now: NaiveDateTime) -> Result<usize, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
            .map_err(|e| e.to_string())
    }
}
