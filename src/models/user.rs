use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

/// Closed set of account roles. Every authorization decision matches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    Editor,
    Author,
    Reader,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Moderator,
        Role::Editor,
        Role::Author,
        Role::Reader,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::Editor => "editor",
            Role::Author => "author",
            Role::Reader => "reader",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == value.trim().to_ascii_lowercase())
    }

    pub fn can_manage_users(self) -> bool {
        match self {
            Role::Admin => true,
            Role::Moderator | Role::Editor | Role::Author | Role::Reader => false,
        }
    }

    pub fn can_manage_taxonomy(self) -> bool {
        match self {
            Role::Admin | Role::Moderator | Role::Editor => true,
            Role::Author | Role::Reader => false,
        }
    }

    pub fn can_author_posts(self) -> bool {
        match self {
            Role::Admin | Role::Editor | Role::Author => true,
            Role::Moderator | Role::Reader => false,
        }
    }

    /// Publish/unpublish without editing content.
    pub fn can_moderate_posts(self) -> bool {
        match self {
            Role::Admin | Role::Moderator | Role::Editor => true,
            Role::Author | Role::Reader => false,
        }
    }

    pub fn bypasses_post_permissions(self) -> bool {
        match self {
            Role::Admin => true,
            Role::Moderator | Role::Editor | Role::Author | Role::Reader => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Role::parse(raw).ok_or_else(|| FromSqlError::Other(format!("unknown role '{}'", raw).into()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<NaiveDateTime>,
    pub reset_token: Option<String>,
    pub reset_expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub email_verified: bool,
}

/// Result of presenting a single-use token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Consumed(i64),
    Expired,
    Unknown,
}

impl User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            password_hash: row.get("password_hash")?,
            role: row.get("role")?,
            email_verified: row.get::<_, i64>("email_verified")? != 0,
            verification_token: row.get("verification_token")?,
            verification_expires_at: row.get("verification_expires_at")?,
            reset_token: row.get("reset_token")?,
            reset_expires_at: row.get("reset_expires_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    // ── Lookups ──

    pub fn get_by_id(pool: &DbPool, id: i64) -> Option<User> {
        let conn = pool.get().ok()?;
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], Self::from_row)
            .ok()
    }

    pub fn get_by_email(pool: &DbPool, email: &str) -> Option<User> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM users WHERE email = ?1 COLLATE NOCASE",
            params![email],
            Self::from_row,
        )
        .ok()
    }

    pub fn get_by_username(pool: &DbPool, username: &str) -> Option<User> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1 COLLATE NOCASE",
            params![username],
            Self::from_row,
        )
        .ok()
    }

    /// Uniqueness probe that distinguishes "absent" from "could not ask".
    pub fn email_taken(pool: &DbPool, email: &str) -> Result<bool, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1 COLLATE NOCASE",
            params![email],
            |row| row.get::<_, i64>(0),
        )
        .map(|c| c > 0)
        .map_err(|e| e.to_string())
    }

    pub fn username_taken(pool: &DbPool, username: &str) -> Result<bool, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 COLLATE NOCASE",
            params![username],
            |row| row.get::<_, i64>(0),
        )
        .map(|c| c > 0)
        .map_err(|e| e.to_string())
    }

    pub fn list_all(pool: &DbPool) -> Vec<User> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare("SELECT * FROM users ORDER BY id ASC") {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map([], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn count(pool: &DbPool) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap_or(0)
    }

    // ── Mutations ──

    pub fn create(pool: &DbPool, new: &NewUser) -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO users (username, email, password_hash, role, email_verified)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.username,
                new.email,
                new.password_hash,
                new.role,
                new.email_verified as i64
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_role(pool: &DbPool, id: i64, role: Role) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let changed = conn
            .execute(
                "UPDATE users SET role = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![role, id],
            )
            .map_err(|e| e.to_string())?;
        if changed == 0 {
            return Err(format!("user {} does not exist", id));
        }
        Ok(())
    }

    pub fn update_password(pool: &DbPool, id: i64, password_hash: &str) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![password_hash, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Posts keep existing with no author; sessions and grants cascade.
    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM users WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    // ── Single-use tokens ──

    pub fn set_verification_token(
        pool: &DbPool,
        id: i64,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE users SET verification_token = ?1, verification_expires_at = ?2 WHERE id = ?3",
            params![token, expires_at, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Mark the owner of `token` verified and null the token.
    pub fn consume_verification_token(
        pool: &DbPool,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<TokenOutcome, String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        let tx = conn.transaction().map_err(|e| e.to_string())?;

        let found: Option<(i64, Option<NaiveDateTime>)> = tx
            .query_row(
                "SELECT id, verification_expires_at FROM users WHERE verification_token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| e.to_string())?;

        let outcome = match found {
            None => TokenOutcome::Unknown,
            Some((id, expires)) => {
                let expired = expires.map_or(true, |e| e <= now);
                if expired {
                    tx.execute(
                        "UPDATE users SET verification_token = NULL, verification_expires_at = NULL WHERE id = ?1",
                        params![id],
                    )
                    .map_err(|e| e.to_string())?;
                    TokenOutcome::Expired
                } else {
                    tx.execute(
                        "UPDATE users SET email_verified = 1, verification_token = NULL,
                         verification_expires_at = NULL, updated_at = CURRENT_TIMESTAMP
                         WHERE id = ?1",
                        params![id],
                    )
                    .map_err(|e| e.to_string())?;
                    TokenOutcome::Consumed(id)
                }
            }
        };

        tx.commit().map_err(|e| e.to_string())?;
        Ok(outcome)
    }

    pub fn set_reset_token(
        pool: &DbPool,
        id: i64,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE users SET reset_token = ?1, reset_expires_at = ?2 WHERE id = ?3",
            params![token, expires_at, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Swap in `password_hash` for the owner of `token` and null the token.
    pub fn consume_reset_token(
        pool: &DbPool,
        token: &str,
        password_hash: &str,
        now: NaiveDateTime,
    ) -> Result<TokenOutcome, String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        let tx = conn.transaction().map_err(|e| e.to_string())?;

        let found: Option<(i64, Option<NaiveDateTime>)> = tx
            .query_row(
                "SELECT id, reset_expires_at FROM users WHERE reset_token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| e.to_string())?;

        let outcome = match found {
            None => TokenOutcome::Unknown,
            Some((id, expires)) => {
                let expired = expires.map_or(true, |e| e <= now);
                if !expired {
                    tx.execute(
                        "UPDATE users SET password_hash = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                        params![password_hash, id],
                    )
                    .map_err(|e| e.to_string())?;
                    // Sessions from before the reset are no longer trusted
                    tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![id])
                        .map_err(|e| e.to_string())?;
                }
                tx.execute(
                    "UPDATE users SET reset_token = NULL, reset_expires_at = NULL WHERE id = ?1",
                    params![id],
                )
                .map_err(|e| e.to_string())?;
                if expired {
                    TokenOutcome::Expired
                } else {
                    TokenOutcome::Consumed(id)
                }
            }
        };

        tx.commit().map_err(|e| e.to_string())?;
        Ok(outcome)
    }

    /// Null out tokens past their expiry. Returns how many users were touched.
    pub fn clear_expired_tokens(pool: &DbPool, now: NaiveDateTime) -> Result<usize, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        let verification = conn
            .execute(
                "UPDATE users SET verification_token = NULL, verification_expires_at = NULL
                 WHERE verification_token IS NOT NULL AND verification_expires_at <= ?1",
                params![now],
            )
            .map_err(|e| e.to_string())?;
        let reset = conn
            .execute(
                "UPDATE users SET reset_token = NULL, reset_expires_at = NULL
                 WHERE reset_token IS NOT NULL AND reset_expires_at <= ?1",
                params![now],
            )
            .map_err(|e| e.to_string())?;
        Ok(verification + reset)
    }

    // ── Helpers ──

    /// Public view without the hash or tokens.
    pub fn safe_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "username": self.username,
            "email": self.email,
            "role": self.role,
            "email_verified": self.email_verified,
            "created_at": self.created_at,
        })
    }
}
