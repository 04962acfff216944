use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::models::user::Role;

/// One grant row: exactly one of `user_id` or `role` is set.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PostPermission {
    pub id: i64,
    pub post_id: i64,
    pub user_id: Option<i64>,
    pub role: Option<Role>,
}

/// The full grant set of a post, as read and written by the admin API.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PermissionSet {
    #[serde(default)]
    pub users: Vec<i64>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl PermissionSet {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.roles.is_empty()
    }
}

impl PostPermission {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PostPermission {
            id: row.get("id")?,
            post_id: row.get("post_id")?,
            user_id: row.get("user_id")?,
            role: row.get("role")?,
        })
    }

    pub fn for_post(pool: &DbPool, post_id: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn
            .prepare("SELECT * FROM post_permissions WHERE post_id = ?1 ORDER BY id")
        {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![post_id], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn set_for_post(pool: &DbPool, post_id: i64) -> PermissionSet {
        let mut set = PermissionSet::default();
        for grant in Self::for_post(pool, post_id) {
            if let Some(uid) = grant.user_id {
                set.users.push(uid);
            }
            if let Some(role) = grant.role {
                set.roles.push(role);
            }
        }
        set
    }

    /// Replace-all-on-write: every existing grant for the post is removed and
    /// `set` inserted, in one transaction. Duplicates collapse.
    pub fn replace_for_post(pool: &DbPool, post_id: i64, set: &PermissionSet) -> Result<(), String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        let tx = conn.transaction().map_err(|e| e.to_string())?;

        tx.execute(
            "DELETE FROM post_permissions WHERE post_id = ?1",
            params![post_id],
        )
        .map_err(|e| e.to_string())?;

        let mut users = set.users.clone();
        users.sort_unstable();
        users.dedup();
        for user_id in users {
            tx.execute(
                "INSERT INTO post_permissions (post_id, user_id) VALUES (?1, ?2)",
                params![post_id, user_id],
            )
            .map_err(|e| e.to_string())?;
        }

        let mut roles: Vec<Role> = Vec::new();
        for role in &set.roles {
            if !roles.contains(role) {
                roles.push(*role);
            }
        }
        for role in roles {
            tx.execute(
                "INSERT INTO post_permissions (post_id, role) VALUES (?1, ?2)",
                params![post_id, role],
            )
            .map_err(|e| e.to_string())?;
        }

        tx.commit().map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Whether a grant names the user or their role. Posts with no grants
    /// are open to every author-capable role.
    pub fn allows(pool: &DbPool, post_id: i64, user_id: i64, role: Role) -> bool {
        let grants = Self::for_post(pool, post_id);
        grants.is_empty()
            || grants
                .iter()
                .any(|g| g.user_id == Some(user_id) || g.role == Some(role))
    }
}
