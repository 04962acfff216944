use chrono::{Duration, Utc};
use rusqlite::params;

use crate::db::DbPool;

pub struct PostView;

impl PostView {
    /// Append a view row and bump `posts.views` by one, atomically.
    ///
    /// With a non-zero `dedupe_window_secs`, a repeat view from the same IP
    /// hash inside the window records nothing. Returns whether it counted.
    pub fn record(
        pool: &DbPool,
        post_id: i64,
        viewer_ip_hash: &str,
        dedupe_window_secs: u64,
    ) -> Result<bool, String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        let tx = conn.transaction().map_err(|e| e.to_string())?;
        let now = Utc::now().naive_utc();

        if dedupe_window_secs > 0 {
            let since = now - Duration::seconds(dedupe_window_secs as i64);
            let recent: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM post_views
                     WHERE post_id = ?1 AND viewer_ip_hash = ?2 AND created_at > ?3",
                    params![post_id, viewer_ip_hash, since],
                    |row| row.get(0),
                )
                .map_err(|e| e.to_string())?;
            if recent > 0 {
                return Ok(false);
            }
        }

        let changed = tx
            .execute(
                "UPDATE posts SET views = views + 1 WHERE id = ?1",
                params![post_id],
            )
            .map_err(|e| e.to_string())?;
        if changed == 0 {
            return Err(format!("post {} does not exist", post_id));
        }
        tx.execute(
            "INSERT INTO post_views (post_id, viewer_ip_hash, created_at) VALUES (?1, ?2, ?3)",
            params![post_id, viewer_ip_hash, now],
        )
        .map_err(|e| e.to_string())?;

        tx.commit().map_err(|e| e.to_string())?;
        Ok(true)
    }
}
