use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::mdx::CompiledMdx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PostStatus::Draft),
            "published" => Some(PostStatus::Published),
            _ => None,
        }
    }
}

impl ToSql for PostStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PostStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        PostStatus::parse(raw)
            .ok_or_else(|| FromSqlError::Other(format!("unknown post status '{}'", raw).into()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Post {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub content: String,
    /// JSON-serialized `CompiledMdx`
    #[serde(skip_serializing)]
    pub compiled: Option<String>,
    pub excerpt: Option<String>,
    pub status: PostStatus,
    pub featured_image_url: Option<String>,
    pub views: i64,
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Incoming author payload for create/update.
#[derive(Debug, Deserialize, Clone)]
pub struct PostForm {
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub status: Option<PostStatus>,
    pub featured_image_url: Option<String>,
    /// Category name; created on demand
    pub category: Option<String>,
    /// Tag names; created on demand
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Resolved row values written by create/update.
#[derive(Debug, Clone)]
pub struct PostWrite<'a> {
    pub slug: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub compiled: &'a str,
    pub excerpt: Option<&'a str>,
    pub status: PostStatus,
    pub featured_image_url: Option<&'a str>,
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,
}

impl Post {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Post {
            id: row.get("id")?,
            slug: row.get("slug")?,
            title: row.get("title")?,
            content: row.get("content")?,
            compiled: row.get("compiled")?,
            excerpt: row.get("excerpt")?,
            status: row.get("status")?,
            featured_image_url: row.get("featured_image_url")?,
            views: row.get("views")?,
            author_id: row.get("author_id")?,
            category_id: row.get("category_id")?,
            published_at: row.get("published_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }

    pub fn compiled_artifact(&self) -> Option<CompiledMdx> {
        self.compiled.as_deref().and_then(CompiledMdx::from_json)
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row("SELECT * FROM posts WHERE id = ?1", params![id], Self::from_row)
            .ok()
    }

    pub fn find_by_slug(pool: &DbPool, slug: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM posts WHERE slug = ?1",
            params![slug],
            Self::from_row,
        )
        .ok()
    }

    pub fn list(pool: &DbPool, status: Option<PostStatus>, limit: i64, offset: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };

        let (sql, params_vec): (&str, Vec<Box<dyn ToSql>>) = match status {
            Some(s) => (
                "SELECT * FROM posts WHERE status = ?1
                 ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ?2 OFFSET ?3",
                vec![Box::new(s), Box::new(limit), Box::new(offset)],
            ),
            None => (
                "SELECT * FROM posts
                 ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ?1 OFFSET ?2",
                vec![Box::new(limit), Box::new(offset)],
            ),
        };

        let mut stmt = match conn.prepare(sql) {
            Ok(s) => s,
            Err(_) => return vec![],
        };

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        stmt.query_map(params_refs.as_slice(), Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn published(pool: &DbPool, limit: i64, offset: i64) -> Vec<Self> {
        Self::list(pool, Some(PostStatus::Published), limit, offset)
    }

    pub fn count(pool: &DbPool, status: Option<PostStatus>) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        match status {
            Some(s) => conn
                .query_row(
                    "SELECT COUNT(*) FROM posts WHERE status = ?1",
                    params![s],
                    |row| row.get(0),
                )
                .unwrap_or(0),
            None => conn
                .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
                .unwrap_or(0),
        }
    }

    pub fn published_by_category(
        pool: &DbPool,
        category_id: i64,
        limit: i64,
        offset: i64,
    ) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT * FROM posts WHERE category_id = ?1 AND status = 'published'
             ORDER BY published_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![category_id, limit, offset], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn count_published_by_category(pool: &DbPool, category_id: i64) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE category_id = ?1 AND status = 'published'",
            params![category_id],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn published_by_tag(pool: &DbPool, tag_id: i64, limit: i64, offset: i64) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare(
            "SELECT p.* FROM posts p
             JOIN post_tags pt ON pt.post_id = p.id
             WHERE pt.tag_id = ?1 AND p.status = 'published'
             ORDER BY p.published_at DESC, p.id DESC LIMIT ?2 OFFSET ?3",
        ) {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map(params![tag_id, limit, offset], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn count_published_by_tag(pool: &DbPool, tag_id: i64) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM posts p
             JOIN post_tags pt ON pt.post_id = p.id
             WHERE pt.tag_id = ?1 AND p.status = 'published'",
            params![tag_id],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn create(pool: &DbPool, w: &PostWrite) -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO posts (slug, title, content, compiled, excerpt, status,
                featured_image_url, author_id, category_id, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                CASE WHEN ?6 = 'published' THEN CURRENT_TIMESTAMP ELSE NULL END)",
            params![
                w.slug,
                w.title,
                w.content,
                w.compiled,
                w.excerpt,
                w.status,
                w.featured_image_url,
                w.author_id,
                w.category_id,
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    /// Author is not rewritten; `published_at` is set on first publish only.
    pub fn update(pool: &DbPool, id: i64, w: &PostWrite) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE posts SET slug = ?1, title = ?2, content = ?3, compiled = ?4, excerpt = ?5,
                status = ?6, featured_image_url = ?7, category_id = ?8,
                published_at = CASE
                    WHEN ?6 = 'published' THEN COALESCE(published_at, CURRENT_TIMESTAMP)
                    ELSE published_at END,
                updated_at = CURRENT_TIMESTAMP
             WHERE id = ?9",
            params![
                w.slug,
                w.title,
                w.content,
                w.compiled,
                w.excerpt,
                w.status,
                w.featured_image_url,
                w.category_id,
                id,
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn update_status(pool: &DbPool, id: i64, status: PostStatus) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE posts SET status = ?1,
                published_at = CASE
                    WHEN ?1 = 'published' THEN COALESCE(published_at, CURRENT_TIMESTAMP)
                    ELSE published_at END,
                updated_at = CURRENT_TIMESTAMP
             WHERE id = ?2",
            params![status, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Store a freshly compiled artifact without touching `updated_at`.
    pub fn set_compiled(pool: &DbPool, id: i64, compiled: &str) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE posts SET compiled = ?1 WHERE id = ?2",
            params![compiled, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Tags, grants and views cascade.
    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM posts WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
