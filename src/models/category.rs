use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategoryForm {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
}

impl CategoryForm {
    pub fn resolved_slug(&self) -> String {
        self.slug
            .as_deref()
            .map(slug::slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slug::slugify(&self.name))
    }
}

impl Category {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Category {
            id: row.get("id")?,
            name: row.get("name")?,
            slug: row.get("slug")?,
            description: row.get("description")?,
        })
    }

    pub fn find_by_id(pool: &DbPool, id: i64) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM categories WHERE id = ?1",
            params![id],
            Self::from_row,
        )
        .ok()
    }

    pub fn find_by_slug(pool: &DbPool, slug: &str) -> Option<Self> {
        let conn = pool.get().ok()?;
        conn.query_row(
            "SELECT * FROM categories WHERE slug = ?1",
            params![slug],
            Self::from_row,
        )
        .ok()
    }

    pub fn list(pool: &DbPool) -> Vec<Self> {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return vec![],
        };
        let mut stmt = match conn.prepare("SELECT * FROM categories ORDER BY name") {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        stmt.query_map([], Self::from_row)
            .map(|rows| rows.filter_map(|r| r.ok()).collect())
            .unwrap_or_default()
    }

    pub fn count_posts(pool: &DbPool, category_id: i64) -> i64 {
        let conn = match pool.get() {
            Ok(c) => c,
            Err(_) => return 0,
        };
        conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE category_id = ?1",
            params![category_id],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }

    pub fn create(pool: &DbPool, form: &CategoryForm) -> Result<i64, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO categories (name, slug, description) VALUES (?1, ?2, ?3)",
            params![form.name.trim(), form.resolved_slug(), form.description],
        )
        .map_err(|e| e.to_string())?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update(pool: &DbPool, id: i64, form: &CategoryForm) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE categories SET name = ?1, slug = ?2, description = ?3 WHERE id = ?4",
            params![form.name.trim(), form.resolved_slug(), form.description, id],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Posts in the category fall back to uncategorized.
    pub fn delete(pool: &DbPool, id: i64) -> Result<(), String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.execute(
            "UPDATE posts SET category_id = NULL WHERE category_id = ?1",
            params![id],
        )
        .map_err(|e| e.to_string())?;
        conn.execute("DELETE FROM categories WHERE id = ?1", params![id])
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Delete every category with no posts. Returns the removed categories.
    pub fn delete_unused(pool: &DbPool) -> Result<Vec<Category>, String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        let tx = conn.transaction().map_err(|e| e.to_string())?;
        let removed: Vec<Category> = {
            let mut stmt = tx
                .prepare(
                    "SELECT c.* FROM categories c
                     WHERE NOT EXISTS (SELECT 1 FROM posts p WHERE p.category_id = c.id)
                     ORDER BY c.name",
                )
                .map_err(|e| e.to_string())?;
            let rows = stmt
                .query_map([], Self::from_row)
                .map_err(|e| e.to_string())?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| e.to_string())?
        };
        tx.execute(
            "DELETE FROM categories
             WHERE NOT EXISTS (SELECT 1 FROM posts p WHERE p.category_id = categories.id)",
            [],
        )
        .map_err(|e| e.to_string())?;
        tx.commit().map_err(|e| e.to_string())?;
        Ok(removed)
    }

    pub fn find_or_create(pool: &DbPool, name: &str) -> Result<Category, String> {
        let slug_str = slug::slugify(name);
        if slug_str.is_empty() {
            return Err(format!("category name '{}' has no usable characters", name));
        }
        if let Some(existing) = Self::find_by_slug(pool, &slug_str) {
            return Ok(existing);
        }
        let id = Self::create(
            pool,
            &CategoryForm {
                name: name.trim().to_string(),
                slug: Some(slug_str),
                description: None,
            },
        )?;
        Self::find_by_id(pool, id).ok_or_else(|| "category vanished after insert".to_string())
    }
}
