use chrono::NaiveDateTime;

use crate::models::category::{Category, CategoryForm};
use crate::models::permission::PermissionSet;
use crate::models::post::{Post, PostStatus, PostWrite};
use crate::models::tag::{Tag, TagForm};
use crate::models::user::{NewUser, Role, TokenOutcome, User};

pub mod sqlite;

/// Unified data-access trait. Every database operation goes through here.
/// Implementation: `SqliteStore` (wraps rusqlite/r2d2).
pub trait Store: Send + Sync {
    // ── Lifecycle ───────────────────────────────────────────────────
    fn run_migrations(&self) -> Result<(), String>;

    // ── Users ───────────────────────────────────────────────────────
    fn user_get_by_id(&self, id: i64) -> Option<User>;
    fn user_get_by_email(&self, email: &str) -> Option<User>;
    fn user_get_by_username(&self, username: &str) -> Option<User>;
    fn user_email_taken(&self, email: &str) -> Result<bool, String>;
    fn user_username_taken(&self, username: &str) -> Result<bool, String>;
    fn user_list_all(&self) -> Vec<User>;
    fn user_count(&self) -> i64;
    fn user_create(&self, new: &NewUser) -> Result<i64, String>;
    fn user_update_role(&self, id: i64, role: Role) -> Result<(), String>;
    fn user_update_password(&self, id: i64, password_hash: &str) -> Result<(), String>;
    fn user_delete(&self, id: i64) -> Result<(), String>;
    fn user_set_verification_token(
        &self,
        id: i64,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<(), String>;
    fn user_consume_verification_token(
        &self,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<TokenOutcome, String>;
    fn user_set_reset_token(
        &self,
        id: i64,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<(), String>;
    fn user_consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: NaiveDateTime,
    ) -> Result<TokenOutcome, String>;
    fn user_clear_expired_tokens(&self, now: NaiveDateTime) -> Result<usize, String>;

    // ── Sessions ────────────────────────────────────────────────────
    fn session_create(
        &self,
        user_id: i64,
        ip_hash: Option<&str>,
        ttl_hours: i64,
    ) -> Result<String, String>;
    fn session_user_id(&self, session_id: &str, now: NaiveDateTime) -> Option<i64>;
    fn session_destroy(&self, session_id: &str) -> Result<(), String>;
    fn session_cleanup_expired(&self, now: NaiveDateTime) -> Result<usize, String>;

    // ── Posts ────────────────────────────────────────────────────────
    fn post_find_by_id(&self, id: i64) -> Option<Post>;
    fn post_find_by_slug(&self, slug: &str) -> Option<Post>;
    fn post_list(&self, status: Option<PostStatus>, limit: i64, offset: i64) -> Vec<Post>;
    fn post_count(&self, status: Option<PostStatus>) -> i64;
    fn post_published(&self, limit: i64, offset: i64) -> Vec<Post> {
        self.post_list(Some(PostStatus::Published), limit, offset)
    }
    fn post_by_category(&self, category_id: i64, limit: i64, offset: i64) -> Vec<Post>;
    fn post_count_by_category(&self, category_id: i64) -> i64;
    fn post_by_tag(&self, tag_id: i64, limit: i64, offset: i64) -> Vec<Post>;
    fn post_count_by_tag(&self, tag_id: i64) -> i64;
    fn post_create(&self, write: &PostWrite) -> Result<i64, String>;
    fn post_update(&self, id: i64, write: &PostWrite) -> Result<(), String>;
    fn post_update_status(&self, id: i64, status: PostStatus) -> Result<(), String>;
    fn post_set_compiled(&self, id: i64, compiled: &str) -> Result<(), String>;
    fn post_delete(&self, id: i64) -> Result<(), String>;
    /// +1 view unless deduped inside `dedupe_window_secs`. Returns whether it counted.
    fn post_record_view(
        &self,
        post_id: i64,
        viewer_ip_hash: &str,
        dedupe_window_secs: u64,
    ) -> Result<bool, String>;

    // ── Permissions ─────────────────────────────────────────────────
    fn permission_get(&self, post_id: i64) -> PermissionSet;
    fn permission_replace(&self, post_id: i64, set: &PermissionSet) -> Result<(), String>;
    fn permission_allows(&self, post_id: i64, user_id: i64, role: Role) -> bool;

    // ── Tags ────────────────────────────────────────────────────────
    fn tag_find_by_id(&self, id: i64) -> Option<Tag>;
    fn tag_find_by_slug(&self, slug: &str) -> Option<Tag>;
    fn tag_list(&self) -> Vec<Tag>;
    fn tag_for_post(&self, post_id: i64) -> Vec<Tag>;
    fn tag_count_posts(&self, tag_id: i64) -> i64;
    fn tag_create(&self, form: &TagForm) -> Result<i64, String>;
    fn tag_update(&self, id: i64, form: &TagForm) -> Result<(), String>;
    fn tag_delete(&self, id: i64) -> Result<(), String>;
    fn tag_delete_unused(&self) -> Result<Vec<Tag>, String>;
    fn tag_set_for_post(&self, post_id: i64, tag_ids: &[i64]) -> Result<(), String>;
    fn tag_find_or_create(&self, name: &str) -> Result<Tag, String>;

    // ── Categories ──────────────────────────────────────────────────
    fn category_find_by_id(&self, id: i64) -> Option<Category>;
    fn category_find_by_slug(&self, slug: &str) -> Option<Category>;
    fn category_list(&self) -> Vec<Category>;
    fn category_count_posts(&self, category_id: i64) -> i64;
    fn category_create(&self, form: &CategoryForm) -> Result<i64, String>;
    fn category_update(&self, id: i64, form: &CategoryForm) -> Result<(), String>;
    fn category_delete(&self, id: i64) -> Result<(), String>;
    fn category_delete_unused(&self) -> Result<Vec<Category>, String>;
    fn category_find_or_create(&self, name: &str) -> Result<Category, String>;
}
