use chrono::NaiveDateTime;

use crate::db::DbPool;
use crate::models::category::{Category, CategoryForm};
use crate::models::permission::{PermissionSet, PostPermission};
use crate::models::post::{Post, PostStatus, PostWrite};
use crate::models::session::Session;
use crate::models::tag::{Tag, TagForm};
use crate::models::user::{NewUser, Role, TokenOutcome, User};
use crate::models::view::PostView;

use super::Store;

/// SQLite-backed implementation of the Store trait.
/// Wraps the r2d2 connection pool and delegates to model methods.
pub struct SqliteStore {
    pub pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn new_at(path: &str, max_connections: u32) -> Result<Self, String> {
        let pool = crate::db::init_pool_at(path, max_connections)?;
        Ok(Self { pool })
    }
}

impl Store for SqliteStore {
    // ── Lifecycle ───────────────────────────────────────────────────

    fn run_migrations(&self) -> Result<(), String> {
        crate::db::run_migrations(&self.pool).map_err(|e| e.to_string())
    }

    // ── Users ───────────────────────────────────────────────────────

    fn user_get_by_id(&self, id: i64) -> Option<User> {
        User::get_by_id(&self.pool, id)
    }

    fn user_get_by_email(&self, email: &str) -> Option<User> {
        User::get_by_email(&self.pool, email)
    }

    fn user_get_by_username(&self, username: &str) -> Option<User> {
        User::get_by_username(&self.pool, username)
    }

    fn user_email_taken(&self, email: &str) -> Result<bool, String> {
        User::email_taken(&self.pool, email)
    }

    fn user_username_taken(&self, username: &str) -> Result<bool, String> {
        User::username_taken(&self.pool, username)
    }

    fn user_list_all(&self) -> Vec<User> {
        User::list_all(&self.pool)
    }

    fn user_count(&self) -> i64 {
        User::count(&self.pool)
    }

    fn user_create(&self, new: &NewUser) -> Result<i64, String> {
        User::create(&self.pool, new)
    }

    fn user_update_role(&self, id: i64, role: Role) -> Result<(), String> {
        User::update_role(&self.pool, id, role)
    }

    fn user_update_password(&self, id: i64, password_hash: &str) -> Result<(), String> {
        User::update_password(&self.pool, id, password_hash)
    }

    fn user_delete(&self, id: i64) -> Result<(), String> {
        User::delete(&self.pool, id)
    }

    fn user_set_verification_token(
        &self,
        id: i64,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<(), String> {
        User::set_verification_token(&self.pool, id, token, expires_at)
    }

    fn user_consume_verification_token(
        &self,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<TokenOutcome, String> {
        User::consume_verification_token(&self.pool, token, now)
    }

    fn user_set_reset_token(
        &self,
        id: i64,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<(), String> {
        User::set_reset_token(&self.pool, id, token, expires_at)
    }

    fn user_consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: NaiveDateTime,
    ) -> Result<TokenOutcome, String> {
        User::consume_reset_token(&self.pool, token, password_hash, now)
    }

    fn user_clear_expired_tokens(&self, now: NaiveDateTime) -> Result<usize, String> {
        User::clear_expired_tokens(&self.pool, now)
    }

    // ── Sessions ────────────────────────────────────────────────────

    fn session_create(
        &self,
        user_id: i64,
        ip_hash: Option<&str>,
        ttl_hours: i64,
    ) -> Result<String, String> {
        Session::create(&self.pool, user_id, ip_hash, ttl_hours)
    }

    fn session_user_id(&self, session_id: &str, now: NaiveDateTime) -> Option<i64> {
        Session::user_id(&self.pool, session_id, now)
    }

    fn session_destroy(&self, session_id: &str) -> Result<(), String> {
        Session::destroy(&self.pool, session_id)
    }

    fn session_cleanup_expired(&self, now: NaiveDateTime) -> Result<usize, String> {
        Session::cleanup_expired(&self.pool, now)
    }

    // ── Posts ────────────────────────────────────────────────────────

    fn post_find_by_id(&self, id: i64) -> Option<Post> {
        Post::find_by_id(&self.pool, id)
    }

    fn post_find_by_slug(&self, slug: &str) -> Option<Post> {
        Post::find_by_slug(&self.pool, slug)
    }

    fn post_list(&self, status: Option<PostStatus>, limit: i64, offset: i64) -> Vec<Post> {
        Post::list(&self.pool, status, limit, offset)
    }

    fn post_count(&self, status: Option<PostStatus>) -> i64 {
        Post::count(&self.pool, status)
    }

    fn post_by_category(&self, category_id: i64, limit: i64, offset: i64) -> Vec<Post> {
        Post::published_by_category(&self.pool, category_id, limit, offset)
    }

    fn post_count_by_category(&self, category_id: i64) -> i64 {
        Post::count_published_by_category(&self.pool, category_id)
    }

    fn post_by_tag(&self, tag_id: i64, limit: i64, offset: i64) -> Vec<Post> {
        Post::published_by_tag(&self.pool, tag_id, limit, offset)
    }

    fn post_count_by_tag(&self, tag_id: i64) -> i64 {
        Post::count_published_by_tag(&self.pool, tag_id)
    }

    fn post_create(&self, write: &PostWrite) -> Result<i64, String> {
        Post::create(&self.pool, write)
    }

    fn post_update(&self, id: i64, write: &PostWrite) -> Result<(), String> {
        Post::update(&self.pool, id, write)
    }

    fn post_update_status(&self, id: i64, status: PostStatus) -> Result<(), String> {
        Post::update_status(&self.pool, id, status)
    }

    fn post_set_compiled(&self, id: i64, compiled: &str) -> Result<(), String> {
        Post::set_compiled(&self.pool, id, compiled)
    }

    fn post_delete(&self, id: i64) -> Result<(), String> {
        Post::delete(&self.pool, id)
    }

    fn post_record_view(
        &self,
        post_id: i64,
        viewer_ip_hash: &str,
        dedupe_window_secs: u64,
    ) -> Result<bool, String> {
        PostView::record(&self.pool, post_id, viewer_ip_hash, dedupe_window_secs)
    }

    // ── Permissions ─────────────────────────────────────────────────

    fn permission_get(&self, post_id: i64) -> PermissionSet {
        PostPermission::set_for_post(&self.pool, post_id)
    }

    fn permission_replace(&self, post_id: i64, set: &PermissionSet) -> Result<(), String> {
        PostPermission::replace_for_post(&self.pool, post_id, set)
    }

    fn permission_allows(&self, post_id: i64, user_id: i64, role: Role) -> bool {
        PostPermission::allows(&self.pool, post_id, user_id, role)
    }

    // ── Tags ────────────────────────────────────────────────────────

    fn tag_find_by_id(&self, id: i64) -> Option<Tag> {
        Tag::find_by_id(&self.pool, id)
    }

    fn tag_find_by_slug(&self, slug: &str) -> Option<Tag> {
        Tag::find_by_slug(&self.pool, slug)
    }

    fn tag_list(&self) -> Vec<Tag> {
        Tag::list(&self.pool)
    }

    fn tag_for_post(&self, post_id: i64) -> Vec<Tag> {
        Tag::for_post(&self.pool, post_id)
    }

    fn tag_count_posts(&self, tag_id: i64) -> i64 {
        Tag::count_posts(&self.pool, tag_id)
    }

    fn tag_create(&self, form: &TagForm) -> Result<i64, String> {
        Tag::create(&self.pool, form)
    }

    fn tag_update(&self, id: i64, form: &TagForm) -> Result<(), String> {
        Tag::update(&self.pool, id, form)
    }

    fn tag_delete(&self, id: i64) -> Result<(), String> {
        Tag::delete(&self.pool, id)
    }

    fn tag_delete_unused(&self) -> Result<Vec<Tag>, String> {
        Tag::delete_unused(&self.pool)
    }

    fn tag_set_for_post(&self, post_id: i64, tag_ids: &[i64]) -> Result<(), String> {
        Tag::set_for_post(&self.pool, post_id, tag_ids)
    }

    fn tag_find_or_create(&self, name: &str) -> Result<Tag, String> {
        Tag::find_or_create(&self.pool, name)
    }

    // ── Categories ──────────────────────────────────────────────────

    fn category_find_by_id(&self, id: i64) -> Option<Category> {
        Category::find_by_id(&self.pool, id)
    }

    fn category_find_by_slug(&self, slug: &str) -> Option<Category> {
        Category::find_by_slug(&self.pool, slug)
    }

    fn category_list(&self) -> Vec<Category> {
        Category::list(&self.pool)
    }

    fn category_count_posts(&self, category_id: i64) -> i64 {
        Category::count_posts(&self.pool, category_id)
    }

    fn category_create(&self, form: &CategoryForm) -> Result<i64, String> {
        Category::create(&self.pool, form)
    }

    fn category_update(&self, id: i64, form: &CategoryForm) -> Result<(), String> {
        Category::update(&self.pool, id, form)
    }

    fn category_delete(&self, id: i64) -> Result<(), String> {
        Category::delete(&self.pool, id)
    }

    fn category_delete_unused(&self) -> Result<Vec<Category>, String> {
        Category::delete_unused(&self.pool)
    }

    fn category_find_or_create(&self, name: &str) -> Result<Category, String> {
        Category::find_or_create(&self.pool, name)
    }
}
