#![cfg(test)]

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rocket::http::{ContentType, Header, Method, Status};
use rocket::local::blocking::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::config::AppConfig;
use crate::db::{run_migrations, DbPool};
use crate::email::{Mailer, OutgoingEmail};
use crate::models::category::CategoryForm;
use crate::models::permission::PermissionSet;
use crate::models::post::{PostStatus, PostWrite};
use crate::models::tag::TagForm;
use crate::models::user::{NewUser, Role, TokenOutcome};
use crate::security::auth;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

/// Atomic counter for unique shared-cache DB names so parallel tests don't collide.
static TEST_DB_COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

const PASSWORD: &str = "correct-horse";

/// Fresh in-memory SQLite pool with all migrations applied. Uses a named
/// shared-cache DB so every pooled connection sees the same data.
fn test_pool() -> DbPool {
    let id = TEST_DB_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let uri = format!("file:testdb_{}?mode=memory&cache=shared", id);
    let manager = SqliteConnectionManager::file(uri)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .expect("Failed to create test pool");
    run_migrations(&pool).expect("Failed to run migrations");
    pool
}

fn test_store() -> SqliteStore {
    SqliteStore::new(test_pool())
}

fn seed_user(store: &dyn Store, username: &str, role: Role, verified: bool) -> i64 {
    let hash = auth::hash_password(PASSWORD).unwrap();
    let email = format!("{}@example.com", username);
    store
        .user_create(&NewUser {
            username,
            email: &email,
            password_hash: &hash,
            role,
            email_verified: verified,
        })
        .unwrap()
}

fn seed_post(store: &dyn Store, slug: &str, status: PostStatus) -> i64 {
    store
        .post_create(&PostWrite {
            slug,
            title: slug,
            content: "body",
            compiled: "",
            excerpt: None,
            status,
            featured_image_url: None,
            author_id: None,
            category_id: None,
        })
        .unwrap()
}

// ── HTTP harness ──

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[rocket::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), String> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

impl RecordingMailer {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Token from the `?token=` link of the most recent message.
    fn last_token(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let body = &sent.last().expect("no email sent").body;
        let start = body.find("token=").expect("no token link") + "token=".len();
        body[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect()
    }
}

struct TestApp {
    client: Client,
    store: Arc<dyn Store>,
    mailer: Arc<RecordingMailer>,
}

fn config_with(vars: &[(&str, &str)]) -> AppConfig {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_lookup(move |key| map.get(key).cloned())
}

fn app_with(config: AppConfig) -> TestApp {
    let store: Arc<dyn Store> = Arc::new(test_store());
    let mailer = Arc::new(RecordingMailer::default());
    let rocket = crate::build_rocket(config, store.clone(), mailer.clone());
    let client = Client::tracked(rocket).expect("valid rocket instance");
    TestApp {
        client,
        store,
        mailer,
    }
}

fn app() -> TestApp {
    app_with(config_with(&[]))
}

fn call(client: &Client, method: Method, uri: &str, body: Option<Value>) -> (Status, Value) {
    let mut request = client.req(method, uri.to_string()).header(ContentType::JSON);
    if let Some(body) = body {
        request = request.body(body.to_string());
    }
    let response = request.dispatch();
    let status = response.status();
    (status, response.into_json::<Value>().unwrap_or(Value::Null))
}

fn sign_in(app: &TestApp, username: &str, role: Role) -> i64 {
    let id = seed_user(&*app.store, username, role, true);
    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/login",
        Some(json!({"email": format!("{}@example.com", username), "password": PASSWORD})),
    );
    assert_eq!(status, Status::Ok);
    id
}

fn get_html(client: &Client, uri: &str, ip: &str) -> (Status, String) {
    let response = client
        .get(uri.to_string())
        .header(Header::new("X-Real-IP", ip.to_string()))
        .dispatch();
    let status = response.status();
    (status, response.into_string().unwrap_or_default())
}

fn create_published(app: &TestApp, title: &str, content: &str, tags: &[&str]) -> Value {
    let (status, body) = call(
        &app.client,
        Method::Post,
        "/api/posts",
        Some(json!({
            "title": title,
            "content": content,
            "status": "published",
            "tags": tags,
        })),
    );
    assert_eq!(status, Status::Ok, "{}", body);
    body
}

// ═══════════════════════════════════════════════════════════
// Users & tokens
// ═══════════════════════════════════════════════════════════

#[test]
fn user_uniqueness_checks() {
    let store = test_store();
    seed_user(&store, "ann", Role::Reader, false);
    assert!(store.user_email_taken("ann@example.com").unwrap());
    assert!(store.user_email_taken("ANN@example.com").unwrap());
    assert!(store.user_username_taken("ann").unwrap());
    assert!(!store.user_username_taken("bob").unwrap());
}

#[test]
fn verification_token_is_single_use() {
    let store = test_store();
    let id = seed_user(&store, "ann", Role::Reader, false);
    let now = Utc::now().naive_utc();
    store
        .user_set_verification_token(id, "tok", now + Duration::hours(1))
        .unwrap();

    assert_eq!(
        store.user_consume_verification_token("tok", now).unwrap(),
        TokenOutcome::Consumed(id)
    );
    assert!(store.user_get_by_id(id).unwrap().email_verified);
    assert_eq!(
        store.user_consume_verification_token("tok", now).unwrap(),
        TokenOutcome::Unknown
    );
}

#[test]
fn expired_reset_token_is_rejected() {
    let store = test_store();
    let id = seed_user(&store, "ann", Role::Reader, true);
    let now = Utc::now().naive_utc();
    store
        .user_set_reset_token(id, "reset", now - Duration::minutes(1))
        .unwrap();
    assert_eq!(
        store.user_consume_reset_token("reset", "newhash", now).unwrap(),
        TokenOutcome::Expired
    );
    assert_ne!(store.user_get_by_id(id).unwrap().password_hash, "newhash");
}

#[test]
fn sessions_expire_and_clean_up() {
    let store = test_store();
    let id = seed_user(&store, "ann", Role::Reader, true);
    let sid = store.session_create(id, Some("iphash"), 1).unwrap();
    let now = Utc::now().naive_utc();

    assert_eq!(store.session_user_id(&sid, now), Some(id));
    assert_eq!(store.session_user_id(&sid, now + Duration::hours(2)), None);
    assert_eq!(
        store.session_cleanup_expired(now + Duration::hours(2)).unwrap(),
        1
    );
}

// ═══════════════════════════════════════════════════════════
// Taxonomy garbage collection
// ═══════════════════════════════════════════════════════════

#[test]
fn delete_unused_tags_keeps_tags_in_use() {
    let store = test_store();
    let post = seed_post(&store, "p", PostStatus::Draft);
    let used = store.tag_find_or_create("Rust").unwrap();
    store.tag_find_or_create("Orphan").unwrap();
    store.tag_set_for_post(post, &[used.id]).unwrap();

    let removed = store.tag_delete_unused().unwrap();
    let slugs: Vec<&str> = removed.iter().map(|t| t.slug.as_str()).collect();
    assert_eq!(slugs, vec!["orphan"]);
    assert!(store.tag_find_by_slug("rust").is_some());
    assert!(store.tag_delete_unused().unwrap().is_empty());
}

#[test]
fn delete_unused_categories_keeps_categories_in_use() {
    let store = test_store();
    let used = store.category_find_or_create("Guides").unwrap();
    store
        .category_create(&CategoryForm {
            name: "Empty".into(),
            slug: None,
            description: None,
        })
        .unwrap();
    store
        .post_create(&PostWrite {
            slug: "p",
            title: "P",
            content: "",
            compiled: "",
            excerpt: None,
            status: PostStatus::Draft,
            featured_image_url: None,
            author_id: None,
            category_id: Some(used.id),
        })
        .unwrap();

    let removed = store.category_delete_unused().unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].slug, "empty");
    assert!(store.category_find_by_slug("guides").is_some());
}

#[test]
fn tag_slug_derives_from_name() {
    let store = test_store();
    let id = store
        .tag_create(&TagForm {
            name: "Web Assembly".into(),
            slug: None,
            description: None,
        })
        .unwrap();
    assert_eq!(store.tag_find_by_id(id).unwrap().slug, "web-assembly");
}

// ═══════════════════════════════════════════════════════════
// Permissions
// ═══════════════════════════════════════════════════════════

#[test]
fn permission_replace_supersedes_previous_set() {
    let store = test_store();
    let post = seed_post(&store, "p", PostStatus::Draft);
    let ann = seed_user(&store, "ann", Role::Author, true);
    let bob = seed_user(&store, "bob", Role::Author, true);

    store
        .permission_replace(
            post,
            &PermissionSet {
                users: vec![ann],
                roles: vec![Role::Editor],
            },
        )
        .unwrap();
    store
        .permission_replace(
            post,
            &PermissionSet {
                users: vec![bob, bob],
                roles: vec![],
            },
        )
        .unwrap();

    let set = store.permission_get(post);
    assert_eq!(set.users, vec![bob]);
    assert!(set.roles.is_empty());
    assert!(store.permission_allows(post, bob, Role::Author));
    assert!(!store.permission_allows(post, ann, Role::Author));
    assert!(!store.permission_allows(post, 999, Role::Editor));
}

#[test]
fn post_without_grants_is_open() {
    let store = test_store();
    let post = seed_post(&store, "p", PostStatus::Draft);
    assert!(store.permission_allows(post, 1, Role::Author));
}

// ═══════════════════════════════════════════════════════════
// Posts & views
// ═══════════════════════════════════════════════════════════

#[test]
fn publishing_sets_published_at_once() {
    let store = test_store();
    let id = seed_post(&store, "p", PostStatus::Draft);
    assert!(store.post_find_by_id(id).unwrap().published_at.is_none());

    store.post_update_status(id, PostStatus::Published).unwrap();
    let first = store.post_find_by_id(id).unwrap().published_at;
    assert!(first.is_some());

    store.post_update_status(id, PostStatus::Draft).unwrap();
    store.post_update_status(id, PostStatus::Published).unwrap();
    assert_eq!(store.post_find_by_id(id).unwrap().published_at, first);
}

#[test]
fn view_counter_increments_once_per_call() {
    let store = test_store();
    let id = seed_post(&store, "p", PostStatus::Published);
    for _ in 0..3 {
        assert!(store.post_record_view(id, "same-ip", 0).unwrap());
    }
    assert_eq!(store.post_find_by_id(id).unwrap().views, 3);
}

#[test]
fn view_counter_dedupes_only_when_enabled() {
    let store = test_store();
    let id = seed_post(&store, "p", PostStatus::Published);
    assert!(store.post_record_view(id, "a", 600).unwrap());
    assert!(!store.post_record_view(id, "a", 600).unwrap());
    assert!(store.post_record_view(id, "b", 600).unwrap());
    assert_eq!(store.post_find_by_id(id).unwrap().views, 2);
}

#[test]
fn view_on_missing_post_fails() {
    let store = test_store();
    assert!(store.post_record_view(42, "a", 0).is_err());
}

// ═══════════════════════════════════════════════════════════
// HTTP: account flows
// ═══════════════════════════════════════════════════════════

#[test]
fn check_uniqueness_accepts_fresh_pair() {
    let app = app();
    let (status, body) = call(
        &app.client,
        Method::Post,
        "/api/auth/check-uniqueness",
        Some(json!({"username": "newbie", "email": "new@example.com"})),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["success"], true);
}

#[test]
fn check_uniqueness_reports_conflicting_field() {
    let app = app();
    seed_user(&*app.store, "ann", Role::Reader, true);

    let (status, body) = call(
        &app.client,
        Method::Post,
        "/api/auth/check-uniqueness",
        Some(json!({"username": "someone", "email": "ann@example.com"})),
    );
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "email");

    let (status, body) = call(
        &app.client,
        Method::Post,
        "/api/auth/check-uniqueness",
        Some(json!({"username": "ann", "email": "other@example.com"})),
    );
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["field"], "username");
}

#[test]
fn check_uniqueness_rejects_bad_input_and_methods() {
    let app = app();
    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/check-uniqueness",
        Some(json!({"username": "ann"})),
    );
    assert_eq!(status, Status::BadRequest);

    let response = app
        .client
        .post("/api/auth/check-uniqueness")
        .header(ContentType::JSON)
        .body("{not json")
        .dispatch();
    assert_eq!(response.status(), Status::BadRequest);

    let (status, body) = call(&app.client, Method::Get, "/api/auth/check-uniqueness", None);
    assert_eq!(status, Status::MethodNotAllowed);
    assert_eq!(body["success"], false);
}

#[test]
fn check_uniqueness_is_rate_limited() {
    let app = app();
    let payload = json!({"username": "newbie", "email": "new@example.com"});
    for _ in 0..20 {
        let (status, _) = call(
            &app.client,
            Method::Post,
            "/api/auth/check-uniqueness",
            Some(payload.clone()),
        );
        assert_eq!(status, Status::Ok);
    }
    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/check-uniqueness",
        Some(payload),
    );
    assert_eq!(status, Status::TooManyRequests);
}

#[test]
fn register_then_verify_then_login() {
    let app = app();
    let (status, body) = call(
        &app.client,
        Method::Post,
        "/api/auth/register",
        Some(json!({"username": "ann", "email": "ann@example.com", "password": PASSWORD})),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["email_sent"], true);
    assert_eq!(app.mailer.count(), 1);

    let login = json!({"email": "ann@example.com", "password": PASSWORD});
    let (status, _) = call(&app.client, Method::Post, "/api/auth/login", Some(login.clone()));
    assert_eq!(status, Status::Forbidden);

    let token = app.mailer.last_token();
    assert_eq!(token.len(), 64);
    let uri = format!("/api/auth/verify-email?token={}", token);
    let (status, body) = call(&app.client, Method::Post, &uri, None);
    assert_eq!(status, Status::Ok);
    assert_eq!(body["verified"], true);

    // single use
    let (status, _) = call(&app.client, Method::Post, &uri, None);
    assert_eq!(status, Status::BadRequest);

    let (status, _) = call(&app.client, Method::Post, "/api/auth/login", Some(login));
    assert_eq!(status, Status::Ok);
    let (status, body) = call(&app.client, Method::Get, "/api/auth/me", None);
    assert_eq!(status, Status::Ok);
    assert_eq!(body["user"]["username"], "ann");
    assert!(body["user"].get("password_hash").is_none());

    call(&app.client, Method::Post, "/api/auth/logout", None);
    let (status, _) = call(&app.client, Method::Get, "/api/auth/me", None);
    assert_eq!(status, Status::Unauthorized);
}

#[test]
fn verify_email_rejects_missing_and_unknown_tokens() {
    let app = app();
    let (status, _) = call(&app.client, Method::Post, "/api/auth/verify-email", None);
    assert_eq!(status, Status::BadRequest);
    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/verify-email?token=deadbeef",
        None,
    );
    assert_eq!(status, Status::BadRequest);
    let (status, _) = call(&app.client, Method::Get, "/api/auth/verify-email", None);
    assert_eq!(status, Status::MethodNotAllowed);
}

#[test]
fn bad_credentials_are_unauthorized() {
    let app = app();
    seed_user(&*app.store, "ann", Role::Reader, true);
    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/login",
        Some(json!({"email": "ann@example.com", "password": "wrong-password"})),
    );
    assert_eq!(status, Status::Unauthorized);
}

#[test]
fn forgot_password_does_not_enumerate() {
    let app = app();
    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/forgot-password",
        Some(json!({"email": "nobody@example.com"})),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(app.mailer.count(), 0);
}

#[test]
fn password_reset_round_trip() {
    let app = app();
    seed_user(&*app.store, "ann", Role::Reader, true);
    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/forgot-password",
        Some(json!({"email": "ann@example.com"})),
    );
    assert_eq!(status, Status::Ok);
    let token = app.mailer.last_token();

    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/reset-password",
        Some(json!({"token": token, "password": "short"})),
    );
    assert_eq!(status, Status::BadRequest);

    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/reset-password",
        Some(json!({"token": token, "password": "brand-new-secret"})),
    );
    assert_eq!(status, Status::Ok);

    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/reset-password",
        Some(json!({"token": token, "password": "another-secret"})),
    );
    assert_eq!(status, Status::BadRequest);

    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/auth/login",
        Some(json!({"email": "ann@example.com", "password": "brand-new-secret"})),
    );
    assert_eq!(status, Status::Ok);
}

// ═══════════════════════════════════════════════════════════
// HTTP: admin surface
// ═══════════════════════════════════════════════════════════

#[test]
fn admin_routes_require_session_and_role() {
    let app = app();
    let (status, _) = call(&app.client, Method::Get, "/api/tags", None);
    assert_eq!(status, Status::Unauthorized);

    sign_in(&app, "reader", Role::Reader);
    let (status, body) = call(&app.client, Method::Get, "/api/tags", None);
    assert_eq!(status, Status::Forbidden);
    assert_eq!(body["success"], false);
    let (status, _) = call(&app.client, Method::Get, "/api/users", None);
    assert_eq!(status, Status::Forbidden);
}

#[test]
fn csrf_token_is_enforced_when_configured() {
    let app = app_with(config_with(&[("CSRF_TOKEN", "s3cret")]));
    sign_in(&app, "editor", Role::Editor);

    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/tags",
        Some(json!({"name": "Rust"})),
    );
    assert_eq!(status, Status::Forbidden);

    let response = app
        .client
        .post("/api/tags")
        .header(ContentType::JSON)
        .header(Header::new("X-CSRF-Token", "s3cret"))
        .body(json!({"name": "Rust"}).to_string())
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
}

#[test]
fn published_post_renders_with_toc_and_counts_views() {
    let app = app();
    sign_in(&app, "admin", Role::Admin);
    let body = create_published(&app, "Hello World", "# Title\n\ntext\n## Sub\n", &["Rust"]);
    assert_eq!(body["post"]["slug"], "hello-world");
    assert_eq!(
        body["compiled"]["toc"],
        json!([
            {"level": "one", "text": "Title", "slug": "title"},
            {"level": "two", "text": "Sub", "slug": "sub"},
        ])
    );

    let (status, html) = get_html(&app.client, "/posts/hello-world", "10.0.0.1");
    assert_eq!(status, Status::Ok);
    assert!(html.contains("<h1 id=\"title\">"));
    assert!(html.contains("href=\"#sub\""));
    assert!(html.contains("/tag/rust"));

    // served from cache the second time; still counted
    get_html(&app.client, "/posts/hello-world", "10.0.0.1");
    let post = app.store.post_find_by_slug("hello-world").unwrap();
    assert_eq!(post.views, 2);
}

#[test]
fn view_dedupe_applies_when_window_set() {
    let app = app_with(config_with(&[("VIEW_DEDUPE_WINDOW_SECS", "600")]));
    sign_in(&app, "admin", Role::Admin);
    create_published(&app, "Deduped", "text\n", &[]);

    get_html(&app.client, "/posts/deduped", "10.0.0.1");
    get_html(&app.client, "/posts/deduped", "10.0.0.1");
    get_html(&app.client, "/posts/deduped", "10.0.0.2");
    assert_eq!(app.store.post_find_by_slug("deduped").unwrap().views, 2);
}

#[test]
fn drafts_and_unknown_slugs_are_not_found() {
    let app = app();
    seed_post(&*app.store, "secret", PostStatus::Draft);
    let (status, _) = get_html(&app.client, "/posts/secret", "1.1.1.1");
    assert_eq!(status, Status::NotFound);
    let (status, _) = get_html(&app.client, "/posts/missing", "1.1.1.1");
    assert_eq!(status, Status::NotFound);
}

#[test]
fn malformed_mdx_is_rejected_without_storing() {
    let app = app();
    sign_in(&app, "author", Role::Author);
    let (status, body) = call(
        &app.client,
        Method::Post,
        "/api/posts",
        Some(json!({"title": "Broken", "content": "intro\n<Callout>\nbody\n"})),
    );
    assert_eq!(status, Status::InternalServerError);
    assert_eq!(body["error"], "Internal server error");
    assert_eq!(app.store.post_count(None), 0);
}

#[test]
fn published_slug_is_immutable() {
    let app = app();
    sign_in(&app, "admin", Role::Admin);
    let body = create_published(&app, "Fixed", "text\n", &[]);
    let id = body["post"]["id"].as_i64().unwrap();

    let (status, _) = call(
        &app.client,
        Method::Put,
        &format!("/api/posts/{}", id),
        Some(json!({"title": "Fixed", "slug": "moved", "content": "text\n"})),
    );
    assert_eq!(status, Status::BadRequest);
    assert!(app.store.post_find_by_slug("fixed").is_some());
    assert!(app.store.post_find_by_slug("moved").is_none());
}

#[test]
fn updating_a_published_post_refreshes_its_page() {
    let app = app_with(config_with(&[("REVALIDATE_DEBOUNCE_SECS", "0")]));
    sign_in(&app, "admin", Role::Admin);
    let body = create_published(&app, "Evolving", "first draft\n", &[]);
    let id = body["post"]["id"].as_i64().unwrap();

    let (_, html) = get_html(&app.client, "/posts/evolving", "1.1.1.1");
    assert!(html.contains("first draft"));

    let (status, body) = call(
        &app.client,
        Method::Put,
        &format!("/api/posts/{}", id),
        Some(json!({"title": "Evolving", "content": "second take\n"})),
    );
    assert_eq!(status, Status::Ok);
    let revalidated = body["revalidation"]["revalidated"].as_array().unwrap();
    assert!(revalidated.iter().any(|p| p == "/posts/evolving"));

    let (_, html) = get_html(&app.client, "/posts/evolving", "1.1.1.1");
    assert!(html.contains("second take"));
    assert!(!html.contains("first draft"));
}

#[test]
fn unreachable_revalidation_hook_does_not_fail_the_write() {
    let app = app_with(config_with(&[("REVALIDATE_WEBHOOK_URL", "http://127.0.0.1:9/hook")]));
    sign_in(&app, "admin", Role::Admin);
    let body = create_published(&app, "Hooked", "first draft\n", &[]);
    let id = body["post"]["id"].as_i64().unwrap();

    let (_, html) = get_html(&app.client, "/posts/hooked", "1.1.1.1");
    assert!(html.contains("first draft"));

    let update = |content: &str| {
        call(
            &app.client,
            Method::Put,
            &format!("/api/posts/{}", id),
            Some(json!({"title": "Hooked", "content": content})),
        )
    };

    let (status, body) = update("second take\n");
    assert_eq!(status, Status::Ok, "{}", body);
    let failed = body["revalidation"]["failed"].as_array().unwrap();
    assert!(failed.iter().any(|p| p == "/posts/hooked"));
    assert_eq!(app.store.post_find_by_id(id).unwrap().content, "second take\n");

    // The local page cache is evicted even though the hook is down
    let (_, html) = get_html(&app.client, "/posts/hooked", "1.1.1.1");
    assert!(html.contains("second take"));

    // Failed paths are not debounced, so the next write retries them
    let (status, body) = update("third take\n");
    assert_eq!(status, Status::Ok);
    let failed = body["revalidation"]["failed"].as_array().unwrap();
    let skipped = body["revalidation"]["skipped"].as_array().unwrap();
    assert!(failed.iter().any(|p| p == "/posts/hooked"));
    assert!(!skipped.iter().any(|p| p == "/posts/hooked"));
}

#[test]
fn oversized_page_numbers_render() {
    let app = app();
    seed_post(&*app.store, "only", PostStatus::Published);
    let (status, _) = get_html(&app.client, "/?page=9223372036854775807", "1.1.1.1");
    assert_eq!(status, Status::Ok);

    sign_in(&app, "admin", Role::Admin);
    let (status, body) = call(&app.client, Method::Get, "/api/posts?page=9223372036854775807", None);
    assert_eq!(status, Status::Ok);
    assert_eq!(body["posts"].as_array().map(Vec::len), Some(0));
}

#[test]
fn author_without_grant_cannot_edit_restricted_post() {
    let app = app();
    let owner = seed_user(&*app.store, "owner", Role::Author, true);
    let post = seed_post(&*app.store, "guarded", PostStatus::Draft);
    app.store
        .permission_replace(
            post,
            &PermissionSet {
                users: vec![owner],
                roles: vec![],
            },
        )
        .unwrap();

    sign_in(&app, "intruder", Role::Author);
    let (status, _) = call(
        &app.client,
        Method::Put,
        &format!("/api/posts/{}", post),
        Some(json!({"title": "Mine now", "content": "x\n"})),
    );
    assert_eq!(status, Status::Forbidden);
}

#[test]
fn permissions_endpoint_replaces_and_validates() {
    let app = app();
    let admin = sign_in(&app, "admin", Role::Admin);
    let post = seed_post(&*app.store, "p", PostStatus::Draft);
    let uri = format!("/api/posts/{}/permissions", post);

    let (status, _) = call(
        &app.client,
        Method::Put,
        &uri,
        Some(json!({"users": [admin], "roles": ["editor", "author"]})),
    );
    assert_eq!(status, Status::Ok);

    let (status, body) = call(
        &app.client,
        Method::Put,
        &uri,
        Some(json!({"roles": ["moderator"]})),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["permissions"], json!({"users": [], "roles": ["moderator"]}));

    let (status, _) = call(&app.client, Method::Put, &uri, Some(json!({"roles": ["wizard"]})));
    assert_eq!(status, Status::BadRequest);
    let (status, _) = call(&app.client, Method::Put, &uri, Some(json!({"users": [9999]})));
    assert_eq!(status, Status::BadRequest);
    assert_eq!(app.store.permission_get(post).roles, vec![Role::Moderator]);

    let (status, _) = call(
        &app.client,
        Method::Put,
        "/api/posts/9999/permissions",
        Some(json!({"roles": []})),
    );
    assert_eq!(status, Status::NotFound);
    let (status, _) = call(&app.client, Method::Post, &uri, None);
    assert_eq!(status, Status::MethodNotAllowed);
}

#[test]
fn delete_zero_removes_only_unused_tags() {
    let app = app();
    sign_in(&app, "admin", Role::Admin);
    create_published(&app, "Tagged", "text\n", &["Kept"]);
    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/tags",
        Some(json!({"name": "Lonely"})),
    );
    assert_eq!(status, Status::Ok);

    let (status, body) = call(&app.client, Method::Delete, "/api/tags/delete-zero", None);
    assert_eq!(status, Status::Ok);
    assert_eq!(body["deleted"], json!(["lonely"]));
    assert!(app.store.tag_find_by_slug("kept").is_some());

    let (status, _) = call(&app.client, Method::Get, "/api/tags/delete-zero", None);
    assert_eq!(status, Status::MethodNotAllowed);
}

#[test]
fn delete_zero_removes_only_unused_categories() {
    let app = app();
    sign_in(&app, "editor", Role::Editor);
    let (status, _) = call(
        &app.client,
        Method::Post,
        "/api/posts",
        Some(json!({"title": "Filed", "content": "x\n", "category": "Guides"})),
    );
    assert_eq!(status, Status::Ok);
    call(
        &app.client,
        Method::Post,
        "/api/categories",
        Some(json!({"name": "Unused"})),
    );

    let (status, body) = call(
        &app.client,
        Method::Delete,
        "/api/categories/delete-zero",
        None,
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["deleted"], json!(["unused"]));
    assert!(app.store.category_find_by_slug("guides").is_some());
}

#[test]
fn admins_cannot_demote_themselves() {
    let app = app();
    let me = sign_in(&app, "admin", Role::Admin);
    let other = seed_user(&*app.store, "other", Role::Reader, true);

    let (status, _) = call(
        &app.client,
        Method::Put,
        &format!("/api/users/{}/role", me),
        Some(json!({"role": "reader"})),
    );
    assert_eq!(status, Status::BadRequest);

    let (status, body) = call(
        &app.client,
        Method::Put,
        &format!("/api/users/{}/role", other),
        Some(json!({"role": "editor"})),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["user"]["role"], "editor");
}

#[test]
fn mdx_preview_does_not_store() {
    let app = app();
    sign_in(&app, "author", Role::Author);
    let (status, body) = call(
        &app.client,
        Method::Post,
        "/api/mdx/compile",
        Some(json!({"content": "## Intro\n\n## Intro\n"})),
    );
    assert_eq!(status, Status::Ok);
    assert_eq!(body["compiled"]["toc"][1]["slug"], "intro-1");
    assert_eq!(app.store.post_count(None), 0);
}

// ═══════════════════════════════════════════════════════════
// HTTP: public listings
// ═══════════════════════════════════════════════════════════

#[test]
fn sitemap_lists_only_published_posts() {
    let app = app();
    seed_post(&*app.store, "live", PostStatus::Published);
    seed_post(&*app.store, "hidden", PostStatus::Draft);

    let (status, xml) = get_html(&app.client, "/sitemap.xml", "1.1.1.1");
    assert_eq!(status, Status::Ok);
    assert!(xml.contains("http://localhost:8000/posts/live"));
    assert!(!xml.contains("/posts/hidden"));
}

#[test]
fn unknown_public_page_renders_html_404() {
    let app = app();
    let response = app.client.get("/nowhere/at/all").dispatch();
    assert_eq!(response.status(), Status::NotFound);
    assert_eq!(response.content_type(), Some(ContentType::HTML));
}

#[test]
fn feed_lists_only_published_posts() {
    let app = app();
    seed_post(&*app.store, "in-feed", PostStatus::Published);
    seed_post(&*app.store, "not-in-feed", PostStatus::Draft);

    let (status, xml) = get_html(&app.client, "/feed", "1.1.1.1");
    assert_eq!(status, Status::Ok);
    assert!(xml.contains("<rss"));
    assert!(xml.contains("http://localhost:8000/posts/in-feed"));
    assert!(!xml.contains("not-in-feed"));
}
