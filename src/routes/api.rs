use std::sync::{Arc, OnceLock};

use chrono::{NaiveDateTime, Utc};
use regex::Regex;
use rocket::http::CookieJar;
use rocket::serde::json::{Error as JsonError, Json};
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{json_body, rate_limited};
use crate::config::AppConfig;
use crate::email::{self, Mailer};
use crate::error::{ApiError, ApiResult};
use crate::models::user::{NewUser, Role, TokenOutcome};
use crate::rate_limit::{RateLimiter, RatePolicy};
use crate::security::auth::{self, AuthenticatedUser, ClientIp};
use crate::security::tokens;
use crate::store::Store;

pub const MIN_PASSWORD_LEN: usize = 8;

// ── Input validation ───────────────────────────────────

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{3,32}$").expect("valid username regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

/// Trimmed, non-empty, well-formed username.
pub fn clean_username(raw: Option<&str>) -> ApiResult<String> {
    let value = raw.map(str::trim).unwrap_or("");
    if value.is_empty() {
        return Err(ApiError::Validation("username is required".into()));
    }
    if !username_re().is_match(value) {
        return Err(ApiError::Validation(
            "username must be 3-32 letters, digits, '_' or '-'".into(),
        ));
    }
    Ok(value.to_string())
}

/// Trimmed, lowercased, well-formed email.
pub fn clean_email(raw: Option<&str>) -> ApiResult<String> {
    let value = raw.map(str::trim).unwrap_or("");
    if value.is_empty() {
        return Err(ApiError::Validation("email is required".into()));
    }
    if value.len() > 254 || !email_re().is_match(value) {
        return Err(ApiError::Validation("email is not a valid address".into()));
    }
    Ok(value.to_ascii_lowercase())
}

pub fn check_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Fail with a field-tagged conflict when either identity is already used.
pub fn ensure_unique(store: &dyn Store, username: &str, email: &str) -> ApiResult<()> {
    if store.user_email_taken(email)? {
        return Err(ApiError::Conflict {
            field: "email",
            message: "Email is already registered".into(),
        });
    }
    if store.user_username_taken(username)? {
        return Err(ApiError::Conflict {
            field: "username",
            message: "Username is already taken".into(),
        });
    }
    Ok(())
}

/// Shared by the JSON endpoint and the reset page form.
pub fn apply_password_reset(
    store: &dyn Store,
    token: &str,
    password: &str,
    now: NaiveDateTime,
) -> ApiResult<TokenOutcome> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::Validation("token is required".into()));
    }
    check_password(password)?;
    let hash = auth::hash_password(password)?;
    Ok(store.user_consume_reset_token(token, &hash, now)?)
}

// ── Check uniqueness ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UniquenessCheck {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[post("/auth/check-uniqueness", data = "<body>")]
pub fn check_uniqueness(
    store: &State<Arc<dyn Store>>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    body: Result<Json<UniquenessCheck>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    rate_limited(limiter, &RatePolicy::CHECK_UNIQUENESS, &client_ip.0)?;
    let body = json_body(body)?;
    let username = clean_username(body.username.as_deref())?;
    let email = clean_email(body.email.as_deref())?;

    ensure_unique(&***store, &username, &email)?;
    Ok(Json(json!({"success": true, "available": true})))
}

#[get("/auth/check-uniqueness")]
pub fn check_uniqueness_get() -> ApiError {
    ApiError::MethodNotAllowed
}

#[put("/auth/check-uniqueness")]
pub fn check_uniqueness_put() -> ApiError {
    ApiError::MethodNotAllowed
}

#[delete("/auth/check-uniqueness")]
pub fn check_uniqueness_delete() -> ApiError {
    ApiError::MethodNotAllowed
}

#[patch("/auth/check-uniqueness")]
pub fn check_uniqueness_patch() -> ApiError {
    ApiError::MethodNotAllowed
}

// ── Register ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[post("/auth/register", data = "<body>")]
pub async fn register(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    mailer: &State<Arc<dyn Mailer>>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    body: Result<Json<RegisterForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    rate_limited(limiter, &RatePolicy::REGISTER, &client_ip.0)?;
    let body = json_body(body)?;
    let username = clean_username(body.username.as_deref())?;
    let email = clean_email(body.email.as_deref())?;
    let password = body.password.unwrap_or_default();
    check_password(&password)?;
    ensure_unique(&***store, &username, &email)?;

    let password_hash = auth::hash_password(&password)?;
    let user_id = store.user_create(&NewUser {
        username: &username,
        email: &email,
        password_hash: &password_hash,
        role: Role::Reader,
        email_verified: false,
    })?;

    let token = tokens::verification_token();
    store.user_set_verification_token(user_id, &token.value, token.expires_at)?;

    let message = email::verification_email(config, &email, &username, &token.value);
    let email_sent = email::send_soft(&***mailer, &message).await;

    log::info!("[account] registered user {} ({})", user_id, username);
    Ok(Json(json!({
        "success": true,
        "user_id": user_id,
        "email_sent": email_sent,
    })))
}

// ── Verify email ───────────────────────────────────────

#[post("/auth/verify-email?<token>")]
pub fn verify_email(
    store: &State<Arc<dyn Store>>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    token: Option<&str>,
) -> ApiResult<Json<Value>> {
    rate_limited(limiter, &RatePolicy::VERIFY_EMAIL, &client_ip.0)?;
    let token = token.map(str::trim).unwrap_or("");
    if token.is_empty() {
        return Err(ApiError::Validation("token is required".into()));
    }

    match store.user_consume_verification_token(token, Utc::now().naive_utc())? {
        TokenOutcome::Consumed(user_id) => {
            log::info!("[account] user {} verified their email", user_id);
            Ok(Json(json!({"success": true, "verified": true})))
        }
        TokenOutcome::Expired => Err(ApiError::Validation(
            "Verification link has expired".into(),
        )),
        TokenOutcome::Unknown => Err(ApiError::Validation(
            "Verification link is invalid or already used".into(),
        )),
    }
}

#[get("/auth/verify-email")]
pub fn verify_email_get() -> ApiError {
    ApiError::MethodNotAllowed
}

#[put("/auth/verify-email")]
pub fn verify_email_put() -> ApiError {
    ApiError::MethodNotAllowed
}

#[delete("/auth/verify-email")]
pub fn verify_email_delete() -> ApiError {
    ApiError::MethodNotAllowed
}

#[patch("/auth/verify-email")]
pub fn verify_email_patch() -> ApiError {
    ApiError::MethodNotAllowed
}

// ── Password reset ─────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    pub email: Option<String>,
}

/// Always answers the same way so addresses cannot be probed.
#[post("/auth/forgot-password", data = "<body>")]
pub async fn forgot_password(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    mailer: &State<Arc<dyn Mailer>>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    body: Result<Json<ForgotPasswordForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    rate_limited(limiter, &RatePolicy::FORGOT_PASSWORD, &client_ip.0)?;
    let body = json_body(body)?;
    let email = clean_email(body.email.as_deref())?;

    if let Some(user) = store.user_get_by_email(&email) {
        let token = tokens::reset_token();
        store.user_set_reset_token(user.id, &token.value, token.expires_at)?;
        let message = email::password_reset_email(config, &user.email, &token.value);
        email::send_soft(&***mailer, &message).await;
    }

    Ok(Json(json!({
        "success": true,
        "message": "If that address has an account, a reset link is on its way.",
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub token: Option<String>,
    pub password: Option<String>,
}

#[post("/auth/reset-password", data = "<body>")]
pub fn reset_password(
    store: &State<Arc<dyn Store>>,
    limiter: &State<Arc<RateLimiter>>,
    client_ip: ClientIp,
    body: Result<Json<ResetPasswordForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    rate_limited(limiter, &RatePolicy::RESET_PASSWORD, &client_ip.0)?;
    let body = json_body(body)?;
    let token = body.token.unwrap_or_default();
    let password = body.password.unwrap_or_default();

    match apply_password_reset(&***store, &token, &password, Utc::now().naive_utc())? {
        TokenOutcome::Consumed(user_id) => {
            log::info!("[account] user {} reset their password", user_id);
            Ok(Json(json!({"success": true})))
        }
        TokenOutcome::Expired => Err(ApiError::Validation("Reset link has expired".into())),
        TokenOutcome::Unknown => Err(ApiError::Validation(
            "Reset link is invalid or already used".into(),
        )),
    }
}

// ── Session ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[post("/auth/login", data = "<body>")]
pub fn login(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    limiter: &State<Arc<RateLimiter>>,
    cookies: &CookieJar<'_>,
    client_ip: ClientIp,
    body: Result<Json<LoginForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    rate_limited(limiter, &RatePolicy::LOGIN, &client_ip.0)?;
    let body = json_body(body)?;
    let email = clean_email(body.email.as_deref())?;
    let password = body.password.unwrap_or_default();

    let user = match store.user_get_by_email(&email) {
        Some(u) if auth::verify_password(&password, &u.password_hash) => u,
        _ => return Err(ApiError::Unauthorized),
    };
    if !user.email_verified {
        return Err(ApiError::Forbidden);
    }

    let ip_hash = auth::hash_ip(&client_ip.0);
    let session_id = store.session_create(user.id, Some(&ip_hash), config.session_ttl_hours)?;
    auth::set_session_cookie(cookies, &session_id, config);

    Ok(Json(json!({"success": true, "user": user.safe_json()})))
}

#[post("/auth/logout")]
pub fn logout(store: &State<Arc<dyn Store>>, cookies: &CookieJar<'_>) -> ApiResult<Json<Value>> {
    if let Some(session_id) = auth::session_id(cookies) {
        store.session_destroy(&session_id)?;
    }
    auth::clear_session_cookie(cookies);
    Ok(Json(json!({"success": true})))
}

#[get("/auth/me")]
pub fn me(user: AuthenticatedUser) -> Json<Value> {
    Json(json!({"success": true, "user": user.user.safe_json()}))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        check_uniqueness,
        check_uniqueness_get,
        check_uniqueness_put,
        check_uniqueness_delete,
        check_uniqueness_patch,
        register,
        verify_email,
        verify_email_get,
        verify_email_put,
        verify_email_delete,
        verify_email_patch,
        forgot_password,
        reset_password,
        login,
        logout,
        me,
    ]
}
