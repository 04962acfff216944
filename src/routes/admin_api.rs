use std::sync::Arc;

use rocket::serde::json::{Error as JsonError, Json};
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use super::api::{check_password, clean_email, clean_username, ensure_unique};
use super::{json_body, page_number, page_offset};
use crate::error::{ApiError, ApiResult};
use crate::mdx::MdxCompiler;
use crate::models::category::CategoryForm;
use crate::models::permission::PermissionSet;
use crate::models::post::{Post, PostForm, PostStatus, PostWrite};
use crate::models::tag::TagForm;
use crate::models::user::{NewUser, Role, User};
use crate::revalidate::{MutationEvent, PostRoutes, RevalidationDispatcher, RevalidationReport};
use crate::security::auth::{
    self, AdminUser, AuthenticatedUser, CsrfGuard, PostAuthor, TaxonomyEditor,
};
use crate::store::Store;

const ADMIN_PAGE_SIZE: i64 = 20;

// ── Helpers ────────────────────────────────────────────

fn post_routes(store: &dyn Store, post: &Post) -> PostRoutes {
    PostRoutes {
        slug: post.slug.clone(),
        category: post
            .category_id
            .and_then(|id| store.category_find_by_id(id))
            .map(|c| c.slug),
        tags: store
            .tag_for_post(post.id)
            .into_iter()
            .map(|t| t.slug)
            .collect(),
    }
}

/// Dispatch after a committed write. Failures are already logged by the
/// dispatcher and never fail the request.
async fn revalidate(dispatcher: &RevalidationDispatcher, event: MutationEvent) -> RevalidationReport {
    let report = dispatcher.dispatch(&event).await;
    if !report.is_clean() {
        log::warn!(
            "[revalidate] {} path(s) left stale: {}",
            report.failed.len(),
            report.failed.join(", ")
        );
    }
    report
}

/// Admins and the post's author always pass; otherwise a grant must match
/// when the post has any.
fn ensure_can_edit(store: &dyn Store, user: &User, post: &Post) -> ApiResult<()> {
    if user.role.bypasses_post_permissions() || post.author_id == Some(user.id) {
        return Ok(());
    }
    if store.permission_allows(post.id, user.id, user.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn require_post_reader(user: &User) -> ApiResult<()> {
    if user.role.can_author_posts() || user.role.can_moderate_posts() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn required_text(value: &str, field: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Find-or-create the category and tags a post form names.
fn resolve_taxonomy(store: &dyn Store, form: &PostForm) -> ApiResult<(Option<i64>, Vec<i64>)> {
    let category_id = match non_blank(form.category.as_deref()) {
        Some(name) => {
            if slug::slugify(name).is_empty() {
                return Err(ApiError::Validation(format!(
                    "category '{}' has no usable characters",
                    name
                )));
            }
            Some(store.category_find_or_create(name)?.id)
        }
        None => None,
    };

    let mut tag_ids: Vec<i64> = Vec::new();
    for name in form.tags.iter().filter_map(|t| non_blank(Some(t))) {
        if slug::slugify(name).is_empty() {
            return Err(ApiError::Validation(format!(
                "tag '{}' has no usable characters",
                name
            )));
        }
        let tag = store.tag_find_or_create(name)?;
        if !tag_ids.contains(&tag.id) {
            tag_ids.push(tag.id);
        }
    }
    Ok((category_id, tag_ids))
}

fn post_json(store: &dyn Store, post: &Post) -> Value {
    json!({
        "post": post,
        "compiled": post.compiled_artifact(),
        "tags": store.tag_for_post(post.id),
        "category": post.category_id.and_then(|id| store.category_find_by_id(id)),
    })
}

// ── Posts ──────────────────────────────────────────────

#[get("/posts?<status>&<page>")]
pub fn list_posts(
    user: AuthenticatedUser,
    store: &State<Arc<dyn Store>>,
    status: Option<&str>,
    page: Option<i64>,
) -> ApiResult<Json<Value>> {
    require_post_reader(&user.user)?;
    let status = match status {
        Some(raw) => Some(
            PostStatus::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown status '{}'", raw)))?,
        ),
        None => None,
    };
    let page = page_number(page);
    let posts = store.post_list(status, ADMIN_PAGE_SIZE, page_offset(page, ADMIN_PAGE_SIZE));
    let total = store.post_count(status);

    Ok(Json(json!({
        "success": true,
        "posts": posts,
        "total": total,
        "page": page,
    })))
}

#[get("/posts/<id>")]
pub fn get_post(
    user: AuthenticatedUser,
    store: &State<Arc<dyn Store>>,
    id: i64,
) -> ApiResult<Json<Value>> {
    require_post_reader(&user.user)?;
    let post = store.post_find_by_id(id).ok_or(ApiError::NotFound("Post"))?;
    let mut body = post_json(&***store, &post);
    body["success"] = json!(true);
    Ok(Json(body))
}

#[post("/posts", data = "<body>")]
pub async fn create_post(
    author: PostAuthor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    compiler: &State<MdxCompiler>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
    body: Result<Json<PostForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let form = json_body(body)?;
    let title = required_text(&form.title, "title")?;
    let slug = slug::slugify(non_blank(form.slug.as_deref()).unwrap_or(&title));
    if slug.is_empty() {
        return Err(ApiError::Validation("slug has no usable characters".into()));
    }
    if store.post_find_by_slug(&slug).is_some() {
        return Err(ApiError::Conflict {
            field: "slug",
            message: "A post with that slug already exists".into(),
        });
    }

    let compiled = compiler.compile(&form.content)?;
    let compiled_json = compiled.to_json()?;
    let (category_id, tag_ids) = resolve_taxonomy(&***store, &form)?;

    let id = store.post_create(&PostWrite {
        slug: &slug,
        title: &title,
        content: &form.content,
        compiled: &compiled_json,
        excerpt: non_blank(form.excerpt.as_deref()),
        status: form.status.unwrap_or(PostStatus::Draft),
        featured_image_url: non_blank(form.featured_image_url.as_deref()),
        author_id: Some(author.user.id),
        category_id,
    })?;
    store.tag_set_for_post(id, &tag_ids)?;

    let post = store
        .post_find_by_id(id)
        .ok_or_else(|| ApiError::Internal(format!("post {} vanished after insert", id)))?;
    log::info!("[posts] {} created post {} ({})", author.user.username, id, post.slug);

    let revalidation = if post.is_published() {
        let routes = post_routes(&***store, &post);
        Some(revalidate(dispatcher, MutationEvent::PostCreated(routes)).await)
    } else {
        None
    };

    let mut body = post_json(&***store, &post);
    body["success"] = json!(true);
    body["revalidation"] = json!(revalidation);
    Ok(Json(body))
}

#[put("/posts/<id>", data = "<body>")]
pub async fn update_post(
    author: PostAuthor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    compiler: &State<MdxCompiler>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
    id: i64,
    body: Result<Json<PostForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let existing = store.post_find_by_id(id).ok_or(ApiError::NotFound("Post"))?;
    ensure_can_edit(&***store, &author.user, &existing)?;

    let form = json_body(body)?;
    let title = required_text(&form.title, "title")?;
    let slug = match non_blank(form.slug.as_deref()) {
        Some(raw) => slug::slugify(raw),
        None => existing.slug.clone(),
    };
    if slug.is_empty() {
        return Err(ApiError::Validation("slug has no usable characters".into()));
    }
    if slug != existing.slug {
        if existing.is_published() {
            return Err(ApiError::Validation(
                "The slug of a published post cannot change".into(),
            ));
        }
        if store.post_find_by_slug(&slug).is_some() {
            return Err(ApiError::Conflict {
                field: "slug",
                message: "A post with that slug already exists".into(),
            });
        }
    }

    let before = post_routes(&***store, &existing);
    let compiled = compiler.compile(&form.content)?;
    let compiled_json = compiled.to_json()?;
    let (category_id, tag_ids) = resolve_taxonomy(&***store, &form)?;

    store.post_update(
        id,
        &PostWrite {
            slug: &slug,
            title: &title,
            content: &form.content,
            compiled: &compiled_json,
            excerpt: non_blank(form.excerpt.as_deref()),
            status: form.status.unwrap_or(existing.status),
            featured_image_url: non_blank(form.featured_image_url.as_deref()),
            author_id: existing.author_id,
            category_id,
        },
    )?;
    store.tag_set_for_post(id, &tag_ids)?;

    let post = store.post_find_by_id(id).ok_or(ApiError::NotFound("Post"))?;
    let revalidation = if existing.is_published() || post.is_published() {
        let after = post_routes(&***store, &post);
        Some(revalidate(dispatcher, MutationEvent::PostUpdated { before, after }).await)
    } else {
        None
    };

    let mut body = post_json(&***store, &post);
    body["success"] = json!(true);
    body["revalidation"] = json!(revalidation);
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: PostStatus,
}

/// Moderators may publish or unpublish any post; authors only posts they
/// can edit.
#[put("/posts/<id>/status", data = "<body>")]
pub async fn update_post_status(
    user: AuthenticatedUser,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
    id: i64,
    body: Result<Json<StatusChange>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let existing = store.post_find_by_id(id).ok_or(ApiError::NotFound("Post"))?;
    if !user.user.role.can_moderate_posts() {
        if !user.user.role.can_author_posts() {
            return Err(ApiError::Forbidden);
        }
        ensure_can_edit(&***store, &user.user, &existing)?;
    }

    let change = json_body(body)?;
    store.post_update_status(id, change.status)?;
    let post = store.post_find_by_id(id).ok_or(ApiError::NotFound("Post"))?;

    let revalidation = if existing.is_published() || post.is_published() {
        let routes = post_routes(&***store, &post);
        let event = MutationEvent::PostUpdated {
            before: routes.clone(),
            after: routes,
        };
        Some(revalidate(dispatcher, event).await)
    } else {
        None
    };

    Ok(Json(json!({
        "success": true,
        "post": post,
        "revalidation": revalidation,
    })))
}

#[delete("/posts/<id>")]
pub async fn delete_post(
    author: PostAuthor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
    id: i64,
) -> ApiResult<Json<Value>> {
    let post = store.post_find_by_id(id).ok_or(ApiError::NotFound("Post"))?;
    ensure_can_edit(&***store, &author.user, &post)?;

    let routes = post_routes(&***store, &post);
    store.post_delete(id)?;
    log::info!("[posts] {} deleted post {} ({})", author.user.username, id, post.slug);

    let revalidation = if post.is_published() {
        Some(revalidate(dispatcher, MutationEvent::PostDeleted(routes)).await)
    } else {
        None
    };
    Ok(Json(json!({"success": true, "revalidation": revalidation})))
}

// ── Post permissions ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PermissionPayload {
    #[serde(default)]
    pub users: Vec<i64>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl PermissionPayload {
    /// Resolve role names and check every user id exists.
    fn into_set(self, store: &dyn Store) -> ApiResult<PermissionSet> {
        let mut roles = Vec::with_capacity(self.roles.len());
        for name in &self.roles {
            let role = Role::parse(name.trim())
                .ok_or_else(|| ApiError::Validation(format!("unknown role '{}'", name)))?;
            roles.push(role);
        }
        for user_id in &self.users {
            if store.user_get_by_id(*user_id).is_none() {
                return Err(ApiError::Validation(format!("unknown user id {}", user_id)));
            }
        }
        Ok(PermissionSet {
            users: self.users,
            roles,
        })
    }
}

#[get("/posts/<id>/permissions")]
pub fn get_permissions(
    _admin: AdminUser,
    store: &State<Arc<dyn Store>>,
    id: i64,
) -> ApiResult<Json<Value>> {
    store.post_find_by_id(id).ok_or(ApiError::NotFound("Post"))?;
    Ok(Json(json!({
        "success": true,
        "permissions": store.permission_get(id),
    })))
}

/// Replace-all write: the payload becomes the post's entire grant set.
#[put("/posts/<id>/permissions", data = "<body>")]
pub async fn replace_permissions(
    admin: AdminUser,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
    id: i64,
    body: Result<Json<PermissionPayload>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let post = store.post_find_by_id(id).ok_or(ApiError::NotFound("Post"))?;
    let set = json_body(body)?.into_set(&***store)?;

    store.permission_replace(id, &set)?;
    log::info!(
        "[permissions] {} set {} user and {} role grant(s) on post {}",
        admin.user.username,
        set.users.len(),
        set.roles.len(),
        id
    );

    let revalidation = if post.is_published() {
        let event = MutationEvent::PermissionsChanged { slug: post.slug.clone() };
        Some(revalidate(dispatcher, event).await)
    } else {
        None
    };

    Ok(Json(json!({
        "success": true,
        "permissions": store.permission_get(id),
        "revalidation": revalidation,
    })))
}

#[post("/posts/<_>/permissions")]
pub fn permissions_post() -> ApiError {
    ApiError::MethodNotAllowed
}

#[delete("/posts/<_>/permissions")]
pub fn permissions_delete() -> ApiError {
    ApiError::MethodNotAllowed
}

#[patch("/posts/<_>/permissions")]
pub fn permissions_patch() -> ApiError {
    ApiError::MethodNotAllowed
}

// ── Tags ───────────────────────────────────────────────

fn clean_tag_form(form: TagForm) -> ApiResult<(TagForm, String)> {
    let name = required_text(&form.name, "name")?;
    let form = TagForm {
        name,
        slug: form.slug,
        description: non_blank(form.description.as_deref()).map(str::to_string),
    };
    let slug = form.resolved_slug();
    if slug.is_empty() {
        return Err(ApiError::Validation("slug has no usable characters".into()));
    }
    Ok((form, slug))
}

#[get("/tags")]
pub fn list_tags(_editor: TaxonomyEditor, store: &State<Arc<dyn Store>>) -> Json<Value> {
    let tags: Vec<Value> = store
        .tag_list()
        .into_iter()
        .map(|t| {
            let count = store.tag_count_posts(t.id);
            json!({"tag": t, "post_count": count})
        })
        .collect();
    Json(json!({"success": true, "tags": tags}))
}

#[post("/tags", data = "<body>")]
pub fn create_tag(
    _editor: TaxonomyEditor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    body: Result<Json<TagForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let (form, slug) = clean_tag_form(json_body(body)?)?;
    if store.tag_find_by_slug(&slug).is_some() {
        return Err(ApiError::Conflict {
            field: "slug",
            message: "A tag with that slug already exists".into(),
        });
    }
    let id = store.tag_create(&form)?;
    Ok(Json(json!({"success": true, "tag": store.tag_find_by_id(id)})))
}

#[put("/tags/<id>", data = "<body>")]
pub async fn update_tag(
    _editor: TaxonomyEditor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
    id: i64,
    body: Result<Json<TagForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let existing = store.tag_find_by_id(id).ok_or(ApiError::NotFound("Tag"))?;
    let (form, slug) = clean_tag_form(json_body(body)?)?;
    if slug != existing.slug && store.tag_find_by_slug(&slug).is_some() {
        return Err(ApiError::Conflict {
            field: "slug",
            message: "A tag with that slug already exists".into(),
        });
    }
    store.tag_update(id, &form)?;

    let event = MutationEvent::TagUpdated {
        slug,
        previous_slug: existing.slug,
    };
    let revalidation = revalidate(dispatcher, event).await;
    Ok(Json(json!({
        "success": true,
        "tag": store.tag_find_by_id(id),
        "revalidation": revalidation,
    })))
}

#[delete("/tags/<id>")]
pub async fn delete_tag(
    _editor: TaxonomyEditor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
    id: i64,
) -> ApiResult<Json<Value>> {
    let tag = store.tag_find_by_id(id).ok_or(ApiError::NotFound("Tag"))?;
    store.tag_delete(id)?;
    let revalidation = revalidate(dispatcher, MutationEvent::TagDeleted { slug: tag.slug }).await;
    Ok(Json(json!({"success": true, "revalidation": revalidation})))
}

/// Remove every tag no post uses and report their slugs.
#[delete("/tags/delete-zero")]
pub async fn delete_zero_tags(
    editor: TaxonomyEditor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
) -> ApiResult<Json<Value>> {
    let removed = store.tag_delete_unused()?;
    let slugs: Vec<String> = removed.into_iter().map(|t| t.slug).collect();
    log::info!("[tags] {} pruned {} unused tag(s)", editor.user.username, slugs.len());

    let revalidation = if slugs.is_empty() {
        None
    } else {
        let event = MutationEvent::TagsPruned { slugs: slugs.clone() };
        Some(revalidate(dispatcher, event).await)
    };
    Ok(Json(json!({
        "success": true,
        "deleted": slugs,
        "revalidation": revalidation,
    })))
}

#[get("/tags/delete-zero")]
pub fn delete_zero_tags_get() -> ApiError {
    ApiError::MethodNotAllowed
}

#[post("/tags/delete-zero")]
pub fn delete_zero_tags_post() -> ApiError {
    ApiError::MethodNotAllowed
}

#[put("/tags/delete-zero")]
pub fn delete_zero_tags_put() -> ApiError {
    ApiError::MethodNotAllowed
}

#[patch("/tags/delete-zero")]
pub fn delete_zero_tags_patch() -> ApiError {
    ApiError::MethodNotAllowed
}

// ── Categories ─────────────────────────────────────────

fn clean_category_form(form: CategoryForm) -> ApiResult<(CategoryForm, String)> {
    let name = required_text(&form.name, "name")?;
    let form = CategoryForm {
        name,
        slug: form.slug,
        description: non_blank(form.description.as_deref()).map(str::to_string),
    };
    let slug = form.resolved_slug();
    if slug.is_empty() {
        return Err(ApiError::Validation("slug has no usable characters".into()));
    }
    Ok((form, slug))
}

#[get("/categories")]
pub fn list_categories(_editor: TaxonomyEditor, store: &State<Arc<dyn Store>>) -> Json<Value> {
    let categories: Vec<Value> = store
        .category_list()
        .into_iter()
        .map(|c| {
            let count = store.category_count_posts(c.id);
            json!({"category": c, "post_count": count})
        })
        .collect();
    Json(json!({"success": true, "categories": categories}))
}

#[post("/categories", data = "<body>")]
pub fn create_category(
    _editor: TaxonomyEditor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    body: Result<Json<CategoryForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let (form, slug) = clean_category_form(json_body(body)?)?;
    if store.category_find_by_slug(&slug).is_some() {
        return Err(ApiError::Conflict {
            field: "slug",
            message: "A category with that slug already exists".into(),
        });
    }
    let id = store.category_create(&form)?;
    Ok(Json(json!({"success": true, "category": store.category_find_by_id(id)})))
}

#[put("/categories/<id>", data = "<body>")]
pub async fn update_category(
    _editor: TaxonomyEditor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
    id: i64,
    body: Result<Json<CategoryForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let existing = store
        .category_find_by_id(id)
        .ok_or(ApiError::NotFound("Category"))?;
    let (form, slug) = clean_category_form(json_body(body)?)?;
    if slug != existing.slug && store.category_find_by_slug(&slug).is_some() {
        return Err(ApiError::Conflict {
            field: "slug",
            message: "A category with that slug already exists".into(),
        });
    }
    store.category_update(id, &form)?;

    let event = MutationEvent::CategoryUpdated {
        slug,
        previous_slug: existing.slug,
    };
    let revalidation = revalidate(dispatcher, event).await;
    Ok(Json(json!({
        "success": true,
        "category": store.category_find_by_id(id),
        "revalidation": revalidation,
    })))
}

/// Posts in the category keep existing, uncategorized.
#[delete("/categories/<id>")]
pub async fn delete_category(
    _editor: TaxonomyEditor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
    id: i64,
) -> ApiResult<Json<Value>> {
    let category = store
        .category_find_by_id(id)
        .ok_or(ApiError::NotFound("Category"))?;
    store.category_delete(id)?;
    let event = MutationEvent::CategoryDeleted {
        slug: category.slug,
    };
    let revalidation = revalidate(dispatcher, event).await;
    Ok(Json(json!({"success": true, "revalidation": revalidation})))
}

#[delete("/categories/delete-zero")]
pub async fn delete_zero_categories(
    editor: TaxonomyEditor,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    dispatcher: &State<Arc<RevalidationDispatcher>>,
) -> ApiResult<Json<Value>> {
    let removed = store.category_delete_unused()?;
    let slugs: Vec<String> = removed.into_iter().map(|c| c.slug).collect();
    log::info!(
        "[categories] {} pruned {} unused categor(ies)",
        editor.user.username,
        slugs.len()
    );

    let revalidation = if slugs.is_empty() {
        None
    } else {
        let event = MutationEvent::CategoriesPruned { slugs: slugs.clone() };
        Some(revalidate(dispatcher, event).await)
    };
    Ok(Json(json!({
        "success": true,
        "deleted": slugs,
        "revalidation": revalidation,
    })))
}

#[get("/categories/delete-zero")]
pub fn delete_zero_categories_get() -> ApiError {
    ApiError::MethodNotAllowed
}

#[post("/categories/delete-zero")]
pub fn delete_zero_categories_post() -> ApiError {
    ApiError::MethodNotAllowed
}

#[put("/categories/delete-zero")]
pub fn delete_zero_categories_put() -> ApiError {
    ApiError::MethodNotAllowed
}

#[patch("/categories/delete-zero")]
pub fn delete_zero_categories_patch() -> ApiError {
    ApiError::MethodNotAllowed
}

// ── Users ──────────────────────────────────────────────

#[get("/users")]
pub fn list_users(_admin: AdminUser, store: &State<Arc<dyn Store>>) -> Json<Value> {
    let users: Vec<Value> = store.user_list_all().iter().map(User::safe_json).collect();
    Json(json!({"success": true, "users": users, "total": store.user_count()}))
}

#[derive(Debug, Deserialize)]
pub struct NewUserForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

fn parse_role(raw: Option<&str>) -> ApiResult<Role> {
    let raw = raw.map(str::trim).unwrap_or("");
    Role::parse(raw).ok_or_else(|| ApiError::Validation(format!("unknown role '{}'", raw)))
}

/// Accounts made by an admin start out verified.
#[post("/users", data = "<body>")]
pub fn create_user(
    admin: AdminUser,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    body: Result<Json<NewUserForm>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let form = json_body(body)?;
    let username = clean_username(form.username.as_deref())?;
    let email = clean_email(form.email.as_deref())?;
    let password = form.password.unwrap_or_default();
    check_password(&password)?;
    let role = parse_role(form.role.as_deref())?;
    ensure_unique(&***store, &username, &email)?;

    let password_hash = auth::hash_password(&password)?;
    let id = store.user_create(&NewUser {
        username: &username,
        email: &email,
        password_hash: &password_hash,
        role,
        email_verified: true,
    })?;
    log::info!("[users] {} created {} as {}", admin.user.username, username, role);

    let user = store.user_get_by_id(id).ok_or(ApiError::NotFound("User"))?;
    Ok(Json(json!({"success": true, "user": user.safe_json()})))
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: Option<String>,
}

#[put("/users/<id>/role", data = "<body>")]
pub fn update_user_role(
    admin: AdminUser,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    id: i64,
    body: Result<Json<RoleChange>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    if id == admin.user.id {
        return Err(ApiError::Validation("You cannot change your own role".into()));
    }
    store.user_get_by_id(id).ok_or(ApiError::NotFound("User"))?;
    let role = parse_role(json_body(body)?.role.as_deref())?;
    store.user_update_role(id, role)?;
    log::info!("[users] {} set user {} to {}", admin.user.username, id, role);

    let user = store.user_get_by_id(id).ok_or(ApiError::NotFound("User"))?;
    Ok(Json(json!({"success": true, "user": user.safe_json()})))
}

#[delete("/users/<id>")]
pub fn delete_user(
    admin: AdminUser,
    _csrf: CsrfGuard,
    store: &State<Arc<dyn Store>>,
    id: i64,
) -> ApiResult<Json<Value>> {
    if id == admin.user.id {
        return Err(ApiError::Validation("You cannot delete your own account".into()));
    }
    let user = store.user_get_by_id(id).ok_or(ApiError::NotFound("User"))?;
    store.user_delete(id)?;
    log::info!("[users] {} deleted {}", admin.user.username, user.username);
    Ok(Json(json!({"success": true})))
}

// ── MDX preview ────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub content: String,
}

/// Compile without storing anything.
#[post("/mdx/compile", data = "<body>")]
pub fn compile_preview(
    _author: PostAuthor,
    compiler: &State<MdxCompiler>,
    body: Result<Json<CompileRequest>, JsonError<'_>>,
) -> ApiResult<Json<Value>> {
    let request = json_body(body)?;
    let compiled = compiler.compile(&request.content)?;
    Ok(Json(json!({"success": true, "compiled": compiled})))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        list_posts,
        get_post,
        create_post,
        update_post,
        update_post_status,
        delete_post,
        get_permissions,
        replace_permissions,
        permissions_post,
        permissions_delete,
        permissions_patch,
        list_tags,
        create_tag,
        update_tag,
        delete_tag,
        delete_zero_tags,
        delete_zero_tags_get,
        delete_zero_tags_post,
        delete_zero_tags_put,
        delete_zero_tags_patch,
        list_categories,
        create_category,
        update_category,
        delete_category,
        delete_zero_categories,
        delete_zero_categories_get,
        delete_zero_categories_post,
        delete_zero_categories_put,
        delete_zero_categories_patch,
        list_users,
        create_user,
        update_user_role,
        delete_user,
        compile_preview,
    ]
}
