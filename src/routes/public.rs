use std::sync::Arc;

use chrono::Utc;
use rocket::form::{Form, FromForm};
use rocket::http::Status;
use rocket::response::content::{RawHtml, RawXml};
use rocket::State;

use super::{page_number, page_offset};
use crate::config::AppConfig;
use crate::mdx::{CompiledMdx, MdxCompiler};
use crate::models::post::{Post, PostStatus};
use crate::models::user::TokenOutcome;
use crate::page_cache::PageCache;
use crate::render::{self, ArticleView, ListedPost};
use crate::security::auth::{self, ClientIp};
use crate::seo::sitemap;
use crate::store::Store;

fn listed(store: &dyn Store, posts: Vec<Post>) -> Vec<ListedPost> {
    posts
        .into_iter()
        .map(|post| {
            let author = post
                .author_id
                .and_then(|id| store.user_get_by_id(id))
                .map(|u| u.username);
            ListedPost { post, author }
        })
        .collect()
}

fn total_pages(total: i64, per_page: i64) -> i64 {
    ((total + per_page - 1) / per_page).max(1)
}

/// Serve page 1 from the cache when possible; later pages always render.
fn cached_page<F>(cache: &PageCache, path: &str, page: i64, render: F) -> String
where
    F: FnOnce() -> String,
{
    if page == 1 {
        if let Some(html) = cache.get(path) {
            return html;
        }
    }
    let html = render();
    if page == 1 {
        cache.put(path, html.clone());
    }
    html
}

/// Stored artifact, or a fresh compile written back when it is missing.
fn article_artifact(
    store: &dyn Store,
    compiler: &MdxCompiler,
    post: &Post,
) -> Result<CompiledMdx, Status> {
    if let Some(compiled) = post.compiled_artifact() {
        return Ok(compiled);
    }
    let compiled = compiler.compile(&post.content).map_err(|e| {
        log::error!("[mdx] post {} does not compile: {}", post.id, e);
        Status::InternalServerError
    })?;
    match compiled.to_json() {
        Ok(json) => {
            if let Err(e) = store.post_set_compiled(post.id, &json) {
                log::warn!("[mdx] could not store artifact for post {}: {}", post.id, e);
            }
        }
        Err(e) => log::warn!("[mdx] could not serialize artifact: {}", e),
    }
    Ok(compiled)
}

// ── Homepage ───────────────────────────────────────────

#[get("/?<page>")]
pub fn home(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    cache: &State<Arc<PageCache>>,
    page: Option<i64>,
) -> RawHtml<String> {
    let per_page = config.site.posts_per_page.max(1);
    let current_page = page_number(page);

    RawHtml(cached_page(cache, "/", current_page, || {
        let offset = page_offset(current_page, per_page);
        let posts = listed(&***store, store.post_published(per_page, offset));
        let total = store.post_count(Some(PostStatus::Published));
        render::render_home(config, &posts, current_page, total_pages(total, per_page))
    }))
}

// ── Article ────────────────────────────────────────────

#[get("/posts/<slug>")]
pub fn article(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    cache: &State<Arc<PageCache>>,
    compiler: &State<MdxCompiler>,
    client_ip: ClientIp,
    slug: &str,
) -> Result<RawHtml<String>, Status> {
    let post = store.post_find_by_slug(slug).ok_or(Status::NotFound)?;
    if !post.is_published() {
        return Err(Status::NotFound);
    }

    let dedupe = config.view_dedupe_window.as_secs();
    if let Err(e) = store.post_record_view(post.id, &auth::hash_ip(&client_ip.0), dedupe) {
        log::error!("[views] post {}: {}", post.id, e);
    }

    let path = format!("/posts/{}", post.slug);
    if let Some(html) = cache.get(&path) {
        return Ok(RawHtml(html));
    }

    let compiled = article_artifact(&***store, compiler, &post)?;
    let tags = store.tag_for_post(post.id);
    let category = post.category_id.and_then(|id| store.category_find_by_id(id));
    let author = post
        .author_id
        .and_then(|id| store.user_get_by_id(id))
        .map(|u| u.username);

    let html = render::render_article(
        config,
        &ArticleView {
            post: &post,
            compiled: &compiled,
            tags: &tags,
            category: category.as_ref(),
            author: author.as_deref(),
        },
    );
    cache.put(&path, html.clone());
    Ok(RawHtml(html))
}

// ── Taxonomy listings ──────────────────────────────────

#[get("/category/<slug>?<page>")]
pub fn category(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    cache: &State<Arc<PageCache>>,
    slug: &str,
    page: Option<i64>,
) -> Option<RawHtml<String>> {
    let category = store.category_find_by_slug(slug)?;
    let per_page = config.site.posts_per_page.max(1);
    let current_page = page_number(page);
    let path = format!("/category/{}", category.slug);

    Some(RawHtml(cached_page(cache, &path, current_page, || {
        let offset = page_offset(current_page, per_page);
        let posts = listed(&***store, store.post_by_category(category.id, per_page, offset));
        let total = store.post_count_by_category(category.id);
        render::render_category(
            config,
            &category,
            &posts,
            current_page,
            total_pages(total, per_page),
        )
    })))
}

#[get("/tag/<slug>?<page>")]
pub fn tag(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    cache: &State<Arc<PageCache>>,
    slug: &str,
    page: Option<i64>,
) -> Option<RawHtml<String>> {
    let tag = store.tag_find_by_slug(slug)?;
    let per_page = config.site.posts_per_page.max(1);
    let current_page = page_number(page);
    let path = format!("/tag/{}", tag.slug);

    Some(RawHtml(cached_page(cache, &path, current_page, || {
        let offset = page_offset(current_page, per_page);
        let posts = listed(&***store, store.post_by_tag(tag.id, per_page, offset));
        let total = store.post_count_by_tag(tag.id);
        render::render_tag(config, &tag, &posts, current_page, total_pages(total, per_page))
    })))
}

// ── RSS Feed ───────────────────────────────────────────

#[get("/feed")]
pub fn rss_feed(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    cache: &State<Arc<PageCache>>,
) -> RawXml<String> {
    RawXml(cached_page(cache, "/feed", 1, || {
        crate::rss::generate_feed(&***store, config)
    }))
}

// ── Sitemap ────────────────────────────────────────────

#[get("/sitemap.xml")]
pub fn sitemap_xml(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    cache: &State<Arc<PageCache>>,
) -> Result<RawXml<String>, Status> {
    if let Some(xml) = cache.get("/sitemap.xml") {
        return Ok(RawXml(xml));
    }
    let xml = sitemap::generate_sitemap(&***store, config).map_err(|e| {
        log::error!("[sitemap] {}", e);
        Status::InternalServerError
    })?;
    cache.put("/sitemap.xml", xml.clone());
    Ok(RawXml(xml))
}

// ── Robots.txt ─────────────────────────────────────────

#[get("/robots.txt")]
pub fn robots(config: &State<AppConfig>) -> String {
    sitemap::generate_robots(config)
}

// ── Account landing pages ──────────────────────────────

#[get("/account/verify?<token>")]
pub fn verify_page(config: &State<AppConfig>, token: Option<&str>) -> RawHtml<String> {
    RawHtml(render::render_verify_page(config, token.unwrap_or("")))
}

#[get("/account/reset?<token>")]
pub fn reset_page(config: &State<AppConfig>, token: Option<&str>) -> RawHtml<String> {
    RawHtml(render::render_reset_page(config, token.unwrap_or(""), None))
}

#[derive(Debug, FromForm)]
pub struct ResetForm {
    pub token: String,
    pub password: String,
}

/// Non-JS fallback for the reset page form.
#[post("/account/reset", data = "<form>")]
pub fn reset_submit(
    store: &State<Arc<dyn Store>>,
    config: &State<AppConfig>,
    form: Form<ResetForm>,
) -> RawHtml<String> {
    let now = Utc::now().naive_utc();
    let notice = match super::api::apply_password_reset(&***store, &form.token, &form.password, now) {
        Ok(TokenOutcome::Consumed(_)) => "Your password has been changed. You can sign in now.",
        Ok(TokenOutcome::Expired) => "This link has expired. Request a new one.",
        Ok(TokenOutcome::Unknown) => "This link is not valid.",
        Err(e) => {
            log::warn!("[account] reset form rejected: {}", e);
            "The password could not be changed."
        }
    };
    RawHtml(render::render_reset_page(config, "", Some(notice)))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        home,
        article,
        category,
        tag,
        rss_feed,
        sitemap_xml,
        robots,
        verify_page,
        reset_page,
        reset_submit,
    ]
}
