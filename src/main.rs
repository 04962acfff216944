#[macro_use]
extern crate rocket;

mod boot;
mod config;
mod db;
mod email;
mod error;
mod mdx;
mod models;
mod page_cache;
mod rate_limit;
mod render;
mod revalidate;
mod routes;
mod rss;
mod security;
mod seo;
mod store;
mod tasks;

#[cfg(test)]
mod tests;

use std::process;
use std::sync::Arc;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::response::content::RawHtml;
use rocket::{Build, Request, Rocket};

use config::AppConfig;
use email::Mailer;
use mdx::MdxCompiler;
use page_cache::PageCache;
use rate_limit::RateLimiter;
use revalidate::{RevalidationDispatcher, WebhookInvalidator};
use store::sqlite::SqliteStore;
use store::Store;

/// Keeps browsers and proxies from caching API responses.
pub struct NoCacheApi;

#[rocket::async_trait]
impl Fairing for NoCacheApi {
    fn info(&self) -> Info {
        Info {
            name: "No-Cache API Responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut rocket::Response<'r>) {
        if req.uri().path().starts_with("/api") {
            res.set_header(Header::new(
                "Cache-Control",
                "no-store, no-cache, must-revalidate, max-age=0",
            ));
        }
    }
}

#[catch(404)]
fn not_found(req: &Request) -> RawHtml<String> {
    match req.rocket().state::<AppConfig>() {
        Some(config) => RawHtml(render::render_not_found(config)),
        None => RawHtml(render::render_bare_error(404, "Page not found.")),
    }
}

#[catch(500)]
fn server_error() -> RawHtml<String> {
    RawHtml(render::render_bare_error(500, "Internal server error."))
}

/// Assemble the application around an already-migrated store.
pub fn build_rocket(config: AppConfig, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Rocket<Build> {
    let page_cache = Arc::new(PageCache::new(config.page_cache_ttl));

    let mut dispatcher = RevalidationDispatcher::new(config.revalidate_debounce)
        .with_invalidator(page_cache.clone());
    if let Some(url) = &config.revalidate_webhook_url {
        log::info!("[revalidate] forwarding invalidations to {}", url);
        dispatcher = dispatcher.with_invalidator(Arc::new(WebhookInvalidator::new(
            url.clone(),
            config.revalidate_secret.clone(),
        )));
    }

    rocket::build()
        .manage(store)
        .manage(config)
        .manage(page_cache)
        .manage(Arc::new(dispatcher))
        .manage(mailer)
        .manage(MdxCompiler::new())
        .manage(Arc::new(RateLimiter::new()))
        .attach(NoCacheApi)
        .attach(tasks::BackgroundTasks)
        .mount("/", routes::public::routes())
        .mount("/api", routes::api::routes())
        .mount("/api", routes::admin_api::routes())
        .register("/", catchers![not_found, server_error])
        .register("/api", error::api_catchers())
}

#[launch]
fn rocket() -> _ {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env();
    if let Err(e) = boot::run(&config) {
        log::error!("Boot check FAILED: {}. Aborting.", e);
        process::exit(1);
    }

    let store = match SqliteStore::new_at(&config.database_path, config.db_max_connections) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to open database at {}: {}", config.database_path, e);
            process::exit(1);
        }
    };
    if let Err(e) = store.run_migrations() {
        log::error!("Failed to run database migrations: {}", e);
        process::exit(1);
    }
    log::info!(
        "Serving '{}' from {} (public URL {})",
        config.site.name,
        config.database_path,
        config.public_base_url
    );

    let mailer: Arc<dyn Mailer> = Arc::from(email::from_config(&config));
    build_rocket(config, Arc::new(store), mailer)
}
