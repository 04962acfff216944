use chrono::Utc;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::tokio;
use rocket::{Orbit, Rocket};
use std::sync::Arc;
use std::time::Duration;

use crate::page_cache::PageCache;
use crate::rate_limit::{RateLimiter, RatePolicy};
use crate::revalidate::RevalidationDispatcher;
use crate::store::Store;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);
const TOKEN_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct BackgroundTasks;

#[rocket::async_trait]
impl Fairing for BackgroundTasks {
    fn info(&self) -> Info {
        Info {
            name: "Background Tasks",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let store = match rocket.state::<Arc<dyn Store>>() {
            Some(s) => Arc::clone(s),
            None => {
                log::error!("[task] Store not in managed state; background tasks disabled");
                return;
            }
        };

        // Session cleanup task
        let s = Arc::clone(&store);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SESSION_CLEANUP_INTERVAL).await;
                match s.session_cleanup_expired(Utc::now().naive_utc()) {
                    Ok(count) => {
                        if count > 0 {
                            log::info!("[task] Cleaned up {} expired sessions", count);
                        }
                    }
                    Err(e) => log::error!("[task] Session cleanup failed: {}", e),
                }
            }
        });

        // Expired verification/reset token cleanup task
        let s = Arc::clone(&store);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(TOKEN_CLEANUP_INTERVAL).await;
                match s.user_clear_expired_tokens(Utc::now().naive_utc()) {
                    Ok(count) => {
                        if count > 0 {
                            log::info!("[task] Cleared {} expired account tokens", count);
                        }
                    }
                    Err(e) => log::error!("[task] Token cleanup failed: {}", e),
                }
            }
        });

        // In-memory sweep: rate-limit windows, expired pages, debounce marks
        let limiter = rocket.state::<Arc<RateLimiter>>().cloned();
        let cache = rocket.state::<Arc<PageCache>>().cloned();
        let dispatcher = rocket.state::<Arc<RevalidationDispatcher>>().cloned();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(MEMORY_SWEEP_INTERVAL).await;
                let keys = limiter
                    .as_ref()
                    .map_or(0, |l| l.cleanup(RatePolicy::MAX_WINDOW));
                let pages = cache.as_ref().map_or(0, |c| c.purge_expired());
                let marks = dispatcher.as_ref().map_or(0, |d| d.prune());
                if keys + pages + marks > 0 {
                    log::info!(
                        "[task] Swept {} rate-limit keys, {} cached pages, {} revalidation marks",
                        keys,
                        pages,
                        marks
                    );
                }
            }
        });

        log::info!("[task] Background tasks started");
    }
}
