use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Statically rendered route families and their path templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteGroup {
    Home,
    Article(String),
    Category(String),
    Tag(String),
    Sitemap,
    Feed,
}

impl RouteGroup {
    pub fn template(&self) -> &'static str {
        match self {
            RouteGroup::Home => "/",
            RouteGroup::Article(_) => "/posts/{slug}",
            RouteGroup::Category(_) => "/category/{slug}",
            RouteGroup::Tag(_) => "/tag/{slug}",
            RouteGroup::Sitemap => "/sitemap.xml",
            RouteGroup::Feed => "/feed",
        }
    }

    pub fn path(&self) -> String {
        match self {
            RouteGroup::Home | RouteGroup::Sitemap | RouteGroup::Feed => {
                self.template().to_string()
            }
            RouteGroup::Article(slug) | RouteGroup::Category(slug) | RouteGroup::Tag(slug) => {
                self.template().replace("{slug}", slug)
            }
        }
    }
}

/// Public-facing routes a post appears on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostRoutes {
    pub slug: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

impl PostRoutes {
    fn push_groups(&self, out: &mut Vec<RouteGroup>) {
        out.push(RouteGroup::Article(self.slug.clone()));
        if let Some(category) = &self.category {
            out.push(RouteGroup::Category(category.clone()));
        }
        out.extend(self.tags.iter().cloned().map(RouteGroup::Tag));
    }
}

/// A committed content mutation that stales cached pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    PostCreated(PostRoutes),
    /// `before` covers the old slug and any taxonomy the post left.
    PostUpdated { before: PostRoutes, after: PostRoutes },
    PostDeleted(PostRoutes),
    PermissionsChanged { slug: String },
    TagUpdated { slug: String, previous_slug: String },
    TagDeleted { slug: String },
    TagsPruned { slugs: Vec<String> },
    CategoryUpdated { slug: String, previous_slug: String },
    CategoryDeleted { slug: String },
    CategoriesPruned { slugs: Vec<String> },
}

impl MutationEvent {
    pub fn groups(&self) -> Vec<RouteGroup> {
        let mut groups = Vec::new();
        match self {
            MutationEvent::PostCreated(routes) | MutationEvent::PostDeleted(routes) => {
                groups.push(RouteGroup::Home);
                routes.push_groups(&mut groups);
                groups.push(RouteGroup::Sitemap);
                groups.push(RouteGroup::Feed);
            }
            MutationEvent::PostUpdated { before, after } => {
                groups.push(RouteGroup::Home);
                after.push_groups(&mut groups);
                before.push_groups(&mut groups);
                groups.push(RouteGroup::Sitemap);
                groups.push(RouteGroup::Feed);
            }
            MutationEvent::PermissionsChanged { slug } => {
                groups.push(RouteGroup::Article(slug.clone()));
            }
            MutationEvent::TagUpdated {
                slug,
                previous_slug,
            } => {
                groups.push(RouteGroup::Tag(previous_slug.clone()));
                groups.push(RouteGroup::Tag(slug.clone()));
                groups.push(RouteGroup::Home);
            }
            MutationEvent::TagDeleted { slug } => {
                groups.push(RouteGroup::Tag(slug.clone()));
                groups.push(RouteGroup::Home);
            }
            MutationEvent::TagsPruned { slugs } => {
                groups.extend(slugs.iter().cloned().map(RouteGroup::Tag));
            }
            MutationEvent::CategoryUpdated {
                slug,
                previous_slug,
            } => {
                groups.push(RouteGroup::Category(previous_slug.clone()));
                groups.push(RouteGroup::Category(slug.clone()));
                groups.push(RouteGroup::Home);
            }
            MutationEvent::CategoryDeleted { slug } => {
                groups.push(RouteGroup::Category(slug.clone()));
                groups.push(RouteGroup::Home);
            }
            MutationEvent::CategoriesPruned { slugs } => {
                groups.extend(slugs.iter().cloned().map(RouteGroup::Category));
            }
        }
        groups
    }

    /// Affected paths, first-seen order, no duplicates.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for group in self.groups() {
            let path = group.path();
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}

/// A target that can drop a cached rendering of one path.
#[rocket::async_trait]
pub trait Invalidator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether repeat calls for a path inside the debounce window are skipped.
    fn debounced(&self) -> bool {
        true
    }

    async fn invalidate(&self, path: &str) -> Result<(), String>;
}

/// POSTs `{"path": ..}` to a hosting layer's revalidation hook.
pub struct WebhookInvalidator {
    url: String,
    secret: Option<String>,
    client: reqwest::Client,
}

impl WebhookInvalidator {
    pub fn new(url: String, secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            url,
            secret,
            client,
        }
    }
}

#[rocket::async_trait]
impl Invalidator for WebhookInvalidator {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn invalidate(&self, path: &str) -> Result<(), String> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "path": path }));
        if let Some(secret) = &self.secret {
            request = request.header("x-revalidate-secret", secret);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("hook answered {}", response.status()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevalidationReport {
    pub revalidated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl RevalidationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fans each affected path out to every registered invalidator.
///
/// Failures are logged and left unmarked so the next trigger retries them;
/// the committed mutation is never rolled back.
pub struct RevalidationDispatcher {
    invalidators: Vec<Arc<dyn Invalidator>>,
    debounce: Duration,
    recent: Mutex<HashMap<String, Instant>>,
}

impl RevalidationDispatcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            invalidators: Vec::new(),
            debounce,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn Invalidator>) -> Self {
        self.invalidators.push(invalidator);
        self
    }

    fn recent(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.recent.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn recently_done(&self, path: &str) -> bool {
        self.recent()
            .get(path)
            .map_or(false, |at| at.elapsed() < self.debounce)
    }

    pub async fn dispatch(&self, event: &MutationEvent) -> RevalidationReport {
        self.dispatch_paths(&event.paths()).await
    }

    pub async fn dispatch_paths(&self, paths: &[String]) -> RevalidationReport {
        let mut report = RevalidationReport::default();

        for path in paths {
            let skip_debounced = self.recently_done(path);
            let mut ok = true;

            for invalidator in &self.invalidators {
                if skip_debounced && invalidator.debounced() {
                    continue;
                }
                if let Err(e) = invalidator.invalidate(path).await {
                    log::warn!(
                        "[revalidate] {} failed for {}: {}",
                        invalidator.name(),
                        path,
                        e
                    );
                    ok = false;
                }
            }

            if !ok {
                report.failed.push(path.clone());
            } else if skip_debounced {
                report.skipped.push(path.clone());
            } else {
                self.recent().insert(path.clone(), Instant::now());
                report.revalidated.push(path.clone());
            }
        }

        if !report.revalidated.is_empty() {
            log::info!(
                "[revalidate] {} revalidated, {} skipped",
                report.revalidated.len(),
                report.skipped.len()
            );
        }
        report
    }

    /// Forget debounce marks older than the window.
    pub fn prune(&self) -> usize {
        let debounce = self.debounce;
        let mut recent = self.recent();
        let before = recent.len();
        recent.retain(|_, at| at.elapsed() < debounce);
        before - recent.len()
    }
}
