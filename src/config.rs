//! Process configuration loaded from environment variables.

use std::env;
use std::time::Duration;

/// Which preset site configuration to run with (`SITE_TYPE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteType {
    Personal,
    Publication,
}

impl SiteType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "personal" | "blog" => Some(SiteType::Personal),
            "publication" | "magazine" => Some(SiteType::Publication),
            _ => None,
        }
    }
}

/// A fixed page listed in the sitemap regardless of content.
#[derive(Debug, Clone)]
pub struct StaticPage {
    pub path: &'static str,
    pub change_frequency: &'static str,
    pub priority: f32,
}

#[derive(Debug, Clone)]
pub struct SitePreset {
    pub site_type: SiteType,
    pub name: String,
    pub tagline: String,
    pub posts_per_page: i64,
    pub show_author: bool,
    pub static_pages: Vec<StaticPage>,
}

impl SitePreset {
    pub fn for_type(site_type: SiteType) -> Self {
        match site_type {
            SiteType::Personal => SitePreset {
                site_type,
                name: "Notebook".to_string(),
                tagline: "Notes, essays and experiments".to_string(),
                posts_per_page: 10,
                show_author: false,
                static_pages: vec![
                    StaticPage { path: "/", change_frequency: "daily", priority: 1.0 },
                    StaticPage { path: "/feed", change_frequency: "daily", priority: 0.5 },
                ],
            },
            SiteType::Publication => SitePreset {
                site_type,
                name: "The Quill".to_string(),
                tagline: "Stories from the team".to_string(),
                posts_per_page: 20,
                show_author: true,
                static_pages: vec![
                    StaticPage { path: "/", change_frequency: "hourly", priority: 1.0 },
                    StaticPage { path: "/feed", change_frequency: "hourly", priority: 0.6 },
                ],
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub db_max_connections: u32,
    pub public_base_url: String,
    pub csrf_token: Option<String>,
    pub mail: Option<MailConfig>,
    pub site: SitePreset,
    pub revalidate_webhook_url: Option<String>,
    pub revalidate_secret: Option<String>,
    pub revalidate_debounce: Duration,
    pub page_cache_ttl: Duration,
    /// Zero disables per-IP view dedupe.
    pub view_dedupe_window: Duration,
    pub session_ttl_hours: i64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` wraps this; tests feed maps.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let num = |key: &str, default: u64| -> u64 {
            get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };

        let database_path = get("DATABASE_URL")
            .map(|url| strip_sqlite_scheme(&url))
            .unwrap_or_else(|| "data/blog.db".to_string());

        let site_type = match get("SITE_TYPE") {
            Some(raw) => SiteType::parse(&raw).unwrap_or_else(|| {
                log::warn!("Unknown SITE_TYPE '{}', falling back to personal", raw);
                SiteType::Personal
            }),
            None => SiteType::Personal,
        };

        let mail = match (get("SMTP_HOST"), get("SMTP_USERNAME")) {
            (Some(host), Some(username)) => Some(MailConfig {
                port: get("SMTP_PORT").and_then(|p| p.parse().ok()).unwrap_or(587),
                password: get("SMTP_PASSWORD").unwrap_or_default(),
                from: get("MAIL_FROM").unwrap_or_else(|| username.clone()),
                host,
                username,
            }),
            _ => None,
        };

        let public_base_url = get("PUBLIC_BASE_URL")
            .filter(|u| url::Url::parse(u).is_ok())
            .unwrap_or_else(|| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();

        AppConfig {
            database_path,
            db_max_connections: num("DB_MAX_CONNECTIONS", 10).max(1) as u32,
            public_base_url,
            csrf_token: get("CSRF_TOKEN"),
            mail,
            site: SitePreset::for_type(site_type),
            revalidate_webhook_url: get("REVALIDATE_WEBHOOK_URL"),
            revalidate_secret: get("REVALIDATE_SECRET"),
            revalidate_debounce: Duration::from_secs(num("REVALIDATE_DEBOUNCE_SECS", 5)),
            page_cache_ttl: Duration::from_secs(num("PAGE_CACHE_TTL_SECS", 3600)),
            view_dedupe_window: Duration::from_secs(num("VIEW_DEDUPE_WINDOW_SECS", 0)),
            session_ttl_hours: num("SESSION_TTL_HOURS", 24).max(1) as i64,
        }
    }

    /// Absolute URL for a site path.
    pub fn absolute_url(&self, path: &str) -> String {
        if path == "/" {
            format!("{}/", self.public_base_url)
        } else {
            format!("{}/{}", self.public_base_url, path.trim_start_matches('/'))
        }
    }
}

fn strip_sqlite_scheme(url: &str) -> String {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_env_empty() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.database_path, "data/blog.db");
        assert_eq!(cfg.public_base_url, "http://localhost:8000");
        assert_eq!(cfg.site.site_type, SiteType::Personal);
        assert!(cfg.mail.is_none());
        assert!(cfg.csrf_token.is_none());
        assert_eq!(cfg.view_dedupe_window, Duration::ZERO);
    }

    #[test]
    fn sqlite_scheme_is_stripped() {
        let cfg = config_from(&[("DATABASE_URL", "sqlite://var/site.db")]);
        assert_eq!(cfg.database_path, "var/site.db");
    }

    #[test]
    fn site_type_selects_preset() {
        let cfg = config_from(&[("SITE_TYPE", "publication")]);
        assert_eq!(cfg.site.site_type, SiteType::Publication);
        assert!(cfg.site.show_author);

        let cfg = config_from(&[("SITE_TYPE", "nonsense")]);
        assert_eq!(cfg.site.site_type, SiteType::Personal);
    }

    #[test]
    fn mail_requires_host_and_username() {
        let cfg = config_from(&[("SMTP_HOST", "smtp.example.com")]);
        assert!(cfg.mail.is_none());

        let cfg = config_from(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "bot@example.com"),
            ("SMTP_PORT", "2525"),
        ]);
        let mail = cfg.mail.unwrap();
        assert_eq!(mail.port, 2525);
        assert_eq!(mail.from, "bot@example.com");
    }

    #[test]
    fn absolute_url_joins_without_double_slash() {
        let cfg = config_from(&[("PUBLIC_BASE_URL", "https://blog.example.com/")]);
        assert_eq!(cfg.absolute_url("/"), "https://blog.example.com/");
        assert_eq!(cfg.absolute_url("/posts/a"), "https://blog.example.com/posts/a");
    }

    #[test]
    fn invalid_base_url_falls_back() {
        let cfg = config_from(&[("PUBLIC_BASE_URL", "not a url")]);
        assert_eq!(cfg.public_base_url, "http://localhost:8000");
    }
}
