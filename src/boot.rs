use log::{error, info, warn};
use std::fs;
use std::path::Path;

use crate::config::AppConfig;

/// Startup checks run before Rocket launches. Returns `Err` when the
/// database location cannot be prepared; everything else only warns.
pub fn run(config: &AppConfig) -> Result<(), String> {
    info!("Boot check starting...");

    let mut warnings = 0u32;

    // ── 1. Database directory writable ──────────────────
    if let Some(dir) = Path::new(&config.database_path).parent() {
        if !dir.as_os_str().is_empty() {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    error!("  FAILED to create database directory {}: {}", dir.display(), e);
                    e.to_string()
                })?;
                info!("  Created directory: {}", dir.display());
            }
            let test_file = dir.join(".write_test");
            match fs::write(&test_file, "test") {
                Ok(_) => {
                    let _ = fs::remove_file(&test_file);
                }
                Err(e) => {
                    error!("  Database directory not writable: {}", e);
                    return Err(format!("database directory not writable: {}", e));
                }
            }
        }
    }

    // ── 2. Outbound mail ────────────────────────────────
    if config.mail.is_none() {
        warn!("  SMTP_HOST/SMTP_USERNAME not set; verification and reset emails will not be sent");
        warnings += 1;
    }

    // ── 3. Admin CSRF token ─────────────────────────────
    if config.csrf_token.is_none() {
        warn!("  CSRF_TOKEN not set; admin writes rely on the session cookie alone");
        warnings += 1;
    }

    // ── 4. Revalidation hook ────────────────────────────
    if config.revalidate_webhook_url.is_some() && config.revalidate_secret.is_none() {
        warn!("  REVALIDATE_WEBHOOK_URL set without REVALIDATE_SECRET");
        warnings += 1;
    }

    // ── 5. Rocket.toml exists ───────────────────────────
    if !Path::new("Rocket.toml").exists() {
        warn!("  Rocket.toml not found; using defaults and ROCKET_* variables");
        warnings += 1;
    }

    if warnings > 0 {
        warn!(
            "Boot check passed with {} warning(s). Some features may not work correctly.",
            warnings
        );
    } else {
        info!("Boot check passed.");
    }
    Ok(())
}
