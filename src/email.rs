use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{AppConfig, MailConfig};
use crate::security::tokens::{RESET_TTL_HOURS, VERIFICATION_TTL_HOURS};

/// A rendered message ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound mail. Callers treat failures as non-fatal.
#[rocket::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), String>;
}

/// STARTTLS relay with username/password credentials.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, String> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| format!("SMTP relay error: {}", e))?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[rocket::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), String> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| format!("Invalid from address: {}", e))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| format!("Invalid to address: {}", e))?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| format!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| format!("SMTP send error: {}", e))?;
        log::info!("[email] sent '{}' to {}", email.subject, email.to);
        Ok(())
    }
}

/// Used when no SMTP host is configured; every send reports failure.
pub struct DisabledMailer;

#[rocket::async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), String> {
        log::warn!(
            "[email] no transport configured, dropping '{}' to {}",
            email.subject,
            email.to
        );
        Err("mail transport not configured".into())
    }
}

/// Build the mailer `config` asks for, falling back to `DisabledMailer`.
pub fn from_config(config: &AppConfig) -> Box<dyn Mailer> {
    match &config.mail {
        Some(mail) => match SmtpMailer::new(mail) {
            Ok(m) => Box::new(m),
            Err(e) => {
                log::error!("[email] {}", e);
                Box::new(DisabledMailer)
            }
        },
        None => Box::new(DisabledMailer),
    }
}

/// Send and swallow the error. Returns whether the message went out.
pub async fn send_soft(mailer: &dyn Mailer, email: &OutgoingEmail) -> bool {
    match mailer.send(email).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("[email] failed to send '{}' to {}: {}", email.subject, email.to, e);
            false
        }
    }
}

// ── Templates ──

pub fn verification_email(config: &AppConfig, to: &str, username: &str, token: &str) -> OutgoingEmail {
    let link = config.absolute_url(&format!("/account/verify?token={}", token));
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Confirm your email for {}", config.site.name),
        body: format!(
            "Hi {},\n\n\
             Confirm your email address by opening the link below:\n\n{}\n\n\
             The link expires in {} hours. If you did not sign up, ignore this message.\n\n\
             - {}\n",
            username, link, VERIFICATION_TTL_HOURS, config.site.name
        ),
    }
}

pub fn password_reset_email(config: &AppConfig, to: &str, token: &str) -> OutgoingEmail {
    let link = config.absolute_url(&format!("/account/reset?token={}", token));
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Reset your {} password", config.site.name),
        body: format!(
            "A password reset was requested for this address.\n\n\
             Choose a new password here:\n\n{}\n\n\
             The link expires in {} hour and works once. \
             If you did not ask for this, ignore this message.\n\n\
             - {}\n",
            link, RESET_TTL_HOURS, config.site.name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "PUBLIC_BASE_URL" => Some("https://blog.example.com/".into()),
            _ => None,
        })
    }

    #[test]
    fn verification_link_is_absolute() {
        let email = verification_email(&config(), "ann@example.com", "ann", "abc123");
        assert_eq!(email.to, "ann@example.com");
        assert!(email
            .body
            .contains("https://blog.example.com/account/verify?token=abc123"));
        assert!(email.body.contains("24 hours"));
    }

    #[test]
    fn reset_link_is_absolute() {
        let email = password_reset_email(&config(), "ann@example.com", "tok");
        assert!(email
            .body
            .contains("https://blog.example.com/account/reset?token=tok"));
    }

    #[rocket::async_test]
    async fn disabled_mailer_reports_not_sent() {
        let email = password_reset_email(&config(), "a@b.c", "t");
        assert!(!send_soft(&DisabledMailer, &email).await);
    }
}
