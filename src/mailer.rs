use async_trait::async_trait;
use lettre::{
    message::SinglePart, transport::smtp::authentication::Credentials, Message, SmtpTransport,
    Transport,
};
use tracing::debug;

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_html(&self, to: &str, subject: &str, html: String) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    relay: String,
    username: String,
    password: String,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Self {
        Self {
            relay: cfg.relay.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            from: cfg.from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_html(&self, to: &str, subject: &str, html: String) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .singlepart(SinglePart::html(html))?;

        let creds = Credentials::new(self.username.clone(), self.password.clone());
        let relay = self.relay.clone();

        // lettre's SMTP transport is synchronous; keep it off the runtime.
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mailer = SmtpTransport::relay(&relay)?.credentials(creds).build();
            mailer.send(&email)?;
            Ok(())
        })
        .await??;

        debug!(%to, %subject, "email sent");
        Ok(())
    }
}

/// Subject and HTML body of the account verification email.
pub fn verification_email(base_url: &str, token: &str) -> (String, String) {
    let link = format!(
        "{}/api/v1/auth/verify/{}",
        base_url.trim_end_matches('/'),
        token
    );
    (
        "Verify email".to_string(),
        format!(r#"<a target="_blank" href="{link}">Click to verify email</a>"#),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_email_links_to_the_token() {
        let (subject, html) = verification_email("http://localhost:8080", "tok123");
        assert_eq!(subject, "Verify email");
        assert!(html.contains("http://localhost:8080/api/v1/auth/verify/tok123"));
    }

    #[test]
    fn verification_email_tolerates_trailing_slash() {
        let (_, html) = verification_email("https://plateful.app/", "abc");
        assert!(html.contains("https://plateful.app/api/v1/auth/verify/abc"));
        assert!(!html.contains("app//api"));
    }
}
