//! Outbound notification: SMTP delivery and the change digest.
//!
//! The digest walks every subscription, collects the subscribed URLs whose
//! stored record is currently flagged most-recent, and sends one email per
//! subscriber listing the changed pages. Delivery failures are logged per
//! subscriber and never abort the rest of the run.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info};

use sitewatch_shared::{Result, SiteWatchError, SmtpConfig};
use sitewatch_storage::Storage;

/// Outbound notification capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SMTP notifier
// ---------------------------------------------------------------------------

/// SMTP-backed notifier using STARTTLS submission.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Build the notifier from config; the password comes from the env var
    /// named in config and is never persisted.
    pub fn new(config: &SmtpConfig, password: String) -> Result<Self> {
        let credentials = Credentials::new(config.username.clone(), password);

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| SiteWatchError::Notify(format!("SMTP relay {}: {e}", config.host)))?
            .port(config.port)
            .credentials(credentials)
            .build();

        let from = config
            .from
            .parse()
            .map_err(|e| SiteWatchError::Notify(format!("invalid from address: {e}")))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for recipient in recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| SiteWatchError::Notify(format!("invalid recipient: {e}")))?;
            builder = builder.to(to);
        }

        let message = builder
            .body(body.to_string())
            .map_err(|e| SiteWatchError::Notify(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| SiteWatchError::Notify(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Change digest
// ---------------------------------------------------------------------------

/// Send each subscriber a digest of their changed pages.
pub async fn send_digest(storage: &Storage, notifier: &dyn Notifier) -> Result<()> {
    let subscriptions = storage.subscriptions().await?;
    info!(count = subscriptions.len(), "running digest");

    for subscription in subscriptions {
        let changed = match storage.most_recent_in(&subscription.urls).await {
            Ok(records) => records,
            Err(error) => {
                error!(%error, email = %subscription.user_email, "digest lookup failed");
                continue;
            }
        };

        if changed.is_empty() {
            debug!(email = %subscription.user_email, "no changed pages, skipping");
            continue;
        }

        let urls: Vec<&str> = changed.iter().map(|r| r.url.as_str()).collect();
        let body = digest_body(&subscription.user_email, &urls);

        if let Err(error) = notifier
            .send(
                std::slice::from_ref(&subscription.user_email),
                "SiteWatch digest",
                &body,
            )
            .await
        {
            error!(%error, email = %subscription.user_email, "failed to send digest");
        }
    }

    Ok(())
}

/// Build the digest body for one subscriber.
fn digest_body(email: &str, urls: &[&str]) -> String {
    format!(
        "Hi {email},\n\nWe have found {} updated page(s) for you:\n\n{}\n",
        urls.len(),
        urls.join("\n")
    )
}
