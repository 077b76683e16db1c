use std::sync::Arc;

use anyhow::Context;
use axum::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::MailConfig;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound email delivery. Errors must propagate to the caller.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Posts messages as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(client: reqwest::Client, url: String, api_key: Option<String>, from: String) -> Self {
        Self {
            client,
            url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailDispatcher for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let payload = RelayPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.body,
        };
        let mut req = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .context("mail relay request")?
            .error_for_status()
            .context("mail relay rejected message")?;
        info!(to = %message.to, subject = %message.subject, "email sent");
        Ok(())
    }
}

/// Development dispatcher: logs the message instead of sending it.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailDispatcher for LogMailer {
    async fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "email not sent, MAIL_API_URL unset"
        );
        Ok(())
    }
}

pub fn from_config(client: reqwest::Client, cfg: &MailConfig) -> Arc<dyn EmailDispatcher> {
    match &cfg.api_url {
        Some(url) => Arc::new(HttpMailer::new(
            client,
            url.clone(),
            cfg.api_key.clone(),
            cfg.from.clone(),
        )),
        None => Arc::new(LogMailer),
    }
}
