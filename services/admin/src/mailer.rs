//! Outgoing mail capability
//!
//! The core never talks to a mail transport directly. Flows hand messages
//! to a [`Mailer`] through [`dispatch`], which sends in the background: the
//! caller does not wait for delivery and a failed send is only logged.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Something that can deliver a plain-text message
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Mailer that writes messages to the log instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to, subject, body_len = body.len(), "Email dispatched to log mailer");
        Ok(())
    }
}

/// Fire-and-forget delivery
pub fn dispatch(mailer: Arc<dyn Mailer>, to: String, subject: String, body: String) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&to, &subject, &body).await {
            warn!("Failed to send email '{}' to {}: {}", subject, to, e);
        }
    });
}
