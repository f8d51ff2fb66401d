//! Outbound mail over a Resend-style HTTP API.
//!
//! The client sends exactly once; pacing and the single rate-limit retry live
//! in the orchestration layer.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use prox_core::{Deal, User};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render;

const DEFAULT_API_URL: &str = "https://api.resend.com/emails";
const DEFAULT_FROM: &str = "noreply@prox.com";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail API rate limited: {message}")]
    RateLimited { message: String },
    #[error("mail API rejected the message: {message}")]
    Rejected { message: String },
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_key: String,
    pub from: String,
    pub api_url: String,
    pub timeout: Duration,
}

impl MailConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("RESEND_API_KEY")
            .context("RESEND_API_KEY environment variable must be set")?;
        Ok(Self {
            api_key,
            from: std::env::var("FROM_EMAIL").unwrap_or_else(|_| DEFAULT_FROM.to_string()),
            api_url: std::env::var("PROX_MAIL_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            timeout: std::env::var("PROX_MAIL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(20)),
        })
    }
}

/// Wire payload of one digest e-mail.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends one message and returns the provider's message id.
    async fn send(&self, message: &OutboundEmail) -> Result<String, MailError>;
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: Option<String>,
}

pub struct ResendMailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl ResendMailer {
    pub fn new(config: MailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building mail HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn from_address(&self) -> &str {
        &self.config.from
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &OutboundEmail) -> Result<String, MailError> {
        tracing::debug!(to = %message.to, subject = %message.subject, "posting digest email");
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS || body.contains("Too many requests") {
                return Err(MailError::RateLimited { message: body });
            }
            return Err(MailError::Rejected {
                message: format!("{status}: {body}"),
            });
        }

        let parsed: SendResponse = response.json().await?;
        Ok(parsed.id.unwrap_or_default())
    }
}

/// Assembles the weekly digest for one subscriber.
///
/// Returns `None` when there are no deals to show; an empty digest is never
/// sent.
pub fn build_weekly_email(
    from: &str,
    user: &User,
    deals: &[Deal],
) -> Result<Option<OutboundEmail>, askama::Error> {
    if deals.is_empty() {
        return Ok(None);
    }
    Ok(Some(OutboundEmail {
        from: from.to_string(),
        to: user.email.clone(),
        subject: render::subject(deals.len()),
        html: render::render_weekly_html(&user.name, deals)?,
        text: render::render_weekly_text(&user.name, deals)?,
    }))
}
