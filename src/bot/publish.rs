//! Outbound messages to Discord channels.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::ChannelId;
use crate::present::Embed;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Invalid bot token")]
    InvalidToken,
}

/// Body of `POST /channels/{id}/messages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl OutgoingMessage {
    /// An embed, optionally pinging `@everyone`.
    pub fn stats(embed: Embed, mention_everyone: bool) -> Self {
        Self {
            content: mention_everyone.then(|| "@everyone".to_string()),
            embeds: vec![embed],
        }
    }
}

/// Delivers messages to channels.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        channel_id: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<(), PublishError>;
}

/// Posts through the Discord REST API with a bot token.
pub struct DiscordPublisher {
    client: Client,
    api_base: String,
}

impl DiscordPublisher {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, PublishError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|_| PublishError::InvalidToken)?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn messages_url(&self, channel_id: ChannelId) -> String {
        format!("{}/channels/{}/messages", self.api_base, channel_id)
    }
}

#[async_trait]
impl Publisher for DiscordPublisher {
    async fn publish(
        &self,
        channel_id: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<(), PublishError> {
        let url = self.messages_url(channel_id);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(message).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        Ok(())
    }
}
