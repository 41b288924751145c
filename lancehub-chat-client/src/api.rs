//! REST API Client
//!
//! The backend surface the chat client consumes, behind the [`ChatApi`]
//! trait so the controller can be driven by a test double. [`RestChatApi`]
//! is the `reqwest` implementation used in production.

use crate::{AuthProvider, ClientConfig, ClientError, Participant, Result};
use async_trait::async_trait;
use lancehub_chat_protocol::{Conversation, Message};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// Backend operations used by the chat client
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Fetch the conversation summaries for the local user
    async fn conversations(&self) -> Result<Vec<Conversation>>;

    /// Fetch the messages of one conversation, ascending by creation time
    ///
    /// The backend marks the thread read as a side effect, which is how
    /// local `mark_read` state syncs opportunistically.
    async fn messages(&self, conversation_id: i64) -> Result<Vec<Message>>;

    /// Resolve a participant profile; `None` when the profile does not exist
    async fn participant(&self, user_id: i64) -> Result<Option<Participant>>;
}

/// `reqwest`-backed implementation of [`ChatApi`]
pub struct RestChatApi {
    http: reqwest::Client,
    api_base: String,
    auth: Arc<dyn AuthProvider>,
}

impl RestChatApi {
    /// Create a client for the configured REST base
    pub fn new(config: &ClientConfig, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base().to_string(),
            auth,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let token = self.auth.bearer_token().await?;
        let url = format!("{}{}", self.api_base, path);
        debug!(%url, "GET");

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthenticated);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ChatApi for RestChatApi {
    async fn conversations(&self) -> Result<Vec<Conversation>> {
        self.get("/api/v1/chat/conversations").await
    }

    async fn messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        self.get(&format!("/api/v1/chat/{conversation_id}/messages"))
            .await
    }

    async fn participant(&self, user_id: i64) -> Result<Option<Participant>> {
        let token = self.auth.bearer_token().await?;
        let url = format!("{}/api/v1/users/{user_id}", self.api_base);
        debug!(%url, "GET");

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthenticated),
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json::<Participant>().await?)),
            s => {
                let message = response.text().await.unwrap_or_default();
                Err(ClientError::Api {
                    status: s.as_u16(),
                    message,
                })
            }
        }
    }
}
