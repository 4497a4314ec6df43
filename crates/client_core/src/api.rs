use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::{ConversationId, UserId},
    error::{ApiError, ApiException},
    protocol::{Conversation, Message, OutgoingMessage},
};
use tracing::debug;

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;
    async fn fetch_history(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;
    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()>;
    /// Persists the message and returns it with the server-assigned id.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<Message>;
}

pub struct MissingChatApi;

#[async_trait]
impl ChatApi for MissingChatApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        Err(anyhow!("chat api is not configured"))
    }

    async fn fetch_history(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        Err(anyhow!(
            "chat api is not configured; cannot load history for {conversation_id}"
        ))
    }

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()> {
        Err(anyhow!(
            "chat api is not configured; cannot mark {conversation_id} read"
        ))
    }

    async fn send_message(&self, _message: &OutgoingMessage) -> Result<Message> {
        Err(anyhow!("chat api is not configured; cannot send message"))
    }
}

pub struct HttpChatApi {
    http: Client,
    server_url: String,
    user_id: UserId,
}

impl HttpChatApi {
    pub fn new(server_url: impl Into<String>, user_id: UserId) -> Self {
        Self::with_client(Client::new(), server_url, user_id)
    }

    pub fn with_client(http: Client, server_url: impl Into<String>, user_id: UserId) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            server_url,
            user_id,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let response = self
            .http
            .get(format!("{}/conversations", self.server_url))
            .query(&[("user_id", self.user_id.as_str())])
            .send()
            .await
            .context("failed to request conversation list")?;
        let conversations: Vec<Conversation> = check_status(response)
            .await?
            .json()
            .await
            .context("failed to decode conversation list")?;
        debug!(count = conversations.len(), "api: loaded conversations");
        Ok(conversations)
    }

    async fn fetch_history(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let response = self
            .http
            .get(format!(
                "{}/conversations/{}/messages",
                self.server_url, conversation_id
            ))
            .query(&[("user_id", self.user_id.as_str())])
            .send()
            .await
            .with_context(|| format!("failed to request history for {conversation_id}"))?;
        let messages: Vec<Message> = check_status(response)
            .await?
            .json()
            .await
            .context("failed to decode message history")?;
        debug!(
            conversation_id = %conversation_id,
            count = messages.len(),
            "api: loaded history"
        );
        Ok(messages)
    }

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()> {
        let response = self
            .http
            .post(format!(
                "{}/conversations/{}/read",
                self.server_url, conversation_id
            ))
            .query(&[("user_id", self.user_id.as_str())])
            .send()
            .await
            .with_context(|| format!("failed to mark {conversation_id} read"))?;
        check_status(response).await?;
        Ok(())
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<Message> {
        let response = self
            .http
            .post(format!("{}/messages", self.server_url))
            .query(&[("user_id", self.user_id.as_str())])
            .json(message)
            .send()
            .await
            .context("failed to send message")?;
        let persisted: Message = check_status(response)
            .await?
            .json()
            .await
            .context("failed to decode persisted message")?;
        Ok(persisted)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(ApiException::from(api_error).into()),
        Err(_) => Err(anyhow!("request failed with status {status}")),
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
