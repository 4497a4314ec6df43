use shared::error::{ApiException, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is empty")]
    Empty,
    #[error("message is too long: {actual} characters (max {max})")]
    TooLong { max: usize, actual: usize },
    #[error("{kind} message is missing required field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("invalid url for {kind} message: {url}")]
    InvalidUrl { kind: &'static str, url: String },
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),
    #[error("no conversation is open")]
    NoConversationOpen,
    #[error("message could not be delivered: {0}")]
    Transport(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,
    #[error("invalid channel url: {0}")]
    InvalidUrl(String),
    #[error("failed to connect channel: {0}")]
    Connect(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Transport,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    LoadConversations,
    LoadHistory,
    SendMessage,
    MarkRead,
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    category: ErrorCategory,
    context: ErrorContext,
    message: String,
}

impl SessionError {
    pub fn new(context: ErrorContext, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            context,
            message: message.into(),
        }
    }

    pub fn from_send_error(err: &SendError) -> Self {
        let category = match err {
            SendError::Validation(_) | SendError::NoConversationOpen => ErrorCategory::Validation,
            SendError::Transport(source) => classify(source),
        };
        Self::new(ErrorContext::SendMessage, category, err.to_string())
    }

    pub fn from_anyhow(context: ErrorContext, err: &anyhow::Error) -> Self {
        Self::new(context, classify(err), format!("{err:#}"))
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn context(&self) -> ErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

fn classify(err: &anyhow::Error) -> ErrorCategory {
    if let Some(api) = err.downcast_ref::<ApiException>() {
        return match api.code {
            ErrorCode::Validation => ErrorCategory::Validation,
            ErrorCode::RateLimited | ErrorCode::Internal => ErrorCategory::Transport,
            _ => ErrorCategory::Unknown,
        };
    }
    if err.downcast_ref::<reqwest::Error>().is_some() {
        return ErrorCategory::Transport;
    }

    let lower = format!("{err:#}").to_ascii_lowercase();
    if lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("unavailable")
    {
        ErrorCategory::Transport
    } else {
        ErrorCategory::Unknown
    }
}
