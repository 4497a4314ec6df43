use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ConversationId, MessageId, MessageKind, User, UserId, WorkoutId},
    error::ApiError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        body: String,
    },
    WorkoutAssignment {
        workout_id: WorkoutId,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    File {
        url: String,
        filename: String,
        size_bytes: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::WorkoutAssignment { .. } => MessageKind::WorkoutAssignment,
            Self::Image { .. } => MessageKind::Image,
            Self::File { .. } => MessageKind::File,
        }
    }

    /// Short human-readable text used for conversation list previews.
    pub fn preview(&self) -> String {
        match self {
            Self::Text { body } => body.clone(),
            Self::WorkoutAssignment { title, .. } => format!("Workout assigned: {title}"),
            Self::Image { caption, .. } => caption.clone().unwrap_or_else(|| "Image".to_string()),
            Self::File { filename, .. } => filename.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<UserId>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: MessageContent,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "MessageMetadata::is_empty")]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.content.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub sender_id: UserId,
}

impl LastMessage {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: Some(message.id.clone()),
            content: message.content.preview(),
            sent_at: message.created_at,
            sender_id: message.sender_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participant: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub conversation_id: ConversationId,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "MessageMetadata::is_empty")]
    pub metadata: MessageMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientRequest {
    JoinRoom { conversation_id: ConversationId },
    LeaveRoom { conversation_id: ConversationId },
    SendMessage(OutgoingMessage),
    Typing { conversation_id: ConversationId },
    StoppedTyping { conversation_id: ConversationId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    NewMessage {
        message: Message,
    },
    MessageRead {
        conversation_id: ConversationId,
    },
    UserTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    UserStoppedTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    UserOnline {
        user: User,
    },
    UserOffline {
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },
    Error(ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    MessageRead,
    UserTyping,
    UserStoppedTyping,
    UserOnline,
    UserOffline,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::NewMessage,
        EventKind::MessageRead,
        EventKind::UserTyping,
        EventKind::UserStoppedTyping,
        EventKind::UserOnline,
        EventKind::UserOffline,
        EventKind::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::NewMessage => "new-message",
            Self::MessageRead => "message-read",
            Self::UserTyping => "user-typing",
            Self::UserStoppedTyping => "user-stopped-typing",
            Self::UserOnline => "user-online",
            Self::UserOffline => "user-offline",
            Self::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NewMessage { .. } => EventKind::NewMessage,
            Self::MessageRead { .. } => EventKind::MessageRead,
            Self::UserTyping { .. } => EventKind::UserTyping,
            Self::UserStoppedTyping { .. } => EventKind::UserStoppedTyping,
            Self::UserOnline { .. } => EventKind::UserOnline,
            Self::UserOffline { .. } => EventKind::UserOffline,
            Self::Error(_) => EventKind::Error,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
