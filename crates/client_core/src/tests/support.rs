//! In-memory doubles shared by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::{channel::mpsc as fmpsc, StreamExt};
use shared::{
    domain::{ConversationId, MessageId, Role, User, UserId},
    protocol::{
        ClientRequest, Conversation, Message, MessageContent, MessageMetadata, OutgoingMessage,
        ServerEvent,
    },
};
use tokio::sync::mpsc;

use crate::{
    api::ChatApi,
    channel::{ChannelConnector, ChannelLink},
};

/// Server side of one in-memory socket.
pub struct MemoryPeer {
    frames_to_client: fmpsc::UnboundedSender<Result<String>>,
    frames_from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    pub fn push(&self, event: &ServerEvent) {
        let text = serde_json::to_string(event).expect("encode event");
        self.frames_to_client
            .unbounded_send(Ok(text))
            .expect("client stream open");
    }

    pub fn push_raw(&self, text: &str) {
        self.frames_to_client
            .unbounded_send(Ok(text.to_string()))
            .expect("client stream open");
    }

    /// Ends the client's inbound stream, as a dropped socket would.
    pub fn drop_link(self) {
        let _ = self
            .frames_to_client
            .unbounded_send(Err(anyhow!("connection reset by peer")));
    }

    pub async fn next_request(&mut self) -> ClientRequest {
        let text = tokio::time::timeout(std::time::Duration::from_secs(1), self.frames_from_client.recv())
            .await
            .expect("request timeout")
            .expect("client writer open");
        serde_json::from_str(&text).expect("decode request")
    }

    pub async fn writer_closed(&mut self) -> bool {
        self.frames_from_client.recv().await.is_none()
    }

    pub fn drain_requests(&mut self) -> Vec<ClientRequest> {
        let mut requests = Vec::new();
        while let Ok(text) = self.frames_from_client.try_recv() {
            requests.push(serde_json::from_str(&text).expect("decode request"));
        }
        requests
    }
}

/// Hands out pre-built links in order; fails once they run out.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    links: Arc<Mutex<VecDeque<ChannelLink>>>,
    attempts: Arc<Mutex<u32>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer_link(&self) -> MemoryPeer {
        let (frames_to_client, inbound) = fmpsc::unbounded();
        let (outbound, frames_from_client) = mpsc::unbounded_channel();
        self.links.lock().expect("lock").push_back(ChannelLink {
            outbound,
            inbound: inbound.boxed(),
        });
        MemoryPeer {
            frames_to_client,
            frames_from_client,
        }
    }

    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().expect("lock")
    }
}

#[async_trait]
impl ChannelConnector for MemoryConnector {
    async fn connect(&self) -> Result<ChannelLink> {
        *self.attempts.lock().expect("lock") += 1;
        self.links
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or_else(|| anyhow!("connection refused"))
    }
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0)
        .single()
        .expect("timestamp")
}

pub fn user(id: &str) -> User {
    User {
        id: UserId::new(id),
        display_name: format!("User {id}"),
        avatar_url: None,
        role: Role::Client,
        is_online: false,
        last_seen: None,
    }
}

pub fn conversation(id: &str, participant: &str, updated_at: i64) -> Conversation {
    Conversation {
        id: ConversationId::new(id),
        participant: user(participant),
        last_message: None,
        unread_count: 0,
        updated_at: at(updated_at),
    }
}

pub fn message(id: &str, conversation_id: &str, sender: &str, created_at: i64) -> Message {
    Message {
        id: MessageId::new(id),
        conversation_id: ConversationId::new(conversation_id),
        sender_id: UserId::new(sender),
        content: MessageContent::text(format!("body of {id}")),
        read: false,
        created_at: at(created_at),
        updated_at: None,
        metadata: MessageMetadata::default(),
    }
}

#[derive(Default)]
struct ApiState {
    conversations: Vec<Conversation>,
    history: HashMap<ConversationId, Vec<Message>>,
    fail_list: bool,
    fail_history: bool,
    fail_send: bool,
    fail_mark_read: bool,
    next_id: Option<String>,
    next_created_at: Option<i64>,
    marked_read: Vec<ConversationId>,
    sent: Vec<OutgoingMessage>,
}

/// Scripted request/response collaborator that records every call.
#[derive(Clone)]
pub struct RecordingApi {
    sender: UserId,
    state: Arc<Mutex<ApiState>>,
}

impl RecordingApi {
    pub fn new(sender: &str) -> Self {
        Self {
            sender: UserId::new(sender),
            state: Arc::new(Mutex::new(ApiState::default())),
        }
    }

    pub fn with_conversations(self, conversations: Vec<Conversation>) -> Self {
        self.state.lock().expect("lock").conversations = conversations;
        self
    }

    pub fn with_history(self, conversation_id: &str, messages: Vec<Message>) -> Self {
        self.state
            .lock()
            .expect("lock")
            .history
            .insert(ConversationId::new(conversation_id), messages);
        self
    }

    pub fn fail_list(&self) {
        self.state.lock().expect("lock").fail_list = true;
    }

    pub fn fail_history(&self) {
        self.state.lock().expect("lock").fail_history = true;
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().expect("lock").fail_send = fail;
    }

    pub fn fail_mark_read(&self) {
        self.state.lock().expect("lock").fail_mark_read = true;
    }

    /// Id the next fallback send is persisted under.
    pub fn assign_next_id(&self, id: &str) {
        self.state.lock().expect("lock").next_id = Some(id.to_string());
    }

    /// Creation time (seconds after the test epoch) of the next fallback send.
    pub fn persist_next_at(&self, seconds: i64) {
        self.state.lock().expect("lock").next_created_at = Some(seconds);
    }

    pub fn marked_read(&self) -> Vec<ConversationId> {
        self.state.lock().expect("lock").marked_read.clone()
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.state.lock().expect("lock").sent.clone()
    }
}

#[async_trait]
impl ChatApi for RecordingApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let state = self.state.lock().expect("lock");
        if state.fail_list {
            return Err(anyhow!("connection refused"));
        }
        Ok(state.conversations.clone())
    }

    async fn fetch_history(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let state = self.state.lock().expect("lock");
        if state.fail_history {
            return Err(anyhow!("connection reset"));
        }
        Ok(state.history.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn mark_read(&self, conversation_id: &ConversationId) -> Result<()> {
        let mut state = self.state.lock().expect("lock");
        if state.fail_mark_read {
            return Err(anyhow!("service unavailable"));
        }
        state.marked_read.push(conversation_id.clone());
        Ok(())
    }

    async fn send_message(&self, outgoing: &OutgoingMessage) -> Result<Message> {
        let mut state = self.state.lock().expect("lock");
        if state.fail_send {
            return Err(anyhow!("network unreachable"));
        }
        state.sent.push(outgoing.clone());
        let count = state.sent.len();
        let id = state
            .next_id
            .take()
            .unwrap_or_else(|| format!("srv-{count}"));
        let created_at = state
            .next_created_at
            .take()
            .unwrap_or(1_000 + count as i64);
        Ok(Message {
            id: MessageId::new(id),
            conversation_id: outgoing.conversation_id.clone(),
            sender_id: self.sender.clone(),
            content: outgoing.content.clone(),
            read: false,
            created_at: at(created_at),
            updated_at: None,
            metadata: outgoing.metadata.clone(),
        })
    }
}
