use std::{
    collections::BTreeSet,
    sync::Arc,
    time::{Duration, Instant},
};

use shared::{
    domain::{ConnectionState, ConversationId, UserId},
    error::ApiException,
    protocol::{Conversation, Message, MessageContent, ServerEvent},
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    api::{ChatApi, HttpChatApi},
    channel::{ChannelConnector, ChannelInbox, RealtimeChannel, WebSocketConnector},
    config::ClientSettings,
    conversations::{ConversationStore, InboundOutcome},
    delivery::{Delivery, DeliveryPath},
    error::{ChannelError, ErrorContext, SendError, SessionError},
    presence::PresenceTracker,
    timeline::{MergeOutcome, TimelineStore},
    typing::{TypingCoordinator, TypingSignal},
    validator::MessageValidator,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    OpenConversation(ConversationId),
    CloseConversation,
    InputChanged(String),
    Send(MessageContent),
    Connect,
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub conversations: Vec<Conversation>,
    pub open_conversation: Option<ConversationId>,
    pub timeline: Vec<Message>,
    pub typing_users: Vec<UserId>,
    pub total_unread: u32,
}

pub struct ChatSession {
    settings: ClientSettings,
    local_user_id: UserId,
    channel: Arc<RealtimeChannel>,
    inbox: ChannelInbox,
    api: Arc<dyn ChatApi>,
    delivery: DeliveryPath,
    validator: MessageValidator,
    conversations: ConversationStore,
    timeline: TimelineStore,
    typing: TypingCoordinator,
    presence: PresenceTracker,
    pending_read_sync: BTreeSet<ConversationId>,
    snapshots: watch::Sender<SessionSnapshot>,
    errors: broadcast::Sender<SessionError>,
}

impl ChatSession {
    pub fn new(
        settings: ClientSettings,
        local_user_id: UserId,
        connector: Arc<dyn ChannelConnector>,
        api: Arc<dyn ChatApi>,
    ) -> Self {
        let (channel, inbox) = RealtimeChannel::new(settings.clone(), connector);
        let delivery = DeliveryPath::new(Arc::clone(&channel), Arc::clone(&api));
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        let (errors, _) = broadcast::channel(settings.event_buffer.max(1));
        Self {
            validator: MessageValidator::new(settings.max_message_chars),
            conversations: ConversationStore::new(local_user_id.clone()),
            timeline: TimelineStore::new(local_user_id.clone()),
            typing: TypingCoordinator::new(
                settings.typing_idle_timeout,
                settings.remote_typing_window(),
            ),
            presence: PresenceTracker::new(),
            pending_read_sync: BTreeSet::new(),
            settings,
            local_user_id,
            channel,
            inbox,
            api,
            delivery,
            snapshots,
            errors,
        }
    }

    pub fn connect_http(settings: ClientSettings, local_user_id: UserId) -> Result<Self, ChannelError> {
        let connector = WebSocketConnector::new(&settings.server_url, &local_user_id)?;
        let api = HttpChatApi::new(settings.server_url.clone(), local_user_id.clone());
        Ok(Self::new(
            settings,
            local_user_id,
            Arc::new(connector),
            Arc::new(api),
        ))
    }

    pub fn local_user_id(&self) -> &UserId {
        &self.local_user_id
    }

    pub fn channel(&self) -> &Arc<RealtimeChannel> {
        &self.channel
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn timeline(&self) -> &TimelineStore {
        &self.timeline
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn typing_users(&self) -> Vec<UserId> {
        self.typing.typing_users()
    }

    pub fn open_conversation_id(&self) -> Option<&ConversationId> {
        self.timeline.conversation_id()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<SessionError> {
        self.errors.subscribe()
    }

    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        match self.api.list_conversations().await {
            Ok(conversations) => {
                info!(count = conversations.len(), "session: conversations loaded");
                self.conversations.load_initial(conversations);
                self.presence
                    .seed(self.conversations.conversations().map(|c| &c.participant));
            }
            Err(err) => {
                self.conversations.clear();
                let error = SessionError::from_anyhow(ErrorContext::LoadConversations, &err);
                self.report(error.clone());
                self.publish();
                return Err(error);
            }
        }

        self.connect_channel().await;
        self.publish();
        Ok(())
    }

    pub async fn connect_channel(&mut self) {
        if let Err(err) = self.channel.connect().await {
            warn!("session: channel unavailable, using fallback delivery: {err:#}");
        }
    }

    pub async fn open_conversation(
        &mut self,
        conversation_id: ConversationId,
    ) -> Result<(), SessionError> {
        if self.timeline.conversation_id() == Some(&conversation_id) {
            return Ok(());
        }
        self.close_conversation();
        // Join before fetching so nothing sent in between is missed.
        self.channel.join_room(&conversation_id);

        let result = match self.api.fetch_history(&conversation_id).await {
            Ok(messages) => {
                self.conversations
                    .note_seen(&conversation_id, messages.iter().map(|m| &m.id));
                self.timeline.load_history(conversation_id.clone(), messages);
                Ok(())
            }
            Err(err) => {
                warn!(conversation_id = %conversation_id, "session: history load failed: {err:#}");
                let error = SessionError::from_anyhow(ErrorContext::LoadHistory, &err);
                self.timeline.load_history(conversation_id.clone(), Vec::new());
                self.report(error.clone());
                Err(error)
            }
        };

        self.mark_conversation_read(&conversation_id).await;
        self.publish();
        result
    }

    pub async fn mark_conversation_read(&mut self, conversation_id: &ConversationId) {
        self.conversations.mark_read(conversation_id);
        self.pending_read_sync.remove(conversation_id);
        if let Err(err) = self.api.mark_read(conversation_id).await {
            warn!(conversation_id = %conversation_id, "session: mark-read failed: {err:#}");
            self.report(SessionError::from_anyhow(ErrorContext::MarkRead, &err));
        }
    }

    pub fn close_conversation(&mut self) {
        let Some(conversation_id) = self.timeline.conversation_id().cloned() else {
            return;
        };
        if let Some(signal) = self.typing.reset() {
            self.emit_typing(&conversation_id, signal);
        }
        self.channel.leave_room(&conversation_id);
        self.timeline.clear();
        debug!(conversation_id = %conversation_id, "session: conversation closed");
        self.publish();
    }

    pub fn input_changed(&mut self, text: &str, now: Instant) {
        let Some(conversation_id) = self.timeline.conversation_id().cloned() else {
            return;
        };
        if let Some(signal) = self.typing.on_input(now, text) {
            self.emit_typing(&conversation_id, signal);
        }
    }

    pub async fn send(&mut self, content: MessageContent) -> Result<Delivery, SendError> {
        match self.timeline.conversation_id().cloned() {
            Some(conversation_id) => self.send_message(&conversation_id, content).await,
            None => {
                let err = SendError::NoConversationOpen;
                self.report(SessionError::from_send_error(&err));
                Err(err)
            }
        }
    }

    pub async fn send_message(
        &mut self,
        conversation_id: &ConversationId,
        content: MessageContent,
    ) -> Result<Delivery, SendError> {
        let participants = self.conversations.participants(conversation_id);
        let outgoing = match self
            .validator
            .prepare(conversation_id, content, &participants)
        {
            Ok(outgoing) => outgoing,
            Err(err) => {
                let err = SendError::from(err);
                self.report(SessionError::from_send_error(&err));
                return Err(err);
            }
        };

        if self.timeline.conversation_id() == Some(conversation_id) {
            if let Some(signal) = self.typing.on_send_or_clear() {
                self.emit_typing(conversation_id, signal);
            }
        }

        let delivery = match self.delivery.send_message(outgoing).await {
            Ok(delivery) => delivery,
            Err(err) => {
                self.report(SessionError::from_send_error(&err));
                self.publish();
                return Err(err);
            }
        };

        if let Delivery::Fallback(persisted) = &delivery {
            self.apply_new_message(persisted.clone());
            self.flush_read_sync().await;
        }
        self.publish();
        Ok(delivery)
    }

    pub fn handle_event(&mut self, event: ServerEvent, now: Instant) {
        match event {
            ServerEvent::NewMessage { message } => self.apply_new_message(message),
            ServerEvent::MessageRead { conversation_id } => {
                if self.is_open(&conversation_id) {
                    let flipped = self.timeline.mark_all_own_messages_read();
                    debug!(conversation_id = %conversation_id, flipped, "session: read receipt");
                }
            }
            ServerEvent::UserTyping {
                conversation_id,
                user_id,
            } => {
                if self.is_open(&conversation_id) && user_id != self.local_user_id {
                    self.typing.remote_started(user_id, now);
                }
            }
            ServerEvent::UserStoppedTyping {
                conversation_id,
                user_id,
            } => {
                if self.is_open(&conversation_id) {
                    self.typing.remote_stopped(&user_id);
                }
            }
            ServerEvent::UserOnline { user } => {
                self.presence.set_online(&user.id);
                self.conversations.set_presence(&user.id, true, user.last_seen);
            }
            ServerEvent::UserOffline { user_id, last_seen } => {
                self.presence.set_offline(&user_id, last_seen);
                self.conversations.set_presence(&user_id, false, last_seen);
            }
            ServerEvent::Error(api_error) => {
                let err = anyhow::Error::from(ApiException::from(api_error));
                self.report(SessionError::from_anyhow(ErrorContext::Channel, &err));
            }
        }
    }

    fn apply_new_message(&mut self, message: Message) {
        let conversation_id = message.conversation_id.clone();
        let outcome = self.conversations.apply_inbound_message(&message);
        if !self.is_open(&conversation_id) {
            return;
        }

        self.typing.remote_stopped(&message.sender_id);
        let message_id = message.id.clone();
        if self.timeline.append_or_merge(message) == MergeOutcome::Duplicate {
            debug!(message_id = %message_id, "session: duplicate message ignored");
        }
        if outcome == (InboundOutcome::Applied { unread_incremented: true }) {
            self.conversations.mark_read(&conversation_id);
            self.pending_read_sync.insert(conversation_id);
        }
    }

    /// Runs typing deadlines. Returns whether anything visible changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let expiry = self.typing.expire(now);
        if expiry.local_stopped {
            if let Some(conversation_id) = self.timeline.conversation_id().cloned() {
                self.emit_typing(&conversation_id, TypingSignal::Stopped);
            }
        }
        !expiry.remote_expired.is_empty()
    }

    /// Failures are not retried.
    pub async fn flush_read_sync(&mut self) {
        let pending = std::mem::take(&mut self.pending_read_sync);
        for conversation_id in pending {
            if let Err(err) = self.api.mark_read(&conversation_id).await {
                warn!(conversation_id = %conversation_id, "session: read sync failed: {err:#}");
            }
        }
    }

    /// Returns false once the inbox is closed.
    pub async fn process_next_event(&mut self) -> bool {
        let Some(event) = self.inbox.recv().await else {
            return false;
        };
        self.handle_event(event, now());
        self.flush_read_sync().await;
        self.publish();
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.channel.state(),
            conversations: self.conversations.snapshot(),
            open_conversation: self.timeline.conversation_id().cloned(),
            timeline: self.timeline.messages().to_vec(),
            typing_users: self.typing.typing_users(),
            total_unread: self.conversations.total_unread(),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// Ends on `Intent::Shutdown` or when every intent sender is gone.
    pub async fn run(mut self, mut intents: mpsc::Receiver<Intent>) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval.max(MIN_TICK_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut connection = self.channel.watch_state();
        self.publish();

        loop {
            let typing_deadline = self.typing.next_deadline();
            tokio::select! {
                Some(event) = self.inbox.recv() => {
                    self.handle_event(event, now());
                    self.flush_read_sync().await;
                }
                intent = intents.recv() => match intent {
                    Some(Intent::Shutdown) | None => break,
                    Some(intent) => self.apply_intent(intent).await,
                },
                _ = ticker.tick() => {
                    if !self.tick(now()) {
                        continue;
                    }
                }
                _ = sleep_until(typing_deadline) => {
                    if !self.tick(now()) {
                        continue;
                    }
                }
                Ok(()) = connection.changed() => {
                    let state = *connection.borrow_and_update();
                    debug!(?state, "session: connection state changed");
                }
            }
            self.publish();
        }

        self.shutdown();
    }

    async fn apply_intent(&mut self, intent: Intent) {
        match intent {
            Intent::OpenConversation(conversation_id) => {
                let _ = self.open_conversation(conversation_id).await;
            }
            Intent::CloseConversation => self.close_conversation(),
            Intent::InputChanged(text) => self.input_changed(&text, now()),
            Intent::Send(content) => {
                let _ = self.send(content).await;
            }
            Intent::Connect => self.connect_channel().await,
            Intent::Shutdown => {}
        }
    }

    pub fn shutdown(&mut self) {
        self.close_conversation();
        self.channel.disconnect();
        self.publish();
        info!(user_id = %self.local_user_id, "session: shut down");
    }

    fn is_open(&self, conversation_id: &ConversationId) -> bool {
        self.timeline.conversation_id() == Some(conversation_id)
    }

    fn emit_typing(&self, conversation_id: &ConversationId, signal: TypingSignal) {
        let result = match signal {
            TypingSignal::Started => self.channel.start_typing(conversation_id),
            TypingSignal::Stopped => self.channel.stop_typing(conversation_id),
        };
        if let Err(err) = result {
            debug!(conversation_id = %conversation_id, ?signal, "session: typing signal dropped: {err}");
        }
    }

    fn report(&self, error: SessionError) {
        warn!(
            context = ?error.context(),
            category = ?error.category(),
            "session: {}",
            error.message()
        );
        let _ = self.errors.send(error);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.channel.disconnect();
    }
}

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
