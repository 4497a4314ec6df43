use std::collections::HashSet;

use chrono::{DateTime, Utc};
use shared::{
    domain::{ConversationId, MessageId, User, UserId},
    protocol::{Conversation, LastMessage, Message},
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Applied { unread_incremented: bool },
    Duplicate,
    UnknownConversation,
}

#[derive(Debug, Clone)]
struct ConversationEntry {
    conversation: Conversation,
    applied: HashSet<MessageId>,
}

impl ConversationEntry {
    fn new(conversation: Conversation) -> Self {
        let applied = conversation
            .last_message
            .as_ref()
            .and_then(|last| last.message_id.clone())
            .into_iter()
            .collect();
        Self {
            conversation,
            applied,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    local_user_id: UserId,
    entries: Vec<ConversationEntry>,
}

impl ConversationStore {
    pub fn new(local_user_id: UserId) -> Self {
        Self {
            local_user_id,
            entries: Vec::new(),
        }
    }

    pub fn load_initial(&mut self, conversations: Vec<Conversation>) {
        self.entries = conversations.into_iter().map(ConversationEntry::new).collect();
        self.sort();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Applies one inbound message at most once per message id. The unread
    /// counter moves only for messages from someone other than the local user.
    pub fn apply_inbound_message(&mut self, message: &Message) -> InboundOutcome {
        let local_user_id = self.local_user_id.clone();
        let Some(entry) = self.entry_mut(&message.conversation_id) else {
            debug!(
                conversation_id = %message.conversation_id,
                message_id = %message.id,
                "conversations: message for unknown conversation"
            );
            return InboundOutcome::UnknownConversation;
        };
        if !entry.applied.insert(message.id.clone()) {
            return InboundOutcome::Duplicate;
        }

        let conversation = &mut entry.conversation;
        let newer = conversation
            .last_message
            .as_ref()
            .map_or(true, |last| message.created_at >= last.sent_at);
        if newer {
            conversation.last_message = Some(LastMessage::from_message(message));
        }
        if message.created_at > conversation.updated_at {
            conversation.updated_at = message.created_at;
        }

        let unread_incremented = message.sender_id != local_user_id;
        if unread_incremented {
            conversation.unread_count = conversation.unread_count.saturating_add(1);
        }

        self.sort();
        InboundOutcome::Applied { unread_incremented }
    }

    /// Records ids that were already shown (e.g. loaded history) so a later
    /// delivery of the same message is not counted as unread.
    pub fn note_seen<'a>(
        &mut self,
        conversation_id: &ConversationId,
        ids: impl IntoIterator<Item = &'a MessageId>,
    ) {
        if let Some(entry) = self.entry_mut(conversation_id) {
            entry.applied.extend(ids.into_iter().cloned());
        }
    }

    pub fn mark_read(&mut self, conversation_id: &ConversationId) -> bool {
        match self.entry_mut(conversation_id) {
            Some(entry) => {
                entry.conversation.unread_count = 0;
                true
            }
            None => false,
        }
    }

    pub fn set_presence(
        &mut self,
        user_id: &UserId,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> usize {
        let mut updated = 0;
        for entry in &mut self.entries {
            let participant = &mut entry.conversation.participant;
            if &participant.id != user_id {
                continue;
            }
            participant.is_online = is_online;
            if last_seen.is_some() {
                participant.last_seen = last_seen;
            }
            updated += 1;
        }
        updated
    }

    pub fn get(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.entries
            .iter()
            .map(|entry| &entry.conversation)
            .find(|conversation| &conversation.id == conversation_id)
    }

    pub fn contains(&self, conversation_id: &ConversationId) -> bool {
        self.get(conversation_id).is_some()
    }

    pub fn participants(&self, conversation_id: &ConversationId) -> Vec<User> {
        self.get(conversation_id)
            .map(|conversation| vec![conversation.participant.clone()])
            .unwrap_or_default()
    }

    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.entries.iter().map(|entry| &entry.conversation)
    }

    pub fn snapshot(&self) -> Vec<Conversation> {
        self.conversations().cloned().collect()
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations()
            .fold(0u32, |acc, c| acc.saturating_add(c.unread_count))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, conversation_id: &ConversationId) -> Option<&mut ConversationEntry> {
        self.entries
            .iter_mut()
            .find(|entry| &entry.conversation.id == conversation_id)
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| b.conversation.updated_at.cmp(&a.conversation.updated_at));
    }
}

#[cfg(test)]
#[path = "tests/conversations_tests.rs"]
mod tests;
