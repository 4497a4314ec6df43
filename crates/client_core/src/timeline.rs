use std::collections::HashSet;

use shared::{
    domain::{ConversationId, MessageId, UserId},
    protocol::Message,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    Duplicate,
    OtherConversation,
}

#[derive(Debug, Clone)]
pub struct TimelineStore {
    local_user_id: UserId,
    conversation_id: Option<ConversationId>,
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl TimelineStore {
    pub fn new(local_user_id: UserId) -> Self {
        Self {
            local_user_id,
            conversation_id: None,
            messages: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn load_history(&mut self, conversation_id: ConversationId, messages: Vec<Message>) {
        self.conversation_id = Some(conversation_id);
        self.messages.clear();
        self.ids.clear();
        for message in messages {
            if self.conversation_id.as_ref() != Some(&message.conversation_id) {
                debug!(message_id = %message.id, "timeline: skipping history from another conversation");
                continue;
            }
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        self.messages.sort_by_key(|m| m.created_at);
    }

    pub fn append_or_merge(&mut self, message: Message) -> MergeOutcome {
        if self.conversation_id.as_ref() != Some(&message.conversation_id) {
            return MergeOutcome::OtherConversation;
        }
        if self.ids.contains(&message.id) {
            debug!(message_id = %message.id, "timeline: duplicate delivery absorbed");
            return MergeOutcome::Duplicate;
        }

        let position = self
            .messages
            .partition_point(|existing| existing.created_at <= message.created_at);
        self.ids.insert(message.id.clone());
        self.messages.insert(position, message);
        MergeOutcome::Appended
    }

    /// Flags every message sent by the local user as read; returns how many changed.
    pub fn mark_all_own_messages_read(&mut self) -> usize {
        let mut changed = 0;
        for message in &mut self.messages {
            if message.sender_id == self.local_user_id && !message.read {
                message.read = true;
                changed += 1;
            }
        }
        changed
    }

    pub fn clear(&mut self) {
        self.conversation_id = None;
        self.messages.clear();
        self.ids.clear();
    }

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains(&self, message_id: &MessageId) -> bool {
        self.ids.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/timeline_tests.rs"]
mod tests;
