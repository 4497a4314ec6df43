use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use shared::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Started,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalTyping {
    Idle,
    Typing { deadline: Instant },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TypingExpiry {
    pub local_stopped: bool,
    pub remote_expired: Vec<UserId>,
}

impl TypingExpiry {
    pub fn is_empty(&self) -> bool {
        !self.local_stopped && self.remote_expired.is_empty()
    }
}

/// At most one `Started` is emitted per local typing burst.
#[derive(Debug, Clone)]
pub struct TypingCoordinator {
    idle_timeout: Duration,
    remote_window: Duration,
    local: LocalTyping,
    remote: HashMap<UserId, Instant>,
}

impl TypingCoordinator {
    pub fn new(idle_timeout: Duration, remote_window: Duration) -> Self {
        Self {
            idle_timeout,
            remote_window,
            local: LocalTyping::Idle,
            remote: HashMap::new(),
        }
    }

    /// Empty input counts as a clear.
    pub fn on_input(&mut self, now: Instant, text: &str) -> Option<TypingSignal> {
        if text.trim().is_empty() {
            return self.on_send_or_clear();
        }
        let deadline = now + self.idle_timeout;
        match self.local {
            LocalTyping::Idle => {
                self.local = LocalTyping::Typing { deadline };
                Some(TypingSignal::Started)
            }
            LocalTyping::Typing { .. } => {
                self.local = LocalTyping::Typing { deadline };
                None
            }
        }
    }

    pub fn on_send_or_clear(&mut self) -> Option<TypingSignal> {
        match std::mem::replace(&mut self.local, LocalTyping::Idle) {
            LocalTyping::Typing { .. } => Some(TypingSignal::Stopped),
            LocalTyping::Idle => None,
        }
    }

    pub fn is_local_typing(&self) -> bool {
        matches!(self.local, LocalTyping::Typing { .. })
    }

    pub fn remote_started(&mut self, user_id: UserId, now: Instant) {
        self.remote.insert(user_id, now + self.remote_window);
    }

    pub fn remote_stopped(&mut self, user_id: &UserId) -> bool {
        self.remote.remove(user_id).is_some()
    }

    pub fn expire(&mut self, now: Instant) -> TypingExpiry {
        let mut expiry = TypingExpiry::default();

        if let LocalTyping::Typing { deadline } = self.local {
            if deadline <= now {
                self.local = LocalTyping::Idle;
                expiry.local_stopped = true;
            }
        }

        self.remote.retain(|user_id, deadline| {
            let alive = *deadline > now;
            if !alive {
                expiry.remote_expired.push(user_id.clone());
            }
            alive
        });
        expiry.remote_expired.sort();
        expiry
    }

    /// Earliest pending local or remote deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        let local = match self.local {
            LocalTyping::Typing { deadline } => Some(deadline),
            LocalTyping::Idle => None,
        };
        self.remote.values().copied().chain(local).min()
    }

    pub fn typing_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.remote.keys().cloned().collect();
        users.sort();
        users
    }

    pub fn is_remote_typing(&self, user_id: &UserId) -> bool {
        self.remote.contains_key(user_id)
    }

    /// Forgets all typing state, as on a conversation switch.
    pub fn reset(&mut self) -> Option<TypingSignal> {
        self.remote.clear();
        self.on_send_or_clear()
    }
}

#[cfg(test)]
#[path = "tests/typing_tests.rs"]
mod tests;
