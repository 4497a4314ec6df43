use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::domain::{User, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    entries: HashMap<UserId, Presence>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed<'a>(&mut self, users: impl IntoIterator<Item = &'a User>) {
        for user in users {
            self.entries.insert(
                user.id.clone(),
                Presence {
                    is_online: user.is_online,
                    last_seen: user.last_seen,
                },
            );
        }
    }

    /// Returns true when the stored value changed.
    pub fn set_online(&mut self, user_id: &UserId) -> bool {
        let entry = self.entries.entry(user_id.clone()).or_default();
        let changed = !entry.is_online;
        entry.is_online = true;
        changed
    }

    /// An absent `last_seen` keeps whatever was known before.
    pub fn set_offline(&mut self, user_id: &UserId, last_seen: Option<DateTime<Utc>>) -> bool {
        let entry = self.entries.entry(user_id.clone()).or_default();
        let before = *entry;
        entry.is_online = false;
        if last_seen.is_some() {
            entry.last_seen = last_seen;
        }
        before != *entry
    }

    pub fn get(&self, user_id: &UserId) -> Option<Presence> {
        self.entries.get(user_id).copied()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.entries.get(user_id).is_some_and(|p| p.is_online)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .entries
            .iter()
            .filter(|(_, presence)| presence.is_online)
            .map(|(id, _)| id.clone())
            .collect();
        users.sort();
        users
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
#[path = "tests/presence_tests.rs"]
mod tests;
