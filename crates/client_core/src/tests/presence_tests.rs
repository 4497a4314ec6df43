use super::*;

use crate::test_support::{at, user};

#[test]
fn seed_takes_values_from_participants() {
    let mut online = user("u-1");
    online.is_online = true;
    let mut away = user("u-2");
    away.last_seen = Some(at(10));

    let mut presence = PresenceTracker::new();
    presence.seed([&online, &away]);

    assert!(presence.is_online(&UserId::new("u-1")));
    assert_eq!(
        presence.get(&UserId::new("u-2")),
        Some(Presence {
            is_online: false,
            last_seen: Some(at(10)),
        })
    );
    assert_eq!(presence.online_users(), vec![UserId::new("u-1")]);
}

#[test]
fn online_offline_transitions_report_changes() {
    let mut presence = PresenceTracker::new();
    let coach = UserId::new("coach");

    assert!(presence.set_online(&coach));
    assert!(!presence.set_online(&coach));
    assert!(presence.set_offline(&coach, Some(at(50))));
    assert!(!presence.set_offline(&coach, Some(at(50))));
    assert!(!presence.is_online(&coach));
    assert_eq!(presence.get(&coach).and_then(|p| p.last_seen), Some(at(50)));
}

#[test]
fn offline_without_timestamp_keeps_last_seen() {
    let mut presence = PresenceTracker::new();
    let coach = UserId::new("coach");
    presence.set_offline(&coach, Some(at(5)));
    presence.set_online(&coach);
    presence.set_offline(&coach, None);

    assert_eq!(presence.get(&coach).and_then(|p| p.last_seen), Some(at(5)));
}

#[test]
fn unknown_users_are_tracked() {
    let mut presence = PresenceTracker::new();
    assert!(presence.get(&UserId::new("stranger")).is_none());
    presence.set_online(&UserId::new("stranger"));
    assert!(presence.is_online(&UserId::new("stranger")));

    presence.clear();
    assert!(presence.online_users().is_empty());
}
