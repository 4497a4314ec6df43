use super::*;

use crate::test_support::{at, conversation, message};

fn store() -> ConversationStore {
    let mut store = ConversationStore::new(UserId::new("me"));
    store.load_initial(vec![
        conversation("c1", "u-1", 100),
        conversation("c2", "u-2", 200),
    ]);
    store
}

fn ids(store: &ConversationStore) -> Vec<&str> {
    store.conversations().map(|c| c.id.as_str()).collect()
}

fn unread(store: &ConversationStore, id: &str) -> u32 {
    store
        .get(&ConversationId::new(id))
        .expect("conversation")
        .unread_count
}

#[test]
fn load_initial_orders_most_recent_first() {
    let store = store();
    assert_eq!(ids(&store), vec!["c2", "c1"]);
    assert_eq!(store.len(), 2);
}

#[test]
fn inbound_message_updates_summary_order_and_unread() {
    let mut store = store();
    let incoming = message("m1", "c1", "u-1", 300);

    assert_eq!(
        store.apply_inbound_message(&incoming),
        InboundOutcome::Applied {
            unread_incremented: true
        }
    );

    let c1 = store.get(&ConversationId::new("c1")).expect("c1");
    assert_eq!(c1.unread_count, 1);
    assert_eq!(c1.updated_at, at(300));
    let last = c1.last_message.as_ref().expect("summary");
    assert_eq!(last.message_id, Some(MessageId::new("m1")));
    assert_eq!(last.content, "body of m1");
    assert_eq!(ids(&store), vec!["c1", "c2"]);
}

#[test]
fn duplicate_delivery_counts_once() {
    let mut store = store();
    let incoming = message("m1", "c1", "u-1", 300);

    store.apply_inbound_message(&incoming);
    assert_eq!(
        store.apply_inbound_message(&incoming),
        InboundOutcome::Duplicate
    );
    assert_eq!(unread(&store, "c1"), 1);
}

#[test]
fn own_messages_never_count_as_unread() {
    let mut store = store();
    assert_eq!(
        store.apply_inbound_message(&message("m1", "c1", "me", 300)),
        InboundOutcome::Applied {
            unread_incremented: false
        }
    );
    assert_eq!(unread(&store, "c1"), 0);
}

#[test]
fn unread_equals_distinct_foreign_messages_since_mark_read() {
    let mut store = store();
    for (id, sender) in [("m1", "u-1"), ("m2", "me"), ("m1", "u-1"), ("m3", "u-1")] {
        store.apply_inbound_message(&message(id, "c1", sender, 300));
    }
    assert_eq!(unread(&store, "c1"), 2);

    assert!(store.mark_read(&ConversationId::new("c1")));
    assert_eq!(unread(&store, "c1"), 0);

    store.apply_inbound_message(&message("m3", "c1", "u-1", 300));
    store.apply_inbound_message(&message("m4", "c1", "u-1", 301));
    assert_eq!(unread(&store, "c1"), 1);
    assert_eq!(unread(&store, "c2"), 0);
    assert_eq!(store.total_unread(), 1);
}

#[test]
fn older_message_does_not_replace_newer_summary_or_rewind_order() {
    let mut store = store();
    store.apply_inbound_message(&message("late", "c1", "u-1", 500));
    store.apply_inbound_message(&message("early", "c1", "u-1", 250));

    let c1 = store.get(&ConversationId::new("c1")).expect("c1");
    assert_eq!(
        c1.last_message.as_ref().and_then(|l| l.message_id.clone()),
        Some(MessageId::new("late"))
    );
    assert_eq!(c1.updated_at, at(500));
    assert_eq!(c1.unread_count, 2);
}

#[test]
fn seen_history_is_not_counted_again() {
    let mut store = store();
    let seen = MessageId::new("h1");
    store.note_seen(&ConversationId::new("c1"), [&seen]);

    assert_eq!(
        store.apply_inbound_message(&message("h1", "c1", "u-1", 50)),
        InboundOutcome::Duplicate
    );
    assert_eq!(unread(&store, "c1"), 0);
}

#[test]
fn message_for_unknown_conversation_is_ignored() {
    let mut store = store();
    assert_eq!(
        store.apply_inbound_message(&message("m1", "c9", "u-9", 300)),
        InboundOutcome::UnknownConversation
    );
    assert!(!store.mark_read(&ConversationId::new("c9")));
}

#[test]
fn presence_updates_every_conversation_with_that_participant() {
    let mut store = ConversationStore::new(UserId::new("me"));
    store.load_initial(vec![
        conversation("c1", "u-1", 100),
        conversation("c2", "u-1", 200),
        conversation("c3", "u-3", 300),
    ]);

    assert_eq!(store.set_presence(&UserId::new("u-1"), true, None), 2);
    assert!(store.conversations().filter(|c| c.participant.is_online).count() == 2);

    assert_eq!(
        store.set_presence(&UserId::new("u-1"), false, Some(at(400))),
        2
    );
    let c1 = store.get(&ConversationId::new("c1")).expect("c1");
    assert!(!c1.participant.is_online);
    assert_eq!(c1.participant.last_seen, Some(at(400)));
    assert!(!store
        .get(&ConversationId::new("c3"))
        .expect("c3")
        .participant
        .is_online);
}
