use super::*;

use shared::domain::{Role, WorkoutId};

fn participant(id: &str, name: &str) -> User {
    User {
        id: UserId::new(id),
        display_name: name.to_string(),
        avatar_url: None,
        role: Role::Client,
        is_online: false,
        last_seen: None,
    }
}

fn validator() -> MessageValidator {
    MessageValidator::new(20)
}

#[test]
fn strips_script_blocks_handlers_tags_and_protocols() {
    assert_eq!(
        sanitize_text("hi <script>alert('x')</script>there"),
        "hi there"
    );
    assert_eq!(
        sanitize_text(r#"<img src="a.png" onerror="steal()">squat day"#),
        "squat day"
    );
    assert_eq!(sanitize_text("<b>bold</b> move"), "bold move");
    assert_eq!(sanitize_text("click javascript:alert(1)"), "click alert(1)");
    assert_eq!(
        sanitize_text("see data:text/html;base64,AAAA"),
        "see base64,AAAA"
    );
}

#[test]
fn sanitizer_keeps_ordinary_text() {
    assert_eq!(sanitize_text("  3 < 5 and 5 > 3  "), "3 < 5 and 5 > 3");
    assert_eq!(sanitize_text("your data: 5kg more"), "your data: 5kg more");
    assert_eq!(sanitize_text("I <3 leg day"), "I <3 leg day");
}

#[test]
fn rejects_empty_and_whitespace_only_text() {
    let conversation = ConversationId::new("c1");
    assert_eq!(
        validator().prepare(&conversation, MessageContent::text("   "), &[]),
        Err(ValidationError::Empty)
    );
}

#[test]
fn rejects_text_that_is_empty_after_sanitizing() {
    let conversation = ConversationId::new("c1");
    assert_eq!(
        validator().prepare(
            &conversation,
            MessageContent::text("<script>alert(1)</script>"),
            &[]
        ),
        Err(ValidationError::Empty)
    );
}

#[test]
fn length_limit_counts_characters_not_bytes() {
    let conversation = ConversationId::new("c1");
    let twenty_emoji = "💪".repeat(20);
    assert!(validator()
        .prepare(&conversation, MessageContent::text(twenty_emoji), &[])
        .is_ok());

    let err = validator()
        .prepare(&conversation, MessageContent::text("x".repeat(21)), &[])
        .expect_err("too long");
    assert_eq!(err, ValidationError::TooLong { max: 20, actual: 21 });
}

#[test]
fn extracts_known_mentions_in_first_seen_order() {
    let users = [participant("u-2", "Sam Lee"), participant("u-3", "Kai")];
    let mentions = extract_mentions("@kai and @SamLee, again @kai. mail me@x.io @ghost", &users);
    assert_eq!(mentions, vec![UserId::new("u-3"), UserId::new("u-2")]);
}

#[test]
fn prepared_text_carries_mentions_and_sanitized_body() {
    let users = [participant("u-2", "Sam")];
    let out = MessageValidator::new(2000)
        .prepare(
            &ConversationId::new("c1"),
            MessageContent::text("<i>nice</i> set @sam"),
            &users,
        )
        .expect("valid");

    assert_eq!(out.conversation_id, ConversationId::new("c1"));
    assert_eq!(out.content, MessageContent::text("nice set @sam"));
    assert_eq!(out.metadata.mentions, vec![UserId::new("u-2")]);
}

#[test]
fn workout_assignment_requires_title_and_workout() {
    let conversation = ConversationId::new("c1");
    let missing_title = MessageContent::WorkoutAssignment {
        workout_id: WorkoutId::new("w-1"),
        title: " ".into(),
        note: None,
    };
    assert_eq!(
        validator().prepare(&conversation, missing_title, &[]),
        Err(ValidationError::MissingField {
            kind: "workout_assignment",
            field: "title",
        })
    );

    let missing_workout = MessageContent::WorkoutAssignment {
        workout_id: WorkoutId::new(""),
        title: "Push day".into(),
        note: None,
    };
    assert!(matches!(
        validator().prepare(&conversation, missing_workout, &[]),
        Err(ValidationError::MissingField {
            field: "workout_id",
            ..
        })
    ));
}

#[test]
fn workout_note_is_sanitized_and_dropped_when_blank() {
    let out = validator()
        .prepare(
            &ConversationId::new("c1"),
            MessageContent::WorkoutAssignment {
                workout_id: WorkoutId::new("w-1"),
                title: "Push day".into(),
                note: Some("<script>x()</script>".into()),
            },
            &[],
        )
        .expect("valid");

    assert_eq!(
        out.content,
        MessageContent::WorkoutAssignment {
            workout_id: WorkoutId::new("w-1"),
            title: "Push day".into(),
            note: None,
        }
    );
}

#[test]
fn image_and_file_urls_must_be_http() {
    let conversation = ConversationId::new("c1");
    let bad_image = MessageContent::Image {
        url: "javascript:alert(1)".into(),
        caption: None,
    };
    assert!(matches!(
        validator().prepare(&conversation, bad_image, &[]),
        Err(ValidationError::InvalidUrl { kind: "image", .. })
    ));

    let file = MessageContent::File {
        url: "https://cdn.example/plan.pdf".into(),
        filename: "plan.pdf".into(),
        size_bytes: 1024,
        mime_type: Some(" application/pdf ".into()),
    };
    let out = validator()
        .prepare(&conversation, file, &[])
        .expect("valid file");
    assert_eq!(
        out.content,
        MessageContent::File {
            url: "https://cdn.example/plan.pdf".into(),
            filename: "plan.pdf".into(),
            size_bytes: 1024,
            mime_type: Some("application/pdf".into()),
        }
    );
}

#[test]
fn file_mime_type_is_sanitized_and_dropped_when_blank() {
    let conversation = ConversationId::new("c1");
    let file = |mime: &str| MessageContent::File {
        url: "https://cdn.example/plan.pdf".into(),
        filename: "plan.pdf".into(),
        size_bytes: 1024,
        mime_type: Some(mime.into()),
    };

    let out = validator()
        .prepare(&conversation, file("<b>text/plain</b>"), &[])
        .expect("valid file");
    assert!(matches!(
        out.content,
        MessageContent::File { mime_type: Some(ref m), .. } if m == "text/plain"
    ));

    let out = validator()
        .prepare(&conversation, file("<script>alert(1)</script>"), &[])
        .expect("valid file");
    assert!(matches!(out.content, MessageContent::File { mime_type: None, .. }));
}
