use std::sync::LazyLock;

use regex::Regex;
use shared::{
    domain::{ConversationId, User, UserId},
    protocol::{MessageContent, MessageMetadata, OutgoingMessage},
};
use url::Url;

use crate::error::ValidationError;

static SCRIPT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("script block regex")
});
static EVENT_HANDLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bon[a-z]{3,}\s*=\s*("[^"]*"|'[^']*')"#).expect("event handler regex")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)</?[a-zA-Z][^>]*>").expect("tag regex"));
static PROTOCOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:javascript|vbscript)\s*:|\bdata:[a-z]+/[a-z0-9.+-]+[;,]")
        .expect("protocol regex")
});
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w@])@([A-Za-z0-9_.\-]+)").expect("mention regex"));

pub fn sanitize_text(raw: &str) -> String {
    let without_scripts = SCRIPT_BLOCK_RE.replace_all(raw, "");
    let without_handlers = EVENT_HANDLER_RE.replace_all(&without_scripts, "");
    let without_tags = TAG_RE.replace_all(&without_handlers, "");
    let without_protocols = PROTOCOL_RE.replace_all(&without_tags, "");
    without_protocols.trim().to_string()
}

/// Resolves `@name` tokens against the known participants. A token matches a
/// participant by id or by display name with whitespace removed, ignoring case.
/// Unknown tokens are dropped; results keep first-seen order without repeats.
pub fn extract_mentions(raw: &str, participants: &[User]) -> Vec<UserId> {
    let mut mentions: Vec<UserId> = Vec::new();
    for captures in MENTION_RE.captures_iter(raw) {
        let Some(token) = captures.get(1).map(|m| m.as_str().trim_end_matches('.')) else {
            continue;
        };
        let resolved = participants.iter().find(|user| {
            user.id.as_str().eq_ignore_ascii_case(token)
                || compact_name(&user.display_name).eq_ignore_ascii_case(token)
        });
        if let Some(user) = resolved {
            if !mentions.contains(&user.id) {
                mentions.push(user.id.clone());
            }
        }
    }
    mentions
}

fn compact_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Debug, Clone)]
pub struct MessageValidator {
    max_chars: usize,
}

impl MessageValidator {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn prepare(
        &self,
        conversation_id: &ConversationId,
        content: MessageContent,
        participants: &[User],
    ) -> Result<OutgoingMessage, ValidationError> {
        let (content, mention_source) = match content {
            MessageContent::Text { body } => {
                let sanitized = self.clean_required(&body, "text", "body")?;
                (MessageContent::Text { body: sanitized }, Some(body))
            }
            MessageContent::WorkoutAssignment {
                workout_id,
                title,
                note,
            } => {
                if workout_id.as_str().trim().is_empty() {
                    return Err(ValidationError::MissingField {
                        kind: "workout_assignment",
                        field: "workout_id",
                    });
                }
                let title = self.clean_required(&title, "workout_assignment", "title")?;
                let clean_note = self.clean_optional(note.as_deref())?;
                (
                    MessageContent::WorkoutAssignment {
                        workout_id,
                        title,
                        note: clean_note,
                    },
                    note,
                )
            }
            MessageContent::Image { url, caption } => {
                let url = checked_url(&url, "image")?;
                let clean_caption = self.clean_optional(caption.as_deref())?;
                (
                    MessageContent::Image {
                        url,
                        caption: clean_caption,
                    },
                    caption,
                )
            }
            MessageContent::File {
                url,
                filename,
                size_bytes,
                mime_type,
            } => {
                let url = checked_url(&url, "file")?;
                let filename = self.clean_required(&filename, "file", "filename")?;
                (
                    MessageContent::File {
                        url,
                        filename,
                        size_bytes,
                        mime_type: mime_type.map(|m| sanitize_text(&m)).filter(|m| !m.is_empty()),
                    },
                    None,
                )
            }
        };

        let mentions = mention_source
            .as_deref()
            .map(|raw| extract_mentions(raw, participants))
            .unwrap_or_default();

        Ok(OutgoingMessage {
            conversation_id: conversation_id.clone(),
            content,
            metadata: MessageMetadata { mentions },
        })
    }

    fn clean_required(
        &self,
        raw: &str,
        kind: &'static str,
        field: &'static str,
    ) -> Result<String, ValidationError> {
        if raw.trim().is_empty() {
            return Err(if field == "body" {
                ValidationError::Empty
            } else {
                ValidationError::MissingField { kind, field }
            });
        }
        let sanitized = sanitize_text(raw);
        if sanitized.is_empty() {
            return Err(ValidationError::Empty);
        }
        self.check_length(&sanitized)?;
        Ok(sanitized)
    }

    fn clean_optional(&self, raw: Option<&str>) -> Result<Option<String>, ValidationError> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let sanitized = sanitize_text(raw);
        if sanitized.is_empty() {
            return Ok(None);
        }
        self.check_length(&sanitized)?;
        Ok(Some(sanitized))
    }

    fn check_length(&self, text: &str) -> Result<(), ValidationError> {
        let actual = text.chars().count();
        if actual > self.max_chars {
            return Err(ValidationError::TooLong {
                max: self.max_chars,
                actual,
            });
        }
        Ok(())
    }
}

fn checked_url(raw: &str, kind: &'static str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { kind, field: "url" });
    }
    match Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url.to_string()),
        _ => Err(ValidationError::InvalidUrl {
            kind,
            url: trimmed.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "tests/validator_tests.rs"]
mod tests;
