use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{ChatId, MessageId, UserId};

/// Server-pushed events, discriminated by the `eventType` field of each
/// frame. Variant names match the wire tags exactly.
///
/// Frames also carry `eventId` and `requestId` correlation fields; those
/// are visible in the connector's frame-level debug log and ignored
/// here, like any other field a newer backend might add.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "eventType")]
pub enum ChatEvent {
    /// A message became visible in a conversation. The customer stream
    /// omits `chatId` (there is only one conversation) and the manager
    /// stream omits `isService`.
    #[serde(rename_all = "camelCase")]
    NewMessageEvent {
        message_id: MessageId,
        #[serde(default)]
        author_id: Option<UserId>,
        #[serde(default)]
        body: String,
        created_at: DateTime<Utc>,
        #[serde(default)]
        is_service: bool,
        #[serde(default)]
        chat_id: Option<ChatId>,
    },
    /// The backend accepted and persisted a previously sent message.
    #[serde(rename_all = "camelCase")]
    MessageSentEvent { message_id: MessageId },
    /// The backend suppressed a message after review.
    #[serde(rename_all = "camelCase")]
    MessageBlockedEvent { message_id: MessageId },
    /// A conversation was assigned to this manager.
    #[serde(rename_all = "camelCase")]
    NewChatEvent {
        chat_id: ChatId,
        client_id: UserId,
        can_take_more_problems: bool,
    },
    /// A conversation was resolved and left every manager's list.
    #[serde(rename_all = "camelCase")]
    ChatClosedEvent {
        chat_id: ChatId,
        can_take_more_problems: bool,
    },
}
