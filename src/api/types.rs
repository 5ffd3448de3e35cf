use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Chat, ChatId, Message, MessageId, UserId};

/// Every response body is an envelope: `data` on success, `error` on an
/// application-level failure (the transport status stays 2xx for those).
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct NoParams {}

/// Exactly one of `page_size`/`cursor` goes on the wire: the first page
/// is requested by size, continuations by cursor alone.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatHistoryRequest {
    pub chat_id: ChatId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageRequest<'a> {
    pub message_body: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendChatMessageRequest<'a> {
    pub chat_id: ChatId,
    pub message_body: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResolveProblemRequest {
    pub chat_id: ChatId,
}

/// One message as the backend serializes it. Flags and body default so
/// the same shape covers history pages, chat listings for the manager
/// (which carry no flags) and send acks (which omit the body).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageDto {
    pub id: MessageId,
    #[serde(default)]
    pub author_id: Option<UserId>,
    #[serde(default)]
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_service: bool,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub is_received: bool,
}

impl From<MessageDto> for Message {
    fn from(dto: MessageDto) -> Self {
        Message {
            id: dto.id,
            author_id: dto.author_id,
            body: dto.body,
            created_at: dto.created_at,
            delivered: dto.is_received,
            blocked: dto.is_blocked,
            service: dto.is_service,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatDto {
    pub chat_id: ChatId,
    pub client_id: UserId,
}

impl From<ChatDto> for Chat {
    fn from(dto: ChatDto) -> Self {
        Chat {
            id: dto.chat_id,
            client_id: dto.client_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesPayload {
    pub messages: Vec<MessageDto>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatsPayload {
    pub chats: Vec<ChatDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailabilityPayload {
    pub available: bool,
}

/// One page of history, already converted to domain messages.
///
/// `messages` keeps the backend's newest-first page order; `next` is the
/// continuation cursor, `None` once no older page exists (an empty
/// string from the wire counts as exhausted too).
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub next: Option<String>,
}

impl From<MessagesPayload> for HistoryPage {
    fn from(payload: MessagesPayload) -> Self {
        HistoryPage {
            messages: payload.messages.into_iter().map(Message::from).collect(),
            next: payload.next.filter(|cursor| !cursor.is_empty()),
        }
    }
}
