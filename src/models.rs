use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type MessageId = Uuid;
pub type ChatId = Uuid;
pub type UserId = Uuid;

/// A single chat message as the client sees it.
///
/// `id` is assigned by the backend and is the sole deduplication key:
/// the same message may reach us through a history page and a stream
/// event, and both must collapse onto one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    /// Absent for service-generated messages.
    pub author_id: Option<UserId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// The server acknowledged receipt. Never goes back to `false`.
    pub delivered: bool,
    /// The server suppressed the message after the fact; the view shows
    /// a redaction notice instead of the body. Never goes back to `false`.
    pub blocked: bool,
    /// System-authored (assignment notices and the like).
    pub service: bool,
}

/// A conversation awaiting a support manager's attention.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    pub client_id: UserId,
}
