use crate::models::{Chat, ChatId, Message, MessageId};

/// Where a newly merged message lands in the rendered timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Prepended at the older end (history page entry).
    Start,
    /// Appended at the newer end (live event or send response).
    End,
}

/// Ordered updates the synchronization cores emit toward the renderer.
///
/// The renderer applies these verbatim, in order, and holds no merge or
/// ordering logic of its own. Deltas never duplicate: a flag flip is
/// reported once, an already-known message produces no insert.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewDelta {
    MessageInserted {
        message: Message,
        position: Position,
    },
    MessageDelivered {
        message_id: MessageId,
    },
    MessageBlocked {
        message_id: MessageId,
    },
    /// Backward pagination is exhausted. A report, not an error.
    NoMoreHistory,
    TimelineCleared,
    ChatOpened {
        chat: Chat,
    },
    ChatClosed {
        chat_id: ChatId,
    },
    ChatSelected {
        chat_id: Option<ChatId>,
    },
    FreeHandsAvailable {
        available: bool,
    },
    /// The ready-for-work signal was accepted; assignment comes later
    /// as a `NewChatEvent`.
    FreeHandsWaiting,
    /// A gateway call failed. `operation` names what the user attempted;
    /// core state is unchanged and the user may simply retry.
    OperationFailed {
        operation: &'static str,
        details: String,
    },
}
