//! Synchronization cores: reconcile the paginated history feed (pull)
//! with the live event stream (push) into one ordered, deduplicated
//! timeline per conversation, and narrate every change to the renderer
//! as [`ViewDelta`]s.
//!
//! Each core is owned and driven by a single task, so its reactions are
//! serialized and no locks guard the state. Stream events arriving
//! while a fetch is in flight queue up in the connector channel and are
//! merged afterwards; id-keyed dedup makes any interleaving safe.

pub mod timeline;

mod chat;
mod workspace;

pub use chat::ClientChat;
pub use timeline::{Merge, Timeline};
pub use workspace::ManagerWorkspace;

use tokio::sync::mpsc::UnboundedSender;

use crate::api::HistoryPage;
use crate::models::Message;
use crate::view::{Position, ViewDelta};

/// A dropped renderer just means nobody watches anymore; the cores keep
/// their state consistent regardless.
fn emit(deltas: &UnboundedSender<ViewDelta>, delta: ViewDelta) {
    let _ = deltas.send(delta);
}

/// Merges one message at the given end and narrates the outcome: an
/// insert delta for a new id, flag deltas for a known one.
fn merge_one(
    timeline: &mut Timeline,
    deltas: &UnboundedSender<ViewDelta>,
    message: Message,
    position: Position,
) {
    let message_id = message.id;
    let snapshot = message.clone();
    let outcome = match position {
        Position::Start => timeline.merge_front(message),
        Position::End => timeline.merge_back(message),
    };
    match outcome {
        Merge::Inserted => emit(
            deltas,
            ViewDelta::MessageInserted {
                message: snapshot,
                position,
            },
        ),
        Merge::Merged { delivered, blocked } => {
            if delivered {
                emit(deltas, ViewDelta::MessageDelivered { message_id });
            }
            if blocked {
                emit(deltas, ViewDelta::MessageBlocked { message_id });
            }
        }
    }
}

/// Applies a newest-first history page at the older end and returns the
/// continuation cursor, `None` when the backend has nothing older.
fn merge_page(
    timeline: &mut Timeline,
    deltas: &UnboundedSender<ViewDelta>,
    page: HistoryPage,
) -> Option<String> {
    for message in page.messages {
        merge_one(timeline, deltas, message, Position::Start);
    }
    page.next
}
