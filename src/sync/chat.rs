use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::{ApiClient, ApiError};
use crate::models::Message;
use crate::stream::ChatEvent;
use crate::view::{Position, ViewDelta};

use super::{emit, merge_one, merge_page, Timeline};

/// Synchronization core for the customer's single conversation.
pub struct ClientChat {
    api: ApiClient,
    timeline: Timeline,
    cursor: Option<String>,
    deltas: UnboundedSender<ViewDelta>,
}

impl ClientChat {
    /// Returns the core and the delta feed the renderer consumes.
    pub fn new(api: ApiClient) -> (Self, UnboundedReceiver<ViewDelta>) {
        let (deltas, feed) = mpsc::unbounded_channel();
        (
            ClientChat {
                api,
                timeline: Timeline::new(),
                cursor: None,
                deltas,
            },
            feed,
        )
    }

    /// Loads the most recent page; the starting view of the chat.
    pub async fn load_initial(&mut self) {
        match self.api.get_history(None).await {
            Ok(page) => self.cursor = merge_page(&mut self.timeline, &self.deltas, page),
            Err(err) => self.report_failure("load history", err),
        }
    }

    /// Loads one older page, the reaction to scrolling to the top. With
    /// no stored cursor there is nothing left; that is reported, not
    /// fetched. A repeated trigger racing a fresh cursor at worst
    /// refetches an overlapping page, which dedup absorbs.
    pub async fn load_older(&mut self) {
        let Some(cursor) = self.cursor.clone() else {
            emit(&self.deltas, ViewDelta::NoMoreHistory);
            return;
        };
        match self.api.get_history(Some(&cursor)).await {
            Ok(page) => self.cursor = merge_page(&mut self.timeline, &self.deltas, page),
            Err(err) => self.report_failure("load older messages", err),
        }
    }

    /// Sends `body` and appends the acknowledged message. The ack omits
    /// the body, so the local input is re-injected before the merge.
    /// Empty input is ignored outright. `delivered` stays false until
    /// the backend confirms over the stream.
    pub async fn send(&mut self, body: &str) {
        if body.is_empty() {
            return;
        }
        match self.api.send_message(body).await {
            Ok(mut message) => {
                message.body = body.to_string();
                merge_one(&mut self.timeline, &self.deltas, message, Position::End);
            }
            Err(err) => self.report_failure("send message", err),
        }
    }

    /// Applies one stream event. Manager-side events have no business on
    /// this stream and are dropped quietly.
    pub fn handle_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::NewMessageEvent {
                message_id,
                author_id,
                body,
                created_at,
                is_service,
                ..
            } => {
                let message = Message {
                    id: message_id,
                    author_id,
                    body,
                    created_at,
                    delivered: false,
                    blocked: false,
                    service: is_service,
                };
                merge_one(&mut self.timeline, &self.deltas, message, Position::End);
            }
            ChatEvent::MessageSentEvent { message_id } => {
                match self.timeline.set_delivered(message_id) {
                    Some(true) => emit(&self.deltas, ViewDelta::MessageDelivered { message_id }),
                    Some(false) => {}
                    // Acks are not buffered for ids we never saw; a
                    // later history pull carries the flag anyway.
                    None => debug!("delivery ack for unknown message {message_id}"),
                }
            }
            ChatEvent::MessageBlockedEvent { message_id } => {
                match self.timeline.set_blocked(message_id) {
                    Some(true) => emit(&self.deltas, ViewDelta::MessageBlocked { message_id }),
                    Some(false) => {}
                    None => debug!("block notice for unknown message {message_id}"),
                }
            }
            ChatEvent::NewChatEvent { chat_id, .. } | ChatEvent::ChatClosedEvent { chat_id, .. } => {
                debug!("ignoring manager event for chat {chat_id}");
            }
        }
    }

    /// Drops all local state and reloads, the way a page reload would.
    pub async fn refresh(&mut self) {
        self.timeline.clear();
        self.cursor = None;
        emit(&self.deltas, ViewDelta::TimelineCleared);
        self.load_initial().await;
    }

    /// Messages oldest to newest.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.timeline.iter()
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    fn report_failure(&self, operation: &'static str, err: ApiError) {
        warn!("{operation} failed: {err}");
        emit(
            &self.deltas,
            ViewDelta::OperationFailed {
                operation,
                details: err.to_string(),
            },
        );
    }
}
