use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::{ApiClient, ApiError};
use crate::models::{Chat, ChatId, Message};
use crate::stream::ChatEvent;
use crate::view::{Position, ViewDelta};

use super::{emit, merge_one, merge_page, Timeline};

/// Synchronization core for a support manager's workspace: the list of
/// assigned conversations, the timeline of the one selected, and the
/// free-hands availability gate.
///
/// Only the selected conversation has a timeline; switching selection
/// discards it along with its cursor, and message events for any other
/// conversation are suppressed outright.
pub struct ManagerWorkspace {
    api: ApiClient,
    chats: Vec<Chat>,
    selected: Option<ChatId>,
    timeline: Timeline,
    cursor: Option<String>,
    can_take_more: bool,
    waiting: bool,
    deltas: UnboundedSender<ViewDelta>,
}

impl ManagerWorkspace {
    /// Returns the core and the delta feed the renderer consumes.
    pub fn new(api: ApiClient) -> (Self, UnboundedReceiver<ViewDelta>) {
        let (deltas, feed) = mpsc::unbounded_channel();
        (
            ManagerWorkspace {
                api,
                chats: Vec::new(),
                selected: None,
                timeline: Timeline::new(),
                cursor: None,
                can_take_more: false,
                waiting: false,
                deltas,
            },
            feed,
        )
    }

    /// Initial load and page-reload equivalent: forgets everything,
    /// queries availability and the chat list concurrently, then opens
    /// the first listed chat.
    pub async fn refresh(&mut self) {
        self.chats.clear();
        self.timeline.clear();
        self.cursor = None;
        self.waiting = false;
        if self.selected.take().is_some() {
            emit(&self.deltas, ViewDelta::ChatSelected { chat_id: None });
        }
        emit(&self.deltas, ViewDelta::TimelineCleared);

        let (availability, chats) = tokio::join!(
            self.api.get_free_hands_availability(),
            self.api.get_chats(),
        );
        match availability {
            Ok(available) => {
                self.can_take_more = available;
                emit(&self.deltas, ViewDelta::FreeHandsAvailable { available });
            }
            Err(err) => self.report_failure("check availability", err),
        }
        match chats {
            Ok(list) => {
                for chat in list {
                    self.append_chat(chat);
                }
                if let Some(first) = self.chats.first().map(|chat| chat.id) {
                    self.select_chat(first).await;
                }
            }
            Err(err) => self.report_failure("load chats", err),
        }
    }

    /// Opens `chat_id`: discards the previous selection's timeline and
    /// cursor outright and loads the latest page of the new one.
    /// Re-selecting the open chat is a no-op.
    pub async fn select_chat(&mut self, chat_id: ChatId) {
        if self.selected == Some(chat_id) {
            return;
        }
        if !self.chats.iter().any(|chat| chat.id == chat_id) {
            warn!("cannot open unknown chat {chat_id}");
            emit(
                &self.deltas,
                ViewDelta::OperationFailed {
                    operation: "open chat",
                    details: format!("unknown chat {chat_id}"),
                },
            );
            return;
        }
        self.selected = Some(chat_id);
        self.timeline.clear();
        self.cursor = None;
        emit(
            &self.deltas,
            ViewDelta::ChatSelected {
                chat_id: Some(chat_id),
            },
        );
        emit(&self.deltas, ViewDelta::TimelineCleared);
        match self.api.get_chat_history(chat_id, None).await {
            Ok(page) => self.cursor = merge_page(&mut self.timeline, &self.deltas, page),
            Err(err) => self.report_failure("load chat history", err),
        }
    }

    /// Loads one older page of the selected conversation. No selection
    /// implies no cursor, so both fall through to the same report.
    pub async fn load_older(&mut self) {
        let (Some(chat_id), Some(cursor)) = (self.selected, self.cursor.clone()) else {
            emit(&self.deltas, ViewDelta::NoMoreHistory);
            return;
        };
        match self.api.get_chat_history(chat_id, Some(&cursor)).await {
            Ok(page) => self.cursor = merge_page(&mut self.timeline, &self.deltas, page),
            Err(err) => self.report_failure("load older messages", err),
        }
    }

    /// Sends `body` into the selected conversation; see
    /// [`ClientChat::send`](super::ClientChat::send) for the merge
    /// contract. Without a selection this is a user-visible refusal.
    pub async fn send(&mut self, body: &str) {
        if body.is_empty() {
            return;
        }
        let Some(chat_id) = self.selected else {
            emit(
                &self.deltas,
                ViewDelta::OperationFailed {
                    operation: "send message",
                    details: "no chat selected".to_string(),
                },
            );
            return;
        };
        match self.api.send_chat_message(chat_id, body).await {
            Ok(mut message) => {
                message.body = body.to_string();
                merge_one(&mut self.timeline, &self.deltas, message, Position::End);
            }
            Err(err) => self.report_failure("send message", err),
        }
    }

    /// Signals readiness for the next assignment. Refused locally while
    /// already waiting or over capacity; the backend answers with a
    /// `NewChatEvent` over the stream, never through this call.
    pub async fn free_hands(&mut self) {
        if self.waiting {
            debug!("free hands already signalled, still waiting");
            return;
        }
        if !self.can_take_more {
            warn!("free hands refused: capacity exhausted");
            return;
        }
        match self.api.free_hands().await {
            Ok(()) => {
                self.waiting = true;
                emit(&self.deltas, ViewDelta::FreeHandsWaiting);
            }
            Err(err) => self.report_failure("signal free hands", err),
        }
    }

    /// Resolves the selected conversation. Success clears only the
    /// visible timeline; the list entry and the selection fall away when
    /// the backend confirms with a `ChatClosedEvent`, the same way every
    /// other manager learns of it.
    pub async fn resolve(&mut self) {
        let Some(chat_id) = self.selected else {
            emit(
                &self.deltas,
                ViewDelta::OperationFailed {
                    operation: "resolve problem",
                    details: "no chat selected".to_string(),
                },
            );
            return;
        };
        match self.api.resolve_problem(chat_id).await {
            Ok(()) => {
                self.timeline.clear();
                self.cursor = None;
                emit(&self.deltas, ViewDelta::TimelineCleared);
            }
            Err(err) => self.report_failure("resolve problem", err),
        }
    }

    /// Applies one stream event.
    pub async fn handle_event(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::NewChatEvent {
                chat_id,
                client_id,
                can_take_more_problems,
            } => {
                // An assignment ends the waiting state and always
                // carries the fresh capacity verdict.
                self.waiting = false;
                self.can_take_more = can_take_more_problems;
                emit(
                    &self.deltas,
                    ViewDelta::FreeHandsAvailable {
                        available: can_take_more_problems,
                    },
                );
                self.append_chat(Chat {
                    id: chat_id,
                    client_id,
                });
                // The first chat of an empty workspace opens itself.
                if self.chats.len() == 1 {
                    let only = self.chats[0].id;
                    self.select_chat(only).await;
                }
            }
            ChatEvent::NewMessageEvent {
                message_id,
                author_id,
                body,
                created_at,
                is_service,
                chat_id,
            } => match (chat_id, self.selected) {
                (Some(chat), Some(selected)) if chat == selected => {
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
                _ => debug!("suppressing message event for unselected chat {chat_id:?}"),
            },
            ChatEvent::ChatClosedEvent {
                chat_id,
                can_take_more_problems,
            } => {
                // Capacity signals are ignored while waiting; the next
                // assignment overrides them anyway.
                if !self.waiting {
                    self.can_take_more = can_take_more_problems;
                    emit(
                        &self.deltas,
                        ViewDelta::FreeHandsAvailable {
                            available: can_take_more_problems,
                        },
                    );
                }
                if self.selected == Some(chat_id) {
                    self.selected = None;
                    self.timeline.clear();
                    self.cursor = None;
                    emit(&self.deltas, ViewDelta::ChatSelected { chat_id: None });
                    emit(&self.deltas, ViewDelta::TimelineCleared);
                }
                if let Some(index) = self.chats.iter().position(|chat| chat.id == chat_id) {
                    self.chats.remove(index);
                    emit(&self.deltas, ViewDelta::ChatClosed { chat_id });
                }
            }
            ChatEvent::MessageSentEvent { message_id }
            | ChatEvent::MessageBlockedEvent { message_id } => {
                debug!("ignoring customer event for message {message_id}");
            }
        }
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn selected_chat(&self) -> Option<ChatId> {
        self.selected
    }

    /// Messages of the selected conversation, oldest to newest.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.timeline.iter()
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn can_take_more(&self) -> bool {
        self.can_take_more
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    fn append_chat(&mut self, chat: Chat) {
        if self.chats.iter().any(|known| known.id == chat.id) {
            return;
        }
        emit(&self.deltas, ViewDelta::ChatOpened { chat: chat.clone() });
        self.chats.push(chat);
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
