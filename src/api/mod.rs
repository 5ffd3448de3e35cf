//! Typed wrapper around the backend's JSON-over-POST endpoints.
//!
//! Every call attaches the session's bearer token and a fresh
//! `X-Request-ID`, then unwraps the `{data}`/`{error}` envelope. Calls
//! are fire-once: nothing here retries, the caller decides what a
//! failure means to the user.

mod types;

pub use types::HistoryPage;

use log::debug;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Chat, ChatId, Message};
use crate::session::Session;

use types::{
    AvailabilityPayload, ChatHistoryRequest, ChatsPayload, Envelope, HistoryRequest, MessageDto,
    MessagesPayload, NoParams, ResolveProblemRequest, SendChatMessageRequest, SendMessageRequest,
};

/// History page size requested when no cursor is in play.
pub const DEFAULT_PAGE_SIZE: usize = 10;

const REQUEST_ID_HEADER: &str = "X-Request-ID";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx transport status; the body was not consulted.
    #[error("transport failure: HTTP {status}")]
    Transport { status: StatusCode },
    /// 2xx response whose envelope carried an application error.
    #[error("backend error {code}: {message}")]
    Application { code: i32, message: String },
    /// 2xx success envelope with no payload where one was expected.
    #[error("success envelope carried no data")]
    MissingData,
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// REST gateway client for one signed-in user. Cheap to clone; clones
/// share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: &Session) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        ApiClient {
            http: reqwest::Client::new(),
            base_url,
            token: session.token().to_string(),
        }
    }

    /// Latest page of the customer's own conversation (no cursor), or a
    /// continuation when `cursor` is given.
    pub async fn get_history(&self, cursor: Option<&str>) -> Result<HistoryPage, ApiError> {
        let request = history_request(cursor);
        let payload: MessagesPayload = self.post("/getHistory", &request).await?;
        Ok(payload.into())
    }

    pub async fn send_message(&self, body: &str) -> Result<Message, ApiError> {
        self.send_message_with_request_id(body, Uuid::new_v4()).await
    }

    /// Same as [`send_message`](Self::send_message) with a pinned
    /// correlation id. The backend deduplicates sends by that id, so
    /// resending with the same one cannot create a second message.
    pub async fn send_message_with_request_id(
        &self,
        body: &str,
        request_id: Uuid,
    ) -> Result<Message, ApiError> {
        let request = SendMessageRequest { message_body: body };
        let dto: MessageDto = self
            .post_with_id("/sendMessage", &request, request_id)
            .await?;
        Ok(dto.into())
    }

    /// All conversations currently requiring this manager's attention.
    pub async fn get_chats(&self) -> Result<Vec<Chat>, ApiError> {
        let payload: ChatsPayload = self.post("/getChats", &NoParams {}).await?;
        Ok(payload.chats.into_iter().map(Chat::from).collect())
    }

    pub async fn get_chat_history(
        &self,
        chat_id: ChatId,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, ApiError> {
        let paging = history_request(cursor);
        let request = ChatHistoryRequest {
            chat_id,
            page_size: paging.page_size,
            cursor: paging.cursor,
        };
        let payload: MessagesPayload = self.post("/getChatHistory", &request).await?;
        Ok(payload.into())
    }

    pub async fn send_chat_message(&self, chat_id: ChatId, body: &str) -> Result<Message, ApiError> {
        self.send_chat_message_with_request_id(chat_id, body, Uuid::new_v4())
            .await
    }

    pub async fn send_chat_message_with_request_id(
        &self,
        chat_id: ChatId,
        body: &str,
        request_id: Uuid,
    ) -> Result<Message, ApiError> {
        let request = SendChatMessageRequest {
            chat_id,
            message_body: body,
        };
        let dto: MessageDto = self
            .post_with_id("/sendMessage", &request, request_id)
            .await?;
        Ok(dto.into())
    }

    /// Whether the manager may signal readiness for another assignment.
    pub async fn get_free_hands_availability(&self) -> Result<bool, ApiError> {
        let payload: AvailabilityPayload = self
            .post("/getFreeHandsBtnAvailability", &NoParams {})
            .await?;
        Ok(payload.available)
    }

    /// Signals readiness; assignments then arrive over the event stream.
    pub async fn free_hands(&self) -> Result<(), ApiError> {
        self.post_ack("/freeHands", &NoParams {}).await
    }

    pub async fn resolve_problem(&self, chat_id: ChatId) -> Result<(), ApiError> {
        self.post_ack("/resolveProblem", &ResolveProblemRequest { chat_id })
            .await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        request: &impl Serialize,
    ) -> Result<T, ApiError> {
        self.post_with_id(path, request, Uuid::new_v4()).await
    }

    async fn post_with_id<T: DeserializeOwned>(
        &self,
        path: &str,
        request: &impl Serialize,
        request_id: Uuid,
    ) -> Result<T, ApiError> {
        self.call(path, request, request_id)
            .await?
            .data
            .ok_or(ApiError::MissingData)
    }

    /// Endpoints that acknowledge with `data: null`.
    async fn post_ack(&self, path: &str, request: &impl Serialize) -> Result<(), ApiError> {
        self.call::<serde_json::Value>(path, request, Uuid::new_v4())
            .await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        request: &impl Serialize,
        request_id: Uuid,
    ) -> Result<Envelope<T>, ApiError> {
        debug!("POST {path} [{request_id}]");
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Transport { status });
        }

        let envelope: Envelope<T> = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(ApiError::Application {
                code: error.code,
                message: error.message,
            });
        }
        Ok(envelope)
    }
}

fn history_request(cursor: Option<&str>) -> HistoryRequest {
    match cursor {
        Some(cursor) => HistoryRequest {
            page_size: None,
            cursor: Some(cursor.to_string()),
        },
        None => HistoryRequest {
            page_size: Some(DEFAULT_PAGE_SIZE),
            cursor: None,
        },
    }
}
