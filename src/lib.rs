// Client-side cores and protocol plumbing for the support-desk chat.
pub mod api;
pub mod models;
pub mod session;
pub mod stream;
pub mod sync;
pub mod view;

// Re-export the types a front end wires together.
pub use api::{ApiClient, ApiError};
pub use models::{Chat, ChatId, Message, MessageId, UserId};
pub use session::Session;
pub use stream::{ChatEvent, EventStream, StreamConfig, StreamState};
pub use sync::{ClientChat, ManagerWorkspace, Timeline};
pub use view::{Position, ViewDelta};
