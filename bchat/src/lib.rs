//! Chat orchestration for the bellhop relay.
//!
//! [`ChatService`] owns the per-message pipeline: reject blank input,
//! gate on bans, replay recent history, obtain a completion through the
//! provider pool, and persist the finished exchange atomically.

mod error;
mod service;
mod types;

pub use error::{ChatError, ChatErrorKind};
pub use service::ChatService;
pub use types::{ChatConfig, ChatReply};
