//! Durable user, conversation, and ban persistence for the chat relay.

mod backend;
mod cache;
mod error;
mod types;

pub mod backends;

pub use backend::{InMemoryUserStore, StoreConfig, UserStore, create_user_store};
pub use backends::sqlite::SqliteUserStore;
pub use cache::BanCache;
pub use error::{StoreError, StoreErrorKind};
pub use types::{BanRecord, UserProfile, UserRecord, UserStats};
