use std::error::Error;
use std::fmt::{Display, Formatter};

use bstore::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatErrorKind {
    InvalidRequest,
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError {
    pub kind: ChatErrorKind,
    pub message: String,
}

impl ChatError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: ChatErrorKind::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self {
            kind: ChatErrorKind::Store,
            message: message.into(),
        }
    }
}

impl Display for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ChatErrorKind::InvalidRequest => "invalid request",
            ChatErrorKind::Store => "store error",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

impl Error for ChatError {}

impl From<StoreError> for ChatError {
    fn from(error: StoreError) -> Self {
        Self::store(error.to_string())
    }
}
