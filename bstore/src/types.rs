//! Persisted record types for users, history stats, and bans.

use std::time::SystemTime;

use bcommon::UserId;

/// Identity fields carried by every inbound transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserProfile {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    /// Best display name for listings: first name, then username, then id.
    pub fn display_name(&self) -> String {
        self.first_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| format!("ID{}", self.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: SystemTime,
    pub message_count: u64,
    pub last_activity: Option<SystemTime>,
}

impl UserRecord {
    pub fn display_name(&self) -> String {
        self.first_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| format!("ID{}", self.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserStats {
    pub message_count: u64,
    pub created_at: SystemTime,
}

/// One access restriction. At most one row per user; a new ban replaces
/// the old one. `expires_at` of `None` means permanent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub user_id: UserId,
    pub username: Option<String>,
    pub reason: String,
    pub issued_by: UserId,
    pub issued_at: SystemTime,
    pub expires_at: Option<SystemTime>,
}

impl BanRecord {
    /// Active iff there is no expiry or the expiry is strictly after `at`.
    pub fn is_active_at(&self, at: SystemTime) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > at,
        }
    }
}
