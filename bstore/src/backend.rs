//! Store trait, backend selection, and the in-memory implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use bcommon::{BoxFuture, UserId};
use bprovider::{Message, Role};

use crate::backends::sqlite::default_sqlite_path;
use crate::cache::BanCache;
use crate::error::StoreError;
use crate::types::{BanRecord, UserProfile, UserRecord, UserStats};

pub use crate::backends::sqlite::SqliteUserStore;

/// Durable CRUD over users, conversation turns, and bans.
///
/// Every operation may fail with a `Storage`-kind error when the
/// underlying store is unavailable; callers treat that as fatal to the
/// request rather than silently succeeding.
pub trait UserStore: Send + Sync {
    /// Insert or update the user row, refreshing last-activity to now.
    /// Idempotent; the creation timestamp and message counter survive
    /// repeated upserts.
    fn upsert_user<'a>(&'a self, profile: UserProfile) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Atomically bump the counter and refresh last-activity. Affects
    /// zero rows when the user is absent; callers upsert first.
    fn increment_message_count<'a>(
        &'a self,
        user_id: UserId,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn user_stats<'a>(
        &'a self,
        user_id: UserId,
    ) -> BoxFuture<'a, Result<Option<UserStats>, StoreError>>;

    fn append_turn<'a>(
        &'a self,
        user_id: UserId,
        role: Role,
        content: String,
        tokens: u32,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Most recent `limit` turns, returned oldest to newest.
    fn recent_history<'a>(
        &'a self,
        user_id: UserId,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Message>, StoreError>>;

    fn clear_history<'a>(&'a self, user_id: UserId) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Persist one successful exchange: the user turn, the assistant
    /// turn, and the counter bump, committed atomically so a crash can
    /// never leave half an exchange behind.
    fn record_exchange<'a>(
        &'a self,
        user_id: UserId,
        user_text: String,
        assistant_text: String,
        tokens: u32,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// `days` of zero means permanent. Replaces any prior ban row and
    /// seeds the positive cache.
    fn ban<'a>(
        &'a self,
        user_id: UserId,
        reason: String,
        issued_by: UserId,
        days: u32,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn unban<'a>(&'a self, user_id: UserId) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Cache fast path first; on a store hit the cache is populated, so
    /// repeat calls skip the store for the rest of the process lifetime.
    fn is_banned<'a>(&'a self, user_id: UserId) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Cache-bypassing activity check against a caller-supplied instant.
    fn is_banned_at<'a>(
        &'a self,
        user_id: UserId,
        at: SystemTime,
    ) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// All users, highest message count first; ties break by id.
    fn list_users<'a>(&'a self) -> BoxFuture<'a, Result<Vec<UserRecord>, StoreError>>;

    /// All ban rows joined with the username where one is known.
    fn list_bans<'a>(&'a self) -> BoxFuture<'a, Result<Vec<BanRecord>, StoreError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Sqlite { path: PathBuf },
    InMemory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

pub fn create_user_store(config: StoreConfig) -> Result<Arc<dyn UserStore>, StoreError> {
    match config {
        StoreConfig::Sqlite { path } => Ok(Arc::new(SqliteUserStore::new(path)?)),
        StoreConfig::InMemory => Ok(Arc::new(InMemoryUserStore::new())),
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<UserId, UserState>>,
    bans: Mutex<HashMap<UserId, StoredBan>>,
    ban_cache: BanCache,
}

#[derive(Debug, Clone)]
struct UserState {
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    created_at: SystemTime,
    message_count: u64,
    last_activity: Option<SystemTime>,
    turns: Vec<StoredTurn>,
}

impl UserState {
    fn new(profile: &UserProfile, now: SystemTime) -> Self {
        Self {
            username: profile.username.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            created_at: now,
            message_count: 0,
            last_activity: Some(now),
            turns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredTurn {
    role: Role,
    content: String,
    // Kept for parity with the sqlite schema even though history replay
    // only needs role and content.
    #[allow(dead_code)]
    tokens: u32,
}

#[derive(Debug, Clone)]
struct StoredBan {
    reason: String,
    issued_by: UserId,
    issued_at: SystemTime,
    expires_at: Option<SystemTime>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_users(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<UserId, UserState>>, StoreError> {
        self.users
            .lock()
            .map_err(|_| StoreError::storage("in-memory user table lock poisoned"))
    }

    fn lock_bans(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<UserId, StoredBan>>, StoreError> {
        self.bans
            .lock()
            .map_err(|_| StoreError::storage("in-memory ban table lock poisoned"))
    }

    fn has_active_ban(&self, user_id: UserId, at: SystemTime) -> Result<bool, StoreError> {
        let bans = self.lock_bans()?;
        Ok(bans.get(&user_id).is_some_and(|ban| match ban.expires_at {
            None => true,
            Some(expires_at) => expires_at > at,
        }))
    }

    fn push_turn(
        users: &mut HashMap<UserId, UserState>,
        user_id: UserId,
        role: Role,
        content: String,
        tokens: u32,
    ) {
        if let Some(state) = users.get_mut(&user_id) {
            state.turns.push(StoredTurn {
                role,
                content,
                tokens,
            });
        }
    }
}

impl UserStore for InMemoryUserStore {
    fn upsert_user<'a>(&'a self, profile: UserProfile) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let now = SystemTime::now();
            let mut users = self.lock_users()?;
            let state = users
                .entry(profile.id)
                .or_insert_with(|| UserState::new(&profile, now));
            state.username = profile.username;
            state.first_name = profile.first_name;
            state.last_name = profile.last_name;
            state.last_activity = Some(now);
            Ok(())
        })
    }

    fn increment_message_count<'a>(
        &'a self,
        user_id: UserId,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut users = self.lock_users()?;
            if let Some(state) = users.get_mut(&user_id) {
                state.message_count += 1;
                state.last_activity = Some(SystemTime::now());
            }
            Ok(())
        })
    }

    fn user_stats<'a>(
        &'a self,
        user_id: UserId,
    ) -> BoxFuture<'a, Result<Option<UserStats>, StoreError>> {
        Box::pin(async move {
            let users = self.lock_users()?;
            Ok(users.get(&user_id).map(|state| UserStats {
                message_count: state.message_count,
                created_at: state.created_at,
            }))
        })
    }

    fn append_turn<'a>(
        &'a self,
        user_id: UserId,
        role: Role,
        content: String,
        tokens: u32,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut users = self.lock_users()?;
            Self::push_turn(&mut users, user_id, role, content, tokens);
            Ok(())
        })
    }

    fn recent_history<'a>(
        &'a self,
        user_id: UserId,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Message>, StoreError>> {
        Box::pin(async move {
            let users = self.lock_users()?;
            let Some(state) = users.get(&user_id) else {
                return Ok(Vec::new());
            };

            let start = state.turns.len().saturating_sub(limit);
            Ok(state.turns[start..]
                .iter()
                .map(|turn| Message::new(turn.role, turn.content.clone()))
                .collect())
        })
    }

    fn clear_history<'a>(&'a self, user_id: UserId) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut users = self.lock_users()?;
            if let Some(state) = users.get_mut(&user_id) {
                state.turns.clear();
            }
            Ok(())
        })
    }

    fn record_exchange<'a>(
        &'a self,
        user_id: UserId,
        user_text: String,
        assistant_text: String,
        tokens: u32,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut users = self.lock_users()?;
            Self::push_turn(&mut users, user_id, Role::User, user_text, 0);
            Self::push_turn(&mut users, user_id, Role::Assistant, assistant_text, tokens);
            if let Some(state) = users.get_mut(&user_id) {
                state.message_count += 1;
                state.last_activity = Some(SystemTime::now());
            }
            Ok(())
        })
    }

    fn ban<'a>(
        &'a self,
        user_id: UserId,
        reason: String,
        issued_by: UserId,
        days: u32,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let now = SystemTime::now();
            let expires_at =
                (days > 0).then(|| now + Duration::from_secs(u64::from(days) * 86_400));

            let mut bans = self.lock_bans()?;
            bans.insert(
                user_id,
                StoredBan {
                    reason,
                    issued_by,
                    issued_at: now,
                    expires_at,
                },
            );
            drop(bans);

            self.ban_cache.insert(user_id)
        })
    }

    fn unban<'a>(&'a self, user_id: UserId) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let mut bans = self.lock_bans()?;
            bans.remove(&user_id);
            drop(bans);

            self.ban_cache.remove(user_id)
        })
    }

    fn is_banned<'a>(&'a self, user_id: UserId) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            if self.ban_cache.contains(user_id)? {
                return Ok(true);
            }

            let active = self.has_active_ban(user_id, SystemTime::now())?;
            if active {
                self.ban_cache.insert(user_id)?;
            }
            Ok(active)
        })
    }

    fn is_banned_at<'a>(
        &'a self,
        user_id: UserId,
        at: SystemTime,
    ) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move { self.has_active_ban(user_id, at) })
    }

    fn list_users<'a>(&'a self) -> BoxFuture<'a, Result<Vec<UserRecord>, StoreError>> {
        Box::pin(async move {
            let users = self.lock_users()?;
            let mut records: Vec<UserRecord> = users
                .iter()
                .map(|(id, state)| UserRecord {
                    id: *id,
                    username: state.username.clone(),
                    first_name: state.first_name.clone(),
                    last_name: state.last_name.clone(),
                    created_at: state.created_at,
                    message_count: state.message_count,
                    last_activity: state.last_activity,
                })
                .collect();
            records.sort_by(|a, b| {
                b.message_count
                    .cmp(&a.message_count)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(records)
        })
    }

    fn list_bans<'a>(&'a self) -> BoxFuture<'a, Result<Vec<BanRecord>, StoreError>> {
        Box::pin(async move {
            let users = self.lock_users()?;
            let bans = self.lock_bans()?;
            let mut records: Vec<BanRecord> = bans
                .iter()
                .map(|(id, ban)| BanRecord {
                    user_id: *id,
                    username: users.get(id).and_then(|state| state.username.clone()),
                    reason: ban.reason.clone(),
                    issued_by: ban.issued_by,
                    issued_at: ban.issued_at,
                    expires_at: ban.expires_at,
                })
                .collect();
            records.sort_by_key(|record| record.user_id);
            Ok(records)
        })
    }
}
