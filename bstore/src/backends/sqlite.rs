use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bcommon::{BoxFuture, UserId};
use bprovider::{Message, Role};
use rusqlite::{Connection, OptionalExtension, params};

use crate::backend::UserStore;
use crate::cache::BanCache;
use crate::error::StoreError;
use crate::types::{BanRecord, UserProfile, UserRecord, UserStats};

const SCHEMA_VERSION: i64 = 1;

#[derive(Debug)]
pub struct SqliteUserStore {
    connection: Mutex<Connection>,
    ban_cache: BanCache,
}

impl SqliteUserStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| {
                StoreError::storage(format!("failed to create sqlite parent directory: {error}"))
            })?;
        }

        let connection = Connection::open(path).map_err(|error| {
            StoreError::storage(format!("failed to open sqlite database: {error}"))
        })?;
        Self::from_connection(connection)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(|error| {
            StoreError::storage(format!("failed to open in-memory sqlite database: {error}"))
        })?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(|error| {
                StoreError::storage(format!("failed to configure sqlite busy timeout: {error}"))
            })?;
        let store = Self {
            connection: Mutex::new(connection),
            ban_cache: BanCache::new(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::storage("sqlite store lock poisoned"))
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS schema_info (
                version INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                created_at_secs INTEGER NOT NULL,
                created_at_nanos INTEGER NOT NULL,
                message_count INTEGER NOT NULL DEFAULT 0,
                last_activity_secs INTEGER,
                last_activity_nanos INTEGER
            );

            CREATE TABLE IF NOT EXISTS conversation_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at_secs INTEGER NOT NULL,
                created_at_nanos INTEGER NOT NULL,
                tokens_used INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_turns_user_id
            ON conversation_turns(user_id, id);

            CREATE TABLE IF NOT EXISTS bans (
                user_id INTEGER PRIMARY KEY,
                reason TEXT NOT NULL,
                issued_by INTEGER NOT NULL,
                issued_at_secs INTEGER NOT NULL,
                issued_at_nanos INTEGER NOT NULL,
                expires_at_secs INTEGER,
                expires_at_nanos INTEGER
            );
            ",
        )
        .map_err(|error| {
            StoreError::storage(format!("failed to initialize sqlite schema: {error}"))
        })?;

        let version = conn
            .query_row("SELECT version FROM schema_info LIMIT 1", [], |row| {
                row.get::<_, i64>(0)
            })
            .optional()
            .map_err(|error| {
                StoreError::storage(format!("failed to read schema version: {error}"))
            })?;

        match version {
            None => {
                conn.execute(
                    "INSERT INTO schema_info (version) VALUES (?1)",
                    params![SCHEMA_VERSION],
                )
                .map_err(|error| {
                    StoreError::storage(format!("failed to write schema version: {error}"))
                })?;
                Ok(())
            }
            Some(found) if found == SCHEMA_VERSION => Ok(()),
            Some(found) => Err(StoreError::storage(format!(
                "unsupported schema version {found}, this build expects {SCHEMA_VERSION}"
            ))),
        }
    }

    fn has_active_ban(&self, user_id: UserId, at: SystemTime) -> Result<bool, StoreError> {
        let conn = self.connection()?;
        let row = conn
            .query_row(
                "SELECT expires_at_secs, expires_at_nanos FROM bans WHERE user_id = ?1",
                params![user_id.as_i64()],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                    ))
                },
            )
            .optional()
            .map_err(|error| StoreError::storage(format!("failed to query ban row: {error}")))?;

        match row {
            None => Ok(false),
            Some((None, None)) => Ok(true),
            Some((Some(secs), Some(nanos))) => Ok(decode_system_time(secs, nanos)? > at),
            Some(_) => Err(StoreError::storage(
                "ban expiry must include both seconds and nanos",
            )),
        }
    }

    fn insert_turn(
        conn: &Connection,
        user_id: UserId,
        role: Role,
        content: &str,
        tokens: u32,
    ) -> Result<(), StoreError> {
        let (secs, nanos) = encode_system_time(SystemTime::now())?;
        conn.execute(
            "
            INSERT INTO conversation_turns (
                user_id,
                role,
                content,
                created_at_secs,
                created_at_nanos,
                tokens_used
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                user_id.as_i64(),
                role_to_str(role),
                content,
                secs,
                nanos,
                i64::from(tokens),
            ],
        )
        .map_err(|error| {
            StoreError::storage(format!("failed to append conversation turn: {error}"))
        })?;
        Ok(())
    }

    fn bump_message_count(conn: &Connection, user_id: UserId) -> Result<(), StoreError> {
        let (secs, nanos) = encode_system_time(SystemTime::now())?;
        conn.execute(
            "
            UPDATE users
            SET message_count = message_count + 1,
                last_activity_secs = ?2,
                last_activity_nanos = ?3
            WHERE user_id = ?1
            ",
            params![user_id.as_i64(), secs, nanos],
        )
        .map_err(|error| {
            StoreError::storage(format!("failed to increment message count: {error}"))
        })?;
        Ok(())
    }
}

impl UserStore for SqliteUserStore {
    fn upsert_user<'a>(&'a self, profile: UserProfile) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let (secs, nanos) = encode_system_time(SystemTime::now())?;
            let conn = self.connection()?;
            conn.execute(
                "
                INSERT INTO users (
                    user_id,
                    username,
                    first_name,
                    last_name,
                    created_at_secs,
                    created_at_nanos,
                    last_activity_secs,
                    last_activity_nanos
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5, ?6)
                ON CONFLICT(user_id) DO UPDATE SET
                    username = excluded.username,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    last_activity_secs = excluded.last_activity_secs,
                    last_activity_nanos = excluded.last_activity_nanos
                ",
                params![
                    profile.id.as_i64(),
                    profile.username.as_deref(),
                    profile.first_name.as_deref(),
                    profile.last_name.as_deref(),
                    secs,
                    nanos,
                ],
            )
            .map_err(|error| StoreError::storage(format!("failed to upsert user: {error}")))?;
            Ok(())
        })
    }

    fn increment_message_count<'a>(
        &'a self,
        user_id: UserId,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            Self::bump_message_count(&conn, user_id)
        })
    }

    fn user_stats<'a>(
        &'a self,
        user_id: UserId,
    ) -> BoxFuture<'a, Result<Option<UserStats>, StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let row = conn
                .query_row(
                    "
                    SELECT message_count, created_at_secs, created_at_nanos
                    FROM users
                    WHERE user_id = ?1
                    ",
                    params![user_id.as_i64()],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                )
                .optional()
                .map_err(|error| {
                    StoreError::storage(format!("failed to query user stats: {error}"))
                })?;

            match row {
                None => Ok(None),
                Some((message_count, secs, nanos)) => Ok(Some(UserStats {
                    message_count: message_count.max(0) as u64,
                    created_at: decode_system_time(secs, nanos)?,
                })),
            }
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
            let conn = self.connection()?;
            Self::insert_turn(&conn, user_id, role, &content, tokens)
        })
    }

    fn recent_history<'a>(
        &'a self,
        user_id: UserId,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Message>, StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let mut stmt = conn
                .prepare(
                    "
                    SELECT role, content
                    FROM conversation_turns
                    WHERE user_id = ?1
                    ORDER BY id DESC
                    LIMIT ?2
                    ",
                )
                .map_err(|error| {
                    StoreError::storage(format!("failed to prepare history query: {error}"))
                })?;
            let rows = stmt
                .query_map(params![user_id.as_i64(), limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|error| {
                    StoreError::storage(format!("failed to query history rows: {error}"))
                })?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, content) = row.map_err(|error| {
                    StoreError::storage(format!("failed to read history row: {error}"))
                })?;
                messages.push(Message::new(role_from_str(&role)?, content));
            }

            // Fetched newest-first for the LIMIT, replayed oldest-first.
            messages.reverse();
            Ok(messages)
        })
    }

    fn clear_history<'a>(&'a self, user_id: UserId) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            conn.execute(
                "DELETE FROM conversation_turns WHERE user_id = ?1",
                params![user_id.as_i64()],
            )
            .map_err(|error| StoreError::storage(format!("failed to clear history: {error}")))?;
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
            let mut conn = self.connection()?;
            let tx = conn.transaction().map_err(|error| {
                StoreError::storage(format!("failed to begin exchange transaction: {error}"))
            })?;

            Self::insert_turn(&tx, user_id, Role::User, &user_text, 0)?;
            Self::insert_turn(&tx, user_id, Role::Assistant, &assistant_text, tokens)?;
            Self::bump_message_count(&tx, user_id)?;

            tx.commit().map_err(|error| {
                StoreError::storage(format!("failed to commit exchange transaction: {error}"))
            })?;
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
            let (issued_secs, issued_nanos) = encode_system_time(now)?;
            let expires = match days {
                0 => None,
                days => Some(encode_system_time(
                    now + Duration::from_secs(u64::from(days) * 86_400),
                )?),
            };

            let conn = self.connection()?;
            conn.execute(
                "
                INSERT OR REPLACE INTO bans (
                    user_id,
                    reason,
                    issued_by,
                    issued_at_secs,
                    issued_at_nanos,
                    expires_at_secs,
                    expires_at_nanos
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    user_id.as_i64(),
                    reason,
                    issued_by.as_i64(),
                    issued_secs,
                    issued_nanos,
                    expires.map(|pair| pair.0),
                    expires.map(|pair| pair.1),
                ],
            )
            .map_err(|error| StoreError::storage(format!("failed to write ban row: {error}")))?;
            drop(conn);

            self.ban_cache.insert(user_id)
        })
    }

    fn unban<'a>(&'a self, user_id: UserId) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            conn.execute(
                "DELETE FROM bans WHERE user_id = ?1",
                params![user_id.as_i64()],
            )
            .map_err(|error| StoreError::storage(format!("failed to delete ban row: {error}")))?;
            drop(conn);

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
            let conn = self.connection()?;
            let mut stmt = conn
                .prepare(
                    "
                    SELECT
                        user_id,
                        username,
                        first_name,
                        last_name,
                        created_at_secs,
                        created_at_nanos,
                        message_count,
                        last_activity_secs,
                        last_activity_nanos
                    FROM users
                    ORDER BY message_count DESC, user_id ASC
                    ",
                )
                .map_err(|error| {
                    StoreError::storage(format!("failed to prepare user listing: {error}"))
                })?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, Option<i64>>(7)?,
                        row.get::<_, Option<i64>>(8)?,
                    ))
                })
                .map_err(|error| {
                    StoreError::storage(format!("failed to query user rows: {error}"))
                })?;

            let mut records = Vec::new();
            for row in rows {
                let (
                    user_id,
                    username,
                    first_name,
                    last_name,
                    created_secs,
                    created_nanos,
                    message_count,
                    activity_secs,
                    activity_nanos,
                ) = row.map_err(|error| {
                    StoreError::storage(format!("failed to read user row: {error}"))
                })?;

                let last_activity = match (activity_secs, activity_nanos) {
                    (Some(secs), Some(nanos)) => Some(decode_system_time(secs, nanos)?),
                    _ => None,
                };

                records.push(UserRecord {
                    id: UserId::new(user_id),
                    username,
                    first_name,
                    last_name,
                    created_at: decode_system_time(created_secs, created_nanos)?,
                    message_count: message_count.max(0) as u64,
                    last_activity,
                });
            }
            Ok(records)
        })
    }

    fn list_bans<'a>(&'a self) -> BoxFuture<'a, Result<Vec<BanRecord>, StoreError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let mut stmt = conn
                .prepare(
                    "
                    SELECT
                        b.user_id,
                        u.username,
                        b.reason,
                        b.issued_by,
                        b.issued_at_secs,
                        b.issued_at_nanos,
                        b.expires_at_secs,
                        b.expires_at_nanos
                    FROM bans b
                    LEFT JOIN users u ON u.user_id = b.user_id
                    ORDER BY b.user_id ASC
                    ",
                )
                .map_err(|error| {
                    StoreError::storage(format!("failed to prepare ban listing: {error}"))
                })?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                        row.get::<_, Option<i64>>(7)?,
                    ))
                })
                .map_err(|error| {
                    StoreError::storage(format!("failed to query ban rows: {error}"))
                })?;

            let mut records = Vec::new();
            for row in rows {
                let (
                    user_id,
                    username,
                    reason,
                    issued_by,
                    issued_secs,
                    issued_nanos,
                    expires_secs,
                    expires_nanos,
                ) = row.map_err(|error| {
                    StoreError::storage(format!("failed to read ban row: {error}"))
                })?;

                let expires_at = match (expires_secs, expires_nanos) {
                    (Some(secs), Some(nanos)) => Some(decode_system_time(secs, nanos)?),
                    (None, None) => None,
                    _ => {
                        return Err(StoreError::storage(
                            "ban expiry must include both seconds and nanos",
                        ));
                    }
                };

                records.push(BanRecord {
                    user_id: UserId::new(user_id),
                    username,
                    reason,
                    issued_by: UserId::new(issued_by),
                    issued_at: decode_system_time(issued_secs, issued_nanos)?,
                    expires_at,
                });
            }
            Ok(records)
        })
    }
}

fn encode_system_time(value: SystemTime) -> Result<(i64, i64), StoreError> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        StoreError::invalid_request(format!("timestamp predates unix epoch: {error}"))
    })?;
    Ok((
        duration.as_secs() as i64,
        i64::from(duration.subsec_nanos()),
    ))
}

fn decode_system_time(seconds: i64, nanos: i64) -> Result<SystemTime, StoreError> {
    if seconds < 0 {
        return Err(StoreError::storage(format!(
            "timestamp seconds must be non-negative, got {seconds}"
        )));
    }
    if !(0..1_000_000_000).contains(&nanos) {
        return Err(StoreError::storage(format!(
            "timestamp nanos must be in [0, 1_000_000_000), got {nanos}"
        )));
    }
    Ok(UNIX_EPOCH + Duration::new(seconds as u64, nanos as u32))
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn role_from_str(value: &str) -> Result<Role, StoreError> {
    match value {
        "system" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        _ => Err(StoreError::storage(format!(
            "unknown turn role value '{value}'"
        ))),
    }
}

pub(crate) fn default_sqlite_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os("BELLHOP_SQLITE_PATH") {
        return PathBuf::from(explicit);
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".bellhop").join("bellhop.sqlite3");
    }

    PathBuf::from("bellhop.sqlite3")
}
