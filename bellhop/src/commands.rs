//! Command surface: parsing inbound text and rendering Markdown replies.
//!
//! The transport binding hands every inbound event to
//! [`CommandRouter::handle`], which always produces a reply string. Any
//! internal failure is logged server-side and replaced with a generic
//! message, so the router never panics and never returns silence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use bchat::{ChatError, ChatReply, ChatService};
use bcommon::UserId;
use bstore::{StoreError, UserProfile, UserStore};
use chrono::{DateTime, Utc};

const BAN_USAGE: &str = "Usage: /ban <user_id> <reason> [days]";
const UNBAN_USAGE: &str = "Usage: /unban <user_id>";
const GENERIC_FAILURE: &str =
    "Something went wrong on our side. Please try again in a moment.";
const INSUFFICIENT_PRIVILEGES: &str = "Insufficient privileges.";

/// Identity fields carried by one inbound transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserIdentity {
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

    pub fn display_name(&self) -> String {
        self.first_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| format!("ID{}", self.id))
    }

    fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Clear,
    Stats,
    Info,
    AdminStats,
    Ban {
        target: UserId,
        reason: String,
        days: u32,
    },
    Unban {
        target: UserId,
    },
    ListBanned,
    Chat(String),
}

/// Parse failure carrying the usage hint to show the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParseError {
    pub usage: String,
}

impl CommandParseError {
    fn new(usage: impl Into<String>) -> Self {
        Self {
            usage: usage.into(),
        }
    }
}

impl Command {
    /// Classify one inbound message. Text that does not start with `/`
    /// is a chat message; malformed commands never have partial effect.
    pub fn parse(text: &str) -> Result<Self, CommandParseError> {
        let text = text.trim();
        if !text.starts_with('/') {
            return Ok(Self::Chat(text.to_string()));
        }

        let mut tokens = text.split_whitespace();
        let head = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        match head {
            "/start" => Ok(Self::Start),
            "/clear" => Ok(Self::Clear),
            "/stats" => Ok(Self::Stats),
            "/info" => Ok(Self::Info),
            "/admin_stats" => Ok(Self::AdminStats),
            "/list_banned" => Ok(Self::ListBanned),
            "/ban" => parse_ban(&args),
            "/unban" => parse_unban(&args),
            other => Err(CommandParseError::new(format!(
                "Unknown command {other}. Send plain text to chat, or /info for help."
            ))),
        }
    }
}

fn parse_ban(args: &[&str]) -> Result<Command, CommandParseError> {
    if args.len() < 2 {
        return Err(CommandParseError::new(BAN_USAGE));
    }

    let target = args[0]
        .parse::<i64>()
        .map(UserId::new)
        .map_err(|_| CommandParseError::new(BAN_USAGE))?;

    // A trailing integer is the optional day count; everything between
    // the id and it is the reason.
    let (reason_tokens, days) = match args[args.len() - 1].parse::<u32>() {
        Ok(days) if args.len() > 2 => (&args[1..args.len() - 1], days),
        _ => (&args[1..], 0),
    };

    if reason_tokens.is_empty() {
        return Err(CommandParseError::new(BAN_USAGE));
    }

    Ok(Command::Ban {
        target,
        reason: reason_tokens.join(" "),
        days,
    })
}

fn parse_unban(args: &[&str]) -> Result<Command, CommandParseError> {
    match args {
        [raw] => raw
            .parse::<i64>()
            .map(|id| Command::Unban {
                target: UserId::new(id),
            })
            .map_err(|_| CommandParseError::new(UNBAN_USAGE)),
        _ => Err(CommandParseError::new(UNBAN_USAGE)),
    }
}

pub struct CommandRouter {
    chat: Arc<ChatService>,
    store: Arc<dyn UserStore>,
    admins: HashSet<UserId>,
}

impl CommandRouter {
    pub fn new(
        chat: Arc<ChatService>,
        store: Arc<dyn UserStore>,
        admins: HashSet<UserId>,
    ) -> Self {
        Self {
            chat,
            store,
            admins,
        }
    }

    /// Process one inbound event and produce the reply to send back.
    pub async fn handle(&self, identity: &UserIdentity, text: &str) -> String {
        if let Err(error) = self.store.upsert_user(identity.profile()).await {
            tracing::error!(user_id = %identity.id, error = %error, "user upsert failed");
            return GENERIC_FAILURE.to_string();
        }

        let command = match Command::parse(text) {
            Ok(command) => command,
            Err(parse_error) => return parse_error.usage,
        };

        match self.dispatch(identity, command).await {
            Ok(reply) => reply,
            Err(error) => match error.user_visible() {
                Some(message) => message.to_string(),
                None => {
                    tracing::error!(user_id = %identity.id, error = %error, "command dispatch failed");
                    GENERIC_FAILURE.to_string()
                }
            },
        }
    }

    async fn dispatch(
        &self,
        identity: &UserIdentity,
        command: Command,
    ) -> Result<String, RouterError> {
        match command {
            Command::Start => Ok(welcome_text(&identity.display_name())),
            Command::Info => Ok(info_text()),
            Command::Chat(text) => self.relay_chat(identity, &text).await,
            Command::Clear => {
                self.store.clear_history(identity.id).await?;
                Ok("*Conversation history cleared.*".to_string())
            }
            Command::Stats => self.render_stats(identity).await,
            Command::AdminStats => {
                self.authorized(identity)?;
                self.render_admin_stats().await
            }
            Command::Ban {
                target,
                reason,
                days,
            } => {
                self.authorized(identity)?;
                self.store
                    .ban(target, reason.clone(), identity.id, days)
                    .await?;
                let duration = if days == 0 {
                    "forever".to_string()
                } else {
                    format!("for {days} days")
                };
                Ok(format!("User {target} banned {duration}. Reason: {reason}"))
            }
            Command::Unban { target } => {
                self.authorized(identity)?;
                self.store.unban(target).await?;
                Ok(format!("User {target} unbanned."))
            }
            Command::ListBanned => {
                self.authorized(identity)?;
                self.render_ban_list().await
            }
        }
    }

    async fn relay_chat(
        &self,
        identity: &UserIdentity,
        text: &str,
    ) -> Result<String, RouterError> {
        match self.chat.process_message(identity.id, text).await? {
            ChatReply::Assistant { text, .. } => Ok(text),
            ChatReply::AccessRestricted => {
                Ok("Access to the assistant is restricted for this account.".to_string())
            }
            ChatReply::ProvidersUnavailable => {
                Ok("All assistants are busy right now. Please try again in a minute.".to_string())
            }
        }
    }

    async fn render_stats(&self, identity: &UserIdentity) -> Result<String, RouterError> {
        let Some(stats) = self.store.user_stats(identity.id).await? else {
            return Ok("No statistics recorded for this account yet.".to_string());
        };

        Ok(format!(
            "*Your statistics*\n\n\
             *Messages sent:* {}\n\
             *Registered:* {}",
            stats.message_count,
            format_date(stats.created_at)
        ))
    }

    async fn render_admin_stats(&self) -> Result<String, RouterError> {
        let users = self.store.list_users().await?;
        let bans = self.store.list_bans().await?;
        let total_messages: u64 = users.iter().map(|user| user.message_count).sum();

        let mut reply = format!(
            "*Relay statistics*\n\n\
             *Users:* {}\n\
             *Banned:* {}\n\
             *Messages relayed:* {}\n",
            users.len(),
            bans.len(),
            total_messages
        );

        if !users.is_empty() {
            reply.push_str("\n*Most active:*\n");
            for (position, user) in users.iter().take(5).enumerate() {
                reply.push_str(&format!(
                    "{}. {} (ID: {}) - {} messages\n",
                    position + 1,
                    user.display_name(),
                    user.id,
                    user.message_count
                ));
            }
        }

        Ok(reply)
    }

    async fn render_ban_list(&self) -> Result<String, RouterError> {
        let bans = self.store.list_bans().await?;
        if bans.is_empty() {
            return Ok("No banned users.".to_string());
        }

        let mut reply = "*Banned users:*\n\n".to_string();
        for (position, ban) in bans.iter().enumerate() {
            let name = ban
                .username
                .clone()
                .unwrap_or_else(|| format!("ID{}", ban.user_id));
            let duration = match ban.expires_at {
                None => "Permanent".to_string(),
                Some(expires_at) => format!("Until {}", format_date(expires_at)),
            };
            reply.push_str(&format!(
                "{}. {} (ID: {})\nReason: {}\n{}\n\n",
                position + 1,
                name,
                ban.user_id,
                ban.reason,
                duration
            ));
        }

        Ok(reply)
    }

    fn authorized(&self, identity: &UserIdentity) -> Result<(), RouterError> {
        if self.admins.contains(&identity.id) {
            Ok(())
        } else {
            Err(RouterError::Unauthorized)
        }
    }
}

fn welcome_text(name: &str) -> String {
    format!(
        "Hello, {name}!\n\n\
         I relay your messages to a pool of language model assistants and \
         keep the conversation going across replies.\n\n\
         Commands:\n\
         /clear - clear conversation history\n\
         /stats - your statistics\n\
         /info - about this bot\n\n\
         Just send a message to start."
    )
}

fn info_text() -> String {
    "*About this bot*\n\n\
     Messages are relayed to the first available assistant in a pool of \
     interchangeable language model backends. Recent conversation turns \
     are replayed so replies stay in context.\n\n\
     /clear forgets the current conversation.\n\
     /stats shows your message count and registration date."
        .to_string()
}

fn format_date(value: SystemTime) -> String {
    DateTime::<Utc>::from(value).format("%Y-%m-%d").to_string()
}

#[derive(Debug)]
enum RouterError {
    Unauthorized,
    Chat(ChatError),
    Store(StoreError),
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("sender is not an administrator"),
            Self::Chat(error) => write!(f, "{error}"),
            Self::Store(error) => write!(f, "{error}"),
        }
    }
}

impl From<ChatError> for RouterError {
    fn from(error: ChatError) -> Self {
        Self::Chat(error)
    }
}

impl From<StoreError> for RouterError {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

impl RouterError {
    fn user_visible(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized => Some(INSUFFICIENT_PRIVILEGES),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_chat_message() {
        assert_eq!(
            Command::parse("what is the weather?"),
            Ok(Command::Chat("what is the weather?".to_string()))
        );
    }

    #[test]
    fn simple_commands_parse() {
        assert_eq!(Command::parse("/start"), Ok(Command::Start));
        assert_eq!(Command::parse("/clear"), Ok(Command::Clear));
        assert_eq!(Command::parse("/stats"), Ok(Command::Stats));
        assert_eq!(Command::parse("/info"), Ok(Command::Info));
        assert_eq!(Command::parse("/admin_stats"), Ok(Command::AdminStats));
        assert_eq!(Command::parse("/list_banned"), Ok(Command::ListBanned));
    }

    #[test]
    fn ban_parses_reason_and_optional_days() {
        assert_eq!(
            Command::parse("/ban 42 repeated spam 7"),
            Ok(Command::Ban {
                target: UserId::new(42),
                reason: "repeated spam".to_string(),
                days: 7,
            })
        );

        assert_eq!(
            Command::parse("/ban 42 spam"),
            Ok(Command::Ban {
                target: UserId::new(42),
                reason: "spam".to_string(),
                days: 0,
            })
        );
    }

    #[test]
    fn ban_with_numeric_reason_only_treats_it_as_the_reason() {
        // "/ban 42 404" has no separate reason token, so the trailing
        // number is the reason and the ban is permanent.
        assert_eq!(
            Command::parse("/ban 42 404"),
            Ok(Command::Ban {
                target: UserId::new(42),
                reason: "404".to_string(),
                days: 0,
            })
        );
    }

    #[test]
    fn malformed_ban_yields_the_usage_hint() {
        let error = Command::parse("/ban").expect_err("missing args");
        assert_eq!(error.usage, BAN_USAGE);

        let error = Command::parse("/ban notanid spam").expect_err("bad id");
        assert_eq!(error.usage, BAN_USAGE);

        let error = Command::parse("/ban 42").expect_err("missing reason");
        assert_eq!(error.usage, BAN_USAGE);
    }

    #[test]
    fn unban_requires_exactly_one_numeric_argument() {
        assert_eq!(
            Command::parse("/unban 42"),
            Ok(Command::Unban {
                target: UserId::new(42)
            })
        );

        let error = Command::parse("/unban").expect_err("missing id");
        assert_eq!(error.usage, UNBAN_USAGE);

        let error = Command::parse("/unban 42 extra").expect_err("extra args");
        assert_eq!(error.usage, UNBAN_USAGE);
    }

    #[test]
    fn unknown_commands_get_a_hint_instead_of_chat_relay() {
        let error = Command::parse("/frobnicate").expect_err("unknown command");
        assert!(error.usage.contains("/frobnicate"));
    }
}
