//! Chat platform client interface.
//!
//! The engine never talks to a gateway or REST API itself; the host
//! application provides an implementation of [`Platform`].

pub mod model;
pub mod permissions;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use model::{
    snowflake_timestamp, Channel, ChannelKind, Emoji, Guild, Member, Message, MessageReaction,
    Reaction, Role, User,
};
pub use permissions::{OverwriteKind, PermissionOverwrite, Permissions};

/// Errors reported by the platform client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("http error: {0}")]
    Http(String),
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Predicate used by [`Platform::wait_for_message`].
pub type MessageFilter = Box<dyn Fn(&Message) -> bool + Send + Sync>;

/// A field of an embed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Rich embed attached to an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub color: Option<u32>,
    pub footer: Option<String>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub fields: Vec<EmbedField>,
}

/// Outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateMessage {
    pub content: String,
    pub embed: Option<Embed>,
}

impl CreateMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embed: None,
        }
    }
}

/// Channel creation options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CreateChannel {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type", deserialize_with = "deserialize_kind")]
    pub kind: Option<ChannelKind>,
    pub topic: Option<String>,
    pub category_id: Option<u64>,
    pub position: Option<i64>,
    pub nsfw: Option<bool>,
    pub slowmode_delay: Option<u32>,
}

/// Channel edit options; unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EditChannel {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub category_id: Option<u64>,
    pub position: Option<i64>,
    pub nsfw: Option<bool>,
    pub slowmode_delay: Option<u32>,
}

/// Role creation and edit options; unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EditRole {
    pub name: Option<String>,
    pub color: Option<u32>,
    pub hoist: Option<bool>,
    pub mentionable: Option<bool>,
    pub permissions: Option<u64>,
    pub position: Option<i64>,
}

/// Member edit options; unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EditMember {
    pub nick: Option<String>,
    pub roles: Option<Vec<u64>>,
    pub mute: Option<bool>,
    pub deaf: Option<bool>,
    /// Timeout duration in seconds; 0 removes an active timeout.
    pub timeout_secs: Option<u64>,
}

fn deserialize_kind<'de, D>(deserializer: D) -> std::result::Result<Option<ChannelKind>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum KindRepr {
        Code(u8),
        Name(String),
    }

    match Option::<KindRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(KindRepr::Code(code)) => ChannelKind::from_code(code)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown channel type {code}"))),
        Some(KindRepr::Name(name)) => ChannelKind::from_name(&name)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown channel type {name}"))),
    }
}

/// Operations the engine needs from the chat platform.
///
/// Every method targets entities by id. Implementations report failures
/// through [`PlatformError`]; the capability surface decides how scripts
/// observe them.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn guild(&self, guild_id: u64) -> PlatformResult<Guild>;

    async fn channel(&self, channel_id: u64) -> PlatformResult<Channel>;

    async fn member(&self, guild_id: u64, user_id: u64) -> PlatformResult<Member>;

    async fn role(&self, guild_id: u64, role_id: u64) -> PlatformResult<Role>;

    async fn message(&self, channel_id: u64, message_id: u64) -> PlatformResult<Message>;

    async fn send_message(&self, channel_id: u64, message: CreateMessage)
        -> PlatformResult<Message>;

    async fn create_channel(&self, guild_id: u64, options: CreateChannel)
        -> PlatformResult<Channel>;

    async fn edit_channel(&self, channel_id: u64, options: EditChannel) -> PlatformResult<Channel>;

    async fn delete_channel(&self, channel_id: u64) -> PlatformResult<()>;

    async fn create_role(&self, guild_id: u64, options: EditRole) -> PlatformResult<Role>;

    async fn edit_role(&self, guild_id: u64, role_id: u64, options: EditRole)
        -> PlatformResult<Role>;

    async fn delete_role(&self, guild_id: u64, role_id: u64) -> PlatformResult<()>;

    async fn kick_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: Option<String>,
    ) -> PlatformResult<()>;

    async fn ban_member(
        &self,
        guild_id: u64,
        user_id: u64,
        delete_message_days: u8,
        reason: Option<String>,
    ) -> PlatformResult<()>;

    async fn edit_member(
        &self,
        guild_id: u64,
        user_id: u64,
        options: EditMember,
    ) -> PlatformResult<Member>;

    async fn add_reaction(&self, channel_id: u64, message_id: u64, emoji: &Emoji)
        -> PlatformResult<()>;

    /// Remove one user's reaction; `user_id = None` removes the bot's own.
    async fn remove_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &Emoji,
        user_id: Option<u64>,
    ) -> PlatformResult<()>;

    async fn clear_reactions(&self, channel_id: u64, message_id: u64) -> PlatformResult<()>;

    /// Ids of users who reacted with `emoji`, at most `limit`.
    async fn reaction_users(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &Emoji,
        limit: u8,
    ) -> PlatformResult<Vec<u64>>;

    /// Next message accepted by `filter`, or `None` once `timeout` elapses.
    async fn wait_for_message(
        &self,
        filter: MessageFilter,
        timeout: Duration,
    ) -> PlatformResult<Option<Message>>;
}
