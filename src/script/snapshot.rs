//! Entity snapshots handed to scripts.
//!
//! Each `Custom*` type is an immutable, attribute-limited copy of a live
//! platform entity. Related entities appear as id arrays, never as handles,
//! so a script can only reach the platform through its capabilities.

use chrono::{DateTime, Utc};
use mlua::{Lua, LuaSerdeExt, SerializeOptions, Value};
use serde::Serialize;

use crate::platform::permissions::member_permissions;
use crate::platform::{
    snowflake_timestamp, Channel, Emoji, Guild, Member, Message, MessageReaction, Reaction, Role,
};

/// Snapshot of a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomGuild {
    pub id: u64,
    pub name: String,
    pub owner_id: u64,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub premium_tier: u8,
    pub verification_level: u8,
    pub system_channel_id: Option<u64>,
    pub member_count: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    pub roles: Vec<u64>,
    pub channels: Vec<u64>,
    pub members: Vec<u64>,
    pub emojis: Vec<u64>,
}

impl CustomGuild {
    pub fn new(guild: &Guild) -> Self {
        Self {
            id: guild.id,
            name: guild.name.clone(),
            owner_id: guild.owner_id,
            description: guild.description.clone(),
            icon_url: guild.icon_url.clone(),
            premium_tier: guild.premium_tier,
            verification_level: guild.verification_level,
            system_channel_id: guild.system_channel_id,
            member_count: guild.member_count,
            created_at: snowflake_timestamp(guild.id),
            roles: guild.roles.iter().map(|r| r.id).collect(),
            channels: guild.channels.iter().map(|c| c.id).collect(),
            members: guild.members.iter().map(Member::id).collect(),
            emojis: guild.emojis.iter().filter_map(|e| e.id).collect(),
        }
    }
}

/// Snapshot of a guild member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomMember {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub global_name: Option<String>,
    pub display_name: String,
    pub nick: Option<String>,
    pub mention: String,
    pub bot: bool,
    pub pending: bool,
    pub avatar_url: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub premium_since: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub timed_out_until: Option<DateTime<Utc>>,
    pub roles: Vec<u64>,
    pub top_role: u64,
    pub guild_permissions: u64,
}

impl CustomMember {
    pub fn new(member: &Member, guild: &Guild) -> Self {
        Self {
            id: member.id(),
            guild_id: guild.id,
            name: member.user.name.clone(),
            global_name: member.user.global_name.clone(),
            display_name: member.display_name().to_string(),
            nick: member.nick.clone(),
            mention: format!("<@{}>", member.id()),
            bot: member.user.bot,
            pending: member.pending,
            avatar_url: member.user.avatar_url.clone(),
            created_at: snowflake_timestamp(member.id()),
            joined_at: member.joined_at,
            premium_since: member.premium_since,
            timed_out_until: member.communication_disabled_until,
            roles: member.roles.clone(),
            top_role: guild.top_role(member),
            guild_permissions: member_permissions(guild, member).bits,
        }
    }
}

/// Snapshot of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomRole {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub mention: String,
    pub color: u32,
    pub hoist: bool,
    pub managed: bool,
    pub mentionable: bool,
    pub is_default: bool,
    pub position: i64,
    pub permissions: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    pub members: Vec<u64>,
}

impl CustomRole {
    pub fn new(role: &Role, guild: &Guild) -> Self {
        Self {
            id: role.id,
            guild_id: role.guild_id,
            name: role.name.clone(),
            mention: if role.is_everyone() {
                "@everyone".to_string()
            } else {
                format!("<@&{}>", role.id)
            },
            color: role.color,
            hoist: role.hoist,
            managed: role.managed,
            mentionable: role.mentionable,
            is_default: role.is_everyone(),
            position: role.position,
            permissions: role.permissions.bits,
            created_at: snowflake_timestamp(role.id),
            members: guild.role_members(role.id),
        }
    }
}

/// Snapshot of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomChannel {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub mention: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub position: i64,
    pub category_id: Option<u64>,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub slowmode_delay: u32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// Ids of roles and members with a permission overwrite here.
    pub overwrites: Vec<u64>,
}

impl CustomChannel {
    pub fn new(channel: &Channel) -> Self {
        Self {
            id: channel.id,
            guild_id: channel.guild_id,
            name: channel.name.clone(),
            mention: format!("<#{}>", channel.id),
            kind: channel.kind.name().to_string(),
            position: channel.position,
            category_id: channel.parent_id,
            topic: channel.topic.clone(),
            nsfw: channel.nsfw,
            slowmode_delay: channel.rate_limit_per_user,
            created_at: snowflake_timestamp(channel.id),
            overwrites: channel
                .permission_overwrites
                .iter()
                .map(|overwrite| overwrite.id)
                .collect(),
        }
    }
}

/// Snapshot of an emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomEmoji {
    pub id: Option<u64>,
    pub name: String,
    pub animated: bool,
    pub is_unicode: bool,
    pub url: Option<String>,
    /// Form accepted by the reaction capabilities.
    pub text: String,
}

impl CustomEmoji {
    pub fn new(emoji: &Emoji) -> Self {
        Self {
            id: emoji.id,
            name: emoji.name.clone(),
            animated: emoji.animated,
            is_unicode: emoji.id.is_none(),
            url: emoji.url(),
            text: emoji.to_text(),
        }
    }
}

/// Reaction tally attached to a message snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomReactionCount {
    pub emoji: CustomEmoji,
    pub count: u32,
    pub me: bool,
}

impl CustomReactionCount {
    fn new(reaction: &MessageReaction) -> Self {
        Self {
            emoji: CustomEmoji::new(&reaction.emoji),
            count: reaction.count,
            me: reaction.me,
        }
    }
}

/// Snapshot of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomMessage {
    pub id: u64,
    pub guild_id: u64,
    pub content: String,
    pub author: CustomMember,
    pub channel: CustomChannel,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub edited_at: Option<DateTime<Utc>>,
    pub mentions: Vec<u64>,
    pub role_mentions: Vec<u64>,
    pub channel_mentions: Vec<u64>,
    pub attachments: Vec<String>,
    pub reactions: Vec<CustomReactionCount>,
    pub pinned: bool,
    pub tts: bool,
    pub jump_url: String,
}

impl CustomMessage {
    pub fn new(message: &Message, channel: &Channel, guild: &Guild) -> Self {
        Self {
            id: message.id,
            guild_id: guild.id,
            content: message.content.clone(),
            author: CustomMember::new(&message.author, guild),
            channel: CustomChannel::new(channel),
            created_at: message.timestamp,
            edited_at: message.edited_timestamp,
            mentions: message.mentions.clone(),
            role_mentions: message.mention_roles.clone(),
            channel_mentions: message.mention_channels.clone(),
            attachments: message.attachments.clone(),
            reactions: message
                .reactions
                .iter()
                .map(CustomReactionCount::new)
                .collect(),
            pinned: message.pinned,
            tts: message.tts,
            jump_url: message.jump_url(),
        }
    }
}

/// Snapshot of a single reaction event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomReaction {
    pub emoji: CustomEmoji,
    pub user_id: u64,
    /// Current tally for this emoji on the message (0 if none remain).
    pub count: u32,
    pub me: bool,
    pub message: CustomMessage,
}

impl CustomReaction {
    pub fn new(reaction: &Reaction, message: &Message, channel: &Channel, guild: &Guild) -> Self {
        let tally = message
            .reactions
            .iter()
            .find(|r| r.emoji == reaction.emoji);
        Self {
            emoji: CustomEmoji::new(&reaction.emoji),
            user_id: reaction.user_id,
            count: tally.map(|r| r.count).unwrap_or(0),
            me: tally.map(|r| r.me).unwrap_or(false),
            message: CustomMessage::new(message, channel, guild),
        }
    }
}

/// Convert a snapshot into a Lua value owned by `lua`.
///
/// Absent optional attributes become `nil` rather than a null sentinel.
pub fn to_lua<T: Serialize>(lua: &Lua, snapshot: &T) -> mlua::Result<Value> {
    let options = SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(snapshot, options)
}
