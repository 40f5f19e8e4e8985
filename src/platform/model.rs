//! Live platform entities as returned by the chat platform client.
//!
//! These carry everything the platform reports. Scripts never see them
//! directly; see [`crate::script::snapshot`] for the restricted views.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::permissions::{PermissionOverwrite, Permissions};

/// Platform epoch for snowflake ids (2015-01-01T00:00:00Z) in milliseconds.
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

/// Creation time encoded in a snowflake id.
pub fn snowflake_timestamp(id: u64) -> DateTime<Utc> {
    let ms = (id >> 22) as i64 + SNOWFLAKE_EPOCH_MS;
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// A platform user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub global_name: Option<String>,
    pub bot: bool,
    pub avatar_url: Option<String>,
}

/// A user's membership in a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
    pub guild_id: u64,
    pub nick: Option<String>,
    /// Role ids, excluding the implicit `@everyone` role.
    pub roles: Vec<u64>,
    pub joined_at: Option<DateTime<Utc>>,
    pub premium_since: Option<DateTime<Utc>>,
    pub communication_disabled_until: Option<DateTime<Utc>>,
    pub deaf: bool,
    pub mute: bool,
    pub pending: bool,
}

impl Member {
    pub fn id(&self) -> u64 {
        self.user.id
    }

    /// Name shown in the member list: nick, then global name, then username.
    pub fn display_name(&self) -> &str {
        self.nick
            .as_deref()
            .or(self.user.global_name.as_deref())
            .unwrap_or(&self.user.name)
    }

    pub fn has_role(&self, role_id: u64) -> bool {
        self.roles.contains(&role_id)
    }
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub managed: bool,
    pub mentionable: bool,
    pub position: i64,
    pub permissions: Permissions,
}

impl Role {
    /// The `@everyone` role shares its id with the guild.
    pub fn is_everyone(&self) -> bool {
        self.id == self.guild_id
    }
}

/// Kind of a guild channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    News,
    Stage,
    Forum,
    Thread,
}

impl ChannelKind {
    /// All kinds with their platform type codes.
    pub const ALL: [(ChannelKind, u8); 7] = [
        (ChannelKind::Text, 0),
        (ChannelKind::Voice, 2),
        (ChannelKind::Category, 4),
        (ChannelKind::News, 5),
        (ChannelKind::Thread, 11),
        (ChannelKind::Stage, 13),
        (ChannelKind::Forum, 15),
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Text => "text",
            ChannelKind::Voice => "voice",
            ChannelKind::Category => "category",
            ChannelKind::News => "news",
            ChannelKind::Stage => "stage",
            ChannelKind::Forum => "forum",
            ChannelKind::Thread => "thread",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .map(|(kind, _)| *kind)
            .find(|kind| kind.name() == name.to_ascii_lowercase())
    }

    pub fn code(self) -> u8 {
        Self::ALL
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, code)| *code)
            .unwrap_or(0)
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(kind, _)| *kind)
    }

    /// Whether messages can be sent into channels of this kind.
    pub fn is_text_based(self) -> bool {
        matches!(
            self,
            ChannelKind::Text | ChannelKind::News | ChannelKind::Thread
        )
    }
}

/// A guild channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: u64,
    pub guild_id: u64,
    pub name: String,
    pub kind: ChannelKind,
    pub position: i64,
    pub parent_id: Option<u64>,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub rate_limit_per_user: u32,
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

/// A custom guild emoji or a unicode emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    /// `None` for unicode emoji.
    pub id: Option<u64>,
    pub name: String,
    pub animated: bool,
}

impl Emoji {
    pub fn unicode(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            animated: false,
        }
    }

    pub fn custom(id: u64, name: impl Into<String>, animated: bool) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            animated,
        }
    }

    /// Parse the textual forms scripts use: `<:name:id>`, `<a:name:id>`,
    /// `name:id`, or a bare unicode emoji.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let (animated, inner) = if let Some(rest) = text.strip_prefix("<a:") {
            (true, rest.strip_suffix('>')?)
        } else if let Some(rest) = text.strip_prefix("<:") {
            (false, rest.strip_suffix('>')?)
        } else {
            (false, text)
        };

        match inner.rsplit_once(':') {
            Some((name, id)) if !name.is_empty() => {
                let id = id.parse::<u64>().ok()?;
                Some(Self::custom(id, name, animated))
            }
            Some(_) => None,
            None if text.starts_with('<') => None,
            None => Some(Self::unicode(inner)),
        }
    }

    pub fn url(&self) -> Option<String> {
        self.id.map(|id| {
            let ext = if self.animated { "gif" } else { "png" };
            format!("https://cdn.discordapp.com/emojis/{id}.{ext}")
        })
    }

    /// Message/reaction text form.
    pub fn to_text(&self) -> String {
        match self.id {
            Some(id) if self.animated => format!("<a:{}:{}>", self.name, id),
            Some(id) => format!("<:{}:{}>", self.name, id),
            None => self.name.clone(),
        }
    }
}

/// Aggregated reaction count attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReaction {
    pub emoji: Emoji,
    pub count: u32,
    pub me: bool,
}

/// A message posted in a guild channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author: Member,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub edited_timestamp: Option<DateTime<Utc>>,
    pub mentions: Vec<u64>,
    pub mention_roles: Vec<u64>,
    pub mention_channels: Vec<u64>,
    pub attachments: Vec<String>,
    pub reactions: Vec<MessageReaction>,
    pub pinned: bool,
    pub tts: bool,
}

impl Message {
    pub fn jump_url(&self) -> String {
        let guild = self
            .guild_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "@me".to_string());
        format!(
            "https://discord.com/channels/{}/{}/{}",
            guild, self.channel_id, self.id
        )
    }
}

/// A single reaction event: one user reacting to one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub user_id: u64,
    pub emoji: Emoji,
}

/// A guild with its roles, channels, members and emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: u64,
    pub name: String,
    pub owner_id: u64,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub premium_tier: u8,
    pub verification_level: u8,
    pub system_channel_id: Option<u64>,
    pub member_count: u64,
    pub roles: Vec<Role>,
    pub channels: Vec<Channel>,
    pub members: Vec<Member>,
    pub emojis: Vec<Emoji>,
}

impl Guild {
    pub fn role(&self, role_id: u64) -> Option<&Role> {
        self.roles.iter().find(|role| role.id == role_id)
    }

    pub fn everyone_role(&self) -> Option<&Role> {
        self.role(self.id)
    }

    pub fn channel(&self, channel_id: u64) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.id == channel_id)
    }

    pub fn member(&self, user_id: u64) -> Option<&Member> {
        self.members.iter().find(|member| member.id() == user_id)
    }

    /// Ids of members currently holding `role_id`.
    pub fn role_members(&self, role_id: u64) -> Vec<u64> {
        if role_id == self.id {
            return self.members.iter().map(Member::id).collect();
        }
        self.members
            .iter()
            .filter(|member| member.has_role(role_id))
            .map(Member::id)
            .collect()
    }

    /// Highest positioned role of a member, falling back to `@everyone`.
    pub fn top_role(&self, member: &Member) -> u64 {
        member
            .roles
            .iter()
            .filter_map(|id| self.role(*id))
            .max_by_key(|role| (role.position, role.id))
            .map(|role| role.id)
            .unwrap_or(self.id)
    }
}
