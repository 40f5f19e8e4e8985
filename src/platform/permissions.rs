//! Permission bitsets and effective permission calculation.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use serde::{Deserialize, Serialize};

use super::model::{Channel, Guild, Member, Role};

/// A permission bitset.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions {
    pub bits: u64,
}

macro_rules! permission_flags {
    ($($name:ident = $bit:expr,)*) => {
        impl Permissions {
            $(pub const $name: Permissions = Permissions { bits: 1 << $bit };)*

            /// Flag names with their bitsets, in bit order.
            pub const FLAGS: &'static [(&'static str, Permissions)] = &[
                $((stringify!($name), Permissions::$name),)*
            ];
        }
    };
}

permission_flags! {
    CREATE_INSTANT_INVITE = 0,
    KICK_MEMBERS = 1,
    BAN_MEMBERS = 2,
    ADMINISTRATOR = 3,
    MANAGE_CHANNELS = 4,
    MANAGE_GUILD = 5,
    ADD_REACTIONS = 6,
    VIEW_AUDIT_LOG = 7,
    PRIORITY_SPEAKER = 8,
    STREAM = 9,
    VIEW_CHANNEL = 10,
    SEND_MESSAGES = 11,
    SEND_TTS_MESSAGES = 12,
    MANAGE_MESSAGES = 13,
    EMBED_LINKS = 14,
    ATTACH_FILES = 15,
    READ_MESSAGE_HISTORY = 16,
    MENTION_EVERYONE = 17,
    USE_EXTERNAL_EMOJIS = 18,
    VIEW_GUILD_INSIGHTS = 19,
    CONNECT = 20,
    SPEAK = 21,
    MUTE_MEMBERS = 22,
    DEAFEN_MEMBERS = 23,
    MOVE_MEMBERS = 24,
    USE_VAD = 25,
    CHANGE_NICKNAME = 26,
    MANAGE_NICKNAMES = 27,
    MANAGE_ROLES = 28,
    MANAGE_WEBHOOKS = 29,
    MANAGE_EMOJIS = 30,
    MANAGE_THREADS = 34,
    MODERATE_MEMBERS = 40,
}

impl Permissions {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    /// Every known flag.
    pub fn all() -> Self {
        Self::FLAGS
            .iter()
            .fold(Self::empty(), |acc, (_, flag)| acc | *flag)
    }

    pub fn contains(self, other: Permissions) -> bool {
        self.bits & other.bits == other.bits
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    fn apply(self, allow: Permissions, deny: Permissions) -> Self {
        (self & !deny) | allow
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

impl BitAnd for Permissions {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self {
            bits: self.bits & rhs.bits,
        }
    }
}

impl Not for Permissions {
    type Output = Self;

    fn not(self) -> Self {
        Self { bits: !self.bits }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::FLAGS
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join(" | "))
        }
    }
}

/// Whether an overwrite targets a role or a member.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteKind {
    Role,
    Member,
}

/// A channel-level permission overwrite.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub id: u64,
    pub kind: OverwriteKind,
    pub allow: Permissions,
    pub deny: Permissions,
}

fn overwrite_for(channel: &Channel, id: u64) -> Option<&PermissionOverwrite> {
    channel
        .permission_overwrites
        .iter()
        .find(|overwrite| overwrite.id == id)
}

fn everyone_permissions(guild: &Guild) -> Permissions {
    guild
        .everyone_role()
        .map(|role| role.permissions)
        .unwrap_or_default()
}

/// Guild-wide permissions of a member.
pub fn member_permissions(guild: &Guild, member: &Member) -> Permissions {
    if guild.owner_id == member.id() {
        return Permissions::all();
    }

    let base = member
        .roles
        .iter()
        .filter_map(|id| guild.role(*id))
        .fold(everyone_permissions(guild), |acc, role| acc | role.permissions);

    if base.contains(Permissions::ADMINISTRATOR) {
        Permissions::all()
    } else {
        base
    }
}

/// Effective permissions of a member in a channel.
///
/// Overwrites apply in order: `@everyone`, then all of the member's roles
/// combined, then the member-specific overwrite.
pub fn member_permissions_in(guild: &Guild, channel: &Channel, member: &Member) -> Permissions {
    let base = member_permissions(guild, member);
    if base.contains(Permissions::ADMINISTRATOR) {
        return Permissions::all();
    }

    let mut perms = base;
    if let Some(everyone) = overwrite_for(channel, guild.id) {
        perms = perms.apply(everyone.allow, everyone.deny);
    }

    let (allow, deny) = member
        .roles
        .iter()
        .filter_map(|id| overwrite_for(channel, *id))
        .filter(|overwrite| overwrite.kind == OverwriteKind::Role)
        .fold(
            (Permissions::empty(), Permissions::empty()),
            |(allow, deny), overwrite| (allow | overwrite.allow, deny | overwrite.deny),
        );
    perms = perms.apply(allow, deny);

    if let Some(own) = overwrite_for(channel, member.id()) {
        if own.kind == OverwriteKind::Member {
            perms = perms.apply(own.allow, own.deny);
        }
    }

    perms
}

/// Effective permissions a role grants in a channel on its own.
pub fn role_permissions_in(guild: &Guild, channel: &Channel, role: &Role) -> Permissions {
    let base = everyone_permissions(guild) | role.permissions;
    if base.contains(Permissions::ADMINISTRATOR) {
        return Permissions::all();
    }

    let mut perms = base;
    if let Some(everyone) = overwrite_for(channel, guild.id) {
        perms = perms.apply(everyone.allow, everyone.deny);
    }
    if !role.is_everyone() {
        if let Some(own) = overwrite_for(channel, role.id) {
            perms = perms.apply(own.allow, own.deny);
        }
    }
    perms
}

/// Overwrite registered for a member or role in a channel.
pub fn overwrites_for(channel: &Channel, target_id: u64) -> Option<PermissionOverwrite> {
    overwrite_for(channel, target_id).copied()
}
