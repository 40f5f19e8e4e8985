//! Test helpers: an in-process platform double and guild fixtures.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::time::Instant;

use ccengine::command::{template, CommandRecord, TriggerType};
use ccengine::platform::{
    Channel, ChannelKind, CreateChannel, CreateMessage, EditChannel, EditMember, EditRole, Emoji,
    Guild, Member, Message, MessageFilter, OverwriteKind, PermissionOverwrite, Permissions,
    Platform, PlatformError, PlatformResult, Reaction, Role, User,
};
use ccengine::script::{Host, ResourceLimits, ScriptEngine};
use ccengine::{Dispatcher, MemoryCommandStore, MemoryDocumentStore};

pub const GUILD: u64 = 1000;
pub const OTHER_GUILD: u64 = 1001;
pub const OWNER: u64 = 1;
pub const ALICE: u64 = 42;
pub const BOB: u64 = 43;
pub const BOT: u64 = 99;
pub const MOD_ROLE: u64 = 500;
pub const MUTED_ROLE: u64 = 501;
pub const GENERAL: u64 = 2000;
pub const VOICE: u64 = 2001;
pub const CATEGORY: u64 = 2002;
pub const FOREIGN_CHANNEL: u64 = 3000;
pub const TRIGGER_MESSAGE: u64 = 7000;

pub fn user(id: u64, name: &str, bot: bool) -> User {
    User {
        id,
        name: name.to_string(),
        global_name: None,
        bot,
        avatar_url: None,
    }
}

pub fn member(id: u64, name: &str, roles: Vec<u64>) -> Member {
    Member {
        user: user(id, name, id == BOT),
        guild_id: GUILD,
        nick: None,
        roles,
        joined_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        premium_since: None,
        communication_disabled_until: None,
        deaf: false,
        mute: false,
        pending: false,
    }
}

pub fn role(id: u64, name: &str, position: i64, permissions: Permissions) -> Role {
    Role {
        id,
        guild_id: GUILD,
        name: name.to_string(),
        color: 0,
        hoist: false,
        managed: false,
        mentionable: true,
        position,
        permissions,
    }
}

pub fn channel(id: u64, guild_id: u64, name: &str, kind: ChannelKind) -> Channel {
    Channel {
        id,
        guild_id,
        name: name.to_string(),
        kind,
        position: 0,
        parent_id: None,
        topic: None,
        nsfw: false,
        rate_limit_per_user: 0,
        permission_overwrites: vec![],
    }
}

pub fn guild() -> Guild {
    Guild {
        id: GUILD,
        name: "Test Guild".to_string(),
        owner_id: OWNER,
        description: None,
        icon_url: None,
        premium_tier: 0,
        verification_level: 0,
        system_channel_id: Some(GENERAL),
        member_count: 4,
        roles: vec![
            role(
                GUILD,
                "@everyone",
                0,
                Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
            ),
            role(MOD_ROLE, "mod", 2, Permissions::KICK_MEMBERS),
            role(MUTED_ROLE, "muted", 1, Permissions::empty()),
        ],
        channels: vec![],
        members: vec![
            member(OWNER, "owner", vec![]),
            member(ALICE, "alice", vec![MOD_ROLE]),
            member(BOB, "bob", vec![MUTED_ROLE]),
            member(BOT, "bot", vec![]),
        ],
        emojis: vec![],
    }
}

pub fn message(id: u64, channel_id: u64, author: u64, content: &str) -> Message {
    let guild = guild();
    let author = guild
        .member(author)
        .cloned()
        .unwrap_or_else(|| member(author, "stranger", vec![]));
    Message {
        id,
        channel_id,
        guild_id: Some(GUILD),
        author,
        content: content.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        edited_timestamp: None,
        mentions: vec![],
        mention_roles: vec![],
        mention_channels: vec![],
        attachments: vec![],
        reactions: vec![],
        pinned: false,
        tts: false,
    }
}

pub fn reaction(user_id: u64, emoji: &str) -> Reaction {
    Reaction {
        message_id: TRIGGER_MESSAGE,
        channel_id: GENERAL,
        guild_id: Some(GUILD),
        user_id,
        emoji: Emoji::unicode(emoji),
    }
}

/// A stored command wrapped for its trigger.
pub fn record(name: &str, trigger: TriggerType, snippet: &str) -> CommandRecord {
    CommandRecord {
        name: name.to_string(),
        trigger_type: trigger,
        code: template::indent(snippet, trigger.shape()),
        review_needed: false,
        required_role: None,
        ignored_role: None,
        required_channel: None,
        ignored_channel: None,
    }
}

#[derive(Default)]
struct State {
    guild: Option<Guild>,
    channels: HashMap<u64, Channel>,
    messages: HashMap<u64, Message>,
    sent: Vec<(u64, CreateMessage)>,
    calls: Vec<String>,
    incoming: VecDeque<(Duration, Message)>,
    next_id: u64,
}

/// Platform double recording every call.
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let mut general = channel(GENERAL, GUILD, "general", ChannelKind::Text);
        general.permission_overwrites = vec![PermissionOverwrite {
            id: MUTED_ROLE,
            kind: OverwriteKind::Role,
            allow: Permissions::empty(),
            deny: Permissions::SEND_MESSAGES,
        }];
        let channels = [
            general,
            channel(VOICE, GUILD, "voice", ChannelKind::Voice),
            channel(CATEGORY, GUILD, "stuff", ChannelKind::Category),
            channel(FOREIGN_CHANNEL, OTHER_GUILD, "elsewhere", ChannelKind::Text),
        ];

        let mut state = State {
            guild: Some(guild()),
            next_id: 90_000,
            ..State::default()
        };
        for channel in channels {
            state.channels.insert(channel.id, channel);
        }
        let trigger = message(TRIGGER_MESSAGE, GENERAL, ALICE, "react to me");
        state.messages.insert(trigger.id, trigger);

        Self {
            state: Mutex::new(state),
        }
    }

    /// Messages sent so far, as `(channel_id, message)`.
    pub fn sent(&self) -> Vec<(u64, CreateMessage)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Mutating calls other than `send_message`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn channel_named(&self, name: &str) -> Option<Channel> {
        self.state
            .lock()
            .unwrap()
            .channels
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Queue a message delivered to `wait_for_message` after `delay`.
    pub fn queue_message(&self, delay: Duration, message: Message) {
        self.state
            .lock()
            .unwrap()
            .incoming
            .push_back((delay, message));
    }

    fn next_id(state: &mut State) -> u64 {
        state.next_id += 1;
        state.next_id
    }

    fn record_call(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn with_guild<T>(
        &self,
        guild_id: u64,
        f: impl FnOnce(&mut Guild, &mut State) -> PlatformResult<T>,
    ) -> PlatformResult<T> {
        let mut state = self.state.lock().unwrap();
        let mut guild = state
            .guild
            .take()
            .ok_or_else(|| PlatformError::NotFound("guild".to_string()))?;
        let result = if guild.id == guild_id {
            f(&mut guild, &mut *state)
        } else {
            Err(PlatformError::NotFound(format!("guild {guild_id}")))
        };
        state.guild = Some(guild);
        result
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn guild(&self, guild_id: u64) -> PlatformResult<Guild> {
        self.with_guild(guild_id, |guild, state| {
            let mut guild = guild.clone();
            guild.channels = state
                .channels
                .values()
                .filter(|c| c.guild_id == guild_id)
                .cloned()
                .collect();
            guild.channels.sort_by_key(|c| c.id);
            Ok(guild)
        })
    }

    async fn channel(&self, channel_id: u64) -> PlatformResult<Channel> {
        self.state
            .lock()
            .unwrap()
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("channel {channel_id}")))
    }

    async fn member(&self, guild_id: u64, user_id: u64) -> PlatformResult<Member> {
        self.with_guild(guild_id, |guild, _| {
            guild
                .member(user_id)
                .cloned()
                .ok_or_else(|| PlatformError::NotFound(format!("member {user_id}")))
        })
    }

    async fn role(&self, guild_id: u64, role_id: u64) -> PlatformResult<Role> {
        self.with_guild(guild_id, |guild, _| {
            guild
                .role(role_id)
                .cloned()
                .ok_or_else(|| PlatformError::NotFound(format!("role {role_id}")))
        })
    }

    async fn message(&self, _channel_id: u64, message_id: u64) -> PlatformResult<Message> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(&message_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("message {message_id}")))
    }

    async fn send_message(
        &self,
        channel_id: u64,
        outgoing: CreateMessage,
    ) -> PlatformResult<Message> {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        state.sent.push((channel_id, outgoing.clone()));
        let mut sent = message(id, channel_id, BOT, &outgoing.content);
        sent.guild_id = state.channels.get(&channel_id).map(|c| c.guild_id);
        state.messages.insert(id, sent.clone());
        Ok(sent)
    }

    async fn create_channel(
        &self,
        guild_id: u64,
        options: CreateChannel,
    ) -> PlatformResult<Channel> {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        let mut created = channel(
            id,
            guild_id,
            &options.name,
            options.kind.unwrap_or(ChannelKind::Text),
        );
        created.topic = options.topic;
        created.parent_id = options.category_id;
        state.channels.insert(id, created.clone());
        state.calls.push(format!("create_channel:{}", options.name));
        Ok(created)
    }

    async fn edit_channel(&self, channel_id: u64, options: EditChannel) -> PlatformResult<Channel> {
        let mut state = self.state.lock().unwrap();
        let channel = state
            .channels
            .get_mut(&channel_id)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {channel_id}")))?;
        if let Some(name) = options.name {
            channel.name = name;
        }
        if let Some(topic) = options.topic {
            channel.topic = Some(topic);
        }
        let edited = channel.clone();
        state.calls.push(format!("edit_channel:{channel_id}"));
        Ok(edited)
    }

    async fn delete_channel(&self, channel_id: u64) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .channels
            .remove(&channel_id)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {channel_id}")))?;
        state.calls.push(format!("delete_channel:{channel_id}"));
        Ok(())
    }

    async fn create_role(&self, guild_id: u64, options: EditRole) -> PlatformResult<Role> {
        self.with_guild(guild_id, |guild, state| {
            let id = Self::next_id(state);
            let created = role(
                id,
                options.name.as_deref().unwrap_or("new role"),
                1,
                Permissions::from_bits(options.permissions.unwrap_or(0)),
            );
            guild.roles.push(created.clone());
            state.calls.push(format!("create_role:{id}"));
            Ok(created)
        })
    }

    async fn edit_role(
        &self,
        guild_id: u64,
        role_id: u64,
        options: EditRole,
    ) -> PlatformResult<Role> {
        self.with_guild(guild_id, |guild, state| {
            let role = guild
                .roles
                .iter_mut()
                .find(|r| r.id == role_id)
                .ok_or_else(|| PlatformError::NotFound(format!("role {role_id}")))?;
            if let Some(name) = options.name {
                role.name = name;
            }
            if let Some(bits) = options.permissions {
                role.permissions = Permissions::from_bits(bits);
            }
            state.calls.push(format!("edit_role:{role_id}"));
            Ok(role.clone())
        })
    }

    async fn delete_role(&self, guild_id: u64, role_id: u64) -> PlatformResult<()> {
        self.with_guild(guild_id, |guild, state| {
            let before = guild.roles.len();
            guild.roles.retain(|r| r.id != role_id);
            if guild.roles.len() == before {
                return Err(PlatformError::NotFound(format!("role {role_id}")));
            }
            state.calls.push(format!("delete_role:{role_id}"));
            Ok(())
        })
    }

    async fn kick_member(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: Option<String>,
    ) -> PlatformResult<()> {
        self.with_guild(guild_id, |guild, state| {
            if guild.owner_id == user_id {
                return Err(PlatformError::Forbidden("cannot kick the owner".to_string()));
            }
            guild
                .member(user_id)
                .ok_or_else(|| PlatformError::NotFound(format!("member {user_id}")))?;
            guild.members.retain(|m| m.id() != user_id);
            state.calls.push(format!(
                "kick_member:{user_id}:{}",
                reason.unwrap_or_default()
            ));
            Ok(())
        })
    }

    async fn ban_member(
        &self,
        guild_id: u64,
        user_id: u64,
        delete_message_days: u8,
        reason: Option<String>,
    ) -> PlatformResult<()> {
        self.with_guild(guild_id, |guild, state| {
            guild.members.retain(|m| m.id() != user_id);
            state.calls.push(format!(
                "ban_member:{user_id}:{delete_message_days}:{}",
                reason.unwrap_or_default()
            ));
            Ok(())
        })
    }

    async fn edit_member(
        &self,
        guild_id: u64,
        user_id: u64,
        options: EditMember,
    ) -> PlatformResult<Member> {
        self.with_guild(guild_id, |guild, state| {
            let member = guild
                .members
                .iter_mut()
                .find(|m| m.id() == user_id)
                .ok_or_else(|| PlatformError::NotFound(format!("member {user_id}")))?;
            if let Some(nick) = options.nick {
                member.nick = Some(nick);
            }
            if let Some(roles) = options.roles {
                member.roles = roles;
            }
            state.calls.push(format!("edit_member:{user_id}"));
            Ok(member.clone())
        })
    }

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &Emoji,
    ) -> PlatformResult<()> {
        self.record_call(format!(
            "add_reaction:{channel_id}:{message_id}:{}",
            emoji.to_text()
        ));
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &Emoji,
        user_id: Option<u64>,
    ) -> PlatformResult<()> {
        let who = user_id.map(|id| id.to_string()).unwrap_or_else(|| "me".to_string());
        self.record_call(format!(
            "remove_reaction:{channel_id}:{message_id}:{}:{who}",
            emoji.to_text()
        ));
        Ok(())
    }

    async fn clear_reactions(&self, channel_id: u64, message_id: u64) -> PlatformResult<()> {
        self.record_call(format!("clear_reactions:{channel_id}:{message_id}"));
        Ok(())
    }

    async fn reaction_users(
        &self,
        _channel_id: u64,
        _message_id: u64,
        _emoji: &Emoji,
        limit: u8,
    ) -> PlatformResult<Vec<u64>> {
        Ok([ALICE, BOB, 12345]
            .into_iter()
            .take(usize::from(limit))
            .collect())
    }

    async fn wait_for_message(
        &self,
        filter: MessageFilter,
        timeout: Duration,
    ) -> PlatformResult<Option<Message>> {
        let start = Instant::now();
        loop {
            let next = self.state.lock().unwrap().incoming.pop_front();
            let Some((delay, message)) = next else {
                break;
            };
            tokio::time::sleep(delay).await;
            if start.elapsed() > timeout {
                return Ok(None);
            }
            if filter(&message) {
                return Ok(Some(message));
            }
        }
        tokio::time::sleep(timeout.saturating_sub(start.elapsed())).await;
        Ok(None)
    }
}

/// Platform double, in-memory stores and a dispatcher wired together.
pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub commands: Arc<MemoryCommandStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub host: Host,
}

impl Harness {
    pub fn new() -> Self {
        let platform = Arc::new(FakePlatform::new());
        let commands = Arc::new(MemoryCommandStore::new());
        let documents = Arc::new(MemoryDocumentStore::new());
        let host = Host::new(platform.clone(), documents.clone());
        Self {
            platform,
            commands,
            documents,
            host,
        }
    }

    pub fn engine(timeout: Duration) -> ScriptEngine {
        ScriptEngine::new(ResourceLimits {
            timeout,
            ..ResourceLimits::default()
        })
    }

    pub fn dispatcher(&self, timeout: Duration) -> Dispatcher {
        Dispatcher::new(self.commands.clone(), self.host.clone(), Self::engine(timeout))
    }
}
