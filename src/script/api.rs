//! Capability surface for custom command scripts.
//!
//! A fresh surface is built for every invocation and bound to its guild
//! and triggering entities. Every function resolves ids inside that guild
//! only. Platform and store failures never raise into the script: they are
//! logged and the capability returns `nil` (or `false` for the
//! persistence writes).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mlua::{FromLuaMulti, Lua, LuaSerdeExt, Result as LuaResult, Table, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::context::{Host, InvocationContext};
use super::helpers;
use super::predicate::Predicate;
use super::snapshot::{to_lua, CustomChannel, CustomGuild, CustomMember, CustomMessage, CustomRole};
use crate::platform::permissions::{
    member_permissions_in, overwrites_for, role_permissions_in,
};
use crate::platform::{
    Channel, ChannelKind, CreateChannel, CreateMessage, EditChannel, EditMember, EditRole, Embed,
    Emoji, Guild, Member, Message, MessageFilter, OverwriteKind, PlatformResult, Permissions, Role,
};

/// Upper bound for `wait_for_message`, whatever the script asks for.
pub const MAX_WAIT: Duration = Duration::from_secs(10);

const DEFAULT_REACTION_USERS: i64 = 25;
const MAX_REACTION_USERS: i64 = 100;
const MAX_DELETE_MESSAGE_DAYS: i64 = 7;

/// Capabilities available to every trigger.
pub const COMMON_CAPABILITIES: [&str; 23] = [
    "guild",
    "ChannelType",
    "Permissions",
    "message_send",
    "create_channel",
    "edit_channel",
    "delete_channel",
    "create_role",
    "edit_role",
    "delete_role",
    "kick_member",
    "ban_member",
    "edit_member",
    "get_member",
    "get_role",
    "get_channel",
    "get_channel_type",
    "permissions_in",
    "overwrites_for",
    "wait_for_message",
    "get_db",
    "edit_db",
    "del_db",
];

/// Capabilities bound to the triggering message.
pub const REACTION_CAPABILITIES: [&str; 4] = [
    "add_reaction",
    "remove_reaction",
    "clear_reactions",
    "reaction_users",
];

/// What a single surface is bound to.
struct Scope {
    host: Host,
    context: Arc<InvocationContext>,
}

impl Scope {
    fn guild(&self) -> &Guild {
        self.context.guild()
    }

    fn guild_id(&self) -> u64 {
        self.guild().id
    }

    async fn channel(&self, channel_id: u64) -> Option<Channel> {
        let channel = swallow("channel", self.host.platform.channel(channel_id).await)?;
        if channel.guild_id != self.guild_id() {
            debug!(channel_id, "channel belongs to another guild");
            return None;
        }
        Some(channel)
    }

    async fn member(&self, user_id: u64) -> Option<Member> {
        swallow(
            "member",
            self.host.platform.member(self.guild_id(), user_id).await,
        )
    }

    async fn role(&self, role_id: u64) -> Option<Role> {
        if let Some(role) = self.guild().role(role_id) {
            return Some(role.clone());
        }
        let role = swallow("role", self.host.platform.role(self.guild_id(), role_id).await)?;
        (role.guild_id == self.guild_id()).then_some(role)
    }
}

/// Builder registering the capability surface into a script namespace.
pub struct CapabilitySurface {
    scope: Arc<Scope>,
}

impl CapabilitySurface {
    pub fn new(host: Host, context: Arc<InvocationContext>) -> Self {
        Self {
            scope: Arc::new(Scope { host, context }),
        }
    }

    /// Names this surface registers, helpers included.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = COMMON_CAPABILITIES.to_vec();
        names.extend(helpers::NAMES);
        if self.scope.context.message().is_some() {
            names.extend(REACTION_CAPABILITIES);
        }
        names
    }

    /// Register the surface into `env`.
    pub fn register(&self, lua: &Lua, env: &Table) -> LuaResult<()> {
        // === Constants ===
        self.register_constants(lua, env)?;

        // === Pure helpers ===
        helpers::register(lua, env)?;

        // === Messaging ===
        self.bind(lua, env, "message_send", message_send)?;

        // === Reactions on the triggering message ===
        if self.scope.context.message().is_some() {
            self.register_reactions(lua, env)?;
        }

        // === Structure ===
        self.bind(lua, env, "create_channel", create_channel)?;
        self.bind(lua, env, "edit_channel", edit_channel)?;
        self.bind(lua, env, "delete_channel", delete_channel)?;
        self.bind(lua, env, "create_role", create_role)?;
        self.bind(lua, env, "edit_role", edit_role)?;
        self.bind(lua, env, "delete_role", delete_role)?;

        // === Moderation ===
        self.bind(lua, env, "kick_member", kick_member)?;
        self.bind(lua, env, "ban_member", ban_member)?;
        self.bind(lua, env, "edit_member", edit_member)?;

        // === Lookup ===
        self.bind(lua, env, "get_member", get_member)?;
        self.bind(lua, env, "get_role", get_role)?;
        self.bind(lua, env, "get_channel", get_channel)?;
        self.bind(lua, env, "get_channel_type", get_channel_type)?;
        self.bind(lua, env, "permissions_in", permissions_in)?;
        self.bind(lua, env, "overwrites_for", get_overwrites)?;

        // === Waiting ===
        self.bind(lua, env, "wait_for_message", wait_for_message)?;

        // === Persistence ===
        self.bind(lua, env, "get_db", get_db)?;
        self.bind(lua, env, "edit_db", edit_db)?;
        self.bind(lua, env, "del_db", del_db)?;

        Ok(())
    }

    fn register_constants(&self, lua: &Lua, env: &Table) -> LuaResult<()> {
        env.raw_set("guild", to_lua(lua, &CustomGuild::new(self.scope.guild()))?)?;

        let channel_types = lua.create_table()?;
        for (kind, code) in ChannelKind::ALL {
            channel_types.raw_set(kind.name(), code)?;
        }
        env.raw_set("ChannelType", channel_types)?;

        let permissions = lua.create_table()?;
        for (name, flag) in Permissions::FLAGS {
            permissions.raw_set(*name, flag.bits as i64)?;
        }
        env.raw_set("Permissions", permissions)?;

        Ok(())
    }

    fn register_reactions(&self, lua: &Lua, env: &Table) -> LuaResult<()> {
        self.bind(lua, env, "add_reaction", add_reaction)?;
        self.bind(lua, env, "remove_reaction", remove_reaction)?;
        self.bind(lua, env, "clear_reactions", clear_reactions)?;
        self.bind(lua, env, "reaction_users", reaction_users)?;
        Ok(())
    }

    /// Bind an async capability under `name`, sharing this surface's scope.
    fn bind<A, F, Fut>(&self, lua: &Lua, env: &Table, name: &'static str, capability: F) -> LuaResult<()>
    where
        A: FromLuaMulti + 'static,
        F: Fn(Lua, Arc<Scope>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LuaResult<Value>> + Send + 'static,
    {
        let scope = Arc::clone(&self.scope);
        let function =
            lua.create_async_function(move |lua, args: A| capability(lua, Arc::clone(&scope), args))?;
        env.raw_set(name, function)
    }
}

// === Argument handling ===

fn swallow<T>(capability: &'static str, result: PlatformResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(capability, error = %err, "platform call failed");
            None
        }
    }
}

fn swallow_store<T>(capability: &'static str, result: crate::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(capability, error = %err, "document store call failed");
            None
        }
    }
}

/// Parse an id given as an integer, an integral float or a decimal string.
pub fn id_arg(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(i) => u64::try_from(*i).ok(),
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n < u64::MAX as f64 => Some(*n as u64),
        Value::String(s) => s.to_str().ok()?.trim().parse().ok(),
        _ => None,
    }
}

fn text_arg(value: &Value) -> Option<String> {
    if value.is_nil() {
        None
    } else {
        Some(helpers::to_str(value))
    }
}

/// Decode an options table; `nil` means all defaults.
fn options_arg<T: DeserializeOwned + Default>(lua: &Lua, value: Value) -> Option<T> {
    match value {
        Value::Nil => Some(T::default()),
        Value::Table(_) => match lua.from_value(value) {
            Ok(options) => Some(options),
            Err(err) => {
                debug!(error = %err, "invalid options table");
                None
            }
        },
        _ => None,
    }
}

fn emoji_arg(value: &Value) -> Option<Emoji> {
    match value {
        Value::String(s) => Emoji::parse(&s.to_str().ok()?),
        Value::Table(t) => {
            let text: String = t.raw_get("text").ok()?;
            Emoji::parse(&text)
        }
        _ => None,
    }
}

fn snapshot<T: Serialize>(lua: &Lua, value: Option<T>) -> LuaResult<Value> {
    match value {
        Some(value) => to_lua(lua, &value),
        None => Ok(Value::Nil),
    }
}

fn done(result: Option<()>) -> Value {
    match result {
        Some(()) => Value::Boolean(true),
        None => Value::Nil,
    }
}

fn triggering_message(scope: &Scope) -> Option<(Message, Channel)> {
    scope
        .context
        .message()
        .map(|(message, channel)| (message.clone(), channel.clone()))
}

// === Messaging ===

async fn message_send(
    lua: Lua,
    scope: Arc<Scope>,
    (channel, content, embed): (Value, Value, Value),
) -> LuaResult<Value> {
    let Some(channel_id) = id_arg(&channel) else {
        return Ok(Value::Nil);
    };
    let Some(channel) = scope.channel(channel_id).await else {
        return Ok(Value::Nil);
    };
    if !channel.kind.is_text_based() {
        debug!(channel_id, kind = channel.kind.name(), "not a text channel");
        return Ok(Value::Nil);
    }

    let embed = match embed {
        Value::Nil => None,
        other => match options_arg::<Embed>(&lua, other) {
            Some(embed) => Some(embed),
            None => return Ok(Value::Nil),
        },
    };
    let message = CreateMessage {
        content: helpers::to_str(&content),
        embed,
    };
    if message.content.is_empty() && message.embed.is_none() {
        return Ok(Value::Nil);
    }

    let sent = swallow(
        "message_send",
        scope.host.platform.send_message(channel.id, message).await,
    );
    snapshot(
        &lua,
        sent.map(|sent| CustomMessage::new(&sent, &channel, scope.guild())),
    )
}

// === Reactions ===

async fn add_reaction(_lua: Lua, scope: Arc<Scope>, emoji: Value) -> LuaResult<Value> {
    let (Some((message, _)), Some(emoji)) = (triggering_message(&scope), emoji_arg(&emoji)) else {
        return Ok(Value::Nil);
    };
    let result = scope
        .host
        .platform
        .add_reaction(message.channel_id, message.id, &emoji)
        .await;
    Ok(done(swallow("add_reaction", result)))
}

async fn remove_reaction(
    _lua: Lua,
    scope: Arc<Scope>,
    (emoji, member): (Value, Value),
) -> LuaResult<Value> {
    let (Some((message, _)), Some(emoji)) = (triggering_message(&scope), emoji_arg(&emoji)) else {
        return Ok(Value::Nil);
    };
    let user_id = match member {
        Value::Nil => None,
        other => match id_arg(&other) {
            Some(id) => Some(id),
            None => return Ok(Value::Nil),
        },
    };
    let result = scope
        .host
        .platform
        .remove_reaction(message.channel_id, message.id, &emoji, user_id)
        .await;
    Ok(done(swallow("remove_reaction", result)))
}

async fn clear_reactions(_lua: Lua, scope: Arc<Scope>, _args: ()) -> LuaResult<Value> {
    let Some((message, _)) = triggering_message(&scope) else {
        return Ok(Value::Nil);
    };
    let result = scope
        .host
        .platform
        .clear_reactions(message.channel_id, message.id)
        .await;
    Ok(done(swallow("clear_reactions", result)))
}

async fn reaction_users(
    lua: Lua,
    scope: Arc<Scope>,
    (emoji, limit): (Value, Value),
) -> LuaResult<Value> {
    let (Some((message, _)), Some(emoji)) = (triggering_message(&scope), emoji_arg(&emoji)) else {
        return Ok(Value::Nil);
    };
    let limit = if limit.is_nil() {
        DEFAULT_REACTION_USERS
    } else {
        helpers::to_int(&limit)
    }
    .clamp(1, MAX_REACTION_USERS) as u8;

    let Some(ids) = swallow(
        "reaction_users",
        scope
            .host
            .platform
            .reaction_users(message.channel_id, message.id, &emoji, limit)
            .await,
    ) else {
        return Ok(Value::Nil);
    };

    let mut members = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(member) = scope.member(id).await {
            members.push(to_lua(&lua, &CustomMember::new(&member, scope.guild()))?);
        }
    }
    Ok(Value::Table(lua.create_sequence_from(members)?))
}

// === Structure ===

async fn create_channel(
    lua: Lua,
    scope: Arc<Scope>,
    (name, options): (Value, Value),
) -> LuaResult<Value> {
    let Some(name) = text_arg(&name).filter(|name| !name.is_empty()) else {
        return Ok(Value::Nil);
    };
    let Some(mut options) = options_arg::<CreateChannel>(&lua, options) else {
        return Ok(Value::Nil);
    };
    if let Some(category_id) = options.category_id {
        match scope.channel(category_id).await {
            Some(category) if category.kind == ChannelKind::Category => {}
            _ => return Ok(Value::Nil),
        }
    }
    options.name = name;

    let created = swallow(
        "create_channel",
        scope
            .host
            .platform
            .create_channel(scope.guild_id(), options)
            .await,
    );
    snapshot(&lua, created.as_ref().map(CustomChannel::new))
}

async fn edit_channel(
    lua: Lua,
    scope: Arc<Scope>,
    (channel, options): (Value, Value),
) -> LuaResult<Value> {
    let Some(channel_id) = id_arg(&channel) else {
        return Ok(Value::Nil);
    };
    let Some(options) = options_arg::<EditChannel>(&lua, options) else {
        return Ok(Value::Nil);
    };
    if scope.channel(channel_id).await.is_none() {
        return Ok(Value::Nil);
    }
    let edited = swallow(
        "edit_channel",
        scope.host.platform.edit_channel(channel_id, options).await,
    );
    snapshot(&lua, edited.as_ref().map(CustomChannel::new))
}

async fn delete_channel(_lua: Lua, scope: Arc<Scope>, channel: Value) -> LuaResult<Value> {
    let Some(channel_id) = id_arg(&channel) else {
        return Ok(Value::Nil);
    };
    if scope.channel(channel_id).await.is_none() {
        return Ok(Value::Nil);
    }
    let result = scope.host.platform.delete_channel(channel_id).await;
    Ok(done(swallow("delete_channel", result)))
}

async fn create_role(lua: Lua, scope: Arc<Scope>, options: Value) -> LuaResult<Value> {
    let Some(options) = options_arg::<EditRole>(&lua, options) else {
        return Ok(Value::Nil);
    };
    let created = swallow(
        "create_role",
        scope.host.platform.create_role(scope.guild_id(), options).await,
    );
    snapshot(
        &lua,
        created.map(|role| CustomRole::new(&role, scope.guild())),
    )
}

async fn edit_role(
    lua: Lua,
    scope: Arc<Scope>,
    (role, options): (Value, Value),
) -> LuaResult<Value> {
    let Some(role_id) = id_arg(&role) else {
        return Ok(Value::Nil);
    };
    let Some(options) = options_arg::<EditRole>(&lua, options) else {
        return Ok(Value::Nil);
    };
    if scope.role(role_id).await.is_none() {
        return Ok(Value::Nil);
    }
    let edited = swallow(
        "edit_role",
        scope
            .host
            .platform
            .edit_role(scope.guild_id(), role_id, options)
            .await,
    );
    snapshot(&lua, edited.map(|role| CustomRole::new(&role, scope.guild())))
}

async fn delete_role(_lua: Lua, scope: Arc<Scope>, role: Value) -> LuaResult<Value> {
    let Some(role) = id_arg(&role) else {
        return Ok(Value::Nil);
    };
    match scope.role(role).await {
        Some(role) if !role.is_everyone() => {
            let result = scope
                .host
                .platform
                .delete_role(scope.guild_id(), role.id)
                .await;
            Ok(done(swallow("delete_role", result)))
        }
        _ => Ok(Value::Nil),
    }
}

// === Moderation ===

async fn kick_member(
    _lua: Lua,
    scope: Arc<Scope>,
    (member, reason): (Value, Value),
) -> LuaResult<Value> {
    let Some(user_id) = id_arg(&member) else {
        return Ok(Value::Nil);
    };
    let result = scope
        .host
        .platform
        .kick_member(scope.guild_id(), user_id, text_arg(&reason))
        .await;
    Ok(done(swallow("kick_member", result)))
}

async fn ban_member(
    _lua: Lua,
    scope: Arc<Scope>,
    (member, reason, days): (Value, Value, Value),
) -> LuaResult<Value> {
    let Some(user_id) = id_arg(&member) else {
        return Ok(Value::Nil);
    };
    let days = helpers::to_int(&days).clamp(0, MAX_DELETE_MESSAGE_DAYS) as u8;
    let result = scope
        .host
        .platform
        .ban_member(scope.guild_id(), user_id, days, text_arg(&reason))
        .await;
    Ok(done(swallow("ban_member", result)))
}

async fn edit_member(
    lua: Lua,
    scope: Arc<Scope>,
    (member, options): (Value, Value),
) -> LuaResult<Value> {
    let Some(user_id) = id_arg(&member) else {
        return Ok(Value::Nil);
    };
    let Some(options) = options_arg::<EditMember>(&lua, options) else {
        return Ok(Value::Nil);
    };
    let edited = swallow(
        "edit_member",
        scope
            .host
            .platform
            .edit_member(scope.guild_id(), user_id, options)
            .await,
    );
    snapshot(
        &lua,
        edited.map(|member| CustomMember::new(&member, scope.guild())),
    )
}

// === Lookup ===

async fn get_member(lua: Lua, scope: Arc<Scope>, member: Value) -> LuaResult<Value> {
    let member = match id_arg(&member) {
        Some(id) => scope.member(id).await,
        None => None,
    };
    snapshot(
        &lua,
        member.map(|member| CustomMember::new(&member, scope.guild())),
    )
}

async fn get_role(lua: Lua, scope: Arc<Scope>, role: Value) -> LuaResult<Value> {
    let role = match id_arg(&role) {
        Some(id) => scope.role(id).await,
        None => None,
    };
    snapshot(&lua, role.map(|role| CustomRole::new(&role, scope.guild())))
}

async fn get_channel(lua: Lua, scope: Arc<Scope>, channel: Value) -> LuaResult<Value> {
    let channel = match id_arg(&channel) {
        Some(id) => scope.channel(id).await,
        None => None,
    };
    snapshot(&lua, channel.as_ref().map(CustomChannel::new))
}

async fn get_channel_type(lua: Lua, scope: Arc<Scope>, channel: Value) -> LuaResult<Value> {
    let channel = match id_arg(&channel) {
        Some(id) => scope.channel(id).await,
        None => None,
    };
    match channel {
        Some(channel) => Ok(Value::String(lua.create_string(channel.kind.name())?)),
        None => Ok(Value::Nil),
    }
}

async fn permissions_in(
    _lua: Lua,
    scope: Arc<Scope>,
    (channel, target): (Value, Value),
) -> LuaResult<Value> {
    let (Some(channel_id), Some(target)) = (id_arg(&channel), id_arg(&target)) else {
        return Ok(Value::Nil);
    };
    let Some(channel) = scope.channel(channel_id).await else {
        return Ok(Value::Nil);
    };

    let guild = scope.guild();
    let permissions = if let Some(role) = guild.role(target) {
        role_permissions_in(guild, &channel, role)
    } else if let Some(member) = scope.member(target).await {
        member_permissions_in(guild, &channel, &member)
    } else if let Some(role) = scope.role(target).await {
        role_permissions_in(guild, &channel, &role)
    } else {
        return Ok(Value::Nil);
    };
    Ok(Value::Integer(permissions.bits as i64))
}

async fn get_overwrites(
    lua: Lua,
    scope: Arc<Scope>,
    (channel, target): (Value, Value),
) -> LuaResult<Value> {
    let (Some(channel_id), Some(target)) = (id_arg(&channel), id_arg(&target)) else {
        return Ok(Value::Nil);
    };
    let Some(channel) = scope.channel(channel_id).await else {
        return Ok(Value::Nil);
    };

    let table = lua.create_table()?;
    match overwrites_for(&channel, target) {
        Some(overwrite) => {
            table.raw_set("allow", overwrite.allow.bits as i64)?;
            table.raw_set("deny", overwrite.deny.bits as i64)?;
            let kind = match overwrite.kind {
                OverwriteKind::Role => "role",
                OverwriteKind::Member => "member",
            };
            table.raw_set("type", kind)?;
        }
        None => {
            table.raw_set("allow", 0)?;
            table.raw_set("deny", 0)?;
        }
    }
    Ok(Value::Table(table))
}

// === Waiting ===

async fn wait_for_message(
    lua: Lua,
    scope: Arc<Scope>,
    (timeout, predicate): (Value, Value),
) -> LuaResult<Value> {
    let seconds = helpers::to_float(&timeout).clamp(0.0, MAX_WAIT.as_secs_f64());
    let timeout = Duration::from_secs_f64(seconds);

    let predicate = match predicate {
        Value::Nil => Predicate::default(),
        other => {
            let decoded = lua.from_value(other).ok().and_then(Predicate::from_json);
            let Some(predicate) = decoded else {
                debug!("invalid wait_for_message predicate");
                return Ok(Value::Nil);
            };
            predicate
        }
    };
    let filter: MessageFilter = Box::new(move |message| predicate.matches(message));

    let waited = tokio::time::timeout(
        timeout,
        scope.host.platform.wait_for_message(filter, timeout),
    )
    .await;
    let message = match waited {
        Ok(result) => swallow("wait_for_message", result).flatten(),
        Err(_) => None,
    };
    let Some(message) = message else {
        return Ok(Value::Nil);
    };

    if message.guild_id != Some(scope.guild_id()) {
        debug!(message_id = message.id, "awaited message is from another guild");
        return Ok(Value::Nil);
    }
    let Some(channel) = scope.channel(message.channel_id).await else {
        return Ok(Value::Nil);
    };
    snapshot(
        &lua,
        Some(CustomMessage::new(&message, &channel, scope.guild())),
    )
}

// === Persistence ===

async fn get_db(lua: Lua, scope: Arc<Scope>, key: Value) -> LuaResult<Value> {
    let documents = &scope.host.documents;
    match text_arg(&key) {
        None => {
            let document = swallow_store("get_db", documents.document(scope.guild_id()).await);
            snapshot(&lua, document.flatten())
        }
        Some(key) => {
            let value = swallow_store("get_db", documents.get(scope.guild_id(), &key).await);
            snapshot(&lua, value.flatten())
        }
    }
}

async fn edit_db(
    lua: Lua,
    scope: Arc<Scope>,
    (key, value, upsert): (Value, Value, Value),
) -> LuaResult<Value> {
    let Some(key) = text_arg(&key).filter(|key| !key.is_empty()) else {
        return Ok(Value::Boolean(false));
    };
    let value: serde_json::Value = match lua.from_value(value) {
        Ok(value) => value,
        Err(err) => {
            debug!(key = %key, error = %err, "value cannot be stored");
            return Ok(Value::Boolean(false));
        }
    };
    let upsert = upsert.is_nil() || helpers::to_bool(&upsert);

    let written = swallow_store(
        "edit_db",
        scope
            .host
            .documents
            .edit(scope.guild_id(), &key, value, upsert)
            .await,
    );
    Ok(Value::Boolean(written.unwrap_or(false)))
}

async fn del_db(_lua: Lua, scope: Arc<Scope>, key: Value) -> LuaResult<Value> {
    let Some(key) = text_arg(&key) else {
        return Ok(Value::Boolean(false));
    };
    let deleted = swallow_store(
        "del_db",
        scope.host.documents.delete(scope.guild_id(), &key).await,
    );
    Ok(Value::Boolean(deleted.unwrap_or(false)))
}
