//! Invocation contexts: the event data a script runs against.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mlua::{Lua, MultiValue};

use super::snapshot::{to_lua, CustomMember, CustomMessage, CustomReaction};
use crate::command::Shape;
use crate::platform::{Channel, Guild, Member, Message, Platform, Reaction};
use crate::store::DocumentStore;

/// Services shared by every invocation.
#[derive(Clone)]
pub struct Host {
    pub platform: Arc<dyn Platform>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Host {
    pub fn new(platform: Arc<dyn Platform>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            platform,
            documents,
        }
    }
}

/// A message was sent or edited.
#[derive(Debug, Clone)]
pub struct OnMessageContext {
    pub guild: Guild,
    pub channel: Channel,
    pub message: Message,
}

/// A reaction was added or removed.
#[derive(Debug, Clone)]
pub struct OnReactionContext {
    pub guild: Guild,
    pub channel: Channel,
    pub message: Message,
    pub reaction: Reaction,
    /// The member who reacted.
    pub user: Member,
}

/// A member joined or left.
#[derive(Debug, Clone)]
pub struct OnMemberContext {
    pub guild: Guild,
    pub member: Member,
}

#[derive(Debug, Clone)]
pub enum InvocationContext {
    Message(OnMessageContext),
    Reaction(OnReactionContext),
    Member(OnMemberContext),
}

impl InvocationContext {
    pub fn guild(&self) -> &Guild {
        match self {
            Self::Message(ctx) => &ctx.guild,
            Self::Reaction(ctx) => &ctx.guild,
            Self::Member(ctx) => &ctx.guild,
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::Message(_) => Shape::Message,
            Self::Reaction(_) => Shape::Reaction,
            Self::Member(_) => Shape::Member,
        }
    }

    /// The triggering message and its channel, for message and reaction events.
    pub fn message(&self) -> Option<(&Message, &Channel)> {
        match self {
            Self::Message(ctx) => Some((&ctx.message, &ctx.channel)),
            Self::Reaction(ctx) => Some((&ctx.message, &ctx.channel)),
            Self::Member(_) => None,
        }
    }

    /// Roles of the member who caused the event.
    pub fn actor_roles(&self) -> &[u64] {
        match self {
            Self::Message(ctx) => &ctx.message.author.roles,
            Self::Reaction(ctx) => &ctx.user.roles,
            Self::Member(ctx) => &ctx.member.roles,
        }
    }

    /// Channel the event happened in. Member events have none.
    pub fn channel_id(&self) -> Option<u64> {
        self.message().map(|(_, channel)| channel.id)
    }

    /// Where and when a fault report should point: the origin channel and
    /// the triggering message's timestamp.
    pub fn origin(&self) -> Option<(&Channel, DateTime<Utc>)> {
        self.message()
            .map(|(message, channel)| (channel, message.timestamp))
    }

    /// Snapshot arguments passed to the entry point, in parameter order.
    pub fn entry_args(&self, lua: &Lua) -> mlua::Result<MultiValue> {
        let values = match self {
            Self::Message(ctx) => vec![to_lua(
                lua,
                &CustomMessage::new(&ctx.message, &ctx.channel, &ctx.guild),
            )?],
            Self::Reaction(ctx) => vec![
                to_lua(
                    lua,
                    &CustomReaction::new(&ctx.reaction, &ctx.message, &ctx.channel, &ctx.guild),
                )?,
                to_lua(lua, &CustomMember::new(&ctx.user, &ctx.guild))?,
            ],
            Self::Member(ctx) => vec![to_lua(lua, &CustomMember::new(&ctx.member, &ctx.guild))?],
        };
        Ok(MultiValue::from_vec(values))
    }
}

impl From<OnMessageContext> for InvocationContext {
    fn from(ctx: OnMessageContext) -> Self {
        Self::Message(ctx)
    }
}

impl From<OnReactionContext> for InvocationContext {
    fn from(ctx: OnReactionContext) -> Self {
        Self::Reaction(ctx)
    }
}

impl From<OnMemberContext> for InvocationContext {
    fn from(ctx: OnMemberContext) -> Self {
        Self::Member(ctx)
    }
}
