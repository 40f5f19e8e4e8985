//! Event dispatch: selects the commands bound to an event and runs them.
//!
//! All commands matching one event run concurrently, each in its own
//! sandbox. Faults of message and reaction commands are reported to the
//! channel the event came from; membership command faults are only logged.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, warn, Instrument};

use crate::command::{guard, CommandRecord, TriggerType};
use crate::logging::invocation_span;
use crate::platform::{CreateMessage, Member, Message, PlatformError, Reaction};
use crate::script::diagnostic;
use crate::script::{
    Host, InvocationContext, OnMemberContext, OnMessageContext, OnReactionContext, RunOutcome,
    ScriptEngine, ScriptFault,
};
use crate::store::CommandStore;
use crate::Result;

/// Result of running one command for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub command: String,
    pub result: std::result::Result<RunOutcome, ScriptFault>,
}

/// Routes platform events to guild commands.
pub struct Dispatcher {
    commands: Arc<dyn CommandStore>,
    host: Host,
    engine: ScriptEngine,
}

impl Dispatcher {
    pub fn new(commands: Arc<dyn CommandStore>, host: Host, engine: ScriptEngine) -> Self {
        Self {
            commands,
            host,
            engine,
        }
    }

    pub async fn on_message(&self, message: Message) -> Result<Vec<Execution>> {
        self.message_event(TriggerType::OnMessage, message).await
    }

    pub async fn on_message_edit(&self, message: Message) -> Result<Vec<Execution>> {
        self.message_event(TriggerType::MessageEdit, message).await
    }

    pub async fn on_reaction_add(&self, reaction: Reaction) -> Result<Vec<Execution>> {
        self.reaction_event(TriggerType::ReactionAdd, reaction).await
    }

    pub async fn on_reaction_remove(&self, reaction: Reaction) -> Result<Vec<Execution>> {
        self.reaction_event(TriggerType::ReactionRemove, reaction)
            .await
    }

    pub async fn on_member_join(&self, member: Member) -> Result<Vec<Execution>> {
        self.member_event(TriggerType::MemberJoin, member).await
    }

    pub async fn on_member_remove(&self, member: Member) -> Result<Vec<Execution>> {
        self.member_event(TriggerType::MemberRemove, member).await
    }

    async fn message_event(&self, event: TriggerType, message: Message) -> Result<Vec<Execution>> {
        if message.author.user.bot {
            return Ok(Vec::new());
        }
        let Some(guild_id) = message.guild_id else {
            return Ok(Vec::new());
        };
        let candidates = self.candidates(guild_id, event).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let guild = self.host.platform.guild(guild_id).await?;
        let channel = self.host.platform.channel(message.channel_id).await?;
        let context = OnMessageContext {
            guild,
            channel,
            message,
        };
        Ok(self.dispatch(event, candidates, context.into()).await)
    }

    async fn reaction_event(
        &self,
        event: TriggerType,
        reaction: Reaction,
    ) -> Result<Vec<Execution>> {
        let Some(guild_id) = reaction.guild_id else {
            return Ok(Vec::new());
        };
        let candidates = self.candidates(guild_id, event).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let platform = &self.host.platform;
        let user = match platform.member(guild_id, reaction.user_id).await {
            Ok(user) => user,
            Err(PlatformError::NotFound(_)) => {
                debug!(user = reaction.user_id, "reacting user is no longer a member");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        if user.user.bot {
            return Ok(Vec::new());
        }
        let guild = platform.guild(guild_id).await?;
        let channel = platform.channel(reaction.channel_id).await?;
        let message = platform
            .message(reaction.channel_id, reaction.message_id)
            .await?;
        let context = OnReactionContext {
            guild,
            channel,
            message,
            reaction,
            user,
        };
        Ok(self.dispatch(event, candidates, context.into()).await)
    }

    async fn member_event(&self, event: TriggerType, member: Member) -> Result<Vec<Execution>> {
        let candidates = self.candidates(member.guild_id, event).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let guild = self.host.platform.guild(member.guild_id).await?;
        let context = OnMemberContext { guild, member };
        Ok(self.dispatch(event, candidates, context.into()).await)
    }

    /// Runnable commands of a guild bound to `event`.
    async fn candidates(&self, guild_id: u64, event: TriggerType) -> Result<Vec<CommandRecord>> {
        let records = self.commands.list(guild_id).await?;
        Ok(records
            .into_iter()
            .filter(|record| record.trigger_type.fires_on(event))
            .filter(|record| {
                if !record.is_runnable() {
                    debug!(command = %record.name, "skipping command awaiting review");
                }
                record.is_runnable()
            })
            .collect())
    }

    async fn dispatch(
        &self,
        event: TriggerType,
        candidates: Vec<CommandRecord>,
        context: InvocationContext,
    ) -> Vec<Execution> {
        let context = Arc::new(context);
        let runs = candidates
            .into_iter()
            .filter(|record| {
                guard::evaluate(&record.gates(), context.actor_roles(), context.channel_id())
            })
            .map(|record| self.run(event, record, Arc::clone(&context)));
        join_all(runs).await
    }

    async fn run(
        &self,
        event: TriggerType,
        record: CommandRecord,
        context: Arc<InvocationContext>,
    ) -> Execution {
        let span = invocation_span(&record.name, event, context.guild().id);
        async {
            let result = self
                .engine
                .run(&record.name, &record.code, &self.host, Arc::clone(&context))
                .await;

            if let Err(fault) = &result {
                if record.trigger_type.reports_faults() {
                    self.report(&record, &context, fault).await;
                } else {
                    warn!(error = %fault, "membership command failed");
                }
            }

            Execution {
                command: record.name.clone(),
                result,
            }
        }
        .instrument(span)
        .await
    }

    async fn report(&self, record: &CommandRecord, context: &InvocationContext, fault: &ScriptFault) {
        let Some((channel, sent_at)) = context.origin() else {
            return;
        };
        debug!(error = %fault, "reporting command fault");
        let report = diagnostic::render(&record.name, channel, sent_at, fault);
        if let Err(err) = self
            .host
            .platform
            .send_message(channel.id, CreateMessage::text(report))
            .await
        {
            error!(error = %err, "failed to deliver fault report");
        }
    }
}
