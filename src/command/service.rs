//! Authoring operations for custom commands.

use std::sync::Arc;

use tracing::{info, warn};

use super::scanner::{self, ScanReport};
use super::template;
use super::types::{CommandRecord, Gates, Shape, TriggerType};
use crate::config::CommandsConfig;
use crate::platform::{CreateMessage, Platform};
use crate::script::diagnostic::MESSAGE_LIMIT;
use crate::script::{ScriptEngine, ScriptFault};
use crate::store::CommandStore;
use crate::{CcError, Result};

/// Who asked for a change; quoted in review notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: u64,
    pub name: String,
}

/// Input for [`CommandService::create`].
#[derive(Debug, Clone)]
pub struct NewCommand {
    pub name: String,
    pub trigger_type: TriggerType,
    /// Raw snippet; wrapped before it is stored.
    pub snippet: String,
    pub gates: Gates,
}

/// Service for creating and maintaining guild commands.
pub struct CommandService {
    store: Arc<dyn CommandStore>,
    platform: Arc<dyn Platform>,
    limits: CommandsConfig,
    review_channel: Option<u64>,
}

impl CommandService {
    pub fn new(
        store: Arc<dyn CommandStore>,
        platform: Arc<dyn Platform>,
        limits: CommandsConfig,
        review_channel: Option<u64>,
    ) -> Self {
        Self {
            store,
            platform,
            limits,
            review_channel,
        }
    }

    /// Validate, wrap and scan a snippet, then store it.
    ///
    /// Flagged scripts are stored with `review_needed` set and routed to the
    /// review channel; they never run until approved.
    pub async fn create(
        &self,
        guild_id: u64,
        requester: &Requester,
        command: NewCommand,
    ) -> Result<CommandRecord> {
        self.validate_name(&command.name)?;
        self.validate_snippet(&command.snippet)?;

        if self.store.get(guild_id, &command.name).await?.is_some() {
            return Err(CcError::Validation(format!(
                "command `{}` already exists",
                command.name
            )));
        }

        let code = template::indent(&command.snippet, command.trigger_type.shape());
        let report = scanner::scan(&code);
        let mut record = CommandRecord {
            name: command.name,
            trigger_type: command.trigger_type,
            code,
            review_needed: report.review_needed(),
            required_role: None,
            ignored_role: None,
            required_channel: None,
            ignored_channel: None,
        };
        record.set_gates(command.gates);

        self.store.insert(guild_id, record.clone()).await?;
        info!(
            guild = guild_id,
            command = %record.name,
            trigger = %record.trigger_type,
            review_needed = record.review_needed,
            "command created"
        );

        if record.review_needed {
            self.route_for_review(guild_id, requester, &record, &report)
                .await;
        }
        Ok(record)
    }

    /// Replace the snippet of an existing command; the new code is scanned
    /// again and the review flag follows the new scan.
    pub async fn update_code(
        &self,
        guild_id: u64,
        name: &str,
        requester: &Requester,
        snippet: &str,
    ) -> Result<CommandRecord> {
        self.validate_snippet(snippet)?;
        let mut record = self.find(guild_id, name).await?;

        record.code = template::indent(snippet, record.trigger_type.shape());
        let report = scanner::scan(&record.code);
        record.review_needed = report.review_needed();
        self.save(guild_id, &record).await?;
        info!(guild = guild_id, command = %name, review_needed = record.review_needed, "command code updated");

        if record.review_needed {
            self.route_for_review(guild_id, requester, &record, &report)
                .await;
        }
        Ok(record)
    }

    pub async fn set_gates(&self, guild_id: u64, name: &str, gates: Gates) -> Result<CommandRecord> {
        let mut record = self.find(guild_id, name).await?;
        record.set_gates(gates);
        self.save(guild_id, &record).await?;
        info!(guild = guild_id, command = %name, ?gates, "command gates updated");
        Ok(record)
    }

    /// Clear the review flag after an operator checked the script.
    pub async fn approve(&self, guild_id: u64, name: &str) -> Result<CommandRecord> {
        let mut record = self.find(guild_id, name).await?;
        record.review_needed = false;
        self.save(guild_id, &record).await?;
        info!(guild = guild_id, command = %name, "command approved");
        Ok(record)
    }

    pub async fn remove(&self, guild_id: u64, name: &str) -> Result<()> {
        if !self.store.remove(guild_id, name).await? {
            return Err(CcError::NotFound(format!("command `{name}`")));
        }
        info!(guild = guild_id, command = %name, "command removed");
        Ok(())
    }

    pub async fn list(&self, guild_id: u64) -> Result<Vec<CommandRecord>> {
        self.store.list(guild_id).await
    }

    /// Commands waiting for operator approval.
    pub async fn pending_review(&self, guild_id: u64) -> Result<Vec<CommandRecord>> {
        Ok(self
            .store
            .list(guild_id)
            .await?
            .into_iter()
            .filter(|record| record.review_needed)
            .collect())
    }

    async fn find(&self, guild_id: u64, name: &str) -> Result<CommandRecord> {
        self.store
            .get(guild_id, name)
            .await?
            .ok_or_else(|| CcError::NotFound(format!("command `{name}`")))
    }

    async fn save(&self, guild_id: u64, record: &CommandRecord) -> Result<()> {
        if !self.store.update(guild_id, record.clone()).await? {
            return Err(CcError::NotFound(format!("command `{}`", record.name)));
        }
        Ok(())
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(CcError::Validation("command name is empty".to_string()));
        }
        if name.chars().count() > self.limits.max_name_length {
            return Err(CcError::Validation(format!(
                "command name exceeds {} characters",
                self.limits.max_name_length
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CcError::Validation(format!(
                "command name `{name}` may only contain letters, digits, `_` and `-`"
            )));
        }
        Ok(())
    }

    fn validate_snippet(&self, snippet: &str) -> Result<()> {
        if snippet.chars().count() > self.limits.max_code_length {
            return Err(CcError::Validation(format!(
                "code exceeds {} characters",
                self.limits.max_code_length
            )));
        }
        Ok(())
    }

    async fn route_for_review(
        &self,
        guild_id: u64,
        requester: &Requester,
        record: &CommandRecord,
        report: &ScanReport,
    ) {
        let Some(channel_id) = self.review_channel else {
            warn!(
                guild = guild_id,
                command = %record.name,
                "command needs review but no review channel is configured"
            );
            return;
        };

        let notice = review_notice(guild_id, requester, record, report);
        if let Err(err) = self
            .platform
            .send_message(channel_id, CreateMessage::text(notice))
            .await
        {
            warn!(
                guild = guild_id,
                command = %record.name,
                error = %err,
                "failed to deliver review notice"
            );
        }
    }
}

/// Review notice: metadata block followed by the wrapped source.
pub fn review_notice(
    guild_id: u64,
    requester: &Requester,
    record: &CommandRecord,
    report: &ScanReport,
) -> String {
    let header = format!(
        "```\nReview requested\nGuild: {}\nRequester: {} ({})\nCommand: {} ({})\nFlagged: {}\n```\n",
        guild_id,
        requester.name,
        requester.user_id,
        record.name,
        record.trigger_type,
        report.findings.join(", "),
    );
    let frame = "```lua\n\n```".len();
    let budget = MESSAGE_LIMIT.saturating_sub(header.chars().count() + frame);
    let code: String = record.code.replace("```", "'''").chars().take(budget).collect();
    format!("{header}```lua\n{code}\n```")
}

/// Offline verdict on a snippet: the review flag and the compile status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub scan: ScanReport,
    pub compile: std::result::Result<(), ScriptFault>,
}

impl CheckReport {
    /// Lines printed by the `check` subcommand.
    pub fn lines(&self) -> [String; 2] {
        let review = if self.scan.review_needed() {
            format!("review: needed ({})", self.scan.findings.join(", "))
        } else {
            "review: ok".to_string()
        };
        let compile = match &self.compile {
            Ok(()) => "compile: ok".to_string(),
            Err(fault) => format!("compile: {fault}"),
        };
        [review, compile]
    }
}

/// Wrap `snippet` for `shape`, scan it and compile it without running it.
pub fn check_snippet(engine: &ScriptEngine, name: &str, snippet: &str, shape: Shape) -> CheckReport {
    let code = template::indent(snippet, shape);
    CheckReport {
        scan: scanner::scan(&code),
        compile: engine.check_syntax(name, &code),
    }
}
