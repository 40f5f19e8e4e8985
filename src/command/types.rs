//! Custom command records and trigger types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CcError;

/// Platform event a custom command is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    OnMessage,
    MessageEdit,
    ReactionAdd,
    ReactionRemove,
    ReactionAddOrRemove,
    MemberJoin,
    MemberRemove,
}

impl TriggerType {
    pub const ALL: [TriggerType; 7] = [
        TriggerType::OnMessage,
        TriggerType::MessageEdit,
        TriggerType::ReactionAdd,
        TriggerType::ReactionRemove,
        TriggerType::ReactionAddOrRemove,
        TriggerType::MemberJoin,
        TriggerType::MemberRemove,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::OnMessage => "on_message",
            TriggerType::MessageEdit => "message_edit",
            TriggerType::ReactionAdd => "reaction_add",
            TriggerType::ReactionRemove => "reaction_remove",
            TriggerType::ReactionAddOrRemove => "reaction_add_or_remove",
            TriggerType::MemberJoin => "member_join",
            TriggerType::MemberRemove => "member_remove",
        }
    }

    /// Entry point shape scripts for this trigger are wrapped into.
    pub fn shape(self) -> Shape {
        match self {
            TriggerType::OnMessage | TriggerType::MessageEdit => Shape::Message,
            TriggerType::ReactionAdd
            | TriggerType::ReactionRemove
            | TriggerType::ReactionAddOrRemove => Shape::Reaction,
            TriggerType::MemberJoin | TriggerType::MemberRemove => Shape::Member,
        }
    }

    /// Whether a record bound to `self` fires for an `event` trigger.
    pub fn fires_on(self, event: TriggerType) -> bool {
        match self {
            TriggerType::ReactionAddOrRemove => matches!(
                event,
                TriggerType::ReactionAdd | TriggerType::ReactionRemove
            ),
            other => other == event,
        }
    }

    /// Faults of observable triggers are reported back to the channel.
    pub fn reports_faults(self) -> bool {
        self.shape() != Shape::Member
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = CcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CcError::Validation(format!("unknown trigger type `{s}`")))
    }
}

/// Entry point signature of a wrapped script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Message,
    Reaction,
    Member,
}

impl Shape {
    /// Parameter names passed to the entry point, in call order.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            Shape::Message => &["message"],
            Shape::Reaction => &["reaction", "user"],
            Shape::Member => &["member"],
        }
    }
}

impl FromStr for Shape {
    type Err = CcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MESSAGE" => Ok(Shape::Message),
            "REACTION" => Ok(Shape::Reaction),
            "MEMBER" => Ok(Shape::Member),
            _ => Err(CcError::Validation(format!("unknown script shape `{s}`"))),
        }
    }
}

/// Optional role and channel gates of a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gates {
    pub required_role: Option<u64>,
    pub ignored_role: Option<u64>,
    pub required_channel: Option<u64>,
    pub ignored_channel: Option<u64>,
}

/// A guild-scoped custom command as persisted by the command store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub name: String,
    pub trigger_type: TriggerType,
    /// Template-wrapped script source.
    pub code: String,
    pub review_needed: bool,
    #[serde(default)]
    pub required_role: Option<u64>,
    #[serde(default)]
    pub ignored_role: Option<u64>,
    #[serde(default)]
    pub required_channel: Option<u64>,
    #[serde(default)]
    pub ignored_channel: Option<u64>,
}

impl CommandRecord {
    pub fn gates(&self) -> Gates {
        Gates {
            required_role: self.required_role,
            ignored_role: self.ignored_role,
            required_channel: self.required_channel,
            ignored_channel: self.ignored_channel,
        }
    }

    pub fn set_gates(&mut self, gates: Gates) {
        self.required_role = gates.required_role;
        self.ignored_role = gates.ignored_role;
        self.required_channel = gates.required_channel;
        self.ignored_channel = gates.ignored_channel;
    }

    /// Only records cleared by review may be dispatched.
    pub fn is_runnable(&self) -> bool {
        !self.review_needed
    }
}
