//! Script runtime for custom commands.
//!
//! Wrapped command sources run in a sandboxed Lua state that only sees
//! safe language builtins, entity snapshots and a capability surface bound
//! to the triggering event.

pub mod api;
pub mod context;
pub mod diagnostic;
pub mod engine;
pub mod helpers;
pub mod predicate;
pub mod snapshot;

pub use api::CapabilitySurface;
pub use context::{Host, InvocationContext, OnMemberContext, OnMessageContext, OnReactionContext};
pub use engine::{ResourceLimits, RunOutcome, ScriptEngine, ScriptFault};
pub use predicate::Predicate;
pub use snapshot::{
    CustomChannel, CustomEmoji, CustomGuild, CustomMember, CustomMessage, CustomReaction,
    CustomRole,
};
