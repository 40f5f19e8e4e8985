//! ccengine - guild custom command engine
//!
//! Stores per-guild Lua snippets bound to chat platform events and runs
//! them in a capability-restricted sandbox.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod platform;
pub mod script;
pub mod store;

pub use command::{CommandRecord, CommandService, Gates, TriggerType};
pub use config::Config;
pub use dispatch::{Dispatcher, Execution};
pub use error::{CcError, Result};
pub use platform::{Platform, PlatformError};
pub use script::{Host, RunOutcome, ScriptEngine, ScriptFault};
pub use store::{CommandStore, DocumentStore, MemoryCommandStore, MemoryDocumentStore};
