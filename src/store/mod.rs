//! Persistence seams: the command store and the per-guild document store.
//!
//! Backends live outside this crate; [`memory`] provides in-process
//! implementations used by the CLI and the tests.

pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::command::CommandRecord;
use crate::Result;

pub use memory::{MemoryCommandStore, MemoryDocumentStore};

/// Guild-keyed list of custom commands.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// All commands of a guild, in creation order.
    async fn list(&self, guild_id: u64) -> Result<Vec<CommandRecord>>;

    async fn get(&self, guild_id: u64, name: &str) -> Result<Option<CommandRecord>>;

    /// Insert a new command. Fails if the name is taken in this guild.
    async fn insert(&self, guild_id: u64, record: CommandRecord) -> Result<()>;

    /// Replace the command with the same name. Returns false if absent.
    async fn update(&self, guild_id: u64, record: CommandRecord) -> Result<bool>;

    async fn remove(&self, guild_id: u64, name: &str) -> Result<bool>;
}

/// Per-guild JSON document used by scripts through `get_db`/`edit_db`/`del_db`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whole document of a guild, if one was ever written.
    async fn document(&self, guild_id: u64) -> Result<Option<Map<String, Value>>>;

    async fn get(&self, guild_id: u64, key: &str) -> Result<Option<Value>>;

    /// Set `key`. Without `upsert` only existing keys are updated.
    /// Returns whether a write happened.
    async fn edit(&self, guild_id: u64, key: &str, value: Value, upsert: bool) -> Result<bool>;

    async fn delete(&self, guild_id: u64, key: &str) -> Result<bool>;
}
