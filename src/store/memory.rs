//! In-memory store implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{CommandStore, DocumentStore};
use crate::command::CommandRecord;
use crate::{CcError, Result};

/// Command store backed by a map of per-guild lists.
#[derive(Default)]
pub struct MemoryCommandStore {
    guilds: RwLock<HashMap<u64, Vec<CommandRecord>>>,
}

impl MemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandStore for MemoryCommandStore {
    async fn list(&self, guild_id: u64) -> Result<Vec<CommandRecord>> {
        Ok(self
            .guilds
            .read()
            .await
            .get(&guild_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get(&self, guild_id: u64, name: &str) -> Result<Option<CommandRecord>> {
        Ok(self
            .guilds
            .read()
            .await
            .get(&guild_id)
            .and_then(|records| records.iter().find(|r| r.name == name).cloned()))
    }

    async fn insert(&self, guild_id: u64, record: CommandRecord) -> Result<()> {
        let mut guilds = self.guilds.write().await;
        let records = guilds.entry(guild_id).or_default();
        if records.iter().any(|r| r.name == record.name) {
            return Err(CcError::Store(format!(
                "command `{}` already exists",
                record.name
            )));
        }
        records.push(record);
        Ok(())
    }

    async fn update(&self, guild_id: u64, record: CommandRecord) -> Result<bool> {
        let mut guilds = self.guilds.write().await;
        let Some(slot) = guilds
            .get_mut(&guild_id)
            .and_then(|records| records.iter_mut().find(|r| r.name == record.name))
        else {
            return Ok(false);
        };
        *slot = record;
        Ok(true)
    }

    async fn remove(&self, guild_id: u64, name: &str) -> Result<bool> {
        let mut guilds = self.guilds.write().await;
        let Some(records) = guilds.get_mut(&guild_id) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|r| r.name != name);
        Ok(records.len() != before)
    }
}

/// Document store keeping one JSON object per guild.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<u64, Map<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn document(&self, guild_id: u64) -> Result<Option<Map<String, Value>>> {
        Ok(self.documents.read().await.get(&guild_id).cloned())
    }

    async fn get(&self, guild_id: u64, key: &str) -> Result<Option<Value>> {
        Ok(self
            .documents
            .read()
            .await
            .get(&guild_id)
            .and_then(|doc| doc.get(key).cloned()))
    }

    async fn edit(&self, guild_id: u64, key: &str, value: Value, upsert: bool) -> Result<bool> {
        let mut documents = self.documents.write().await;
        if upsert {
            documents
                .entry(guild_id)
                .or_default()
                .insert(key.to_string(), value);
            return Ok(true);
        }

        match documents.get_mut(&guild_id).and_then(|doc| doc.get_mut(key)) {
            Some(slot) => {
                *slot = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, guild_id: u64, key: &str) -> Result<bool> {
        let mut documents = self.documents.write().await;
        Ok(documents
            .get_mut(&guild_id)
            .and_then(|doc| doc.remove(key))
            .is_some())
    }
}
