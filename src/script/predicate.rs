//! Attribute predicates for `wait_for_message`.
//!
//! A predicate is a table of `path = expected` pairs. Paths are attribute
//! names joined with `__`, so `author__id = 42` compares the id of the
//! message author. A message matches when every pair matches.

use serde_json::{json, Map, Value};

use crate::platform::Message;

const PATH_SEPARATOR: &str = "__";

/// Compiled predicate over a message view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<(Vec<String>, Value)>,
}

impl Predicate {
    /// Build from a decoded predicate table. Non-object input is rejected.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::default()),
            Value::Object(map) => Some(Self::from_map(map)),
            // An empty Lua table decodes as an empty array.
            Value::Array(items) if items.is_empty() => Some(Self::default()),
            _ => None,
        }
    }

    fn from_map(map: Map<String, Value>) -> Self {
        let clauses = map
            .into_iter()
            .map(|(key, expected)| {
                let path = key.split(PATH_SEPARATOR).map(str::to_string).collect();
                (path, expected)
            })
            .collect();
        Self { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, message: &Message) -> bool {
        if self.clauses.is_empty() {
            return true;
        }
        let view = message_view(message);
        self.clauses.iter().all(|(path, expected)| {
            lookup(&view, path).is_some_and(|actual| values_match(expected, actual))
        })
    }
}

/// Attribute view of a live message used for matching.
///
/// Mirrors the attribute names of the message snapshot for the parts that
/// can be derived without fetching the guild.
pub fn message_view(message: &Message) -> Value {
    let author = &message.author;
    json!({
        "id": message.id,
        "guild_id": message.guild_id,
        "content": message.content,
        "channel": { "id": message.channel_id },
        "author": {
            "id": author.id(),
            "name": author.user.name,
            "global_name": author.user.global_name,
            "display_name": author.display_name(),
            "nick": author.nick,
            "bot": author.user.bot,
            "roles": author.roles,
        },
        "mentions": message.mentions,
        "role_mentions": message.mention_roles,
        "channel_mentions": message.mention_channels,
        "attachments": message.attachments,
        "pinned": message.pinned,
        "tts": message.tts,
    })
}

fn lookup<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| items.get(i)),
        _ => None,
    })
}

fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(e), Value::Number(a)) => match (e.as_u64(), a.as_u64()) {
            (Some(e), Some(a)) => e == a,
            _ => e.as_f64() == a.as_f64(),
        },
        // Ids may be written as strings in scripts.
        (Value::String(e), Value::Number(a)) => e.trim() == a.to_string(),
        (Value::Number(e), Value::String(a)) => a.trim() == e.to_string(),
        _ => expected == actual,
    }
}
