//! Fault reports posted back to the origin channel.

use chrono::{DateTime, SecondsFormat, Utc};

use super::engine::ScriptFault;
use crate::platform::Channel;

/// Largest message the platform accepts, in characters.
pub const MESSAGE_LIMIT: usize = 2000;

const FENCE: &str = "```";
const ELLIPSIS: &str = "\n...";

/// Render a fault as two fenced blocks: where it happened, then what.
///
/// The trace is shortened so the whole report fits in one message.
pub fn render(command: &str, channel: &Channel, sent_at: DateTime<Utc>, fault: &ScriptFault) -> String {
    let header = format!(
        "{FENCE}\nCustom command `{}` failed\nChannel: #{} ({})\nMessage sent at: {}\n{FENCE}\n",
        sanitize(command),
        sanitize(&channel.name),
        channel.id,
        sent_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    let frame = FENCE.len() * 2 + 2;
    let budget = MESSAGE_LIMIT.saturating_sub(header.chars().count() + frame);
    let trace = truncate(&sanitize(&fault.to_string()), budget);

    format!("{header}{FENCE}\n{trace}\n{FENCE}")
}

// A fence inside the report would close the block early.
fn sanitize(text: &str) -> String {
    text.replace(FENCE, "'''")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
