//! Role and channel gates evaluated before a command is attempted.

use super::types::Gates;

/// Decide whether a command with `gates` may run.
///
/// `roles` are the acting member's role ids; `channel_id` is the channel the
/// event happened in (`None` for membership events). Precedence is fixed:
///
/// 1. holding the required role allows, even in the ignored channel;
/// 2. holding the ignored role denies;
/// 3. the ignored channel denies;
/// 4. the required channel allows;
/// 5. otherwise allow.
pub fn evaluate(gates: &Gates, roles: &[u64], channel_id: Option<u64>) -> bool {
    let holds = |role: Option<u64>| role.is_some_and(|id| roles.contains(&id));
    let is_channel = |channel: Option<u64>| channel.is_some() && channel == channel_id;

    if holds(gates.required_role) {
        return true;
    }
    if holds(gates.ignored_role) {
        return false;
    }
    if is_channel(gates.ignored_channel) {
        return false;
    }
    if is_channel(gates.required_channel) {
        return true;
    }
    true
}
