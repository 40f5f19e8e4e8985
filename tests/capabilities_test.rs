//! Capability surface tests: guild scoping, options tables, lookups and
//! persistence, observed through the platform double and the stores.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use ccengine::command::{template, Shape};
use ccengine::platform::{Permissions, Platform};
use ccengine::script::{InvocationContext, OnMemberContext, OnReactionContext};
use ccengine::{DocumentStore, RunOutcome};
use common::*;

async fn member_context(harness: &Harness) -> Arc<InvocationContext> {
    let guild = harness.platform.guild(GUILD).await.unwrap();
    let member = guild.member(ALICE).cloned().unwrap();
    Arc::new(InvocationContext::Member(OnMemberContext { guild, member }))
}

async fn reaction_context(harness: &Harness) -> Arc<InvocationContext> {
    let platform = &harness.platform;
    let guild = platform.guild(GUILD).await.unwrap();
    let channel = platform.channel(GENERAL).await.unwrap();
    let message = platform.message(GENERAL, TRIGGER_MESSAGE).await.unwrap();
    let user = guild.member(BOB).cloned().unwrap();
    Arc::new(InvocationContext::Reaction(OnReactionContext {
        guild,
        channel,
        message,
        reaction: reaction(BOB, "👍"),
        user,
    }))
}

/// Run a member-shaped snippet and return the guild document afterwards.
async fn run_member(harness: &Harness, snippet: &str) -> Value {
    let engine = Harness::engine(Duration::from_secs(5));
    let code = template::indent(snippet, Shape::Member);
    let context = member_context(harness).await;
    let outcome = engine.run("inspect", &code, &harness.host, context).await;
    assert_eq!(outcome, Ok(RunOutcome::Completed));
    harness
        .documents
        .document(GUILD)
        .await
        .unwrap()
        .map(Value::Object)
        .unwrap_or(Value::Null)
}

#[tokio::test]
async fn test_message_send_is_guild_scoped() {
    let harness = Harness::new();
    let doc = run_member(
        &harness,
        &format!(
            "edit_db('foreign', message_send({FOREIGN_CHANNEL}, 'x') == nil)\n\
             edit_db('voice', message_send({VOICE}, 'x') == nil)\n\
             edit_db('missing', message_send(123, 'x') == nil)\n\
             local sent = message_send('{GENERAL}', 'hello')\n\
             edit_db('sent_channel', sent.channel.id)"
        ),
    )
    .await;

    assert_eq!(doc["foreign"], json!(true));
    assert_eq!(doc["voice"], json!(true));
    assert_eq!(doc["missing"], json!(true));
    assert_eq!(doc["sent_channel"], json!(GENERAL));
    let sent = harness.platform.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, GENERAL);
}

#[tokio::test]
async fn test_message_send_with_embed() {
    let harness = Harness::new();
    run_member(
        &harness,
        &format!("message_send({GENERAL}, '', {{title = 'Welcome', fields = {{{{name = 'a', value = 'b'}}}}}})"),
    )
    .await;

    let sent = harness.platform.sent();
    assert_eq!(sent.len(), 1);
    let embed = sent[0].1.embed.as_ref().unwrap();
    assert_eq!(embed.title.as_deref(), Some("Welcome"));
    assert_eq!(embed.fields.len(), 1);
    assert_eq!(embed.fields[0].name, "a");
}

#[tokio::test]
async fn test_structure_capabilities() {
    let harness = Harness::new();
    let doc = run_member(
        &harness,
        &format!(
            "local c = create_channel('news', {{type = 'text', topic = 'daily', category_id = {CATEGORY}}})\n\
             edit_db('created', c.name)\n\
             edit_db('category', c.category_id)\n\
             edit_db('bad_category', create_channel('x', {{category_id = {GENERAL}}}) == nil)\n\
             local e = edit_channel(c.id, {{name = 'updates'}})\n\
             edit_db('edited', e.name)\n\
             edit_db('foreign_edit', edit_channel({FOREIGN_CHANNEL}, {{name = 'mine'}}) == nil)\n\
             edit_db('deleted', delete_channel(c.id))\n\
             local r = create_role({{name = 'helper', permissions = Permissions.MANAGE_MESSAGES}})\n\
             edit_db('role', r.name)\n\
             edit_db('role_perms', r.permissions)\n\
             edit_db('everyone_kept', delete_role(guild.id) == nil)"
        ),
    )
    .await;

    assert_eq!(doc["created"], json!("news"));
    assert_eq!(doc["category"], json!(CATEGORY));
    assert_eq!(doc["bad_category"], json!(true));
    assert_eq!(doc["edited"], json!("updates"));
    assert_eq!(doc["foreign_edit"], json!(true));
    assert_eq!(doc["deleted"], json!(true));
    assert_eq!(doc["role"], json!("helper"));
    assert_eq!(doc["role_perms"], json!(Permissions::MANAGE_MESSAGES.bits));
    assert_eq!(doc["everyone_kept"], json!(true));
    assert!(harness.platform.channel_named("updates").is_none());
    assert!(harness.platform.channel_named("elsewhere").is_some());
}

#[tokio::test]
async fn test_moderation_capabilities() {
    let harness = Harness::new();
    let doc = run_member(
        &harness,
        &format!(
            "edit_db('kicked', kick_member({BOB}, 'spam'))\n\
             edit_db('owner', kick_member({OWNER}) == nil)\n\
             local m = edit_member({ALICE}, {{nick = 'Al'}})\n\
             edit_db('nick', m.display_name)\n\
             edit_db('banned', ban_member('12345', nil, 30))"
        ),
    )
    .await;

    assert_eq!(doc["kicked"], json!(true));
    assert_eq!(doc["owner"], json!(true));
    assert_eq!(doc["nick"], json!("Al"));
    assert_eq!(doc["banned"], json!(true));
    let calls = harness.platform.calls();
    assert!(calls.contains(&format!("kick_member:{BOB}:spam")));
    assert!(calls.contains(&"ban_member:12345:7:".to_string()));
}

#[tokio::test]
async fn test_lookup_capabilities() {
    let harness = Harness::new();
    let doc = run_member(
        &harness,
        &format!(
            "edit_db('member', get_member('{ALICE}').name)\n\
             edit_db('float_id', get_member({ALICE}.0).name)\n\
             edit_db('missing', get_member(777) == nil)\n\
             edit_db('role', get_role({MOD_ROLE}).name)\n\
             edit_db('role_members', get_role({MOD_ROLE}).members)\n\
             edit_db('channel', get_channel({GENERAL}).name)\n\
             edit_db('foreign', get_channel({FOREIGN_CHANNEL}) == nil)\n\
             edit_db('voice_type', get_channel_type({VOICE}))\n\
             edit_db('voice_code', ChannelType.voice)"
        ),
    )
    .await;

    assert_eq!(doc["member"], json!("alice"));
    assert_eq!(doc["float_id"], json!("alice"));
    assert_eq!(doc["missing"], json!(true));
    assert_eq!(doc["role"], json!("mod"));
    assert_eq!(doc["role_members"], json!([ALICE]));
    assert_eq!(doc["channel"], json!("general"));
    assert_eq!(doc["foreign"], json!(true));
    assert_eq!(doc["voice_type"], json!("voice"));
    assert_eq!(doc["voice_code"], json!(2));
}

#[tokio::test]
async fn test_permission_capabilities() {
    let harness = Harness::new();
    let doc = run_member(
        &harness,
        &format!(
            "edit_db('bob', permissions_in({GENERAL}, {BOB}))\n\
             edit_db('alice', permissions_in({GENERAL}, {ALICE}))\n\
             edit_db('muted', permissions_in({GENERAL}, {MUTED_ROLE}))\n\
             edit_db('owner', permissions_in({GENERAL}, {OWNER}))\n\
             local o = overwrites_for({GENERAL}, {MUTED_ROLE})\n\
             edit_db('deny', o.deny)\n\
             edit_db('kind', o.type)\n\
             edit_db('none', overwrites_for({GENERAL}, {ALICE}).allow)"
        ),
    )
    .await;

    let base = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES;
    assert_eq!(doc["bob"], json!(Permissions::VIEW_CHANNEL.bits));
    assert_eq!(
        doc["alice"],
        json!((base | Permissions::KICK_MEMBERS).bits)
    );
    assert_eq!(doc["muted"], json!(Permissions::VIEW_CHANNEL.bits));
    assert_eq!(doc["owner"], json!(Permissions::all().bits));
    assert_eq!(doc["deny"], json!(Permissions::SEND_MESSAGES.bits));
    assert_eq!(doc["kind"], json!("role"));
    assert_eq!(doc["none"], json!(0));
}

#[tokio::test]
async fn test_persistence_capabilities() {
    let harness = Harness::new();
    let doc = run_member(
        &harness,
        "edit_db('counter', 1)\n\
         edit_db('counter', get_db('counter') + 1)\n\
         edit_db('nested', {a = {1, 2}, b = 'x'})\n\
         edit_db('no_upsert', edit_db('absent', 1, false))\n\
         edit_db('gone', 1)\n\
         edit_db('deleted', del_db('gone'))\n\
         edit_db('deleted_again', del_db('gone'))\n\
         edit_db('keys', len(get_db()))\n\
         edit_db('bad_value', edit_db('fn', function() end))",
    )
    .await;

    assert_eq!(doc["counter"], json!(2));
    assert_eq!(doc["nested"], json!({"a": [1, 2], "b": "x"}));
    assert_eq!(doc["no_upsert"], json!(false));
    assert!(doc.get("absent").is_none());
    assert_eq!(doc["deleted"], json!(true));
    assert_eq!(doc["deleted_again"], json!(false));
    assert!(doc.get("gone").is_none());
    // Five keys exist when `keys` is computed; `gone` was deleted.
    assert_eq!(doc["keys"], json!(5));
    assert_eq!(doc["bad_value"], json!(false));
    assert!(doc.get("fn").is_none());
}

#[tokio::test]
async fn test_documents_are_guild_scoped() {
    let harness = Harness::new();
    harness
        .documents
        .edit(OTHER_GUILD, "secret", json!("x"), true)
        .await
        .unwrap();

    let doc = run_member(&harness, "edit_db('seen', get_db('secret') == nil)").await;

    assert_eq!(doc["seen"], json!(true));
}

#[tokio::test]
async fn test_reaction_capabilities_bind_to_triggering_message() {
    let harness = Harness::new();
    let engine = Harness::engine(Duration::from_secs(5));
    let code = template::indent(
        "add_reaction(reaction.emoji)\n\
         remove_reaction('<:blob:7>', user.id)\n\
         clear_reactions()\n\
         local users = reaction_users('👍', 2)\n\
         edit_db('users', #users)\n\
         edit_db('first', users[1].name)",
        Shape::Reaction,
    );
    let context = reaction_context(&harness).await;

    let outcome = engine.run("react", &code, &harness.host, context).await;

    assert_eq!(outcome, Ok(RunOutcome::Completed));
    assert_eq!(
        harness.platform.calls(),
        vec![
            format!("add_reaction:{GENERAL}:{TRIGGER_MESSAGE}:👍"),
            format!("remove_reaction:{GENERAL}:{TRIGGER_MESSAGE}:<:blob:7>:{BOB}"),
            format!("clear_reactions:{GENERAL}:{TRIGGER_MESSAGE}"),
        ]
    );
    assert_eq!(
        harness.documents.get(GUILD, "users").await.unwrap(),
        Some(json!(2))
    );
    assert_eq!(
        harness.documents.get(GUILD, "first").await.unwrap(),
        Some(json!("alice"))
    );
}

#[tokio::test]
async fn test_reaction_capabilities_absent_for_member_triggers() {
    let harness = Harness::new();
    let doc = run_member(
        &harness,
        "edit_db('present', add_reaction ~= nil or clear_reactions ~= nil)",
    )
    .await;
    assert_eq!(doc["present"], json!(false));
}

#[tokio::test]
async fn test_constants_and_helpers() {
    let harness = Harness::new();
    let doc = run_member(
        &harness,
        "edit_db('guild', guild.name)\n\
         edit_db('members', #guild.members)\n\
         edit_db('kick', Permissions.KICK_MEMBERS)\n\
         edit_db('int', int('12') + int('nope'))\n\
         edit_db('str', str(nil) .. str(5))\n\
         edit_db('member_name', member.name)",
    )
    .await;

    assert_eq!(doc["guild"], json!("Test Guild"));
    assert_eq!(doc["members"], json!(4));
    assert_eq!(doc["kick"], json!(Permissions::KICK_MEMBERS.bits));
    assert_eq!(doc["int"], json!(12));
    assert_eq!(doc["str"], json!("5"));
    assert_eq!(doc["member_name"], json!("alice"));
}
