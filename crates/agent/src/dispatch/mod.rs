// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatcher: target-tab resolution and type-based routing
//! (spec.md §4.H).

pub mod browser_action;
pub mod dom;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::auth::{self, PilotAuthority, TrackingAuthority};
use crate::collaborators::{ContentScriptChannel, ExecutionWorld, KeyValueStore, ScriptInjector, TabsApi};
use crate::command::{CommandResult, EffectiveContext, PendingCommand};
use crate::error::{AppError, ErrorCode};
use crate::snapshot::StateSnapshotStore;

/// Command kinds routed by `type` (spec.md §4.H). `DrawMode` and `Upload`
/// are staged elsewhere in the broader system and are not elaborated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Dom,
    A11y,
    PageInfo,
    Tabs,
    Waterfall,
    Highlight,
    BrowserAction,
    Execute,
    State,
}

pub fn classify(kind: &str) -> Result<CommandKind, AppError> {
    match kind {
        "dom" => Ok(CommandKind::Dom),
        "a11y" => Ok(CommandKind::A11y),
        "page_info" => Ok(CommandKind::PageInfo),
        "tabs" => Ok(CommandKind::Tabs),
        "waterfall" => Ok(CommandKind::Waterfall),
        "highlight" => Ok(CommandKind::Highlight),
        "browser_action" => Ok(CommandKind::BrowserAction),
        "execute" => Ok(CommandKind::Execute),
        k if k.starts_with("state_") => Ok(CommandKind::State),
        other => Err(AppError::new(ErrorCode::UnknownAction, format!("unknown command type: {other}"))),
    }
}

/// Cloneable bundle of the authorization state and collaborator handles a
/// single command dispatch needs. `Arc`-backed (mirroring the teacher's
/// shared-state idiom) so a dispatch can be moved into its own spawned task
/// instead of holding up the sync loop (spec.md §5 "cooperative scheduling,
/// parallel dispatch" — the sync client never awaits a command).
#[derive(Clone)]
pub struct DispatchContext {
    pub pilot: Arc<PilotAuthority>,
    pub tracking: Arc<TrackingAuthority>,
    pub tabs: Arc<dyn TabsApi>,
    pub content: Arc<dyn ContentScriptChannel>,
    pub injector: Arc<dyn ScriptInjector>,
    pub kv: Arc<dyn KeyValueStore>,
    /// Cap on merged `list_interactive` elements across frames (spec.md
    /// §4.I), configurable rather than a hardcoded 100.
    pub list_interactive_cap: usize,
}

/// Single entry point for a command taken off a sync response: classify,
/// route, and fold any error into a terminal `CommandResult` instead of
/// letting it propagate, so a spawned dispatch task always has something to
/// queue back (spec.md §4.H, §4.G `queueCommandResult`).
pub async fn dispatch(command: PendingCommand, ctx: DispatchContext) -> CommandResult {
    let outcome = match classify(&command.kind) {
        Ok(CommandKind::Dom) => dispatch_dom(&command, &ctx).await,
        Ok(CommandKind::BrowserAction) => dispatch_browser_action(&command, &ctx).await,
        Ok(CommandKind::Execute) => dispatch_execute(&command, &ctx).await,
        Ok(CommandKind::State) => dispatch_state(&command, &ctx).await,
        Ok(other) => Err(AppError::new(ErrorCode::UnknownAction, format!("{other:?} is not handled by this build"))),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(result) => result,
        Err(err) if err.kind.is_informational() => {
            CommandResult::complete(command.id, command.correlation_id, json!({"info": err.kind}))
        }
        Err(err) => CommandResult::error(command.id, command.correlation_id, err.kind, err.message),
    }
}

/// Resolve `(1) explicit tab_id -> (2) tracked -> (3) active)`, fan the
/// `DOM_QUERY` content-script message out to every frame the `frame` param
/// targets, and reconcile the per-frame results (spec.md §4.H, §4.I, §8
/// scenario 3).
pub async fn dispatch_dom(command: &PendingCommand, ctx: &DispatchContext) -> Result<CommandResult, AppError> {
    let explicit_tab_id = command.params.get("tab_id").and_then(Value::as_u64);
    let Some(tab_id) = auth::resolve_target_tab(explicit_tab_id, &ctx.tracking, &ctx.tabs).await else {
        return Err(AppError::new(ErrorCode::InvalidParams, "no target tab available"));
    };

    let pierce_shadow_param = command.params.get("pierce_shadow").cloned().unwrap_or(Value::Null);
    let mode = auth::parse_pierce_shadow(&pierce_shadow_param)?;

    let target_url = ctx.tabs.tab_url(tab_id).await.unwrap_or_default();
    let tracked = ctx.tracking.current();
    let pierce_shadow = auth::resolve_pierce_shadow(mode, ctx.pilot.is_enabled(), tracked.as_ref(), tab_id, &target_url);

    let frame_param = command.params.get("frame").cloned().unwrap_or(Value::Null);
    let frame_target = dom::parse_frame_target(&frame_param)?;
    let frames = dom::resolve_frames(tab_id, &frame_target, ctx.content.as_ref()).await?;

    let mut message = command.params.clone();
    if let Value::Object(map) = &mut message {
        map.insert("pierce_shadow".to_string(), json!(pierce_shadow));
        map.insert("message_type".to_string(), json!("DOM_QUERY"));
    }

    let action = command.params.get("action").and_then(Value::as_str).unwrap_or_default();

    let mut results = Vec::with_capacity(frames.len());
    let mut last_err = None;
    for frame in &frames {
        match ctx.content.dom_query(tab_id, frame.frame_id, message.clone()).await {
            Ok(response) => results.push(dom::parse_frame_result(frame, response)),
            Err(err) => last_err = Some(err),
        }
    }
    if results.is_empty() {
        return Err(last_err.unwrap_or_else(|| AppError::new(ErrorCode::DomQueryFailed, "dom query failed for every frame")));
    }

    let payload = if action == "list_interactive" {
        let (merged, scope_rect_used) = dom::merge_list_interactive(&results, ctx.list_interactive_cap);
        json!({ "success": true, "value": merged, "scope_rect_used": scope_rect_used, "pierce_shadow": pierce_shadow })
    } else {
        let results: Vec<dom::FrameResult> = if dom::is_mutating_action(action) {
            results.into_iter().map(dom::enforce_mutation_evidence).collect()
        } else {
            results
        };
        let chosen = dom::reconcile(&results).ok_or_else(|| AppError::new(ErrorCode::NoResult, "no frame produced a result"))?;
        let mut payload = serde_json::to_value(chosen).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut payload {
            map.insert("pierce_shadow".to_string(), json!(pierce_shadow));
        }
        payload
    };

    let effective_context = capture_effective_context(tab_id, &ctx.tabs).await;
    Ok(CommandResult::complete(command.id.clone(), command.correlation_id.clone(), payload).with_effective_context(effective_context))
}

/// `browser_action` dispatch: mutating actions require pilot enabled
/// (spec.md §4.H). `navigate`/`refresh` run the full navigation sub-flow
/// (restricted-url/file-url checks, content-script ping/reload-once,
/// spec.md §4.I.nav); the remaining actions are simple tab-API calls
/// delegated to the external collaborator (spec.md §1 scope).
pub async fn dispatch_browser_action(command: &PendingCommand, ctx: &DispatchContext) -> Result<CommandResult, AppError> {
    let action_str = command.params.get("action").and_then(Value::as_str).ok_or_else(|| {
        AppError::new(ErrorCode::MissingAction, "browser_action requires an action")
    })?;
    let action = browser_action::BrowserAction::parse(action_str)?;
    if action.requires_pilot() {
        ctx.pilot.require_pilot().await?;
    }

    let explicit_tab_id = command.params.get("tab_id").and_then(Value::as_u64);
    let Some(tab_id) = auth::resolve_target_tab(explicit_tab_id, &ctx.tracking, &ctx.tabs).await else {
        return Err(AppError::new(ErrorCode::InvalidParams, "no target tab available"));
    };

    let mut payload = json!({"action": action_str});
    match action {
        browser_action::BrowserAction::Navigate => {
            let target_url = command.params.get("url").and_then(Value::as_str).ok_or_else(|| {
                AppError::new(ErrorCode::InvalidParams, "navigate requires a url")
            })?;
            let nav = browser_action::navigate(tab_id, target_url, ctx.tabs.as_ref(), ctx.content.as_ref(), reload_via_injector(&ctx.injector)).await?;
            payload = navigation_payload(action_str, &nav);
        }
        browser_action::BrowserAction::Refresh => {
            let target_url = ctx.tabs.tab_url(tab_id).await.unwrap_or_default();
            let nav = browser_action::navigate(tab_id, &target_url, ctx.tabs.as_ref(), ctx.content.as_ref(), reload_via_injector(&ctx.injector)).await?;
            payload = navigation_payload(action_str, &nav);
        }
        _ => {}
    }

    let effective_context = capture_effective_context(tab_id, &ctx.tabs).await;
    Ok(CommandResult::complete(command.id.clone(), command.correlation_id.clone(), payload).with_effective_context(effective_context))
}

fn navigation_payload(action_str: &str, nav: &browser_action::NavigationResult) -> Value {
    let mut payload = serde_json::to_value(nav).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut payload {
        map.insert("action".to_string(), json!(action_str));
    }
    payload
}

/// A reload through the script injector's main world (`location.reload()`)
/// stands in for the native tab-reload primitive (spec.md §1 scope: the
/// browser-chrome reload call itself is out of scope).
fn reload_via_injector(injector: &Arc<dyn ScriptInjector>) -> impl FnOnce(u64) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let injector = Arc::clone(injector);
    move |tab_id: u64| {
        Box::pin(async move {
            let _ = injector.execute(tab_id, 0, ExecutionWorld::Main, "location.reload()").await;
        })
    }
}

/// `execute` dispatch: requires pilot enabled, runs `execute_js` against the
/// resolved target tab (spec.md §4.H, §4.I).
pub async fn dispatch_execute(command: &PendingCommand, ctx: &DispatchContext) -> Result<CommandResult, AppError> {
    ctx.pilot.require_pilot().await?;

    let script = command.params.get("script").and_then(Value::as_str).ok_or_else(|| {
        AppError::new(ErrorCode::InvalidParams, "execute requires a script")
    })?;
    let world = match command.params.get("world").and_then(Value::as_str) {
        None | Some("auto") => None,
        Some("main") => Some(ExecutionWorld::Main),
        Some("isolated") => Some(ExecutionWorld::Isolated),
        Some(other) => return Err(AppError::new(ErrorCode::InvalidParams, format!("unknown execution world: {other}"))),
    };

    let explicit_tab_id = command.params.get("tab_id").and_then(Value::as_u64);
    let Some(tab_id) = auth::resolve_target_tab(explicit_tab_id, &ctx.tracking, &ctx.tabs).await else {
        return Err(AppError::new(ErrorCode::InvalidParams, "no target tab available"));
    };
    let frame_id = command.params.get("frame_id").and_then(Value::as_u64).unwrap_or(0);

    let outcome = dom::execute_js(tab_id, frame_id, script, world, &ctx.injector).await?;
    let effective_context = capture_effective_context(tab_id, &ctx.tabs).await;
    let payload = serde_json::to_value(&outcome).unwrap_or(Value::Null);
    Ok(CommandResult::complete(command.id.clone(), command.correlation_id.clone(), payload).with_effective_context(effective_context))
}

/// `state_{save,load,list,delete}` dispatch (spec.md §4.K): the store is
/// constructed fresh per call since it caches nothing of its own.
pub async fn dispatch_state(command: &PendingCommand, ctx: &DispatchContext) -> Result<CommandResult, AppError> {
    let store = StateSnapshotStore::new(ctx.kv.as_ref());
    let name = command.params.get("name").and_then(Value::as_str);

    let payload = match command.kind.as_str() {
        "state_save" => {
            let name = name.ok_or_else(|| AppError::new(ErrorCode::InvalidParams, "state_save requires a name"))?;
            let blob = command.params.get("blob").cloned().unwrap_or(Value::Null);
            let explicit_tab_id = command.params.get("tab_id").and_then(Value::as_u64);
            let tab_id = auth::resolve_target_tab(explicit_tab_id, &ctx.tracking, &ctx.tabs).await;
            let url = match tab_id {
                Some(id) => ctx.tabs.tab_url(id).await.unwrap_or_default(),
                None => String::new(),
            };
            let timestamp_ms = command.params.get("timestamp_ms").and_then(Value::as_u64).unwrap_or(0);
            let snapshot = store.save(name, url, timestamp_ms, blob).await;
            serde_json::to_value(&snapshot).unwrap_or(Value::Null)
        }
        "state_load" => {
            let name = name.ok_or_else(|| AppError::new(ErrorCode::InvalidParams, "state_load requires a name"))?;
            match store.load(name).await {
                Some(snapshot) => serde_json::to_value(&snapshot).unwrap_or(Value::Null),
                None => return Err(AppError::new(ErrorCode::NoResult, "no snapshot with that name")),
            }
        }
        "state_list" => serde_json::to_value(store.list().await).unwrap_or(Value::Null),
        "state_delete" => {
            let name = name.ok_or_else(|| AppError::new(ErrorCode::InvalidParams, "state_delete requires a name"))?;
            json!({ "deleted": store.delete(name).await })
        }
        other => return Err(AppError::new(ErrorCode::UnknownAction, format!("unknown state action: {other}"))),
    };

    Ok(CommandResult::complete(command.id.clone(), command.correlation_id.clone(), payload))
}

async fn capture_effective_context(tab_id: u64, tabs: &dyn TabsApi) -> EffectiveContext {
    EffectiveContext {
        effective_tab_id: Some(tab_id),
        effective_url: tabs.tab_url(tab_id).await,
        effective_title: tabs.tab_title(tab_id).await,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
