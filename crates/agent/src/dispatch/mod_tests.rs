// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;

use crate::collaborators::fakes::{FakeContentScriptChannel, FakeKeyValueStore, FakeScriptInjector, FakeTabsApi};
use crate::collaborators::FrameHandle;
use crate::command::CommandStatus;
use serde_json::json;

fn command(kind: &str, params: Value) -> PendingCommand {
    PendingCommand { id: "c1".to_string(), kind: kind.to_string(), params, correlation_id: None }
}

#[test]
fn classify_routes_known_and_rejects_unknown_types() {
    assert_eq!(classify("dom").unwrap(), CommandKind::Dom);
    assert_eq!(classify("state_save").unwrap(), CommandKind::State);
    assert_eq!(classify("browser_action").unwrap(), CommandKind::BrowserAction);
    assert!(classify("draw_mode").is_err());
}

/// spec.md §8 scenario 3.
#[tokio::test]
async fn dispatch_dom_resolves_pierce_shadow_auto_against_the_tracked_tab() {
    let pilot = PilotAuthority::new();
    pilot.hydrate(Some(true));
    let tracking = TrackingAuthority::new();
    tracking.track(42, "https://app.example.com/a".to_string(), "A".to_string());

    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(42, ("https://app.example.com/a".to_string(), "A".to_string()));
    let content = FakeContentScriptChannel::default();
    content.loaded.lock().expect("lock").insert(42);
    content.frames.lock().expect("lock").insert(42, vec![FrameHandle { frame_id: 0, is_main: true, url: "https://app.example.com/a".to_string() }]);

    let injector = FakeScriptInjector::default();
    let ctx = DispatchContext {
        pilot: Arc::new(pilot),
        tracking: Arc::new(tracking),
        tabs: Arc::new(tabs),
        content: Arc::new(content),
        injector: Arc::new(injector),
        kv: Arc::new(FakeKeyValueStore::default()),
        list_interactive_cap: 100,
    };
    let cmd = command("dom", json!({"selector": ".x", "pierce_shadow": "auto"}));
    let result = dispatch_dom(&cmd, &ctx).await.unwrap();
    assert_eq!(result.result.unwrap()["pierce_shadow"], json!(true));
}

#[tokio::test]
async fn dispatch_dom_auto_resolves_false_when_tracked_origin_differs() {
    let pilot = PilotAuthority::new();
    pilot.hydrate(Some(true));
    let tracking = TrackingAuthority::new();
    tracking.track(42, "https://other.example.org/".to_string(), "Other".to_string());

    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(42, ("https://app.example.com/a".to_string(), "A".to_string()));
    let content = FakeContentScriptChannel::default();
    content.loaded.lock().expect("lock").insert(42);
    content.frames.lock().expect("lock").insert(42, vec![FrameHandle { frame_id: 0, is_main: true, url: "https://app.example.com/a".to_string() }]);

    let injector = FakeScriptInjector::default();
    let ctx = DispatchContext {
        pilot: Arc::new(pilot),
        tracking: Arc::new(tracking),
        tabs: Arc::new(tabs),
        content: Arc::new(content),
        injector: Arc::new(injector),
        kv: Arc::new(FakeKeyValueStore::default()),
        list_interactive_cap: 100,
    };
    let cmd = command("dom", json!({"tab_id": 42, "selector": ".x", "pierce_shadow": "auto"}));
    let result = dispatch_dom(&cmd, &ctx).await.unwrap();
    assert_eq!(result.result.unwrap()["pierce_shadow"], json!(false));
}

#[tokio::test]
async fn dispatch_dom_rejects_invalid_pierce_shadow_strings_without_dispatching() {
    let pilot = PilotAuthority::new();
    pilot.hydrate(Some(true));
    let tracking = TrackingAuthority::new();
    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(42, ("https://a".to_string(), "A".to_string()));
    *tabs.active.lock().expect("lock") = Some(42);
    let content = FakeContentScriptChannel::default();

    let injector = FakeScriptInjector::default();
    let ctx = DispatchContext {
        pilot: Arc::new(pilot),
        tracking: Arc::new(tracking),
        tabs: Arc::new(tabs),
        content: Arc::new(content),
        injector: Arc::new(injector),
        kv: Arc::new(FakeKeyValueStore::default()),
        list_interactive_cap: 100,
    };
    let cmd = command("dom", json!({"selector": ".x", "pierce_shadow": "sometimes"}));
    let err = dispatch_dom(&cmd, &ctx).await.unwrap_err();
    assert_eq!(err.kind, ErrorCode::InvalidParams);
    assert!(err.message.contains("pierce_shadow"));
}

#[tokio::test]
async fn dispatch_browser_action_requires_pilot() {
    let pilot = PilotAuthority::new();
    pilot.hydrate(Some(false));
    let tracking = TrackingAuthority::new();
    let tabs = FakeTabsApi::default();
    let content = FakeContentScriptChannel::default();

    let injector = FakeScriptInjector::default();
    let ctx = DispatchContext {
        pilot: Arc::new(pilot),
        tracking: Arc::new(tracking),
        tabs: Arc::new(tabs),
        content: Arc::new(content),
        injector: Arc::new(injector),
        kv: Arc::new(FakeKeyValueStore::default()),
        list_interactive_cap: 100,
    };
    let cmd = command("browser_action", json!({"action": "refresh"}));
    let err = dispatch_browser_action(&cmd, &ctx).await.unwrap_err();
    assert_eq!(err.kind, ErrorCode::AiWebPilotDisabled);
}

#[tokio::test]
async fn dispatch_browser_action_succeeds_when_pilot_enabled() {
    let pilot = PilotAuthority::new();
    pilot.hydrate(Some(true));
    let tracking = TrackingAuthority::new();
    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(7, ("https://a".to_string(), "A".to_string()));
    *tabs.active.lock().expect("lock") = Some(7);
    let content = FakeContentScriptChannel::default();

    let injector = FakeScriptInjector::default();
    let ctx = DispatchContext {
        pilot: Arc::new(pilot),
        tracking: Arc::new(tracking),
        tabs: Arc::new(tabs),
        content: Arc::new(content),
        injector: Arc::new(injector),
        kv: Arc::new(FakeKeyValueStore::default()),
        list_interactive_cap: 100,
    };
    let cmd = command("browser_action", json!({"action": "refresh"}));
    let result = dispatch_browser_action(&cmd, &ctx).await.unwrap();
    assert_eq!(result.effective_context.unwrap().effective_tab_id, Some(7));
}

#[tokio::test]
async fn dispatch_execute_requires_pilot() {
    let pilot = PilotAuthority::new();
    pilot.hydrate(Some(false));
    let tracking = TrackingAuthority::new();
    let tabs = FakeTabsApi::default();
    let content = FakeContentScriptChannel::default();
    let injector = FakeScriptInjector::default();
    let ctx = DispatchContext {
        pilot: Arc::new(pilot),
        tracking: Arc::new(tracking),
        tabs: Arc::new(tabs),
        content: Arc::new(content),
        injector: Arc::new(injector),
        kv: Arc::new(FakeKeyValueStore::default()),
        list_interactive_cap: 100,
    };

    let cmd = command("execute", json!({"script": "1+1"}));
    assert!(dispatch_execute(&cmd, &ctx).await.is_err());
}

#[tokio::test]
async fn dispatch_execute_runs_the_script_in_the_resolved_tab() {
    let pilot = PilotAuthority::new();
    pilot.hydrate(Some(true));
    let tracking = TrackingAuthority::new();
    let tabs = FakeTabsApi::default();
    tabs.tabs.lock().expect("lock").insert(7, ("https://a".to_string(), "A".to_string()));
    *tabs.active.lock().expect("lock") = Some(7);
    let content = FakeContentScriptChannel::default();
    let injector = FakeScriptInjector::default();
    *injector.result.lock().expect("lock") = json!(2);

    let ctx = DispatchContext {
        pilot: Arc::new(pilot),
        tracking: Arc::new(tracking),
        tabs: Arc::new(tabs),
        content: Arc::new(content),
        injector: Arc::new(injector),
        kv: Arc::new(FakeKeyValueStore::default()),
        list_interactive_cap: 100,
    };
    let cmd = command("execute", json!({"script": "1+1"}));
    let result = dispatch_execute(&cmd, &ctx).await.unwrap();
    let payload = result.result.unwrap();
    assert_eq!(payload["success"], json!(true));
    assert_eq!(payload["result"], json!(2));
}

#[tokio::test]
async fn dispatch_state_round_trips_a_named_snapshot() {
    let pilot = PilotAuthority::new();
    let tracking = TrackingAuthority::new();
    let tabs = FakeTabsApi::default();
    let content = FakeContentScriptChannel::default();
    let injector = FakeScriptInjector::default();
    let ctx = DispatchContext {
        pilot: Arc::new(pilot),
        tracking: Arc::new(tracking),
        tabs: Arc::new(tabs),
        content: Arc::new(content),
        injector: Arc::new(injector),
        kv: Arc::new(FakeKeyValueStore::default()),
        list_interactive_cap: 100,
    };

    let save = command("state_save", json!({"name": "scroll-pos", "blob": {"y": 400}, "timestamp_ms": 5}));
    dispatch_state(&save, &ctx).await.unwrap();

    let load = command("state_load", json!({"name": "scroll-pos"}));
    let result = dispatch_state(&load, &ctx).await.unwrap();
    assert_eq!(result.result.unwrap()["blob"], json!({"y": 400}));

    let missing = command("state_load", json!({"name": "nope"}));
    let err = dispatch_state(&missing, &ctx).await.unwrap_err();
    assert_eq!(err.kind, ErrorCode::NoResult);
}

#[tokio::test]
async fn dispatch_routes_by_type_and_converts_errors_to_terminal_results() {
    let pilot = PilotAuthority::new();
    let tracking = TrackingAuthority::new();
    let tabs = FakeTabsApi::default();
    let content = FakeContentScriptChannel::default();
    let injector = FakeScriptInjector::default();
    let ctx = DispatchContext {
        pilot: Arc::new(pilot),
        tracking: Arc::new(tracking),
        tabs: Arc::new(tabs),
        content: Arc::new(content),
        injector: Arc::new(injector),
        kv: Arc::new(FakeKeyValueStore::default()),
        list_interactive_cap: 100,
    };

    let cmd = command("execute", json!({"script": "1+1"}));
    let result = dispatch(cmd, ctx.clone()).await;
    assert_eq!(result.status, CommandStatus::Error);
    assert_eq!(result.error, Some(ErrorCode::AiWebPilotDisabled));

    let unknown = command("draw_mode", json!({}));
    let result = dispatch(unknown, ctx).await;
    assert_eq!(result.status, CommandStatus::Error);
    assert_eq!(result.error, Some(ErrorCode::UnknownAction));
}
