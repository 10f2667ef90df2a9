// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-frame DOM action engine: frame targeting, world-mode fallback,
//! wait-for polling, result reconciliation (spec.md §4.I).

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;

use crate::collaborators::{ContentScriptChannel, ExecutionWorld, FrameHandle, ScriptInjector};
use crate::error::{AppError, ErrorCode};

pub const DEFAULT_LIST_INTERACTIVE_CAP: usize = 100;

/// `frame` param: `undefined|"all"|<number>|<css-selector-string>`
/// (spec.md §4.I).
#[derive(Debug, Clone, PartialEq)]
pub enum FrameTarget {
    All,
    Id(u64),
    Selector(String),
}

pub fn parse_frame_target(value: &Value) -> Result<FrameTarget, AppError> {
    match value {
        Value::Null => Ok(FrameTarget::All),
        Value::String(s) if s == "all" => Ok(FrameTarget::All),
        Value::String(s) => Ok(FrameTarget::Selector(s.clone())),
        Value::Number(n) if n.as_u64().is_some() => Ok(FrameTarget::Id(n.as_u64().expect("checked above"))),
        _ => Err(AppError::new(ErrorCode::InvalidFrame, "invalid_frame")),
    }
}

/// Resolve the frame target to the concrete set of frames to inject into.
/// A selector target that matches nothing is `frame_not_found`.
pub async fn resolve_frames(
    tab_id: u64,
    target: &FrameTarget,
    content: &dyn ContentScriptChannel,
) -> Result<Vec<FrameHandle>, AppError> {
    match target {
        FrameTarget::All => Ok(content.probe_frames(tab_id, None).await),
        FrameTarget::Id(frame_id) => Ok(vec![FrameHandle { frame_id: *frame_id, is_main: *frame_id == 0, url: String::new() }]),
        FrameTarget::Selector(selector) => {
            let frames = content.probe_frames(tab_id, Some(selector)).await;
            if frames.is_empty() {
                Err(AppError::new(ErrorCode::FrameNotFound, "frame_not_found"))
            } else {
                Ok(frames)
            }
        }
    }
}

/// One frame's raw result from the injected-script contract (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct FrameResult {
    pub frame_id: u64,
    pub is_main: bool,
    pub success: bool,
    pub value: Option<Value>,
    pub matched: Option<Value>,
    pub error: Option<String>,
    pub scope_rect_used: Option<Value>,
}

/// Lift one frame's raw `DOMResult` response (spec.md §6) into a
/// `FrameResult` the reconciliation helpers below operate on.
pub fn parse_frame_result(frame: &FrameHandle, response: Value) -> FrameResult {
    FrameResult {
        frame_id: frame.frame_id,
        is_main: frame.is_main,
        success: response.get("success").and_then(Value::as_bool).unwrap_or(false),
        value: response.get("value").cloned(),
        matched: response.get("matched").cloned(),
        error: response.get("error").and_then(Value::as_str).map(str::to_string),
        scope_rect_used: response.get("scope_rect_used").cloned(),
    }
}

/// Whether `action` mutates the page (spec.md §4.I): `list_interactive`
/// and any `get_*` are read-only; everything else must carry match
/// evidence to count as a success.
pub fn is_mutating_action(action: &str) -> bool {
    action != "list_interactive" && !action.starts_with("get_")
}

/// Priority order: main-success -> any-success -> main-failure -> first-any
/// (spec.md §4.I, §9 "Multi-frame result reconciliation").
pub fn reconcile(results: &[FrameResult]) -> Option<&FrameResult> {
    if let Some(r) = results.iter().find(|r| r.is_main && r.success) {
        return Some(r);
    }
    if let Some(r) = results.iter().find(|r| r.success) {
        return Some(r);
    }
    if let Some(r) = results.iter().find(|r| r.is_main) {
        return Some(r);
    }
    results.first()
}

/// Merge `list_interactive` element arrays across frames, capped at `cap`,
/// preserving the first non-empty `scope_rect_used` (spec.md §4.I).
pub fn merge_list_interactive(results: &[FrameResult], cap: usize) -> (Vec<Value>, Option<Value>) {
    let mut merged = Vec::new();
    let mut scope_rect_used = None;
    for result in results {
        if scope_rect_used.is_none() {
            if let Some(rect) = &result.scope_rect_used {
                if !rect.is_null() {
                    scope_rect_used = Some(rect.clone());
                }
            }
        }
        if let Some(Value::Array(items)) = &result.value {
            for item in items {
                if merged.len() >= cap {
                    break;
                }
                merged.push(item.clone());
            }
        }
    }
    (merged, scope_rect_used)
}

/// For mutating actions, a success payload MUST carry a `matched` object
/// with at least one identifying field; absence downgrades to
/// `missing_match_evidence`. A payload marked success but carrying a
/// non-empty `error` downgrades to `status_mismatch` (spec.md §4.I).
pub fn enforce_mutation_evidence(mut result: FrameResult) -> FrameResult {
    if !result.success {
        return result;
    }
    if result.error.as_deref().is_some_and(|e| !e.is_empty()) {
        result.success = false;
        result.error = Some(ErrorCode::StatusMismatch.as_str().to_string());
        return result;
    }
    let has_evidence = result.matched.as_ref().is_some_and(|m| {
        m.as_object().is_some_and(|obj| {
            ["selector", "tag", "element_id", "aria_label", "role", "text_preview"]
                .iter()
                .any(|key| obj.get(*key).is_some_and(|v| !v.is_null()))
        })
    });
    if !has_evidence {
        result.success = false;
        result.error = Some(ErrorCode::MissingMatchEvidence.as_str().to_string());
    }
    result
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteJsResult {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub execution_world: ExecutionWorld,
    pub fallback_attempted: bool,
}

fn looks_like_csp_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("content security policy") || lower.contains("csp") || lower.contains("unsafe-eval") || lower.contains("trusted type")
}

/// `execute_js` in `auto|main|isolated` (spec.md §4.I). `auto` tries the
/// main realm first; a CSP/Trusted-Type/unsafe-eval failure triggers a
/// fallback into the isolated realm; if that also refuses, returns
/// `csp_blocked_all_worlds`.
pub async fn execute_js(
    tab_id: u64,
    frame_id: u64,
    script: &str,
    world: Option<ExecutionWorld>,
    injector: &dyn ScriptInjector,
) -> Result<ExecuteJsResult, AppError> {
    match world {
        Some(forced) => match injector.execute(tab_id, frame_id, forced, script).await {
            Ok(value) => Ok(ExecuteJsResult { success: true, result: Some(value), error: None, execution_world: forced, fallback_attempted: false }),
            Err(err) => Err(err),
        },
        None => {
            let main_attempt = injector.execute(tab_id, frame_id, ExecutionWorld::Main, script).await;
            match main_attempt {
                Ok(value) => Ok(ExecuteJsResult {
                    success: true,
                    result: Some(value),
                    error: None,
                    execution_world: ExecutionWorld::Main,
                    fallback_attempted: false,
                }),
                Err(err) if looks_like_csp_error(&err.message) => match injector.execute(tab_id, frame_id, ExecutionWorld::Isolated, script).await {
                    Ok(value) => Ok(ExecuteJsResult {
                        success: true,
                        result: Some(value),
                        error: None,
                        execution_world: ExecutionWorld::Isolated,
                        fallback_attempted: true,
                    }),
                    Err(isolated_err) if looks_like_csp_error(&isolated_err.message) => {
                        Err(AppError::new(ErrorCode::CspBlockedAllWorlds, "csp_blocked_all_worlds"))
                    }
                    Err(isolated_err) => Err(isolated_err),
                },
                Err(err) => Err(err),
            }
        }
    }
}

/// A single quick injection evaluates the predicate; on false, poll every
/// `poll_interval`, bounded by `timeout` (spec.md §4.I).
pub async fn wait_for<F, Fut>(poll_interval: Duration, timeout: Duration, mut check: F) -> Result<Value, AppError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Value, AppError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let result = check().await?;
        if result.as_object().and_then(|o| o.get("success")).and_then(Value::as_bool).unwrap_or(false) {
            return Ok(result);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AppError::new(ErrorCode::Timeout, "wait_for timed out"));
        }
        sleep(poll_interval.min(deadline.saturating_duration_since(tokio::time::Instant::now()))).await;
    }
}

#[cfg(test)]
#[path = "dom_tests.rs"]
mod tests;
