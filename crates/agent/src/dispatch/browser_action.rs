// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Navigation and browser-chrome actions (spec.md §4.H `browser_action`,
//! §4.I.nav).

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::collaborators::{ContentScriptChannel, TabsApi};
use crate::error::{AppError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserAction {
    Navigate,
    Refresh,
    Back,
    Forward,
    NewTab,
    SwitchTab,
    CloseTab,
}

impl BrowserAction {
    pub fn parse(action: &str) -> Result<Self, AppError> {
        match action {
            "navigate" => Ok(Self::Navigate),
            "refresh" => Ok(Self::Refresh),
            "back" => Ok(Self::Back),
            "forward" => Ok(Self::Forward),
            "new_tab" => Ok(Self::NewTab),
            "switch_tab" => Ok(Self::SwitchTab),
            "close_tab" => Ok(Self::CloseTab),
            other => Err(AppError::new(ErrorCode::UnknownAction, format!("unknown browser_action: {other}"))),
        }
    }

    /// Every `browser_action` variant mutates browser chrome and so
    /// requires pilot (spec.md §4.H).
    pub fn requires_pilot(self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentScriptStatus {
    Ready,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigationResult {
    pub content_script_status: String,
}

fn is_restricted(url: &str) -> bool {
    url.starts_with("chrome://") || url.starts_with("chrome-extension://")
}

fn is_file_url(url: &str) -> bool {
    url.starts_with("file://")
}

/// After navigation, wait for load, then probe the content script; if it
/// doesn't respond, reload once and re-probe. `file://` targets are never
/// probed and report `unavailable` (spec.md §4.I.nav).
pub async fn navigate<F>(
    tab_id: u64,
    target_url: &str,
    tabs: &dyn TabsApi,
    content: &dyn ContentScriptChannel,
    reload: F,
) -> Result<NavigationResult, AppError>
where
    F: FnOnce(u64) -> Pin<Box<dyn Future<Output = ()> + Send>>,
{
    if is_restricted(target_url) {
        return Err(AppError::new(ErrorCode::RestrictedUrl, "restricted_url"));
    }
    if !tabs.tab_exists(tab_id).await {
        return Err(AppError::new(ErrorCode::BrowserActionFailed, "tab no longer exists"));
    }
    if is_file_url(target_url) {
        return Ok(NavigationResult { content_script_status: status_str(ContentScriptStatus::Unavailable) });
    }

    if content.ping(tab_id, 0).await {
        return Ok(NavigationResult { content_script_status: status_str(ContentScriptStatus::Ready) });
    }

    reload(tab_id).await;
    let status = if content.ping(tab_id, 0).await { ContentScriptStatus::Ready } else { ContentScriptStatus::Unavailable };
    Ok(NavigationResult { content_script_status: status_str(status) })
}

fn status_str(status: ContentScriptStatus) -> String {
    match status {
        ContentScriptStatus::Ready => "ready".to_string(),
        ContentScriptStatus::Unavailable => "unavailable".to_string(),
    }
}

#[cfg(test)]
#[path = "browser_action_tests.rs"]
mod tests;
