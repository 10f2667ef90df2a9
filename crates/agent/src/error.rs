// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error kinds shared across every command executor and transport
/// boundary in the coordination engine (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParams,
    MissingAction,
    MissingSelector,
    InvalidFrame,
    FrameNotFound,
    RestrictedUrl,
    AiWebPilotDisabled,
    ContentScriptNotLoaded,
    CspBlocked,
    CspBlockedAllWorlds,
    ExecutionTimeout,
    StatusMismatch,
    MissingMatchEvidence,
    NoResult,
    Timeout,
    DomQueryFailed,
    DomActionFailed,
    BrowserActionFailed,
    ScriptingApiError,
    UnknownAction,
    DrawModeFailed,
    VersionMismatch,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::MissingAction => "missing_action",
            Self::MissingSelector => "missing_selector",
            Self::InvalidFrame => "invalid_frame",
            Self::FrameNotFound => "frame_not_found",
            Self::RestrictedUrl => "restricted_url",
            Self::AiWebPilotDisabled => "ai_web_pilot_disabled",
            Self::ContentScriptNotLoaded => "content_script_not_loaded",
            Self::CspBlocked => "csp_blocked",
            Self::CspBlockedAllWorlds => "csp_blocked_all_worlds",
            Self::ExecutionTimeout => "execution_timeout",
            Self::StatusMismatch => "status_mismatch",
            Self::MissingMatchEvidence => "missing_match_evidence",
            Self::NoResult => "no_result",
            Self::Timeout => "timeout",
            Self::DomQueryFailed => "dom_query_failed",
            Self::DomActionFailed => "dom_action_failed",
            Self::BrowserActionFailed => "browser_action_failed",
            Self::ScriptingApiError => "scripting_api_error",
            Self::UnknownAction => "unknown_action",
            Self::DrawModeFailed => "draw_mode_failed",
            Self::VersionMismatch => "version_mismatch",
            Self::Internal => "internal",
        }
    }

    /// Whether this kind is informational (never surfaced as a command
    /// failure; spec.md §7 calls `version_mismatch` out explicitly).
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::VersionMismatch)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal command failure: machine-readable `kind` plus a human-readable
/// `message`, mirroring the `{error, message}` shape every command result
/// carries (spec.md §4.H, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppError {
    pub kind: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorCode, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
