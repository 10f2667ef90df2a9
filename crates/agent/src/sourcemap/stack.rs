// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stack-trace frame parsing and source-map remapping (spec.md §4.E).

use regex::Regex;
use std::sync::OnceLock;

use super::SourceMap;

#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub function_name: Option<String>,
    pub file_name: String,
    pub line: u32,
    pub column: u32,
}

fn named_frame_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*at\s+(?P<fn>.+?)\s+\((?P<file>[^():]+):(?P<line>\d+):(?P<col>\d+)\)\s*$").ok())
        .as_ref()
}

fn anonymous_frame_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*at\s+(?P<file>[^():]+):(?P<line>\d+):(?P<col>\d+)\s*$").ok())
        .as_ref()
}

/// Parse a single `at fn (file:line:col)` or anonymous `at file:line:col`
/// stack frame line. Unparseable lines return `None` and pass through
/// unchanged in the rendered output.
pub fn parse_frame(line: &str) -> Option<StackFrame> {
    if let Some(caps) = named_frame_re().and_then(|re| re.captures(line)) {
        return Some(StackFrame {
            function_name: Some(caps["fn"].to_string()),
            file_name: caps["file"].to_string(),
            line: caps["line"].parse().ok()?,
            column: caps["col"].parse().ok()?,
        });
    }
    if let Some(caps) = anonymous_frame_re().and_then(|re| re.captures(line)) {
        return Some(StackFrame {
            function_name: None,
            file_name: caps["file"].to_string(),
            line: caps["line"].parse().ok()?,
            column: caps["col"].parse().ok()?,
        });
    }
    None
}

fn is_http_url(file_name: &str) -> bool {
    file_name.starts_with("http://") || file_name.starts_with("https://")
}

/// `resolveStackTrace(stack)` (spec.md §4.E): resolve every frame whose
/// `fileName` is http(s) against a supplied source-map lookup, rendering a
/// line carrying both the resolved and original locations. Frames that
/// fail to parse, or whose file isn't http(s), or with no cached map, pass
/// through verbatim.
pub fn resolve_stack_trace<F>(stack: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<SourceMap>,
{
    stack
        .lines()
        .map(|line| {
            let Some(frame) = parse_frame(line) else {
                return line.to_string();
            };
            if !is_http_url(&frame.file_name) {
                return line.to_string();
            }
            let Some(map) = lookup(&frame.file_name) else {
                return line.to_string();
            };
            let generated_line = frame.line.saturating_sub(1) as usize;
            let Some(resolved) = map.find_original_location(generated_line, frame.column as i64) else {
                return line.to_string();
            };

            let name_part = frame.function_name.as_deref().unwrap_or("<anonymous>");
            format!(
                "    at {name_part} ({}:{}:{}) <- {}:{}:{}",
                frame.file_name, frame.line, frame.column, resolved.source, resolved.line, resolved.column
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "stack_tests.rs"]
mod tests;
