// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::sourcemap::mappings::parse_mappings;
use crate::sourcemap::SourceMap;

fn app_map() -> SourceMap {
    SourceMap {
        sources: vec!["src/app.ts".to_string()],
        names: vec!["render".to_string()],
        source_root: None,
        mappings: parse_mappings("AAAAA").expect("fixture mappings should parse"),
        sources_content: None,
    }
}

#[test]
fn parses_named_frame() {
    let frame = parse_frame("    at render (https://app.example/app.js:1:5)").expect("should parse");
    assert_eq!(frame.function_name.as_deref(), Some("render"));
    assert_eq!(frame.file_name, "https://app.example/app.js");
    assert_eq!(frame.line, 1);
    assert_eq!(frame.column, 5);
}

#[test]
fn parses_anonymous_frame() {
    let frame = parse_frame("    at https://app.example/app.js:1:5").expect("should parse");
    assert_eq!(frame.function_name, None);
    assert_eq!(frame.file_name, "https://app.example/app.js");
    assert_eq!(frame.line, 1);
    assert_eq!(frame.column, 5);
}

#[test]
fn unparseable_lines_return_none() {
    assert_eq!(parse_frame("Error: boom"), None);
    assert_eq!(parse_frame(""), None);
}

#[test]
fn resolve_stack_trace_passes_through_unparseable_lines_verbatim() {
    let stack = "Error: boom\n    at render (https://app.example/app.js:1:5)";
    let resolved = resolve_stack_trace(stack, |_| None);
    let lines: Vec<&str> = resolved.lines().collect();
    assert_eq!(lines[0], "Error: boom");
}

#[test]
fn resolve_stack_trace_skips_non_http_files() {
    let stack = "    at render (/internal/app.js:1:5)";
    let resolved = resolve_stack_trace(stack, |_| Some(app_map()));
    assert_eq!(resolved, stack);
}

#[test]
fn resolve_stack_trace_passes_through_when_no_map_is_available() {
    let stack = "    at render (https://app.example/app.js:1:5)";
    let resolved = resolve_stack_trace(stack, |_| None);
    assert_eq!(resolved, stack);
}

#[test]
fn resolve_stack_trace_renders_original_location_alongside_generated() {
    let stack = "    at render (https://app.example/app.js:1:0)";
    let resolved = resolve_stack_trace(stack, |url| {
        assert_eq!(url, "https://app.example/app.js");
        Some(app_map())
    });
    assert!(resolved.contains("https://app.example/app.js:1:0"));
    assert!(resolved.contains("<- src/app.ts:1:0"));
}

#[test]
fn resolve_stack_trace_handles_anonymous_frames() {
    let stack = "    at https://app.example/app.js:1:0";
    let resolved = resolve_stack_trace(stack, |_| Some(app_map()));
    assert!(resolved.contains("<anonymous>"));
    assert!(resolved.contains("<- src/app.ts:1:0"));
}
