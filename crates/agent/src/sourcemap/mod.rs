// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source-map fetching, decoding, and stack-frame remapping (spec.md §4.E).

pub mod mappings;
pub mod stack;
pub mod vlq;

use std::time::Duration;

use base64::Engine;
use tracing::debug;

use mappings::{parse_mappings, Segment};

#[derive(Debug, Clone, PartialEq)]
pub struct SourceMap {
    pub sources: Vec<String>,
    pub names: Vec<String>,
    pub source_root: Option<String>,
    pub mappings: Vec<Vec<Segment>>,
    pub sources_content: Option<Vec<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub source: String,
    /// 1-based, per spec.md §4.E.
    pub line: i64,
    pub column: i64,
    pub name: Option<String>,
}

impl SourceMap {
    /// `findOriginalLocation(map, line, col)` (spec.md §4.E): walk the
    /// decoded segments for the given 0-based generated line, returning the
    /// best segment whose `genCol ≤ col`.
    pub fn find_original_location(&self, generated_line: usize, generated_column: i64) -> Option<ResolvedLocation> {
        let segments = self.mappings.get(generated_line)?;
        let best = segments
            .iter()
            .filter(|s| s.generated_column <= generated_column)
            .max_by_key(|s| s.generated_column)?;

        let source_index = best.source_index?;
        let source = self.sources.get(source_index as usize)?.clone();
        let original_line = best.original_line?;
        let original_column = best.original_column?;
        let name = best
            .name_index
            .and_then(|idx| self.names.get(idx as usize))
            .cloned();

        Some(ResolvedLocation { source, line: original_line + 1, column: original_column, name })
    }
}

/// Raw JSON shape of a source map, deserialized before decoding mappings.
#[derive(Debug, serde::Deserialize)]
struct RawSourceMap {
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    names: Vec<String>,
    #[serde(rename = "sourceRoot", default)]
    source_root: Option<String>,
    #[serde(default)]
    mappings: String,
    #[serde(rename = "sourcesContent", default)]
    sources_content: Option<Vec<Option<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMapError {
    Fetch,
    Timeout,
    InvalidJson,
    InvalidMappings,
    NoSourceMappingUrl,
}

/// `fetchSourceMap(scriptUrl)` (spec.md §4.E): fetch the script, scan for a
/// `//# sourceMappingURL=` comment, parse inline or external, bounded by a
/// fetch timeout. Any failure is the caller's cue to negative-cache.
pub async fn fetch_source_map(
    client: &reqwest::Client,
    script_url: &str,
    timeout: Duration,
) -> Result<SourceMap, SourceMapError> {
    let script = tokio::time::timeout(timeout, client.get(script_url).send())
        .await
        .map_err(|_| SourceMapError::Timeout)?
        .map_err(|_| SourceMapError::Fetch)?
        .text()
        .await
        .map_err(|_| SourceMapError::Fetch)?;

    let directive = script
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("//# sourceMappingURL="))
        .ok_or(SourceMapError::NoSourceMappingUrl)?;

    let raw_json = if let Some(encoded) = directive.strip_prefix("data:application/json;base64,") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| SourceMapError::InvalidJson)?;
        String::from_utf8(bytes).map_err(|_| SourceMapError::InvalidJson)?
    } else {
        let resolved = reqwest::Url::parse(script_url)
            .and_then(|base| base.join(directive))
            .map_err(|_| SourceMapError::Fetch)?;
        debug!(url = %resolved, "fetching external source map");
        tokio::time::timeout(timeout, client.get(resolved).send())
            .await
            .map_err(|_| SourceMapError::Timeout)?
            .map_err(|_| SourceMapError::Fetch)?
            .text()
            .await
            .map_err(|_| SourceMapError::Fetch)?
    };

    parse_source_map(&raw_json)
}

pub fn parse_source_map(raw_json: &str) -> Result<SourceMap, SourceMapError> {
    let raw: RawSourceMap = serde_json::from_str(raw_json).map_err(|_| SourceMapError::InvalidJson)?;
    let mappings = parse_mappings(&raw.mappings).map_err(|_| SourceMapError::InvalidMappings)?;
    Ok(SourceMap {
        sources: raw.sources,
        names: raw.names,
        source_root: raw.source_root,
        mappings,
        sources_content: raw.sources_content,
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
