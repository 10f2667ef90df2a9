// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Decoding and encoding of the source-map `mappings` field into per-line
//! segment arrays (spec.md §4.E).

use super::vlq::{decode_vlq, encode_vlq, VlqError};

/// One decoded mapping segment: generated column plus 0-4 optional fields,
/// already resolved to absolute indices (deltas accumulated, spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub generated_column: i64,
    pub source_index: Option<i64>,
    pub original_line: Option<i64>,
    pub original_column: Option<i64>,
    pub name_index: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingsError {
    Vlq(VlqError),
    InvalidSegmentLength(usize),
}

impl From<VlqError> for MappingsError {
    fn from(value: VlqError) -> Self {
        Self::Vlq(value)
    }
}

/// Parse the `mappings` string into one `Vec<Segment>` per generated line.
/// `genCol` resets to 0 at each line; `sourceIdx`/`origLine`/`origCol`/
/// `nameIdx` accumulate across the whole mappings field, matching the
/// source-map v3 delta-encoding rule.
pub fn parse_mappings(mappings: &str) -> Result<Vec<Vec<Segment>>, MappingsError> {
    let mut lines = Vec::new();
    let (mut source_index, mut original_line, mut original_column, mut name_index) = (0i64, 0i64, 0i64, 0i64);

    for raw_line in mappings.split(';') {
        let mut generated_column = 0i64;
        let mut segments = Vec::new();

        if !raw_line.is_empty() {
            for raw_segment in raw_line.split(',') {
                if raw_segment.is_empty() {
                    continue;
                }
                let fields = decode_vlq(raw_segment)?;
                generated_column += fields[0];

                let segment = match fields.len() {
                    1 => Segment { generated_column, ..Default::default() },
                    4 => {
                        source_index += fields[1];
                        original_line += fields[2];
                        original_column += fields[3];
                        Segment {
                            generated_column,
                            source_index: Some(source_index),
                            original_line: Some(original_line),
                            original_column: Some(original_column),
                            name_index: None,
                        }
                    }
                    5 => {
                        source_index += fields[1];
                        original_line += fields[2];
                        original_column += fields[3];
                        name_index += fields[4];
                        Segment {
                            generated_column,
                            source_index: Some(source_index),
                            original_line: Some(original_line),
                            original_column: Some(original_column),
                            name_index: Some(name_index),
                        }
                    }
                    other => return Err(MappingsError::InvalidSegmentLength(other)),
                };
                segments.push(segment);
            }
        }

        lines.push(segments);
    }

    Ok(lines)
}

/// Encode decoded segment lines back into a `mappings` string, the inverse
/// of `parse_mappings` (spec.md §8: `parseMappings(encode(M)) = M.mappings`).
pub fn encode_mappings(lines: &[Vec<Segment>]) -> String {
    let mut out = String::new();
    let (mut prev_source_index, mut prev_original_line, mut prev_original_column, mut prev_name_index) =
        (0i64, 0i64, 0i64, 0i64);

    for (line_idx, segments) in lines.iter().enumerate() {
        if line_idx > 0 {
            out.push(';');
        }
        let mut prev_generated_column = 0i64;
        for (seg_idx, segment) in segments.iter().enumerate() {
            if seg_idx > 0 {
                out.push(',');
            }
            let delta_col = segment.generated_column - prev_generated_column;
            prev_generated_column = segment.generated_column;

            let fields: Vec<i64> = match (segment.source_index, segment.original_line, segment.original_column, segment.name_index) {
                (None, None, None, None) => vec![delta_col],
                (Some(src), Some(line), Some(col), None) => {
                    let deltas = vec![delta_col, src - prev_source_index, line - prev_original_line, col - prev_original_column];
                    prev_source_index = src;
                    prev_original_line = line;
                    prev_original_column = col;
                    deltas
                }
                (Some(src), Some(line), Some(col), Some(name)) => {
                    let deltas = vec![
                        delta_col,
                        src - prev_source_index,
                        line - prev_original_line,
                        col - prev_original_column,
                        name - prev_name_index,
                    ];
                    prev_source_index = src;
                    prev_original_line = line;
                    prev_original_column = col;
                    prev_name_index = name;
                    deltas
                }
                _ => vec![delta_col],
            };
            out.push_str(&encode_vlq(&fields));
        }
    }
    out
}

#[cfg(test)]
#[path = "mappings_tests.rs"]
mod tests;
