//! CSV parser for policy exports and incoming submissions
//!
//! Parsing runs in two passes. The first decodes every record without
//! headers so the header locator can look at raw cells. The second decodes
//! again starting at the byte offset of the located header record, which
//! keeps the offset exact even when preamble cells contain quoted newlines.

use crate::error::{Error, Result};
use crate::header::locate_header_row;
use crate::shape::TableShape;
use crate::table::{is_blank, Column, Row, Table};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const UTF8_BOM: char = '\u{feff}';

/// A row-level problem that was skipped rather than failing the parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// 1-based line in the original payload, 0 when not tied to a line
    pub line: u64,
    pub message: String,
}

impl ValidationWarning {
    fn new(line: u64, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "line {}: {}", self.line, self.message)
        }
    }
}

/// Output of a parse: the table plus where the header was and what was dropped
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub table: Table,
    /// Index of the header among the decoded raw records
    pub header_row: usize,
    pub warnings: Vec<ValidationWarning>,
}

/// Parse a file on disk
pub fn parse_file<P: AsRef<Path>>(path: P, shape: &TableShape) -> Result<ParsedTable> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_bytes(&bytes, shape, &path.display().to_string())
}

/// Parse a raw upload payload
///
/// Fails only when the payload is not text at all.
pub fn parse_bytes(bytes: &[u8], shape: &TableShape, source_name: &str) -> Result<ParsedTable> {
    let content = std::str::from_utf8(bytes)
        .map_err(|e| Error::parse(source_name, format!("payload is not valid UTF-8: {e}")))?;
    parse_str(content, shape, source_name)
}

/// Parse CSV text
pub fn parse_str(content: &str, shape: &TableShape, source_name: &str) -> Result<ParsedTable> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    if content.contains('\0') {
        return Err(Error::parse(
            source_name,
            "payload contains NUL bytes and is not delimited text",
        ));
    }

    let mut warnings = Vec::new();
    let lines = LineIndex::new(content);

    // First pass: raw records with their byte offsets
    let mut first_pass = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    let mut starts: Vec<(u64, u64)> = Vec::new();
    for result in first_pass.records() {
        match result {
            Ok(record) => {
                let (byte, line) = record
                    .position()
                    .map(|p| lines.record_start(p.byte()))
                    .unwrap_or((0, 1));
                raw_rows.push(record.iter().map(str::to_string).collect());
                starts.push((byte, line));
            }
            Err(e) => {
                let line = e.position().map(|p| lines.record_start(p.byte()).1).unwrap_or(0);
                warnings.push(ValidationWarning::new(line, format!("undecodable record: {e}")));
            }
        }
    }

    let header_row = locate_header_row(&raw_rows, &shape.detection, shape.max_header_scan);
    let (header_byte, header_line) = starts.get(header_row).copied().unwrap_or((0, 1));
    let line_of = |p: &csv::Position| lines.record_start(header_byte + p.byte()).1;
    let body = content.get(header_byte as usize..).unwrap_or(content);
    debug!(
        source = source_name,
        header_row,
        header_line,
        skipped = header_row,
        "re-decoding from header row"
    );

    // Second pass: header-aware decode from the located row
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| Error::Csv {
            source_name: source_name.to_string(),
            source: e,
        })?
        .clone();

    let columns = canonical_columns(&headers, shape, header_line, &mut warnings);

    let key_idx = columns
        .iter()
        .find(|c| c.name == shape.key_column)
        .map(|c| c.index);
    if key_idx.is_none() && !columns.is_empty() {
        warnings.push(ValidationWarning::new(
            header_line,
            format!("key column '{}' not found in header", shape.key_column),
        ));
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(line_of).unwrap_or(0);
                warnings.push(ValidationWarning::new(line, format!("undecodable record: {e}")));
                continue;
            }
        };

        let line = record.position().map(line_of).unwrap_or(0);
        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();

        if shape.skip_blank_rows && is_blank(&cells) {
            continue;
        }

        if cells.len() > columns.len() {
            warnings.push(ValidationWarning::new(
                line,
                format!(
                    "row has {} cells but header has {}, truncating",
                    cells.len(),
                    columns.len()
                ),
            ));
            cells.truncate(columns.len());
        }
        cells.resize(columns.len(), String::new());

        if let Some(idx) = key_idx {
            if cells[idx].is_empty() {
                warnings.push(ValidationWarning::new(
                    line,
                    format!("missing value for key column '{}', row dropped", shape.key_column),
                ));
                continue;
            }
        }

        rows.push(Row::new(line, cells));
    }

    for warning in &warnings {
        warn!(source = source_name, "{warning}");
    }
    info!(
        source = source_name,
        shape = %shape.name,
        rows = rows.len(),
        warnings = warnings.len(),
        "parsed table"
    );

    Ok(ParsedTable {
        table: Table {
            columns,
            rows,
            source_name: source_name.to_string(),
        },
        header_row,
        warnings,
    })
}

/// Map header cells onto canonical names
///
/// When several headers match the same canonical column, the shortest one
/// (closest to the matcher text) takes the name and the rest keep their own.
fn canonical_columns(
    headers: &csv::StringRecord,
    shape: &TableShape,
    header_line: u64,
    warnings: &mut Vec<ValidationWarning>,
) -> Vec<Column> {
    let raw: Vec<&str> = headers.iter().map(str::trim).collect();
    let mut names: Vec<String> = raw.iter().map(|h| shape.canonical_header(h)).collect();

    for spec in &shape.columns {
        let claims: Vec<usize> = (0..names.len())
            .filter(|&i| names[i] == spec.canonical)
            .collect();
        if claims.len() < 2 {
            continue;
        }
        let winner = claims
            .iter()
            .copied()
            .min_by_key(|&i| raw[i].len())
            .unwrap_or(claims[0]);
        for &i in &claims {
            if i != winner {
                names[i] = raw[i].to_string();
            }
        }
        let losers: Vec<&str> = claims.iter().filter(|&&i| i != winner).map(|&i| raw[i]).collect();
        warnings.push(ValidationWarning::new(
            header_line,
            format!(
                "headers {:?} also match '{}', using '{}'",
                losers, spec.canonical, raw[winner]
            ),
        ));
    }

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Column::new(name, i))
        .collect()
}

/// Maps byte offsets in the payload to 1-based physical lines
struct LineIndex<'a> {
    content: &'a str,
    newlines: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            content,
            newlines: content.match_indices('\n').map(|(i, _)| i).collect(),
        }
    }

    /// Offset and line of a record's first byte
    ///
    /// csv reports a record's position before skipping the empty lines
    /// ahead of it, so those are stepped over here.
    fn record_start(&self, byte: u64) -> (u64, u64) {
        let bytes = self.content.as_bytes();
        let mut start = byte as usize;
        while start < bytes.len() && matches!(bytes[start], b'\n' | b'\r') {
            start += 1;
        }
        let line = self.newlines.partition_point(|&nl| nl < start) + 1;
        (start as u64, line as u64)
    }
}
