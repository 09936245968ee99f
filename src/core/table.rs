//! Raw table reading and header/shape validation.
//!
//! Validation is fail-fast: the first bad header, short row or blank cell
//! aborts the whole table. Line numbers are 1-based and match the source
//! file, so the header is line 1 and the first data row is line 2.

use crate::utils::error::{DeckError, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const BYTE_ORDER_MARK: char = '\u{feff}';
const MICRO_SIGN: char = '\u{00b5}';
const GREEK_MU: char = '\u{03bc}';

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub line: usize,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Build a table from in-memory rows, numbering lines from 1.
    pub fn from_rows<I, R, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, fields)| RawRow {
                line: idx + 1,
                fields: fields.into_iter().map(Into::into).collect(),
            })
            .collect();
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parse comma separated UTF-8 text, tolerating a leading byte-order mark.
/// Completely empty lines are skipped; every other line becomes a row, even
/// one holding only whitespace.
pub fn read_table(bytes: &[u8]) -> Result<RawTable> {
    let text = std::str::from_utf8(bytes).map_err(|e| DeckError::SchemaError {
        line: 1,
        message: format!("input is not valid UTF-8 text: {}", e),
        content: Vec::new(),
    })?;
    let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 1);
        let fields: Vec<String> = record.iter().map(String::from).collect();
        rows.push(RawRow { line, fields });
    }

    tracing::debug!("Read {} raw rows", rows.len());
    Ok(RawTable { rows })
}

/// Header matching style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// Headers must match the expected list exactly, in order.
    #[default]
    Strict,
    /// Headers must match the expected set, in any order.
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderContract {
    pub mode: HeaderMode,
    pub expected: &'static [&'static str],
}

impl HeaderContract {
    pub fn strict(expected: &'static [&'static str]) -> Self {
        Self {
            mode: HeaderMode::Strict,
            expected,
        }
    }

    pub fn set(expected: &'static [&'static str]) -> Self {
        Self {
            mode: HeaderMode::Set,
            expected,
        }
    }
}

/// A table whose header satisfied its contract and whose data rows all
/// have the header's width and no blank cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl ValidatedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Canonical spelling of a header token: trimmed, without a byte-order
/// mark, and with the micro sign folded to the Greek mu.
pub fn canonical_header(raw: &str) -> String {
    raw.trim_start_matches(BYTE_ORDER_MARK)
        .trim()
        .replace(MICRO_SIGN, &GREEK_MU.to_string())
}

pub fn validate(table: &RawTable, contract: &HeaderContract) -> Result<ValidatedTable> {
    let header_row = table.rows.first().ok_or_else(|| DeckError::SchemaError {
        line: 1,
        message: "the table is empty; a header row is required".to_string(),
        content: Vec::new(),
    })?;

    let headers: Vec<String> = header_row.fields.iter().map(|h| canonical_header(h)).collect();
    check_headers(header_row, &headers, contract)?;

    let data_rows = &table.rows[1..];
    if data_rows.is_empty() {
        return Err(DeckError::SchemaError {
            line: header_row.line,
            message: "the table has a header row but no data rows".to_string(),
            content: header_row.fields.clone(),
        });
    }

    for row in data_rows {
        if row.fields.len() != headers.len() {
            return Err(DeckError::SchemaError {
                line: row.line,
                message: format!(
                    "expected {} fields but found {}",
                    headers.len(),
                    row.fields.len()
                ),
                content: row.fields.clone(),
            });
        }

        if let Some(idx) = row.fields.iter().position(|v| v.trim().is_empty()) {
            return Err(DeckError::FieldError {
                line: row.line,
                field: headers[idx].clone(),
                message: "field is empty".to_string(),
            });
        }
    }

    tracing::debug!(
        "Validated {} data rows against {:?} headers",
        data_rows.len(),
        contract.mode
    );

    Ok(ValidatedTable {
        headers,
        rows: data_rows.to_vec(),
    })
}

fn check_headers(row: &RawRow, headers: &[String], contract: &HeaderContract) -> Result<()> {
    let mut seen = HashSet::new();
    for header in headers {
        if !seen.insert(header.as_str()) {
            return Err(DeckError::SchemaError {
                line: row.line,
                message: format!("duplicate header '{}'", header),
                content: row.fields.clone(),
            });
        }
    }

    let expected: Vec<String> = contract.expected.iter().map(|h| canonical_header(h)).collect();

    match contract.mode {
        HeaderMode::Strict => {
            if headers != expected.as_slice() {
                return Err(DeckError::SchemaError {
                    line: row.line,
                    message: format!("expected headers {:?}, but got {:?}", expected, headers),
                    content: row.fields.clone(),
                });
            }
        }
        HeaderMode::Set => {
            let missing: Vec<String> = expected
                .iter()
                .filter(|h| !headers.contains(h))
                .cloned()
                .collect();
            let unexpected: Vec<String> = headers
                .iter()
                .filter(|h| !expected.contains(h))
                .cloned()
                .collect();
            if !missing.is_empty() || !unexpected.is_empty() {
                return Err(DeckError::HeaderSetError {
                    line: row.line,
                    content: row.fields.clone(),
                    missing,
                    unexpected,
                });
            }
        }
    }
    Ok(())
}
