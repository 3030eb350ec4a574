//! Canonical JSONL encoding.
//!
//! One JSON object per line, LF-terminated, trailing newline. Keys are
//! sorted lexicographically (serde_json's default object map is a BTreeMap,
//! so a `Value` round-trip yields sorted keys), which keeps textual diffs
//! stable across exports.

use std::io::{self, BufRead, Write};

use crate::issue::Issue;

/// Error type for JSONL operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// Result alias for JSONL operations.
pub type Result<T> = std::result::Result<T, JsonlError>;

/// Serializes an issue to its canonical single-line form (no newline).
pub fn to_canonical_line(issue: &Issue) -> Result<String> {
    // Value's object map sorts keys; this is the canonicalization step.
    let value = serde_json::to_value(issue).map_err(|e| JsonlError::Json { line: 0, source: e })?;
    serde_json::to_string(&value).map_err(|e| JsonlError::Json { line: 0, source: e })
}

/// Writes issues in canonical form to the given writer.
pub fn write_jsonl<W: Write>(writer: &mut W, issues: &[Issue]) -> Result<()> {
    for issue in issues {
        let line = to_canonical_line(issue)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Returns an iterator that reads issues from a JSONL reader.
///
/// Empty lines are skipped; a malformed line yields an `Err` item carrying
/// its 1-based line number and iteration continues afterwards.
pub fn read_jsonl<R: BufRead>(reader: R) -> JsonlIter<R> {
    JsonlIter {
        reader,
        line_number: 0,
    }
}

/// Iterator over JSONL-encoded issues.
pub struct JsonlIter<R> {
    reader: R,
    line_number: usize,
}

impl<R: BufRead> Iterator for JsonlIter<R> {
    type Item = (usize, Result<Issue>);

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_number += 1;
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let parsed = serde_json::from_str::<Issue>(trimmed).map_err(|e| {
                        JsonlError::Json {
                            line: self.line_number,
                            source: e,
                        }
                    });
                    return Some((self.line_number, parsed));
                }
                Err(e) => return Some((self.line_number, Err(JsonlError::Io(e)))),
            }
        }
    }
}
