//! Parsing of `git status --porcelain` output.
//!
//! Each line is `XY <path>`: a two-character status code, a space, then the
//! path. Paths containing special characters are double-quoted with C-style
//! escapes, where non-ASCII bytes appear as three-digit octal escapes of
//! their UTF-8 encoding.

use super::classifier::StatusClass;
use crate::errors::ClassifyError;

/// One `(status code, path)` pair from a porcelain listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// The first three characters of the line, trailing space included.
    pub code: String,
    /// The unescaped path.
    pub path: String,
}

impl StatusEntry {
    pub fn class(&self) -> StatusClass {
        StatusClass::of(&self.code)
    }
}

/// Parse a full porcelain listing. Blank lines are skipped.
pub fn parse_porcelain(output: &str) -> Result<Vec<StatusEntry>, ClassifyError> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

/// Parse a single porcelain line.
pub fn parse_line(line: &str) -> Result<StatusEntry, ClassifyError> {
    if line.len() < 4 || !line.is_char_boundary(3) {
        return Err(ClassifyError::Malformed(line.to_string()));
    }
    let (code, raw_path) = line.split_at(3);
    Ok(StatusEntry {
        code: code.to_string(),
        path: unquote_path(raw_path)?,
    })
}

/// Undo git's path quoting. Unquoted paths are returned unchanged.
pub fn unquote_path(raw: &str) -> Result<String, ClassifyError> {
    let inner = match raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) if raw.len() >= 2 => inner,
        _ => return Ok(raw.to_string()),
    };

    let bad = || ClassifyError::BadEscape(raw.to_string());
    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let esc = *bytes.get(i + 1).ok_or_else(bad)?;
        let decoded = match esc {
            b'a' => 0x07,
            b'b' => 0x08,
            b't' => b'\t',
            b'n' => b'\n',
            b'v' => 0x0b,
            b'f' => 0x0c,
            b'r' => b'\r',
            b'"' => b'"',
            b'\\' => b'\\',
            b'0'..=b'3' => {
                let digits = bytes.get(i + 1..i + 4).ok_or_else(bad)?;
                if !digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                    return Err(bad());
                }
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                out.push(u8::try_from(value).map_err(|_| bad())?);
                i += 4;
                continue;
            }
            _ => return Err(bad()),
        };
        out.push(decoded);
        i += 2;
    }
    String::from_utf8(out).map_err(|_| bad())
}
