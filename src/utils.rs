use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::{UTF_8, WINDOWS_1252};
use sha2::{Digest, Sha256};

/// Collapses every run of whitespace (newlines included) to a single space
/// and trims both ends.
pub fn normalize_body(body: &str) -> String {
    body.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Content hash of a definition body: formatting-only edits hash the same.
pub fn content_hash(body: &str) -> String {
    sha256_hex(&normalize_body(body))
}

pub fn read_text_best_effort(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(decode_best_effort(bytes))
}

/// UTF-8 with U+FFFD substituted at the offending bytes only. Text that is
/// mostly invalid UTF-8 is re-read as Windows-1252. Never fails.
pub fn decode_best_effort(bytes: Vec<u8>) -> String {
    let (content, had_errors) = UTF_8.decode_with_bom_removal(&bytes);
    if !had_errors {
        return content.into_owned();
    }

    let mut non_ascii = 0usize;
    let mut replaced = 0usize;
    for ch in content.chars().filter(|c| !c.is_ascii()) {
        non_ascii += 1;
        if ch == char::REPLACEMENT_CHARACTER {
            replaced += 1;
        }
    }
    if replaced * 2 > non_ascii {
        let (res, _, _) = WINDOWS_1252.decode(&bytes);
        return res.into_owned();
    }
    content.into_owned()
}
