//! Line-oriented codec for the persisted cache format.
//!
//! One record per line, UTF-8:
//!
//! ```text
//! <file_id> <content_hash> <settings_json>
//! ```
//!
//! The file id is written bare unless it contains a space, in which case it
//! is wrapped in double quotes. The settings JSON is the remainder of the
//! line and may contain spaces freely. The format has no escaping for a
//! double quote inside a file id, so such ids are rejected at write time
//! rather than written ambiguously.

use crate::settings::SettingsBlob;
use anyhow::{Context, Result, bail};

/// One parsed cache record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Logical identity of the source file.
    pub file_id: String,
    /// Hex content digest at last processing.
    pub content_hash: String,
    /// Effective settings last used for this file.
    pub settings: SettingsBlob,
}

/// Rejects file ids the on-disk format cannot represent unambiguously.
pub fn validate_file_id(file_id: &str) -> Result<()> {
    if file_id.is_empty() {
        bail!("file id cannot be empty");
    }
    if file_id.contains('"') {
        bail!("file id contains a double quote, which the cache format cannot represent: {file_id}");
    }
    if file_id.contains('\n') || file_id.contains('\r') {
        bail!("file id contains a line break: {file_id:?}");
    }
    Ok(())
}

/// Formats one record as a cache line, without the trailing newline.
pub fn format_line(file_id: &str, content_hash: &str, settings: &SettingsBlob) -> Result<String> {
    validate_file_id(file_id)?;
    let json = serde_json::to_string(settings).context("failed to encode settings as JSON")?;
    if file_id.contains(' ') {
        Ok(format!("\"{file_id}\" {content_hash} {json}"))
    } else {
        Ok(format!("{file_id} {content_hash} {json}"))
    }
}

/// Parses one cache line. The caller is expected to have skipped empty lines.
pub fn parse_line(line: &str) -> Result<Record> {
    let (file_id, rest) = if let Some(quoted) = line.strip_prefix('"') {
        let end = quoted
            .find('"')
            .context("unterminated quoted file id")?;
        let rest = quoted[end + 1..]
            .strip_prefix(' ')
            .context("missing separator after quoted file id")?;
        (&quoted[..end], rest)
    } else {
        line.split_once(' ').context("missing content hash field")?
    };

    let (content_hash, json) = rest.split_once(' ').context("missing settings field")?;
    if file_id.is_empty() {
        bail!("empty file id");
    }
    if content_hash.is_empty() {
        bail!("empty content hash");
    }

    let settings: SettingsBlob =
        serde_json::from_str(json).context("invalid settings JSON")?;

    Ok(Record {
        file_id: file_id.to_string(),
        content_hash: content_hash.to_string(),
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample_settings() -> SettingsBlob {
        BTreeMap::from([
            ("mono".to_string(), json!(true)),
            ("opus_bitrate".to_string(), json!("48k")),
        ])
    }

    #[test]
    fn test_bare_id_round_trip() {
        let line = format_line("sfx/jump.wav", "0123abcd", &sample_settings()).unwrap();
        assert!(line.starts_with("sfx/jump.wav 0123abcd {"));

        let record = parse_line(&line).unwrap();
        assert_eq!(record.file_id, "sfx/jump.wav");
        assert_eq!(record.content_hash, "0123abcd");
        assert_eq!(record.settings, sample_settings());
    }

    #[test]
    fn test_spaced_id_is_quoted() {
        let line = format_line("music/main theme.wav", "beef", &sample_settings()).unwrap();
        assert!(line.starts_with("\"music/main theme.wav\" beef "));

        let record = parse_line(&line).unwrap();
        assert_eq!(record.file_id, "music/main theme.wav");
        assert_eq!(record.content_hash, "beef");
    }

    #[test]
    fn test_settings_json_may_contain_spaces() {
        let settings = BTreeMap::from([("note".to_string(), json!("hello there, wörld"))]);
        let line = format_line("a.wav", "ff", &settings).unwrap();
        let record = parse_line(&line).unwrap();
        assert_eq!(record.settings["note"], json!("hello there, wörld"));
    }

    #[test]
    fn test_quote_in_id_rejected() {
        let err = format_line("odd\"name.wav", "ff", &SettingsBlob::new()).unwrap_err();
        assert!(err.to_string().contains("double quote"));
    }

    #[test]
    fn test_malformed_lines_error() {
        assert!(parse_line("justoneword").is_err());
        assert!(parse_line("id hashonly").is_err());
        assert!(parse_line("id hash notjson").is_err());
        assert!(parse_line("\"unterminated hash {}").is_err());
    }
}
