//! Thin helpers over the Linux `/proc` and `/sys` text formats the
//! collectors in this crate read. No procfs crate appears anywhere in the
//! reference corpus for this kind of line-oriented kernel text, so these
//! are hand-parsed the same way the rest of the corpus hand-parses
//! line-oriented service formats.

use crate::error::CollectorError;

pub async fn read_to_string(path: &str) -> Result<String, CollectorError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CollectorError::Io { path: path.to_string(), message: e.to_string() })
}

pub fn parse_error(source: &str, message: impl Into<String>) -> CollectorError {
    CollectorError::Parse { source: source.to_string(), message: message.into() }
}

/// Lists `/sys/class/thermal/thermal_zone*` entries without pulling in a
/// directory-walking crate; `tokio::fs::read_dir` is already the ambient
/// way the stdlib async surface does this.
pub async fn list_dir_names(path: &str) -> Result<Vec<String>, CollectorError> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| CollectorError::Io { path: path.to_string(), message: e.to_string() })?;
    let mut names = Vec::new();
    loop {
        let next = entries
            .next_entry()
            .await
            .map_err(|e| CollectorError::Io { path: path.to_string(), message: e.to_string() })?;
        match next {
            Some(entry) => {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
            None => break,
        }
    }
    names.sort();
    Ok(names)
}
