use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::LedgerError;

/// An append-only NDJSON log file: one JSON object per line, UTF-8,
/// newline-terminated. Writes are serialized per file through an internal
/// mutex: one dedicated writer per log file.
pub struct AppendLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl AppendLog {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LedgerError::OpenLog {
                    path: path.clone(),
                    source,
                })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| LedgerError::OpenLog {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record as a single NDJSON line. I/O errors here are
    /// treated as fatal for the caller's envelope and must be surfaced as
    /// a `503` at the ingress boundary.
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(record).map_err(|source| LedgerError::Serialize {
            what: "log record",
            source,
        })?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|source| LedgerError::AppendLog {
                path: self.path.clone(),
                source,
            })
    }

    /// Reads up to the last `limit` lines, oldest first, parsed as JSON. A
    /// log file that doesn't exist yet reads as empty rather than an error.
    pub async fn tail(&self, limit: usize) -> Result<Vec<Value>, LedgerError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LedgerError::AppendLog {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let lines: Vec<&str> = contents.lines().filter(|line| !line.is_empty()).collect();
        let start = lines.len().saturating_sub(limit);
        lines[start..]
            .iter()
            .map(|line| {
                serde_json::from_str(line).map_err(|source| LedgerError::Parse {
                    what: "log line",
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn appends_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");
        let log = AppendLog::open(&path).await.unwrap();

        log.append(&json!({"a": 1})).await.unwrap();
        log.append(&json!({"a": 2})).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"a":1}"#);
        assert_eq!(lines[1], r#"{"a":2}"#);
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/events.ndjson");
        let log = AppendLog::open(&path).await.unwrap();
        log.append(&json!({"ok": true})).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn tail_returns_only_the_most_recent_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::open(dir.path().join("decisions.ndjson")).await.unwrap();
        for n in 0..5 {
            log.append(&json!({"n": n})).await.unwrap();
        }

        let tail = log.tail(2).await.unwrap();
        assert_eq!(tail, vec![json!({"n": 3}), json!({"n": 4})]);
    }

    #[tokio::test]
    async fn tail_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = AppendLog::open(dir.path().join("sub/events.ndjson")).await.unwrap();
        tokio::fs::remove_file(log.path()).await.unwrap();
        assert!(log.tail(10).await.unwrap().is_empty());
    }
}
