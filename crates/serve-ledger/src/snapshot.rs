use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::LedgerError;

/// Writes pretty-printed JSON snapshots atomically: write to a temp file
/// then rename over the target.
pub async fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), LedgerError> {
    let body = serde_json::to_vec_pretty(value).map_err(|source| LedgerError::Serialize {
        what: "snapshot",
        source,
    })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| LedgerError::WriteSnapshot {
                path: path.to_path_buf(),
                source,
            })?;
    }

    let tmp_path: PathBuf = tmp_path_for(path);
    tokio::fs::write(&tmp_path, &body)
        .await
        .map_err(|source| LedgerError::WriteSnapshot {
            path: tmp_path.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|source| LedgerError::RenameSnapshot {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads back a previously written snapshot, returning `None` if the file
/// does not yet exist (first boot / never snapshotted).
pub async fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, LedgerError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|source| LedgerError::Parse {
                what: "snapshot",
                source,
            })?;
            Ok(Some(value))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LedgerError::ReadSnapshot {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Snap {
        n: u32,
    }

    #[tokio::test]
    async fn round_trips_and_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_snapshot(&path, &Snap { n: 1 }).await.unwrap();
        let first: Snap = read_snapshot(&path).await.unwrap().unwrap();
        assert_eq!(first, Snap { n: 1 });

        write_snapshot(&path, &Snap { n: 2 }).await.unwrap();
        let second: Snap = read_snapshot(&path).await.unwrap().unwrap();
        assert_eq!(second, Snap { n: 2 });

        assert!(!tmp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn missing_snapshot_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let read: Option<Snap> = read_snapshot(&path).await.unwrap();
        assert!(read.is_none());
    }
}
