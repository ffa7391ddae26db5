//! The search memory: a flat file listing the folders found by the last
//! `search`, one `N. /absolute/path` line per folder, numbered from 1.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reel::ReelError;

use crate::library::Folder;

#[derive(Clone, Debug)]
pub struct SearchMemory {
    path: PathBuf,
}

impl SearchMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the remembered folders.
    pub async fn store(&self, folders: &[Folder]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create cache dir {:?}", parent))?;
        }
        let body: String = folders
            .iter()
            .enumerate()
            .map(|(i, folder)| format!("{}. {}\n", i + 1, folder.path.display()))
            .collect();
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("write search cache {:?}", self.path))?;
        tracing::debug!(path = %self.path.display(), folders = folders.len(), "search remembered");
        Ok(())
    }

    /// All remembered folders in order. A missing file means nothing is
    /// remembered yet.
    pub async fn entries(&self) -> Result<Vec<PathBuf>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("read search cache {:?}", self.path)),
        };
        Ok(raw.lines().filter_map(parse_line).collect())
    }

    /// Folder number `index` (1-based) from the last search.
    pub async fn recall(&self, index: usize) -> Result<PathBuf> {
        let entries = self.entries().await?;
        index
            .checked_sub(1)
            .and_then(|i| entries.get(i).cloned())
            .ok_or_else(|| {
                ReelError::Index {
                    index,
                    len: entries.len(),
                }
                .into()
            })
    }
}

fn parse_line(line: &str) -> Option<PathBuf> {
    let (number, path) = line.split_once(' ')?;
    number.strip_suffix('.')?.parse::<usize>().ok()?;
    let path = path.trim();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(path: &str) -> Folder {
        Folder {
            path: PathBuf::from(path),
            song_files: vec!["01.flac".to_string()],
            text_files: Vec::new(),
        }
    }

    #[tokio::test]
    async fn store_then_recall_by_number() {
        let dir = tempfile::tempdir().unwrap();
        let memory = SearchMemory::new(dir.path().join("nested/search.txt"));
        memory
            .store(&[folder("/music/Abba Gold"), folder("/music/Zappa")])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(memory.path()).unwrap();
        assert_eq!(raw, "1. /music/Abba Gold\n2. /music/Zappa\n");
        assert_eq!(memory.recall(1).await.unwrap(), PathBuf::from("/music/Abba Gold"));
        assert_eq!(memory.recall(2).await.unwrap(), PathBuf::from("/music/Zappa"));
    }

    #[tokio::test]
    async fn missing_entries_are_index_errors() {
        let dir = tempfile::tempdir().unwrap();
        let memory = SearchMemory::new(dir.path().join("search.txt"));
        let err = memory.recall(1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReelError>(),
            Some(ReelError::Index { index: 1, len: 0 })
        ));

        memory.store(&[folder("/a")]).await.unwrap();
        for index in [0, 2] {
            let err = memory.recall(index).await.unwrap_err();
            assert!(matches!(err.downcast_ref::<ReelError>(), Some(ReelError::Index { len: 1, .. })));
        }
    }

    #[test]
    fn malformed_lines_are_skipped() {
        assert_eq!(parse_line("3. /x/y z"), Some(PathBuf::from("/x/y z")));
        assert_eq!(parse_line("garbage"), None);
        assert_eq!(parse_line("x. /path"), None);
        assert_eq!(parse_line("4. "), None);
    }
}
