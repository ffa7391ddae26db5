//! Scan local directories for playable files.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// A directory that directly contains at least one audio file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Folder {
    pub path: PathBuf,
    pub song_files: Vec<String>,
    pub text_files: Vec<String>,
}

impl Folder {
    pub fn name(&self) -> String {
        display_name(&self.path)
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(OsStr::to_str)
        .unwrap_or("<unknown>")
        .to_string()
}

pub fn is_audio(path: &Path, extensions: &[String]) -> bool {
    let ext = path
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or("")
        .to_ascii_lowercase();
    !ext.is_empty() && extensions.iter().any(|e| *e == ext)
}

/// Audio files directly inside `dir`, sorted by name ignoring case.
pub fn scan_folder(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read_dir {:?}", dir))? {
        let entry = entry.context("read_dir entry")?;
        let path = entry.path();
        if path.is_file() && is_audio(&path, extensions) {
            out.push(path);
        }
    }
    out.sort_by_key(|p| display_name(p).to_lowercase());
    Ok(out)
}

/// Every folder below `root` (inclusive) that holds audio files.
///
/// Hidden directories are skipped unless `follow_dots`; symlinked directories
/// are skipped unless `follow_links`. Results are sorted by folder name.
pub fn find_tunes(
    root: &Path,
    extensions: &[String],
    follow_links: bool,
    follow_dots: bool,
) -> Result<Vec<Folder>> {
    let root = fs::canonicalize(root).with_context(|| format!("resolve {:?}", root))?;
    let mut results = Vec::new();
    let mut pending = vec![root];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };
        let mut song_files = Vec::new();
        let mut text_files = Vec::new();
        for entry in entries {
            let entry = entry.context("read_dir entry")?;
            let path = entry.path();
            let name = display_name(&path);
            let file_type = entry.file_type().context("file type")?;
            if file_type.is_dir() || (follow_links && file_type.is_symlink() && path.is_dir()) {
                if follow_dots || !name.starts_with('.') {
                    pending.push(path);
                }
            } else if is_audio(&path, extensions) {
                song_files.push(name);
            } else if name.ends_with(".txt") {
                text_files.push(name);
            }
        }
        if !song_files.is_empty() {
            song_files.sort_by_key(|s| s.to_lowercase());
            text_files.sort();
            results.push(Folder {
                path: dir,
                song_files,
                text_files,
            });
        }
    }
    results.sort_by_key(|f| f.name().to_lowercase());
    tracing::info!(folders = results.len(), "scan finished");
    Ok(results)
}
