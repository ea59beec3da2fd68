//! Read-only view of a repository's file surface.
//!
//! Scoring only ever needs to list files with their size and line count and
//! to read a handful of small manifests, so that is all `RepoFileSource`
//! exposes.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use envboot_core::{EngineError, EngineResult};
use walkdir::WalkDir;

/// Manifests larger than this are not read for framework detection.
const MAX_TEXT_BYTES: u64 = 4 * 1024 * 1024;

/// One regular file under the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    pub size_bytes: u64,
    pub line_count: u64,
}

impl RepoEntry {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() { None } else { Some(ext) }
    }

    /// Whether the file itself or any directory on its path starts with `.`.
    pub fn is_hidden(&self) -> bool {
        self.path.split('/').any(|part| part.starts_with('.'))
    }

    pub fn is_at_root(&self) -> bool {
        !self.path.contains('/')
    }
}

/// Narrow read capability over a repository.
pub trait RepoFileSource {
    /// Display name of the root (used in reports).
    fn root_name(&self) -> String;
    /// Every regular file, sorted by path.
    fn entries(&self) -> EngineResult<Vec<RepoEntry>>;
    /// Text of a small file, or `None` if missing, too large, or unreadable.
    fn read_text(&self, path: &str) -> Option<String>;
}

/// `RepoFileSource` over a local directory.
#[derive(Debug, Clone)]
pub struct FsRepoSource {
    root: PathBuf,
}

impl FsRepoSource {
    /// Open a repository root. Fails with `RepoNotFound` unless `root` is a
    /// readable directory.
    pub fn open(root: &Path) -> EngineResult<Self> {
        let is_dir = std::fs::metadata(root).map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir || std::fs::read_dir(root).is_err() {
            return Err(EngineError::RepoNotFound(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RepoFileSource for FsRepoSource {
    fn root_name(&self) -> String {
        self.root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(".")
            .to_string()
    }

    fn entries(&self) -> EngineResult<Vec<RepoEntry>> {
        let mut entries = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    if e.depth() == 0 {
                        return Err(EngineError::RepoNotFound(self.root.clone()));
                    }
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let line_count = count_lines(entry.path()).unwrap_or(0);

            entries.push(RepoEntry {
                path,
                size_bytes,
                line_count,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(root = %self.root.display(), files = entries.len(), "listed repository");
        Ok(entries)
    }

    fn read_text(&self, path: &str) -> Option<String> {
        let full = self.root.join(path);
        let meta = std::fs::metadata(&full).ok()?;
        if !meta.is_file() || meta.len() > MAX_TEXT_BYTES {
            return None;
        }
        let bytes = std::fs::read(&full).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Count lines the way a line-oriented reader would: every `\n`, plus a
/// trailing partial line.
fn count_lines(path: &Path) -> std::io::Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buf = [0u8; 64 * 1024];
    let mut lines = 0u64;
    let mut last = None;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
        last = Some(buf[n - 1]);
    }

    if matches!(last, Some(b) if b != b'\n') {
        lines += 1;
    }
    Ok(lines)
}
