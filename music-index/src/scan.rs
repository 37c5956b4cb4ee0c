//! Library tree enumeration.
//!
//! Audio files are grouped into directory passes: one pass per directory,
//! holding that directory's own audio files in file-name order. Track
//! fallbacks are computed per pass.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{IndexError, Result};

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "flac", "ogg"];

/// Files that commonly sit next to music and are skipped silently.
pub const BENIGN_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "ini", "db", "html", "wpl", "js", "pdf", "m4p", "wma", "txt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Audio,
    Benign,
    /// Anything else. Logged so odd files in the library get noticed.
    Strange,
}

pub fn classify(path: &Path) -> FileClass {
    if path.file_name().and_then(|n| n.to_str()) == Some(".DS_Store") {
        return FileClass::Benign;
    }
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return FileClass::Strange,
    };
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        FileClass::Audio
    } else if BENIGN_EXTENSIONS.contains(&ext.as_str()) {
        FileClass::Benign
    } else {
        FileClass::Strange
    }
}

/// Audio files of one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPass {
    /// Directory relative to the library root, empty for the root itself.
    pub dir: String,
    /// Relative paths of the directory's audio files, in file-name order.
    pub files: Vec<String>,
}

/// Walks `root` and returns one pass per directory that holds audio files,
/// ordered by directory path.
///
/// Dot-entries (hidden directories, the persisted index, downloaded art) are
/// skipped. Unreadable entries below the root are logged and skipped; an
/// unreadable root is an error.
pub fn discover(root: &Path) -> Result<Vec<DirectoryPass>> {
    std::fs::read_dir(root).map_err(|e| IndexError::io(root, e))?;

    let mut passes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable library entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        match classify(entry.path()) {
            FileClass::Audio => {}
            FileClass::Benign => continue,
            FileClass::Strange => {
                warn!(path = %entry.path().display(), "found strange file");
                continue;
            }
        }

        let Some(relative) = relative_path(root, entry.path()) else {
            continue;
        };
        let dir = match relative.rfind('/') {
            Some(idx) => relative[..idx].to_string(),
            None => String::new(),
        };
        passes.entry(dir).or_default().push(relative);
    }

    let passes: Vec<DirectoryPass> = passes
        .into_iter()
        .map(|(dir, files)| DirectoryPass { dir, files })
        .collect();
    debug!(
        directories = passes.len(),
        files = passes.iter().map(|p| p.files.len()).sum::<usize>(),
        "library walk complete"
    );
    Ok(passes)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// `/`-separated path of `path` below `root`.
pub(crate) fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    let parts = parts?;
    (!parts.is_empty()).then(|| parts.join("/"))
}
