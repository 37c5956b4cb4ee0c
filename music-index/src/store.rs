//! On-disk persistence of the index as JSON.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::model::{Album, Artist, Index, Song};

const FORMAT_VERSION: u32 = 2;

#[derive(Deserialize)]
struct IndexFile {
    version: u32,
    #[serde(default)]
    scanned_at: Option<DateTime<Utc>>,
    songs: Vec<Song>,
    albums: Vec<Album>,
    artists: Vec<Artist>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    version: u32,
    scanned_at: Option<DateTime<Utc>>,
    songs: &'a [Song],
    albums: &'a [Album],
    artists: &'a [Artist],
}

/// Reads a persisted index. A missing file is `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<Index>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IndexError::io(path, e)),
    };
    let file: IndexFile = serde_json::from_str(&text)
        .map_err(|e| IndexError::Persist(format!("{}: {e}", path.display())))?;
    if file.version != FORMAT_VERSION {
        return Err(IndexError::Persist(format!(
            "{}: unsupported format version {}",
            path.display(),
            file.version
        )));
    }
    let index = Index::from_parts(file.songs, file.albums, file.artists, file.scanned_at)?;
    debug!(path = %path.display(), songs = index.songs().len(), "loaded persisted index");
    Ok(Some(index))
}

/// Writes `index` next to `path` and renames it into place, so a crash
/// mid-write never leaves a truncated index behind.
pub fn save(path: &Path, index: &Index) -> Result<()> {
    let file = IndexFileRef {
        version: FORMAT_VERSION,
        scanned_at: index.scanned_at(),
        songs: index.songs(),
        albums: index.albums(),
        artists: index.artists(),
    };
    let json = serde_json::to_vec(&file).map_err(|e| IndexError::Persist(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);
    fs::write(tmp, json).map_err(|e| IndexError::io(tmp, e))?;
    fs::rename(tmp, path).map_err(|e| IndexError::io(path, e))?;
    debug!(path = %path.display(), songs = index.songs().len(), "persisted index");
    Ok(())
}
