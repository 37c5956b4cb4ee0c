//! Album cover art: folder images next to the music, and an external lookup
//! for albums without one.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::metadata::EmbeddedPicture;

/// Image names probed in an album directory, in order.
pub const FOLDER_ART_NAMES: &[&str] = &["Folder.jpg", "folder.jpg", "cover.jpg", "Cover.jpg"];

/// Directory under the library root where downloaded covers are stored.
pub const ART_DIR: &str = ".musicbox-art";

const MUSICBRAINZ_URL: &str = "https://musicbrainz.org/ws/2/release";
const COVER_ART_URL: &str = "http://coverartarchive.org/release";
const USER_AGENT: &str = concat!("musicbox/", env!("CARGO_PKG_VERSION"), " ( https://github.com/musicbox-rs/musicbox )");

/// Looks for a conventional cover image in `album_dir` (relative to `root`).
/// Returns its path relative to `root`.
pub fn find_folder_art(root: &Path, album_dir: &str) -> Option<String> {
    FOLDER_ART_NAMES.iter().find_map(|name| {
        let relative = if album_dir.is_empty() {
            (*name).to_string()
        } else {
            format!("{album_dir}/{name}")
        };
        root.join(&relative).is_file().then_some(relative)
    })
}

/// Saves an embedded cover under [`ART_DIR`] as `<artist> - <album>.<ext>`,
/// with characters unsafe in file names replaced. Returns the path relative
/// to `root`.
pub fn store_embedded_art(root: &Path, artist: &str, album: &str, picture: &EmbeddedPicture) -> Result<String> {
    let dir = root.join(ART_DIR);
    fs::create_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;
    let file_name = format!(
        "{} - {}.{}",
        file_name_safe(artist),
        file_name_safe(album),
        picture.extension
    );
    let path = dir.join(&file_name);
    fs::write(&path, &picture.data).map_err(|e| IndexError::io(&path, e))?;
    Ok(format!("{ART_DIR}/{file_name}"))
}

fn file_name_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '(' | ')') { c } else { '_' })
        .collect()
}

/// External cover lookup. Returns the stored image path relative to the
/// library root, or `None` when no cover exists for the album.
pub trait ArtLookup: Send + Sync {
    fn lookup(&self, artist: &str, album: &str) -> Result<Option<String>>;
}

/// Lookup that never finds anything. Used when network lookups are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArt;

impl ArtLookup for NoArt {
    fn lookup(&self, _artist: &str, _album: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseSearch {
    #[serde(default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct Release {
    id: String,
}

/// Release search on MusicBrainz, then the front cover from the Cover Art
/// Archive, saved under [`ART_DIR`].
///
/// Every outgoing request waits until `min_interval` has passed since the
/// previous one, which keeps the lookup inside MusicBrainz's rate limit.
pub struct MusicBrainzArt {
    client: Client,
    root: PathBuf,
    search_url: String,
    cover_url: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl MusicBrainzArt {
    /// Must not be called from inside an async runtime: the blocking client
    /// owns its own runtime.
    pub fn new(library_root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_endpoints(library_root, MUSICBRAINZ_URL, COVER_ART_URL, Duration::from_secs(1))
    }

    pub fn with_endpoints(
        library_root: impl Into<PathBuf>,
        search_url: impl Into<String>,
        cover_url: impl Into<String>,
        min_interval: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IndexError::Art(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            root: library_root.into(),
            search_url: search_url.into(),
            cover_url: cover_url.into(),
            min_interval,
            last_request: Mutex::new(None),
        })
    }

    fn throttle(&self) {
        let mut last = self.last_request.lock();
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    fn find_release(&self, artist: &str, album: &str) -> Result<Option<String>> {
        self.throttle();
        let query = format!("artist:\"{}\" AND release:\"{}\"", escape(artist), escape(album));
        let response = self
            .client
            .get(&self.search_url)
            .query(&[("query", query.as_str()), ("fmt", "json"), ("limit", "1")])
            .send()
            .map_err(|e| IndexError::Art(format!("release search failed: {e}")))?;
        if !response.status().is_success() {
            return Err(IndexError::Art(format!(
                "release search returned HTTP {}",
                response.status()
            )));
        }
        let search: ReleaseSearch = response
            .json()
            .map_err(|e| IndexError::Art(format!("bad release search response: {e}")))?;
        Ok(search.releases.into_iter().next().map(|release| release.id))
    }

    fn download_front(&self, mbid: &str) -> Result<Option<String>> {
        self.throttle();
        let url = format!("{}/{}/front", self.cover_url, mbid);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| IndexError::Art(format!("cover download failed: {e}")))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(IndexError::Art(format!("cover download returned HTTP {}", response.status())));
        }

        let extension = match response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            Some("image/jpeg") => "jpg",
            Some("image/png") => "png",
            other => {
                return Err(IndexError::Art(format!(
                    "unsupported cover content type {}",
                    other.unwrap_or("<none>")
                )))
            }
        };
        let bytes = response
            .bytes()
            .map_err(|e| IndexError::Art(format!("cover download failed: {e}")))?;

        let dir = self.root.join(ART_DIR);
        fs::create_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;
        let file_name = format!("{mbid}.{extension}");
        let path = dir.join(&file_name);
        fs::write(&path, &bytes).map_err(|e| IndexError::io(&path, e))?;
        Ok(Some(format!("{ART_DIR}/{file_name}")))
    }
}

impl ArtLookup for MusicBrainzArt {
    fn lookup(&self, artist: &str, album: &str) -> Result<Option<String>> {
        let Some(mbid) = self.find_release(artist, album)? else {
            debug!(artist, album, "no release found");
            return Ok(None);
        };
        let stored = self.download_front(&mbid)?;
        match &stored {
            Some(path) => info!(artist, album, %mbid, path = %path, "downloaded cover"),
            None => debug!(artist, album, %mbid, "release has no front cover"),
        }
        Ok(stored)
    }
}

/// Escapes characters that carry meaning inside a quoted Lucene term.
fn escape(term: &str) -> String {
    term.replace('\\', "\\\\").replace('"', "\\\"")
}
