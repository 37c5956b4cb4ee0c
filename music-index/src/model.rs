//! Index snapshot types.
//!
//! Songs are kept sorted by (artist, album, track, path). Albums are
//! contiguous half-open ranges over the songs and artists are contiguous
//! ranges over the albums, so every song belongs to exactly one album and
//! every album to exactly one artist.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Path relative to the library root, `/`-separated. Stable identity.
    pub path: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub track: u32,
    /// `track` came from a tag rather than discovery order.
    pub track_tagged: bool,
    pub track_total: u32,
    /// `track_total` came from a tag rather than the directory's file count.
    pub track_total_tagged: bool,
    pub year: u32,
    pub duration_secs: u64,
    /// Tags were read successfully. Unresolved songs are probed again on the
    /// next scan.
    pub resolved: bool,
}

impl Song {
    /// Sort key: text fields compare bytewise, path breaks ties.
    pub(crate) fn sort_key(&self) -> (&str, &str, u32, &str) {
        (&self.artist, &self.album, self.track, &self.path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    pub artist: String,
    pub start: usize,
    pub end: usize,
    /// Cover image, relative to the library root.
    pub art: Option<String>,
    /// External art lookup has been attempted for this album.
    pub art_checked: bool,
}

impl Album {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// Immutable library snapshot.
#[derive(Debug, Clone, Default)]
pub struct Index {
    songs: Vec<Song>,
    albums: Vec<Album>,
    artists: Vec<Artist>,
    scanned_at: Option<DateTime<Utc>>,
    album_ids: HashMap<String, usize>,
}

impl Index {
    /// Assembles a snapshot from already partitioned parts.
    pub(crate) fn new(
        songs: Vec<Song>,
        albums: Vec<Album>,
        artists: Vec<Artist>,
        scanned_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut album_ids = HashMap::with_capacity(albums.len());
        for (idx, album) in albums.iter().enumerate() {
            // First album in sort order wins a name collision.
            album_ids.entry(album.name.clone()).or_insert(idx);
        }
        Self {
            songs,
            albums,
            artists,
            scanned_at,
            album_ids,
        }
    }

    /// Assembles a snapshot from untrusted parts, checking the partition
    /// invariants.
    pub fn from_parts(
        songs: Vec<Song>,
        albums: Vec<Album>,
        artists: Vec<Artist>,
        scanned_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        check_partition(&songs, &albums, &artists)?;
        Ok(Self::new(songs, albums, artists, scanned_at))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    pub fn artists(&self) -> &[Artist] {
        &self.artists
    }

    pub fn scanned_at(&self) -> Option<DateTime<Utc>> {
        self.scanned_at
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn album_named(&self, name: &str) -> Option<&Album> {
        self.album_ids.get(name).map(|&idx| &self.albums[idx])
    }

    pub fn artist_named(&self, name: &str) -> Option<&Artist> {
        self.artists.iter().find(|artist| artist.name == name)
    }

    pub fn album_songs(&self, album: &Album) -> &[Song] {
        &self.songs[album.start..album.end]
    }

    pub fn artist_albums(&self, artist: &Artist) -> &[Album] {
        &self.albums[artist.start..artist.end]
    }

    /// Index of the album whose range holds song `song_idx`.
    pub fn album_of_song(&self, song_idx: usize) -> Option<usize> {
        let idx = self.albums.partition_point(|album| album.end <= song_idx);
        (idx < self.albums.len() && self.albums[idx].start <= song_idx).then_some(idx)
    }
}

fn check_partition(songs: &[Song], albums: &[Album], artists: &[Artist]) -> Result<()> {
    let broken = |msg: String| Err(IndexError::Persist(msg));

    let mut next = 0;
    for album in albums {
        if album.start != next || album.end <= album.start || album.end > songs.len() {
            return broken(format!(
                "album '{}' range {}..{} does not continue at {}",
                album.name, album.start, album.end, next
            ));
        }
        if let Some(song) = songs[album.start..album.end]
            .iter()
            .find(|song| song.artist != album.artist || song.album != album.name)
        {
            return broken(format!("song '{}' is outside its album range", song.path));
        }
        next = album.end;
    }
    if next != songs.len() {
        return broken(format!("{} songs are not covered by any album", songs.len() - next));
    }

    let mut next = 0;
    for artist in artists {
        if artist.start != next || artist.end <= artist.start || artist.end > albums.len() {
            return broken(format!(
                "artist '{}' range {}..{} does not continue at {}",
                artist.name, artist.start, artist.end, next
            ));
        }
        if albums[artist.start..artist.end]
            .iter()
            .any(|album| album.artist != artist.name)
        {
            return broken(format!("artist '{}' owns a foreign album", artist.name));
        }
        next = artist.end;
    }
    if next != albums.len() {
        return broken(format!("{} albums are not covered by any artist", albums.len() - next));
    }

    Ok(())
}
