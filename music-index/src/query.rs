//! Read-only listings and search over one snapshot.

use serde::Serialize;

use crate::error::{IndexError, Result};
use crate::model::{Album, Artist, Index};

/// Default cap on search results.
pub const MAX_SEARCH_RESULTS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Folder,
    Artist,
    Album,
    /// An album introducing the songs listed after it.
    AlbumHeader,
    Song,
}

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
    /// `kind/path` of the listing this entry opens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub artist: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub album: String,
    /// Cover image, relative to the library root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Audio file, relative to the library root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_id: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
}

impl Entry {
    fn folder(name: &str, link: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: EntryKind::Folder,
            link: Some(link.to_string()),
            artist: String::new(),
            album: String::new(),
            image: None,
            audio: None,
            song_id: None,
            track: None,
            duration_secs: None,
        }
    }

    fn artist(artist: &Artist) -> Self {
        Self {
            name: artist.name.clone(),
            kind: EntryKind::Artist,
            link: Some(format!("artists/{}", artist.name)),
            artist: artist.name.clone(),
            ..Self::folder("", "")
        }
    }

    fn album(album: &Album, header: bool) -> Self {
        Self {
            name: album.name.clone(),
            kind: if header { EntryKind::AlbumHeader } else { EntryKind::Album },
            link: Some(format!("albums/{}", album.name)),
            artist: album.artist.clone(),
            album: album.name.clone(),
            image: album.art.clone(),
            ..Self::folder("", "")
        }
    }

    fn song(index: &Index, album: &Album, song_id: usize) -> Self {
        let song = &index.songs()[song_id];
        Self {
            name: song.title.clone(),
            kind: EntryKind::Song,
            link: None,
            artist: song.artist.clone(),
            album: song.album.clone(),
            image: album.art.clone(),
            audio: Some(song.path.clone()),
            song_id: Some(song_id),
            track: (song.track > 0).then_some(song.track),
            duration_secs: (song.duration_secs > 0).then_some(song.duration_secs),
        }
    }
}

impl Index {
    /// Lists entries of one kind.
    ///
    /// | kind | path | result |
    /// |---|---|---|
    /// | `""` | ignored | the `Artists`, `Albums` and `Songs` folders |
    /// | `artists` | `""` | every artist |
    /// | `artists` | name | that artist's albums, each followed by its songs |
    /// | `albums` | `""` | every album |
    /// | `albums` | name | the album followed by its songs |
    /// | `songs` | ignored | every song |
    pub fn query(&self, kind: &str, path: &str) -> Result<Vec<Entry>> {
        match (kind, path) {
            ("", _) => Ok(vec![
                Entry::folder("Artists", "artists"),
                Entry::folder("Albums", "albums"),
                Entry::folder("Songs", "songs"),
            ]),
            ("artists", "") => Ok(self.artists().iter().map(Entry::artist).collect()),
            ("artists", name) => {
                let artist = self
                    .artist_named(name)
                    .ok_or_else(|| IndexError::not_found("artist", name))?;
                Ok(self
                    .artist_albums(artist)
                    .iter()
                    .flat_map(|album| self.album_listing(album))
                    .collect())
            }
            ("albums", "") => Ok(self.albums().iter().map(|a| Entry::album(a, false)).collect()),
            ("albums", name) => {
                let album = self
                    .album_named(name)
                    .ok_or_else(|| IndexError::not_found("album", name))?;
                Ok(self.album_listing(album))
            }
            ("songs", _) => Ok(self
                .albums()
                .iter()
                .flat_map(|album| (album.start..album.end).map(move |id| Entry::song(self, album, id)))
                .collect()),
            (other, _) => Err(IndexError::not_found("listing", other)),
        }
    }

    /// [`Index::query`] with kind and path joined as `kind/path`.
    pub fn query_path(&self, link: &str) -> Result<Vec<Entry>> {
        let link = link.trim_matches('/');
        match link.split_once('/') {
            Some((kind, path)) => self.query(kind, path),
            None => self.query(link, ""),
        }
    }

    fn album_listing(&self, album: &Album) -> Vec<Entry> {
        std::iter::once(Entry::album(album, true))
            .chain((album.start..album.end).map(|id| Entry::song(self, album, id)))
            .collect()
    }

    /// Case-insensitive substring search over artist names, album names and
    /// song titles, in that order, returning at most `limit` entries. A blank
    /// term matches nothing.
    pub fn search(&self, term: &str, limit: usize) -> Vec<Entry> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let hit = |text: &str| text.to_lowercase().contains(&needle);

        let artists = self
            .artists()
            .iter()
            .filter(|artist| hit(&artist.name))
            .map(Entry::artist);
        let albums = self
            .albums()
            .iter()
            .filter(|album| hit(&album.name))
            .map(|album| Entry::album(album, false));
        let songs = self
            .songs()
            .iter()
            .enumerate()
            .filter(|(_, song)| hit(&song.title))
            .filter_map(|(id, _)| {
                let album = &self.albums()[self.album_of_song(id)?];
                Some(Entry::song(self, album, id))
            });

        artists.chain(albums).chain(songs).take(limit).collect()
    }
}
