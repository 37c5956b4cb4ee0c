//! Per-file tag extraction and the directory-name fallbacks applied when a
//! tag is missing.

use std::path::Path;

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag};

use crate::error::{IndexError, Result};
use crate::model::Song;

/// Raw tag values for one file. Absent or blank tags are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagData {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<u32>,
    pub track_total: Option<u32>,
    pub year: Option<u32>,
    pub duration_secs: Option<u64>,
}

/// Cover image embedded in an audio file's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedPicture {
    pub data: Vec<u8>,
    /// File extension matching the image's MIME type, e.g. `jpg`.
    pub extension: &'static str,
}

/// Reads tags from one audio file. Implementations must be callable from
/// several extraction workers at once.
pub trait MetadataProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<TagData>;

    /// The file's embedded cover: the front cover if one is tagged as such,
    /// otherwise the first picture.
    fn picture(&self, _path: &Path) -> Result<Option<EmbeddedPicture>> {
        Ok(None)
    }
}

/// Tag reader backed by `lofty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyProbe;

impl MetadataProbe for LoftyProbe {
    fn probe(&self, path: &Path) -> Result<TagData> {
        let tagged_file = read_from_path(path).map_err(|e| IndexError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let primary_tag = tagged_file.primary_tag();
        let tags = tagged_file.tags();

        // Album artist groups compilations and multi-artist albums under one
        // name; the track artist is the fallback.
        let artist = first_non_empty(primary_tag, tags, |tag| {
            tag.get_string(ItemKey::AlbumArtist).map(str::to_string)
        })
        .or_else(|| first_non_empty(primary_tag, tags, |tag| tag.artist().map(|v| v.into_owned())));

        let year = first_non_empty(primary_tag, tags, |tag| {
            tag.get_string(ItemKey::Year)
                .or_else(|| tag.get_string(ItemKey::RecordingDate))
                .map(str::to_string)
        })
        .and_then(|date| parse_year(&date));

        let duration = tagged_file.properties().duration();

        Ok(TagData {
            title: first_non_empty(primary_tag, tags, |tag| tag.title().map(|v| v.into_owned())),
            artist,
            album: first_non_empty(primary_tag, tags, |tag| tag.album().map(|v| v.into_owned())),
            track: first_number(primary_tag, tags, |tag| tag.track()),
            track_total: first_number(primary_tag, tags, |tag| tag.track_total()),
            year,
            duration_secs: (!duration.is_zero()).then(|| duration.as_secs()),
        })
    }

    fn picture(&self, path: &Path) -> Result<Option<EmbeddedPicture>> {
        let tagged_file = read_from_path(path).map_err(|e| IndexError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let pictures: Vec<&Picture> = tagged_file
            .primary_tag()
            .into_iter()
            .chain(tagged_file.tags().iter())
            .flat_map(|tag| tag.pictures().iter())
            .filter(|picture| !picture.data().is_empty())
            .collect();

        let cover = pictures
            .iter()
            .find(|picture| picture.pic_type() == PictureType::CoverFront)
            .or_else(|| pictures.first());
        Ok(cover.and_then(|picture| {
            let extension = picture.mime_type().and_then(image_extension)?;
            Some(EmbeddedPicture {
                data: picture.data().to_vec(),
                extension,
            })
        }))
    }
}

fn image_extension(mime_type: &MimeType) -> Option<&'static str> {
    match mime_type {
        MimeType::Jpeg => Some("jpg"),
        MimeType::Png => Some("png"),
        MimeType::Gif => Some("gif"),
        MimeType::Bmp => Some("bmp"),
        _ => None,
    }
}

fn first_non_empty<F>(primary_tag: Option<&Tag>, tags: &[Tag], extractor: F) -> Option<String>
where
    F: FnMut(&Tag) -> Option<String>,
{
    primary_tag
        .into_iter()
        .chain(tags.iter())
        .filter_map(extractor)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn first_number<F>(primary_tag: Option<&Tag>, tags: &[Tag], extractor: F) -> Option<u32>
where
    F: FnMut(&Tag) -> Option<u32>,
{
    primary_tag
        .into_iter()
        .chain(tags.iter())
        .filter_map(extractor)
        .find(|&value| value > 0)
}

/// Leading four-digit year of a date tag such as `1997` or `1997-05-21`.
fn parse_year(date: &str) -> Option<u32> {
    let year = date.trim().get(..4)?;
    if year.bytes().all(|b| b.is_ascii_digit()) {
        year.parse().ok().filter(|&y| y > 0)
    } else {
        None
    }
}

/// Title from a file name: extension dropped, then a leading `NN ` track
/// prefix stripped.
pub fn parse_title_from_filename(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let bytes = stem.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_digit() && bytes[1].is_ascii_digit() && bytes[2] == b' ' {
        stem[3..].to_string()
    } else {
        stem.to_string()
    }
}

/// Fills empty artist, album and title from the song's relative path.
///
/// Artist comes from the grandparent directory, or from the parent when the
/// path only has two segments. Album comes from the parent directory. A song
/// at the library root gets neither.
pub fn apply_path_fallbacks(song: &mut Song) {
    let segments: Vec<&str> = song.path.split('/').filter(|s| !s.is_empty()).collect();
    let n = segments.len();

    if song.artist.is_empty() {
        if n >= 3 {
            song.artist = segments[n - 3].to_string();
        } else if n == 2 {
            song.artist = segments[0].to_string();
        }
    }
    if song.album.is_empty() && n >= 2 {
        song.album = segments[n - 2].to_string();
    }
    if song.title.is_empty() {
        if let Some(file_name) = segments.last() {
            song.title = parse_title_from_filename(file_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("01 Song1.mp3", "Song1")]
    #[case("12 Long Title.m4a", "Long Title")]
    #[case("Song3.mp3", "Song3")]
    #[case("1 Short.mp3", "1 Short")]
    #[case("123 Numbers.mp3", "123 Numbers")]
    #[case("07-Dash.flac", "07-Dash")]
    #[case("no_extension", "no_extension")]
    fn title_from_filename(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(parse_title_from_filename(name), expected);
    }

    #[rstest]
    #[case("1997", Some(1997))]
    #[case("1997-05-21", Some(1997))]
    #[case(" 2001 ", Some(2001))]
    #[case("97", None)]
    #[case("unknown", None)]
    #[case("0000", None)]
    fn year_from_date(#[case] raw: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_year(raw), expected);
    }

    fn untagged(path: &str) -> Song {
        Song {
            path: path.into(),
            ..Song::default()
        }
    }

    #[test]
    fn fallbacks_from_three_segments() {
        let mut song = untagged("Artist A/AlbumX/01 Song1.mp3");
        apply_path_fallbacks(&mut song);
        assert_eq!(song.artist, "Artist A");
        assert_eq!(song.album, "AlbumX");
        assert_eq!(song.title, "Song1");
    }

    #[test]
    fn fallbacks_use_grandparent_for_deep_paths() {
        let mut song = untagged("Rock/Artist/Album/02 Track.mp3");
        apply_path_fallbacks(&mut song);
        assert_eq!(song.artist, "Artist");
        assert_eq!(song.album, "Album");
    }

    #[test]
    fn fallbacks_with_two_segments_use_parent_for_both() {
        let mut song = untagged("Mixtape/Song.mp3");
        apply_path_fallbacks(&mut song);
        assert_eq!(song.artist, "Mixtape");
        assert_eq!(song.album, "Mixtape");
        assert_eq!(song.title, "Song");
    }

    #[test]
    fn fallbacks_at_root_leave_fields_empty() {
        let mut song = untagged("Loose.mp3");
        apply_path_fallbacks(&mut song);
        assert_eq!(song.artist, "");
        assert_eq!(song.album, "");
        assert_eq!(song.title, "Loose");
    }

    #[test]
    fn fallbacks_keep_tagged_values() {
        let mut song = Song {
            path: "Dir/Sub/03 File.mp3".into(),
            title: "Real Title".into(),
            artist: "Real Artist".into(),
            ..Song::default()
        };
        apply_path_fallbacks(&mut song);
        assert_eq!(song.title, "Real Title");
        assert_eq!(song.artist, "Real Artist");
        assert_eq!(song.album, "Sub");
    }
}
