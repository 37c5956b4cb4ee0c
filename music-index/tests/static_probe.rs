//! Test doubles for the scan collaborators: a tag table instead of real
//! audio files, and an art lookup that records what it was asked for.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use music_index::{ArtLookup, IndexError, MetadataProbe, Result, TagData};

/// Answers probes from a table keyed by library-relative path. Unknown
/// files have no tags; files marked broken fail.
#[derive(Default)]
pub struct StaticProbe {
    tags: HashMap<String, TagData>,
    broken: Vec<String>,
    calls: AtomicU32,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, relative: &str, tags: TagData) -> Self {
        self.tags.insert(relative.to_string(), tags);
        self
    }

    pub fn broken(mut self, relative: &str) -> Self {
        self.broken.push(relative.to_string());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataProbe for StaticProbe {
    fn probe(&self, path: &Path) -> Result<TagData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.iter().any(|b| path.ends_with(b)) {
            return Err(IndexError::Metadata {
                path: path.to_path_buf(),
                reason: "unsupported container".into(),
            });
        }
        Ok(self
            .tags
            .iter()
            .find(|(relative, _)| path.ends_with(relative.as_str()))
            .map(|(_, tags)| tags.clone())
            .unwrap_or_default())
    }
}

pub fn tagged(title: &str, artist: &str, album: &str, track: u32) -> TagData {
    TagData {
        title: Some(title.into()),
        artist: Some(artist.into()),
        album: Some(album.into()),
        track: Some(track),
        ..TagData::default()
    }
}

/// Records lookups; answers with a fixed path or a failure.
pub struct RecordingArt {
    answer: Option<String>,
    fail: bool,
    asked: Mutex<Vec<(String, String)>>,
}

impl RecordingArt {
    pub fn finding(path: &str) -> Self {
        Self {
            answer: Some(path.to_string()),
            fail: false,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            fail: true,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<(String, String)> {
        self.asked.lock().unwrap().clone()
    }
}

impl ArtLookup for RecordingArt {
    fn lookup(&self, artist: &str, album: &str) -> Result<Option<String>> {
        self.asked
            .lock()
            .unwrap()
            .push((artist.to_string(), album.to_string()));
        if self.fail {
            return Err(IndexError::Art("service unavailable".into()));
        }
        Ok(self.answer.clone())
    }
}
