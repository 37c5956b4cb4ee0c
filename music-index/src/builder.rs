//! Index builder: walk, reconcile with the previous snapshot, extract what
//! is missing, then sort and partition.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use crossbeam::channel;
use tracing::{debug, info, warn};

use crate::art::{find_folder_art, store_embedded_art, ArtLookup};
use crate::error::Result;
use crate::metadata::{apply_path_fallbacks, MetadataProbe, TagData};
use crate::model::{Album, Artist, Index, Song};
use crate::scan::{self, DirectoryPass};

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Extraction worker count. Defaults to the available parallelism.
    pub workers: usize,
    /// Probe album directories for folder images.
    pub folder_art: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            folder_art: true,
        }
    }
}

/// Counters for one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Audio files found on disk.
    pub discovered: usize,
    /// Songs whose metadata was taken from the previous index.
    pub reused: usize,
    /// Songs probed successfully.
    pub extracted: usize,
    /// Songs whose probe failed. They are indexed from path fallbacks only.
    pub failed: usize,
    /// Albums whose art state was taken from the previous index.
    pub albums_reused: usize,
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub index: Index,
    pub stats: BuildStats,
}

pub struct IndexBuilder {
    root: PathBuf,
    probe: Arc<dyn MetadataProbe>,
    art: Arc<dyn ArtLookup>,
    options: BuildOptions,
}

/// Where a file was found: its pass and its 1-based position there.
#[derive(Debug, Clone, Copy)]
struct Slot {
    pass: usize,
    position: usize,
}

/// A file that needs probing.
struct Job {
    slot: Slot,
    path: String,
}

impl IndexBuilder {
    pub fn new(
        root: impl Into<PathBuf>,
        probe: Arc<dyn MetadataProbe>,
        art: Arc<dyn ArtLookup>,
        options: BuildOptions,
    ) -> Self {
        Self {
            root: root.into(),
            probe,
            art,
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds a fresh snapshot, reusing resolved songs and album art state
    /// from `previous`.
    ///
    /// Only an unreadable library root fails the build. Individual probe
    /// failures are logged and the song is indexed from its path.
    pub fn build(&self, previous: Option<&Index>) -> Result<BuildOutcome> {
        let started = Instant::now();
        let passes = scan::discover(&self.root)?;
        let mut stats = BuildStats {
            discovered: passes.iter().map(|p| p.files.len()).sum(),
            ..BuildStats::default()
        };

        let known: HashMap<&str, &Song> = previous
            .map(|index| {
                index
                    .songs()
                    .iter()
                    .filter(|song| song.resolved)
                    .map(|song| (song.path.as_str(), song))
                    .collect()
            })
            .unwrap_or_default();

        let mut songs = Vec::with_capacity(stats.discovered);
        let mut slots = Vec::with_capacity(stats.discovered);
        let mut jobs = Vec::new();
        for (pass_idx, pass) in passes.iter().enumerate() {
            for (offset, path) in pass.files.iter().enumerate() {
                let slot = Slot {
                    pass: pass_idx,
                    position: offset + 1,
                };
                match known.get(path.as_str()) {
                    Some(song) => {
                        songs.push((*song).clone());
                        slots.push(slot);
                    }
                    None => jobs.push(Job {
                        slot,
                        path: path.clone(),
                    }),
                }
            }
        }
        stats.reused = songs.len();

        let probed = self.extract(&jobs);
        for (job, song) in jobs.iter().zip(self.resolve(&jobs, probed, &mut stats)) {
            songs.push(song);
            slots.push(job.slot);
        }
        apply_position_defaults(&mut songs, &slots, &passes);

        songs.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let (albums, artists) = self.partition(&songs, previous, &mut stats);

        info!(
            songs = songs.len(),
            albums = albums.len(),
            artists = artists.len(),
            reused = stats.reused,
            extracted = stats.extracted,
            failed = stats.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index built"
        );
        Ok(BuildOutcome {
            index: Index::new(songs, albums, artists, Some(Utc::now())),
            stats,
        })
    }

    /// Probes every job on a bounded worker pool. Results line up with `jobs`.
    fn extract(&self, jobs: &[Job]) -> Vec<Result<TagData>> {
        if jobs.is_empty() {
            return Vec::new();
        }
        let workers = self.options.workers.clamp(1, jobs.len());
        debug!(files = jobs.len(), workers, "extracting metadata");

        let (job_tx, job_rx) = channel::unbounded::<(usize, &Job)>();
        let (result_tx, result_rx) = channel::unbounded::<(usize, Result<TagData>)>();
        for item in jobs.iter().enumerate() {
            // The receiver outlives this loop.
            let _ = job_tx.send(item);
        }
        drop(job_tx);

        let done = AtomicUsize::new(0);
        let total = jobs.len();
        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let done = &done;
                scope.spawn(move || {
                    for (idx, job) in job_rx.iter() {
                        let result = self.probe.probe(&self.root.join(&job.path));
                        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                        if finished % 500 == 0 {
                            debug!(finished, total, "extraction progress");
                        }
                        if result_tx.send((idx, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut results: Vec<Option<Result<TagData>>> = (0..total).map(|_| None).collect();
        for (idx, result) in result_rx.iter() {
            results[idx] = Some(result);
        }
        results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Ok(TagData::default())))
            .collect()
    }

    /// Turns probe results into songs, applying the path fallbacks. Track
    /// fields missing from the tags are left at zero for
    /// [`apply_position_defaults`].
    fn resolve(&self, jobs: &[Job], probed: Vec<Result<TagData>>, stats: &mut BuildStats) -> Vec<Song> {
        jobs.iter()
            .zip(probed)
            .map(|(job, result)| {
                let resolved = result.is_ok();
                let tags = match result {
                    Ok(tags) => {
                        stats.extracted += 1;
                        tags
                    }
                    Err(e) => {
                        stats.failed += 1;
                        warn!(path = %job.path, error = %e, "metadata extraction failed");
                        TagData::default()
                    }
                };

                let mut song = Song {
                    path: job.path.clone(),
                    title: tags.title.unwrap_or_default(),
                    artist: tags.artist.unwrap_or_default(),
                    album: tags.album.unwrap_or_default(),
                    track: tags.track.unwrap_or_default(),
                    track_tagged: tags.track.is_some(),
                    track_total: tags.track_total.unwrap_or_default(),
                    track_total_tagged: tags.track_total.is_some(),
                    year: tags.year.unwrap_or_default(),
                    duration_secs: tags.duration_secs.unwrap_or_default(),
                    resolved,
                };
                apply_path_fallbacks(&mut song);
                song
            })
            .collect()
    }

    /// Splits sorted songs into album and artist ranges and carries album art
    /// state over from `previous`.
    fn partition(
        &self,
        songs: &[Song],
        previous: Option<&Index>,
        stats: &mut BuildStats,
    ) -> (Vec<Album>, Vec<Artist>) {
        let known: HashMap<(&str, &str), &Album> = previous
            .map(|index| {
                index
                    .albums()
                    .iter()
                    .map(|album| ((album.artist.as_str(), album.name.as_str()), album))
                    .collect()
            })
            .unwrap_or_default();

        let mut albums: Vec<Album> = Vec::new();
        for (idx, song) in songs.iter().enumerate() {
            match albums.last_mut() {
                Some(album) if album.artist == song.artist && album.name == song.album => {
                    album.end = idx + 1;
                }
                _ => albums.push(Album {
                    name: song.album.clone(),
                    artist: song.artist.clone(),
                    start: idx,
                    end: idx + 1,
                    art: None,
                    art_checked: false,
                }),
            }
        }

        for album in &mut albums {
            if let Some(old) = known.get(&(album.artist.as_str(), album.name.as_str())) {
                album.art = old
                    .art
                    .clone()
                    .filter(|art| self.root.join(art).is_file());
                album.art_checked = old.art_checked;
                stats.albums_reused += 1;
            }
            if album.art.is_none() && self.options.folder_art {
                let first = &songs[album.start].path;
                let dir = first.rfind('/').map(|i| &first[..i]).unwrap_or("");
                album.art = find_folder_art(&self.root, dir);
            }
        }

        let mut artists: Vec<Artist> = Vec::new();
        for (idx, album) in albums.iter().enumerate() {
            match artists.last_mut() {
                Some(artist) if artist.name == album.artist => artist.end = idx + 1,
                _ => artists.push(Artist {
                    name: album.artist.clone(),
                    start: idx,
                    end: idx + 1,
                }),
            }
        }

        (albums, artists)
    }

    /// Runs the external art lookup for albums that have no cover and were
    /// never looked up. Returns the updated snapshot and the number of covers
    /// found, or `None` when no album needed a lookup.
    ///
    /// Albums are handled one at a time. A cover embedded in the album's
    /// first song wins over the external lookup. A failed lookup is logged
    /// and the album stays unchecked so the next scan tries again.
    pub fn resolve_missing_art(&self, index: &Index) -> Option<(Index, usize)> {
        let pending: Vec<usize> = index
            .albums()
            .iter()
            .enumerate()
            .filter(|(_, album)| album.art.is_none() && !album.art_checked)
            .map(|(idx, _)| idx)
            .collect();
        if pending.is_empty() {
            return None;
        }

        info!(albums = pending.len(), "looking up missing album art");
        let mut albums = index.albums().to_vec();
        let mut found = 0;
        for idx in pending {
            let album = &mut albums[idx];
            if album.name.is_empty() {
                album.art_checked = true;
                continue;
            }
            if let Some(art) = self.embedded_art(&index.songs()[album.start], album) {
                found += 1;
                album.art = Some(art);
                album.art_checked = true;
                continue;
            }
            match self.art.lookup(&album.artist, &album.name) {
                Ok(art) => {
                    found += usize::from(art.is_some());
                    album.art = art;
                    album.art_checked = true;
                }
                Err(e) => {
                    warn!(artist = %album.artist, album = %album.name, error = %e, "art lookup failed");
                }
            }
        }
        info!(found, "album art lookup complete");

        let updated = Index::new(
            index.songs().to_vec(),
            albums,
            index.artists().to_vec(),
            index.scanned_at(),
        );
        Some((updated, found))
    }

    fn embedded_art(&self, song: &Song, album: &Album) -> Option<String> {
        let picture = match self.probe.picture(&self.root.join(&song.path)) {
            Ok(Some(picture)) => picture,
            Ok(None) => return None,
            Err(e) => {
                debug!(path = %song.path, error = %e, "could not read embedded picture");
                return None;
            }
        };
        match store_embedded_art(&self.root, &album.artist, &album.name, &picture) {
            Ok(path) => {
                debug!(artist = %album.artist, album = %album.name, path = %path, "stored embedded cover");
                Some(path)
            }
            Err(e) => {
                warn!(artist = %album.artist, album = %album.name, error = %e, "could not store embedded cover");
                None
            }
        }
    }
}

/// Fills untagged track fields from the current directory layout, for
/// reused and probed songs alike, so the result does not depend on what an
/// earlier scan saw. `songs` and `slots` line up.
///
/// A song without a track tag takes its discovery position, unless any file
/// in its directory has a track tag, in which case it stays 0. A missing
/// track total becomes the directory's file count.
fn apply_position_defaults(songs: &mut [Song], slots: &[Slot], passes: &[DirectoryPass]) {
    let mut tagged_tracks = vec![false; passes.len()];
    for (song, slot) in songs.iter().zip(slots) {
        if song.track_tagged {
            tagged_tracks[slot.pass] = true;
        }
    }

    for (song, slot) in songs.iter_mut().zip(slots) {
        if !song.track_tagged {
            song.track = if tagged_tracks[slot.pass] { 0 } else { slot.position as u32 };
        }
        if !song.track_total_tagged {
            song.track_total = passes[slot.pass].files.len() as u32;
        }
    }
}
