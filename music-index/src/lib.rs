//! Music library index.
//!
//! A scan walks the library, reads tags with a [`MetadataProbe`], and
//! produces an immutable [`Index`] of songs grouped into album and artist
//! ranges. [`Library`] holds the live snapshot and swaps in a new one after
//! every scan:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use music_index::{BuildOptions, IndexBuilder, Library, LoftyProbe, NoArt};
//!
//! let builder = IndexBuilder::new("/music", Arc::new(LoftyProbe), Arc::new(NoArt), BuildOptions::default());
//! let library = Library::open(builder, "/music/.musicbox-index.json");
//! library.rescan()?;
//!
//! let albums = library.snapshot().query("albums", "")?;
//! ```
//!
//! Re-scans reuse every song whose path was already resolved in the previous
//! index, so only new or previously unreadable files are probed again.

pub mod art;
pub mod builder;
pub mod error;
pub mod library;
pub mod metadata;
pub mod model;
pub mod query;
pub mod scan;
pub mod store;

pub use art::{find_folder_art, store_embedded_art, ArtLookup, MusicBrainzArt, NoArt, ART_DIR};
pub use builder::{BuildOptions, BuildOutcome, BuildStats, IndexBuilder};
pub use error::{IndexError, Result};
pub use library::Library;
pub use metadata::{parse_title_from_filename, EmbeddedPicture, LoftyProbe, MetadataProbe, TagData};
pub use model::{Album, Artist, Index, Song};
pub use query::{Entry, EntryKind, MAX_SEARCH_RESULTS};
