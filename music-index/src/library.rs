//! The live snapshot and the scan pass that replaces it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::builder::{BuildStats, IndexBuilder};
use crate::error::Result;
use crate::model::Index;
use crate::store;

/// Owns the current [`Index`]. Readers clone the `Arc` and never hold the
/// lock while they work; a scan builds the next snapshot off to the side and
/// swaps it in.
pub struct Library {
    builder: IndexBuilder,
    index_file: PathBuf,
    current: RwLock<Arc<Index>>,
}

impl Library {
    /// Starts from the persisted index at `index_file` when one can be read,
    /// otherwise from an empty snapshot.
    pub fn open(builder: IndexBuilder, index_file: impl Into<PathBuf>) -> Self {
        let index_file = index_file.into();
        let initial = match store::load(&index_file) {
            Ok(Some(index)) => {
                info!(path = %index_file.display(), songs = index.songs().len(), "loaded persisted index");
                index
            }
            Ok(None) => Index::empty(),
            Err(e) => {
                warn!(path = %index_file.display(), error = %e, "ignoring unreadable persisted index");
                Index::empty()
            }
        };
        Self {
            builder,
            index_file,
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn root(&self) -> &Path {
        self.builder.root()
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    pub fn snapshot(&self) -> Arc<Index> {
        Arc::clone(&self.current.read())
    }

    /// Makes `index` the live snapshot. Readers holding the old one keep it
    /// until they drop it.
    pub fn publish(&self, index: Index) -> Arc<Index> {
        let index = Arc::new(index);
        *self.current.write() = Arc::clone(&index);
        index
    }

    /// One full scan pass: build against the previous index, publish, fill in
    /// missing album art, persist.
    ///
    /// Fails only when the library root cannot be walked. Persistence errors
    /// are logged; the published snapshot stays authoritative.
    pub fn rescan(&self) -> Result<BuildStats> {
        let previous = match store::load(&self.index_file) {
            Ok(Some(index)) => Arc::new(index),
            Ok(None) => self.snapshot(),
            Err(e) => {
                warn!(path = %self.index_file.display(), error = %e, "persisted index unusable, reconciling against memory");
                self.snapshot()
            }
        };
        let previous = (!previous.is_empty()).then_some(previous);

        let outcome = self.builder.build(previous.as_deref())?;
        let mut published = self.publish(outcome.index);

        if let Some((with_art, _found)) = self.builder.resolve_missing_art(&published) {
            published = self.publish(with_art);
        }

        if let Err(e) = store::save(&self.index_file, &published) {
            error!(path = %self.index_file.display(), error = %e, "failed to persist index");
        }
        Ok(outcome.stats)
    }
}
