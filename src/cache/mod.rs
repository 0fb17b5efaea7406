//! Persistent mapping from source file identity to its last-seen content
//! digest and effective settings.
//!
//! The store is loaded once at run start, mutated in place while files are
//! processed, and serialized once at run end. Alongside the mapping it keeps
//! per-run bookkeeping: the set of entries not yet revisited this run. After
//! full enumeration the caller purges whatever is still unseen; those entries
//! belong to source files that disappeared since the last run.
//!
//! Concurrent runs against the same cache file are unsupported: there is no
//! cross-process locking, callers serialize access within one process.

pub mod record;

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::warn;

use crate::settings::SettingsBlob;

/// Last-seen state for one tracked source file.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Hex content digest at last successful processing.
    pub content_hash: String,
    /// Effective settings last used, compared by value.
    pub settings: SettingsBlob,
}

/// In-memory cache store with per-run unseen tracking.
#[derive(Debug, Default)]
pub struct CacheStore {
    /// Tracked entries, keyed by file id. Unique by construction.
    entries: BTreeMap<String, CacheEntry>,
    /// File ids loaded from disk and not yet revisited this run.
    unseen: HashSet<String>,
}

impl CacheStore {
    /// Creates an empty store (first run, nothing persisted yet).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the store from `path`.
    ///
    /// A missing or unreadable cache file is not an error: it yields an empty
    /// store and the run proceeds as a first run. Malformed individual lines
    /// are skipped with a warning so one corrupt record never discards the
    /// rest of the cache. Every loaded id starts out unseen.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Self::new();
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "cache file unreadable, starting empty");
                return Self::new();
            }
        };

        let mut store = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            match record::parse_line(line) {
                Ok(rec) => {
                    store.unseen.insert(rec.file_id.clone());
                    store.entries.insert(
                        rec.file_id,
                        CacheEntry {
                            content_hash: rec.content_hash,
                            settings: rec.settings,
                        },
                    );
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        %err,
                        "skipping malformed cache line"
                    );
                }
            }
        }
        store
    }

    /// Looks up the prior entry for a file id.
    #[must_use]
    pub fn get(&self, file_id: &str) -> Option<&CacheEntry> {
        self.entries.get(file_id)
    }

    /// Inserts or overwrites an entry and marks the id as seen.
    ///
    /// Fails only for file ids the on-disk format cannot represent (embedded
    /// double quote or line break); nothing is recorded in that case.
    pub fn set(&mut self, file_id: &str, content_hash: String, settings: SettingsBlob) -> Result<()> {
        record::validate_file_id(file_id)?;
        self.entries.insert(
            file_id.to_string(),
            CacheEntry {
                content_hash,
                settings,
            },
        );
        self.unseen.remove(file_id);
        Ok(())
    }

    /// Marks a file id as revisited this run without touching its entry.
    ///
    /// Used when a file was enumerated but its entry is deliberately left
    /// alone, e.g. the source turned out to be unreadable.
    pub fn mark_seen(&mut self, file_id: &str) {
        self.unseen.remove(file_id);
    }

    /// Removes every entry whose id was never revisited this run.
    ///
    /// Returns the removed ids (sorted) so the caller can delete their
    /// orphaned output artifacts, and clears the unseen set: a second call
    /// with nothing new loaded returns an empty list.
    pub fn purge_unseen(&mut self) -> Vec<String> {
        let mut removed: Vec<String> = self.unseen.drain().collect();
        removed.sort_unstable();
        for file_id in &removed {
            self.entries.remove(file_id);
        }
        removed
    }

    /// Serializes the full mapping to `path`, overwriting it.
    ///
    /// Entry order is deterministic (sorted by file id), so an unchanged
    /// store saves byte-identically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = String::new();
        for (file_id, entry) in &self.entries {
            text.push_str(&record::format_line(
                file_id,
                &entry.content_hash,
                &entry.settings,
            )?);
            text.push('\n');
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, text)
            .with_context(|| format!("failed to write cache file: {}", path.display()))
    }

    /// Number of tracked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store tracks no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File ids still unseen this run.
    #[must_use]
    pub fn unseen_count(&self) -> usize {
        self.unseen.len()
    }
}
