#![warn(missing_docs)]

//! # ave - Incremental Audio/Video Transcoding
//!
//! `ave` drives an ffmpeg-based transcoding pipeline incrementally: it
//! fingerprints each source file's content and effective encode settings,
//! compares them against a persisted cache, and re-encodes only the output
//! variants that are actually stale. Sources that disappear between runs are
//! purged from the cache and their orphaned outputs deleted.
//!
//! ## Architecture
//!
//! - [`config`]: project file parsing (`ave.toml`)
//! - [`settings`]: layered settings merge and the field-to-variant schema
//! - [`cache`]: the persisted content/settings cache with unseen tracking
//! - [`detect`]: the per-file, per-variant staleness decision
//! - [`encoder`]: the external ffmpeg boundary
//! - [`pipeline`]: per-run orchestration (parallel hashing, encoding, purge)
//! - [`variant`]: output variant definitions
//! - [`output`]: user-facing reporting
//! - [`utils`]: content hashing and path helpers
//!
//! ## Staleness model
//!
//! A variant is re-encoded when the source content digest changed, when a
//! settings field affecting that variant changed, or when its output
//! artifact is missing on disk. The cache entry is committed *before* the
//! encoder runs: a crashed or failed encode leaves no artifact, so the
//! existence check retries it next run without re-deciding from scratch.
//!
//! Concurrent runs against the same cache file are unsupported; the cache
//! has no cross-process locking.

/// Persisted cache store and its line-oriented on-disk codec.
pub mod cache;

/// Project configuration parsing.
pub mod config;

/// Per-file, per-variant staleness decision.
pub mod detect;

/// External encoder boundary (ffmpeg shell-out).
pub mod encoder;

/// User-facing output formatting and verbosity control.
pub mod output;

/// Per-run orchestration.
pub mod pipeline;

/// Settings layering and the field-to-variant schema.
pub mod settings;

/// Utility functions: content hashing, path helpers.
pub mod utils;

/// Output variant definitions.
pub mod variant;

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Current version of the ave binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default audio cache file, relative to the working directory.
pub const AUDIO_CACHE_FILE: &str = ".aveaudiocache";

/// Default video cache file, relative to the working directory.
pub const VIDEO_CACHE_FILE: &str = ".avevideocache";

/// Loaded project context shared by all commands.
#[derive(Debug, Clone)]
pub struct AveContext {
    /// Path the project file was loaded from.
    pub config_path: PathBuf,
    /// Parsed project configuration.
    pub config: config::Config,
    /// Directory globs, destinations and cache paths are resolved against.
    pub cwd: PathBuf,
}

impl AveContext {
    /// Loads the project file and captures the working directory.
    ///
    /// # Errors
    /// Returns an error if the working directory cannot be determined or the
    /// project file is missing or unparseable (fatal for the whole run).
    pub fn load(config_path: &Path) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let config_path = if config_path.is_absolute() {
            config_path.to_path_buf()
        } else {
            cwd.join(config_path)
        };
        let config = config::Config::load(&config_path)?;
        Ok(Self {
            config_path,
            config,
            cwd,
        })
    }
}
