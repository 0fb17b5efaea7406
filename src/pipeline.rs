//! Per-run orchestration: enumerate sources, decide staleness, invoke the
//! encoder, purge entries for sources that disappeared, persist the cache.
//!
//! Files are processed in parallel; the cache store is the single shared
//! mutable resource and every access to it is serialized behind a mutex.
//! Content hashing and encoding both run outside the lock.
//!
//! Purging is an explicit final step, only reached after every group's glob
//! was fully enumerated. A cancelled run saves whatever the store already
//! absorbed but never purges: files that were merely not reached yet must
//! not be treated as missing.

use crate::cache::CacheStore;
use crate::config::{GroupConfig, SectionConfig};
use crate::detect;
use crate::encoder::{self, EncodeJob, Encoder};
use crate::output;
use crate::settings::{
    AUDIO_SCHEMA, AudioParams, AudioSettings, Schema, SettingsBlob, SettingsLayer, VIDEO_SCHEMA,
    VideoParams, VideoSettings, merge,
};
use crate::utils;
use crate::utils::hash::hash_file;
use crate::variant::Variant;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Shared cancellation flag, set from the ctrl-c handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation: no new files are scheduled after this.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Report stale variants without encoding or mutating the cache.
    pub dry_run: bool,
}

/// Aggregated outcome of one section run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Output artifacts successfully encoded.
    pub encoded: usize,
    /// Files whose every requested artifact was already current.
    pub up_to_date: usize,
    /// Artifacts that would be encoded (dry-run only).
    pub stale: usize,
    /// Per-file source errors plus per-variant encode failures.
    pub failed: usize,
    /// Cache entries purged because their source disappeared.
    pub purged: usize,
    /// Whether the run was cancelled before full enumeration.
    pub cancelled: bool,
}

/// Per-file processing outcome, folded into the [`RunSummary`].
enum FileOutcome {
    /// Every requested artifact current, nothing done.
    Clean,
    /// Encoder ran: some artifacts produced, some possibly failed.
    Encoded { done: usize, failed: usize },
    /// Dry-run: this many artifacts are stale.
    WouldEncode(usize),
    /// Source unreadable or untrackable; entry left untouched.
    SourceError,
    /// Not processed because cancellation was requested.
    Skipped,
}

impl RunSummary {
    fn absorb(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Clean => self.up_to_date += 1,
            FileOutcome::Encoded { done, failed } => {
                self.encoded += done;
                self.failed += failed;
            }
            FileOutcome::WouldEncode(count) => self.stale += count,
            FileOutcome::SourceError => self.failed += 1,
            FileOutcome::Skipped => {}
        }
    }
}

/// Runs the audio section: every group, every matched file, all requested
/// audio variants.
pub fn run_audio(
    cfg: &SectionConfig<AudioSettings>,
    cwd: &Path,
    encoder: &dyn Encoder,
    cancel: &CancelFlag,
    opts: RunOptions,
) -> Result<RunSummary> {
    let cache_path = resolve(cwd, None, cfg.cache.as_deref().unwrap_or(Path::new(crate::AUDIO_CACHE_FILE)));
    let store = Mutex::new(CacheStore::load(&cache_path));

    let config_defaults = cfg.default.as_ref().map(SettingsLayer::to_blob).unwrap_or_default();
    let defaults = merge(&AudioSettings::built_in(), &config_defaults, &SettingsBlob::new());
    let default_formats: Vec<Variant> = cfg
        .default
        .as_ref()
        .and_then(|d| d.formats.clone())
        .unwrap_or_else(|| AudioSettings::DEFAULT_FORMATS.to_vec());

    let mut summary = RunSummary::default();
    let mut dest_dirs: Vec<PathBuf> = Vec::new();

    for group in &cfg.groups {
        if cancel.is_cancelled() {
            break;
        }
        let dest = resolve(cwd, cfg.base_dest.as_deref(), &group.dest);
        std::fs::create_dir_all(&dest)
            .with_context(|| format!("failed to create destination: {}", dest.display()))?;
        if !dest_dirs.contains(&dest) {
            dest_dirs.push(dest.clone());
        }

        let formats: Vec<Variant> = group
            .settings
            .formats
            .clone()
            .unwrap_or_else(|| default_formats.clone());

        let sources = expand_sources(cwd, cfg.base_src.as_deref(), &group.src)?;
        let outcomes: Vec<FileOutcome> = sources
            .par_iter()
            .map(|(file_id, src)| {
                if cancel.is_cancelled() {
                    return FileOutcome::Skipped;
                }
                process_audio_file(&store, encoder, &defaults, group, &formats, file_id, src, &dest, opts)
            })
            .collect();
        for outcome in outcomes {
            summary.absorb(outcome);
        }
    }

    finish_run(
        store,
        &cache_path,
        cfg.remove_missing,
        &dest_dirs,
        audio_extensions(),
        cancel,
        opts,
        &mut summary,
    )?;
    Ok(summary)
}

/// Runs the video section: one mp4 per matched file, plus the optional
/// wav-split side output.
pub fn run_video(
    cfg: &SectionConfig<VideoSettings>,
    cwd: &Path,
    encoder: &dyn Encoder,
    cancel: &CancelFlag,
    opts: RunOptions,
) -> Result<RunSummary> {
    let cache_path = resolve(cwd, None, cfg.cache.as_deref().unwrap_or(Path::new(crate::VIDEO_CACHE_FILE)));
    let store = Mutex::new(CacheStore::load(&cache_path));

    let config_defaults = cfg.default.as_ref().map(SettingsLayer::to_blob).unwrap_or_default();
    let defaults = merge(&VideoSettings::built_in(), &config_defaults, &SettingsBlob::new());

    let mut summary = RunSummary::default();
    let mut dest_dirs: Vec<PathBuf> = Vec::new();

    for group in &cfg.groups {
        if cancel.is_cancelled() {
            break;
        }
        let dest = resolve(cwd, cfg.base_dest.as_deref(), &group.dest);
        std::fs::create_dir_all(&dest)
            .with_context(|| format!("failed to create destination: {}", dest.display()))?;
        if !dest_dirs.contains(&dest) {
            dest_dirs.push(dest.clone());
        }

        let sources = expand_sources(cwd, cfg.base_src.as_deref(), &group.src)?;
        let outcomes: Vec<FileOutcome> = sources
            .par_iter()
            .map(|(file_id, src)| {
                if cancel.is_cancelled() {
                    return FileOutcome::Skipped;
                }
                process_video_file(&store, encoder, &defaults, cfg, group, file_id, src, &dest, cwd, opts)
            })
            .collect();
        for outcome in outcomes {
            summary.absorb(outcome);
        }
    }

    finish_run(
        store,
        &cache_path,
        cfg.remove_missing,
        &dest_dirs,
        &["mp4"],
        cancel,
        opts,
        &mut summary,
    )?;
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
fn process_audio_file(
    store: &Mutex<CacheStore>,
    encoder: &dyn Encoder,
    defaults: &SettingsBlob,
    group: &GroupConfig<AudioSettings>,
    formats: &[Variant],
    file_id: &str,
    src: &Path,
    dest: &Path,
    opts: RunOptions,
) -> FileOutcome {
    let override_blob = group
        .overrides
        .get(file_id)
        .map(SettingsLayer::to_blob)
        .unwrap_or_default();
    let effective = merge(defaults, &group.settings.to_blob(), &override_blob);

    let stem = utils::file_stem(Path::new(file_id));
    let outputs: Vec<(Variant, PathBuf)> = formats
        .iter()
        .map(|variant| (*variant, variant.output_path(dest, &stem)))
        .collect();

    let Some(stale) = decide(store, &AUDIO_SCHEMA, file_id, src, &effective, &outputs, opts)
    else {
        return FileOutcome::SourceError;
    };

    if stale.is_empty() {
        output::verbose(&format!("{file_id} - up to date"));
        return FileOutcome::Clean;
    }
    if opts.dry_run {
        report_stale(file_id, &stale);
        return FileOutcome::WouldEncode(stale.len());
    }

    let params = AudioParams::from_blob(&effective);
    let jobs = encoder::audio_jobs(src, dest, &stem, &stale, &params);
    run_jobs(encoder, file_id, &jobs)
}

#[allow(clippy::too_many_arguments)]
fn process_video_file(
    store: &Mutex<CacheStore>,
    encoder: &dyn Encoder,
    defaults: &SettingsBlob,
    cfg: &SectionConfig<VideoSettings>,
    group: &GroupConfig<VideoSettings>,
    file_id: &str,
    src: &Path,
    dest: &Path,
    cwd: &Path,
    opts: RunOptions,
) -> FileOutcome {
    let file_override = group.overrides.get(file_id);
    let override_blob = file_override
        .map(SettingsLayer::to_blob)
        .unwrap_or_default();
    let effective = merge(defaults, &group.settings.to_blob(), &override_blob);

    let stem = utils::file_stem(Path::new(file_id));
    let outputs = vec![(Variant::Mp4, Variant::Mp4.output_path(dest, &stem))];

    let Some(stale) = decide(store, &VIDEO_SCHEMA, file_id, src, &effective, &outputs, opts)
    else {
        return FileOutcome::SourceError;
    };

    if stale.is_empty() {
        output::verbose(&format!("{file_id} - up to date"));
        return FileOutcome::Clean;
    }
    if opts.dry_run {
        report_stale(file_id, &stale);
        return FileOutcome::WouldEncode(stale.len());
    }

    // audio_out follows the same precedence chain as the encode settings but
    // never enters the comparison blob.
    let audio_out = file_override
        .and_then(|o| o.audio_out.clone())
        .or_else(|| group.settings.audio_out.clone())
        .or_else(|| cfg.default.as_ref().and_then(|d| d.audio_out.clone()))
        .map(|out| resolve(cwd, None, &out));
    if let Some(audio_dest) = &audio_out
        && let Err(err) = std::fs::create_dir_all(audio_dest)
    {
        output::error(&format!(
            "{file_id} - cannot create {}: {err}",
            audio_dest.display()
        ));
        return FileOutcome::Encoded { done: 0, failed: 1 };
    }

    let params = VideoParams::from_blob(&effective);
    let jobs = encoder::video_jobs(src, dest, &stem, &stale, &params, audio_out.as_deref());
    run_jobs(encoder, file_id, &jobs)
}

/// Hashes the source and runs the staleness decision under the store lock.
///
/// Returns `None` on a per-file error (unreadable source, unrepresentable
/// id). The entry is left untouched in that case but still marked seen, so
/// the purge step does not mistake a temporarily unreadable file for one
/// that disappeared.
fn decide(
    store: &Mutex<CacheStore>,
    schema: &Schema,
    file_id: &str,
    src: &Path,
    effective: &SettingsBlob,
    outputs: &[(Variant, PathBuf)],
    opts: RunOptions,
) -> Option<HashSet<Variant>> {
    let content_hash = match hash_file(src) {
        Ok(hash) => hash,
        Err(err) => {
            output::error(&format!("{file_id} - {err:#}"));
            let mut guard = store.lock().unwrap_or_else(PoisonError::into_inner);
            guard.mark_seen(file_id);
            return None;
        }
    };

    let mut guard = store.lock().unwrap_or_else(PoisonError::into_inner);
    if opts.dry_run {
        Some(detect::stale_variants(
            &guard,
            schema,
            file_id,
            &content_hash,
            effective,
            outputs,
        ))
    } else {
        match detect::detect_stale(&mut guard, schema, file_id, &content_hash, effective, outputs) {
            Ok(stale) => Some(stale),
            Err(err) => {
                output::error(&format!("{file_id} - {err:#}"));
                None
            }
        }
    }
}

/// Runs every job for one file; failures are reported and counted, never
/// propagated. The fingerprint is already committed by this point, so a
/// failed variant is retried next run through the existence check.
fn run_jobs(encoder: &dyn Encoder, file_id: &str, jobs: &[EncodeJob]) -> FileOutcome {
    let mut done: Vec<&str> = Vec::new();
    let mut failed = 0;
    for job in jobs {
        match encoder.encode(job) {
            Ok(()) => done.push(job.label),
            Err(err) => {
                failed += 1;
                output::error(&format!("{file_id} - {err:#}"));
            }
        }
    }
    if !done.is_empty() {
        output::action("encoded", &format!("{file_id} -> {}", done.join(",")));
    }
    FileOutcome::Encoded {
        done: done.len(),
        failed,
    }
}

/// Purge, orphan removal, and save. Cancelled runs save without purging.
#[allow(clippy::too_many_arguments)]
fn finish_run(
    store: Mutex<CacheStore>,
    cache_path: &Path,
    remove_missing: bool,
    dest_dirs: &[PathBuf],
    extensions: &[&str],
    cancel: &CancelFlag,
    opts: RunOptions,
    summary: &mut RunSummary,
) -> Result<()> {
    if opts.dry_run {
        return Ok(());
    }

    let mut store = store
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);

    if cancel.is_cancelled() {
        summary.cancelled = true;
        output::warning("run cancelled, saving partial progress");
        if let Err(err) = store.save(cache_path) {
            output::error(&format!("failed to save cache: {err:#}"));
        }
        return Ok(());
    }

    let removed = store.purge_unseen();
    summary.purged = removed.len();
    if remove_missing && !removed.is_empty() {
        remove_orphaned(&removed, dest_dirs, extensions);
    }
    store.save(cache_path)
}

/// Deletes the output artifacts of purged entries. Failures are logged and
/// never abort the run.
fn remove_orphaned(removed: &[String], dest_dirs: &[PathBuf], extensions: &[&str]) {
    for file_id in removed {
        let stem = utils::file_stem(Path::new(file_id));
        for dir in dest_dirs {
            for ext in extensions {
                let artifact = dir.join(format!("{stem}.{ext}"));
                match std::fs::remove_file(&artifact) {
                    Ok(()) => output::action("removed", &artifact.display().to_string()),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => {
                        warn!(path = %artifact.display(), %err, "failed to remove orphaned output");
                    }
                }
            }
        }
    }
}

/// Expands a group's source glob. File ids are the matched paths relative to
/// the working directory, so they stay stable across runs from the same
/// project root.
fn expand_sources(
    cwd: &Path,
    base_src: Option<&Path>,
    pattern: &str,
) -> Result<Vec<(String, PathBuf)>> {
    let full_pattern = resolve(cwd, base_src, Path::new(pattern));
    let pattern_str = full_pattern.to_string_lossy();

    let mut sources = Vec::new();
    for entry in
        glob::glob(&pattern_str).with_context(|| format!("invalid source glob: {pattern}"))?
    {
        match entry {
            Ok(path) if path.is_file() => {
                let file_id = path
                    .strip_prefix(cwd)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                sources.push((file_id, path));
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "skipping unreadable glob entry"),
        }
    }
    sources.sort();
    Ok(sources)
}

fn resolve(cwd: &Path, base: Option<&Path>, path: &Path) -> PathBuf {
    let mut resolved = cwd.to_path_buf();
    if let Some(base) = base {
        resolved.push(base);
    }
    resolved.push(path);
    resolved
}

fn report_stale(file_id: &str, stale: &HashSet<Variant>) {
    let mut names: Vec<&str> = stale.iter().map(|v| v.extension()).collect();
    names.sort_unstable();
    output::action("stale", &format!("{file_id} [{}]", names.join(",")));
}

fn audio_extensions() -> &'static [&'static str] {
    &["opus", "caf", "webm", "mp3"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_resolve_layers_base_over_cwd() {
        let resolved = resolve(Path::new("/proj"), Some(Path::new("raw")), Path::new("sfx"));
        assert_eq!(resolved, PathBuf::from("/proj/raw/sfx"));

        let resolved = resolve(Path::new("/proj"), None, Path::new(".aveaudiocache"));
        assert_eq!(resolved, PathBuf::from("/proj/.aveaudiocache"));
    }

    #[test]
    fn test_summary_absorb() {
        let mut summary = RunSummary::default();
        summary.absorb(FileOutcome::Clean);
        summary.absorb(FileOutcome::Encoded { done: 3, failed: 1 });
        summary.absorb(FileOutcome::WouldEncode(2));
        summary.absorb(FileOutcome::SourceError);
        summary.absorb(FileOutcome::Skipped);

        assert_eq!(summary.up_to_date, 1);
        assert_eq!(summary.encoded, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.stale, 2);
    }
}
