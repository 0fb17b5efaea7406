//! Project configuration parsing.
//!
//! A project is described by one TOML file (default `ave.toml`) with an
//! `[audio]` and/or `[video]` section. Each section names a cache file,
//! default settings, and a list of source groups; each group carries a
//! source glob, a destination directory, inline group-level settings, and
//! optional per-file overrides:
//!
//! ```toml
//! [audio]
//! remove_missing = true
//!
//! [audio.default]
//! opus_bitrate = "32k"
//! mp3_quality = "9"
//!
//! [[audio.group]]
//! src = "raw/sfx/**/*.wav"
//! dest = "static/sfx"
//! mono = true
//!
//! [audio.group.overrides."raw/sfx/theme song.wav"]
//! mono = false
//! ```
//!
//! A missing or unparseable project file is fatal for the whole run.

use crate::settings::{AudioSettings, VideoSettings};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default project file name, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "ave.toml";

/// Top-level project configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Audio pipeline section.
    pub audio: Option<SectionConfig<AudioSettings>>,
    /// Video pipeline section.
    pub video: Option<SectionConfig<VideoSettings>>,
}

/// One pipeline section (audio or video).
#[derive(Debug, Clone, Deserialize)]
pub struct SectionConfig<T> {
    /// Base directory that group source globs are relative to.
    #[serde(default)]
    pub base_src: Option<PathBuf>,
    /// Base directory that group destinations are relative to.
    #[serde(default)]
    pub base_dest: Option<PathBuf>,
    /// Cache file path. Defaults to `.aveaudiocache` / `.avevideocache`.
    #[serde(default)]
    pub cache: Option<PathBuf>,
    /// Delete output artifacts of sources that disappeared since last run.
    #[serde(default)]
    pub remove_missing: bool,
    /// Default settings layer for the whole section.
    #[serde(default)]
    pub default: Option<T>,
    /// Source groups, processed in order.
    #[serde(default = "Vec::new", rename = "group")]
    pub groups: Vec<GroupConfig<T>>,
}

/// One group of source files sharing a destination and settings layer.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig<T> {
    /// Source glob, relative to `base_src` (or the working directory).
    pub src: String,
    /// Destination directory, relative to `base_dest` (or the working directory).
    pub dest: PathBuf,
    /// Group-level settings, merged over the section defaults.
    #[serde(flatten)]
    pub settings: T,
    /// Per-file overrides keyed by file id (the glob-relative source path).
    #[serde(default)]
    pub overrides: HashMap<String, T>,
}

impl Config {
    /// Loads and parses the project file at `path`.
    ///
    /// Unlike the cache, a broken project file aborts the run: silently
    /// proceeding with partial configuration could purge outputs the user
    /// still wants.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("no project file found at {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse project file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
[audio]
remove_missing = true
cache = ".aveaudiocache"

[audio.default]
opus_bitrate = "32k"
mp3_quality = "9"
mono = false
formats = ["opus", "caf", "mp3"]

[[audio.group]]
src = "raw/sfx/**/*.wav"
dest = "static/sfx"
mono = true

[audio.group.overrides."raw/sfx/theme song.wav"]
mono = false

[[audio.group]]
src = "raw/music/*.wav"
dest = "static/music"

[video]

[video.default]
quality = 28
width = 1280

[[video.group]]
src = "raw/video/*.mov"
dest = "static/video"
quality = 23
audio_out = "raw/split"
"#;

    #[test]
    fn test_parse_full_project() -> Result<()> {
        let config: Config = toml::from_str(SAMPLE)?;

        let audio = config.audio.expect("audio section");
        assert!(audio.remove_missing);
        assert_eq!(audio.cache, Some(PathBuf::from(".aveaudiocache")));
        let default = audio.default.expect("audio defaults");
        assert_eq!(default.opus_bitrate.as_deref(), Some("32k"));
        assert_eq!(
            default.formats,
            Some(vec![Variant::Opus, Variant::Caf, Variant::Mp3])
        );

        assert_eq!(audio.groups.len(), 2);
        let sfx = &audio.groups[0];
        assert_eq!(sfx.src, "raw/sfx/**/*.wav");
        assert_eq!(sfx.settings.mono, Some(true));
        let override_ = &sfx.overrides["raw/sfx/theme song.wav"];
        assert_eq!(override_.mono, Some(false));

        let video = config.video.expect("video section");
        let group = &video.groups[0];
        assert_eq!(group.settings.quality, Some(23));
        assert_eq!(group.settings.audio_out, Some(PathBuf::from("raw/split")));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempdir().unwrap();
        let err = Config::load(&dir.path().join("ave.toml")).unwrap_err();
        assert!(err.to_string().contains("no project file"));
    }

    #[test]
    fn test_invalid_toml_is_fatal() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("ave.toml");
        std::fs::write(&path, "[audio\nbroken")?;
        assert!(Config::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_empty_sections_allowed() -> Result<()> {
        let config: Config = toml::from_str("")?;
        assert!(config.audio.is_none());
        assert!(config.video.is_none());
        Ok(())
    }
}
