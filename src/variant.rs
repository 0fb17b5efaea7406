//! Output variants: the distinct encoding targets produced from one source file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One output artifact/encoding target for a single input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Opus audio in a native `.opus` container.
    Opus,
    /// Opus audio in a Core Audio `.caf` container (iOS playback).
    Caf,
    /// Opus audio in a `.webm` container.
    Webm,
    /// MP3 audio via libmp3lame.
    Mp3,
    /// H.264 video in an `.mp4` container.
    Mp4,
}

impl Variant {
    /// All audio variants, in output order.
    pub const AUDIO: &'static [Self] = &[Self::Opus, Self::Caf, Self::Webm, Self::Mp3];

    /// All video variants.
    pub const VIDEO: &'static [Self] = &[Self::Mp4];

    /// File extension of this variant's output artifact.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::Caf => "caf",
            Self::Webm => "webm",
            Self::Mp3 => "mp3",
            Self::Mp4 => "mp4",
        }
    }

    /// Output artifact path for a source with the given stem inside `dest`.
    #[must_use]
    pub fn output_path(self, dest: &Path, stem: &str) -> PathBuf {
        dest.join(format!("{stem}.{}", self.extension()))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
