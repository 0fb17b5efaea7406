//! Effective-settings resolution and the field-to-variant schema.
//!
//! Encode settings reach a file through three layers: section defaults,
//! group-level values, and a per-file override. [`merge`] resolves them with
//! a shallow field-by-field merge (override > group > defaults). The result
//! is a [`SettingsBlob`], a flat order-insensitive mapping compared by value
//! against the cache.
//!
//! Which settings enter the blob is an explicit allow-list: each section's
//! [`Schema`] names the comparable fields and the output variants each field
//! invalidates when it changes. Non-encode keys (source globs, destinations,
//! format selections) never reach the blob, so they can never trigger a
//! spurious re-encode.

use crate::variant::Variant;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Flat mapping of setting name to scalar value, compared by value.
pub type SettingsBlob = BTreeMap<String, Value>;

/// A comparable settings field and the variants a change to it invalidates.
pub struct FieldSpec {
    /// Setting name as it appears in the blob and in the persisted cache.
    pub name: &'static str,
    /// Variants forced stale when this field's value changes.
    pub affects: &'static [Variant],
}

/// Static table mapping each comparable field to its affected variant set.
///
/// This is domain configuration, not computed: the audio and video sections
/// each carry one fixed schema.
pub struct Schema {
    /// Comparable fields, the allow-list for blob membership.
    pub fields: &'static [FieldSpec],
    /// Every variant this section can produce.
    pub variants: &'static [Variant],
}

impl Schema {
    /// Variants invalidated by a change to `field`. Unknown fields affect nothing.
    #[must_use]
    pub fn affected_by(&self, field: &str) -> &'static [Variant] {
        self.fields
            .iter()
            .find(|spec| spec.name == field)
            .map_or(&[], |spec| spec.affects)
    }
}

/// Audio schema: opus bitrate drives every opus-coded container, mp3 quality
/// only the mp3 output, and channel downmix all of them.
pub static AUDIO_SCHEMA: Schema = Schema {
    fields: &[
        FieldSpec {
            name: "opus_bitrate",
            affects: &[Variant::Opus, Variant::Caf, Variant::Webm],
        },
        FieldSpec {
            name: "mp3_quality",
            affects: &[Variant::Mp3],
        },
        FieldSpec {
            name: "mono",
            affects: &[Variant::Opus, Variant::Caf, Variant::Webm, Variant::Mp3],
        },
    ],
    variants: Variant::AUDIO,
};

/// Video schema: both fields feed the single mp4 encode.
pub static VIDEO_SCHEMA: Schema = Schema {
    fields: &[
        FieldSpec {
            name: "quality",
            affects: &[Variant::Mp4],
        },
        FieldSpec {
            name: "width",
            affects: &[Variant::Mp4],
        },
    ],
    variants: Variant::VIDEO,
};

/// Resolves the effective settings for a file.
///
/// Precedence, highest to lowest: `override` > `group` > `defaults`. The
/// merge is shallow: a field present at a higher layer fully replaces the
/// lower layer's value, absent fields fall through.
#[must_use]
pub fn merge(defaults: &SettingsBlob, group: &SettingsBlob, file_override: &SettingsBlob) -> SettingsBlob {
    let mut effective = defaults.clone();
    for (key, value) in group {
        effective.insert(key.clone(), value.clone());
    }
    for (key, value) in file_override {
        effective.insert(key.clone(), value.clone());
    }
    effective
}

/// A configuration layer convertible into comparable blob form.
pub trait SettingsLayer {
    /// Blob containing only the schema fields present at this layer.
    fn to_blob(&self) -> SettingsBlob;
}

/// Audio encode settings as they appear at any configuration layer.
///
/// All fields optional: an absent field falls through to the next layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Target VBR bitrate for the opus-coded outputs, e.g. `"32k"`.
    pub opus_bitrate: Option<String>,
    /// LAME VBR quality, `"0"` (best) to `"9"` (worst).
    pub mp3_quality: Option<String>,
    /// Downmix to a single channel.
    pub mono: Option<bool>,
    /// Which audio variants to produce. Not an encode parameter: changing the
    /// selection never re-encodes existing outputs, it only adds or drops
    /// requested artifacts.
    pub formats: Option<Vec<Variant>>,
}

impl AudioSettings {
    /// Built-in defaults applied beneath the configured default layer.
    #[must_use]
    pub fn built_in() -> SettingsBlob {
        BTreeMap::from([
            ("opus_bitrate".to_string(), json!("32k")),
            ("mp3_quality".to_string(), json!("9")),
            ("mono".to_string(), json!(false)),
        ])
    }

    /// Audio variants produced when no layer selects any.
    pub const DEFAULT_FORMATS: &'static [Variant] = &[Variant::Opus, Variant::Caf, Variant::Mp3];
}

impl SettingsLayer for AudioSettings {
    fn to_blob(&self) -> SettingsBlob {
        let mut blob = SettingsBlob::new();
        if let Some(bitrate) = &self.opus_bitrate {
            blob.insert("opus_bitrate".to_string(), json!(bitrate));
        }
        if let Some(quality) = &self.mp3_quality {
            blob.insert("mp3_quality".to_string(), json!(quality));
        }
        if let Some(mono) = self.mono {
            blob.insert("mono".to_string(), json!(mono));
        }
        blob
    }
}

/// Fully resolved audio parameters, extracted from an effective blob.
#[derive(Debug, Clone)]
pub struct AudioParams {
    /// Opus target bitrate.
    pub opus_bitrate: String,
    /// LAME VBR quality index.
    pub mp3_quality: String,
    /// Downmix to mono.
    pub mono: bool,
}

impl AudioParams {
    /// Extracts parameters from an effective blob, falling back to the
    /// built-in defaults for any missing field.
    #[must_use]
    pub fn from_blob(blob: &SettingsBlob) -> Self {
        Self {
            opus_bitrate: str_field(blob, "opus_bitrate", "32k"),
            mp3_quality: str_field(blob, "mp3_quality", "9"),
            mono: blob.get("mono").and_then(Value::as_bool).unwrap_or(false),
        }
    }
}

/// Video encode settings as they appear at any configuration layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoSettings {
    /// x264 CRF: 0 lossless, 23 default, 51 worst. 18-28 is a sane range.
    pub quality: Option<u32>,
    /// Output width in pixels; height follows the aspect ratio.
    pub width: Option<u32>,
    /// Split the source audio into a `.wav` in this directory (muting the
    /// video). Not an encode parameter for the mp4 itself.
    pub audio_out: Option<PathBuf>,
}

impl VideoSettings {
    /// Built-in defaults applied beneath the configured default layer.
    #[must_use]
    pub fn built_in() -> SettingsBlob {
        BTreeMap::from([
            ("quality".to_string(), json!(28)),
            ("width".to_string(), json!(1280)),
        ])
    }
}

impl SettingsLayer for VideoSettings {
    fn to_blob(&self) -> SettingsBlob {
        let mut blob = SettingsBlob::new();
        if let Some(quality) = self.quality {
            blob.insert("quality".to_string(), json!(quality));
        }
        if let Some(width) = self.width {
            blob.insert("width".to_string(), json!(width));
        }
        blob
    }
}

/// Fully resolved video parameters, extracted from an effective blob.
#[derive(Debug, Clone)]
pub struct VideoParams {
    /// x264 CRF value.
    pub quality: u32,
    /// Output width in pixels.
    pub width: u32,
}

impl VideoParams {
    /// Extracts parameters from an effective blob, falling back to the
    /// built-in defaults for any missing field.
    #[must_use]
    pub fn from_blob(blob: &SettingsBlob) -> Self {
        Self {
            quality: u32_field(blob, "quality", 28),
            width: u32_field(blob, "width", 1280),
        }
    }
}

fn str_field(blob: &SettingsBlob, name: &str, fallback: &str) -> String {
    blob.get(name)
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn u32_field(blob: &SettingsBlob, name: &str, fallback: u32) -> u32 {
    blob.get(name)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_precedence() {
        let defaults = BTreeMap::from([
            ("opus_bitrate".to_string(), json!("32k")),
            ("mp3_quality".to_string(), json!("9")),
            ("mono".to_string(), json!(false)),
        ]);
        let group = BTreeMap::from([("mono".to_string(), json!(true))]);
        let file_override = BTreeMap::from([("mp3_quality".to_string(), json!("4"))]);

        let effective = merge(&defaults, &group, &file_override);

        assert_eq!(effective["opus_bitrate"], json!("32k"));
        assert_eq!(effective["mp3_quality"], json!("4"));
        assert_eq!(effective["mono"], json!(true));
    }

    #[test]
    fn test_merge_absent_fields_fall_through() {
        let defaults = AudioSettings::built_in();
        let empty = SettingsBlob::new();

        let effective = merge(&defaults, &empty, &empty);
        assert_eq!(effective, defaults);
    }

    #[test]
    fn test_merge_is_shallow_replacement() {
        let defaults = BTreeMap::from([("width".to_string(), json!(1280))]);
        let group = BTreeMap::from([("width".to_string(), json!(640))]);

        let effective = merge(&defaults, &group, &SettingsBlob::new());
        assert_eq!(effective["width"], json!(640));
    }

    #[test]
    fn test_audio_layer_excludes_formats() {
        let layer = AudioSettings {
            mono: Some(true),
            formats: Some(vec![Variant::Opus]),
            ..Default::default()
        };
        let blob = layer.to_blob();
        assert_eq!(blob.len(), 1);
        assert_eq!(blob["mono"], json!(true));
    }

    #[test]
    fn test_video_layer_excludes_audio_out() {
        let layer = VideoSettings {
            quality: Some(23),
            audio_out: Some(PathBuf::from("raw/audio")),
            ..Default::default()
        };
        let blob = layer.to_blob();
        assert_eq!(blob.len(), 1);
        assert_eq!(blob["quality"], json!(23));
    }

    #[test]
    fn test_schema_affected_by() {
        assert_eq!(
            AUDIO_SCHEMA.affected_by("mp3_quality"),
            &[Variant::Mp3]
        );
        assert_eq!(AUDIO_SCHEMA.affected_by("mono").len(), 4);
        assert!(AUDIO_SCHEMA.affected_by("no_such_field").is_empty());
    }

    #[test]
    fn test_params_fall_back_to_built_ins() {
        let params = AudioParams::from_blob(&SettingsBlob::new());
        assert_eq!(params.opus_bitrate, "32k");
        assert_eq!(params.mp3_quality, "9");
        assert!(!params.mono);

        let params = VideoParams::from_blob(&SettingsBlob::new());
        assert_eq!(params.quality, 28);
        assert_eq!(params.width, 1280);
    }
}
