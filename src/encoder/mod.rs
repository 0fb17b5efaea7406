//! External encoder boundary.
//!
//! The core never transcodes anything itself: it builds one [`EncodeJob`]
//! per stale variant and hands it to an [`Encoder`]. Each job is invoked and
//! judged independently; a failed job is reported and the run moves on.

mod ffmpeg;

pub use ffmpeg::FfmpegEncoder;

use crate::settings::{AudioParams, VideoParams};
use crate::variant::Variant;
use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One encoder invocation: input, output, and the codec arguments between them.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Source media file.
    pub input: PathBuf,
    /// Output artifact to produce.
    pub output: PathBuf,
    /// Label for reporting, e.g. `"opus"` or `"wav"`.
    pub label: &'static str,
    /// Arguments placed between `-i <input>` and the output path.
    pub args: Vec<String>,
}

/// Runs encode jobs. Implemented by the ffmpeg shell-out and by test stubs.
pub trait Encoder: Sync {
    /// Produces `job.output` from `job.input`, or fails with diagnostic text.
    fn encode(&self, job: &EncodeJob) -> Result<()>;
}

/// Builds one job per stale audio variant.
///
/// Job order follows [`Variant::AUDIO`] so repeated runs produce identical
/// reporting.
#[must_use]
pub fn audio_jobs(
    input: &Path,
    dest: &Path,
    stem: &str,
    stale: &HashSet<Variant>,
    params: &AudioParams,
) -> Vec<EncodeJob> {
    let mut jobs = Vec::new();
    for &variant in Variant::AUDIO {
        if !stale.contains(&variant) {
            continue;
        }
        let mut args = Vec::new();
        if params.mono {
            args.extend(["-ac".to_string(), "1".to_string()]);
        }
        match variant {
            Variant::Opus | Variant::Caf | Variant::Webm => {
                args.extend([
                    "-c:a".to_string(),
                    "libopus".to_string(),
                    "-b:a".to_string(),
                    params.opus_bitrate.clone(),
                ]);
            }
            Variant::Mp3 => {
                args.extend([
                    "-c:a".to_string(),
                    "libmp3lame".to_string(),
                    "-q:a".to_string(),
                    params.mp3_quality.clone(),
                ]);
            }
            Variant::Mp4 => unreachable!("mp4 is not an audio variant"),
        }
        jobs.push(EncodeJob {
            input: input.to_path_buf(),
            output: variant.output_path(dest, stem),
            label: variant.extension(),
            args,
        });
    }
    jobs
}

/// Builds the mp4 job when stale, plus the wav-split side job when requested.
///
/// With `audio_out` set the video is muted (`-an`) and its audio lands as a
/// float-PCM wav in that directory; the wav is regenerated whenever the mp4
/// is.
#[must_use]
pub fn video_jobs(
    input: &Path,
    dest: &Path,
    stem: &str,
    stale: &HashSet<Variant>,
    params: &VideoParams,
    audio_out: Option<&Path>,
) -> Vec<EncodeJob> {
    if !stale.contains(&Variant::Mp4) {
        return Vec::new();
    }

    // -pix_fmt yuv420p is for Quicktime compatibility (w/h divisible by 2)
    // -profile:v baseline -level 3.0 is for Android compatibility
    // -movflags +faststart allows play while downloading
    // scale=<w>:-2 resizes to the target width, height as a multiple of 2
    let mut args = vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-profile:v".to_string(),
        "baseline".to_string(),
        "-level".to_string(),
        "3.0".to_string(),
        "-crf".to_string(),
        params.quality.to_string(),
        "-preset".to_string(),
        "veryslow".to_string(),
        "-vf".to_string(),
        format!("scale={}:-2", params.width),
    ];
    if audio_out.is_some() {
        args.push("-an".to_string());
    } else {
        args.extend(["-c:a".to_string(), "aac".to_string()]);
    }
    args.extend(["-movflags".to_string(), "+faststart".to_string()]);

    let mut jobs = vec![EncodeJob {
        input: input.to_path_buf(),
        output: Variant::Mp4.output_path(dest, stem),
        label: Variant::Mp4.extension(),
        args,
    }];

    if let Some(audio_dest) = audio_out {
        jobs.push(EncodeJob {
            input: input.to_path_buf(),
            output: audio_dest.join(format!("{stem}.wav")),
            label: "wav",
            args: vec!["-c:a".to_string(), "pcm_f32le".to_string()],
        });
    }

    jobs
}
