//! HandBrakeCLI argument profiles for the scan and encode invocations.

use std::ffi::OsString;
use std::path::Path;

use serde::Deserialize;

/// Encode settings passed to HandBrakeCLI.
///
/// Defaults produce a 10-bit HEVC MP4 with stereo E-AC-3 English audio,
/// burned-in subtitles and no chapter markers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EncodeProfile {
    /// Container format, e.g. `av_mp4`.
    pub format: String,
    /// Video encoder, e.g. `x265_10bit`.
    pub encoder: String,
    pub encoder_profile: String,
    pub encoder_level: String,
    /// Constant quality target, lower is better.
    pub quality: f32,
    pub audio_encoder: String,
    /// Audio bitrate in kbps.
    pub audio_bitrate: u32,
    pub mixdown: String,
    /// Audio sample rate in kHz.
    pub audio_rate: String,
    /// Comma separated ISO 639-2 language codes to keep.
    pub audio_languages: String,
    pub burn_subtitles: bool,
    pub chapter_markers: bool,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self {
            format: "av_mp4".to_string(),
            encoder: "x265_10bit".to_string(),
            encoder_profile: "main10".to_string(),
            encoder_level: "5.1".to_string(),
            quality: 24.0,
            audio_encoder: "eac3".to_string(),
            audio_bitrate: 448,
            mixdown: "stereo".to_string(),
            audio_rate: "48".to_string(),
            audio_languages: "eng".to_string(),
            burn_subtitles: true,
            chapter_markers: false,
        }
    }
}

impl EncodeProfile {
    /// Arguments for the pre-flight scan of `input`.
    #[must_use]
    pub fn scan_args(input: &Path) -> Vec<OsString> {
        vec!["-i".into(), input.into(), "--scan".into()]
    }

    /// Arguments for transcoding `input` into `output`.
    #[must_use]
    pub fn encode_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), input.into(), "-o".into(), output.into()];
        let options = [
            ("--format", self.format.clone()),
            ("--encoder", self.encoder.clone()),
            ("--encoder-profile", self.encoder_profile.clone()),
            ("--encoder-level", self.encoder_level.clone()),
            ("--quality", format_quality(self.quality)),
        ];
        for (flag, value) in options {
            args.push(flag.into());
            args.push(value.into());
        }

        // Constant frame rate, keep aspect ratio, no auto-crop, deinterlace when needed
        args.extend(
            ["--cfr", "--keep-display-aspect", "--crop", "0:0:0:0", "--decomb"]
                .into_iter()
                .map(OsString::from),
        );

        let audio = [
            ("--aencoder", self.audio_encoder.clone()),
            ("--ab", self.audio_bitrate.to_string()),
            ("--mixdown", self.mixdown.clone()),
            ("--arate", self.audio_rate.clone()),
            ("--audio-lang-list", self.audio_languages.clone()),
        ];
        for (flag, value) in audio {
            args.push(flag.into());
            args.push(value.into());
        }

        if self.burn_subtitles {
            args.push("--subtitle-burned".into());
        }
        if self.chapter_markers {
            args.push("--markers".into());
        } else {
            args.push("--no-markers".into());
        }
        args
    }
}

/// Print whole numbers without a fractional part: `24` instead of `24.0`.
fn format_quality(quality: f32) -> String {
    if quality.fract() == 0.0 {
        format!("{quality:.0}")
    } else {
        quality.to_string()
    }
}

/// Render a command line for display.
#[must_use]
pub fn display_command(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|part| {
            let text = crate::os_str_to_string(part);
            if text.contains(' ') { format!("\"{text}\"") } else { text }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
