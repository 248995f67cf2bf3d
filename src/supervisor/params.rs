//! Transcoder argument builder
//!
//! Turns the camera options a user picks (codecs, frame rate, scale,
//! fragment duration, H.264 profile, probing) into the ffmpeg argument list.
//! The process always writes two outputs:
//!
//! ```text
//! pipe:1  fragmented MP4   (-f mp4 -movflags +frag_keyframe+empty_moov+...)
//! pipe:4  JPEG stills      (-f image2pipe -c:v mjpeg)
//! ```

use crate::error::ParamsError;

/// H.264 profile/level presets offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilePreset {
    Baseline30,
    Baseline31,
    Main31,
    Main40,
    High40,
    High41,
    High42,
}

impl ProfilePreset {
    /// Parse a preset name such as `baseline31` or `high42`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "baseline30" => Some(ProfilePreset::Baseline30),
            "baseline31" => Some(ProfilePreset::Baseline31),
            "main31" => Some(ProfilePreset::Main31),
            "main40" => Some(ProfilePreset::Main40),
            "high40" => Some(ProfilePreset::High40),
            "high41" => Some(ProfilePreset::High41),
            "high42" => Some(ProfilePreset::High42),
            _ => None,
        }
    }

    /// `(profile, level)` passed to `-profile:v` and `-level`
    pub fn profile_level(&self) -> (&'static str, &'static str) {
        match self {
            ProfilePreset::Baseline30 => ("baseline", "3.0"),
            ProfilePreset::Baseline31 => ("baseline", "3.1"),
            ProfilePreset::Main31 => ("main", "3.1"),
            ProfilePreset::Main40 => ("main", "4.0"),
            ProfilePreset::High40 => ("high", "4.0"),
            ProfilePreset::High41 => ("high", "4.1"),
            ProfilePreset::High42 => ("high", "4.2"),
        }
    }
}

/// Options for one transcode session
#[derive(Debug, Clone)]
pub struct TranscodeParams {
    /// RTSP source URL (required)
    pub source_url: String,
    /// ffmpeg `-loglevel`
    pub log_level: Option<String>,
    /// `-analyzeduration` (microseconds)
    pub analyze_duration: Option<String>,
    /// `-probesize` (bytes)
    pub probe_size: Option<String>,
    /// `-hwaccel` method
    pub hwaccel: Option<String>,
    /// `-rtsp_transport` (tcp, udp, http, ...)
    pub rtsp_transport: Option<String>,
    /// Audio codec; `an` disables audio
    pub audio_codec: String,
    /// Video codec; `copy` passes the camera stream through
    pub video_codec: String,
    /// Output frame rate (re-encode only)
    pub frame_rate: String,
    /// Scale factor applied to the input width (re-encode only)
    pub scale: String,
    /// `-min_frag_duration`/`-frag_duration` (microseconds, re-encode only)
    pub frag_duration: Option<String>,
    /// `-crf` (re-encode only)
    pub crf: Option<String>,
    /// `-tune` (re-encode only)
    pub tune: Option<String>,
    /// Profile/level preset (re-encode only)
    pub profile: Option<ProfilePreset>,
}

impl Default for TranscodeParams {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            log_level: None,
            analyze_duration: None,
            probe_size: None,
            hwaccel: None,
            rtsp_transport: None,
            audio_codec: "an".to_string(),
            video_codec: "copy".to_string(),
            frame_rate: "10".to_string(),
            scale: "0.5".to_string(),
            frag_duration: None,
            crf: None,
            tune: None,
            profile: None,
        }
    }
}

fn push_opt(args: &mut Vec<String>, flag: &str, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

fn push_all(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

impl TranscodeParams {
    /// Create params for the given source URL with default options
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            ..Default::default()
        }
    }

    /// Set the ffmpeg log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Set the RTSP transport
    pub fn rtsp_transport(mut self, transport: impl Into<String>) -> Self {
        self.rtsp_transport = Some(transport.into());
        self
    }

    /// Set hardware acceleration
    pub fn hwaccel(mut self, method: impl Into<String>) -> Self {
        self.hwaccel = Some(method.into());
        self
    }

    /// Set input probing parameters
    pub fn probing(mut self, analyze_duration: impl Into<String>, probe_size: impl Into<String>) -> Self {
        self.analyze_duration = Some(analyze_duration.into());
        self.probe_size = Some(probe_size.into());
        self
    }

    /// Set the audio codec (`an` disables audio)
    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }

    /// Set the video codec (`copy` passes through)
    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    /// Set frame rate and scale for re-encoding
    pub fn frame_rate_and_scale(mut self, rate: impl Into<String>, scale: impl Into<String>) -> Self {
        self.frame_rate = rate.into();
        self.scale = scale.into();
        self
    }

    /// Set the fragment duration for re-encoding
    pub fn frag_duration(mut self, duration: impl Into<String>) -> Self {
        self.frag_duration = Some(duration.into());
        self
    }

    /// Set the constant rate factor for re-encoding
    pub fn crf(mut self, crf: impl Into<String>) -> Self {
        self.crf = Some(crf.into());
        self
    }

    /// Set the encoder tune for re-encoding
    pub fn tune(mut self, tune: impl Into<String>) -> Self {
        self.tune = Some(tune.into());
        self
    }

    /// Set the profile/level preset for re-encoding
    pub fn profile(mut self, preset: ProfilePreset) -> Self {
        self.profile = Some(preset);
        self
    }

    /// Build the full ffmpeg argument list
    pub fn build(&self) -> Result<Vec<String>, ParamsError> {
        let source_url = self.source_url.trim();
        if source_url.is_empty() {
            return Err(ParamsError::MissingSourceUrl);
        }

        let mut args = Vec::with_capacity(64);

        push_opt(&mut args, "-loglevel", &self.log_level);
        push_opt(&mut args, "-analyzeduration", &self.analyze_duration);
        push_opt(&mut args, "-probesize", &self.probe_size);
        push_opt(&mut args, "-hwaccel", &self.hwaccel);
        push_opt(&mut args, "-rtsp_transport", &self.rtsp_transport);
        push_all(&mut args, &["-i", source_url]);

        if self.audio_codec == "an" {
            args.push("-an".to_string());
        } else {
            push_all(&mut args, &["-c:a", &self.audio_codec]);
        }

        push_all(&mut args, &["-c:v", &self.video_codec]);
        if self.video_codec != "copy" {
            let filter = format!(
                "fps={},scale=trunc(iw*{}/2)*2:-2,format=yuv420p",
                self.frame_rate, self.scale
            );
            push_all(&mut args, &["-vf", &filter]);

            if let Some(d) = self.frag_duration.as_deref().filter(|d| !d.is_empty()) {
                push_all(&mut args, &["-min_frag_duration", d, "-frag_duration", d]);
            }
            push_opt(&mut args, "-crf", &self.crf);
            push_opt(&mut args, "-tune", &self.tune);
            if let Some(preset) = self.profile {
                let (profile, level) = preset.profile_level();
                push_all(&mut args, &["-profile:v", profile, "-level", level]);
            }
        }

        push_all(
            &mut args,
            &[
                "-f",
                "mp4",
                "-movflags",
                "+frag_keyframe+empty_moov+default_base_moof+omit_tfhd_offset",
                "-reset_timestamps",
                "1",
                "pipe:1",
            ],
        );

        push_all(
            &mut args,
            &[
                "-an",
                "-c:v",
                "mjpeg",
                "-f",
                "image2pipe",
                "-huffman",
                "optimal",
                "-q:v",
                "4",
                "-vf",
                "fps=7,scale=640:-1",
                "pipe:4",
            ],
        );

        Ok(args)
    }
}
