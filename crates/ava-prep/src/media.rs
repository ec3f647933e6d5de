// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! External media tooling.
//!
//! Trimming and inspection are delegated to `ffmpeg` and `ffprobe`. The
//! [`MediaTool`] trait is the seam the stages are written against so that
//! they can run without either binary installed.

use crate::Error;
use log::{debug, trace, warn};
use serde::Deserialize;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::process::Command;

/// Encoder settings for a trim.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeOptions {
    /// ffmpeg video encoder name, e.g. `libx264` or `h264_nvenc`.
    pub encoder: String,
    pub crf: Option<u32>,
    pub preset: Option<String>,
    /// Target video bitrate in ffmpeg notation, e.g. `2M`.
    pub bitrate: Option<String>,
    /// Output frame rate; source rate when `None`.
    pub fps: Option<f64>,
    pub pix_fmt: Option<String>,
    /// Keep the audio track. Dropped when false.
    pub audio: bool,
}

impl EncodeOptions {
    /// H.264 at CRF 28 in yuv420p without audio, used for sampled clips.
    pub fn clip() -> Self {
        Self {
            encoder: "libx264".to_string(),
            crf: Some(28),
            preset: None,
            bitrate: None,
            fps: None,
            pix_fmt: Some("yuv420p".to_string()),
            audio: false,
        }
    }

    /// Constant 30 fps at 2 Mbit/s without audio, used for source trimming.
    pub fn source() -> Self {
        Self {
            encoder: "libx264".to_string(),
            crf: None,
            preset: Some("fast".to_string()),
            bitrate: Some("2M".to_string()),
            fps: Some(30.0),
            pix_fmt: None,
            audio: false,
        }
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::clip()
    }
}

/// A single trim invocation: `duration` seconds of `input` from `start`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrimRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start: f64,
    pub duration: f64,
    pub encode: EncodeOptions,
}

/// What a probe learned about a media file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaInfo {
    /// Container duration in seconds.
    pub duration: f64,
    /// Frames in the first video stream; estimated from duration and frame
    /// rate when the container does not record a count.
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub fps: f64,
    pub has_video: bool,
}

impl MediaInfo {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Trim and inspect operations on media files.
#[allow(async_fn_in_trait)]
pub trait MediaTool {
    /// Writes the trimmed segment to `request.output`. A failure of the
    /// underlying tool is reported as [`Error::Trim`].
    async fn trim(&self, request: &TrimRequest) -> Result<(), Error>;

    /// Inspects a media file. Unreadable files are reported as
    /// [`Error::Probe`].
    async fn probe(&self, path: &Path) -> Result<MediaInfo, Error>;
}

/// [`MediaTool`] backed by the `ffmpeg` and `ffprobe` executables.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    probe_timeout: Duration,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            probe_timeout: Duration::from_secs(30),
        }
    }
}

impl Ffmpeg {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, probe_timeout: Duration) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            probe_timeout,
        }
    }
}

/// Marker inserted before the extension of outputs still being written.
const PARTIAL_MARKER: &str = ".part";

/// `{stem}.part.{ext}` next to `output`. The extension is kept so the
/// encoder still infers the container from it.
pub fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{}{}.{}", stem, PARTIAL_MARKER, ext.to_string_lossy()),
        None => format!("{}{}", stem, PARTIAL_MARKER),
    };
    output.with_file_name(name)
}

/// Whether `path` is an output left behind by an unfinished trim.
pub fn is_partial(path: &Path) -> bool {
    path.file_stem()
        .map(|s| s.to_string_lossy().ends_with(PARTIAL_MARKER))
        .unwrap_or(false)
}

/// Trims into [`partial_path`] of `request.output`, requires the result to
/// hold video frames and renames it into place. The partial file is removed
/// on any failure, so `request.output` only ever exists complete.
pub async fn trim_validated<T: MediaTool>(
    tool: &T,
    request: &TrimRequest,
) -> Result<MediaInfo, Error> {
    let partial = partial_path(&request.output);
    let staged = TrimRequest {
        output: partial.clone(),
        ..request.clone()
    };

    let result = async {
        tool.trim(&staged).await?;
        let info = tool.probe(&partial).await?;
        if !info.has_video || info.frames == 0 {
            return Err(Error::Validation(format!(
                "{} has no video frames",
                request.output.display()
            )));
        }
        tokio::fs::rename(&partial, &request.output).await?;
        Ok::<_, Error>(info)
    }
    .await;

    if result.is_err()
        && let Err(e) = tokio::fs::remove_file(&partial).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {}", partial.display(), e);
    }
    result
}

/// Builds the ffmpeg argument list for a trim. Seeking happens before the
/// input so ffmpeg skips straight to the keyframe preceding `start`.
pub fn trim_args(request: &TrimRequest) -> Vec<OsString> {
    let encode = &request.encode;
    let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(OsString::from)
        .collect();

    args.push("-ss".into());
    args.push(format!("{:.3}", request.start).into());
    args.push("-t".into());
    args.push(format!("{:.3}", request.duration).into());
    args.push("-i".into());
    args.push(request.input.clone().into_os_string());

    if let Some(fps) = encode.fps {
        args.push("-r".into());
        args.push(format!("{}", fps).into());
    }
    args.push("-c:v".into());
    args.push(encode.encoder.clone().into());
    if let Some(preset) = &encode.preset {
        args.push("-preset".into());
        args.push(preset.into());
    }
    if let Some(crf) = encode.crf {
        args.push("-crf".into());
        args.push(crf.to_string().into());
    }
    if let Some(bitrate) = &encode.bitrate {
        args.push("-b:v".into());
        args.push(bitrate.into());
    }
    if let Some(pix_fmt) = &encode.pix_fmt {
        args.push("-pix_fmt".into());
        args.push(pix_fmt.into());
    }
    if !encode.audio {
        args.push("-an".into());
    }
    args.push(request.output.clone().into_os_string());
    args
}

impl MediaTool for Ffmpeg {
    async fn trim(&self, request: &TrimRequest) -> Result<(), Error> {
        let args = trim_args(request);
        trace!("{} {:?}", self.ffmpeg.display(), args);

        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Trim(format!("failed to run {}: {}", self.ffmpeg.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Trim(format!(
                "{} exited with {}: {}",
                self.ffmpeg.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, Error> {
        let mut command = Command::new(&self.ffprobe);
        command
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.probe_timeout, command.output())
            .await
            .map_err(|_| Error::Probe(format!("{}: ffprobe timeout", path.display())))?
            .map_err(|e| {
                Error::Probe(format!("failed to run {}: {}", self.ffprobe.display(), e))
            })?;

        if !output.status.success() {
            return Err(Error::Probe(format!(
                "{}: ffprobe exited with {}",
                path.display(),
                output.status
            )));
        }

        let info = parse_probe_output(&output.stdout)?;
        debug!(
            "Probed {}: {:.2}s, {} frames, {}",
            path.display(),
            info.duration,
            info.frames,
            info.resolution()
        );
        Ok(info)
    }
}

#[derive(Deserialize, Default)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Deserialize, Default)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize, Default)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parses `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(stdout: &[u8]) -> Result<MediaInfo, Error> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)?;

    let Some(stream) = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    else {
        return Ok(MediaInfo {
            duration: parse_seconds(probe.format.duration.as_deref()),
            ..Default::default()
        });
    };

    let duration = match parse_seconds(probe.format.duration.as_deref()) {
        d if d > 0.0 => d,
        _ => parse_seconds(stream.duration.as_deref()),
    };
    let fps = stream
        .r_frame_rate
        .as_deref()
        .map(parse_frame_rate)
        .unwrap_or(0.0);
    let frames = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round() as u64);

    Ok(MediaInfo {
        duration,
        frames,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        codec: stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        fps,
        has_video: true,
    })
}

fn parse_seconds(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Parses an ffprobe rational such as `30000/1001`. Malformed or zero
/// denominators yield `0.0`.
pub fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(n), Ok(d)) if d != 0.0 => n / d,
            _ => 0.0,
        },
        None => rate.trim().parse().unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_MP4: &str = r#"{
        "streams": [
            {"codec_type": "audio", "codec_name": "aac"},
            {"codec_type": "video", "codec_name": "h264", "width": 640, "height": 360,
             "nb_frames": "150", "r_frame_rate": "30/1", "duration": "5.000000"}
        ],
        "format": {"duration": "5.005000"}
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(PROBE_MP4.as_bytes()).unwrap();
        assert!(info.has_video);
        assert_eq!(info.frames, 150);
        assert_eq!(info.codec, "h264");
        assert_eq!(info.resolution(), "640x360");
        assert_eq!(info.fps, 30.0);
        assert!((info.duration - 5.005).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_estimates_frames() {
        let json = r#"{"streams":[{"codec_type":"video","r_frame_rate":"25/1"}],
                       "format":{"duration":"4.0"}}"#;
        let info = parse_probe_output(json.as_bytes()).unwrap();
        assert_eq!(info.frames, 100);
        assert_eq!(info.codec, "unknown");
    }

    #[test]
    fn test_parse_probe_without_video() {
        let json = r#"{"streams":[{"codec_type":"audio"}],"format":{"duration":"3.0"}}"#;
        let info = parse_probe_output(json.as_bytes()).unwrap();
        assert!(!info.has_video);
        assert_eq!(info.frames, 0);
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[test]
    fn test_partial_path_keeps_extension() {
        let partial = partial_path(Path::new("clips/abc123_15.0s_5.0s.mp4"));
        assert_eq!(partial, PathBuf::from("clips/abc123_15.0s_5.0s.part.mp4"));
        assert!(is_partial(&partial));
        assert!(!is_partial(Path::new("clips/abc123_15.0s_5.0s.mp4")));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), 0.0);
        assert_eq!(parse_frame_rate("24"), 24.0);
        assert_eq!(parse_frame_rate("abc"), 0.0);
    }

    #[test]
    fn test_trim_args_for_clip() {
        let request = TrimRequest {
            input: PathBuf::from("videos/abc123.mkv"),
            output: PathBuf::from("clips/abc123_15.0s_5.0s.mp4"),
            start: 12.5,
            duration: 5.0,
            encode: EncodeOptions::clip(),
        };
        let args: Vec<String> = trim_args(&request)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let joined = args.join(" ");

        assert!(joined.starts_with("-y -hide_banner -loglevel error -ss 12.500 -t 5.000 -i"));
        assert!(joined.contains("-c:v libx264 -crf 28 -pix_fmt yuv420p -an"));
        assert_eq!(args.last().unwrap(), "clips/abc123_15.0s_5.0s.mp4");
        assert!(!joined.contains("-r "));
    }

    #[test]
    fn test_trim_args_for_source() {
        let request = TrimRequest {
            input: PathBuf::from("in.webm"),
            output: PathBuf::from("out.mp4"),
            start: 900.0,
            duration: 901.0,
            encode: EncodeOptions {
                encoder: "h264_nvenc".to_string(),
                ..EncodeOptions::source()
            },
        };
        let joined = trim_args(&request)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        assert!(joined.contains("-r 30 -c:v h264_nvenc -preset fast -b:v 2M -an out.mp4"));
    }
}
