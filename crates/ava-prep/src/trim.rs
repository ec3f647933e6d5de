// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Source video trimming.
//!
//! AVA only annotates minutes 15 to 30 of each movie. Trimming the sources to
//! that segment, re-encoded at a constant frame rate, shrinks the download
//! tree considerably and makes clip seeks cheap.

use crate::{
    Error, Progress,
    check::find_videos,
    media::{EncodeOptions, MediaTool, TrimRequest, trim_validated},
};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::{fs, sync::mpsc::Sender};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrimOutcome {
    Trimmed,
    /// A valid output already exists.
    Skipped,
}

#[derive(Clone, Debug, Default)]
pub struct TrimReport {
    pub trimmed: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct Trimmer<T> {
    tool: T,
    output_dir: PathBuf,
    start: f64,
    duration: f64,
    encode: EncodeOptions,
}

impl<T: MediaTool> Trimmer<T> {
    pub fn new(tool: T, output_dir: PathBuf, start: f64, duration: f64) -> Self {
        Self {
            tool,
            output_dir,
            start,
            duration,
            encode: EncodeOptions::source(),
        }
    }

    pub fn with_encode(mut self, encode: EncodeOptions) -> Self {
        self.encode = encode;
        self
    }

    /// `{output_dir}/{stem}.mp4` for a source video.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_dir.join(format!("{}.mp4", stem))
    }

    /// Trims every video found under `video_dir`.
    pub async fn run(
        &self,
        video_dir: &Path,
        progress: Option<Sender<Progress>>,
    ) -> Result<TrimReport, Error> {
        if self.duration <= 0.0 || self.start < 0.0 {
            return Err(Error::InvalidParameters(format!(
                "trim window start={} duration={} is invalid",
                self.start, self.duration
            )));
        }
        let videos = find_videos(video_dir)?;
        fs::create_dir_all(&self.output_dir).await?;

        let total = videos.len();
        let mut report = TrimReport::default();
        info!(
            "Trimming {} videos to {:.0}s from {:.0}s",
            total, self.duration, self.start
        );

        for (index, input) in videos.iter().enumerate() {
            match self.trim_video(input).await {
                Ok(TrimOutcome::Trimmed) => {
                    info!("Trimmed: {}", input.display());
                    report.trimmed += 1;
                }
                Ok(TrimOutcome::Skipped) => {
                    debug!("Skipped (already trimmed): {}", input.display());
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!("Failed to trim {}: {}", input.display(), err);
                    report.failed.push((input.clone(), err.to_string()));
                }
            }

            if let Some(progress) = &progress {
                let _ = progress
                    .send(Progress {
                        current: index + 1,
                        total,
                    })
                    .await;
            }
        }
        Ok(report)
    }

    pub async fn trim_video(&self, input: &Path) -> Result<TrimOutcome, Error> {
        let output = self.output_path(input);
        if output == input {
            return Err(Error::InvalidParameters(format!(
                "output would overwrite source {}",
                input.display()
            )));
        }

        if output.exists() {
            match self.tool.probe(&output).await {
                Ok(info) if info.frames > 0 => return Ok(TrimOutcome::Skipped),
                _ => debug!("Replacing invalid output {}", output.display()),
            }
        }

        let request = TrimRequest {
            input: input.to_path_buf(),
            output: output.clone(),
            start: self.start,
            duration: self.duration,
            encode: self.encode.clone(),
        };
        trim_validated(&self.tool, &request).await?;
        Ok(TrimOutcome::Trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Ffmpeg;

    #[test]
    fn test_output_path_uses_mp4() {
        let trimmer = Trimmer::new(Ffmpeg::default(), PathBuf::from("/out"), 900.0, 901.0);
        assert_eq!(
            trimmer.output_path(Path::new("/videos/053oq2xB3oU.mkv")),
            PathBuf::from("/out/053oq2xB3oU.mp4")
        );
    }

    #[tokio::test]
    async fn test_rejects_in_place_trim() {
        let trimmer = Trimmer::new(Ffmpeg::default(), PathBuf::from("/videos"), 900.0, 901.0);
        assert!(matches!(
            trimmer.trim_video(Path::new("/videos/a.mp4")).await,
            Err(Error::InvalidParameters(_))
        ));
    }
}
