// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Clip sampler.
//!
//! Maps annotation keyframes to clip windows and cuts each window out of the
//! downloaded source video with the configured [`MediaTool`]. Clips that
//! already exist are left untouched, so a re-run only trims what is missing.

use crate::{
    AnnotationRecord, Error, Progress,
    clip::{ClipAsset, ClipStrategy, plan_clips},
    media::{EncodeOptions, MediaTool, TrimRequest, trim_validated},
    video::find_video,
};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::{fs, sync::mpsc::Sender};

/// Result of sampling one planned clip.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleOutcome {
    Extracted,
    /// Output already present, tool not invoked.
    Skipped,
}

/// Summary of a sampling run.
#[derive(Clone, Debug, Default)]
pub struct SampleReport {
    pub planned: usize,
    pub extracted: Vec<ClipAsset>,
    pub skipped: usize,
    /// Video ids whose source file was not found, one entry per clip.
    pub missing_source: Vec<String>,
    /// `(clip path, reason)` for trims that failed or produced no frames.
    pub failed: Vec<(PathBuf, String)>,
}

/// Cuts fixed or clustered windows around annotation keyframes.
pub struct Sampler<T> {
    tool: T,
    video_dir: PathBuf,
    clip_dir: PathBuf,
    strategy: ClipStrategy,
    encode: EncodeOptions,
}

impl<T: MediaTool> Sampler<T> {
    pub fn new(tool: T, video_dir: PathBuf, clip_dir: PathBuf) -> Self {
        Self {
            tool,
            video_dir,
            clip_dir,
            strategy: ClipStrategy::default(),
            encode: EncodeOptions::clip(),
        }
    }

    pub fn with_strategy(mut self, strategy: ClipStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_encode(mut self, encode: EncodeOptions) -> Self {
        self.encode = encode;
        self
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn clip_dir(&self) -> &Path {
        &self.clip_dir
    }

    /// Clips the records map to, in processing order.
    pub fn plan(&self, records: &[AnnotationRecord]) -> Vec<ClipAsset> {
        plan_clips(records, &self.strategy, &self.clip_dir)
    }

    /// Samples every planned clip. Missing sources and tool failures are
    /// logged and recorded; the run continues with the next clip.
    pub async fn run(
        &self,
        records: &[AnnotationRecord],
        progress: Option<Sender<Progress>>,
    ) -> Result<SampleReport, Error> {
        self.strategy.validate()?;
        fs::create_dir_all(&self.clip_dir).await?;

        let clips = self.plan(records);
        let total = clips.len();
        let mut report = SampleReport {
            planned: total,
            ..Default::default()
        };
        info!(
            "Sampling {} clips from {} annotation records",
            total,
            records.len()
        );

        for (index, clip) in clips.into_iter().enumerate() {
            match self.sample(&clip).await {
                Ok(SampleOutcome::Extracted) => {
                    info!("Extracted: {}", clip.output_path.display());
                    report.extracted.push(clip);
                }
                Ok(SampleOutcome::Skipped) => {
                    debug!("Skipped (already sampled): {}", clip.output_path.display());
                    report.skipped += 1;
                }
                Err(Error::MissingSource(video_id)) => {
                    warn!(
                        "Skipping {}: no source video for {} in {}",
                        clip.output_path.display(),
                        video_id,
                        self.video_dir.display()
                    );
                    report.missing_source.push(video_id);
                }
                Err(err) => {
                    warn!("Failed {}: {}", clip.output_path.display(), err);
                    report.failed.push((clip.output_path.clone(), err.to_string()));
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

        info!(
            "Sampled {} clips: {} extracted, {} skipped, {} missing source, {} failed",
            total,
            report.extracted.len(),
            report.skipped,
            report.missing_source.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Samples a single clip.
    pub async fn sample(&self, clip: &ClipAsset) -> Result<SampleOutcome, Error> {
        let source = find_video(&self.video_dir, &clip.source_video_id)
            .ok_or_else(|| Error::MissingSource(clip.source_video_id.clone()))?;
        if clip.output_path.exists() {
            return Ok(SampleOutcome::Skipped);
        }

        let request = TrimRequest {
            input: source,
            output: clip.output_path.clone(),
            start: clip.start_time(),
            duration: clip.duration(),
            encode: self.encode.clone(),
        };
        trim_validated(&self.tool, &request).await?;
        Ok(SampleOutcome::Extracted)
    }
}
