// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # AVA Dataset Preparation Library
//!
//! Prepares the AVA spatio-temporal action dataset for training video
//! models. The pipeline has three stages, each of which can be re-run
//! safely and only does the work that is still missing:
//!
//! - **Download**: fetch the source movies of a split (`trainval` or
//!   `test`) from the public bucket, skipping files already present.
//! - **Sample**: cut a short clip around every annotated keyframe with
//!   `ffmpeg`, skipping clips that already exist.
//! - **Manifest**: list every valid clip with its video id, keyframe
//!   timestamp and action labels in a CSV file.
//!
//! Supporting tools trim source movies to the annotated segment, check
//! video integrity, report resolutions and fetch the semantic masks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ava_prep::{Config, Error, Sampler, annotation::read_annotations};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let config = Config::load(None)?;
//!     let records = read_annotations(&config.annotations())?;
//!
//!     let sampler = Sampler::new(config.media_tool(), config.video_dir(), config.clip_dir())
//!         .with_strategy(config.clip.strategy());
//!     let report = sampler.run(&records, None).await?;
//!     println!("{} clips extracted", report.extracted.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `polars`: builds the manifest as a Polars DataFrame and writes it as an
//!   Arrow IPC file.

pub mod annotation;
pub mod check;
pub mod clip;
pub mod config;
pub mod download;
mod error;
pub mod manifest;
pub mod masks;
pub mod media;
pub mod sample;
pub mod trim;
pub mod video;

pub use crate::{
    annotation::{AnnotationIndex, AnnotationRecord},
    clip::{ClipAsset, ClipStrategy, ClipWindow},
    config::Config,
    download::{DownloadReport, Downloader},
    error::Error,
    manifest::{ManifestReport, ManifestRow},
    media::{Ffmpeg, MediaInfo, MediaTool},
    sample::{SampleReport, Sampler},
    trim::Trimmer,
    video::{Split, VideoAsset},
};

/// Progress of a long-running stage.
///
/// Stages accept an optional `tokio::sync::mpsc::Sender<Progress>` and send
/// one update per processed item, or per received chunk for byte-oriented
/// transfers.
///
/// ```rust
/// use ava_prep::Progress;
///
/// let progress = Progress {
///     current: 3,
///     total: 12,
/// };
/// assert_eq!(progress.percent(), 25.0);
/// ```
#[derive(Debug, Clone)]
pub struct Progress {
    /// Items completed so far.
    pub current: usize,
    /// Total number of items; zero when unknown.
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 * 100.0 / self.total as f64
        }
    }
}
