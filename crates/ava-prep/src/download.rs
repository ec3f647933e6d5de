// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Source video downloader.
//!
//! Videos are fetched from `{base_url}/{split}/{file_name}` into the split's
//! video directory. A file that already exists locally is never requested
//! again, so re-running the downloader only fills gaps. Bodies are streamed
//! into a `.part` file that is renamed into place once its length matches the
//! advertised `Content-Length`; an existing video is therefore always a
//! complete one.
//!
//! Failures are logged and the batch continues. Nothing is retried.

use crate::{Error, Progress, Split, VideoAsset};
use futures::StreamExt as _;
use log::{debug, info, warn};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt as _,
    sync::mpsc::Sender,
};
use url::Url;

/// Public bucket the AVA videos are distributed from.
pub const DEFAULT_BASE_URL: &str = "https://s3.amazonaws.com/ava-dataset";

/// Result of a single file download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched and written; carries the number of bytes.
    Downloaded(u64),
    /// Already present locally, no request made.
    Skipped,
}

/// Summary of a download run.
#[derive(Clone, Debug, Default)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub skipped: usize,
    /// HTTP requests issued.
    pub requests: usize,
    pub bytes: u64,
    /// `(file_name, reason)` of each failed download.
    pub failed: Vec<(String, String)>,
}

impl DownloadReport {
    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failed.len()
    }
}

/// Downloads the videos of one split.
#[derive(Clone, Debug)]
pub struct Downloader {
    http: reqwest::Client,
    base_url: Url,
    split: Split,
    output_dir: PathBuf,
}

impl Downloader {
    /// Creates a downloader writing into `output_dir`.
    ///
    /// `timeout` bounds a whole request including the body, so it must
    /// cover the largest video at the expected bandwidth.
    pub fn new(
        base_url: &str,
        split: Split,
        output_dir: PathBuf,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        // Url::join replaces the last segment unless the base ends in '/'.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{}/", base_url))?
        };

        Ok(Self {
            http,
            base_url,
            split,
            output_dir,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Remote URL of a video file for this split.
    pub fn url_for(&self, file_name: &str) -> Result<Url, Error> {
        Ok(self
            .base_url
            .join(&format!("{}/", self.split))?
            .join(file_name)?)
    }

    /// Downloads every listed file, one at a time. Per-file failures are
    /// logged and recorded in the report; only a failure to create the output
    /// directory aborts the run.
    pub async fn download_all(
        &self,
        file_names: &[String],
        progress: Option<Sender<Progress>>,
    ) -> Result<DownloadReport, Error> {
        fs::create_dir_all(&self.output_dir).await?;

        let total = file_names.len();
        let mut report = DownloadReport::default();

        for (index, file_name) in file_names.iter().enumerate() {
            match self.download_file(file_name).await {
                Ok(DownloadOutcome::Skipped) => {
                    debug!("Skipped (already complete): {}", file_name);
                    report.skipped += 1;
                }
                Ok(DownloadOutcome::Downloaded(bytes)) => {
                    info!("Downloaded: {} ({} bytes)", file_name, bytes);
                    report.requests += 1;
                    report.downloaded += 1;
                    report.bytes += bytes;
                }
                Err(err) => {
                    if !matches!(err, Error::InvalidParameters(_)) {
                        report.requests += 1;
                    }
                    warn!("Failed to download {}: {}", file_name, err);
                    report.failed.push((file_name.clone(), err.to_string()));
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
            "Split {}: {} downloaded, {} skipped, {} failed",
            self.split,
            report.downloaded,
            report.skipped,
            report.failed.len()
        );
        Ok(report)
    }

    /// Downloads a single file unless it already exists.
    pub async fn download_file(&self, file_name: &str) -> Result<DownloadOutcome, Error> {
        if file_name.contains('/') || file_name.contains('\\') || file_name.starts_with('.') {
            return Err(Error::InvalidParameters(format!(
                "unexpected video file name {:?}",
                file_name
            )));
        }

        let asset = VideoAsset::from_file_name(file_name, &self.output_dir);
        if asset.is_local() {
            return Ok(DownloadOutcome::Skipped);
        }

        let path = self.output_dir.join(file_name);
        let partial = self.output_dir.join(format!("{}.part", file_name));

        match self.fetch(file_name, &partial).await {
            Ok(bytes) => {
                fs::rename(&partial, &path).await?;
                Ok(DownloadOutcome::Downloaded(bytes))
            }
            Err(err) => {
                match fs::remove_file(&partial).await {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                        warn!("Failed to remove {}: {}", partial.display(), e)
                    }
                    _ => {}
                }
                Err(err)
            }
        }
    }

    async fn fetch(&self, file_name: &str, partial: &Path) -> Result<u64, Error> {
        let url = self.url_for(file_name)?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::Network(format!("{}: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!("{}: HTTP {}", url, resp.status())));
        }

        let expected = resp.content_length();
        let mut file = File::create(partial).await?;
        let mut written: u64 = 0;
        let mut stream = resp.bytes_stream();

        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|e| Error::Network(format!("{}: {}", url, e)))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        match expected {
            Some(expected) if expected != written => Err(Error::IncompleteDownload {
                expected,
                actual: written,
            }),
            _ => Ok(written),
        }
    }
}
