// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Semantic mask archive download.

use crate::{Error, Progress};
use futures::StreamExt as _;
use log::{debug, info, warn};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs::File, io::AsyncWriteExt as _, sync::mpsc::Sender};

/// Name the archive is stored under while it is extracted.
pub const MASKS_ARCHIVE: &str = "ava_masks.zip";

#[derive(Clone, Debug, Default)]
pub struct MasksReport {
    pub archive_bytes: u64,
    /// Files written by the extraction.
    pub extracted: usize,
}

/// Downloads the mask archive from `url`, extracts it into `data_dir` and
/// removes the archive. Progress is reported in bytes.
pub async fn download_masks(
    url: &str,
    data_dir: &Path,
    timeout: Duration,
    progress: Option<Sender<Progress>>,
) -> Result<MasksReport, Error> {
    let url = url::Url::parse(url)?;
    tokio::fs::create_dir_all(data_dir).await?;
    let archive = data_dir.join(MASKS_ARCHIVE);

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()?;

    info!("Downloading masks from {}", url);
    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| Error::Network(format!("{}: {}", url, e)))?;
    if !resp.status().is_success() {
        return Err(Error::Network(format!("{}: HTTP {}", url, resp.status())));
    }
    // Drive answers large files with an HTML confirmation page.
    if let Some(kind) = resp.headers().get(reqwest::header::CONTENT_TYPE)
        && kind.to_str().unwrap_or_default().starts_with("text/html")
    {
        return Err(Error::Network(format!(
            "{}: received an HTML page instead of an archive",
            url
        )));
    }

    let written = match write_archive(resp, &archive, &url, progress).await {
        Ok(written) => written,
        Err(err) => {
            if let Err(e) = tokio::fs::remove_file(&archive).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!("Failed to remove {}: {}", archive.display(), e);
            }
            return Err(err);
        }
    };

    let extracted = extract_archive(&archive, data_dir);
    if let Err(e) = std::fs::remove_file(&archive) {
        warn!("Failed to remove {}: {}", archive.display(), e);
    }
    let extracted = extracted?;

    info!(
        "Extracted {} files from the mask archive into {}",
        extracted.len(),
        data_dir.display()
    );
    Ok(MasksReport {
        archive_bytes: written,
        extracted: extracted.len(),
    })
}

/// Streams the response body into `archive` and returns the bytes written.
/// A body shorter than its advertised length is an error.
async fn write_archive(
    resp: reqwest::Response,
    archive: &Path,
    url: &url::Url,
    progress: Option<Sender<Progress>>,
) -> Result<u64, Error> {
    let expected = resp.content_length();
    let total = expected.unwrap_or(0) as usize;
    let mut file = File::create(archive).await?;
    let mut written = 0usize;
    let mut stream = resp.bytes_stream();
    while let Some(item) = stream.next().await {
        let chunk = item.map_err(|e| Error::Network(format!("{}: {}", url, e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len();

        if let Some(progress) = &progress {
            let _ = progress
                .send(Progress {
                    current: written,
                    total,
                })
                .await;
        }
    }
    file.flush().await?;

    if let Some(expected) = expected
        && expected != written as u64
    {
        return Err(Error::Network(format!(
            "{}: received {} of {} bytes",
            url, written, expected
        )));
    }
    Ok(written as u64)
}

/// Extracts every entry of a ZIP archive below `dir` and returns the paths
/// of the extracted files. Entries escaping `dir` are rejected.
pub fn extract_archive(archive: &Path, dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut files = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(Error::InvalidParameters(format!(
                "archive entry {:?} escapes the output directory",
                entry.name()
            )));
        };
        let path = dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!("Extracting {}", path.display());
        let mut out = std::fs::File::create(&path)?;
        std::io::copy(&mut entry, &mut out)?;
        files.push(path);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_archive() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive = dir.path().join("masks.zip");
        write_zip(
            &archive,
            &[("ava/masks/a.pkl", b"aaaa"), ("ava/masks/b.pkl", b"bb")],
        );

        let out = dir.path().join("data");
        let files = extract_archive(&archive, &out).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(std::fs::read(out.join("ava/masks/b.pkl")).unwrap(), b"bb");
    }

    #[test]
    fn test_extract_rejects_escaping_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../outside.txt", b"x")]);

        let out = dir.path().join("data");
        assert!(matches!(
            extract_archive(&archive, &out),
            Err(Error::InvalidParameters(_))
        ));
        assert!(!dir.path().join("outside.txt").exists());
    }
}
