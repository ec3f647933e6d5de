// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Video integrity checks and resolution statistics.
//!
//! Both reports probe every video under a directory with a [`MediaTool`]. A
//! probe failure marks that video as invalid and the walk continues.

use crate::{
    Error, Progress,
    media::{MediaInfo, MediaTool, is_partial},
    video::VIDEO_EXTENSIONS,
};
use log::{debug, info, warn};
use std::{
    collections::BTreeMap,
    fmt,
    io::Write as _,
    path::{Path, PathBuf},
};
use tokio::sync::mpsc::Sender;
use walkdir::WalkDir;

/// Thresholds below which a detailed check flags a video.
pub const MIN_DURATION_SECS: f64 = 1.0;
pub const MIN_FRAMES: u64 = 10;
pub const MIN_SIDE_PX: u32 = 100;
pub const MIN_FPS: f64 = 1.0;

/// Lists video files below `dir`, sorted.
pub fn find_videos(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    if !dir.is_dir() {
        return Err(Error::MissingInput(dir.to_path_buf()));
    }
    let mut videos = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file()
            && crate::video::has_extension(entry.path(), VIDEO_EXTENSIONS)
            && !is_partial(entry.path())
        {
            videos.push(entry.into_path());
        }
    }
    videos.sort();
    Ok(videos)
}

/// Outcome of checking one video.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoCheck {
    pub path: PathBuf,
    pub size_mb: f64,
    pub info: Option<MediaInfo>,
    /// Probe failure or missing frames.
    pub error: Option<String>,
    /// Suspicious but readable properties, detailed mode only.
    pub issues: Vec<String>,
}

impl VideoCheck {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Flags properties that make a readable video unlikely to be useful.
pub fn find_issues(info: &MediaInfo) -> Vec<String> {
    let mut issues = Vec::new();
    if info.duration < MIN_DURATION_SECS {
        issues.push(format!("Very short duration: {:.2}s", info.duration));
    }
    if info.frames < MIN_FRAMES {
        issues.push(format!("Very few frames: {}", info.frames));
    }
    if info.width < MIN_SIDE_PX || info.height < MIN_SIDE_PX {
        issues.push(format!("Very low resolution: {}", info.resolution()));
    }
    if info.fps < MIN_FPS {
        issues.push(format!("Very low FPS: {:.2}", info.fps));
    }
    issues
}

/// Probes one video. In simple mode only the frame count is judged.
pub async fn check_video<T: MediaTool>(tool: &T, path: &Path, detailed: bool) -> VideoCheck {
    let size_mb = std::fs::metadata(path)
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0);
    let mut check = VideoCheck {
        path: path.to_path_buf(),
        size_mb,
        info: None,
        error: None,
        issues: Vec::new(),
    };

    match tool.probe(path).await {
        Ok(info) if !info.has_video || info.frames == 0 => {
            check.error = Some("no video frames".to_string());
            check.info = Some(info);
        }
        Ok(info) => {
            if detailed {
                check.issues = find_issues(&info);
            }
            check.info = Some(info);
        }
        Err(err) => check.error = Some(err.to_string()),
    }
    check
}

/// Checks every video under `dir`.
pub async fn check_videos<T: MediaTool>(
    tool: &T,
    dir: &Path,
    detailed: bool,
    progress: Option<Sender<Progress>>,
) -> Result<CheckSummary, Error> {
    let videos = find_videos(dir)?;
    let total = videos.len();
    info!("Checking {} videos in {}", total, dir.display());

    let mut summary = CheckSummary {
        detailed,
        checks: Vec::with_capacity(total),
    };
    for (index, path) in videos.iter().enumerate() {
        let check = check_video(tool, path, detailed).await;
        match &check.error {
            Some(error) => warn!("{}: {}", path.display(), error),
            None if !check.issues.is_empty() => {
                warn!("{}: {}", path.display(), check.issues.join(", "))
            }
            None => debug!("{}: ok", path.display()),
        }
        summary.checks.push(check);

        if let Some(progress) = &progress {
            let _ = progress
                .send(Progress {
                    current: index + 1,
                    total,
                })
                .await;
        }
    }
    Ok(summary)
}

/// Results of a directory check.
#[derive(Clone, Debug, Default)]
pub struct CheckSummary {
    pub detailed: bool,
    pub checks: Vec<VideoCheck>,
}

impl CheckSummary {
    pub fn valid(&self) -> impl Iterator<Item = &VideoCheck> {
        self.checks.iter().filter(|c| c.is_valid())
    }

    pub fn invalid(&self) -> impl Iterator<Item = &VideoCheck> {
        self.checks.iter().filter(|c| !c.is_valid())
    }

    pub fn with_issues(&self) -> impl Iterator<Item = &VideoCheck> {
        self.valid().filter(|c| !c.issues.is_empty())
    }

    pub fn has_errors(&self) -> bool {
        self.invalid().next().is_some()
    }

    /// Writes the paths of the invalid videos, one per line, below a
    /// timestamped comment.
    pub fn write_error_list(&self, path: &Path) -> Result<usize, Error> {
        let mut file = std::fs::File::create(path)?;
        writeln!(
            file,
            "# Videos that failed the check on {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        let mut count = 0;
        for check in self.invalid() {
            writeln!(file, "{}", check.path.display())?;
            count += 1;
        }
        Ok(count)
    }
}

/// `(min, max, mean)` of a non-empty sample.
fn stats(values: impl Iterator<Item = f64>) -> Option<(f64, f64, f64)> {
    let (mut min, mut max, mut sum, mut n) = (f64::INFINITY, f64::NEG_INFINITY, 0.0, 0usize);
    for v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
        n += 1;
    }
    (n > 0).then(|| (min, max, sum / n as f64))
}

impl fmt::Display for CheckSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let valid = self.valid().count();
        let invalid = self.checks.len() - valid;

        writeln!(
            f,
            "╔══════════════════════════════════════════════════════════════╗"
        )?;
        writeln!(
            f,
            "║                      VIDEO CHECK SUMMARY                     ║"
        )?;
        writeln!(
            f,
            "╠══════════════════════════════════════════════════════════════╣"
        )?;
        writeln!(f, "║ Videos:      {}", self.checks.len())?;
        writeln!(f, "║   Valid:     {}", valid)?;
        writeln!(f, "║   Invalid:   {}", invalid)?;
        for check in self.invalid().take(5) {
            writeln!(
                f,
                "║              - {} ({})",
                check.path.display(),
                check.error.as_deref().unwrap_or_default()
            )?;
        }
        if invalid > 5 {
            writeln!(f, "║              ... and {} more", invalid - 5)?;
        }

        if self.detailed {
            let flagged: Vec<_> = self.with_issues().collect();
            writeln!(f, "║   Issues:    {}", flagged.len())?;
            for check in flagged.iter().take(5) {
                writeln!(
                    f,
                    "║              - {}: {}",
                    check.path.display(),
                    check.issues.join(", ")
                )?;
            }
            if flagged.len() > 5 {
                writeln!(f, "║              ... and {} more", flagged.len() - 5)?;
            }

            let infos: Vec<&MediaInfo> = self.valid().filter_map(|c| c.info.as_ref()).collect();
            if !infos.is_empty() {
                writeln!(
                    f,
                    "╠══════════════════════════════════════════════════════════════╣"
                )?;
                writeln!(f, "║ Statistics (valid videos):     min / max / avg")?;
                if let Some((min, max, avg)) = stats(infos.iter().map(|i| i.duration)) {
                    writeln!(f, "║   Duration:  {:.2}s / {:.2}s / {:.2}s", min, max, avg)?;
                }
                if let Some((min, max, avg)) = stats(infos.iter().map(|i| i.frames as f64)) {
                    writeln!(f, "║   Frames:    {:.0} / {:.0} / {:.1}", min, max, avg)?;
                }
                if let Some((min, max, avg)) = stats(self.valid().map(|c| c.size_mb)) {
                    writeln!(f, "║   Size:      {:.2}MB / {:.2}MB / {:.2}MB", min, max, avg)?;
                }
            }
        }

        writeln!(
            f,
            "╚══════════════════════════════════════════════════════════════╝"
        )
    }
}

/// Frame size of one video.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionEntry {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Frame sizes of every readable video under a directory.
#[derive(Clone, Debug, Default)]
pub struct ResolutionReport {
    pub entries: Vec<ResolutionEntry>,
    pub failed: Vec<(PathBuf, String)>,
}

impl ResolutionReport {
    /// `(width, height)` to count, ordered by resolution.
    pub fn counts(&self) -> BTreeMap<(u32, u32), usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry((entry.width, entry.height)).or_insert(0) += 1;
        }
        counts
    }

    /// The `n` most frequent resolutions, ties broken by resolution.
    pub fn most_common(&self, n: usize) -> Vec<((u32, u32), usize)> {
        let mut counts: Vec<_> = self.counts().into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts.truncate(n);
        counts
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), Error> {
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "filename,width,height")?;
        for entry in &self.entries {
            writeln!(file, "{},{},{}", entry.file_name, entry.width, entry.height)?;
        }
        Ok(())
    }
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.entries.len();
        writeln!(f, "Videos:             {}", total)?;
        if total == 0 {
            return Ok(());
        }
        writeln!(f, "Unique resolutions: {}", self.counts().len())?;

        let widths = self.entries.iter().map(|e| e.width);
        let heights = self.entries.iter().map(|e| e.height);
        writeln!(
            f,
            "Width range:        {} - {}",
            widths.clone().min().unwrap_or_default(),
            widths.max().unwrap_or_default()
        )?;
        writeln!(
            f,
            "Height range:       {} - {}",
            heights.clone().min().unwrap_or_default(),
            heights.max().unwrap_or_default()
        )?;
        writeln!(f, "Most common:")?;
        for ((width, height), count) in self.most_common(5) {
            writeln!(
                f,
                "  {}x{}: {} ({:.1}%)",
                width,
                height,
                count,
                count as f64 * 100.0 / total as f64
            )?;
        }
        Ok(())
    }
}

/// Probes the frame size of every video under `dir`.
pub async fn collect_resolutions<T: MediaTool>(
    tool: &T,
    dir: &Path,
    progress: Option<Sender<Progress>>,
) -> Result<ResolutionReport, Error> {
    let videos = find_videos(dir)?;
    let total = videos.len();
    let mut report = ResolutionReport::default();

    for (index, path) in videos.into_iter().enumerate() {
        match tool.probe(&path).await {
            Ok(info) if info.has_video => report.entries.push(ResolutionEntry {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                width: info.width,
                height: info.height,
            }),
            Ok(_) => report.failed.push((path, "no video stream".to_string())),
            Err(err) => {
                warn!("{}: {}", path.display(), err);
                report.failed.push((path, err.to_string()));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn info(duration: f64, frames: u64, width: u32, height: u32, fps: f64) -> MediaInfo {
        MediaInfo {
            duration,
            frames,
            width,
            height,
            codec: "h264".to_string(),
            fps,
            has_video: true,
        }
    }

    #[test]
    fn test_find_issues() {
        assert!(find_issues(&info(5.0, 150, 640, 360, 30.0)).is_empty());

        let issues = find_issues(&info(0.2, 6, 64, 360, 0.5));
        assert_eq!(issues.len(), 4);
        assert!(issues[0].starts_with("Very short duration"));
        assert!(issues[1].starts_with("Very few frames"));
        assert_eq!(issues[2], "Very low resolution: 64x360");
        assert!(issues[3].starts_with("Very low FPS"));
    }

    #[test]
    fn test_most_common_resolutions() {
        let entry = |w, h| ResolutionEntry {
            file_name: format!("{}x{}.mp4", w, h),
            width: w,
            height: h,
        };
        let report = ResolutionReport {
            entries: vec![
                entry(640, 360),
                entry(1280, 720),
                entry(640, 360),
                entry(320, 240),
                entry(1280, 720),
                entry(640, 360),
            ],
            failed: Vec::new(),
        };

        assert_eq!(report.counts().len(), 3);
        assert_eq!(
            report.most_common(2),
            vec![((640, 360), 3), ((1280, 720), 2)]
        );
        let text = report.to_string();
        assert!(text.contains("Width range:        320 - 1280"));
        assert!(text.contains("640x360: 3 (50.0%)"));
    }

    #[test]
    fn test_error_list() {
        let dir = tempfile::TempDir::new().unwrap();
        let summary = CheckSummary {
            detailed: false,
            checks: vec![
                VideoCheck {
                    path: PathBuf::from("good.mp4"),
                    size_mb: 1.0,
                    info: Some(info(5.0, 150, 640, 360, 30.0)),
                    error: None,
                    issues: Vec::new(),
                },
                VideoCheck {
                    path: PathBuf::from("bad.mp4"),
                    size_mb: 0.0,
                    info: None,
                    error: Some("Probe failed: moov atom not found".to_string()),
                    issues: Vec::new(),
                },
            ],
        };
        assert!(summary.has_errors());

        let path = dir.path().join("error_videos.txt");
        assert_eq!(summary.write_error_list(&path).unwrap(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("# Videos that failed the check"));
        assert_eq!(&lines[1..], &["bad.mp4"]);
        assert!(summary.to_string().contains("Invalid:   1"));
    }
}
