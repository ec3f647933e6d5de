// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Clip windows, deterministic clip file names and sampling plans.
//!
//! A clip is identified by `(video_id, timestamp, duration)` and always
//! written to `{video_id}_{timestamp:.1}s_{duration:.1}s.mp4`, so re-running
//! the sampler finds previous output at the same path.

use crate::{
    Error,
    annotation::{AnnotationRecord, timestamp_key},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Extension of every sampled clip.
pub const CLIP_EXTENSION: &str = "mp4";

/// Time range of a clip in the source video, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipWindow {
    pub start: f64,
    pub duration: f64,
}

impl ClipWindow {
    /// Window of `duration` seconds centred on `center`. The start is
    /// clamped at zero and the full duration kept.
    pub fn centered(center: f64, duration: f64) -> Self {
        Self {
            start: (center - duration / 2.0).max(0.0),
            duration,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// How annotation timestamps map to clip windows.
#[derive(Clone, Debug, PartialEq)]
pub enum ClipStrategy {
    /// One window of `duration` seconds per distinct keyframe.
    Fixed { duration: f64 },
    /// Merge nearby keyframes of a video into one variable-length window.
    Clustered {
        /// Keyframes closer than this many seconds join the same cluster.
        window: f64,
        min_duration: f64,
        max_duration: f64,
        /// Padding added to the cluster span before clamping.
        buffer: f64,
    },
}

impl Default for ClipStrategy {
    fn default() -> Self {
        ClipStrategy::Fixed { duration: 5.0 }
    }
}

impl ClipStrategy {
    pub fn validate(&self) -> Result<(), Error> {
        match *self {
            ClipStrategy::Fixed { duration } if duration > 0.0 => Ok(()),
            ClipStrategy::Fixed { duration } => Err(Error::InvalidParameters(format!(
                "clip duration must be positive, got {}",
                duration
            ))),
            ClipStrategy::Clustered {
                window,
                min_duration,
                max_duration,
                buffer,
            } => {
                if window <= 0.0 || min_duration <= 0.0 || buffer < 0.0 {
                    return Err(Error::InvalidParameters(
                        "cluster window and min duration must be positive".to_string(),
                    ));
                }
                if max_duration < min_duration {
                    return Err(Error::InvalidParameters(format!(
                        "max duration {} below min duration {}",
                        max_duration, min_duration
                    )));
                }
                Ok(())
            }
        }
    }
}

/// A clip planned or produced by the sampler.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipAsset {
    pub source_video_id: String,
    /// Keyframe the clip is built around; part of the file name.
    pub timestamp: f64,
    pub window: ClipWindow,
    pub output_path: PathBuf,
}

impl ClipAsset {
    pub fn new(video_id: &str, timestamp: f64, duration: f64, clip_dir: &Path) -> Self {
        Self {
            source_video_id: video_id.to_string(),
            timestamp,
            window: ClipWindow::centered(timestamp, duration),
            output_path: clip_dir.join(clip_file_name(video_id, timestamp, duration)),
        }
    }

    pub fn start_time(&self) -> f64 {
        self.window.start
    }

    pub fn duration(&self) -> f64 {
        self.window.duration
    }
}

pub fn clip_file_name(video_id: &str, timestamp: f64, duration: f64) -> String {
    format!(
        "{}_{:.1}s_{:.1}s.{}",
        video_id, timestamp, duration, CLIP_EXTENSION
    )
}

/// Identity recovered from a clip file name.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipName {
    pub video_id: String,
    pub timestamp: f64,
    pub duration: f64,
}

/// Inverse of [`clip_file_name`]. Video ids may themselves contain `_`,
/// so the name is split from the right.
pub fn parse_clip_file_name(file_name: &str) -> Result<ClipName, Error> {
    let invalid = || Error::InvalidClipName(file_name.to_string());
    let stem = file_name
        .strip_suffix(CLIP_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .ok_or_else(invalid)?;

    let mut parts = stem.rsplitn(3, '_');
    let duration = parts.next().ok_or_else(invalid)?;
    let timestamp = parts.next().ok_or_else(invalid)?;
    let video_id = parts.next().filter(|v| !v.is_empty()).ok_or_else(invalid)?;

    let seconds = |s: &str| -> Result<f64, Error> {
        s.strip_suffix('s')
            .ok_or_else(invalid)?
            .parse::<f64>()
            .map_err(|_| invalid())
    };

    Ok(ClipName {
        video_id: video_id.to_string(),
        timestamp: seconds(timestamp)?,
        duration: seconds(duration)?,
    })
}

/// Groups timestamps into clusters and returns `(center, duration)` pairs.
///
/// Sorted, deduplicated timestamps join the running cluster while the gap to
/// the previous one is below `window`. Each cluster spans `end - start +
/// buffer` clamped to `[min_duration, max_duration]` and is centred on the
/// median keyframe, truncated to whole seconds.
pub fn cluster_timestamps(
    timestamps: &[f64],
    window: f64,
    min_duration: f64,
    max_duration: f64,
    buffer: f64,
) -> Vec<(f64, f64)> {
    let mut unique: Vec<f64> = timestamps.to_vec();
    unique.sort_by(f64::total_cmp);
    unique.dedup_by(|a, b| timestamp_key(*a) == timestamp_key(*b));

    let mut clusters: Vec<Vec<f64>> = Vec::new();
    for t in unique {
        match clusters.last_mut() {
            Some(current) if current.last().is_some_and(|last| t - last < window) => {
                current.push(t)
            }
            _ => clusters.push(vec![t]),
        }
    }

    clusters
        .into_iter()
        .map(|cluster| {
            let start = cluster[0];
            let end = cluster[cluster.len() - 1];
            let duration = (end - start + buffer).max(min_duration).min(max_duration);
            (median(&cluster).trunc(), duration)
        })
        .collect()
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Plans one clip per distinct `(video_id, timestamp, duration)` of the
/// records, ordered by video id and time.
pub fn plan_clips(
    records: &[AnnotationRecord],
    strategy: &ClipStrategy,
    clip_dir: &Path,
) -> Vec<ClipAsset> {
    let mut by_video: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        by_video
            .entry(record.video_id.as_str())
            .or_default()
            .push(record.timestamp);
    }

    let mut clips = Vec::new();
    for (video_id, timestamps) in by_video {
        let mut windows: Vec<(f64, f64)> = match *strategy {
            ClipStrategy::Fixed { duration } => {
                timestamps.iter().map(|t| (*t, duration)).collect()
            }
            ClipStrategy::Clustered {
                window,
                min_duration,
                max_duration,
                buffer,
            } => cluster_timestamps(&timestamps, window, min_duration, max_duration, buffer),
        };
        windows.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        windows.dedup_by(|a, b| {
            clip_file_name(video_id, a.0, a.1) == clip_file_name(video_id, b.0, b.1)
        });

        clips.extend(windows.into_iter().map(|(timestamp, duration)| {
            ClipAsset::new(video_id, timestamp, duration, clip_dir)
        }));
    }
    clips
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::parse_annotations;

    #[test]
    fn test_fixed_window_around_keyframe() {
        let clip = ClipAsset::new("abc123", 15.0, 5.0, Path::new("/clips"));
        assert_eq!(clip.start_time(), 12.5);
        assert_eq!(clip.window.end(), 17.5);
        let path = clip.output_path.to_string_lossy().into_owned();
        assert!(path.contains("abc123"));
        assert!(path.contains("15.0"));
        assert_eq!(path, "/clips/abc123_15.0s_5.0s.mp4");
    }

    #[test]
    fn test_window_clamped_at_zero() {
        let window = ClipWindow::centered(1.0, 5.0);
        assert_eq!(window.start, 0.0);
        assert_eq!(window.duration, 5.0);
    }

    #[test]
    fn test_parse_clip_file_name_with_underscores() {
        let name = clip_file_name("a_b-c_d", 902.0, 5.0);
        let parsed = parse_clip_file_name(&name).unwrap();
        assert_eq!(parsed.video_id, "a_b-c_d");
        assert_eq!(parsed.timestamp, 902.0);
        assert_eq!(parsed.duration, 5.0);

        assert!(parse_clip_file_name("abc.mp4").is_err());
        assert!(parse_clip_file_name("abc_15.0_5.0s.mp4").is_err());
        assert!(parse_clip_file_name("abc_15.0s_5.0s.mkv").is_err());
        assert!(parse_clip_file_name("_15.0s_5.0s.mp4").is_err());
    }

    #[test]
    fn test_plan_dedupes_keyframes() {
        let records = parse_annotations(
            "abc,15,0,0,1,1,80,0\nabc,15,0,0,1,1,12,1\nabc,18,0,0,1,1,80,0\nxyz,902,0,0,1,1,1,0\n",
        )
        .unwrap();
        let plan = plan_clips(&records, &ClipStrategy::default(), Path::new("clips"));

        let names: Vec<_> = plan
            .iter()
            .map(|c| c.output_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "abc_15.0s_5.0s.mp4",
                "abc_18.0s_5.0s.mp4",
                "xyz_902.0s_5.0s.mp4"
            ]
        );
    }

    #[test]
    fn test_cluster_splits_on_gap() {
        // span 10..13 + 1 -> 4, raised to the 7 second minimum
        let clusters = cluster_timestamps(&[10.0, 10.0, 12.0, 13.0, 30.0], 5.0, 7.0, 15.0, 1.0);
        assert_eq!(clusters, vec![(12.0, 7.0), (30.0, 7.0)]);
    }

    #[test]
    fn test_cluster_uses_median_and_caps_duration() {
        let timestamps: Vec<f64> = (0..10).map(|i| 900.0 + 3.0 * i as f64).collect();
        let clusters = cluster_timestamps(&timestamps, 5.0, 7.0, 15.0, 1.0);
        assert_eq!(clusters.len(), 1);
        // median of 900..927 step 3 is 913.5, truncated
        assert_eq!(clusters[0], (913.0, 15.0));
    }

    #[test]
    fn test_strategy_validation() {
        assert!(ClipStrategy::default().validate().is_ok());
        assert!(ClipStrategy::Fixed { duration: 0.0 }.validate().is_err());
        assert!(
            ClipStrategy::Clustered {
                window: 5.0,
                min_duration: 7.0,
                max_duration: 3.0,
                buffer: 1.0
            }
            .validate()
            .is_err()
        );
    }
}
