// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Manifest generation.
//!
//! Walks the clip directory, keeps every clip that passes a minimal validity
//! check and writes one CSV row per clip:
//!
//! ```text
//! clip_path,video_id,timestamp,label
//! /data/ava/sampled_clips/abc123_15.0s_5.0s.mp4,abc123,15.0,12;80
//! ```
//!
//! Invalid clips are excluded without failing the run. The manifest is
//! rebuilt from the directory contents on every run, so a deleted clip drops
//! out of the next manifest.

use crate::{
    AnnotationIndex, Error, Progress,
    clip::{CLIP_EXTENSION, parse_clip_file_name},
    media::{MediaTool, is_partial},
    video::has_extension,
};
use log::{debug, info};
use std::{
    io::Write as _,
    path::{Path, PathBuf},
};
use tokio::sync::mpsc::Sender;
use walkdir::WalkDir;

pub const MANIFEST_HEADER: &str = "clip_path,video_id,timestamp,label";

/// One valid clip of the manifest.
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestRow {
    pub clip_path: PathBuf,
    pub video_id: String,
    pub timestamp: f64,
    pub label: String,
}

impl ManifestRow {
    pub fn to_csv(&self) -> String {
        [
            csv_field(&self.clip_path.to_string_lossy()),
            csv_field(&self.video_id),
            format!("{:.1}", self.timestamp),
            csv_field(&self.label),
        ]
        .join(",")
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Summary of a manifest run.
#[derive(Clone, Debug, Default)]
pub struct ManifestReport {
    pub rows: Vec<ManifestRow>,
    /// `(path, reason)` of every clip left out.
    pub excluded: Vec<(PathBuf, String)>,
}

/// Lists `*.mp4` files below `dir`, sorted.
pub fn find_clips(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    if !dir.is_dir() {
        return Err(Error::MissingInput(dir.to_path_buf()));
    }
    let mut clips = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file()
            && has_extension(entry.path(), &[CLIP_EXTENSION])
            && !is_partial(entry.path())
        {
            clips.push(entry.into_path());
        }
    }
    clips.sort();
    Ok(clips)
}

/// Validates one clip and derives its manifest row.
///
/// A clip is valid when it is non-empty, its name follows the clip naming
/// scheme, and the probe finds at least one video frame and `min_duration`
/// seconds of media.
pub async fn validate_clip<T: MediaTool>(
    tool: &T,
    path: &Path,
    annotations: &AnnotationIndex,
    min_duration: f64,
) -> Result<ManifestRow, Error> {
    let size = std::fs::metadata(path)?.len();
    if size == 0 {
        return Err(Error::Validation("empty file".to_string()));
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = parse_clip_file_name(&file_name)?;

    let info = tool.probe(path).await?;
    if !info.has_video || info.frames == 0 {
        return Err(Error::Validation("no video frames".to_string()));
    }
    if info.duration < min_duration {
        return Err(Error::Validation(format!(
            "duration {:.2}s below {:.2}s",
            info.duration, min_duration
        )));
    }

    Ok(ManifestRow {
        clip_path: path.to_path_buf(),
        label: annotations.label(&name.video_id, name.timestamp),
        video_id: name.video_id,
        timestamp: name.timestamp,
    })
}

/// Validates every clip under `clip_dir` and returns the rows of the valid
/// ones, sorted by path.
pub async fn collect_manifest<T: MediaTool>(
    tool: &T,
    clip_dir: &Path,
    annotations: &AnnotationIndex,
    min_duration: f64,
    progress: Option<Sender<Progress>>,
) -> Result<ManifestReport, Error> {
    let clips = find_clips(clip_dir)?;
    let total = clips.len();
    let mut report = ManifestReport::default();
    info!("Checking {} clips in {}", total, clip_dir.display());

    for (index, path) in clips.into_iter().enumerate() {
        match validate_clip(tool, &path, annotations, min_duration).await {
            Ok(row) => report.rows.push(row),
            Err(err) => {
                debug!("Excluding {}: {}", path.display(), err);
                report.excluded.push((path, err.to_string()));
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

/// Writes the manifest CSV. The file is assembled next to its destination
/// and renamed over it, so readers never observe a partial manifest.
pub fn write_manifest(rows: &[ManifestRow], output: &Path) -> Result<(), Error> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    writeln!(file, "{}", MANIFEST_HEADER)?;
    for row in rows {
        writeln!(file, "{}", row.to_csv())?;
    }
    file.flush()?;
    file.persist(output)?;
    Ok(())
}

/// Reads a manifest written by [`write_manifest`].
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRow>, Error> {
    if !path.is_file() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.is_empty() || (index == 0 && line == MANIFEST_HEADER) {
            continue;
        }
        let fields = split_csv_line(line);
        if fields.len() != 4 {
            return Err(Error::InvalidParameters(format!(
                "manifest line {} has {} fields",
                index + 1,
                fields.len()
            )));
        }
        rows.push(ManifestRow {
            clip_path: PathBuf::from(&fields[0]),
            video_id: fields[1].clone(),
            timestamp: fields[2].parse()?,
            label: fields[3].clone(),
        });
    }
    Ok(rows)
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Builds a dataframe with one row per manifest entry.
#[cfg(feature = "polars")]
pub fn manifest_dataframe(rows: &[ManifestRow]) -> Result<polars::prelude::DataFrame, Error> {
    use polars::prelude::*;

    let clip_path: Vec<String> = rows
        .iter()
        .map(|r| r.clip_path.to_string_lossy().into_owned())
        .collect();
    let video_id: Vec<&str> = rows.iter().map(|r| r.video_id.as_str()).collect();
    let timestamp: Vec<f64> = rows.iter().map(|r| r.timestamp).collect();
    let label: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();

    Ok(DataFrame::new(vec![
        Series::new("clip_path".into(), clip_path).into(),
        Series::new("video_id".into(), video_id).into(),
        Series::new("timestamp".into(), timestamp).into(),
        Series::new("label".into(), label).into(),
    ])?)
}

/// Writes the manifest as an Arrow IPC file.
#[cfg(feature = "polars")]
pub fn write_manifest_arrow(rows: &[ManifestRow], output: &Path) -> Result<(), Error> {
    use polars::prelude::*;

    let mut df = manifest_dataframe(rows)?;
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(output)?;
    IpcWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(path: &str, video_id: &str, timestamp: f64, label: &str) -> ManifestRow {
        ManifestRow {
            clip_path: PathBuf::from(path),
            video_id: video_id.to_string(),
            timestamp,
            label: label.to_string(),
        }
    }

    #[test]
    fn test_row_to_csv_quotes_when_needed() {
        assert_eq!(
            row("clips/abc_15.0s_5.0s.mp4", "abc", 15.0, "12;80").to_csv(),
            "clips/abc_15.0s_5.0s.mp4,abc,15.0,12;80"
        );
        assert_eq!(
            row("my,clips/a_1.0s_5.0s.mp4", "a", 1.0, "").to_csv(),
            "\"my,clips/a_1.0s_5.0s.mp4\",a,1.0,"
        );
    }

    #[test]
    fn test_write_then_read_manifest() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out").join("manifest.csv");
        let rows = vec![
            row("clips/a_1.0s_5.0s.mp4", "a", 1.0, "3"),
            row("odd \"dir\",x/b_2.0s_5.0s.mp4", "b", 2.0, ""),
        ];

        write_manifest(&rows, &output).unwrap();
        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with(MANIFEST_HEADER));
        assert_eq!(read_manifest(&output).unwrap(), rows);
    }

    #[test]
    fn test_find_clips_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b_1.0s_5.0s.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("nested/a_1.0s_5.0s.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let clips = find_clips(dir.path()).unwrap();
        assert_eq!(
            clips,
            vec![
                dir.path().join("b_1.0s_5.0s.mp4"),
                dir.path().join("nested/a_1.0s_5.0s.mp4"),
            ]
        );
        assert!(matches!(
            find_clips(&dir.path().join("absent")),
            Err(Error::MissingInput(_))
        ));
    }

    #[cfg(feature = "polars")]
    #[test]
    fn test_manifest_dataframe() {
        let df = manifest_dataframe(&[row("c/a_1.0s_5.0s.mp4", "a", 1.0, "3")]).unwrap();
        assert_eq!(df.shape(), (1, 4));
        assert_eq!(df.column("video_id").unwrap().str().unwrap().get(0), Some("a"));
    }
}
