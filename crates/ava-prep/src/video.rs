// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Dataset splits and locally stored source videos.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Container extensions probed, in order, when looking up a source video.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm"];

/// A named partition of the AVA dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[default]
    Trainval,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Trainval => "trainval",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trainval" => Ok(Split::Trainval),
            "test" => Ok(Split::Test),
            other => Err(Error::InvalidSplit(other.to_string())),
        }
    }
}

/// A source video of the dataset.
///
/// `local_path` is set once the file is present on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoAsset {
    pub video_id: String,
    pub file_name: String,
    pub local_path: Option<PathBuf>,
}

impl VideoAsset {
    /// Builds an asset from a file name as listed in the AVA file lists,
    /// e.g. `053oq2xB3oU.mkv`, resolving it against `dir`.
    pub fn from_file_name(file_name: &str, dir: &Path) -> Self {
        let path = dir.join(file_name);
        let video_id = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());
        Self {
            video_id,
            file_name: file_name.to_string(),
            local_path: path.is_file().then_some(path),
        }
    }

    pub fn is_local(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Reads a file list with one video file name per line, ignoring blanks.
///
/// A missing list is fatal for the downloader and reported as
/// [`Error::MissingInput`].
pub fn read_file_list(path: &Path) -> Result<Vec<String>, Error> {
    if !path.is_file() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Returns the first `{dir}/{video_id}.{ext}` that exists for the known
/// container extensions.
pub fn find_video(dir: &Path, video_id: &str) -> Option<PathBuf> {
    VIDEO_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", video_id, ext)))
        .find(|path| path.is_file())
}

/// Whether the path carries one of the given extensions, case-insensitively.
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
