// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Layered configuration.
//!
//! Settings are resolved from, lowest to highest precedence:
//!
//! 1. built-in defaults,
//! 2. a configuration file: the explicit path if given, else `paths.yaml` in
//!    the working directory, else `config.yaml` in the user config directory
//!    (YAML, TOML or JSON, chosen by extension),
//! 3. `AVA_PREP_*` environment variables, with `__` between nested keys, e.g.
//!    `AVA_PREP_CLIP__DURATION=4`.
//!
//! Paths that are not set explicitly derive from `data_dir`:
//!
//! ```text
//! {data_dir}/
//! ├── ava_file_names_{split}_v2.1.txt
//! ├── annotations/ava_train_v2.2.csv
//! ├── videos/{split}/
//! ├── trimmed/
//! ├── sampled_clips/
//! └── ava_clips_list.csv
//! ```

use crate::{
    Error, Split,
    clip::ClipStrategy,
    download::DEFAULT_BASE_URL,
    media::{EncodeOptions, Ffmpeg},
};
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Configuration file picked up from the working directory.
pub const LOCAL_CONFIG_FILE: &str = "paths.yaml";
pub const ENV_PREFIX: &str = "AVA_PREP";

/// Published archive of the AVA semantic masks.
pub const DEFAULT_MASKS_URL: &str =
    "https://drive.google.com/uc?export=download&id=1OrvgjqdQgVswSg-MlQAQCiKpc1LIYueq";

/// Effective settings for all stages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub split: Split,
    pub video_dir: Option<PathBuf>,
    pub clip_dir: Option<PathBuf>,
    pub trimmed_dir: Option<PathBuf>,
    pub annotations: Option<PathBuf>,
    pub file_list: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
    pub base_url: String,
    pub http_timeout_secs: u64,
    /// Clips shorter than this many seconds are left out of the manifest.
    pub manifest_min_duration: f64,
    pub masks_url: String,
    pub clip: ClipConfig,
    pub trim: TrimConfig,
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("ava"),
            split: Split::Trainval,
            video_dir: None,
            clip_dir: None,
            trimmed_dir: None,
            annotations: None,
            file_list: None,
            manifest: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            http_timeout_secs: 3600,
            manifest_min_duration: 0.5,
            masks_url: DEFAULT_MASKS_URL.to_string(),
            clip: ClipConfig::default(),
            trim: TrimConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Fixed,
    Clustered,
}

/// Clip sampling settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    pub strategy: StrategyKind,
    /// Fixed clip length in seconds, centred on the keyframe.
    pub duration: f64,
    pub cluster_window: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    pub buffer: f64,
    pub encoder: String,
    pub crf: u32,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Fixed,
            duration: 5.0,
            cluster_window: 5.0,
            min_duration: 7.0,
            max_duration: 15.0,
            buffer: 1.0,
            encoder: "libx264".to_string(),
            crf: 28,
        }
    }
}

impl ClipConfig {
    pub fn strategy(&self) -> ClipStrategy {
        match self.strategy {
            StrategyKind::Fixed => ClipStrategy::Fixed {
                duration: self.duration,
            },
            StrategyKind::Clustered => ClipStrategy::Clustered {
                window: self.cluster_window,
                min_duration: self.min_duration,
                max_duration: self.max_duration,
                buffer: self.buffer,
            },
        }
    }

    pub fn encode(&self) -> EncodeOptions {
        EncodeOptions {
            encoder: self.encoder.clone(),
            crf: Some(self.crf),
            ..EncodeOptions::clip()
        }
    }
}

/// Source trimming settings. AVA annotates minutes 15 to 30 of each movie.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    pub start: f64,
    pub duration: f64,
    pub encoder: String,
    pub preset: String,
    pub bitrate: String,
    pub fps: f64,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            start: 900.0,
            duration: 901.0,
            encoder: "libx264".to_string(),
            preset: "fast".to_string(),
            bitrate: "2M".to_string(),
            fps: 30.0,
        }
    }
}

impl TrimConfig {
    pub fn encode(&self) -> EncodeOptions {
        EncodeOptions {
            encoder: self.encoder.clone(),
            preset: Some(self.preset.clone()),
            bitrate: Some(self.bitrate.clone()),
            fps: Some(self.fps),
            ..EncodeOptions::source()
        }
    }
}

/// External tool locations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub probe_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            probe_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Loads the layered configuration. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let file = match path {
            Some(path) if !path.is_file() => return Err(Error::MissingInput(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_file(),
        };

        let mut builder = config::Config::builder();
        if let Some(file) = &file {
            debug!("Loading configuration from {}", file.display());
            builder = builder.add_source(config::File::from(file.as_path()).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// First existing default configuration file, if any.
    pub fn default_file() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        ProjectDirs::from("ai", "EdgeFirst", "AVA Prep")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .filter(|path| path.is_file())
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.clip.strategy().validate()?;
        if self.trim.duration <= 0.0 || self.trim.start < 0.0 {
            return Err(Error::InvalidParameters(format!(
                "trim window start={} duration={} is invalid",
                self.trim.start, self.trim.duration
            )));
        }
        if self.http_timeout_secs == 0 || self.tools.probe_timeout_secs == 0 {
            return Err(Error::InvalidParameters(
                "timeouts must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn video_dir(&self) -> PathBuf {
        self.video_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("videos").join(self.split.as_str()))
    }

    pub fn clip_dir(&self) -> PathBuf {
        self.clip_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("sampled_clips"))
    }

    pub fn trimmed_dir(&self) -> PathBuf {
        self.trimmed_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("trimmed"))
    }

    pub fn annotations(&self) -> PathBuf {
        self.annotations.clone().unwrap_or_else(|| {
            self.data_dir
                .join("annotations")
                .join("ava_train_v2.2.csv")
        })
    }

    pub fn file_list(&self) -> PathBuf {
        self.file_list.clone().unwrap_or_else(|| {
            self.data_dir
                .join(format!("ava_file_names_{}_v2.1.txt", self.split))
        })
    }

    pub fn manifest(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.data_dir.join("ava_clips_list.csv"))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn media_tool(&self) -> Ffmpeg {
        Ffmpeg::new(
            self.tools.ffmpeg.clone(),
            self.tools.ffprobe.clone(),
            Duration::from_secs(self.tools.probe_timeout_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_derived_paths() {
        let config = Config {
            data_dir: PathBuf::from("/data/ava"),
            split: Split::Test,
            ..Default::default()
        };
        assert_eq!(config.video_dir(), PathBuf::from("/data/ava/videos/test"));
        assert_eq!(
            config.file_list(),
            PathBuf::from("/data/ava/ava_file_names_test_v2.1.txt")
        );
        assert_eq!(config.clip_dir(), PathBuf::from("/data/ava/sampled_clips"));
        assert_eq!(
            config.manifest(),
            PathBuf::from("/data/ava/ava_clips_list.csv")
        );

        let config = Config {
            clip_dir: Some(PathBuf::from("/fast/clips")),
            ..config
        };
        assert_eq!(config.clip_dir(), PathBuf::from("/fast/clips"));
    }

    #[test]
    #[serial]
    fn test_load_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paths.yaml");
        std::fs::write(
            &path,
            "data_dir: /datasets/ava\nsplit: test\nclip:\n  strategy: clustered\n  max_duration: 12\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/datasets/ava"));
        assert_eq!(config.split, Split::Test);
        assert_eq!(
            config.clip.strategy(),
            ClipStrategy::Clustered {
                window: 5.0,
                min_duration: 7.0,
                max_duration: 12.0,
                buffer: 1.0
            }
        );
        assert_eq!(config.trim.start, 900.0);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ava.toml");
        std::fs::write(&path, "data_dir = \"/from/file\"\n[clip]\nduration = 5.0\n").unwrap();

        unsafe {
            std::env::set_var("AVA_PREP_CLIP__DURATION", "4");
            std::env::set_var("AVA_PREP_DATA_DIR", "/from/env");
        }
        let config = Config::load(Some(&path));
        unsafe {
            std::env::remove_var("AVA_PREP_CLIP__DURATION");
            std::env::remove_var("AVA_PREP_DATA_DIR");
        }

        let config = config.unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/from/env"));
        assert_eq!(config.clip.duration, 4.0);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_fatal() {
        let err = Config::load(Some(Path::new("/nonexistent/paths.yaml"))).unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.clip.duration = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.http_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
