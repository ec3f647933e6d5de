// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use std::path::PathBuf;

/// Error type for AVA dataset preparation.
///
/// Per-item variants ([`Error::Network`], [`Error::MissingSource`],
/// [`Error::Trim`], [`Error::Validation`]) are logged and skipped by the
/// stages that raise them. [`Error::MissingInput`] and
/// [`Error::InvalidAnnotation`] abort a run at startup.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred during file operations.
    IoError(std::io::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// HTTP request error from the reqwest client.
    HttpError(reqwest::Error),
    /// URL parsing error.
    UrlParseError(url::ParseError),
    /// ZIP archive error.
    ZipError(zip::result::ZipError),
    /// Directory traversal error.
    WalkDirError(walkdir::Error),
    /// Temporary file could not be persisted to its destination.
    PersistError(tempfile::PersistError),
    /// Float parsing error.
    ParseFloatError(std::num::ParseFloatError),
    /// Integer parsing error.
    ParseIntError(std::num::ParseIntError),
    /// A required input file does not exist.
    MissingInput(PathBuf),
    /// A row of the annotation file could not be parsed.
    InvalidAnnotation { line: usize, reason: String },
    /// Video download failed.
    Network(String),
    /// Downloaded body length differs from the advertised length.
    IncompleteDownload { expected: u64, actual: u64 },
    /// Source video for a clip is not present locally.
    MissingSource(String),
    /// External trim tool failed.
    Trim(String),
    /// External probe tool failed or produced unreadable output.
    Probe(String),
    /// A media file failed the validity check.
    Validation(String),
    /// File name does not follow the clip naming scheme.
    InvalidClipName(String),
    /// Unknown dataset split.
    InvalidSplit(String),
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
    /// Polars dataframe operation error (only with "polars" feature).
    #[cfg(feature = "polars")]
    PolarsError(polars::error::PolarsError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::HttpError(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParseError(err)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ZipError(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::WalkDirError(err)
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::PersistError(err)
    }
}

impl From<std::num::ParseFloatError> for Error {
    fn from(err: std::num::ParseFloatError) -> Self {
        Error::ParseFloatError(err)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::ParseIntError(err)
    }
}

#[cfg(feature = "polars")]
impl From<polars::error::PolarsError> for Error {
    fn from(err: polars::error::PolarsError) -> Self {
        Error::PolarsError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::HttpError(e) => write!(f, "HTTP error: {}", e),
            Error::UrlParseError(e) => write!(f, "URL parse error: {}", e),
            Error::ZipError(e) => write!(f, "ZIP error: {}", e),
            Error::WalkDirError(e) => write!(f, "Directory walk error: {}", e),
            Error::PersistError(e) => write!(f, "Failed to persist file: {}", e),
            Error::ParseFloatError(e) => write!(f, "Float parse error: {}", e),
            Error::ParseIntError(e) => write!(f, "Integer parse error: {}", e),
            Error::MissingInput(p) => write!(f, "Missing input file: {}", p.display()),
            Error::InvalidAnnotation { line, reason } => {
                write!(f, "Invalid annotation on line {}: {}", line, reason)
            }
            Error::Network(s) => write!(f, "Network error: {}", s),
            Error::IncompleteDownload { expected, actual } => write!(
                f,
                "Incomplete download: expected {} bytes, got {}",
                expected, actual
            ),
            Error::MissingSource(s) => write!(f, "Missing source video: {}", s),
            Error::Trim(s) => write!(f, "Trim failed: {}", s),
            Error::Probe(s) => write!(f, "Probe failed: {}", s),
            Error::Validation(s) => write!(f, "Validation failed: {}", s),
            Error::InvalidClipName(s) => write!(f, "Invalid clip name: {}", s),
            Error::InvalidSplit(s) => write!(f, "Invalid split: {}", s),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
            #[cfg(feature = "polars")]
            Error::PolarsError(e) => write!(f, "Polars error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::HttpError(e) => Some(e),
            Error::UrlParseError(e) => Some(e),
            Error::ZipError(e) => Some(e),
            Error::WalkDirError(e) => Some(e),
            Error::PersistError(e) => Some(e),
            Error::ParseFloatError(e) => Some(e),
            Error::ParseIntError(e) => Some(e),
            #[cfg(feature = "polars")]
            Error::PolarsError(e) => Some(e),
            _ => None,
        }
    }
}
