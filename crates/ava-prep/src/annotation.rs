// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! AVA annotation CSV reader.
//!
//! The official annotation files carry one row per person and action at a
//! keyframe:
//!
//! ```text
//! video_id,timestamp,x1,y1,x2,y2,action_id,person_id
//! -5KQ66BBWC4,0902,0.077,0.151,0.283,0.811,80,1
//! ```
//!
//! The box, action and person columns are optional so that the
//! excluded-timestamp lists (`video_id,timestamp`) load with the same reader.

use crate::Error;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

/// One row of an AVA annotation file.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationRecord {
    pub video_id: String,
    /// Keyframe timestamp in seconds from the start of the movie.
    pub timestamp: f64,
    /// Normalized `[x1, y1, x2, y2]` person box.
    pub bbox: Option<[f64; 4]>,
    pub action_id: Option<u32>,
    pub person_id: Option<u32>,
}

impl AnnotationRecord {
    /// Label used in the manifest: the action id, or empty when absent.
    pub fn label(&self) -> String {
        self.action_id.map(|a| a.to_string()).unwrap_or_default()
    }
}

/// Quantizes a timestamp to tenths of a second, the precision carried in
/// clip file names. Derived from the same `{:.1}` rendering the names use so
/// a keyframe and the clip named after it always share a key.
pub fn timestamp_key(timestamp: f64) -> i64 {
    format!("{:.1}", timestamp)
        .replace('.', "")
        .parse()
        .unwrap_or_else(|_| (timestamp * 10.0).round() as i64)
}

/// Parses one CSV line. `line` is 1-based and only used for error reporting.
pub fn parse_record(row: &str, line: usize) -> Result<AnnotationRecord, Error> {
    let invalid = |reason: String| Error::InvalidAnnotation { line, reason };
    let fields: Vec<&str> = row.split(',').map(str::trim).collect();

    if fields.len() < 2 {
        return Err(invalid(format!(
            "expected at least 2 columns, found {}",
            fields.len()
        )));
    }

    let video_id = fields[0];
    if video_id.is_empty() {
        return Err(invalid("empty video_id".to_string()));
    }

    let timestamp: f64 = fields[1]
        .parse()
        .map_err(|e| invalid(format!("timestamp {:?}: {}", fields[1], e)))?;
    if !timestamp.is_finite() || timestamp < 0.0 {
        return Err(invalid(format!("timestamp {} out of range", timestamp)));
    }

    let bbox = if fields.len() >= 6 {
        let mut bbox = [0.0; 4];
        for (i, value) in fields[2..6].iter().enumerate() {
            bbox[i] = value
                .parse()
                .map_err(|e| invalid(format!("box column {}: {}", i + 3, e)))?;
        }
        Some(bbox)
    } else {
        None
    };

    let optional_u32 = |index: usize, name: &str| -> Result<Option<u32>, Error> {
        match fields.get(index) {
            Some(v) if !v.is_empty() => v
                .parse()
                .map(Some)
                .map_err(|e| invalid(format!("{} {:?}: {}", name, v, e))),
            _ => Ok(None),
        }
    };

    Ok(AnnotationRecord {
        video_id: video_id.to_string(),
        timestamp,
        bbox,
        action_id: optional_u32(6, "action_id")?,
        person_id: optional_u32(7, "person_id")?,
    })
}

/// Parses annotation CSV text. A leading header row starting with
/// `video_id` is skipped; blank lines are ignored.
pub fn parse_annotations(contents: &str) -> Result<Vec<AnnotationRecord>, Error> {
    let mut records = Vec::new();
    for (index, row) in contents.lines().enumerate() {
        let row = row.trim();
        if row.is_empty() || (index == 0 && row.starts_with("video_id")) {
            continue;
        }
        records.push(parse_record(row, index + 1)?);
    }
    Ok(records)
}

/// Loads an annotation file. A missing file aborts the run with
/// [`Error::MissingInput`].
pub fn read_annotations(path: &Path) -> Result<Vec<AnnotationRecord>, Error> {
    if !path.is_file() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    let records = parse_annotations(&contents)?;
    log::info!(
        "Loaded {} annotation records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Distinct action labels per (video id, timestamp), used to annotate
/// manifest rows.
#[derive(Clone, Debug, Default)]
pub struct AnnotationIndex {
    labels: BTreeMap<(String, i64), BTreeSet<u32>>,
}

impl AnnotationIndex {
    pub fn new(records: &[AnnotationRecord]) -> Self {
        let mut labels: BTreeMap<(String, i64), BTreeSet<u32>> = BTreeMap::new();
        for record in records {
            let entry = labels
                .entry((record.video_id.clone(), timestamp_key(record.timestamp)))
                .or_default();
            if let Some(action) = record.action_id {
                entry.insert(action);
            }
        }
        Self { labels }
    }

    /// Action ids at the keyframe, ascending and joined with `;`. Empty when
    /// the keyframe is unknown.
    pub fn label(&self, video_id: &str, timestamp: f64) -> String {
        self.labels
            .get(&(video_id.to_string(), timestamp_key(timestamp)))
            .map(|actions| {
                actions
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(";")
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
