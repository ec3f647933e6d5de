// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Mask archive download tests against a local HTTP server.

mod common;

use ava_prep::{
    Error,
    masks::{MASKS_ARCHIVE, download_masks},
};
use common::{Route, start_server};
use std::{collections::HashMap, io::Write as _, time::Duration};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_masks_are_extracted_and_archive_removed() -> Result<(), Error> {
    let archive = zip_bytes(&[("masks/a.pkl", b"aaaa"), ("masks/b.pkl", b"bb")]);
    let server = start_server(HashMap::from([(
        "/masks.zip".to_string(),
        Route::ok(&archive),
    )]))
    .await;
    let dir = TempDir::new()?;

    let url = format!("{}/masks.zip", server.url());
    let report = download_masks(&url, dir.path(), Duration::from_secs(10), None).await?;
    assert_eq!(report.extracted, 2);
    assert_eq!(report.archive_bytes, archive.len() as u64);
    assert_eq!(std::fs::read(dir.path().join("masks/a.pkl"))?, b"aaaa");
    assert!(!dir.path().join(MASKS_ARCHIVE).exists());
    Ok(())
}

#[tokio::test]
async fn test_truncated_masks_leave_no_archive() -> Result<(), Error> {
    let archive = zip_bytes(&[("masks/a.pkl", b"aaaa")]);
    let server = start_server(HashMap::from([(
        "/masks.zip".to_string(),
        Route::truncated(&archive[..archive.len() / 2], archive.len()),
    )]))
    .await;
    let dir = TempDir::new()?;

    let url = format!("{}/masks.zip", server.url());
    let result = download_masks(&url, dir.path(), Duration::from_secs(10), None).await;
    assert!(matches!(result, Err(Error::Network(_))));
    assert!(!dir.path().join(MASKS_ARCHIVE).exists());
    assert!(!dir.path().join("masks").exists());
    Ok(())
}
