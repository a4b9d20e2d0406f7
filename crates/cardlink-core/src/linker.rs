//! Copies raw export images to their safe-token filenames

use crate::card::RewrittenRecord;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Extensions treated as card images when cross-checking folders
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// One image placed in the destination folder
#[derive(Debug, Clone, Serialize)]
pub struct LinkedImage {
    /// Card the image belongs to
    pub display_name: String,
    /// File in the source image folder
    pub source: PathBuf,
    /// File in the destination image folder
    pub destination: PathBuf,
}

/// Result of linking a set's images
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkReport {
    /// Images written, one per distinct token
    pub linked: Vec<LinkedImage>,
    /// Images in the source folder no card refers to
    pub unreferenced_sources: Vec<PathBuf>,
    /// Images in the destination folder this run did not produce
    pub foreign_destinations: Vec<PathBuf>,
}

impl LinkReport {
    /// Check if both folders matched the records exactly
    pub fn is_clean(&self) -> bool {
        self.unreferenced_sources.is_empty() && self.foreign_destinations.is_empty()
    }
}

/// Verify every record's raw image exists in `source_dir`
pub fn check_images<P: AsRef<Path>>(records: &[RewrittenRecord], source_dir: P) -> Result<()> {
    let source_dir = source_dir.as_ref();

    for record in records {
        source_image(record, source_dir)?;
    }

    Ok(())
}

/// Resolve a record's raw image inside `source_dir`
///
/// References that climb out of the folder (`..`, absolute paths) are
/// treated as missing.
fn source_image(record: &RewrittenRecord, source_dir: &Path) -> Result<PathBuf> {
    let reference = Path::new(&record.record.raw_image_ref);
    let contained = reference
        .components()
        .all(|c| matches!(c, Component::Normal(_)));

    let source = source_dir.join(reference);
    if !contained || !source.is_file() {
        return Err(Error::MissingImage {
            display_name: record.display_name().to_string(),
            path: source,
        });
    }
    Ok(source)
}

/// Copy each record's image to `dest_dir/<safe token>.<ext>`
///
/// All sources are checked before anything is written. Re-running with the
/// same inputs rewrites byte-identical files.
pub fn link_images<P: AsRef<Path>, Q: AsRef<Path>>(
    records: &[RewrittenRecord],
    source_dir: P,
    dest_dir: Q,
) -> Result<LinkReport> {
    let source_dir = source_dir.as_ref();
    let dest_dir = dest_dir.as_ref();

    check_images(records, source_dir)?;

    fs::create_dir_all(dest_dir).map_err(|e| Error::ImageWrite {
        path: dest_dir.to_path_buf(),
        source: e,
    })?;

    let mut report = LinkReport::default();
    let mut written: HashSet<&str> = HashSet::new();

    for record in records {
        // Repeated printings share one file
        if !written.insert(record.image_file.as_str()) {
            continue;
        }

        let source = source_image(record, source_dir)?;
        let destination = dest_dir.join(&record.image_file);

        if same_file(&source, &destination) {
            log::debug!("{} already in place", destination.display());
        } else {
            fs::copy(&source, &destination).map_err(|e| Error::ImageWrite {
                path: destination.clone(),
                source: e,
            })?;
            log::debug!("{} -> {}", source.display(), destination.display());
        }

        report.linked.push(LinkedImage {
            display_name: record.display_name().to_string(),
            source,
            destination,
        });
    }

    let referenced: HashSet<PathBuf> = report.linked.iter().map(|l| l.source.clone()).collect();
    let produced: HashSet<PathBuf> = report.linked.iter().map(|l| l.destination.clone()).collect();

    report.unreferenced_sources = images_in(source_dir)?
        .into_iter()
        .filter(|p| !referenced.contains(p) && !produced.contains(p))
        .collect();
    report.foreign_destinations = images_in(dest_dir)?
        .into_iter()
        .filter(|p| !produced.contains(p) && !referenced.contains(p))
        .collect();

    for path in &report.unreferenced_sources {
        log::warn!("no card refers to source image {}", path.display());
    }
    for path in &report.foreign_destinations {
        log::warn!("destination image {} does not belong to this set", path.display());
    }

    log::info!(
        "linked {} image(s) into {}",
        report.linked.len(),
        dest_dir.display()
    );

    Ok(report)
}

/// Image files directly inside `dir`, sorted
fn images_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    if !dir.is_dir() {
        return Ok(images);
    }

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let path = entry.path();

        let is_image = entry.file_type().is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));

        if is_image {
            images.push(path.to_path_buf());
        }
    }

    images.sort();
    Ok(images)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
