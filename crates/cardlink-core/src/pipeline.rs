//! End-to-end conversion of one raw export
//!
//! Everything that can fail on bad data (parsing, token assignment, document
//! rendering, image lookup) runs before the first destination write.

use crate::card::{CardSet, RewrittenRecord};
use crate::error::{Error, Result};
use crate::install::{install_set, InstallResult};
use crate::linker::{link_images, LinkReport};
use crate::reader::{ExportReader, DEFAULT_IMAGE_EXTENSION};
use crate::rewriter::Rewriter;
use crate::sanitize::sanitize;
use crate::serializer::{render_set_document, write_document, SerializerOptions};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Inputs and outputs of one run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Raw export document
    pub source: PathBuf,
    /// Destination set document
    pub dest_xml: PathBuf,
    /// Destination image folder
    pub dest_images: PathBuf,
    /// Folder holding the raw images (defaults to the export's folder)
    pub source_images: Option<PathBuf>,
    /// Extension for cards whose image name is derived from the display name
    pub default_extension: String,
    pub serializer: SerializerOptions,
    /// Optional JSON run report
    pub report: Option<PathBuf>,
    /// Optional CSV name/token/image mapping
    pub mapping: Option<PathBuf>,
    /// Optional simulator data directory to install into
    pub install_dir: Option<PathBuf>,
    /// Leave out cards with no usable name instead of failing the run
    pub skip_invalid: bool,
}

impl PipelineConfig {
    /// Create a config with the three required paths and defaults for the rest
    pub fn new(
        source: impl Into<PathBuf>,
        dest_xml: impl Into<PathBuf>,
        dest_images: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            dest_xml: dest_xml.into(),
            dest_images: dest_images.into(),
            source_images: None,
            default_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
            serializer: SerializerOptions::default(),
            report: None,
            mapping: None,
            install_dir: None,
            skip_invalid: false,
        }
    }

    /// Folder the raw images are read from
    pub fn source_image_dir(&self) -> PathBuf {
        match &self.source_images {
            Some(dir) => dir.clone(),
            None => self
                .source
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// One line of the name/token/image mapping
#[derive(Debug, Clone, Serialize)]
pub struct MappingRow {
    pub display_name: String,
    pub safe_token: String,
    pub source_image: String,
    pub dest_image: String,
}

impl From<&RewrittenRecord> for MappingRow {
    fn from(record: &RewrittenRecord) -> Self {
        Self {
            display_name: record.display_name().to_string(),
            safe_token: record.safe_token.to_string(),
            source_image: record.record.raw_image_ref.clone(),
            dest_image: record.image_file.clone(),
        }
    }
}

/// A card left out of the output
#[derive(Debug, Clone, Serialize)]
pub struct SkippedCard {
    /// Position of the card in the export, from 1
    pub index: usize,
    /// Display name, when the card had one
    pub display_name: Option<String>,
    pub reason: String,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub source: PathBuf,
    pub dest_xml: PathBuf,
    pub dest_images: PathBuf,
    /// Cards written, duplicates included
    pub cards: usize,
    /// Distinct safe tokens
    pub tokens: usize,
    /// Cards that repeated an earlier display name
    pub duplicates: usize,
    /// Cards left out because they had no usable name
    pub skipped: Vec<SkippedCard>,
    pub links: LinkReport,
    pub mapping: Vec<MappingRow>,
    #[serde(skip)]
    pub installed: Option<InstallResult>,
}

/// Convert the export named by `config` and write every output
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunSummary> {
    let source_images = config.source_image_dir();
    log::info!(
        "converting {} (images from {})",
        config.source.display(),
        source_images.display()
    );

    let reader = ExportReader::open(&config.source)
        .with_default_extension(config.default_extension.as_str());
    let (set, skipped) = read_cards(&reader, config.skip_invalid)?;

    let mut rewriter = Rewriter::new();
    let rewritten = rewriter.rewrite(&set.records)?;

    let document = render_set_document(&set.header, &rewritten, &config.serializer)?;

    // Checks every source image before the first write
    let links = link_images(&rewritten, &source_images, &config.dest_images)?;
    write_document(&config.dest_xml, &document)?;

    let mut summary = RunSummary {
        generated_at: Utc::now(),
        source: config.source.clone(),
        dest_xml: config.dest_xml.clone(),
        dest_images: config.dest_images.clone(),
        cards: rewritten.len(),
        tokens: rewriter.token_count(),
        duplicates: rewriter.duplicates(),
        skipped,
        links,
        mapping: rewritten.iter().map(MappingRow::from).collect(),
        installed: None,
    };

    if let Some(path) = &config.mapping {
        write_mapping(path, &summary.mapping)?;
    }

    if let Some(path) = &config.report {
        write_report(path, &summary)?;
    }

    if let Some(data_dir) = &config.install_dir {
        summary.installed = Some(install_set(data_dir, &config.dest_xml, &summary.links)?);
    }

    Ok(summary)
}

/// Read the export, setting aside nameless cards when `skip_invalid` is on
fn read_cards(reader: &ExportReader, skip_invalid: bool) -> Result<(CardSet, Vec<SkippedCard>)> {
    if !skip_invalid {
        return Ok((reader.read_set()?, Vec::new()));
    }

    let header = reader.header()?;
    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for (position, result) in reader.records()?.enumerate() {
        let index = position + 1;
        match result {
            Ok(record) => match sanitize(&record.display_name) {
                Ok(_) => records.push(record),
                Err(e) => skipped.push(SkippedCard {
                    index,
                    display_name: Some(record.display_name),
                    reason: e.to_string(),
                }),
            },
            Err(e @ Error::MissingField { .. }) => skipped.push(SkippedCard {
                index,
                display_name: None,
                reason: e.to_string(),
            }),
            Err(e) => return Err(e),
        }
    }

    for card in &skipped {
        log::warn!("skipping card #{}: {}", card.index, card.reason);
    }

    Ok((CardSet { header, records }, skipped))
}

/// Write the mapping as CSV with a header row
pub fn write_mapping<P: AsRef<Path>>(path: P, rows: &[MappingRow]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    log::info!("wrote mapping for {} card(s) to {}", rows.len(), path.display());
    Ok(())
}

/// Write the run summary as pretty JSON
pub fn write_report<P: AsRef<Path>>(path: P, summary: &RunSummary) -> Result<()> {
    let content = serde_json::to_string_pretty(summary)?;
    fs::write(path.as_ref(), content).map_err(Error::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_image_dir_defaults_to_export_folder() {
        let config = PipelineConfig::new("exports/set.xml", "out.xml", "pics");
        assert_eq!(config.source_image_dir(), PathBuf::from("exports"));

        let config = PipelineConfig::new("set.xml", "out.xml", "pics");
        assert_eq!(config.source_image_dir(), PathBuf::from("."));

        let mut config = PipelineConfig::new("exports/set.xml", "out.xml", "pics");
        config.source_images = Some(PathBuf::from("images"));
        assert_eq!(config.source_image_dir(), PathBuf::from("images"));
    }

    #[test]
    fn test_write_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.csv");
        let rows = vec![MappingRow {
            display_name: "Fire, Ice".to_string(),
            safe_token: "Fire Ice".to_string(),
            source_image: "Fire, Ice.jpg".to_string(),
            dest_image: "Fire Ice.jpg".to_string(),
        }];

        write_mapping(&path, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("display_name,safe_token,source_image,dest_image")
        );
        assert_eq!(
            lines.next(),
            Some("\"Fire, Ice\",Fire Ice,\"Fire, Ice.jpg\",Fire Ice.jpg")
        );
    }
}
