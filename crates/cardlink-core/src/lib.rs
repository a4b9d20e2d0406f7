//! cardlink-core: Core library for turning set-editor exports into simulator custom sets
//!
//! This library provides functionality to:
//! - Read the editor's raw card export as a stream of card records
//! - Derive a filesystem-safe token from each card's display name
//! - Assign tokens across a whole set, rejecting collisions
//! - Write the simulator's custom-set document and link images to token names
//! - Install the result into a simulator data directory

pub mod card;
pub mod error;
pub mod install;
pub mod linker;
pub mod pipeline;
pub mod reader;
pub mod rewriter;
pub mod sanitize;
pub mod serializer;

pub use card::{CardRecord, CardSet, Element, Node, RewrittenRecord, SafeToken, SetHeader};
pub use error::{Error, Result};
pub use install::{install_set, InstallResult};
pub use linker::{check_images, link_images, LinkReport, LinkedImage};
pub use pipeline::{run_pipeline, MappingRow, PipelineConfig, RunSummary, SkippedCard};
pub use reader::{CardRecords, ExportReader};
pub use rewriter::{rewrite_records, Rewriter};
pub use sanitize::sanitize;
pub use serializer::{render_set_document, write_document, SerializerOptions};
