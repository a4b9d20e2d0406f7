//! cardlink CLI
//!
//! Converts a set editor's raw card export into a simulator custom set, with
//! images renamed to filesystem-safe card names.

use cardlink_core::{run_pipeline, PipelineConfig, RunSummary, SerializerOptions};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cardlink")]
#[command(about = "Convert a set editor export into a simulator custom set", long_about = None)]
#[command(version)]
struct Cli {
    /// Raw set export produced by the set editor
    source: PathBuf,

    /// Destination custom-set XML file
    dest_xml: PathBuf,

    /// Destination image folder
    dest_images: PathBuf,

    /// Folder holding the exported card images (defaults to the export's folder)
    #[arg(long)]
    images: Option<PathBuf>,

    /// Image extension assumed when the export names no image for a card
    #[arg(long, default_value = "jpg")]
    default_ext: String,

    /// Set code for cards that carry none
    #[arg(long)]
    set_code: Option<String>,

    /// Long set name used when the export has no set definition
    #[arg(long)]
    set_name: Option<String>,

    /// Write a JSON run report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write a CSV mapping of display names to tokens and images
    #[arg(long)]
    mapping: Option<PathBuf>,

    /// Simulator data directory to install the finished set into
    #[arg(long)]
    install_dir: Option<PathBuf>,

    /// Leave out cards with no usable name instead of failing
    #[arg(long)]
    skip_invalid: bool,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.source, self.dest_xml, self.dest_images);
        config.source_images = self.images;
        config.default_extension = self.default_ext;
        config.serializer = SerializerOptions {
            set_code: self.set_code,
            set_name: self.set_name,
        };
        config.report = self.report;
        config.mapping = self.mapping;
        config.install_dir = self.install_dir;
        config.skip_invalid = self.skip_invalid;
        config
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(cli: Cli) -> cardlink_core::Result<()> {
    let config = cli.into_config();
    log::debug!("{:?}", config);

    let summary = run_pipeline(&config)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Converted {}", summary.source.display());
    println!(
        "  {} cards converted, {} skipped, {} images ({} duplicate entries)",
        summary.cards,
        summary.skipped.len(),
        summary.tokens,
        summary.duplicates
    );
    println!("  Set file: {}", summary.dest_xml.display());
    println!("  Images:   {}", summary.dest_images.display());

    if !summary.skipped.is_empty() {
        println!();
        println!("Skipped cards ({}):", summary.skipped.len());
        for card in &summary.skipped {
            println!("  #{}: {}", card.index, card.reason);
        }
    }

    if !summary.links.unreferenced_sources.is_empty() {
        println!();
        println!(
            "Unreferenced source images ({}):",
            summary.links.unreferenced_sources.len()
        );
        for path in &summary.links.unreferenced_sources {
            println!("  {}", path.display());
        }
    }

    if !summary.links.foreign_destinations.is_empty() {
        println!();
        println!(
            "Images in the destination not from this set ({}):",
            summary.links.foreign_destinations.len()
        );
        for path in &summary.links.foreign_destinations {
            println!("  {}", path.display());
        }
    }

    if let Some(installed) = &summary.installed {
        println!();
        println!("Installed:");
        println!("  {}", installed.set_file.display());
        println!(
            "  {} images in {}",
            installed.images_copied,
            installed.pictures_dir.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_arguments() {
        let cli = Cli::try_parse_from(["cardlink", "set.xml", "out/set.xml", "out/pics"]).unwrap();
        let config = cli.into_config();

        assert_eq!(config.source, PathBuf::from("set.xml"));
        assert_eq!(config.dest_xml, PathBuf::from("out/set.xml"));
        assert_eq!(config.dest_images, PathBuf::from("out/pics"));
        assert_eq!(config.default_extension, "jpg");
        assert!(config.install_dir.is_none());
        assert!(!config.skip_invalid);
    }

    #[test]
    fn test_missing_argument_is_error() {
        let err = Cli::try_parse_from(["cardlink", "set.xml", "out/set.xml"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_options() {
        let cli = Cli::try_parse_from([
            "cardlink",
            "set.xml",
            "out.xml",
            "pics",
            "--images",
            "raw",
            "--set-code",
            "CHB",
            "--default-ext",
            "png",
            "--skip-invalid",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.skip_invalid);

        let config = cli.into_config();
        assert_eq!(config.source_images, Some(PathBuf::from("raw")));
        assert_eq!(config.serializer.set_code.as_deref(), Some("CHB"));
        assert_eq!(config.default_extension, "png");
        assert!(config.skip_invalid);
    }
}
