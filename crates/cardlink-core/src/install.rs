//! Places a converted set where the simulator discovers custom sets

use crate::error::{Error, Result};
use crate::linker::LinkReport;
use std::fs;
use std::path::{Path, PathBuf};

/// Custom set documents, relative to the simulator's data directory
pub const CUSTOM_SETS_DIR: &str = "customsets";

/// Custom card pictures, relative to the simulator's data directory
pub const CUSTOM_PICTURES_DIR: &str = "pics/CUSTOM";

/// Where an installed set ended up
#[derive(Debug, Clone)]
pub struct InstallResult {
    /// Installed set document
    pub set_file: PathBuf,
    /// Folder the images were copied into
    pub pictures_dir: PathBuf,
    /// Number of images copied
    pub images_copied: usize,
}

/// Copy the set document and its linked images into `data_dir`
pub fn install_set<P: AsRef<Path>>(
    data_dir: P,
    set_xml: &Path,
    links: &LinkReport,
) -> Result<InstallResult> {
    let data_dir = data_dir.as_ref();
    let sets_dir = data_dir.join(CUSTOM_SETS_DIR);
    let pictures_dir = data_dir.join(CUSTOM_PICTURES_DIR);

    fs::create_dir_all(&sets_dir)?;
    fs::create_dir_all(&pictures_dir).map_err(|e| Error::ImageWrite {
        path: pictures_dir.clone(),
        source: e,
    })?;

    let file_name = set_xml.file_name().ok_or_else(|| Error::FileRead {
        path: set_xml.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path"),
    })?;
    let set_file = sets_dir.join(file_name);
    fs::copy(set_xml, &set_file)?;

    let mut images_copied = 0;
    for linked in &links.linked {
        let Some(name) = linked.destination.file_name() else {
            continue;
        };
        let target = pictures_dir.join(name);
        fs::copy(&linked.destination, &target).map_err(|e| Error::ImageWrite {
            path: target.clone(),
            source: e,
        })?;
        images_copied += 1;
    }

    log::info!(
        "installed {} and {} image(s) under {}",
        set_file.display(),
        images_copied,
        data_dir.display()
    );

    Ok(InstallResult {
        set_file,
        pictures_dir,
        images_copied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::LinkedImage;

    #[test]
    fn test_install_layout() {
        let work = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();

        let xml = work.path().join("chaos.xml");
        fs::write(&xml, "<cockatrice_carddatabase/>").unwrap();
        let image = work.path().join("Bolt.jpg");
        fs::write(&image, b"bolt").unwrap();

        let links = LinkReport {
            linked: vec![LinkedImage {
                display_name: "Bolt".to_string(),
                source: PathBuf::from("raw/Bolt.jpg"),
                destination: image,
            }],
            ..LinkReport::default()
        };

        let result = install_set(data.path(), &xml, &links).unwrap();

        assert_eq!(result.set_file, data.path().join("customsets").join("chaos.xml"));
        assert_eq!(result.images_copied, 1);
        assert_eq!(
            fs::read(data.path().join("pics/CUSTOM/Bolt.jpg")).unwrap(),
            b"bolt"
        );
    }
}
