//! Archive Extractor (C6): validates then extracts `tar.xz`/`tar.gz` into a
//! staging directory (§4.6).

use anyhow::{bail, Context};
use fs_err as fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive is corrupt or could not be fully indexed: {0}")]
    CorruptArchive(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Compression {
    Xz,
    Gz,
}

impl Compression {
    pub fn from_filename(name: &str) -> Option<Self> {
        if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Compression::Xz)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Compression::Gz)
        } else {
            None
        }
    }
}

fn open_archive(path: &Path, compression: Compression) -> anyhow::Result<Archive<Box<dyn Read>>> {
    let file = fs::File::open(path).context("Failed to open archive")?;
    let reader: Box<dyn Read> = match compression {
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
        Compression::Gz => Box::new(flate2::read::GzDecoder::new(file)),
    };
    Ok(Archive::new(reader))
}

/// Phase 1: lists every entry through the tar reader, rejecting archives
/// that can't be fully indexed or that contain zero entries.
pub fn validate(path: &Path, compression: Compression) -> Result<(), ArchiveError> {
    let mut archive = open_archive(path, compression)
        .map_err(|err| ArchiveError::CorruptArchive(err.to_string()))?;
    let entries = archive
        .entries()
        .map_err(|err| ArchiveError::CorruptArchive(err.to_string()))?;
    let mut count = 0usize;
    for entry in entries {
        entry.map_err(|err| ArchiveError::CorruptArchive(err.to_string()))?;
        count += 1;
    }
    if count == 0 {
        return Err(ArchiveError::CorruptArchive("archive has zero entries".to_string()));
    }
    Ok(())
}

/// Phase 2: extracts into `staging_dir`, refusing archive-provided
/// ownership/permissions so every install gets the same identity.
pub fn extract(path: &Path, compression: Compression, staging_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(staging_dir).context("Failed to create staging directory")?;
    let mut archive = open_archive(path, compression)?;
    archive.set_preserve_permissions(false);
    archive.set_preserve_ownerships(false);
    archive
        .unpack(staging_dir)
        .context("Failed to extract archive into staging directory")?;
    Ok(())
}

/// Finds the package root inside an extracted staging tree: prefer
/// `<stage>/<domain>/v<version>/`, then `<stage>/`, then the first
/// subdirectory containing any of `bin/sbin/lib/include/share` (§4.6).
pub fn locate_package_root(staging_dir: &Path, domain: &str, version: &str) -> anyhow::Result<PathBuf> {
    let preferred = staging_dir.join(domain).join(format!("v{version}"));
    if looks_like_package_root(&preferred) {
        return Ok(preferred);
    }
    if looks_like_package_root(staging_dir) {
        return Ok(staging_dir.to_path_buf());
    }
    for entry in fs::read_dir(staging_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && looks_like_package_root(&path) {
            return Ok(path);
        }
    }
    debug!("No recognizable package root under {}", staging_dir.display());
    bail!("Could not locate a package root under {}", staging_dir.display())
}

fn looks_like_package_root(dir: &Path) -> bool {
    ["bin", "sbin", "lib", "include", "share"]
        .iter()
        .any(|name| dir.join(name).is_dir())
}
