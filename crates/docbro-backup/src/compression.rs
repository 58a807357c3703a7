//! Archive compression and checksums

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default compression level (6 = balanced speed/ratio)
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Tar `source_dir` into a gzip archive at `dest`
pub fn write_tar_gz(source_dir: &Path, dest: &Path, level: u32) -> anyhow::Result<()> {
    let file = File::create(dest)
        .map_err(|e| anyhow::anyhow!("Failed to create archive {}: {}", dest.display(), e))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(level.clamp(1, 9)));
    let mut tar = tar::Builder::new(encoder);
    tar.follow_symlinks(false);
    tar.append_dir_all(".", source_dir)
        .map_err(|e| anyhow::anyhow!("Failed to add files to archive: {}", e))?;

    let encoder = tar.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    Ok(())
}

/// SHA256 of a file as lowercase hex
pub fn calculate_checksum(path: &Path) -> anyhow::Result<String> {
    let mut file = File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open file for checksum: {}", e))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| anyhow::anyhow!("Failed to calculate checksum: {}", e))?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Paths of all entries in a gzip tar archive
pub fn list_archive(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let file = File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        entries.push(entry.path()?.into_owned());
    }
    Ok(entries)
}
