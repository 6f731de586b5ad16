use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::ExportError;
use crate::models::export_result::{ExportMetadata, ExportResult};

/// Write an export to `directory` as `<folder>.zip` plus a
/// `<folder>.metadata.json` sidecar. Returns the archive path.
pub fn write_export(result: &ExportResult, directory: &Path) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(directory)
        .map_err(|e| ExportError::Storage(format!("failed to create directory: {}", e)))?;

    let archive_path = directory.join(format!("{}.zip", result.metadata.folder_name));
    fs::write(&archive_path, &result.archive)
        .map_err(|e| ExportError::Storage(format!("failed to write archive: {}", e)))?;
    write_metadata(&result.metadata, &archive_path)?;

    log::info!("Wrote export {} ({} bytes)", archive_path.display(), result.archive.len());
    Ok(archive_path)
}

/// Write export metadata as a JSON sidecar next to `archive_path`.
pub fn write_metadata(metadata: &ExportMetadata, archive_path: &Path) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| ExportError::Storage(format!("failed to serialize metadata: {}", e)))?;
    fs::write(metadata_path(archive_path), json)
        .map_err(|e| ExportError::Storage(format!("failed to write metadata: {}", e)))?;
    Ok(())
}

/// Read export metadata from the JSON sidecar next to `archive_path`.
pub fn read_metadata(archive_path: &Path) -> Result<ExportMetadata, ExportError> {
    let json = fs::read_to_string(metadata_path(archive_path))
        .map_err(|e| ExportError::Storage(format!("failed to read metadata: {}", e)))?;
    serde_json::from_str(&json).map_err(|e| ExportError::Storage(format!("failed to parse metadata: {}", e)))
}

fn metadata_path(archive_path: &Path) -> PathBuf {
    archive_path.with_extension("metadata.json")
}

/// SHA-256 hex digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
