//! Archive bundling for finished exports.
//!
//! ```text
//! <sanitized session name>/
//! └── mix.wav
//! ```

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::error::ExportError;

/// File name of the mixed-down WAV inside each archive folder.
pub const MIX_FILE_NAME: &str = "mix.wav";

/// Longest folder name the sanitizer produces, in characters.
pub const MAX_NAME_LEN: usize = 50;

/// Folder name used when sanitizing leaves nothing.
pub const FALLBACK_NAME: &str = "export";

/// Make a user-supplied session name safe to use as an archive folder.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_`, the result is cut to
/// `MAX_NAME_LEN` characters, and an empty result becomes `"export"`.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(MAX_NAME_LEN)
        .collect();
    if sanitized.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized
    }
}

/// Bundle WAV payloads into a zip archive.
///
/// `entries` maps a folder name (sanitized here) to the contents of that
/// folder's `mix.wav`. Entries are stored uncompressed.
pub fn create_archive(entries: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, contents) in entries {
        let folder = sanitize_name(name);
        zip.add_directory(format!("{}/", folder), options)
            .map_err(|e| ExportError::Archive(format!("failed to add folder {}: {}", folder, e)))?;
        zip.start_file(format!("{}/{}", folder, MIX_FILE_NAME), options)
            .map_err(|e| ExportError::Archive(format!("failed to start {}/{}: {}", folder, MIX_FILE_NAME, e)))?;
        zip.write_all(contents)
            .map_err(|e| ExportError::Archive(format!("failed to write {}/{}: {}", folder, MIX_FILE_NAME, e)))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| ExportError::Archive(format!("failed to finalize archive: {}", e)))?;
    Ok(cursor.into_inner())
}
