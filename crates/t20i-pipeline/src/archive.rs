//! Source archive extraction
//!
//! The upstream archive is a flat zip of one JSON document per match plus a
//! README. Entries are extracted in memory; folder components are dropped
//! so candidates are identified by bare file name. When two entries share a
//! file name the first one in archive order wins.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use t20i_common::{PipelineError, Result};
use tracing::{debug, warn};

/// Extract every `*.json` entry from a zip archive
///
/// # Returns
/// Map of file name -> file contents, ordered by file name
pub fn extract_json_entries(data: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let cursor = Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| PipelineError::TransientIo(format!("Failed to read zip archive: {}", e)))?;
    let mut result = BTreeMap::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| {
            PipelineError::TransientIo(format!("Failed to read zip entry at index {}: {}", i, e))
        })?;

        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let filename = name.rsplit('/').next().unwrap_or(&name).to_string();

        if !filename.ends_with(".json") {
            continue;
        }

        match result.entry(filename) {
            Entry::Occupied(existing) => {
                warn!(
                    file = %existing.key(),
                    entry = %name,
                    "Skipping archive entry with a duplicate file name"
                );
            },
            Entry::Vacant(slot) => {
                let mut contents = Vec::new();
                file.read_to_end(&mut contents)?;
                debug!("Extracted {} ({} bytes)", slot.key(), contents.len());
                slot.insert(contents);
            },
        }
    }

    Ok(result)
}

#[cfg(test)]
pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in entries {
            if let Err(e) = writer.start_file(*name, options) {
                panic!("start_file failed: {}", e);
            }
            if let Err(e) = writer.write_all(body) {
                panic!("write failed: {}", e);
            }
        }
        if let Err(e) = writer.finish() {
            panic!("finish failed: {}", e);
        }
    }
    buffer.into_inner()
}
