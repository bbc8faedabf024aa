//! Packaging of job results into a zip archive.
//!
//! Entries are laid out as `<slug>/<slug>-<n>.<ext>` with `n` counting, from
//! 1, the results of the same category in aggregate order. Every payload is
//! decoded before anything is written; a single bad payload fails the build.
use base64::{engine::general_purpose, Engine};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::catalog::Category;
use crate::error::OutputError;
use crate::job::GeneratedImage;

pub const ARCHIVE_FILE_NAME: &str = "transformation-pack.zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// File extension for a mime type, `png` when unknown.
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

pub fn entry_path(category: Category, index: usize, mime_type: &str) -> String {
    let slug = category.slug();
    format!("{}/{}-{}.{}", slug, slug, index, extension_for(mime_type))
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveBuilder;

impl ArchiveBuilder {
    pub fn new() -> Self {
        ArchiveBuilder
    }

    /// Name and decode every result. All or nothing.
    pub fn entries(&self, results: &[GeneratedImage]) -> Result<Vec<ArchiveEntry>, OutputError> {
        let mut seen: HashMap<Category, usize> = HashMap::new();
        results
            .iter()
            .map(|image| {
                let index = seen.entry(image.category).or_insert(0);
                *index += 1;
                let path = entry_path(image.category, *index, &image.mime_type);
                let bytes = general_purpose::STANDARD
                    .decode(image.data.trim())
                    .map_err(|source| OutputError::Decode { path: path.clone(), source })?;
                Ok(ArchiveEntry { path, bytes })
            })
            .collect()
    }

    /// Build the zip archive in memory.
    pub fn build(&self, results: &[GeneratedImage]) -> Result<Vec<u8>, OutputError> {
        let entries = self.entries(results)?;
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &entries {
            writer.start_file(entry.path.as_str(), options)?;
            writer.write_all(&entry.bytes)?;
        }
        let cursor = writer.finish()?;
        tracing::info!("Built archive with {} entries", entries.len());
        Ok(cursor.into_inner())
    }
}
