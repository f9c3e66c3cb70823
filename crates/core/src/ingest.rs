//! Local, storage-free runs of the extraction and chunking stages over PDFs
//! on disk.

use crate::chunking::Chunker;
use crate::extractor::PdfExtractor;
use crate::text::{detect_language, word_count};
use crate::{ChunkDraft, ConfigError, IngestError};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Hex SHA-256 of a payload, stored as the report checksum.
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    Ok(digest_bytes(&bytes))
}

#[derive(Debug, Clone)]
pub struct FilePreview {
    pub path: PathBuf,
    pub checksum: String,
    pub page_count: u32,
    pub word_count: usize,
    pub language: &'static str,
    pub chunks: Vec<ChunkDraft>,
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct PreviewReport {
    pub files: Vec<FilePreview>,
    pub skipped_files: Vec<SkippedPdf>,
}

pub fn preview_file(
    path: &Path,
    extractor: &dyn PdfExtractor,
    chunker: &Chunker,
) -> Result<FilePreview, IngestError> {
    let bytes = fs::read(path)?;
    let extracted = extractor.extract(&bytes)?;

    Ok(FilePreview {
        path: path.to_path_buf(),
        checksum: digest_bytes(&bytes),
        page_count: extracted.page_count,
        word_count: word_count(&extracted.text),
        language: detect_language(&extracted.text),
        chunks: chunker.chunk(&extracted.text),
    })
}

/// Previews a single PDF or every PDF under a folder, collecting per-file
/// failures instead of stopping at the first one.
pub fn preview_path_best_effort(
    path: &Path,
    extractor: &dyn PdfExtractor,
    chunker: &Chunker,
) -> Result<PreviewReport, IngestError> {
    let files = if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        discover_pdf_files(path)
    };

    if files.is_empty() {
        return Err(ConfigError::InvalidArgument(format!(
            "no pdf files found in {}",
            path.display()
        ))
        .into());
    }

    let mut previews = Vec::new();
    let mut skipped_files = Vec::new();

    for file in files {
        match preview_file(&file, extractor, chunker) {
            Ok(preview) => previews.push(preview),
            Err(error) => skipped_files.push(SkippedPdf {
                path: file,
                reason: error.to_string(),
            }),
        }
    }

    Ok(PreviewReport {
        files: previews,
        skipped_files,
    })
}
