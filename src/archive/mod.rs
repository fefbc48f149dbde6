//! Archive extraction for release downloads.

mod tar_gz;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Result, anyhow};
use std::path::{Component, Path, PathBuf};

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// A regular file written during extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFile {
    /// Location on disk, under the extraction directory.
    pub path: PathBuf,
    /// Path as recorded in the archive.
    pub relative: PathBuf,
    /// Unix mode from the archive metadata, when recorded.
    pub mode: Option<u32>,
}

impl ExtractedFile {
    pub fn file_name(&self) -> Option<&str> {
        self.relative.file_name().and_then(|n| n.to_str())
    }

    /// False only when a recorded mode has no exec bit; zip entries written
    /// without unix modes are given the benefit of the doubt.
    pub fn is_executable(&self) -> bool {
        self.mode.is_none_or(|mode| mode & 0o111 != 0)
    }
}

/// Trait for format-specific archive extractors
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive into `extract_to`, keeping the archive's layout.
    /// Returns the regular files written, in archive order.
    fn extract<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<Vec<ExtractedFile>>;
}

/// Dispatches to the extractor matching the archive's file extension.
#[derive(Default)]
pub struct Extractor {
    tar_gz: TarGzExtractor,
    zip: ZipExtractor,
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveExtractor for Extractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.tar_gz.can_handle(archive_path) || self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<Vec<ExtractedFile>> {
        if self.tar_gz.can_handle(archive_path) {
            return self.tar_gz.extract(runtime, archive_path, extract_to);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.extract(runtime, archive_path, extract_to);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

/// The one extracted file named `binary` (or `binary.exe`), wherever it sits
/// in the archive.
pub fn locate_binary<'a>(files: &'a [ExtractedFile], binary: &str) -> Result<&'a ExtractedFile> {
    let exe_name = format!("{}.exe", binary);
    let matches: Vec<&ExtractedFile> = files
        .iter()
        .filter(|f| f.file_name().is_some_and(|n| n == binary || n == exe_name))
        .collect();

    match matches.as_slice() {
        [file] => Ok(file),
        [] => {
            let found: Vec<String> = files
                .iter()
                .map(|f| f.relative.display().to_string())
                .collect();
            Err(anyhow!(
                "Archive contains no file named '{}' (found: {})",
                binary,
                if found.is_empty() {
                    "nothing".to_string()
                } else {
                    found.join(", ")
                }
            ))
        }
        many => Err(anyhow!(
            "Archive contains {} files named '{}', expected exactly one",
            many.len(),
            binary
        )),
    }
}

/// Normalizes an archive entry path, rejecting absolute paths and `..`.
pub(crate) fn safe_relative_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}
