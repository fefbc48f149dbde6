use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::path::Path;
use tar::Archive;

use super::{ArchiveExtractor, ExtractedFile, safe_relative_path};

/// Extractor for .tar.gz / .tgz archives
#[derive(Default)]
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<Vec<ExtractedFile>> {
        debug!("Extracting tar.gz archive {:?} to {:?}...", archive_path, extract_to);
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;
        let mut archive = Archive::new(GzDecoder::new(file));

        let mut files = Vec::new();
        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?
        {
            let mut entry = entry.context("Failed to read tar entry")?;
            let raw_path = entry.path().context("Invalid tar entry path")?.into_owned();
            let Some(relative) = safe_relative_path(&raw_path) else {
                debug!("Skipping entry with unsafe path {:?}", raw_path);
                continue;
            };
            let full_path = extract_to.join(&relative);
            let entry_type = entry.header().entry_type();

            if entry_type.is_dir() {
                runtime.create_dir_all(&full_path)?;
                continue;
            }
            if !entry_type.is_file() {
                debug!("Skipping non-regular entry {:?} ({:?})", relative, entry_type);
                continue;
            }

            if let Some(parent) = full_path.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut dest = runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;
            drop(dest);

            let mode = entry.header().mode().ok().map(|m| m & 0o7777);
            #[cfg(unix)]
            if let Some(mode) = mode
                && let Err(e) = runtime.set_permissions(&full_path, mode)
            {
                debug!("Failed to set permissions on {:?}: {}", full_path, e);
            }

            files.push(ExtractedFile {
                path: full_path,
                relative,
                mode,
            });
        }

        info!("Extracted {} file(s).", files.len());
        Ok(files)
    }
}
