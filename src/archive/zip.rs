use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::{debug, info};
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use super::{ArchiveExtractor, ExtractedFile, safe_relative_path};

/// Extractor for .zip archives
#[derive(Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip")
    }

    fn extract<R: Runtime>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<Vec<ExtractedFile>> {
        debug!("Extracting zip archive {:?} to {:?}...", archive_path, extract_to);
        let mut reader = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        // ZipArchive needs Read + Seek; Runtime::open only gives Read
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to read archive {:?}", archive_path))?;
        let mut archive = ZipArchive::new(std::io::Cursor::new(buffer))
            .context("Failed to parse ZIP archive")?;

        let mut files = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let Some(relative) = entry
                .enclosed_name()
                .and_then(|path| safe_relative_path(&path))
            else {
                debug!("Skipping entry with unsafe path {:?}", entry.name());
                continue;
            };
            let full_path = extract_to.join(&relative);

            if entry.is_dir() {
                runtime.create_dir_all(&full_path)?;
                continue;
            }

            if let Some(parent) = full_path.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut dest = runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;
            drop(dest);

            let mode = entry.unix_mode().map(|m| m & 0o7777);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;
    use zip::CompressionMethod;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    fn create_test_archive(path: &Path, files: &[(&str, &str, u32)]) -> Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);

        for (name, content, mode) in files {
            let options: FileOptions<()> = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(*mode);
            zip.start_file(*name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        zip.finish()?;
        Ok(())
    }

    #[test]
    fn test_can_handle_zip() {
        let extractor = ZipExtractor;
        assert!(extractor.can_handle(Path::new("file.zip")));
        assert!(extractor.can_handle(Path::new("FILE.ZIP")));
        assert!(!extractor.can_handle(Path::new("file.tar.gz")));
    }

    #[test]
    fn test_extract_keeps_nested_layout() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("alpacon.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        create_test_archive(
            &archive_path,
            &[("dist/alpacon", "bin", 0o755), ("dist/LICENSE", "mit", 0o644)],
        )?;

        let files = ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name(), Some("alpacon"));
        assert_eq!(fs::read_to_string(extract_path.join("dist/LICENSE"))?, "mit");
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_extract_preserves_file_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let archive_path = dir.path().join("alpacon.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        create_test_archive(
            &archive_path,
            &[("alpacon", "bin", 0o755), ("README.md", "docs", 0o644)],
        )?;

        let files = ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;
        assert!(files[0].is_executable());
        assert!(!files[1].is_executable());

        let mode = fs::metadata(extract_path.join("alpacon"))?.permissions().mode();
        assert!(mode & 0o111 != 0, "expected executable, got {:o}", mode);
        Ok(())
    }

    #[test]
    fn test_extract_empty_archive_returns_no_files() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("empty.zip");
        create_test_archive(&archive_path, &[])?;

        let files = ZipExtractor.extract(&RealRuntime, &archive_path, dir.path())?;
        assert!(files.is_empty());
        Ok(())
    }

    #[test]
    fn test_extract_corrupted_archive() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("test.zip");
        fs::write(&archive_path, "corrupted data").unwrap();

        let result = ZipExtractor.extract(&RealRuntime, &archive_path, dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_nonexistent_archive() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("nonexistent.zip");

        let result = ZipExtractor.extract(&RealRuntime, &archive_path, dir.path());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to open archive")
        );
    }
}
