use anyhow::{Result, anyhow};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveExtractor, ExtractedFile, locate_binary};
use crate::checksum::{self, Sha256Digest};
use crate::cleanup::{SharedCleanupContext, lock};
use crate::download::download_file;
use crate::formula::{Formula, ReleaseTarget};
use crate::http::HttpClient;
use crate::runtime::Runtime;

/// A downloaded, digest-checked and unpacked Release Target.
#[derive(Debug)]
pub struct StagedTarget {
    pub archive_path: PathBuf,
    pub staging_dir: PathBuf,
    pub digest: Sha256Digest,
    /// The formula's executable inside `staging_dir`.
    pub binary: ExtractedFile,
}

impl StagedTarget {
    /// Removes the archive and staging dir and unregisters them.
    pub fn discard<R: Runtime>(&self, runtime: &R, cleanup_ctx: &SharedCleanupContext) {
        discard_paths(runtime, cleanup_ctx, &self.archive_path, &self.staging_dir);
    }
}

/// Downloads `target` into `work_dir`, rejects it unless its SHA-256 equals the
/// declared digest, then unpacks it and finds the formula's executable.
/// On failure nothing is left behind in `work_dir`.
#[tracing::instrument(skip(runtime, http_client, extractor, formula, target, cleanup_ctx))]
pub async fn stage_target<R: Runtime, E: ArchiveExtractor>(
    runtime: &R,
    http_client: &HttpClient,
    extractor: &E,
    formula: &Formula,
    target: &ReleaseTarget,
    work_dir: &Path,
    cleanup_ctx: &SharedCleanupContext,
) -> Result<StagedTarget> {
    let file_name = target
        .file_name()
        .ok_or_else(|| anyhow!("Cannot determine archive name from URL {}", target.url))?;
    let archive_path = work_dir.join(file_name);
    let staging_dir = work_dir.join(format!(
        "{}-{}-{}",
        formula.name,
        formula.version,
        target.key()
    ));

    let result = stage(
        runtime,
        http_client,
        extractor,
        formula,
        target,
        file_name,
        &archive_path,
        &staging_dir,
        cleanup_ctx,
    )
    .await;

    if result.is_err() {
        discard_paths(runtime, cleanup_ctx, &archive_path, &staging_dir);
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn stage<R: Runtime, E: ArchiveExtractor>(
    runtime: &R,
    http_client: &HttpClient,
    extractor: &E,
    formula: &Formula,
    target: &ReleaseTarget,
    file_name: &str,
    archive_path: &Path,
    staging_dir: &Path,
    cleanup_ctx: &SharedCleanupContext,
) -> Result<StagedTarget> {
    if let Some(work_dir) = archive_path.parent()
        && !runtime.exists(work_dir)
    {
        runtime.create_dir_all(work_dir)?;
    }

    lock(cleanup_ctx).add(archive_path.to_path_buf());
    let digest = download_file(runtime, &target.url, archive_path, http_client).await?;
    checksum::verify(file_name, &target.sha256, &digest)?;
    info!("Checksum verified for {}", file_name);

    if runtime.exists(staging_dir) {
        runtime.remove_dir_all(staging_dir)?;
    }
    runtime.create_dir_all(staging_dir)?;
    lock(cleanup_ctx).add(staging_dir.to_path_buf());

    let files = extractor.extract(runtime, archive_path, staging_dir)?;
    let binary = locate_binary(&files, &formula.binary)?.clone();
    debug!("Found executable {:?}", binary.relative);

    Ok(StagedTarget {
        archive_path: archive_path.to_path_buf(),
        staging_dir: staging_dir.to_path_buf(),
        digest,
        binary,
    })
}

fn discard_paths<R: Runtime>(
    runtime: &R,
    cleanup_ctx: &SharedCleanupContext,
    archive_path: &Path,
    staging_dir: &Path,
) {
    if runtime.exists(archive_path)
        && let Err(e) = runtime.remove_file(archive_path)
    {
        debug!("Failed to remove {:?}: {}", archive_path, e);
    }
    if runtime.exists(staging_dir)
        && let Err(e) = runtime.remove_dir_all(staging_dir)
    {
        debug!("Failed to remove {:?}: {}", staging_dir, e);
    }
    let mut ctx = lock(cleanup_ctx);
    ctx.remove(archive_path);
    ctx.remove(staging_dir);
}
