//! End-to-end checks of every published archive: reachable, hashing to the
//! declared digest, and containing one executable built for its target.

use anyhow::{Result, anyhow, bail};
use futures_util::stream::{self, StreamExt};
use glob::Pattern;
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

use crate::archive::{ArchiveExtractor, ExtractedFile};
use crate::binary::{self, BinaryInfo};
use crate::cleanup::{self, SharedCleanupContext};
use crate::formula::{Formula, ReleaseTarget, TargetKey};
use crate::http::HttpClient;
use crate::install::stage_target;
use crate::runtime::Runtime;

pub const DEFAULT_JOBS: usize = 4;

/// Result of checking one Release Target.
#[derive(Debug)]
pub struct TargetVerification {
    pub key: TargetKey,
    pub url: String,
    pub result: Result<BinaryInfo>,
}

impl TargetVerification {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Targets whose `os-arch` key matches `filter` (all when `None`).
pub fn select_targets<'a>(
    formula: &'a Formula,
    filter: Option<&Pattern>,
) -> Result<Vec<&'a ReleaseTarget>> {
    let selected: Vec<&ReleaseTarget> = formula
        .targets
        .iter()
        .filter(|t| filter.is_none_or(|p| p.matches(&t.key().to_string())))
        .collect();
    if selected.is_empty() {
        match filter {
            Some(pattern) => bail!("No target matches '{}'", pattern),
            None => bail!("Formula {} declares no targets", formula.name),
        }
    }
    Ok(selected)
}

/// Downloads and inspects the selected targets, at most `jobs` at a time.
/// Results come back ordered by target key.
#[tracing::instrument(skip(runtime, http_client, extractor, formula))]
pub async fn verify_targets<R: Runtime, E: ArchiveExtractor>(
    runtime: &R,
    http_client: &HttpClient,
    extractor: &E,
    formula: &Formula,
    filter: Option<&Pattern>,
    jobs: usize,
    work_dir: &Path,
) -> Result<Vec<TargetVerification>> {
    let targets = select_targets(formula, filter)?;
    info!(
        "Verifying {} target(s) of {} {} with {} job(s)",
        targets.len(),
        formula.name,
        formula.version,
        jobs.max(1)
    );

    let cleanup_ctx = cleanup::new_shared();
    let ctrl_c_handler = cleanup::spawn_interrupt_handler(Arc::clone(&cleanup_ctx));

    let mut results: Vec<TargetVerification> = stream::iter(targets)
        .map(|target| {
            let cleanup_ctx = &cleanup_ctx;
            async move {
                let result = verify_target(
                    runtime,
                    http_client,
                    extractor,
                    formula,
                    target,
                    work_dir,
                    cleanup_ctx,
                )
                .await;
                TargetVerification {
                    key: target.key(),
                    url: target.url.clone(),
                    result,
                }
            }
        })
        .buffer_unordered(jobs.max(1))
        .collect()
        .await;

    ctrl_c_handler.abort();
    if runtime.exists(work_dir)
        && let Err(e) = runtime.remove_dir_all(work_dir)
    {
        debug!("Failed to remove {:?}: {}", work_dir, e);
    }

    results.sort_by_key(|r| r.key);
    Ok(results)
}

async fn verify_target<R: Runtime, E: ArchiveExtractor>(
    runtime: &R,
    http_client: &HttpClient,
    extractor: &E,
    formula: &Formula,
    target: &ReleaseTarget,
    work_dir: &Path,
    cleanup_ctx: &SharedCleanupContext,
) -> Result<BinaryInfo> {
    let staged = stage_target(
        runtime,
        http_client,
        extractor,
        formula,
        target,
        work_dir,
        cleanup_ctx,
    )
    .await?;

    let checked = check_binary(runtime, &staged.binary, target.key());
    staged.discard(runtime, cleanup_ctx);
    checked
}

fn check_binary<R: Runtime>(
    runtime: &R,
    file: &ExtractedFile,
    key: TargetKey,
) -> Result<BinaryInfo> {
    if !file.is_executable() {
        return Err(anyhow!(
            "Executable {:?} is not marked executable",
            file.relative
        ));
    }
    let info = binary::inspect_file(runtime, &file.path)?;
    if !info.supports(key) {
        return Err(anyhow!(
            "Executable is built for {}, but the target is {}",
            info,
            key
        ));
    }
    debug!("{} contains a {} executable", key, info);
    Ok(info)
}
