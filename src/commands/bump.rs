use anyhow::{Context, Result, bail};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use log::info;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::checksum::{ChecksumFile, Sha256Digest};
use crate::download::digest_url;
use crate::formula::{self, Formula, bumped_url, ruby, write_atomically};
use crate::http::HttpClient;
use crate::install::Config;
use crate::runtime::Runtime;
use crate::verify::DEFAULT_JOBS;

/// Where the new release's digests come from.
#[derive(Debug, Clone, PartialEq)]
pub enum BumpSource {
    /// A `sha256sum`-style checksums file published with the release.
    ChecksumFile(PathBuf),
    /// Download every new archive and hash it.
    Fetch,
}

/// Move the formula to `version`, replacing all URLs and digests in one write
#[tracing::instrument(skip(runtime))]
pub async fn bump<R: Runtime>(
    runtime: R,
    formula_path: Option<&Path>,
    version: &str,
    source: BumpSource,
    output: Option<&Path>,
    ruby_output: Option<&Path>,
) -> Result<()> {
    let Some(output) = output.or(formula_path) else {
        bail!("Nowhere to write the bumped formula: pass --output or --formula");
    };
    let current = super::load_formula(&runtime, formula_path)?;

    let next = match source {
        BumpSource::ChecksumFile(path) => {
            let text = runtime
                .read_to_string(&path)
                .with_context(|| format!("Failed to read checksums {:?}", path))?;
            let checksums: ChecksumFile = text
                .parse()
                .with_context(|| format!("Failed to parse checksums {:?}", path))?;
            formula::bump(&current, version, &checksums)?
        }
        BumpSource::Fetch => {
            let config = Config::new()?;
            let checksums = fetch_checksums(&current, version, &config.http_client).await?;
            formula::bump(&current, version, &checksums)?
        }
    };

    write_formula(&runtime, &next, output)?;
    println!(
        "   bumped {} {} -> {} ({})",
        next.name,
        current.version,
        next.version,
        output.display()
    );

    if let Some(ruby_path) = ruby_output {
        write_atomically(&runtime, ruby_path, ruby::render(&next)?.as_bytes())?;
        println!("   wrote {}", ruby_path.display());
    }
    Ok(())
}

/// Writes Ruby for `.rb` paths and JSON otherwise.
fn write_formula<R: Runtime>(runtime: &R, formula: &Formula, path: &Path) -> Result<()> {
    let is_ruby = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("rb"));
    if is_ruby {
        write_atomically(runtime, path, ruby::render(formula)?.as_bytes())
    } else {
        formula.save(runtime, path)
    }
}

/// Hashes every archive the bumped formula will point at.
async fn fetch_checksums(
    formula: &Formula,
    version: &str,
    http_client: &HttpClient,
) -> Result<HashMap<String, Sha256Digest>> {
    let mut urls = Vec::with_capacity(formula.targets.len());
    for target in &formula.targets {
        urls.push(bumped_url(formula, target, version.trim())?);
    }

    info!("Fetching {} archive(s) to compute checksums", urls.len());
    stream::iter(urls)
        .map(|url| async move {
            let digest = digest_url(&url, http_client)
                .await
                .with_context(|| format!("Failed to fetch {}", url))?;
            let file_name = url.rsplit('/').next().unwrap_or_default().to_string();
            println!("   sha256 {} {}", digest, file_name);
            Ok::<_, anyhow::Error>((file_name, digest))
        })
        .buffer_unordered(DEFAULT_JOBS)
        .try_collect()
        .await
}
