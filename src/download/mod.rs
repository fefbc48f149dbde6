use crate::checksum::{HashingWriter, Sha256Digest};
use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;

/// Downloads `url` to `dest` with retry support and returns the SHA-256 of
/// the bytes written.
#[tracing::instrument(skip(runtime, dest, http_client))]
pub async fn download_file<R: Runtime>(
    runtime: &R,
    url: &str,
    dest: &Path,
    http_client: &HttpClient,
) -> Result<Sha256Digest> {
    info!("Downloading file from {}...", url);

    let (writer, bytes) = http_client
        .download_file(url, || {
            let file = runtime
                .create_file(dest)
                .with_context(|| format!("Failed to create download file at {:?}", dest))?;
            Ok(HashingWriter::new(file))
        })
        .await?;
    let digest = writer.finish()?;

    info!("Download complete ({} bytes, sha256 {}).", bytes, digest);
    Ok(digest)
}

/// SHA-256 of the body at `url`, without keeping the bytes.
#[tracing::instrument(skip(http_client))]
pub async fn digest_url(url: &str, http_client: &HttpClient) -> Result<Sha256Digest> {
    let (writer, bytes) = http_client
        .download_file(url, || Ok(HashingWriter::new(std::io::sink())))
        .await?;
    let digest = writer.finish()?;
    debug!("{} ({} bytes) -> {}", url, bytes, digest);
    Ok(digest)
}
