use anyhow::{Result, bail};
use log::debug;
use std::collections::HashMap;

use super::{Formula, ReleaseTarget, SupportMatrix, url_path_start, validate, version_tokens};
use crate::checksum::{ChecksumFile, Sha256Digest};

/// Where the digests of a new release come from.
pub trait ChecksumSource {
    fn checksum(&self, file_name: &str) -> Option<Sha256Digest>;
}

impl ChecksumSource for ChecksumFile {
    fn checksum(&self, file_name: &str) -> Option<Sha256Digest> {
        self.get(file_name).copied()
    }
}

impl ChecksumSource for HashMap<String, Sha256Digest> {
    fn checksum(&self, file_name: &str) -> Option<Sha256Digest> {
        self.get(file_name).copied()
    }
}

/// The URL `target` moves to at `new_version`. Standard release URLs are
/// rebuilt from the homepage; anything else has its version token replaced.
pub fn bumped_url(formula: &Formula, target: &ReleaseTarget, new_version: &str) -> Result<String> {
    let key = target.key();
    let url = if target.url == formula.archive_url(key) {
        let next = Formula {
            version: new_version.to_string(),
            targets: Vec::new(),
            ..formula.clone()
        };
        next.archive_url(key)
    } else {
        replace_version(&target.url, &formula.version, new_version)
    };
    if url == target.url {
        bail!(
            "Cannot derive the {} url for {} from {}",
            new_version,
            key,
            target.url
        );
    }
    Ok(url)
}

/// Swaps whole `old` version tokens in the URL path; the host is left alone.
fn replace_version(url: &str, old: &str, new: &str) -> String {
    let start = url_path_start(url);
    let mut out = String::with_capacity(url.len() + new.len());
    let mut last = 0;
    for offset in version_tokens(&url[start..], old) {
        let at = start + offset;
        out.push_str(&url[last..at]);
        out.push_str(new);
        last = at + old.len();
    }
    out.push_str(&url[last..]);
    out
}

/// Produces the formula for `new_version`, replacing every URL and every
/// digest together. Any missing digest fails the whole bump; the input
/// formula is never modified.
#[tracing::instrument(skip(formula, checksums))]
pub fn bump<C: ChecksumSource>(formula: &Formula, new_version: &str, checksums: &C) -> Result<Formula> {
    let new_version = new_version.trim();
    if new_version.is_empty() {
        bail!("New version must not be empty");
    }
    if new_version == formula.version {
        bail!("{} is already at version {}", formula.name, new_version);
    }

    let mut next = Formula {
        version: new_version.to_string(),
        targets: Vec::with_capacity(formula.targets.len()),
        ..formula.clone()
    };

    let mut missing = Vec::new();
    for target in &formula.targets {
        let key = target.key();
        let url = bumped_url(formula, target, new_version)?;
        let candidate = ReleaseTarget {
            url,
            ..target.clone()
        };
        let file_name = candidate.file_name().unwrap_or_default().to_string();
        match checksums.checksum(&file_name) {
            Some(sha256) => {
                debug!("{} -> {} ({})", key, file_name, sha256);
                next.targets.push(ReleaseTarget { sha256, ..candidate });
            }
            None => missing.push(file_name),
        }
    }

    if !missing.is_empty() {
        bail!(
            "No checksum for {} archive(s): {}. Nothing was changed.",
            missing.len(),
            missing.join(", ")
        );
    }

    // The old table passed validation against itself; keep the same coverage
    let matrix = SupportMatrix::new(formula.targets.iter().map(ReleaseTarget::key));
    let report = validate(&next, &matrix);
    if !report.is_ok() {
        let errors: Vec<String> = report.errors().map(ToString::to_string).collect();
        bail!("Bumped formula is invalid:\n  {}", errors.join("\n  "));
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksums_for(formula: &Formula, version: &str) -> ChecksumFile {
        let mut file = ChecksumFile::default();
        for target in &formula.targets {
            let name = format!(
                "{}-{}-{}-{}.tar.gz",
                formula.binary, version, target.os, target.arch
            );
            let digest = Sha256Digest::of(name.as_bytes());
            file.insert(name, digest);
        }
        file
    }

    #[test]
    fn test_bump_replaces_every_url_and_digest() {
        let old = Formula::alpacon();
        let checksums = checksums_for(&old, "0.3.0");

        let new = bump(&old, "0.3.0", &checksums).unwrap();
        assert_eq!(new.version, "0.3.0");
        assert_eq!(new.targets.len(), old.targets.len());
        for (before, after) in old.targets.iter().zip(&new.targets) {
            assert_eq!(before.key(), after.key());
            assert_eq!(before.bits, after.bits);
            assert!(after.url.contains("/0.3.0/alpacon-0.3.0-"));
            assert_ne!(before.sha256, after.sha256);
            assert_eq!(
                after.sha256,
                *checksums.get(after.file_name().unwrap()).unwrap()
            );
        }
        // Input untouched
        assert_eq!(old, Formula::alpacon());
    }

    #[test]
    fn test_bump_is_all_or_nothing() {
        let old = Formula::alpacon();
        let mut checksums: HashMap<String, Sha256Digest> = HashMap::new();
        for target in old.targets.iter().take(4) {
            let name = format!("alpacon-0.3.0-{}-{}.tar.gz", target.os, target.arch);
            checksums.insert(name, Sha256Digest::of(b"x"));
        }

        let err = bump(&old, "0.3.0", &checksums).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("alpacon-0.3.0-linux-arm64.tar.gz"));
        assert!(message.contains("Nothing was changed"));
    }

    #[test]
    fn test_bump_rejects_same_or_empty_version() {
        let old = Formula::alpacon();
        let checksums = checksums_for(&old, "0.2.1");
        assert!(bump(&old, "0.2.1", &checksums).is_err());
        assert!(bump(&old, "  ", &checksums).is_err());
    }

    #[test]
    fn test_bump_custom_url_layout() {
        let mut old = Formula::alpacon();
        old.targets.truncate(1);
        old.targets[0].url =
            "https://mirror.example.com/alpacon/0.2.1/alpacon-0.2.1-darwin-amd64.tar.gz".to_string();

        let mut checksums = ChecksumFile::default();
        checksums.insert("alpacon-0.3.0-darwin-amd64.tar.gz", Sha256Digest::of(b"mac"));

        let new = bump(&old, "0.3.0", &checksums).unwrap();
        assert_eq!(
            new.targets[0].url,
            "https://mirror.example.com/alpacon/0.3.0/alpacon-0.3.0-darwin-amd64.tar.gz"
        );
    }

    #[test]
    fn test_bump_custom_url_only_touches_whole_version_in_path() {
        let mut old = Formula::alpacon();
        old.targets.truncate(1);
        old.targets[0].url =
            "https://0.2.1.mirror.example.com/0.2.1/alpacon-0.2.1-darwin-amd64.tar.gz?from=0.2.10"
                .to_string();

        let url = bumped_url(&old, &old.targets[0], "0.3.0").unwrap();
        assert_eq!(
            url,
            "https://0.2.1.mirror.example.com/0.3.0/alpacon-0.3.0-darwin-amd64.tar.gz?from=0.2.10"
        );
    }

    #[test]
    fn test_bump_fails_when_url_has_no_version() {
        let mut old = Formula::alpacon();
        old.targets.truncate(1);
        old.targets[0].url = "https://example.com/latest/alpacon.tar.gz".to_string();
        let checksums = ChecksumFile::default();
        let err = bump(&old, "0.3.0", &checksums).unwrap_err();
        assert!(err.to_string().contains("Cannot derive"));
    }
}
