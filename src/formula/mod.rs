//! The release descriptor: one formula, one version, a flat table of
//! per-platform archives with their SHA-256 digests.

mod bump;
pub mod ruby;
mod validate;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::checksum::Sha256Digest;
use crate::platform::{Arch, BitWidth, Os, Platform};
use crate::runtime::Runtime;

pub use bump::{ChecksumSource, bump, bumped_url};
pub use validate::{Issue, IssueKind, Report, Severity, SupportMatrix, validate};

/// Identity of a Release Target within one version: `darwin-amd64`, `linux-arm`...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub os: Os,
    pub arch: Arch,
}

impl TargetKey {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl FromStr for TargetKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let platform: Platform = s.parse()?;
        Ok(Self::new(platform.os, platform.arch))
    }
}

/// One published archive for one platform.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReleaseTarget {
    pub os: Os,
    pub arch: Arch,
    /// Only matches machines of this bit width when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<BitWidth>,
    pub url: String,
    pub sha256: Sha256Digest,
}

impl ReleaseTarget {
    pub fn key(&self) -> TargetKey {
        TargetKey::new(self.os, self.arch)
    }

    /// Homebrew semantics: same OS, same CPU family, and the bit-width gate
    /// (when present) equal to the machine's.
    pub fn matches(&self, platform: &Platform) -> bool {
        self.os == platform.os
            && self.arch.family() == platform.arch.family()
            && self.bits.is_none_or(|bits| bits == platform.bits())
    }

    /// Last path segment of the URL.
    pub fn file_name(&self) -> Option<&str> {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().filter(|name| !name.is_empty())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Formula {
    pub name: String,
    pub desc: String,
    pub homepage: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Name of the single executable inside every archive.
    pub binary: String,
    pub targets: Vec<ReleaseTarget>,
}

const ALPACON_TABLE: [(Os, Arch, Sha256Digest); 5] = [
    (
        Os::Darwin,
        Arch::Amd64,
        Sha256Digest::from_hex("fdbd6dc159d97b1560866c23f0e66b98a7da785e319ed31f3cff32221a42b735"),
    ),
    (
        Os::Darwin,
        Arch::Arm64,
        Sha256Digest::from_hex("62b7d09b7cdf276c5a0e36b7141c94bc8b6691de14a0dbd013e559336c8edeb0"),
    ),
    (
        Os::Linux,
        Arch::Amd64,
        Sha256Digest::from_hex("cedd3509683fcff51436cada37df36c215feb1dce76ad10a27432b30704bf419"),
    ),
    (
        Os::Linux,
        Arch::Arm,
        Sha256Digest::from_hex("99ca7ed9124b5dfb9c16aa2228ca34073634b24bc226870f5a1b2ab582e28944"),
    ),
    (
        Os::Linux,
        Arch::Arm64,
        Sha256Digest::from_hex("b4c9190994f18c3922c36b76c71678d2275ea12c302e1ab8f025605fc88c57e9"),
    ),
];

impl Formula {
    /// The published `alpacon-cli` 0.2.1 descriptor.
    pub fn alpacon() -> Self {
        let mut formula = Formula {
            name: "alpacon-cli".to_string(),
            desc: "CLI for Alpacon".to_string(),
            homepage: "https://github.com/alpacanetworks/alpacon-cli".to_string(),
            version: "0.2.1".to_string(),
            license: None,
            binary: "alpacon".to_string(),
            targets: Vec::with_capacity(ALPACON_TABLE.len()),
        };
        for (os, arch, sha256) in ALPACON_TABLE {
            let key = TargetKey::new(os, arch);
            formula.targets.push(ReleaseTarget {
                os,
                arch,
                bits: default_gate(key),
                url: formula.archive_url(key),
                sha256,
            });
        }
        formula
    }

    /// `<binary>-<version>-<os>-<arch>.tar.gz`
    pub fn archive_name(&self, key: TargetKey) -> String {
        format!("{}-{}-{}-{}.tar.gz", self.binary, self.version, key.os, key.arch)
    }

    pub fn archive_url(&self, key: TargetKey) -> String {
        format!(
            "{}/releases/download/{}/{}",
            self.homepage.trim_end_matches('/'),
            self.version,
            self.archive_name(key)
        )
    }

    pub fn target(&self, key: TargetKey) -> Option<&ReleaseTarget> {
        self.targets.iter().find(|t| t.key() == key)
    }

    /// Ruby class name, e.g. `alpacon-cli` -> `AlpaconCli`.
    pub fn class_name(&self) -> String {
        self.name
            .split(['-', '_'])
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect()
    }

    /// Inverse of [`Formula::class_name`], e.g. `AlpaconCli` -> `alpacon-cli`.
    pub fn name_from_class(class_name: &str) -> String {
        let mut name = String::with_capacity(class_name.len() + 4);
        for (i, c) in class_name.chars().enumerate() {
            if c.is_uppercase() {
                if i > 0 {
                    name.push('-');
                }
                name.extend(c.to_lowercase());
            } else {
                name.push(c);
            }
        }
        name
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize formula")
    }

    /// Loads a formula from JSON, or from Homebrew Ruby when the file ends in `.rb`.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read formula {:?}", path))?;
        let is_ruby = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("rb"));
        if is_ruby {
            ruby::parse(&content).with_context(|| format!("Failed to parse Ruby formula {:?}", path))
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse formula JSON {:?}", path))
        }
    }

    /// Writes the formula as JSON next to `path` and renames it into place,
    /// so readers never observe a half-updated table.
    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        write_atomically(runtime, path, self.to_json()?.as_bytes())
    }
}

/// The gate the published formula uses: Linux targets are pinned to their
/// bit width, macOS targets are not gated.
pub fn default_gate(key: TargetKey) -> Option<BitWidth> {
    match key.os {
        Os::Linux => Some(key.arch.bits()),
        _ => None,
    }
}

/// Byte offset where the path of `url` begins, after `scheme://host`.
pub(crate) fn url_path_start(url: &str) -> usize {
    url.find("://")
        .map(|i| i + 3)
        .and_then(|host| url[host..].find('/').map(|p| host + p))
        .unwrap_or(0)
}

/// Offsets of `version` in `text` where it stands as a whole version: not
/// preceded by a digit or dot, not followed by a digit or a further `.N`.
pub(crate) fn version_tokens(text: &str, version: &str) -> Vec<usize> {
    if version.is_empty() {
        return Vec::new();
    }
    let bytes = text.as_bytes();
    text.match_indices(version)
        .map(|(i, _)| i)
        .filter(|&i| {
            let before = i.checked_sub(1).map(|j| bytes[j]);
            let end = i + version.len();
            let continues = match bytes.get(end) {
                Some(b) if b.is_ascii_digit() => true,
                Some(b'.') => bytes.get(end + 1).is_some_and(|b| b.is_ascii_digit()),
                _ => false,
            };
            !continues && !matches!(before, Some(b) if b.is_ascii_digit() || b == b'.')
        })
        .collect()
}

pub(crate) fn write_atomically<R: Runtime>(runtime: &R, path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !runtime.exists(parent)
    {
        runtime.create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Invalid output path {:?}", path))?;
    let tmp_path = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));
    runtime
        .write(&tmp_path, contents)
        .with_context(|| format!("Failed to write {:?}", tmp_path))?;
    runtime
        .rename(&tmp_path, path)
        .with_context(|| format!("Failed to move {:?} into place", path))?;
    Ok(())
}
