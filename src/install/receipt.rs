use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::checksum::Sha256Digest;
use crate::formula::{TargetKey, write_atomically};
use crate::runtime::Runtime;

/// Record of one installed formula.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Receipt {
    pub name: String,
    pub version: String,
    #[serde(with = "target_key_string")]
    pub target: TargetKey,
    /// Digest of the archive the binary came from.
    pub sha256: Sha256Digest,
    pub binary_path: PathBuf,
    pub installed_at: DateTime<Utc>,
}

impl Receipt {
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read receipt {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse receipt {:?}", path))
    }

    /// `Ok(None)` when nothing is installed under that path.
    pub fn load_if_exists<R: Runtime>(runtime: &R, path: &Path) -> Result<Option<Self>> {
        if !runtime.exists(path) {
            return Ok(None);
        }
        Self::load(runtime, path).map(Some)
    }

    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize receipt")?;
        write_atomically(runtime, path, json.as_bytes())
    }
}

/// Every readable receipt in `dir`, sorted by name. Unreadable ones are skipped.
pub fn load_all<R: Runtime>(runtime: &R, dir: &Path) -> Result<Vec<Receipt>> {
    if !runtime.exists(dir) {
        return Ok(Vec::new());
    }
    let mut receipts = Vec::new();
    for path in runtime.read_dir(dir)? {
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }
        match Receipt::load(runtime, &path) {
            Ok(receipt) => receipts.push(receipt),
            Err(e) => warn!("Skipping {:?}: {:#}", path, e),
        }
    }
    receipts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(receipts)
}

mod target_key_string {
    use crate::formula::TargetKey;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(key: &TargetKey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TargetKey, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
