use anyhow::{Result, anyhow};
use log::debug;
use std::fmt;

use crate::formula::{Formula, ReleaseTarget, TargetKey};
use crate::platform::Platform;

/// No Release Target in the formula matches the machine.
#[derive(Debug)]
pub struct UnsupportedPlatform {
    pub platform: Platform,
    pub available: Vec<TargetKey>,
}

impl fmt::Display for UnsupportedPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let available: Vec<String> = self.available.iter().map(ToString::to_string).collect();
        write!(
            f,
            "No release for platform {} ({}). Available targets: {}",
            self.platform,
            self.platform.bits(),
            if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            }
        )
    }
}

impl std::error::Error for UnsupportedPlatform {}

/// Picks the single Release Target that `platform` would install.
#[tracing::instrument(skip(formula))]
pub fn resolve<'a>(formula: &'a Formula, platform: &Platform) -> Result<&'a ReleaseTarget> {
    let candidates: Vec<&ReleaseTarget> = formula
        .targets
        .iter()
        .filter(|target| target.matches(platform))
        .collect();

    match candidates.as_slice() {
        [target] => {
            debug!("Resolved {} to {}", platform, target.key());
            Ok(target)
        }
        [] => Err(UnsupportedPlatform {
            platform: *platform,
            available: formula.targets.iter().map(ReleaseTarget::key).collect(),
        }
        .into()),
        many => {
            let keys: Vec<String> = many.iter().map(|t| t.key().to_string()).collect();
            Err(anyhow!(
                "Formula is ambiguous for platform {}: targets {} all match",
                platform,
                keys.join(", ")
            ))
        }
    }
}
