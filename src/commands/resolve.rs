use anyhow::Result;
use std::path::Path;

use crate::platform::Platform;
use crate::resolve as selection;
use crate::runtime::Runtime;

use super::{host_platform, load_formula};

/// Print the Release Target that would be installed on `platform` (default: this machine)
#[tracing::instrument(skip(runtime))]
pub fn resolve<R: Runtime>(
    runtime: R,
    formula_path: Option<&Path>,
    platform: Option<Platform>,
) -> Result<()> {
    let formula = load_formula(&runtime, formula_path)?;
    let platform = host_platform(platform);
    let target = selection::resolve(&formula, &platform)?;

    println!("platform: {} ({})", platform, platform.bits());
    println!("target:   {}", target.key());
    println!("url:      {}", target.url);
    println!("sha256:   {}", target.sha256);
    Ok(())
}
