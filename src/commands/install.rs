use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

use crate::archive::Extractor;
use crate::install::{self as installed, Config, InstallOptions, Installer, Paths};
use crate::platform::Platform;
use crate::runtime::Runtime;

use super::{host_platform, load_formula};

/// Install the formula's executable for `platform` (default: this machine)
#[tracing::instrument(skip(runtime))]
pub async fn install<R: Runtime>(
    runtime: R,
    formula_path: Option<&Path>,
    root: Option<PathBuf>,
    bin_dir: Option<PathBuf>,
    platform: Option<Platform>,
    options: InstallOptions,
) -> Result<()> {
    let formula = load_formula(&runtime, formula_path)?;
    let paths = Paths::resolve(&runtime, root, bin_dir)?;
    let platform = host_platform(platform);
    debug!("Installing {} for {}", formula.name, platform);

    let config = Config::new()?;
    let installer = Installer::new(runtime, config.http_client, Extractor::new());
    installer.install(&formula, &platform, &paths, options).await?;
    Ok(())
}

/// Remove the installed executable and its receipt
#[tracing::instrument(skip(runtime))]
pub fn uninstall<R: Runtime>(
    runtime: R,
    formula_path: Option<&Path>,
    root: Option<PathBuf>,
    yes: bool,
) -> Result<()> {
    let formula = load_formula(&runtime, formula_path)?;
    let paths = Paths::resolve(&runtime, root, None)?;
    installed::uninstall(&runtime, &formula.name, &paths, yes)?;
    Ok(())
}

/// List installed formulas
#[tracing::instrument(skip(runtime))]
pub fn list<R: Runtime>(runtime: R, root: Option<PathBuf>) -> Result<()> {
    let paths = Paths::resolve(&runtime, root, None)?;
    let receipts = installed::list(&runtime, &paths)?;
    if receipts.is_empty() {
        println!("No formulas installed.");
        return Ok(());
    }
    for receipt in receipts {
        println!(
            "{} {} {} {} (installed {})",
            receipt.name,
            receipt.version,
            receipt.target,
            receipt.binary_path.display(),
            receipt.installed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    Ok(())
}
