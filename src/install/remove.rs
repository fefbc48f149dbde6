use anyhow::{Result, bail};
use log::warn;

use crate::runtime::Runtime;

use super::paths::Paths;
use super::receipt::{self, Receipt};

/// Removes the installed executable and its receipt. Returns `false` if the
/// user declined.
#[tracing::instrument(skip(runtime, paths))]
pub fn uninstall<R: Runtime>(runtime: &R, name: &str, paths: &Paths, yes: bool) -> Result<bool> {
    let receipt_path = paths.receipt_path(name);
    let Some(receipt) = Receipt::load_if_exists(runtime, &receipt_path)? else {
        bail!("{} is not installed under {}", name, paths.root.display());
    };

    if !yes {
        println!();
        println!("=== Uninstall Plan ===");
        println!();
        println!("Formula:  {} {}", receipt.name, receipt.version);
        println!("  [DEL]  {}", receipt.binary_path.display());
        println!("  [DEL]  {}", receipt_path.display());
        println!();
        if !runtime.confirm("Proceed with removal?")? {
            println!("Uninstall cancelled.");
            return Ok(false);
        }
    }

    if runtime.exists(&receipt.binary_path) {
        runtime.remove_file(&receipt.binary_path)?;
    } else {
        warn!(
            "Executable {} was already gone",
            receipt.binary_path.display()
        );
    }
    runtime.remove_file(&receipt_path)?;

    println!("   removed {} {}", receipt.name, receipt.version);
    Ok(true)
}

pub fn list<R: Runtime>(runtime: &R, paths: &Paths) -> Result<Vec<Receipt>> {
    receipt::load_all(runtime, &paths.receipts_dir())
}
