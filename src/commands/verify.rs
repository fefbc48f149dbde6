use anyhow::{Context, Result, bail};
use glob::Pattern;
use std::path::Path;

use crate::archive::Extractor;
use crate::install::Config;
use crate::runtime::Runtime;
use crate::verify::verify_targets;

use super::load_formula;

/// Download every (or every matching) target and check digest and executable
#[tracing::instrument(skip(runtime))]
pub async fn verify<R: Runtime>(
    runtime: R,
    formula_path: Option<&Path>,
    target: Option<&str>,
    jobs: usize,
) -> Result<()> {
    let formula = load_formula(&runtime, formula_path)?;
    let filter = target
        .map(|glob| Pattern::new(glob).with_context(|| format!("Invalid target pattern '{}'", glob)))
        .transpose()?;
    let config = Config::new()?;
    let work_dir = runtime
        .temp_dir()
        .join(format!("alpacon-dist-verify-{}", std::process::id()));

    println!("   verifying {} {}", formula.name, formula.version);
    let results = verify_targets(
        &runtime,
        &config.http_client,
        &Extractor::new(),
        &formula,
        filter.as_ref(),
        jobs,
        &work_dir,
    )
    .await?;

    let mut failed = 0;
    for result in &results {
        match &result.result {
            Ok(info) => println!("   ok     {:<14} {}", result.key.to_string(), info),
            Err(e) => {
                failed += 1;
                println!("   FAILED {:<14} {:#}", result.key.to_string(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} target(s) failed verification", failed, results.len());
    }
    println!("   all {} target(s) verified", results.len());
    Ok(())
}
