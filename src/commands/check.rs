use anyhow::{Result, bail};
use std::path::Path;

use crate::formula::{SupportMatrix, validate};
use crate::runtime::Runtime;

use super::load_formula;

/// Validate the formula's table against `matrix` (default: the alpacon support matrix).
/// Fails when any error-level issue is found.
#[tracing::instrument(skip(runtime))]
pub fn check<R: Runtime>(
    runtime: R,
    formula_path: Option<&Path>,
    matrix: Option<SupportMatrix>,
) -> Result<()> {
    let formula = load_formula(&runtime, formula_path)?;
    let matrix = matrix.unwrap_or_else(SupportMatrix::alpacon);
    let report = validate(&formula, &matrix);

    for issue in &report.issues {
        println!("{}", issue);
    }

    let errors = report.errors().count();
    let warnings = report.warnings().count();
    if errors > 0 {
        bail!(
            "{} {} failed validation: {} error(s), {} warning(s)",
            formula.name,
            formula.version,
            errors,
            warnings
        );
    }

    println!(
        "{} {}: {} target(s) OK ({} warning(s))",
        formula.name,
        formula.version,
        formula.targets.len(),
        warnings
    );
    Ok(())
}
