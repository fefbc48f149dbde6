use anyhow::Result;
use std::fmt::Write;
use std::path::Path;

use crate::formula::Formula;
use crate::runtime::Runtime;

use super::load_formula;

/// Print the formula and its release table
#[tracing::instrument(skip(runtime))]
pub fn show<R: Runtime>(runtime: R, formula_path: Option<&Path>) -> Result<()> {
    let formula = load_formula(&runtime, formula_path)?;
    print!("{}", format_formula(&formula));
    Ok(())
}

pub(crate) fn format_formula(formula: &Formula) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", formula.name, formula.version);
    let _ = writeln!(out, "{}", formula.desc);
    let _ = writeln!(out, "{}", formula.homepage);
    if let Some(license) = &formula.license {
        let _ = writeln!(out, "License: {}", license);
    }
    let _ = writeln!(out, "Binary:  {}", formula.binary);
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<14} {:<7} {:<64} URL", "TARGET", "GATE", "SHA256");
    for target in &formula.targets {
        let gate = target
            .bits
            .map(|bits| bits.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<14} {:<7} {} {}",
            target.key().to_string(),
            gate,
            target.sha256,
            target.url
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_formula() {
        let text = format_formula(&Formula::alpacon());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "alpacon-cli 0.2.1");
        assert_eq!(lines[1], "CLI for Alpacon");
        assert!(lines[5].starts_with("TARGET"));
        assert_eq!(lines.len(), 11);
        assert!(lines[6].starts_with("darwin-amd64   -       fdbd6dc1"));
        assert!(lines[9].starts_with("linux-arm      32-bit  99ca7ed9"));
        assert!(lines[9].ends_with("/0.2.1/alpacon-0.2.1-linux-arm.tar.gz"));
    }
}
