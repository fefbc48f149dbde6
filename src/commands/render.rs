use anyhow::{Context, Result};
use std::path::Path;

use crate::formula::{Formula, ruby, write_atomically};
use crate::runtime::Runtime;

use super::load_formula;

/// Render the formula as Homebrew Ruby, to stdout or `output`
#[tracing::instrument(skip(runtime))]
pub fn render<R: Runtime>(
    runtime: R,
    formula_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let formula = load_formula(&runtime, formula_path)?;
    let text = ruby::render(&formula)?;
    match output {
        Some(path) => {
            write_atomically(&runtime, path, text.as_bytes())?;
            println!("   wrote {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// Read a Homebrew Ruby formula and emit it as JSON, to stdout or `output`
#[tracing::instrument(skip(runtime))]
pub fn import<R: Runtime>(runtime: R, ruby_path: &Path, output: Option<&Path>) -> Result<()> {
    let text = runtime
        .read_to_string(ruby_path)
        .with_context(|| format!("Failed to read {:?}", ruby_path))?;
    let formula: Formula = ruby::parse(&text)
        .with_context(|| format!("Failed to parse Ruby formula {:?}", ruby_path))?;
    match output {
        Some(path) => {
            formula.save(&runtime, path)?;
            println!("   wrote {}", path.display());
        }
        None => println!("{}", formula.to_json()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use std::fs;
    use tempfile::tempdir;

    const PUBLISHED: &str = include_str!("../../Formula/alpacon-cli.rb");

    #[test]
    fn test_render_to_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("Formula").join("alpacon-cli.rb");

        render(RealRuntime, None, Some(out.as_path())).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("class AlpaconCli < Formula"));
        assert!(text.contains("      if !Hardware::CPU.is_64_bit?\n"));
        assert!(!dir.path().join("Formula").join("alpacon-cli.rb.tmp").exists());
    }

    #[test]
    fn test_import_published_formula() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("alpacon.json");

        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(PUBLISHED.to_string()));
        runtime.expect_exists().returning(|_| true);
        runtime.expect_write().times(1).returning(|path, contents| {
            assert!(path.to_string_lossy().ends_with("alpacon.json.tmp"));
            let formula: Formula = serde_json::from_slice(contents).unwrap();
            assert_eq!(formula, Formula::alpacon());
            Ok(())
        });
        runtime.expect_rename().times(1).returning(|_, _| Ok(()));

        import(runtime, Path::new("Formula/alpacon-cli.rb"), Some(out.as_path())).unwrap();
    }

    #[test]
    fn test_import_invalid_ruby() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("class Broken < Formula\n".to_string()));

        let err = import(runtime, Path::new("broken.rb"), None).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.rb"));
    }
}
