use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// On-disk layout of an install root.
#[derive(Debug, Clone, PartialEq)]
pub struct Paths {
    pub root: PathBuf,
    /// Where executables are placed.
    pub bin_dir: PathBuf,
}

impl Paths {
    /// Applies the defaults for whichever of `root` / `bin_dir` were not given.
    #[tracing::instrument(skip(runtime))]
    pub fn resolve<R: Runtime>(
        runtime: &R,
        root: Option<PathBuf>,
        bin_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let root = match root {
            Some(path) => path,
            None => default_root(runtime)?,
        };
        let bin_dir = bin_dir.unwrap_or_else(|| root.join("bin"));
        debug!("Using root {:?}, bin dir {:?}", root, bin_dir);
        Ok(Self { root, bin_dir })
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.root.join("receipts")
    }

    pub fn receipt_path(&self, name: &str) -> PathBuf {
        self.receipts_dir().join(format!("{}.json", name))
    }

    /// Scratch space for downloads and extraction.
    pub fn work_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn binary_path(&self, binary: &str) -> PathBuf {
        self.bin_dir.join(executable_name(binary))
    }
}

fn executable_name(binary: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", binary)
    } else {
        binary.to_string()
    }
}

#[tracing::instrument(skip(runtime))]
pub fn default_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_root())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".alpacon-dist"))
    }
}

#[cfg(target_os = "macos")]
fn system_root() -> PathBuf {
    PathBuf::from("/opt/alpacon-dist")
}

#[cfg(target_os = "windows")]
fn system_root() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\alpacon-dist")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_root() -> PathBuf {
    PathBuf::from("/usr/local/alpacon-dist")
}

/// Whether `dir` appears in the `PATH` the runtime sees.
pub fn on_search_path<R: Runtime>(runtime: &R, dir: &Path) -> bool {
    runtime
        .env_var("PATH")
        .map(|path| std::env::split_paths(&path).any(|entry| entry == dir))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    #[test]
    fn test_default_root_for_user() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime
            .expect_home_dir()
            .returning(|| Some(PathBuf::from("/home/user")));

        let paths = Paths::resolve(&runtime, None, None).unwrap();
        assert_eq!(paths.root, PathBuf::from("/home/user/.alpacon-dist"));
        assert_eq!(paths.bin_dir, PathBuf::from("/home/user/.alpacon-dist/bin"));
        assert_eq!(
            paths.receipt_path("alpacon-cli"),
            PathBuf::from("/home/user/.alpacon-dist/receipts/alpacon-cli.json")
        );
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_default_root_when_privileged() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| true);

        assert_eq!(
            default_root(&runtime).unwrap(),
            PathBuf::from("/usr/local/alpacon-dist")
        );
    }

    #[test]
    fn test_default_root_without_home_fails() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime.expect_home_dir().returning(|| None);

        assert!(default_root(&runtime).is_err());
    }

    #[test]
    fn test_explicit_root_and_bin_dir() {
        let runtime = MockRuntime::new();
        let paths = Paths::resolve(
            &runtime,
            Some(PathBuf::from("/srv/dist")),
            Some(PathBuf::from("/usr/local/bin")),
        )
        .unwrap();
        assert_eq!(paths.bin_dir, PathBuf::from("/usr/local/bin"));
        assert_eq!(paths.work_dir(), PathBuf::from("/srv/dist/tmp"));
    }

    #[test]
    #[cfg(unix)]
    fn test_on_search_path() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(eq("PATH"))
            .returning(|_| Ok("/usr/bin:/home/user/.alpacon-dist/bin".to_string()));

        assert!(on_search_path(&runtime, Path::new("/home/user/.alpacon-dist/bin")));
        assert!(!on_search_path(&runtime, Path::new("/opt/bin")));
    }
}
