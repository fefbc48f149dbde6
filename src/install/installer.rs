use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;

use crate::archive::ArchiveExtractor;
use crate::cleanup::{self, CleanupGuard, SharedCleanupContext};
use crate::formula::{Formula, ReleaseTarget};
use crate::http::HttpClient;
use crate::platform::Platform;
use crate::resolve::resolve;
use crate::runtime::Runtime;

use super::paths::{Paths, on_search_path};
use super::receipt::Receipt;
use super::stage::stage_target;

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Skip the confirmation prompt.
    pub yes: bool,
    /// Reinstall even when the same release is already in place.
    pub force: bool,
}

#[derive(Debug, PartialEq)]
pub enum InstallOutcome {
    Installed(Receipt),
    AlreadyInstalled(Receipt),
    Cancelled,
}

pub struct Installer<R: Runtime, E: ArchiveExtractor> {
    pub runtime: R,
    pub http_client: HttpClient,
    pub extractor: E,
}

impl<R: Runtime, E: ArchiveExtractor> Installer<R, E> {
    #[tracing::instrument(skip(runtime, http_client, extractor))]
    pub fn new(runtime: R, http_client: HttpClient, extractor: E) -> Self {
        Self {
            runtime,
            http_client,
            extractor,
        }
    }

    #[tracing::instrument(skip(self, formula, paths))]
    pub async fn install(
        &self,
        formula: &Formula,
        platform: &Platform,
        paths: &Paths,
        options: InstallOptions,
    ) -> Result<InstallOutcome> {
        let target = resolve(formula, platform)?;
        let receipt_path = paths.receipt_path(&formula.name);
        let binary_path = paths.binary_path(&formula.binary);

        let existing = self.existing_receipt(&receipt_path);
        if let Some(existing) = &existing
            && !options.force
            && existing.version == formula.version
            && existing.target == target.key()
            && existing.sha256 == target.sha256
            && self.runtime.exists(&existing.binary_path)
        {
            println!(
                "   {} {} is already installed at {}",
                formula.name,
                formula.version,
                existing.binary_path.display()
            );
            return Ok(InstallOutcome::AlreadyInstalled(existing.clone()));
        }

        if !options.yes {
            show_install_plan(formula, target, platform, &binary_path, &receipt_path);
            if !self.runtime.confirm("Proceed with installation?")? {
                println!("Installation cancelled.");
                return Ok(InstallOutcome::Cancelled);
            }
        }

        let cleanup_ctx = cleanup::new_shared();
        let ctrl_c_handler = cleanup::spawn_interrupt_handler(Arc::clone(&cleanup_ctx));
        let result = self
            .install_target(formula, target, paths, &binary_path, &cleanup_ctx)
            .await;
        ctrl_c_handler.abort();
        let receipt = result?;

        if let Some(previous) = existing
            && previous.binary_path != receipt.binary_path
            && self.runtime.exists(&previous.binary_path)
        {
            warn!(
                "A previous install is still at {}; remove it if it is no longer needed",
                previous.binary_path.display()
            );
        }

        receipt.save(&self.runtime, &receipt_path)?;

        println!(
            "   installed {} {} ({}) {}",
            formula.name,
            formula.version,
            target.key(),
            binary_path.display()
        );
        if !on_search_path(&self.runtime, &paths.bin_dir) {
            println!(
                "   note: {} is not on your PATH",
                paths.bin_dir.display()
            );
        }

        Ok(InstallOutcome::Installed(receipt))
    }

    async fn install_target(
        &self,
        formula: &Formula,
        target: &ReleaseTarget,
        paths: &Paths,
        binary_path: &Path,
        cleanup_ctx: &SharedCleanupContext,
    ) -> Result<Receipt> {
        println!("   downloading {}", target.url);
        let staged = stage_target(
            &self.runtime,
            &self.http_client,
            &self.extractor,
            formula,
            target,
            &paths.work_dir(),
            cleanup_ctx,
        )
        .await?;

        let placed = self.place_binary(&staged.binary.path, binary_path, cleanup_ctx);
        staged.discard(&self.runtime, cleanup_ctx);
        placed?;

        Ok(Receipt {
            name: formula.name.clone(),
            version: formula.version.clone(),
            target: target.key(),
            sha256: staged.digest,
            binary_path: binary_path.to_path_buf(),
            installed_at: Utc::now(),
        })
    }

    /// Copies `source` next to `dest` and renames it into place with mode 0755,
    /// so `dest` is never a half-written executable.
    fn place_binary(
        &self,
        source: &Path,
        dest: &Path,
        cleanup_ctx: &SharedCleanupContext,
    ) -> Result<()> {
        let bin_dir = dest
            .parent()
            .with_context(|| format!("Invalid install path {:?}", dest))?;
        if !self.runtime.exists(bin_dir) {
            self.runtime.create_dir_all(bin_dir)?;
        }

        let file_name = dest
            .file_name()
            .with_context(|| format!("Invalid install path {:?}", dest))?;
        let tmp_path = bin_dir.join(format!(".{}.tmp", file_name.to_string_lossy()));
        let guard = CleanupGuard::new(Arc::clone(cleanup_ctx), tmp_path.clone());

        debug!("Copying {:?} to {:?}", source, tmp_path);
        let placed = self
            .runtime
            .copy(source, &tmp_path)
            .with_context(|| format!("Failed to copy executable to {:?}", tmp_path))
            .and_then(|_| self.runtime.set_permissions(&tmp_path, 0o755))
            .and_then(|_| {
                self.runtime
                    .rename(&tmp_path, dest)
                    .with_context(|| format!("Failed to move executable into {:?}", dest))
            });
        if let Err(e) = placed {
            if self.runtime.exists(&tmp_path)
                && let Err(remove_err) = self.runtime.remove_file(&tmp_path)
            {
                warn!("Failed to remove {:?}: {}", tmp_path, remove_err);
            }
            guard.success();
            return Err(e);
        }

        guard.success();
        info!("Installed executable at {:?}", dest);
        Ok(())
    }

    fn existing_receipt(&self, receipt_path: &Path) -> Option<Receipt> {
        match Receipt::load_if_exists(&self.runtime, receipt_path) {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Ignoring unreadable receipt: {:#}", e);
                None
            }
        }
    }
}

fn show_install_plan(
    formula: &Formula,
    target: &ReleaseTarget,
    platform: &Platform,
    binary_path: &Path,
    receipt_path: &Path,
) {
    println!();
    println!("=== Installation Plan ===");
    println!();
    println!("Formula:  {} {}", formula.name, formula.version);
    println!("Platform: {} ({})", platform, platform.bits());
    println!("Target:   {}", target.key());
    println!();
    println!("Files to download:");
    println!("  - {}", target.url);
    println!("    sha256 {}", target.sha256);
    println!();
    println!("Files to create:");
    println!("  [FILE] {}", binary_path.display());
    println!("  [FILE] {}", receipt_path.display());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Extractor;
    use crate::archive::test_support::tar_gz;
    use crate::checksum::ChecksumMismatch;
    use crate::install::stage::test_support::{alpacon_archive, served_formula};
    use crate::platform::{Arch, Os};
    use crate::resolve::UnsupportedPlatform;
    use crate::runtime::{MockRuntime, RealRuntime};
    use reqwest::Client;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    const ARCHIVE_PATH: &str = "/alpacon-0.2.1-linux-amd64.tar.gz";

    fn linux_amd64() -> Platform {
        Platform::new(Os::Linux, Arch::Amd64)
    }

    fn real_installer() -> Installer<RealRuntime, Extractor> {
        Installer::new(RealRuntime, HttpClient::new(Client::new()), Extractor::new())
    }

    fn temp_paths() -> (TempDir, Paths) {
        let dir = tempdir().unwrap();
        let paths = Paths {
            root: dir.path().join("root"),
            bin_dir: dir.path().join("bin"),
        };
        (dir, paths)
    }

    const YES: InstallOptions = InstallOptions {
        yes: true,
        force: false,
    };

    #[test_log::test(tokio::test)]
    async fn test_install_happy_path() {
        let archive = alpacon_archive();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", ARCHIVE_PATH)
            .with_body(archive.clone())
            .expect(1)
            .create_async()
            .await;
        let formula = served_formula(&server.url(), &archive);
        let (_dir, paths) = temp_paths();

        let outcome = real_installer()
            .install(&formula, &linux_amd64(), &paths, YES)
            .await
            .unwrap();

        mock.assert_async().await;
        let receipt = match outcome {
            InstallOutcome::Installed(receipt) => receipt,
            other => panic!("expected a fresh install, got {:?}", other),
        };
        let binary = paths.bin_dir.join("alpacon");
        assert_eq!(receipt.binary_path, binary);
        assert_eq!(receipt.sha256, formula.targets[0].sha256);
        assert_eq!(
            fs::read_to_string(&binary).unwrap(),
            "#!/bin/sh\necho alpacon\n"
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&binary).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        let saved = Receipt::load(&RealRuntime, &paths.receipt_path("alpacon-cli")).unwrap();
        assert_eq!(saved, receipt);
        // Only the executable is kept; README and the archive are gone
        assert!(fs::read_dir(paths.work_dir()).unwrap().next().is_none());
        assert_eq!(fs::read_dir(&paths.bin_dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_reinstall_is_noop_unless_forced() {
        let archive = alpacon_archive();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", ARCHIVE_PATH)
            .with_body(archive.clone())
            .expect(2)
            .create_async()
            .await;
        let formula = served_formula(&server.url(), &archive);
        let (_dir, paths) = temp_paths();
        let installer = real_installer();

        installer
            .install(&formula, &linux_amd64(), &paths, YES)
            .await
            .unwrap();
        let again = installer
            .install(&formula, &linux_amd64(), &paths, YES)
            .await
            .unwrap();
        assert!(matches!(again, InstallOutcome::AlreadyInstalled(_)));

        let forced = installer
            .install(
                &formula,
                &linux_amd64(),
                &paths,
                InstallOptions {
                    yes: true,
                    force: true,
                },
            )
            .await
            .unwrap();
        assert!(matches!(forced, InstallOutcome::Installed(_)));
        mock.assert_async().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_install_checksum_mismatch_leaves_nothing() {
        let archive = alpacon_archive();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", ARCHIVE_PATH)
            .with_body(tar_gz(&[("alpacon", b"evil", 0o755)]).unwrap())
            .create_async()
            .await;
        let formula = served_formula(&server.url(), &archive);
        let (_dir, paths) = temp_paths();

        let err = real_installer()
            .install(&formula, &linux_amd64(), &paths, YES)
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<ChecksumMismatch>().is_some());
        assert!(!paths.bin_dir.join("alpacon").exists());
        assert!(!paths.receipt_path("alpacon-cli").exists());
        assert!(fs::read_dir(paths.work_dir()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_install_unsupported_platform() {
        let formula = Formula::alpacon();
        let (_dir, paths) = temp_paths();

        let err = real_installer()
            .install(&formula, &Platform::new(Os::Linux, Arch::X86), &paths, YES)
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<UnsupportedPlatform>().is_some());
    }

    #[tokio::test]
    async fn test_install_cancelled() {
        let formula = Formula::alpacon();
        let paths = Paths {
            root: PathBuf::from("/home/user/.alpacon-dist"),
            bin_dir: PathBuf::from("/home/user/.alpacon-dist/bin"),
        };

        let mut runtime = MockRuntime::new();
        runtime
            .expect_exists()
            .with(mockall::predicate::eq(paths.receipt_path("alpacon-cli")))
            .returning(|_| false);
        runtime
            .expect_confirm()
            .times(1)
            .returning(|_| Ok(false));

        let installer = Installer::new(runtime, HttpClient::new(Client::new()), Extractor::new());
        let outcome = installer
            .install(
                &formula,
                &Platform::new(Os::Darwin, Arch::Arm64),
                &paths,
                InstallOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, InstallOutcome::Cancelled);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_placement_removes_temp_copy() {
        let archive = alpacon_archive();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", ARCHIVE_PATH)
            .with_body(archive.clone())
            .create_async()
            .await;
        let formula = served_formula(&server.url(), &archive);
        let (_dir, paths) = temp_paths();
        // A non-empty directory where the executable should go makes the rename fail
        let occupied = paths.bin_dir.join("alpacon");
        fs::create_dir_all(occupied.join("keep")).unwrap();

        let err = real_installer()
            .install(&formula, &linux_amd64(), &paths, YES)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Failed to move executable"));
        let mut entries: Vec<String> = fs::read_dir(&paths.bin_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["alpacon".to_string()]);
        assert!(occupied.join("keep").is_dir());
        assert!(!paths.receipt_path("alpacon-cli").exists());
        assert!(fs::read_dir(paths.work_dir()).unwrap().next().is_none());
    }

    #[test]
    fn test_failed_chmod_removes_temp_copy() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime.expect_copy().times(1).returning(|_, _| Ok(12));
        runtime
            .expect_set_permissions()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("Operation not permitted")));
        runtime.expect_rename().never();
        runtime
            .expect_remove_file()
            .with(mockall::predicate::eq(PathBuf::from("/opt/bin/.alpacon.tmp")))
            .times(1)
            .returning(|_| Ok(()));

        let installer = Installer::new(runtime, HttpClient::new(Client::new()), Extractor::new());
        let ctx = crate::cleanup::new_shared();
        let err = installer
            .place_binary(Path::new("/stage/alpacon"), Path::new("/opt/bin/alpacon"), &ctx)
            .unwrap_err();

        assert!(err.to_string().contains("Operation not permitted"));
    }
}
