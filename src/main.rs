use alpacon_dist::commands::{self, BumpSource};
use alpacon_dist::formula::SupportMatrix;
use alpacon_dist::install::InstallOptions;
use alpacon_dist::platform::Platform;
use alpacon_dist::runtime::RealRuntime;
use alpacon_dist::verify::DEFAULT_JOBS;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// alpacon-dist - release distribution tool for the alpacon CLI
///
/// Inspects, verifies, bumps and installs the per-platform release table
/// published as the alpacon-cli Homebrew formula.
///
/// Without --formula the built-in alpacon-cli table is used.
/// If the GITHUB_TOKEN environment variable is set, it is sent with downloads.
///
/// Examples:
///   alpacon-dist resolve                   # Which archive fits this machine
///   alpacon-dist verify --target 'linux-*' # Download and check the Linux archives
///   alpacon-dist install -y                # Install alpacon into ~/.alpacon-dist/bin
#[derive(Parser, Debug)]
#[command(author, version = env!("ALPACON_DIST_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Formula file, JSON or Homebrew Ruby (.rb) (also via ALPACON_DIST_FORMULA)
    #[arg(
        long = "formula",
        short = 'f',
        env = "ALPACON_DIST_FORMULA",
        value_name = "PATH",
        global = true
    )]
    formula: Option<PathBuf>,

    /// Install root directory (overrides defaults; also via ALPACON_DIST_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "ALPACON_DIST_ROOT",
        value_name = "PATH",
        global = true
    )]
    root: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the formula and its release table
    Show,

    /// Print the release target selected for a platform
    Resolve {
        /// Platform as <os>-<arch>, e.g. linux-arm64 (default: this machine)
        #[arg(long, value_name = "OS-ARCH")]
        platform: Option<Platform>,
    },

    /// Validate the release table (coverage, gates, URLs)
    Check {
        /// Comma-separated targets that must each be covered exactly once
        #[arg(long, value_name = "KEYS")]
        matrix: Option<SupportMatrix>,
    },

    /// Download archives and verify checksums and executables
    Verify {
        /// Only verify targets matching this glob, e.g. 'linux-*'
        #[arg(long, value_name = "GLOB")]
        target: Option<String>,

        /// Number of archives to fetch at once
        #[arg(long, short = 'j', default_value_t = DEFAULT_JOBS)]
        jobs: usize,
    },

    /// Render the formula as Homebrew Ruby
    Render {
        /// Write to this file instead of stdout
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Convert a Homebrew Ruby formula to JSON
    Import {
        #[arg(value_name = "RUBY")]
        ruby: PathBuf,

        /// Write to this file instead of stdout
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Move the formula to a new version, replacing every URL and checksum
    Bump {
        #[arg(value_name = "VERSION")]
        version: String,

        /// sha256sum-style checksums file of the new release
        #[arg(
            long,
            value_name = "FILE",
            conflicts_with = "fetch",
            required_unless_present = "fetch"
        )]
        checksums: Option<PathBuf>,

        /// Download the new archives and compute their checksums
        #[arg(long)]
        fetch: bool,

        /// Write here instead of back to --formula (.rb writes Ruby)
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,

        /// Also render the bumped formula as Ruby to this file
        #[arg(long, value_name = "PATH")]
        ruby: Option<PathBuf>,
    },

    /// Install the alpacon executable
    Install(InstallArgs),

    /// Remove the installed executable recorded in the receipt
    Uninstall {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// List installed formulas
    List,
}

#[derive(clap::Args, Debug)]
struct InstallArgs {
    /// Install for this platform instead of the current machine
    #[arg(long, value_name = "OS-ARCH")]
    platform: Option<Platform>,

    /// Directory for the executable (default: <root>/bin; also via ALPACON_DIST_BIN_DIR)
    #[arg(long, env = "ALPACON_DIST_BIN_DIR", value_name = "PATH")]
    bin_dir: Option<PathBuf>,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    yes: bool,

    /// Reinstall even if this release is already installed
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;
    let formula = cli.formula.as_deref();

    match cli.command {
        Commands::Show => commands::show(runtime, formula)?,
        Commands::Resolve { platform } => commands::resolve(runtime, formula, platform)?,
        Commands::Check { matrix } => commands::check(runtime, formula, matrix)?,
        Commands::Verify { target, jobs } => {
            commands::verify(runtime, formula, target.as_deref(), jobs).await?
        }
        Commands::Render { output } => commands::render(runtime, formula, output.as_deref())?,
        Commands::Import { ruby, output } => {
            commands::import(runtime, &ruby, output.as_deref())?
        }
        Commands::Bump {
            version,
            checksums,
            fetch: _,
            output,
            ruby,
        } => {
            let source = match checksums {
                Some(path) => BumpSource::ChecksumFile(path),
                None => BumpSource::Fetch,
            };
            commands::bump(
                runtime,
                formula,
                &version,
                source,
                output.as_deref(),
                ruby.as_deref(),
            )
            .await?
        }
        Commands::Install(args) => {
            commands::install(
                runtime,
                formula,
                cli.root,
                args.bin_dir,
                args.platform,
                InstallOptions {
                    yes: args.yes,
                    force: args.force,
                },
            )
            .await?
        }
        Commands::Uninstall { yes } => commands::uninstall(runtime, formula, cli.root, yes)?,
        Commands::List => commands::list(runtime, cli.root)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpacon_dist::platform::{Arch, Os};

    #[test]
    fn test_cli_install_parsing() {
        let cli = Cli::try_parse_from([
            "alpacon-dist",
            "install",
            "--platform",
            "linux-arm",
            "-y",
        ])
        .unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.platform, Some(Platform::new(Os::Linux, Arch::Arm)));
                assert!(args.yes);
                assert!(!args.force);
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_cli_global_root_and_formula() {
        let cli = Cli::try_parse_from([
            "alpacon-dist",
            "--root",
            "/tmp/dist",
            "list",
            "--formula",
            "alpacon.json",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/dist")));
        assert_eq!(cli.formula, Some(PathBuf::from("alpacon.json")));
    }

    #[test]
    fn test_cli_verify_defaults() {
        let cli = Cli::try_parse_from(["alpacon-dist", "verify"]).unwrap();
        match cli.command {
            Commands::Verify { target, jobs } => {
                assert_eq!(target, None);
                assert_eq!(jobs, DEFAULT_JOBS);
            }
            _ => panic!("Expected Verify command"),
        }
    }

    #[test]
    fn test_cli_check_matrix() {
        let cli =
            Cli::try_parse_from(["alpacon-dist", "check", "--matrix", "linux-amd64,linux-arm64"])
                .unwrap();
        match cli.command {
            Commands::Check { matrix: Some(matrix) } => {
                assert_eq!(matrix.iter().count(), 2);
            }
            _ => panic!("Expected Check command with a matrix"),
        }
    }

    #[test]
    fn test_cli_bump_requires_a_checksum_source() {
        assert!(Cli::try_parse_from(["alpacon-dist", "bump", "0.3.0"]).is_err());
        assert!(
            Cli::try_parse_from([
                "alpacon-dist",
                "bump",
                "0.3.0",
                "--fetch",
                "--checksums",
                "checksums.txt"
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["alpacon-dist", "bump", "0.3.0", "--fetch"]).is_ok());
    }

    #[test]
    fn test_cli_bad_platform_fails() {
        assert!(Cli::try_parse_from(["alpacon-dist", "resolve", "--platform", "plan9-mips"]).is_err());
    }

    #[test]
    fn test_cli_uninstall_has_no_bin_dir() {
        let cli = Cli::try_parse_from(["alpacon-dist", "uninstall", "-y"]).unwrap();
        assert!(matches!(cli.command, Commands::Uninstall { yes: true }));
        assert!(Cli::try_parse_from(["alpacon-dist", "uninstall", "--bin-dir", "/usr/bin"]).is_err());
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["alpacon-dist"]).is_err());
    }
}
