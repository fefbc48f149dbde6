//! Installing a formula's executable: staging, placement and receipts.

mod config;
mod installer;
mod paths;
mod receipt;
mod remove;
mod stage;

pub use config::Config;
pub use installer::{InstallOptions, InstallOutcome, Installer};
pub use paths::{Paths, default_root, on_search_path};
pub use receipt::Receipt;
pub use remove::{list, uninstall};
pub use stage::{StagedTarget, stage_target};
