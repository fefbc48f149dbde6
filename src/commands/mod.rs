use anyhow::Result;
use log::debug;
use std::path::Path;

use crate::formula::Formula;
use crate::platform::{DefaultPlatformDetector, Platform, PlatformDetector};
use crate::runtime::Runtime;

mod bump;
mod check;
mod install;
mod render;
mod resolve;
mod show;
mod verify;

pub use bump::{BumpSource, bump};
pub use check::check;
pub use install::{install, list, uninstall};
pub use render::{import, render};
pub use resolve::resolve;
pub use show::show;
pub use verify::verify;

/// The formula at `path`, or the built-in alpacon table when no path is given.
pub(crate) fn load_formula<R: Runtime>(runtime: &R, path: Option<&Path>) -> Result<Formula> {
    match path {
        Some(path) => {
            debug!("Loading formula from {:?}", path);
            Formula::load(runtime, path)
        }
        None => Ok(Formula::alpacon()),
    }
}

pub(crate) fn target_platform<D: PlatformDetector>(detector: &D, platform: Option<Platform>) -> Platform {
    platform.unwrap_or_else(|| detector.detect())
}

pub(crate) fn host_platform(platform: Option<Platform>) -> Platform {
    target_platform(&DefaultPlatformDetector, platform)
}
