//! Platform model: operating systems, CPU architectures and bit widths.
//!
//! Release archives name their platform with Go-style tokens
//! (`darwin`, `linux`, `amd64`, `arm`, `arm64`), while Homebrew groups
//! machines by CPU family (`on_intel` / `on_arm`) and bit width. Both views
//! are available from the types here.

mod detection;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use detection::{DefaultPlatformDetector, PlatformDetector};
#[cfg(test)]
pub use detection::MockPlatformDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Darwin,
    Linux,
    Windows,
}

impl Os {
    pub const ALL: [Os; 3] = [Os::Darwin, Os::Linux, Os::Windows];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Os::Darwin => "darwin",
            Os::Linux => "linux",
            Os::Windows => "windows",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "darwin" | "macos" | "osx" => Ok(Os::Darwin),
            "linux" => Ok(Os::Linux),
            "windows" | "win" => Ok(Os::Windows),
            other => Err(anyhow!(
                "Unknown operating system '{}'. Expected one of: darwin, linux, windows",
                other
            )),
        }
    }
}

/// Homebrew's coarse CPU grouping (`on_intel` / `on_arm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuFamily {
    Intel,
    Arm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BitWidth {
    #[serde(rename = "32")]
    B32,
    #[serde(rename = "64")]
    B64,
}

impl fmt::Display for BitWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitWidth::B32 => f.write_str("32-bit"),
            BitWidth::B64 => f.write_str("64-bit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    X86,
    Arm,
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 4] = [Arch::Amd64, Arch::X86, Arch::Arm, Arch::Arm64];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::X86 => "386",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
        }
    }

    pub const fn family(&self) -> CpuFamily {
        match self {
            Arch::Amd64 | Arch::X86 => CpuFamily::Intel,
            Arch::Arm | Arch::Arm64 => CpuFamily::Arm,
        }
    }

    pub const fn bits(&self) -> BitWidth {
        match self {
            Arch::Amd64 | Arch::Arm64 => BitWidth::B64,
            Arch::X86 | Arch::Arm => BitWidth::B32,
        }
    }

    /// Inverse of [`Arch::family`] + [`Arch::bits`]. An ungated `on_arm` block
    /// means 64-bit ARM, and an ungated `on_intel` block means x86_64.
    pub const fn from_family(family: CpuFamily, bits: Option<BitWidth>) -> Self {
        match (family, bits) {
            (CpuFamily::Intel, Some(BitWidth::B32)) => Arch::X86,
            (CpuFamily::Intel, _) => Arch::Amd64,
            (CpuFamily::Arm, Some(BitWidth::B32)) => Arch::Arm,
            (CpuFamily::Arm, _) => Arch::Arm64,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "amd64" | "x86_64" | "x64" => Ok(Arch::Amd64),
            "386" | "x86" | "i386" | "i686" => Ok(Arch::X86),
            "arm" | "armv6" | "armv7" | "armhf" => Ok(Arch::Arm),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            other => Err(anyhow!(
                "Unknown architecture '{}'. Expected one of: amd64, 386, arm, arm64",
                other
            )),
        }
    }
}

/// A machine to install on, e.g. `linux-arm64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    pub fn bits(&self) -> BitWidth {
        self.arch.bits()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (os, arch) = s
            .split_once(['-', '/'])
            .ok_or_else(|| anyhow!("Invalid platform '{}'. Expected <os>-<arch>, e.g. linux-arm64", s))?;
        Ok(Self {
            os: os.parse()?,
            arch: arch.parse()?,
        })
    }
}
