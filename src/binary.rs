//! Identifies the OS and CPU architecture an executable was built for.

use anyhow::{Context, Result, anyhow};
use goblin::Object;
use goblin::elf::header::{EM_386, EM_AARCH64, EM_ARM, EM_X86_64};
use goblin::mach::Mach;
use goblin::mach::cputype::{CPU_TYPE_ARM, CPU_TYPE_ARM64, CPU_TYPE_X86, CPU_TYPE_X86_64};
use log::debug;
use goblin::pe::header::{
    COFF_MACHINE_ARM64, COFF_MACHINE_ARMNT, COFF_MACHINE_X86, COFF_MACHINE_X86_64,
};
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::formula::TargetKey;
use crate::platform::{Arch, Os};
use crate::runtime::Runtime;

/// What an executable's headers say about where it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryInfo {
    pub os: Os,
    /// More than one entry for universal (fat) Mach-O binaries.
    pub archs: Vec<Arch>,
}

impl BinaryInfo {
    pub fn supports(&self, key: TargetKey) -> bool {
        self.os == key.os && self.archs.contains(&key.arch)
    }
}

impl fmt::Display for BinaryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let archs: Vec<&str> = self.archs.iter().map(Arch::as_str).collect();
        write!(f, "{}-{}", self.os, archs.join("+"))
    }
}

/// Parses the executable headers in `bytes`.
pub fn inspect(bytes: &[u8]) -> Result<BinaryInfo> {
    match Object::parse(bytes).context("Failed to parse executable header")? {
        Object::Elf(elf) => {
            let arch = match (elf.header.e_machine, elf.is_64) {
                (EM_X86_64, true) => Arch::Amd64,
                (EM_386, false) => Arch::X86,
                (EM_ARM, false) => Arch::Arm,
                (EM_AARCH64, true) => Arch::Arm64,
                (machine, is_64) => {
                    return Err(anyhow!(
                        "Unsupported ELF machine {} ({}-bit)",
                        machine,
                        if is_64 { 64 } else { 32 }
                    ));
                }
            };
            Ok(BinaryInfo {
                os: Os::Linux,
                archs: vec![arch],
            })
        }
        Object::Mach(Mach::Binary(macho)) => Ok(BinaryInfo {
            os: Os::Darwin,
            archs: vec![mach_arch(macho.header.cputype)?],
        }),
        Object::Mach(Mach::Fat(multi)) => {
            let mut archs = Vec::new();
            for fat_arch in multi.iter_arches() {
                let fat_arch = fat_arch.context("Failed to read universal binary slice")?;
                match mach_arch(fat_arch.cputype) {
                    Ok(arch) => archs.push(arch),
                    Err(e) => debug!("Skipping universal binary slice: {}", e),
                }
            }
            if archs.is_empty() {
                return Err(anyhow!("Universal binary has no supported slice"));
            }
            Ok(BinaryInfo {
                os: Os::Darwin,
                archs,
            })
        }
        Object::PE(pe) => {
            let arch = match pe.header.coff_header.machine {
                COFF_MACHINE_X86_64 => Arch::Amd64,
                COFF_MACHINE_X86 => Arch::X86,
                COFF_MACHINE_ARMNT => Arch::Arm,
                COFF_MACHINE_ARM64 => Arch::Arm64,
                machine => return Err(anyhow!("Unsupported PE machine {:#x}", machine)),
            };
            Ok(BinaryInfo {
                os: Os::Windows,
                archs: vec![arch],
            })
        }
        _ => Err(anyhow!("Not a native executable")),
    }
}

fn mach_arch(cputype: u32) -> Result<Arch> {
    match cputype {
        CPU_TYPE_X86_64 => Ok(Arch::Amd64),
        CPU_TYPE_X86 => Ok(Arch::X86),
        CPU_TYPE_ARM => Ok(Arch::Arm),
        CPU_TYPE_ARM64 => Ok(Arch::Arm64),
        other => Err(anyhow!("Unsupported Mach-O CPU type {:#x}", other)),
    }
}

/// Reads `path` through the runtime and inspects it.
pub fn inspect_file<R: Runtime>(runtime: &R, path: &Path) -> Result<BinaryInfo> {
    let mut file = runtime.open(path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)
        .with_context(|| format!("Failed to read {:?}", path))?;
    inspect(&buffer).with_context(|| format!("Cannot identify executable {:?}", path))
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Minimal ELF header with no program or section headers.
    pub fn elf(machine: u16, is_64: bool) -> Vec<u8> {
        let mut b = vec![0x7f, b'E', b'L', b'F', if is_64 { 2 } else { 1 }, 1, 1, 0];
        b.resize(16, 0);
        b.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        b.extend_from_slice(&machine.to_le_bytes());
        b.extend_from_slice(&1u32.to_le_bytes());
        if is_64 {
            b.extend_from_slice(&[0; 24]); // entry, phoff, shoff
            b.extend_from_slice(&0u32.to_le_bytes());
            for v in [64u16, 56, 0, 64, 0, 0] {
                b.extend_from_slice(&v.to_le_bytes());
            }
        } else {
            b.extend_from_slice(&[0; 12]);
            b.extend_from_slice(&0u32.to_le_bytes());
            for v in [52u16, 32, 0, 40, 0, 0] {
                b.extend_from_slice(&v.to_le_bytes());
            }
        }
        b
    }

    /// Minimal 64-bit Mach-O header with no load commands.
    pub fn macho(cputype: u32) -> Vec<u8> {
        let mut b = Vec::new();
        for v in [0xfeed_facfu32, cputype, 0, 2, 0, 0, 0, 0] {
            b.extend_from_slice(&v.to_le_bytes());
        }
        b
    }

    /// Universal binary holding one thin slice per CPU type.
    pub fn fat(cputypes: &[u32]) -> Vec<u8> {
        let slices: Vec<Vec<u8>> = cputypes.iter().map(|&c| macho(c)).collect();
        let mut offset = 8 + 20 * cputypes.len() as u32;
        offset = offset.next_multiple_of(8);

        let mut b = Vec::new();
        b.extend_from_slice(&0xcafe_babeu32.to_be_bytes());
        b.extend_from_slice(&(cputypes.len() as u32).to_be_bytes());
        let mut offsets = Vec::new();
        for (&cputype, slice) in cputypes.iter().zip(&slices) {
            for v in [cputype, 0, offset, slice.len() as u32, 3] {
                b.extend_from_slice(&v.to_be_bytes());
            }
            offsets.push(offset);
            offset += (slice.len() as u32).next_multiple_of(8);
        }
        for (slice, at) in slices.iter().zip(offsets) {
            b.resize(at as usize, 0);
            b.extend_from_slice(slice);
        }
        b
    }
}
