//! Homebrew Ruby form of a [`Formula`].
//!
//! Only the subset a binary-release formula uses is understood: metadata
//! stanzas, `on_macos`/`on_linux`, `on_intel`/`on_arm`, the
//! `Hardware::CPU.is_64_bit?` gate, `url`/`sha256` pairs and
//! `bin.install`. Other `do` blocks (e.g. `test do`) are skipped.

use anyhow::{Result, anyhow};
use log::debug;
use std::fmt::{self, Write};

use super::{Formula, ReleaseTarget};
use crate::checksum::Sha256Digest;
use crate::platform::{Arch, BitWidth, CpuFamily, Os};

const GENERATED_BY: &str = "# This file was generated by alpacon-dist. DO NOT EDIT.";

/// Renders the formula in the same layout as the published tap file.
pub fn render(formula: &Formula) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "# typed: false")?;
    writeln!(out, "# frozen_string_literal: true")?;
    writeln!(out)?;
    writeln!(out, "{}", GENERATED_BY)?;
    writeln!(out, "class {} < Formula", formula.class_name())?;
    writeln!(out, "  desc {}", quote(&formula.desc))?;
    writeln!(out, "  homepage {}", quote(&formula.homepage))?;
    writeln!(out, "  version {}", quote(&formula.version))?;
    if let Some(license) = &formula.license {
        writeln!(out, "  license {}", quote(license))?;
    }

    for os in [Os::Darwin, Os::Linux, Os::Windows] {
        let targets: Vec<&ReleaseTarget> = formula.targets.iter().filter(|t| t.os == os).collect();
        if targets.is_empty() {
            continue;
        }
        let block = match os {
            Os::Darwin => "on_macos",
            Os::Linux => "on_linux",
            Os::Windows => {
                return Err(anyhow!(
                    "Homebrew formulae cannot describe Windows targets ({})",
                    targets[0].key()
                ));
            }
        };
        writeln!(out)?;
        writeln!(out, "  {} do", block)?;
        for target in targets {
            render_target(&mut out, target, &formula.binary)?;
        }
        writeln!(out, "  end")?;
    }
    writeln!(out, "end")?;
    Ok(out)
}

fn render_target(out: &mut String, target: &ReleaseTarget, binary: &str) -> fmt::Result {
    let family = match target.arch.family() {
        CpuFamily::Intel => "on_intel",
        CpuFamily::Arm => "on_arm",
    };
    writeln!(out, "    {} do", family)?;

    let indent = match target.bits {
        Some(bits) => {
            let negate = if bits == BitWidth::B64 { "" } else { "!" };
            writeln!(out, "      if {}Hardware::CPU.is_64_bit?", negate)?;
            "        "
        }
        None => "      ",
    };
    writeln!(out, "{}url {}", indent, quote(&target.url))?;
    writeln!(out, "{}sha256 \"{}\"", indent, target.sha256)?;
    writeln!(out)?;
    writeln!(out, "{}def install", indent)?;
    writeln!(out, "{}  bin.install {}", indent, quote(binary))?;
    writeln!(out, "{}end", indent)?;

    if target.bits.is_some() {
        writeln!(out, "      end")?;
    }
    writeln!(out, "    end")
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A syntax or structure error in a Ruby formula.
#[derive(Debug, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
enum Frame {
    Class,
    Os(Os),
    Family(CpuFamily),
    Gate(BitWidth),
    Install,
    Other,
}

#[derive(Debug)]
struct PendingTarget {
    depth: usize,
    line: usize,
    url: Option<String>,
    sha256: Option<Sha256Digest>,
}

#[derive(Default)]
struct Parser {
    stack: Vec<Frame>,
    class_name: Option<String>,
    desc: Option<String>,
    homepage: Option<String>,
    version: Option<String>,
    license: Option<String>,
    binary: Option<String>,
    pending: Option<PendingTarget>,
    targets: Vec<ReleaseTarget>,
}

/// Parses the Ruby form produced by [`render`] (and by GoReleaser).
pub fn parse(text: &str) -> Result<Formula> {
    let mut parser = Parser::default();
    for (index, raw) in text.lines().enumerate() {
        parser
            .line(index + 1, raw.trim())
            .map_err(|message| ParseError {
                line: index + 1,
                message,
            })?;
    }
    parser.finish(text.lines().count())
}

impl Parser {
    fn in_other(&self) -> bool {
        self.stack.iter().any(|f| matches!(f, Frame::Other))
    }

    fn line(&mut self, line_no: usize, line: &str) -> std::result::Result<(), String> {
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        if line == "end" {
            return self.close(line_no);
        }

        if self.in_other() {
            // Only track nesting inside blocks we do not interpret
            if opens_block(line) {
                self.stack.push(Frame::Other);
            }
            return Ok(());
        }

        if let Some(rest) = line.strip_prefix("class ") {
            let (name, parent) = rest
                .split_once('<')
                .ok_or_else(|| format!("expected 'class Name < Formula', got '{}'", line))?;
            if parent.trim() != "Formula" {
                return Err(format!("class must inherit from Formula, got '{}'", parent.trim()));
            }
            self.class_name = Some(name.trim().to_string());
            self.stack.push(Frame::Class);
            return Ok(());
        }

        if self.stack.is_empty() {
            return Err(format!("unexpected statement outside of class: '{}'", line));
        }

        match line {
            "on_macos do" => self.stack.push(Frame::Os(Os::Darwin)),
            "on_linux do" => self.stack.push(Frame::Os(Os::Linux)),
            "on_intel do" => self.stack.push(Frame::Family(CpuFamily::Intel)),
            "on_arm do" => self.stack.push(Frame::Family(CpuFamily::Arm)),
            "if Hardware::CPU.is_64_bit?" => self.stack.push(Frame::Gate(BitWidth::B64)),
            "if !Hardware::CPU.is_64_bit?" => self.stack.push(Frame::Gate(BitWidth::B32)),
            "def install" => self.stack.push(Frame::Install),
            _ => return self.statement(line_no, line),
        }
        Ok(())
    }

    fn statement(&mut self, line_no: usize, line: &str) -> std::result::Result<(), String> {
        let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match keyword {
            "desc" => self.desc = Some(unquote(rest)?),
            "homepage" => self.homepage = Some(unquote(rest)?),
            "version" => self.version = Some(unquote(rest)?),
            "license" => self.license = Some(unquote(rest)?),
            "bin.install" => {
                if !matches!(self.stack.last(), Some(Frame::Install)) {
                    return Err("bin.install outside of 'def install'".to_string());
                }
                let binary = unquote(rest)?;
                match &self.binary {
                    Some(existing) if existing != &binary => {
                        return Err(format!(
                            "conflicting install names '{}' and '{}'",
                            existing, binary
                        ));
                    }
                    _ => self.binary = Some(binary),
                }
            }
            "url" | "sha256" => {
                let depth = self.stack.len();
                let pending = self.pending.get_or_insert(PendingTarget {
                    depth,
                    line: line_no,
                    url: None,
                    sha256: None,
                });
                if pending.depth != depth {
                    return Err(format!(
                        "'{}' is not in the same block as the preceding url/sha256 (line {})",
                        keyword, pending.line
                    ));
                }
                let value = unquote(rest)?;
                if keyword == "url" {
                    if pending.url.replace(value).is_some() {
                        return Err("duplicate url in block".to_string());
                    }
                } else {
                    let digest = value.parse::<Sha256Digest>().map_err(|e| e.to_string())?;
                    if pending.sha256.replace(digest).is_some() {
                        return Err("duplicate sha256 in block".to_string());
                    }
                }
            }
            _ if opens_block(line) => {
                debug!("Skipping unsupported block at line {}: {}", line_no, line);
                self.stack.push(Frame::Other);
            }
            _ => debug!("Ignoring unsupported statement at line {}: {}", line_no, line),
        }
        Ok(())
    }

    fn close(&mut self, line_no: usize) -> std::result::Result<(), String> {
        let depth = self.stack.len();
        if depth == 0 {
            return Err("unexpected 'end'".to_string());
        }
        if self.pending.as_ref().is_some_and(|p| p.depth == depth) {
            self.finish_target(line_no)?;
        }
        self.stack.pop();
        Ok(())
    }

    fn finish_target(&mut self, line_no: usize) -> std::result::Result<(), String> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let url = pending
            .url
            .ok_or_else(|| format!("sha256 without url (block ending at line {})", line_no))?;
        let sha256 = pending
            .sha256
            .ok_or_else(|| format!("url without sha256 (block ending at line {})", line_no))?;

        let mut os = None;
        let mut family = None;
        let mut bits = None;
        for frame in &self.stack {
            match frame {
                Frame::Os(o) => os = Some(*o),
                Frame::Family(f) => family = Some(*f),
                Frame::Gate(b) => bits = Some(*b),
                _ => {}
            }
        }
        let os = os.ok_or_else(|| format!("url {} is not inside on_macos/on_linux", url))?;
        let family = family.ok_or_else(|| format!("url {} is not inside on_intel/on_arm", url))?;

        self.targets.push(ReleaseTarget {
            os,
            arch: Arch::from_family(family, bits),
            bits,
            url,
            sha256,
        });
        Ok(())
    }

    fn finish(self, last_line: usize) -> Result<Formula> {
        let fail = |message: &str| -> anyhow::Error {
            ParseError {
                line: last_line,
                message: message.to_string(),
            }
            .into()
        };
        if !self.stack.is_empty() {
            return Err(fail("unexpected end of file: missing 'end'"));
        }
        let class_name = self.class_name.ok_or_else(|| fail("no formula class found"))?;
        Ok(Formula {
            name: Formula::name_from_class(&class_name),
            desc: self.desc.unwrap_or_default(),
            homepage: self.homepage.ok_or_else(|| fail("missing homepage"))?,
            version: self.version.ok_or_else(|| fail("missing version"))?,
            license: self.license,
            binary: self.binary.ok_or_else(|| fail("missing bin.install"))?,
            targets: self.targets,
        })
    }
}

fn opens_block(line: &str) -> bool {
    line.ends_with(" do")
        || line.contains(" do |")
        || line.starts_with("def ")
        || line.starts_with("if ")
        || line.starts_with("unless ")
        || line.starts_with("class ")
        || line.starts_with("module ")
}

fn unquote(value: &str) -> std::result::Result<String, String> {
    let value = value.trim();
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| format!("expected a double-quoted string, got '{}'", value))?;
    Ok(inner.replace("\\\"", "\"").replace("\\\\", "\\"))
}
