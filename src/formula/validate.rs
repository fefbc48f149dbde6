//! Data-integrity checks over a formula's table: support-matrix coverage,
//! unambiguous selection and version consistency of every URL.

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use super::{Formula, TargetKey, url_path_start, version_tokens};
use crate::platform::{Arch, Os, Platform};

/// The set of (OS, arch) pairs a formula is expected to cover exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportMatrix {
    keys: BTreeSet<TargetKey>,
}

impl SupportMatrix {
    pub fn new(keys: impl IntoIterator<Item = TargetKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// darwin-amd64, darwin-arm64, linux-amd64, linux-arm, linux-arm64
    pub fn alpacon() -> Self {
        Self::new([
            TargetKey::new(Os::Darwin, Arch::Amd64),
            TargetKey::new(Os::Darwin, Arch::Arm64),
            TargetKey::new(Os::Linux, Arch::Amd64),
            TargetKey::new(Os::Linux, Arch::Arm),
            TargetKey::new(Os::Linux, Arch::Arm64),
        ])
    }

    pub fn contains(&self, key: &TargetKey) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetKey> {
        self.keys.iter()
    }
}

impl FromStr for SupportMatrix {
    type Err = anyhow::Error;

    /// Comma-separated keys, e.g. `linux-amd64,darwin-arm64`.
    fn from_str(s: &str) -> Result<Self> {
        let keys = s
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<TargetKey>>>()?;
        if keys.is_empty() {
            anyhow::bail!("Support matrix must name at least one target");
        }
        Ok(Self::new(keys))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    EmptyField(&'static str),
    DuplicateTarget(TargetKey),
    MissingTarget(TargetKey),
    UnexpectedTarget(TargetKey),
    AmbiguousGate {
        platform: Platform,
        candidates: Vec<TargetKey>,
    },
    InvalidUrl {
        key: TargetKey,
        reason: String,
    },
    StaleVersion {
        key: TargetKey,
        url: String,
    },
    ArchiveNameMismatch {
        key: TargetKey,
        expected: String,
        actual: String,
    },
    SharedChecksum(TargetKey, TargetKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.severity)?;
        match &self.kind {
            IssueKind::EmptyField(field) => write!(f, "formula field '{}' is empty", field),
            IssueKind::DuplicateTarget(key) => write!(f, "{} is declared more than once", key),
            IssueKind::MissingTarget(key) => write!(f, "{} is missing", key),
            IssueKind::UnexpectedTarget(key) => {
                write!(f, "{} is not part of the support matrix", key)
            }
            IssueKind::AmbiguousGate {
                platform,
                candidates,
            } => {
                let names: Vec<String> = candidates.iter().map(ToString::to_string).collect();
                write!(f, "{} would match several targets: {}", platform, names.join(", "))
            }
            IssueKind::InvalidUrl { key, reason } => write!(f, "{} has an invalid url: {}", key, reason),
            IssueKind::StaleVersion { key, url } => {
                write!(f, "{} url does not mention the formula version: {}", key, url)
            }
            IssueKind::ArchiveNameMismatch {
                key,
                expected,
                actual,
            } => write!(f, "{} archive is named '{}', expected '{}'", key, actual, expected),
            IssueKind::SharedChecksum(a, b) => write!(f, "{} and {} declare the same sha256", a, b),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    pub issues: Vec<Issue>,
}

impl Report {
    fn push(&mut self, severity: Severity, kind: IssueKind) {
        self.issues.push(Issue { severity, kind });
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }
}

#[tracing::instrument(skip(formula, matrix))]
pub fn validate(formula: &Formula, matrix: &SupportMatrix) -> Report {
    let mut report = Report::default();

    for (field, value) in [
        ("name", &formula.name),
        ("homepage", &formula.homepage),
        ("version", &formula.version),
        ("binary", &formula.binary),
    ] {
        if value.trim().is_empty() {
            report.push(Severity::Error, IssueKind::EmptyField(field));
        }
    }

    let mut counts: HashMap<TargetKey, usize> = HashMap::new();
    for target in &formula.targets {
        *counts.entry(target.key()).or_default() += 1;
    }
    let mut declared: Vec<TargetKey> = counts.keys().copied().collect();
    declared.sort();
    for key in &declared {
        if counts[key] > 1 {
            report.push(Severity::Error, IssueKind::DuplicateTarget(*key));
        }
        if !matrix.contains(key) {
            report.push(Severity::Warning, IssueKind::UnexpectedTarget(*key));
        }
    }
    for key in matrix.iter() {
        if !counts.contains_key(key) {
            report.push(Severity::Error, IssueKind::MissingTarget(*key));
        }
    }

    let platforms = Os::ALL
        .into_iter()
        .flat_map(|os| Arch::ALL.into_iter().map(move |arch| Platform::new(os, arch)));
    for platform in platforms {
        let mut candidates: Vec<TargetKey> = formula
            .targets
            .iter()
            .filter(|t| t.matches(&platform))
            .map(|t| t.key())
            .collect();
        candidates.sort();
        candidates.dedup();
        if candidates.len() > 1 {
            report.push(
                Severity::Error,
                IssueKind::AmbiguousGate {
                    platform,
                    candidates,
                },
            );
        }
    }

    for target in &formula.targets {
        let key = target.key();
        match reqwest::Url::parse(&target.url) {
            Ok(url) if matches!(url.scheme(), "https" | "http") => {}
            Ok(url) => {
                report.push(
                    Severity::Error,
                    IssueKind::InvalidUrl {
                        key,
                        reason: format!("unsupported scheme '{}'", url.scheme()),
                    },
                );
                continue;
            }
            Err(e) => {
                report.push(
                    Severity::Error,
                    IssueKind::InvalidUrl {
                        key,
                        reason: e.to_string(),
                    },
                );
                continue;
            }
        }

        let path = &target.url[url_path_start(&target.url)..];
        if !formula.version.is_empty() && version_tokens(path, &formula.version).is_empty() {
            report.push(
                Severity::Error,
                IssueKind::StaleVersion {
                    key,
                    url: target.url.clone(),
                },
            );
        }

        let expected = formula.archive_name(key);
        let actual = target.file_name().unwrap_or_default();
        if actual != expected {
            report.push(
                Severity::Warning,
                IssueKind::ArchiveNameMismatch {
                    key,
                    expected,
                    actual: actual.to_string(),
                },
            );
        }
    }

    for (i, a) in formula.targets.iter().enumerate() {
        for b in &formula.targets[i + 1..] {
            if a.sha256 == b.sha256 && a.key() != b.key() {
                report.push(Severity::Warning, IssueKind::SharedChecksum(a.key(), b.key()));
            }
        }
    }

    report
}
