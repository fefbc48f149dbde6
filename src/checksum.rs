//! SHA-256 digests, streaming hashing and `checksums.txt` parsing.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// A SHA-256 digest, kept as raw bytes and shown as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Decodes a hex digest in const context; a malformed literal fails the build.
    pub const fn from_hex(hex: &str) -> Self {
        let bytes = hex.as_bytes();
        assert!(bytes.len() == 64, "SHA-256 digest must be 64 hex characters");
        let mut out = [0u8; 32];
        let mut i = 0;
        while i < 32 {
            out[i] = (hex_value(bytes[2 * i]) << 4) | hex_value(bytes[2 * i + 1]);
            i += 1;
        }
        Self(out)
    }

    /// Digest of an in-memory buffer.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }
}

const fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in SHA-256 digest"),
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256Digest({})", self)
    }
}

impl FromStr for Sha256Digest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 64 {
            return Err(anyhow!(
                "Invalid SHA-256 digest '{}': expected 64 hex characters, got {}",
                s,
                s.len()
            ));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(anyhow!("Invalid SHA-256 digest '{}': non-hex character", s));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .with_context(|| format!("Invalid SHA-256 digest '{}': non-hex character", s))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hashes everything readable from `reader`.
pub fn compute<R: Read>(mut reader: R) -> Result<Sha256Digest> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buffer)
            .context("Failed to read data for checksum")?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(Sha256Digest(hasher.finalize().into()))
}

/// Writer adapter that hashes bytes as they pass through.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Flushes the inner writer and returns the digest of all bytes written.
    pub fn finish(mut self) -> Result<Sha256Digest> {
        self.inner.flush().context("Failed to flush writer")?;
        Ok(Sha256Digest(self.hasher.finalize().into()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Raised when downloaded bytes do not hash to the declared digest.
#[derive(Debug)]
pub struct ChecksumMismatch {
    pub subject: String,
    pub expected: Sha256Digest,
    pub actual: Sha256Digest,
}

impl fmt::Display for ChecksumMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Checksum mismatch for {}: expected {}, got {}",
            self.subject, self.expected, self.actual
        )
    }
}

impl std::error::Error for ChecksumMismatch {}

pub fn verify(subject: &str, expected: &Sha256Digest, actual: &Sha256Digest) -> Result<()> {
    if expected != actual {
        return Err(ChecksumMismatch {
            subject: subject.to_string(),
            expected: *expected,
            actual: *actual,
        }
        .into());
    }
    Ok(())
}

/// File name → digest map in `sha256sum` format, as published next to
/// release archives (`checksums.txt`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChecksumFile {
    entries: BTreeMap<String, Sha256Digest>,
}

impl ChecksumFile {
    pub fn get(&self, file_name: &str) -> Option<&Sha256Digest> {
        self.entries.get(file_name)
    }

    pub fn insert(&mut self, file_name: impl Into<String>, digest: Sha256Digest) {
        self.entries.insert(file_name.into(), digest);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromStr for ChecksumFile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut file = ChecksumFile::default();
        for (index, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (digest, name) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("checksums line {}: expected '<sha256>  <file>'", index + 1))?;
            let digest: Sha256Digest = digest
                .parse()
                .with_context(|| format!("checksums line {}", index + 1))?;
            // `sha256sum -b` marks binary mode with a leading '*'
            let name = name.trim().trim_start_matches('*');
            if name.is_empty() {
                anyhow::bail!("checksums line {}: missing file name", index + 1);
            }
            file.insert(name, digest);
        }
        Ok(file)
    }
}
