// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dump-blob checksums, carried in the job row as `algo:hex`.
//!
//! The algorithm travels with the value so the restore side verifies with
//! whatever the dump side was configured to use.

use sha2::digest::DynDigest;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("unknown checksum algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("malformed checksum (expected algo:hex): {0}")]
    Malformed(String),
    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    Mismatch { expected: String, computed: String },
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgo {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumAlgo {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgo::Md5 => "md5",
            ChecksumAlgo::Sha1 => "sha1",
            ChecksumAlgo::Sha224 => "sha224",
            ChecksumAlgo::Sha256 => "sha256",
            ChecksumAlgo::Sha384 => "sha384",
            ChecksumAlgo::Sha512 => "sha512",
        }
    }

    fn hasher(&self) -> Box<dyn DynDigest> {
        match self {
            ChecksumAlgo::Md5 => Box::new(md5::Md5::default()),
            ChecksumAlgo::Sha1 => Box::new(sha1::Sha1::default()),
            ChecksumAlgo::Sha224 => Box::new(sha2::Sha224::default()),
            ChecksumAlgo::Sha256 => Box::new(sha2::Sha256::default()),
            ChecksumAlgo::Sha384 => Box::new(sha2::Sha384::default()),
            ChecksumAlgo::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }
}

impl fmt::Display for ChecksumAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgo {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgo::Md5),
            "sha1" => Ok(ChecksumAlgo::Sha1),
            "sha224" => Ok(ChecksumAlgo::Sha224),
            "sha256" => Ok(ChecksumAlgo::Sha256),
            "sha384" => Ok(ChecksumAlgo::Sha384),
            "sha512" => Ok(ChecksumAlgo::Sha512),
            other => Err(ChecksumError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// An `algo:hex` checksum value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algo: ChecksumAlgo,
    pub hex: String,
}

impl Checksum {
    /// Parse the stored `algo:hex` form.
    pub fn parse(s: &str) -> Result<Self, ChecksumError> {
        let (algo, hex) = s
            .split_once(':')
            .ok_or_else(|| ChecksumError::Malformed(s.to_string()))?;
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChecksumError::Malformed(s.to_string()));
        }
        Ok(Self {
            algo: algo.parse()?,
            hex: hex.to_ascii_lowercase(),
        })
    }

    /// Digest a file in streaming fashion.
    ///
    /// Synchronous; async callers run it under `spawn_blocking`.
    pub fn file(algo: ChecksumAlgo, path: &Path) -> Result<Self, ChecksumError> {
        let io_err = |source| ChecksumError::Io {
            path: path.display().to_string(),
            source,
        };
        let mut file = File::open(path).map_err(io_err)?;
        let mut hasher = algo.hasher();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).map_err(io_err)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self {
            algo,
            hex: hex::encode(hasher.finalize()),
        })
    }

    /// Recompute over `path` with this value's algorithm and compare.
    pub fn verify_file(&self, path: &Path) -> Result<(), ChecksumError> {
        let computed = Self::file(self.algo, path)?;
        if computed.hex != self.hex {
            return Err(ChecksumError::Mismatch {
                expected: self.to_string(),
                computed: computed.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algo, self.hex)
    }
}

#[cfg(test)]
#[path = "checksum_tests.rs"]
mod tests;
