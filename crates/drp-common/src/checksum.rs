//! Digest utilities for fixity verification
//!
//! Deposits declare one or more digests per binary. Computation is streaming
//! and single-pass: every requested hasher is fed from the same 8 KiB read
//! loop, so a binary is read exactly once regardless of how many algorithms
//! the depositor supplied.

use crate::error::{DrpError, Result};
use crate::types::{DigestAlgorithm, DigestMap};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

enum DigestState {
    Md5(md5::Context),
    Sha256(Box<Sha256>),
    Sha512(Box<Sha512>),
}

impl DigestState {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => DigestState::Md5(md5::Context::new()),
            DigestAlgorithm::Sha256 => DigestState::Sha256(Box::new(Sha256::new())),
            DigestAlgorithm::Sha512 => DigestState::Sha512(Box::new(Sha512::new())),
        }
    }

    fn algorithm(&self) -> DigestAlgorithm {
        match self {
            DigestState::Md5(_) => DigestAlgorithm::Md5,
            DigestState::Sha256(_) => DigestAlgorithm::Sha256,
            DigestState::Sha512(_) => DigestAlgorithm::Sha512,
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            DigestState::Md5(ctx) => ctx.consume(bytes),
            DigestState::Sha256(hasher) => hasher.update(bytes),
            DigestState::Sha512(hasher) => hasher.update(bytes),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            DigestState::Md5(ctx) => format!("{:x}", ctx.compute()),
            DigestState::Sha256(hasher) => hex::encode(hasher.finalize()),
            DigestState::Sha512(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Incremental digest computation over one or more algorithms.
///
/// Useful when the caller drives the read loop itself (async copies, network
/// streams). Duplicate algorithms are collapsed.
pub struct MultiDigest {
    states: Vec<DigestState>,
}

impl MultiDigest {
    pub fn new(algorithms: &[DigestAlgorithm]) -> Self {
        let unique: BTreeSet<DigestAlgorithm> = algorithms.iter().copied().collect();
        Self {
            states: unique.into_iter().map(DigestState::new).collect(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for state in &mut self.states {
            state.update(bytes);
        }
    }

    pub fn finalize(self) -> DigestMap {
        self.states
            .into_iter()
            .map(|state| {
                let algorithm = state.algorithm();
                (algorithm, state.finalize_hex())
            })
            .collect()
    }
}

/// Compute a single digest for any readable source
pub fn compute_digest<R: Read>(reader: &mut R, algorithm: DigestAlgorithm) -> Result<String> {
    let mut state = DigestState::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        state.update(&buffer[..bytes_read]);
    }

    Ok(state.finalize_hex())
}

/// Compute a single digest for a file
pub fn compute_file_digest(path: impl AsRef<Path>, algorithm: DigestAlgorithm) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_digest(&mut file, algorithm)
}

/// Compute several digests for any readable source in one pass
pub fn compute_digests<R: Read>(
    reader: &mut R,
    algorithms: &[DigestAlgorithm],
) -> Result<DigestMap> {
    let mut multi = MultiDigest::new(algorithms);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        multi.update(&buffer[..bytes_read]);
    }

    Ok(multi.finalize())
}

/// Compute several digests for a file in one pass
pub fn compute_file_digests(
    path: impl AsRef<Path>,
    algorithms: &[DigestAlgorithm],
) -> Result<DigestMap> {
    let mut file = std::fs::File::open(path)?;
    compute_digests(&mut file, algorithms)
}

/// Verify a file against a declared digest value
pub fn verify_file_digest(
    path: impl AsRef<Path>,
    algorithm: DigestAlgorithm,
    expected: &str,
) -> Result<bool> {
    let actual = compute_file_digest(path, algorithm)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(true)
    } else {
        Err(DrpError::ChecksumMismatch {
            algorithm,
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

/// Check that a declared digest value is well-formed for its algorithm
pub fn validate_digest_value(algorithm: DigestAlgorithm, value: &str) -> Result<()> {
    if value.len() != algorithm.hex_len() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DrpError::InvalidDigest {
            algorithm,
            value: value.to_string(),
        });
    }
    Ok(())
}
