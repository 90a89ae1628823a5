//! Common types used across DRP

use crate::error::DrpError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Persistent identifier of a repository object.
///
/// PIDs are minted during staging and remain stable across ingestion
/// attempts, which is what makes resume idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(Uuid);

impl Pid {
    /// Mint a fresh PID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for Pid {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for Pid {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Pid {
    type Err = DrpError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DrpError::InvalidIdentifier(s.to_string()))
    }
}

/// Identifier of a deposit (one staged submission package).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepositId(Uuid);

impl DepositId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DepositId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for DepositId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DepositId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DepositId {
    type Err = DrpError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DrpError::InvalidIdentifier(s.to_string()))
    }
}

/// Identifier of one ingestion job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive the job id from the deposit it ingests.
    ///
    /// A relaunched job for the same deposit gets the same id and therefore
    /// sees the completion marks recorded by its predecessors.
    pub fn for_deposit(deposit: &DepositId) -> Self {
        Self(format!("ingest:{}", deposit))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Digest algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded digest value
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = DrpError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Accept both the bare and the PREMIS-style dashed spellings
        match s.to_lowercase().replace('-', "").as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(DrpError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Declared or computed digests, keyed by algorithm.
///
/// A BTreeMap keeps the key order stable so serialized forms and log output
/// are deterministic.
pub type DigestMap = BTreeMap<DigestAlgorithm, String>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_algorithm_from_str() {
        assert_eq!("md5".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Md5);
        assert_eq!("MD-5".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Md5);
        assert_eq!("sha256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
        assert_eq!("SHA-256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
        assert_eq!("SHA-512".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha512);
        assert!("crc32".parse::<DigestAlgorithm>().is_err());
    }

    #[test]
    fn test_pid_roundtrip() {
        let pid = Pid::new();
        let parsed: Pid = pid.to_string().parse().unwrap();
        assert_eq!(pid, parsed);
    }

    #[test]
    fn test_pid_rejects_garbage() {
        assert!("not-a-pid".parse::<Pid>().is_err());
    }

    #[test]
    fn test_job_id_is_deterministic_per_deposit() {
        let deposit = DepositId::new();
        let a = JobId::for_deposit(&deposit);
        let b = JobId::for_deposit(&deposit);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("ingest:"));

        let other = JobId::for_deposit(&DepositId::new());
        assert_ne!(a, other);
    }
}
