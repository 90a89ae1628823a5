//! Configuration management

use crate::transfer::s3::S3Config;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Ingest Configuration Constants
// ============================================================================

/// Default directory holding persisted deposit graphs.
pub const DEFAULT_GRAPH_DIR: &str = "./data/deposits";

/// Default filesystem root for transferred binaries.
pub const DEFAULT_STORAGE_ROOT: &str = "./data/objects";

/// Default number of immediate retries after a checksum mismatch.
pub const DEFAULT_CHECKSUM_RETRY_LIMIT: u32 = 1;

/// Default principal groups granted administrative access everywhere.
pub const DEFAULT_ADMIN_GROUPS: &str = "repository-admins";

/// How many repository objects share one content-store transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TxGranularity {
    /// One transaction per repository object and its immediate binaries.
    ///
    /// Objects committed before a failure stay durably created while the
    /// object in flight is fully rolled back.
    #[default]
    PerObject,

    /// One transaction spanning the whole deposit.
    ///
    /// A failure anywhere rolls back every write of the run.
    PerDeposit,
}

impl TxGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxGranularity::PerObject => "per-object",
            TxGranularity::PerDeposit => "per-deposit",
        }
    }
}

impl std::str::FromStr for TxGranularity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "per-object" | "object" => Ok(TxGranularity::PerObject),
            "per-deposit" | "deposit" => Ok(TxGranularity::PerDeposit),
            _ => Err(anyhow::anyhow!("Invalid transaction granularity: {}", s)),
        }
    }
}

impl std::fmt::Display for TxGranularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Destination storage for transferred binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local filesystem tree
    Fs { root: PathBuf },
    /// S3-compatible object store
    S3(S3Config),
}

/// Ingest pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory holding persisted deposit graphs
    pub graph_dir: PathBuf,

    /// Destination storage backend for binaries
    pub storage: StorageBackend,

    /// Status store database (memory store is used when unset)
    pub database_url: Option<String>,

    /// Content store base URL (memory store is used when unset)
    pub repository_url: Option<String>,

    /// Immediate retries allowed after a checksum mismatch
    pub checksum_retry_limit: u32,

    /// Transaction scope for content-store writes
    pub tx_granularity: TxGranularity,

    /// Confirm every completed object is visible before reporting success
    pub verify_after_run: bool,

    /// Principal groups with administrative access on every container
    pub admin_groups: Vec<String>,
}

impl IngestConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let storage = match std::env::var("DRP_STORAGE_BACKEND")
            .unwrap_or_else(|_| "fs".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3(S3Config::from_env()?),
            _ => StorageBackend::Fs {
                root: PathBuf::from(
                    std::env::var("DRP_STORAGE_ROOT")
                        .unwrap_or_else(|_| DEFAULT_STORAGE_ROOT.to_string()),
                ),
            },
        };

        let config = IngestConfig {
            graph_dir: PathBuf::from(
                std::env::var("DRP_GRAPH_DIR").unwrap_or_else(|_| DEFAULT_GRAPH_DIR.to_string()),
            ),
            storage,
            database_url: std::env::var("DATABASE_URL").ok(),
            repository_url: std::env::var("DRP_REPOSITORY_URL").ok(),
            checksum_retry_limit: std::env::var("DRP_CHECKSUM_RETRY_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CHECKSUM_RETRY_LIMIT),
            tx_granularity: std::env::var("DRP_TX_GRANULARITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            verify_after_run: std::env::var("DRP_VERIFY_AFTER_RUN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            admin_groups: std::env::var("DRP_ADMIN_GROUPS")
                .unwrap_or_else(|_| DEFAULT_ADMIN_GROUPS.to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.graph_dir.as_os_str().is_empty() {
            anyhow::bail!("Graph directory cannot be empty");
        }

        if let StorageBackend::Fs { root } = &self.storage {
            if root.as_os_str().is_empty() {
                anyhow::bail!("Storage root cannot be empty");
            }
        }

        if self.admin_groups.is_empty() {
            tracing::warn!("No administrator groups configured - only explicit grants will apply");
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            graph_dir: PathBuf::from(DEFAULT_GRAPH_DIR),
            storage: StorageBackend::Fs {
                root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            },
            database_url: None,
            repository_url: None,
            checksum_retry_limit: DEFAULT_CHECKSUM_RETRY_LIMIT,
            tx_granularity: TxGranularity::PerObject,
            verify_after_run: true,
            admin_groups: vec![DEFAULT_ADMIN_GROUPS.to_string()],
        }
    }
}
