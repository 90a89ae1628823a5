//! DRP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the DRP project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all DRP workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Digests**: Fixity computation and verification utilities
//! - **Types**: Shared identifier and domain types
//! - **Logging**: Centralized tracing initialization
//!
//! # Example
//!
//! ```no_run
//! use drp_common::{Result, DrpError};
//! use drp_common::checksum::compute_file_digest;
//! use drp_common::types::DigestAlgorithm;
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let digest = compute_file_digest(path, DigestAlgorithm::Sha256)?;
//!     println!("File digest: {}", digest);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{DrpError, Result};
