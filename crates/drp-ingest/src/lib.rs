//! DRP Ingest Library
//!
//! Resumable ingestion of staged deposits into a transactional content store.
//!
//! # Pipeline
//!
//! A deposit arrives as a typed object graph plus staged binaries. The
//! content ingestor walks the graph depth-first, parent before children,
//! creating each repository object inside a content-store transaction,
//! transferring binaries with fixity verification, stamping access grants,
//! and writing provenance events. Every completed object is recorded in the
//! status store, so a re-invoked job resumes where the previous one stopped
//! instead of duplicating work.
//!
//! # Modules
//!
//! - [`graph`]: staged deposit graphs and their persistence
//! - [`status`]: deposit/job progress records (memory and Postgres backends)
//! - [`repository`]: content store client (memory and HTTP backends)
//! - [`tx`]: transaction bracketing over the content store
//! - [`transfer`]: checksum-verified binary transfer into fs or S3 storage
//! - [`acl`]: access grants and permission checks
//! - [`premis`]: provenance event construction
//! - [`ingestor`]: the resumable depth-first ingestion job

pub mod acl;
pub mod config;
pub mod error;
pub mod graph;
pub mod ingestor;
pub mod premis;
pub mod repository;
pub mod status;
pub mod transfer;
pub mod tx;

pub use error::{IngestError, InterruptCause};
pub use ingestor::{ContentIngestor, IngestSummary};
