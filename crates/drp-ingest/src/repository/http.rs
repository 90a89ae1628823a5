//! HTTP content store client
//!
//! Talks to the repository's REST API. Writes issued under a transaction
//! carry the transaction id in the `Atomic-ID` header; the server scopes
//! their visibility and rollback to that transaction.

use super::{endpoints, BinaryRef, BinarySpec, ContentStoreClient, ObjectSpec, TxId};
use crate::error::RepositoryError;
use crate::premis::ProvenanceEvent;
use async_trait::async_trait;
use drp_common::types::Pid;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

// ============================================================================
// Content Store Client Constants
// ============================================================================

/// Default timeout for content-store requests in seconds.
/// Can be overridden via DRP_REPOSITORY_TIMEOUT_SECS environment variable.
pub const DEFAULT_REPOSITORY_TIMEOUT_SECS: u64 = 300;

/// Default content store URL when not specified via environment variable.
pub const DEFAULT_REPOSITORY_URL: &str = "http://localhost:8080";

/// Header carrying the transaction a write belongs to.
pub const TX_HEADER: &str = "Atomic-ID";

#[derive(Debug, Deserialize)]
struct TxResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    pid: Pid,
}

/// Content store client over the repository REST API
pub struct HttpContentStore {
    client: Client,
    base_url: String,
}

impl HttpContentStore {
    /// Create a new client
    pub fn new(base_url: String) -> Result<Self, RepositoryError> {
        let timeout_secs = std::env::var("DRP_REPOSITORY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_REPOSITORY_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self, RepositoryError> {
        let base_url = std::env::var("DRP_REPOSITORY_URL")
            .unwrap_or_else(|_| DEFAULT_REPOSITORY_URL.to_string());

        Self::new(base_url)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn in_tx(&self, request: RequestBuilder, tx: Option<&TxId>) -> RequestBuilder {
        match tx {
            Some(tx) => request.header(TX_HEADER, tx.as_str()),
            None => request,
        }
    }
}

/// Fold a non-success response into a rejection carrying status and body.
async fn rejected(response: Response) -> RepositoryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    RepositoryError::Rejected(format!("{}: {}", status, body))
}

#[async_trait]
impl ContentStoreClient for HttpContentStore {
    async fn begin_transaction(&self) -> Result<TxId, RepositoryError> {
        let url = endpoints::transactions_url(&self.base_url);

        let response = self.client.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let tx: TxResponse = response.json().await?;
        Ok(TxId::new(tx.id))
    }

    async fn cancel_transaction(&self, tx: &TxId, cause: &str) -> Result<(), RepositoryError> {
        let url = endpoints::transaction_url(&self.base_url, tx.as_str());

        let response = self
            .client
            .delete(&url)
            .query(&[("cause", cause)])
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(RepositoryError::UnknownTransaction(tx.to_string()))
            }
            _ => Err(rejected(response).await),
        }
    }

    async fn create_object(
        &self,
        tx: Option<&TxId>,
        spec: &ObjectSpec,
    ) -> Result<Pid, RepositoryError> {
        let url = endpoints::objects_url(&self.base_url);

        let response = self
            .in_tx(self.client.post(&url), tx)
            .json(spec)
            .send()
            .await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let created: CreateResponse = response.json().await?;
                Ok(created.pid)
            }
            StatusCode::NOT_FOUND => Err(RepositoryError::NotFound(spec.parent)),
            _ => Err(rejected(response).await),
        }
    }

    async fn add_binary(
        &self,
        tx: Option<&TxId>,
        spec: &BinarySpec,
    ) -> Result<BinaryRef, RepositoryError> {
        let url = endpoints::binaries_url(&self.base_url, &spec.parent);

        let response = self
            .in_tx(self.client.post(&url), tx)
            .json(spec)
            .send()
            .await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(RepositoryError::NotFound(spec.parent)),
            _ => Err(rejected(response).await),
        }
    }

    async fn set_primary_object(
        &self,
        tx: Option<&TxId>,
        work: &Pid,
        file: &Pid,
    ) -> Result<(), RepositoryError> {
        let url = endpoints::primary_object_url(&self.base_url, work);

        let response = self
            .in_tx(self.client.put(&url), tx)
            .json(&serde_json::json!({ "file": file }))
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RepositoryError::NotFound(*work)),
            _ => Err(rejected(response).await),
        }
    }

    async fn add_provenance_event(
        &self,
        tx: Option<&TxId>,
        event: &ProvenanceEvent,
    ) -> Result<(), RepositoryError> {
        let url = endpoints::events_url(&self.base_url, &event.object);

        let response = self
            .in_tx(self.client.post(&url), tx)
            .json(event)
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RepositoryError::NotFound(event.object)),
            _ => Err(rejected(response).await),
        }
    }

    async fn object_exists(&self, pid: &Pid) -> Result<bool, RepositoryError> {
        let url = endpoints::object_url(&self.base_url, pid);

        let response = self.client.head(&url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(rejected(response).await),
        }
    }
}
