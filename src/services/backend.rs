use crate::models::{Candidate, CandidateFilter, Connection, ConnectionRequest};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when talking to the marketplace backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid API key or token")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Result of asking the backend to create a connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Created,
    AlreadyRequested,
}

/// Result of cancel/remove calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    /// The record was already gone; treated as success by callers
    AlreadyGone,
}

/// Read/write operations the discovery core needs from the backend
///
/// Implementations must be cheap to share; the session and HTTP layer hold
/// them behind `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_candidates(&self, filter: &CandidateFilter) -> Result<Vec<Candidate>, BackendError>;

    async fn fetch_pending_requests(&self, viewer_id: &str) -> Result<Vec<ConnectionRequest>, BackendError>;

    async fn fetch_connections(&self, viewer_id: &str) -> Result<Vec<Connection>, BackendError>;

    async fn create_connection_request(
        &self,
        viewer_id: &str,
        professional_id: &str,
    ) -> Result<RequestOutcome, BackendError>;

    async fn cancel_connection_request(
        &self,
        viewer_id: &str,
        professional_id: &str,
    ) -> Result<RemovalOutcome, BackendError>;

    async fn remove_connection(&self, connection_id: &str) -> Result<RemovalOutcome, BackendError>;

    /// Full record for one professional, used to fill in missing coordinates
    async fn fetch_candidate_detail(&self, id: &str) -> Result<Candidate, BackendError>;
}
