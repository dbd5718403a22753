use crate::core::ServiceCatalog;
use crate::models::{Candidate, CandidateFilter, Connection, ConnectionRequest, Coordinates};
use crate::services::backend::{Backend, BackendError, RemovalOutcome, RequestOutcome};
use crate::session::DiscoverySession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Backend decorator that remembers professional coordinates
///
/// Coordinates are the only detail the discovery core fetches lazily, and
/// they change rarely, so repeated refreshes reuse the cached value.
pub struct CachedBackend<B> {
    inner: B,
    coordinates: moka::future::Cache<String, Coordinates>,
}

impl<B: Backend> CachedBackend<B> {
    pub fn new(inner: B, capacity: u64, ttl_secs: u64) -> Self {
        let coordinates = moka::future::CacheBuilder::new(capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, coordinates }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.coordinates.entry_count(),
        }
    }
}

#[async_trait]
impl<B: Backend> Backend for CachedBackend<B> {
    async fn fetch_candidates(&self, filter: &CandidateFilter) -> Result<Vec<Candidate>, BackendError> {
        let mut candidates = self.inner.fetch_candidates(filter).await?;
        for candidate in candidates.iter_mut().filter(|c| c.coordinates.is_none()) {
            candidate.coordinates = self.coordinates.get(&candidate.id).await;
        }
        Ok(candidates)
    }

    async fn fetch_pending_requests(&self, viewer_id: &str) -> Result<Vec<ConnectionRequest>, BackendError> {
        self.inner.fetch_pending_requests(viewer_id).await
    }

    async fn fetch_connections(&self, viewer_id: &str) -> Result<Vec<Connection>, BackendError> {
        self.inner.fetch_connections(viewer_id).await
    }

    async fn create_connection_request(
        &self,
        viewer_id: &str,
        professional_id: &str,
    ) -> Result<RequestOutcome, BackendError> {
        self.inner.create_connection_request(viewer_id, professional_id).await
    }

    async fn cancel_connection_request(
        &self,
        viewer_id: &str,
        professional_id: &str,
    ) -> Result<RemovalOutcome, BackendError> {
        self.inner.cancel_connection_request(viewer_id, professional_id).await
    }

    async fn remove_connection(&self, connection_id: &str) -> Result<RemovalOutcome, BackendError> {
        self.inner.remove_connection(connection_id).await
    }

    async fn fetch_candidate_detail(&self, id: &str) -> Result<Candidate, BackendError> {
        let candidate = self.inner.fetch_candidate_detail(id).await?;
        if let Some(coordinates) = candidate.coordinates {
            self.coordinates.insert(id.to_string(), coordinates).await;
            tracing::trace!("Cached coordinates for {}", id);
        }
        Ok(candidate)
    }
}

pub type SharedSession = Arc<Mutex<DiscoverySession>>;

/// Per-viewer discovery sessions, evicted after a period of inactivity
pub struct SessionStore {
    sessions: moka::future::Cache<String, SharedSession>,
    catalog: Arc<ServiceCatalog>,
    location_ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(
        catalog: Arc<ServiceCatalog>,
        max_sessions: u64,
        idle_secs: u64,
        location_ttl: chrono::Duration,
    ) -> Self {
        let sessions = moka::future::CacheBuilder::new(max_sessions)
            .time_to_idle(Duration::from_secs(idle_secs))
            .build();

        Self {
            sessions,
            catalog,
            location_ttl,
        }
    }

    /// Session for a viewer, created on first use
    pub async fn session(&self, viewer_id: &str) -> SharedSession {
        let catalog = self.catalog.clone();
        let location_ttl = self.location_ttl;
        self.sessions
            .get_with(viewer_id.to_string(), async move {
                tracing::debug!("Creating discovery session");
                Arc::new(Mutex::new(DiscoverySession::new(catalog, location_ttl)))
            })
            .await
    }

    pub async fn existing(&self, viewer_id: &str) -> Option<SharedSession> {
        self.sessions.get(viewer_id).await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.sessions.entry_count(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_store_reuses_sessions() {
        let store = SessionStore::new(
            Arc::new(ServiceCatalog::builtin()),
            100,
            60,
            chrono::Duration::minutes(5),
        );

        let a = store.session("viewer-1").await;
        let b = store.session("viewer-1").await;
        assert!(Arc::ptr_eq(&a, &b));

        assert!(store.existing("viewer-2").await.is_none());
    }
}
