//! Discovery session: the event-driven controller behind the professional
//! list.
//!
//! A session owns the viewer identity, the search query, the origin and the
//! latest candidate set, plus the relationship book derived from the two
//! connection collections. Refreshes are split into three steps so that
//! fetching can run without holding the session:
//!
//! 1. [`DiscoverySession::begin_refresh`] issues a ticket for the current
//!    viewer and bumps the refresh generation
//! 2. [`DiscoverySession::fetch_snapshot`] fetches all three collections
//! 3. [`DiscoverySession::commit_refresh`] applies the snapshot only if the
//!    ticket is still the latest one and the viewer has not changed
//!
//! Connection actions follow the same shape: `begin_action`, the backend
//! call in [`perform_action`], then `finish_action`.

use crate::core::{
    ConnectionAction, GeoRanker, LocalityTier, MatchResult, NormalizedService, PendingTransition,
    Reconciliation, RelationshipBook, RelationshipState, ServiceCatalog, ServiceMatcher,
    TransitionError, VerificationResolver, VerificationState,
};
use crate::models::{dedup_candidates, Candidate, CandidateFilter, Connection, ConnectionRequest, Coordinates, Viewer};
use crate::services::backend::{Backend, BackendError};
use crate::services::location::{LocationCache, LocationFix};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Detail fetches kept in flight at once while enriching coordinates
const DETAIL_FETCH_CONCURRENCY: usize = 8;

/// Errors surfaced to the caller of a session operation
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No viewer is signed in")]
    NoViewer,

    #[error("Unable to refresh: {0}")]
    RefreshFailed(#[source] BackendError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{action:?} for {professional_id} failed: {source}")]
    ActionFailed {
        professional_id: String,
        action: ConnectionAction,
        #[source]
        source: BackendError,
    },

    #[error("Not connected to {0}")]
    NotConnected(String),
}

/// Why a refresh was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefreshTrigger {
    ViewerIdentified,
    CandidatesChanged,
    OriginChanged,
    Foregrounded,
    UserRequested,
}

/// Permission to commit one refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
    stamp: u64,
    viewer_id: String,
    filter: CandidateFilter,
    pub trigger: RefreshTrigger,
}

impl RefreshTicket {
    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn filter(&self) -> &CandidateFilter {
        &self.filter
    }
}

/// A complete set of fetched collections
#[derive(Debug, Clone)]
pub struct DiscoverySnapshot {
    pub candidates: Vec<Candidate>,
    pub pending_requests: Vec<ConnectionRequest>,
    pub connections: Vec<Connection>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A newer refresh was started after this one
    Superseded,
    /// The viewer changed or signed out while fetching
    ViewerChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    Discarded(DiscardReason),
}

/// One row of the professional list
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryEntry {
    #[serde(flatten)]
    pub candidate: Candidate,
    #[serde(rename = "distanceKm")]
    pub distance_km: Option<f64>,
    #[serde(rename = "distanceLabel")]
    pub distance_label: String,
    pub tier: LocalityTier,
    pub verification: VerificationState,
    pub relationship: RelationshipState,
    pub actions: Vec<ConnectionAction>,
    #[serde(rename = "actionInFlight")]
    pub action_in_flight: bool,
}

pub struct DiscoverySession {
    matcher: ServiceMatcher,
    ranker: GeoRanker,
    resolver: VerificationResolver,
    viewer: Option<Viewer>,
    query: String,
    filter: CandidateFilter,
    origin: LocationFix,
    location: LocationCache,
    candidates: Vec<Candidate>,
    book: RelationshipBook,
    generation: u64,
    refreshed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl DiscoverySession {
    pub fn new(catalog: Arc<ServiceCatalog>, location_ttl: chrono::Duration) -> Self {
        Self {
            matcher: ServiceMatcher::new(catalog),
            ranker: GeoRanker::new(),
            resolver: VerificationResolver,
            viewer: None,
            query: String::new(),
            filter: CandidateFilter::default(),
            origin: LocationFix::Unavailable,
            location: LocationCache::new(location_ttl),
            candidates: Vec::new(),
            book: RelationshipBook::new(),
            generation: 0,
            refreshed_at: None,
            last_error: None,
        }
    }

    pub fn viewer(&self) -> Option<&Viewer> {
        self.viewer.as_ref()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn filter(&self) -> &CandidateFilter {
        &self.filter
    }

    pub fn origin(&self) -> LocationFix {
        self.origin
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn relationships(&self) -> &RelationshipBook {
        &self.book
    }

    /// Number of refreshes started so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Message of the last failed refresh, cleared by the next success
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Set who is browsing; a new identity invalidates relationship state
    /// and any refresh still in flight.
    pub fn set_viewer(&mut self, viewer: Viewer) -> Option<RefreshTicket> {
        let changed = self.viewer.as_ref().map(|v| v.id.as_str()) != Some(viewer.id.as_str());
        self.viewer = Some(viewer);

        if !changed {
            return None;
        }

        tracing::info!("Discovery viewer changed, resetting relationship state");
        self.book.clear();
        self.begin_refresh(RefreshTrigger::ViewerIdentified)
    }

    /// Sign-out: drop identity-scoped state
    pub fn clear_viewer(&mut self) {
        self.viewer = None;
        self.book.clear();
        self.generation += 1;
    }

    /// Update the search box and return its suggestions
    pub fn set_query(&mut self, query: &str) -> Vec<MatchResult> {
        self.query = query.to_string();
        self.suggestions()
    }

    pub fn suggestions(&self) -> Vec<MatchResult> {
        self.matcher.search(&self.query)
    }

    /// Choose the service to list professionals for; blank text clears it
    pub fn select_service(&mut self, free_text: &str) -> (Option<NormalizedService>, Option<RefreshTicket>) {
        let service = (!free_text.trim().is_empty()).then(|| self.matcher.resolve(free_text));
        let name = service.as_ref().map(|s| s.name.clone());

        if name == self.filter.service {
            return (service, None);
        }

        self.filter.service = name;
        (service, self.begin_refresh(RefreshTrigger::CandidatesChanged))
    }

    /// Record a new origin; a changed position triggers a refresh
    pub fn set_origin(&mut self, fix: LocationFix) -> Option<RefreshTicket> {
        if let LocationFix::Fresh { coordinates } = fix {
            self.location.record(coordinates, Utc::now());
        }

        let moved = self.origin.coordinates() != fix.coordinates();
        self.origin = fix;

        if moved {
            self.begin_refresh(RefreshTrigger::OriginChanged)
        } else {
            None
        }
    }

    /// Fresh fix when a position is reported, otherwise the cached one
    pub fn report_location(&mut self, coordinates: Option<Coordinates>, now: DateTime<Utc>) -> LocationFix {
        match coordinates {
            Some(coordinates) => LocationFix::Fresh { coordinates },
            None => self.location.lookup(now),
        }
    }

    /// Start a refresh for the current viewer
    ///
    /// Returns `None` while no viewer is known.
    pub fn begin_refresh(&mut self, trigger: RefreshTrigger) -> Option<RefreshTicket> {
        let viewer = self.viewer.as_ref()?;
        self.generation += 1;

        tracing::debug!("Refresh #{} started ({:?})", self.generation, trigger);

        Some(RefreshTicket {
            generation: self.generation,
            stamp: self.book.snapshot_stamp(),
            viewer_id: viewer.id.clone(),
            filter: self.filter.clone(),
            trigger,
        })
    }

    /// Fetch candidates, pending requests and connections for a ticket
    ///
    /// Fails unless all three collections arrive. Candidates lacking
    /// coordinates are enriched from their detail records.
    pub async fn fetch_snapshot(
        backend: &dyn Backend,
        ticket: &RefreshTicket,
    ) -> Result<DiscoverySnapshot, BackendError> {
        let (candidates, pending_requests, connections) = tokio::try_join!(
            backend.fetch_candidates(&ticket.filter),
            backend.fetch_pending_requests(&ticket.viewer_id),
            backend.fetch_connections(&ticket.viewer_id),
        )?;

        let candidates = enrich_coordinates(backend, dedup_candidates(candidates)).await;

        Ok(DiscoverySnapshot {
            candidates,
            pending_requests,
            connections,
            fetched_at: Utc::now(),
        })
    }

    /// Apply a fetched snapshot if the ticket is still current
    ///
    /// A failed fetch keeps the last good state and reports
    /// [`SessionError::RefreshFailed`].
    pub fn commit_refresh(
        &mut self,
        ticket: RefreshTicket,
        result: Result<DiscoverySnapshot, BackendError>,
    ) -> Result<CommitOutcome, SessionError> {
        let current_viewer = self.viewer.as_ref().map(|v| v.id.as_str());
        if current_viewer != Some(ticket.viewer_id.as_str()) {
            tracing::debug!("Discarding refresh #{}: viewer changed", ticket.generation);
            return Ok(CommitOutcome::Discarded(DiscardReason::ViewerChanged));
        }
        if ticket.generation != self.generation {
            tracing::debug!(
                "Discarding refresh #{}: superseded by #{}",
                ticket.generation,
                self.generation
            );
            return Ok(CommitOutcome::Discarded(DiscardReason::Superseded));
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Refresh #{} failed, keeping previous results: {}", ticket.generation, e);
                self.last_error = Some(e.to_string());
                return Err(SessionError::RefreshFailed(e));
            }
        };

        let candidates = dedup_candidates(snapshot.candidates);
        let reconciliation = Reconciliation::build(
            &ticket.viewer_id,
            &snapshot.pending_requests,
            &snapshot.connections,
            candidates.iter().map(|c| c.id.as_str()),
        )
        .issued(ticket.stamp);

        tracing::info!(
            "Refresh #{} applied: {} candidates, {} pending requests, {} connections",
            ticket.generation,
            candidates.len(),
            snapshot.pending_requests.len(),
            snapshot.connections.len()
        );

        self.candidates = candidates;
        self.book.apply(reconciliation);
        self.refreshed_at = Some(snapshot.fetched_at);
        self.last_error = None;

        Ok(CommitOutcome::Applied)
    }

    /// Begin, fetch and commit in one go
    pub async fn refresh(
        &mut self,
        backend: &dyn Backend,
        trigger: RefreshTrigger,
    ) -> Result<CommitOutcome, SessionError> {
        let ticket = self.begin_refresh(trigger).ok_or(SessionError::NoViewer)?;
        self.run_refresh(backend, ticket).await
    }

    /// Fetch and commit a ticket obtained earlier
    pub async fn run_refresh(
        &mut self,
        backend: &dyn Backend,
        ticket: RefreshTicket,
    ) -> Result<CommitOutcome, SessionError> {
        let result = Self::fetch_snapshot(backend, &ticket).await;
        self.commit_refresh(ticket, result)
    }

    /// The ranked professional list with derived state
    pub fn entries(&self) -> Vec<DiscoveryEntry> {
        let locality = self
            .viewer
            .as_ref()
            .map(|v| v.locality.clone())
            .unwrap_or_default();

        self.ranker
            .rank(self.origin.coordinates(), &locality, self.candidates.iter().cloned())
            .into_iter()
            .map(|ranked| {
                let id = ranked.candidate.id.as_str();
                DiscoveryEntry {
                    distance_label: ranked.distance_label(),
                    verification: self.resolver.resolve(&ranked.candidate),
                    relationship: self.book.state_of(id),
                    actions: self.book.available_actions(id),
                    action_in_flight: self.book.is_in_flight(id),
                    distance_km: ranked.distance_km,
                    tier: ranked.tier,
                    candidate: ranked.candidate,
                }
            })
            .collect()
    }

    pub fn relationship(&self, professional_id: &str) -> RelationshipState {
        self.book.state_of(professional_id)
    }

    /// Apply an action optimistically; pair with [`finish_action`](Self::finish_action)
    pub fn begin_action(
        &mut self,
        professional_id: &str,
        action: ConnectionAction,
    ) -> Result<(String, PendingTransition), SessionError> {
        let viewer_id = self.viewer.as_ref().ok_or(SessionError::NoViewer)?.id.clone();
        let transition = self.book.begin(professional_id, action)?;
        Ok((viewer_id, transition))
    }

    /// Settle an optimistic action with the backend's answer
    ///
    /// On failure the entry reverts to its previous state and the error is
    /// returned. A transition overtaken by a reconciliation leaves the
    /// reconciled state untouched.
    pub fn finish_action(
        &mut self,
        transition: PendingTransition,
        result: Result<(), BackendError>,
    ) -> Result<RelationshipState, SessionError> {
        match result {
            Ok(()) => {
                let completion = self.book.confirm(&transition);
                tracing::debug!(
                    "{:?} for {} confirmed ({:?})",
                    transition.action,
                    transition.professional_id,
                    completion
                );
                Ok(self.book.state_of(&transition.professional_id))
            }
            Err(source) => {
                let completion = self.book.roll_back(&transition);
                tracing::error!(
                    "{:?} for {} failed ({:?}): {}",
                    transition.action,
                    transition.professional_id,
                    completion,
                    source
                );
                Err(SessionError::ActionFailed {
                    professional_id: transition.professional_id,
                    action: transition.action,
                    source,
                })
            }
        }
    }

    async fn act(
        &mut self,
        backend: &dyn Backend,
        professional_id: &str,
        action: ConnectionAction,
    ) -> Result<RelationshipState, SessionError> {
        let (viewer_id, transition) = self.begin_action(professional_id, action)?;
        let result = perform_action(backend, &viewer_id, &transition).await;
        self.finish_action(transition, result)
    }

    pub async fn send_request(
        &mut self,
        backend: &dyn Backend,
        professional_id: &str,
    ) -> Result<RelationshipState, SessionError> {
        self.act(backend, professional_id, ConnectionAction::SendRequest).await
    }

    pub async fn cancel_request(
        &mut self,
        backend: &dyn Backend,
        professional_id: &str,
    ) -> Result<RelationshipState, SessionError> {
        self.act(backend, professional_id, ConnectionAction::CancelRequest).await
    }

    pub async fn remove_connection(
        &mut self,
        backend: &dyn Backend,
        professional_id: &str,
    ) -> Result<RelationshipState, SessionError> {
        self.act(backend, professional_id, ConnectionAction::RemoveConnection).await
    }

    /// The view action on a connected card: the connection to open
    pub fn open_connection(&self, professional_id: &str) -> Result<String, SessionError> {
        if self.book.state_of(professional_id) != RelationshipState::Connected {
            return Err(SessionError::NotConnected(professional_id.to_string()));
        }
        self.book
            .connection_id(professional_id)
            .map(str::to_string)
            .ok_or_else(|| SessionError::NotConnected(professional_id.to_string()))
    }
}

/// Run the backend call behind an optimistic transition
///
/// Duplicate-action outcomes (already requested, already gone) count as
/// success since the end state is the same.
pub async fn perform_action(
    backend: &dyn Backend,
    viewer_id: &str,
    transition: &PendingTransition,
) -> Result<(), BackendError> {
    let professional_id = transition.professional_id.as_str();
    match transition.action {
        ConnectionAction::SendRequest => {
            let outcome = backend.create_connection_request(viewer_id, professional_id).await?;
            tracing::debug!("Request to {}: {:?}", professional_id, outcome);
        }
        ConnectionAction::CancelRequest => {
            let outcome = backend.cancel_connection_request(viewer_id, professional_id).await?;
            tracing::debug!("Cancel for {}: {:?}", professional_id, outcome);
        }
        ConnectionAction::RemoveConnection => {
            let connection_id = transition
                .connection_id
                .as_deref()
                .ok_or_else(|| BackendError::NotFound(format!("connection with {}", professional_id)))?;
            let outcome = backend.remove_connection(connection_id).await?;
            tracing::debug!("Remove {} ({}): {:?}", connection_id, professional_id, outcome);
        }
        ConnectionAction::ViewConnection => {}
    }
    Ok(())
}

async fn enrich_coordinates(backend: &dyn Backend, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    let missing: Vec<String> = candidates
        .iter()
        .filter(|c| c.coordinates.is_none())
        .map(|c| c.id.clone())
        .collect();

    if missing.is_empty() {
        return candidates;
    }

    let found: HashMap<&str, Coordinates> = stream::iter(&missing)
        .map(|id| async move { (id.as_str(), backend.fetch_candidate_detail(id).await) })
        .buffer_unordered(DETAIL_FETCH_CONCURRENCY)
        .filter_map(|(id, detail)| async move {
            match detail {
                Ok(detail) => detail.coordinates.map(|c| (id, c)),
                Err(e) => {
                    tracing::warn!("Could not load coordinates for {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
        .await;

    tracing::debug!("Enriched {}/{} candidates with coordinates", found.len(), missing.len());

    for candidate in candidates.iter_mut().filter(|c| c.coordinates.is_none()) {
        candidate.coordinates = found.get(candidate.id.as_str()).copied();
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Locality;

    fn session() -> DiscoverySession {
        DiscoverySession::new(Arc::new(ServiceCatalog::builtin()), chrono::Duration::minutes(10))
    }

    fn viewer(id: &str) -> Viewer {
        Viewer::new(id, Locality::default())
    }

    fn snapshot() -> DiscoverySnapshot {
        DiscoverySnapshot {
            candidates: vec![],
            pending_requests: vec![],
            connections: vec![],
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_refresh_without_viewer() {
        let mut s = session();
        assert!(s.begin_refresh(RefreshTrigger::UserRequested).is_none());
        assert!(s.set_viewer(viewer("v1")).is_some());
        assert!(s.set_viewer(viewer("v1")).is_none());
    }

    #[test]
    fn test_latest_refresh_wins() {
        let mut s = session();
        let first = s.set_viewer(viewer("v1")).unwrap();
        let second = s.begin_refresh(RefreshTrigger::Foregrounded).unwrap();

        assert_eq!(
            s.commit_refresh(first, Ok(snapshot())).unwrap(),
            CommitOutcome::Discarded(DiscardReason::Superseded)
        );
        assert_eq!(s.commit_refresh(second, Ok(snapshot())).unwrap(), CommitOutcome::Applied);
    }

    #[test]
    fn test_viewer_change_discards_in_flight_refresh() {
        let mut s = session();
        let ticket = s.set_viewer(viewer("v1")).unwrap();
        s.clear_viewer();
        s.set_viewer(viewer("v2"));

        assert_eq!(
            s.commit_refresh(ticket, Ok(snapshot())).unwrap(),
            CommitOutcome::Discarded(DiscardReason::ViewerChanged)
        );
    }

    #[test]
    fn test_select_service_normalizes() {
        let mut s = session();
        s.set_viewer(viewer("v1"));

        let (service, ticket) = s.select_service("wiring");
        assert_eq!(service.unwrap().name, "Electrician");
        assert_eq!(ticket.unwrap().filter().service.as_deref(), Some("Electrician"));

        let (_, again) = s.select_service("ELECTRICIAN");
        assert!(again.is_none());
    }

    #[test]
    fn test_set_query_returns_suggestions() {
        let mut s = session();
        let suggestions = s.set_query("plumb");
        assert_eq!(suggestions[0].name, "Plumber");
        assert!(s.set_query("  ").is_empty());
    }

    #[test]
    fn test_origin_change_triggers_refresh() {
        let mut s = session();
        s.set_viewer(viewer("v1"));
        let lagos = Coordinates::new(6.5244, 3.3792);

        assert!(s.set_origin(LocationFix::Fresh { coordinates: lagos }).is_some());
        assert!(s.set_origin(LocationFix::Fresh { coordinates: lagos }).is_none());

        let fix = s.report_location(None, Utc::now());
        assert_eq!(fix.coordinates(), Some(lagos));
    }
}
