use crate::models::{Connection, ConnectionRequest, RequestStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Relationship between the viewer and one professional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipState {
    #[default]
    None,
    Pending,
    Connected,
}

/// Actions a viewer can take on a professional card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionAction {
    SendRequest,
    CancelRequest,
    ViewConnection,
    RemoveConnection,
}

impl ConnectionAction {
    /// State the action moves to, for actions that change state
    pub fn target(self) -> Option<RelationshipState> {
        match self {
            ConnectionAction::SendRequest => Some(RelationshipState::Pending),
            ConnectionAction::CancelRequest | ConnectionAction::RemoveConnection => {
                Some(RelationshipState::None)
            }
            ConnectionAction::ViewConnection => None,
        }
    }
}

/// Actions available from a confirmed or optimistic state
pub fn available_actions(state: RelationshipState) -> Vec<ConnectionAction> {
    match state {
        RelationshipState::None => vec![ConnectionAction::SendRequest],
        RelationshipState::Pending => vec![ConnectionAction::CancelRequest],
        RelationshipState::Connected => vec![
            ConnectionAction::ViewConnection,
            ConnectionAction::RemoveConnection,
        ],
    }
}

/// Derive relationship states from two independently fetched snapshots
///
/// Connections mark their counterparty `Connected`; pending requests mark
/// their professional `Pending` unless already connected. Ids absent from
/// the result are `None`.
pub fn reconcile(
    viewer_id: &str,
    pending_requests: &[ConnectionRequest],
    connections: &[Connection],
) -> HashMap<String, RelationshipState> {
    let mut states = HashMap::new();

    for connection in connections {
        let counterparty = connection.counterparty(viewer_id);
        if counterparty.is_empty() || counterparty == viewer_id {
            continue;
        }
        states.insert(counterparty.to_string(), RelationshipState::Connected);
    }

    for request in pending_requests {
        if request.status != RequestStatus::Pending {
            continue;
        }
        states
            .entry(request.professional_id.clone())
            .or_insert(RelationshipState::Pending);
    }

    states
}

/// Output of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub states: HashMap<String, RelationshipState>,
    /// Counterparty id -> connection record id
    pub connection_ids: HashMap<String, String>,
    /// Book stamp taken when the underlying fetch started; `None` counts as
    /// newer than any acknowledged action
    pub issued_at: Option<u64>,
}

impl Reconciliation {
    pub fn build<'a>(
        viewer_id: &str,
        pending_requests: &[ConnectionRequest],
        connections: &[Connection],
        known_ids: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut states = reconcile(viewer_id, pending_requests, connections);
        for id in known_ids {
            states.entry(id.to_string()).or_default();
        }

        let connection_ids = connections
            .iter()
            .map(|c| (c.counterparty(viewer_id).to_string(), c.id.clone()))
            .filter(|(counterparty, _)| states.get(counterparty) == Some(&RelationshipState::Connected))
            .collect();

        Self {
            states,
            connection_ids,
            issued_at: None,
        }
    }

    /// Mark the snapshot as fetched from the point given by
    /// [`RelationshipBook::snapshot_stamp`]
    pub fn issued(mut self, stamp: u64) -> Self {
        self.issued_at = Some(stamp);
        self
    }
}

/// Errors raised when an action cannot start from the current state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{action:?} is not available for {professional_id} while {state:?}")]
    NotAllowed {
        professional_id: String,
        action: ConnectionAction,
        state: RelationshipState,
    },

    #[error("An action for {0} is already in flight")]
    InFlight(String),

    #[error("No connection record known for {0}")]
    MissingConnection(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    InFlight,
    /// Confirmed by the backend while the book stamp was `as_of`
    Acknowledged { as_of: u64 },
}

#[derive(Debug, Clone)]
struct Overlay {
    target: RelationshipState,
    previous: RelationshipState,
    phase: Phase,
    seq: u64,
}

/// Handle for an optimistic transition awaiting its backend result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransition {
    pub professional_id: String,
    pub action: ConnectionAction,
    pub previous: RelationshipState,
    pub target: RelationshipState,
    /// Set for removals
    pub connection_id: Option<String>,
    seq: u64,
}

/// What finishing a transition did to the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The optimistic state stands until the next reconciliation
    Applied,
    /// The optimistic state was withdrawn
    RolledBack,
    /// A reconciliation or newer action replaced the overlay; nothing changed
    Superseded,
}

/// Per-viewer relationship states with optimistic overlays
///
/// The confirmed map only ever changes wholesale through
/// [`apply`](Self::apply). Actions write overlays, which are reconciled
/// against the next authoritative snapshot.
#[derive(Debug, Clone, Default)]
pub struct RelationshipBook {
    confirmed: HashMap<String, RelationshipState>,
    connection_ids: HashMap<String, String>,
    overlays: HashMap<String, Overlay>,
    epoch: u64,
    next_seq: u64,
    stamp: u64,
}

impl RelationshipBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reconciliations applied so far
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Take a stamp at the start of a fetch
    ///
    /// A reconciliation tagged with this stamp only settles actions
    /// confirmed before the stamp was taken.
    pub fn snapshot_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    pub fn confirmed_state(&self, professional_id: &str) -> RelationshipState {
        self.confirmed
            .get(professional_id)
            .copied()
            .unwrap_or_default()
    }

    /// Effective state: optimistic overlay first, then confirmed
    pub fn state_of(&self, professional_id: &str) -> RelationshipState {
        self.overlays
            .get(professional_id)
            .map(|o| o.target)
            .unwrap_or_else(|| self.confirmed_state(professional_id))
    }

    pub fn is_in_flight(&self, professional_id: &str) -> bool {
        self.overlays
            .get(professional_id)
            .is_some_and(|o| o.phase == Phase::InFlight)
    }

    /// No actions are offered while a request for the same id is in flight
    pub fn available_actions(&self, professional_id: &str) -> Vec<ConnectionAction> {
        if self.is_in_flight(professional_id) {
            return Vec::new();
        }
        available_actions(self.state_of(professional_id))
    }

    pub fn connection_id(&self, professional_id: &str) -> Option<&str> {
        self.connection_ids.get(professional_id).map(String::as_str)
    }

    /// Start an optimistic transition
    pub fn begin(
        &mut self,
        professional_id: &str,
        action: ConnectionAction,
    ) -> Result<PendingTransition, TransitionError> {
        if self.is_in_flight(professional_id) {
            return Err(TransitionError::InFlight(professional_id.to_string()));
        }

        let previous = self.state_of(professional_id);
        let target = match action.target() {
            Some(target) if available_actions(previous).contains(&action) => target,
            _ => {
                return Err(TransitionError::NotAllowed {
                    professional_id: professional_id.to_string(),
                    action,
                    state: previous,
                })
            }
        };

        let connection_id = if action == ConnectionAction::RemoveConnection {
            let id = self
                .connection_id(professional_id)
                .ok_or_else(|| TransitionError::MissingConnection(professional_id.to_string()))?;
            Some(id.to_string())
        } else {
            None
        };

        self.next_seq += 1;
        let seq = self.next_seq;
        self.overlays.insert(
            professional_id.to_string(),
            Overlay {
                target,
                previous,
                phase: Phase::InFlight,
                seq,
            },
        );

        tracing::debug!("Optimistic {:?} for {}: {:?} -> {:?}", action, professional_id, previous, target);

        Ok(PendingTransition {
            professional_id: professional_id.to_string(),
            action,
            previous,
            target,
            connection_id,
            seq,
        })
    }

    fn overlay_for(&mut self, transition: &PendingTransition) -> Option<&mut Overlay> {
        self.overlays
            .get_mut(&transition.professional_id)
            .filter(|o| o.seq == transition.seq)
    }

    /// The backend accepted the action (or it was already applied)
    pub fn confirm(&mut self, transition: &PendingTransition) -> Completion {
        let as_of = self.stamp;
        match self.overlay_for(transition) {
            Some(overlay) => {
                overlay.phase = Phase::Acknowledged { as_of };
                Completion::Applied
            }
            None => Completion::Superseded,
        }
    }

    /// The backend rejected the action; restore the pre-action state
    pub fn roll_back(&mut self, transition: &PendingTransition) -> Completion {
        if self.overlay_for(transition).is_none() {
            return Completion::Superseded;
        }
        self.overlays.remove(&transition.professional_id);
        Completion::RolledBack
    }

    /// Replace the confirmed state with a fresh reconciliation
    ///
    /// In-flight overlays survive only while the new confirmed value still
    /// equals the value they started from; otherwise the reconciliation
    /// wins. Acknowledged overlays are dropped by any snapshot fetched after
    /// their confirmation. An older snapshot leaves them in place unless it
    /// already agrees with their target.
    pub fn apply(&mut self, reconciliation: Reconciliation) {
        self.epoch += 1;
        let issued_at = reconciliation.issued_at;
        self.confirmed = reconciliation.states;
        self.connection_ids = reconciliation.connection_ids;

        let confirmed = &self.confirmed;
        self.overlays.retain(|id, overlay| {
            let current = confirmed.get(id).copied().unwrap_or_default();
            match overlay.phase {
                Phase::InFlight => current == overlay.previous,
                Phase::Acknowledged { as_of } => {
                    let fresher = issued_at.map_or(true, |issued| issued > as_of);
                    if fresher {
                        tracing::debug!("Snapshot settles acknowledged {:?} for {}", overlay.target, id);
                    }
                    !fresher && current != overlay.target
                }
            }
        });
    }

    /// Forget everything, e.g. when the viewer changes
    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.connection_ids.clear();
        self.overlays.clear();
        self.epoch += 1;
    }

    /// Effective states for every id the book knows about
    pub fn effective_states(&self) -> HashMap<String, RelationshipState> {
        let mut states = self.confirmed.clone();
        for (id, overlay) in &self.overlays {
            states.insert(id.clone(), overlay.target);
        }
        states
    }
}
