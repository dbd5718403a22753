// Core algorithm exports
pub mod catalog;
pub mod connections;
pub mod distance;
pub mod matcher;
pub mod ranking;
pub mod verification;

pub use catalog::{CatalogError, ServiceCatalog, ServiceEntry, CUSTOM_CATEGORY};
pub use connections::{
    available_actions, reconcile, Completion, ConnectionAction, PendingTransition, Reconciliation,
    RelationshipBook, RelationshipState, TransitionError,
};
pub use distance::{distance_between, distance_km, format_distance};
pub use matcher::{MatchResult, MatchType, NormalizedService, ServiceMatcher};
pub use ranking::{GeoRanker, LocalityTier, RankedCandidate};
pub use verification::{resolve_payload, VerificationResolver, VerificationState};
