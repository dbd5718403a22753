//! Pro Discovery - professional discovery and matching core
//!
//! This library decides what a user sees when browsing professionals, in
//! what order, and which connection actions are available:
//! - service search with synonym expansion and ranked fuzzy matching
//! - great-circle distance with locality tiers and stable ordering
//! - verification summaries from loosely shaped backend records
//! - connection state reconciled from two independently fetched collections

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;

// Re-export commonly used types
pub use crate::core::{
    distance::{distance_km, format_distance},
    reconcile, GeoRanker, MatchResult, MatchType, RelationshipState, ServiceCatalog, ServiceMatcher,
    VerificationResolver, VerificationState,
};
pub use crate::models::{Candidate, Connection, ConnectionRequest, Coordinates, Locality, Viewer};
pub use crate::session::{DiscoveryEntry, DiscoverySession, RefreshTrigger, SessionError};
