use crate::core::{ConnectionAction, MatchResult, RelationshipState};
use crate::session::DiscoveryEntry;
use serde::Serialize;

/// Response for the service search endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<MatchResult>,
}

/// Response for the normalize endpoint
#[derive(Debug, Clone, Serialize)]
pub struct NormalizeResponse {
    pub input: String,
    pub name: String,
    pub category: String,
    #[serde(rename = "isCustom")]
    pub is_custom: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryListing {
    pub name: String,
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoriesResponse {
    pub categories: Vec<CategoryListing>,
}

/// Response for the discovery refresh endpoint
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResponse {
    pub entries: Vec<DiscoveryEntry>,
    #[serde(rename = "refreshedAt")]
    pub refreshed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// True when the entries are the last good results after a failed fetch
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Response for connection actions
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionActionResponse {
    #[serde(rename = "professionalId")]
    pub professional_id: String,
    pub relationship: RelationshipState,
    pub actions: Vec<ConnectionAction>,
}

/// The connection behind a connected professional's view action
#[derive(Debug, Clone, Serialize)]
pub struct OpenConnectionResponse {
    #[serde(rename = "professionalId")]
    pub professional_id: String,
    #[serde(rename = "connectionId")]
    pub connection_id: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(rename = "catalogSize")]
    pub catalog_size: usize,
    #[serde(rename = "activeSessions")]
    pub active_sessions: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
