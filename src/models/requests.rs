use crate::session::RefreshTrigger;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Query string for the service search endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceQuery {
    #[serde(default)]
    pub q: String,
}

/// Position reported by the client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct OriginRequest {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

/// Request to refresh the viewer's discovery list
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "viewer_id", rename = "viewerId")]
    pub viewer_id: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[validate(nested)]
    #[serde(default)]
    pub origin: Option<OriginRequest>,
    /// Free-text service; normalized against the catalog
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default = "default_trigger")]
    pub trigger: RefreshTrigger,
}

fn default_trigger() -> RefreshTrigger {
    RefreshTrigger::UserRequested
}

/// Request to act on a professional card
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConnectionActionRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "viewer_id", rename = "viewerId")]
    pub viewer_id: String,
    #[validate(length(min = 1))]
    #[serde(alias = "professional_id", rename = "professionalId")]
    pub professional_id: String,
}
