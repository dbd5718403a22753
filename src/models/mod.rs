// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    dedup_candidates, payload_coordinates, Candidate, CandidateFilter, Connection, ConnectionRequest,
    Coordinates, Locality, RequestStatus, Viewer,
};
pub use requests::{ConnectionActionRequest, OriginRequest, RefreshRequest, ServiceQuery};
pub use responses::{
    CategoriesResponse, CategoryListing, ConnectionActionResponse, DiscoveryResponse, ErrorResponse,
    HealthResponse, NormalizeResponse, OpenConnectionResponse, SearchResponse,
};
