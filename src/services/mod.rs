// Service exports
pub mod backend;
pub mod cache;
pub mod location;
pub mod rest;

pub use backend::{Backend, BackendError, RemovalOutcome, RequestOutcome};
pub use cache::{CacheStats, CachedBackend, SessionStore, SharedSession};
pub use location::{FixedLocation, GeolocationSource, LocationCache, LocationFix, LocationProvider};
pub use rest::{BackendCollections, RestBackend};
