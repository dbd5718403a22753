use crate::models::Coordinates;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Result of asking for the viewer's position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LocationFix {
    Fresh { coordinates: Coordinates },
    Cached {
        coordinates: Coordinates,
        #[serde(rename = "ageSecs")]
        age_secs: i64,
    },
    Unavailable,
}

impl LocationFix {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            LocationFix::Fresh { coordinates } | LocationFix::Cached { coordinates, .. } => {
                Some(*coordinates)
            }
            LocationFix::Unavailable => None,
        }
    }
}

/// Last known position with a staleness limit
#[derive(Debug, Clone)]
pub struct LocationCache {
    ttl: Duration,
    last: Option<(Coordinates, DateTime<Utc>)>,
}

impl LocationCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, last: None }
    }

    pub fn record(&mut self, coordinates: Coordinates, at: DateTime<Utc>) {
        self.last = Some((coordinates, at));
    }

    /// Cached fix while within the TTL, otherwise unavailable
    pub fn lookup(&self, now: DateTime<Utc>) -> LocationFix {
        match self.last {
            Some((coordinates, at)) => {
                let age = now.signed_duration_since(at).max(Duration::zero());
                if age <= self.ttl {
                    LocationFix::Cached {
                        coordinates,
                        age_secs: age.num_seconds(),
                    }
                } else {
                    LocationFix::Unavailable
                }
            }
            None => LocationFix::Unavailable,
        }
    }
}

/// Platform geolocation; may never resolve when permission is denied
#[async_trait]
pub trait GeolocationSource: Send + Sync {
    async fn acquire(&self) -> Option<Coordinates>;
}

/// Source that always reports the same point, or nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLocation(pub Option<Coordinates>);

#[async_trait]
impl GeolocationSource for FixedLocation {
    async fn acquire(&self) -> Option<Coordinates> {
        self.0
    }
}

/// Injectable location capability
///
/// Tries the source with a timeout; falls back to the cached position
/// within its TTL; otherwise reports [`LocationFix::Unavailable`].
pub struct LocationProvider<S> {
    source: S,
    cache: LocationCache,
    timeout: std::time::Duration,
}

impl<S: GeolocationSource> LocationProvider<S> {
    pub fn new(source: S, ttl: Duration, timeout: std::time::Duration) -> Self {
        Self {
            source,
            cache: LocationCache::new(ttl),
            timeout,
        }
    }

    pub async fn locate(&mut self) -> LocationFix {
        match tokio::time::timeout(self.timeout, self.source.acquire()).await {
            Ok(Some(coordinates)) => {
                self.cache.record(coordinates, Utc::now());
                LocationFix::Fresh { coordinates }
            }
            Ok(None) => {
                tracing::debug!("Geolocation unavailable, using cached position");
                self.cache.lookup(Utc::now())
            }
            Err(_) => {
                tracing::warn!("Geolocation timed out after {:?}", self.timeout);
                self.cache.lookup(Utc::now())
            }
        }
    }

    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flaky {
        available: AtomicBool,
    }

    #[async_trait]
    impl GeolocationSource for Flaky {
        async fn acquire(&self) -> Option<Coordinates> {
            if self.available.load(Ordering::SeqCst) {
                Some(Coordinates::new(6.5244, 3.3792))
            } else {
                None
            }
        }
    }

    struct Never;

    #[async_trait]
    impl GeolocationSource for Never {
        async fn acquire(&self) -> Option<Coordinates> {
            std::future::pending().await
        }
    }

    #[test]
    fn test_cache_ttl() {
        let mut cache = LocationCache::new(Duration::minutes(5));
        let t0 = Utc::now();
        assert_eq!(cache.lookup(t0), LocationFix::Unavailable);

        let lagos = Coordinates::new(6.5244, 3.3792);
        cache.record(lagos, t0);

        assert_eq!(
            cache.lookup(t0 + Duration::seconds(90)),
            LocationFix::Cached { coordinates: lagos, age_secs: 90 }
        );
        assert_eq!(cache.lookup(t0 + Duration::minutes(6)), LocationFix::Unavailable);
    }

    #[tokio::test]
    async fn test_provider_falls_back_to_cache() {
        let source = Flaky {
            available: AtomicBool::new(true),
        };
        let mut provider = LocationProvider::new(source, Duration::minutes(5), std::time::Duration::from_secs(1));

        assert!(matches!(provider.locate().await, LocationFix::Fresh { .. }));

        provider.source.available.store(false, Ordering::SeqCst);
        let fix = provider.locate().await;
        assert!(matches!(fix, LocationFix::Cached { .. }));
        assert_eq!(fix.coordinates(), Some(Coordinates::new(6.5244, 3.3792)));
    }

    #[tokio::test]
    async fn test_provider_never_resolving_source() {
        let mut provider = LocationProvider::new(Never, Duration::minutes(5), std::time::Duration::from_millis(20));
        assert_eq!(provider.locate().await, LocationFix::Unavailable);
    }

    #[tokio::test]
    async fn test_fixed_location() {
        let mut provider = LocationProvider::new(FixedLocation(None), Duration::minutes(5), std::time::Duration::from_secs(1));
        assert_eq!(provider.locate().await, LocationFix::Unavailable);
    }
}
