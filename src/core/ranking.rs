use crate::core::distance::{distance_between, format_distance};
use crate::models::{Candidate, Coordinates, Locality};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Locality bucket relative to the viewer's recorded city and region
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocalityTier {
    SameCity,
    SameRegion,
    OtherRegion,
}

/// A candidate with its derived distance and tier
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    #[serde(rename = "distanceKm")]
    pub distance_km: Option<f64>,
    pub tier: LocalityTier,
}

impl RankedCandidate {
    pub fn distance_label(&self) -> String {
        format_distance(self.distance_km)
    }
}

fn same_place(viewer: Option<&str>, candidate: Option<&str>) -> bool {
    match (viewer, candidate) {
        (Some(v), Some(c)) if !v.is_empty() => v.to_lowercase() == c.to_lowercase(),
        _ => false,
    }
}

/// Assign a tier from recorded place names; geometry plays no part
pub fn assign_tier(viewer: &Locality, candidate: &Candidate) -> LocalityTier {
    if same_place(viewer.city.as_deref(), candidate.city.as_deref()) {
        LocalityTier::SameCity
    } else if same_place(viewer.region.as_deref(), candidate.region.as_deref()) {
        LocalityTier::SameRegion
    } else {
        LocalityTier::OtherRegion
    }
}

/// Unknown distances order after every known one
fn cmp_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Order candidates by tier, then ascending distance, then id
///
/// The id tie-break makes the ordering a pure function of its inputs, so
/// re-ranking unchanged data yields the same list.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoRanker;

impl GeoRanker {
    pub fn new() -> Self {
        Self
    }

    pub fn rank(
        &self,
        origin: Option<Coordinates>,
        viewer: &Locality,
        candidates: impl IntoIterator<Item = Candidate>,
    ) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let distance_km = distance_between(origin, candidate.coordinates);
                let tier = assign_tier(viewer, &candidate);
                RankedCandidate {
                    candidate,
                    distance_km,
                    tier,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            a.tier
                .cmp(&b.tier)
                .then_with(|| cmp_distance(a.distance_km, b.distance_km))
                .then_with(|| a.candidate.id.cmp(&b.candidate.id))
        });

        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(id: &str, coords: Option<(f64, f64)>, city: &str, region: &str) -> Candidate {
        Candidate {
            id: id.to_string(),
            name: format!("Pro {}", id),
            category: "Electrician".to_string(),
            coordinates: coords.map(|(lat, lng)| Coordinates::new(lat, lng)),
            city: Some(city.to_string()),
            region: Some(region.to_string()),
            rating_avg: 4.0,
            price_per_hour: None,
            raw: json!({}),
        }
    }

    fn viewer() -> Locality {
        Locality {
            city: Some("Lagos".to_string()),
            region: Some("Lagos State".to_string()),
        }
    }

    #[test]
    fn test_same_point_same_city() {
        let origin = Coordinates::new(6.5244, 3.3792);
        let ranked = GeoRanker::new().rank(
            Some(origin),
            &viewer(),
            vec![candidate("a", Some((6.5244, 3.3792)), "LAGOS", "Lagos State")],
        );

        assert_eq!(ranked[0].distance_km, Some(0.0));
        assert_eq!(ranked[0].tier, LocalityTier::SameCity);
        assert_eq!(ranked[0].distance_label(), "0m");
    }

    #[test]
    fn test_tier_before_distance() {
        let origin = Coordinates::new(6.5244, 3.3792);
        let ranked = GeoRanker::new().rank(
            Some(origin),
            &viewer(),
            vec![
                candidate("near-other", Some((6.53, 3.38)), "Ibadan", "Oyo"),
                candidate("far-region", Some((6.60, 3.50)), "Ikorodu", "Lagos State"),
                candidate("city", Some((6.70, 3.60)), "Lagos", "Lagos State"),
            ],
        );

        let ids: Vec<_> = ranked.iter().map(|r| r.candidate.id.as_str()).collect();
        assert_eq!(ids, vec!["city", "far-region", "near-other"]);
        assert_eq!(ranked[2].tier, LocalityTier::OtherRegion);
    }

    #[test]
    fn test_missing_coordinates_sort_last_within_tier() {
        let origin = Coordinates::new(6.5244, 3.3792);
        let ranked = GeoRanker::new().rank(
            Some(origin),
            &viewer(),
            vec![
                candidate("b", None, "Lagos", "Lagos State"),
                candidate("a", None, "Lagos", "Lagos State"),
                candidate("c", Some((6.9, 3.9)), "Lagos", "Lagos State"),
            ],
        );

        let ids: Vec<_> = ranked.iter().map(|r| r.candidate.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(ranked[1].distance_label(), "unknown");
    }

    #[test]
    fn test_no_origin_orders_by_id() {
        let ranked = GeoRanker::new().rank(
            None,
            &Locality::default(),
            vec![
                candidate("z", Some((6.5, 3.3)), "Lagos", "Lagos State"),
                candidate("m", Some((6.5, 3.3)), "Lagos", "Lagos State"),
            ],
        );

        assert!(ranked.iter().all(|r| r.tier == LocalityTier::OtherRegion));
        assert!(ranked.iter().all(|r| r.distance_km.is_none()));
        assert_eq!(ranked[0].candidate.id, "m");
    }
}
