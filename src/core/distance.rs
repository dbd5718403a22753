use crate::models::Coordinates;

/// Earth's radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Label used when a distance cannot be computed
pub const UNKNOWN_DISTANCE: &str = "unknown";

/// Calculate the Haversine distance between two points in kilometers
///
/// Symmetric in its arguments and exactly zero for identical points.
#[inline]
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    if a == b {
        return 0.0;
    }

    let lat1_rad = a.lat.to_radians();
    let lat2_rad = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distance between an optional origin and an optional point
#[inline]
pub fn distance_between(origin: Option<Coordinates>, point: Option<Coordinates>) -> Option<f64> {
    Some(distance_km(origin?, point?))
}

/// Human-readable distance
///
/// * under 1 km: whole meters, e.g. `"350m"`
/// * 1 km up to 10 km: one decimal, e.g. `"2.4km"`
/// * 10 km and beyond: whole kilometers, e.g. `"37km"`
pub fn format_distance(km: Option<f64>) -> String {
    match km {
        Some(km) if km.is_finite() && km >= 0.0 => {
            if km < 1.0 {
                format!("{}m", (km * 1000.0).round() as u64)
            } else if km < 10.0 {
                format!("{:.1}km", km)
            } else {
                format!("{}km", km.round() as u64)
            }
        }
        _ => UNKNOWN_DISTANCE.to_string(),
    }
}
