use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Returns the point only if it is finite and inside the lat/lng ranges
    pub fn checked(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then(|| Self::new(lat, lng))
    }
}

/// The viewer's own recorded locality, used for tier assignment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// The user browsing professionals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    #[serde(rename = "viewerId")]
    pub id: String,
    #[serde(flatten)]
    pub locality: Locality,
}

impl Viewer {
    pub fn new(id: impl Into<String>, locality: Locality) -> Self {
        Self {
            id: id.into(),
            locality,
        }
    }
}

/// A professional as fetched from the backend
///
/// Refreshed wholesale on re-fetch. Only `coordinates` is ever filled in
/// afterwards, by a detail fetch when the listing payload lacked them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub category: String,
    pub coordinates: Option<Coordinates>,
    pub city: Option<String>,
    pub region: Option<String>,
    #[serde(rename = "ratingAvg")]
    pub rating_avg: f64,
    #[serde(rename = "pricePerHour")]
    pub price_per_hour: Option<f64>,
    #[serde(skip_serializing)]
    pub raw: Value,
}

type Accessor = fn(&Value) -> Option<&Value>;

impl Candidate {
    /// Decode a backend payload, defaulting every optional field.
    ///
    /// Returns `None` only when no id can be found.
    pub fn from_payload(raw: Value) -> Option<Self> {
        let id = first_str(&raw, &[|v| v.get("$id"), |v| v.get("id"), |v| v.get("_id")])?
            .to_string();

        let name = first_str(
            &raw,
            &[
                |v| v.get("name"),
                |v| v.get("businessName"),
                |v| v.get("user")?.get("name"),
                |v| v.get("user")?.get("fullName"),
            ],
        )
        .unwrap_or_default()
        .to_string();

        let category = first_str(
            &raw,
            &[
                |v| v.get("category"),
                |v| v.get("service"),
                |v| v.get("services")?.get(0),
            ],
        )
        .unwrap_or_default()
        .to_string();

        let city = first_str(&raw, &[|v| v.get("city"), |v| v.get("location")?.get("city")])
            .map(str::to_string);
        let region = first_str(
            &raw,
            &[
                |v| v.get("state"),
                |v| v.get("region"),
                |v| v.get("location")?.get("state"),
            ],
        )
        .map(str::to_string);

        let rating_avg = first_f64(&raw, &[|v| v.get("ratingAvg"), |v| v.get("averageRating")])
            .unwrap_or(0.0);
        let price_per_hour =
            first_f64(&raw, &[|v| v.get("pricePerHour"), |v| v.get("hourlyRate")]);

        let coordinates = payload_coordinates(&raw);

        Some(Self {
            id,
            name,
            category,
            coordinates,
            city,
            region,
            rating_avg,
            price_per_hour,
            raw,
        })
    }
}

fn first_str<'a>(raw: &'a Value, accessors: &[Accessor]) -> Option<&'a str> {
    accessors
        .iter()
        .filter_map(|get| get(raw))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
}

fn first_f64(raw: &Value, accessors: &[Accessor]) -> Option<f64> {
    accessors
        .iter()
        .filter_map(|get| get(raw))
        .find_map(number)
}

/// Numbers sometimes arrive as strings from form-backed collections
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lat_lng(obj: &Value, lat_key: &str, lng_key: &str) -> Option<Coordinates> {
    let lat = number(obj.get(lat_key)?)?;
    let lng = number(obj.get(lng_key)?)?;
    Coordinates::checked(lat, lng)
}

/// Extract coordinates from the shapes the backend has used over time
pub fn payload_coordinates(raw: &Value) -> Option<Coordinates> {
    let shapes: [fn(&Value) -> Option<Coordinates>; 5] = [
        |v| lat_lng(v.get("coordinates")?, "lat", "lng"),
        |v| lat_lng(v.get("location")?, "lat", "lng"),
        |v| lat_lng(v.get("location")?, "latitude", "longitude"),
        |v| {
            // GeoJSON order is [lng, lat]
            let pair = v.get("location")?.get("coordinates")?.as_array()?;
            Coordinates::checked(number(pair.get(1)?)?, number(pair.first()?)?)
        },
        |v| lat_lng(v, "latitude", "longitude"),
    ];
    shapes.iter().find_map(|shape| shape(raw))
}

/// Deduplicate by id, keeping the first occurrence
pub fn dedup_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.id.clone()))
        .collect()
}

/// Lifecycle of an outbound connection request, owned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    #[serde(rename = "professionalId")]
    pub professional_id: String,
    pub status: RequestStatus,
}

/// Symmetric relationship record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(alias = "$id")]
    pub id: String,
    #[serde(rename = "requesterId")]
    pub requester_id: String,
    #[serde(rename = "professionalId")]
    pub professional_id: String,
}

impl Connection {
    /// The other side of the connection from the viewer's perspective
    pub fn counterparty(&self, viewer_id: &str) -> &str {
        if self.requester_id == viewer_id {
            &self.professional_id
        } else {
            &self.requester_id
        }
    }
}

/// What the backend should return for a discovery listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFilter {
    /// Canonical (or custom) service name
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}
