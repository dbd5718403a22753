use crate::models::Candidate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tri-state verification summary, derived per render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationState {
    #[serde(rename = "emailVerified")]
    pub email_verified: bool,
    #[serde(rename = "faceVerified")]
    pub face_verified: bool,
    #[serde(rename = "fullyVerified")]
    pub fully_verified: bool,
}

impl VerificationState {
    pub const FULL: Self = Self {
        email_verified: true,
        face_verified: true,
        fully_verified: true,
    };
}

type RecordAccessor = fn(&Value) -> Option<&Value>;

/// Record sources in resolution order: nested user, nested account, then
/// the candidate itself
fn sources(raw: &Value) -> impl Iterator<Item = &Value> {
    let accessors: [RecordAccessor; 3] = [
        |v| v.get("user").filter(|u| u.is_object()),
        |v| v.get("account").filter(|u| u.is_object()),
        |v| Some(v),
    ];
    accessors.into_iter().filter_map(move |get| get(raw))
}

fn is_true(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

fn email_flag(record: &Value) -> Option<bool> {
    record
        .get("emailVerification")?
        .get("isVerified")?
        .as_bool()
}

fn face_flag(record: &Value) -> Option<bool> {
    let status = record.get("faceVerification")?.get("status")?.as_str()?;
    Some(status.eq_ignore_ascii_case("verified"))
}

/// Resolve verification from a raw payload
///
/// An explicit `isVerified`/`verified` flag set to `true` on any record
/// source overrides the granular flags. Absent fields count as `false`.
pub fn resolve_payload(raw: &Value) -> VerificationState {
    let overridden = sources(raw)
        .any(|record| is_true(record.get("isVerified")) || is_true(record.get("verified")));
    if overridden {
        return VerificationState::FULL;
    }

    let email_verified = sources(raw).find_map(email_flag).unwrap_or(false);
    let face_verified = sources(raw).find_map(face_flag).unwrap_or(false);

    VerificationState {
        email_verified,
        face_verified,
        fully_verified: email_verified && face_verified,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationResolver;

impl VerificationResolver {
    pub fn resolve(&self, candidate: &Candidate) -> VerificationState {
        resolve_payload(&candidate.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_flag_overrides_granular() {
        let state = resolve_payload(&json!({
            "isVerified": true,
            "faceVerification": { "status": "not_started" },
            "emailVerification": { "isVerified": false }
        }));
        assert_eq!(state, VerificationState::FULL);
    }

    #[test]
    fn test_nested_user_takes_precedence() {
        let state = resolve_payload(&json!({
            "emailVerification": { "isVerified": false },
            "user": {
                "emailVerification": { "isVerified": true },
                "faceVerification": { "status": "verified" }
            }
        }));
        assert!(state.email_verified);
        assert!(state.face_verified);
        assert!(state.fully_verified);
    }

    #[test]
    fn test_falls_back_to_candidate_fields() {
        let state = resolve_payload(&json!({
            "user": { "name": "Ada" },
            "emailVerification": { "isVerified": true },
            "faceVerification": { "status": "pending" }
        }));
        assert!(state.email_verified);
        assert!(!state.face_verified);
        assert!(!state.fully_verified);
    }

    #[test]
    fn test_nested_verified_flag() {
        let state = resolve_payload(&json!({ "account": { "verified": true } }));
        assert!(state.fully_verified);
    }

    #[test]
    fn test_absent_fields_default_false() {
        assert_eq!(resolve_payload(&json!({})), VerificationState::default());
        assert_eq!(resolve_payload(&json!(null)), VerificationState::default());
        assert_eq!(
            resolve_payload(&json!({ "isVerified": "yes", "verified": false })),
            VerificationState::default()
        );
    }
}
