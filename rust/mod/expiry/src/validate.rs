//! Request normalisation and validation.
//!
//! Writes go through two total, side-effect free steps:
//!
//! ```text
//! raw JSON ──NormalizedWrite::from_json──▶ NormalizedWrite ──validate──▶ ExpiryUpsert
//! ```
//!
//! Normalisation only folds legacy spellings onto canonical names; every
//! type and range check happens in `validate`, which reports all failing
//! fields at once.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use expirysignal_core::{ValidationDetails, parse_instant};

use crate::model::{ExpiryUpsert, Identity, ReadRequest};

pub const CAUSE_CODE_MAX: usize = 120;
pub const NOTE_MAX: usize = 500;

const MSG_REQUIRED: &str = "Required";
const MSG_INVALID_DATETIME: &str = "Invalid datetime";

// ---------------------------------------------------------------------------
// Write path
// ---------------------------------------------------------------------------

/// A write body with legacy aliases folded onto canonical names.
/// Values are still untyped JSON; `null` has already been dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedWrite {
    pub subject: Option<Value>,
    pub scope: Option<Value>,
    pub expires_at: Option<Value>,
    pub cause_code: Option<Value>,
    pub renewable: Option<Value>,
    pub note: Option<Value>,
}

impl NormalizedWrite {
    /// Fold `expires_at` → `expiresAt` and `causeCode` → `cause_code`.
    /// The canonical spelling wins when both are present.
    ///
    /// A body that is not a JSON object normalises to all-absent, so it
    /// fails validation on its required fields.
    pub fn from_json(raw: &Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return Self::default();
        };
        Self {
            subject: field(obj, "subject"),
            scope: field(obj, "scope"),
            expires_at: field(obj, "expiresAt").or_else(|| field(obj, "expires_at")),
            cause_code: field(obj, "cause_code").or_else(|| field(obj, "causeCode")),
            renewable: field(obj, "renewable"),
            note: field(obj, "note"),
        }
    }

    pub fn validate(&self) -> Result<ExpiryUpsert, ValidationDetails> {
        let mut details = ValidationDetails::new();

        let subject = required_string(&mut details, "subject", self.subject.as_ref(), 1, None);
        let scope = optional_string(&mut details, "scope", self.scope.as_ref(), 1, None);
        let expires_at =
            required_string(&mut details, "expiresAt", self.expires_at.as_ref(), 0, None)
                .and_then(|raw| instant(&mut details, "expiresAt", &raw));
        let cause_code = optional_string(
            &mut details,
            "cause_code",
            self.cause_code.as_ref(),
            1,
            Some(CAUSE_CODE_MAX),
        );
        let renewable = optional_bool(&mut details, "renewable", self.renewable.as_ref());
        let note = optional_string(&mut details, "note", self.note.as_ref(), 0, Some(NOTE_MAX));

        match (subject, expires_at) {
            (Some(subject), Some(expires_at)) if details.is_empty() => Ok(ExpiryUpsert {
                identity: Identity::new(subject, scope),
                expires_at,
                cause_code,
                renewable,
                note,
            }),
            _ => Err(details),
        }
    }
}

// ---------------------------------------------------------------------------
// Read path
// ---------------------------------------------------------------------------

/// Raw read query string. Every parameter arrives as text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadQuery {
    pub subject: Option<String>,
    pub scope: Option<String>,
    pub now: Option<String>,
}

impl ReadQuery {
    pub fn validate(&self) -> Result<ReadRequest, ValidationDetails> {
        let mut details = ValidationDetails::new();

        let subject = match self.subject.as_deref() {
            None => {
                details.field("subject", MSG_REQUIRED);
                None
            }
            Some(s) => min_len(&mut details, "subject", s, 1).then(|| s.to_string()),
        };
        let scope = match self.scope.as_deref() {
            None => None,
            Some(s) => min_len(&mut details, "scope", s, 1).then(|| s.to_string()),
        };
        let now = match self.now.as_deref() {
            None => None,
            Some(s) => instant(&mut details, "now", s),
        };

        match subject {
            Some(subject) if details.is_empty() => Ok(ReadRequest {
                identity: Identity::new(subject, scope),
                now,
            }),
            _ => Err(details),
        }
    }
}

// ---------------------------------------------------------------------------
// Field checks
// ---------------------------------------------------------------------------

fn field(obj: &Map<String, Value>, key: &str) -> Option<Value> {
    obj.get(key).filter(|v| !v.is_null()).cloned()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_string(
    details: &mut ValidationDetails,
    name: &str,
    value: Option<&Value>,
    min: usize,
    max: Option<usize>,
) -> Option<String> {
    if value.is_none() {
        details.field(name, MSG_REQUIRED);
        return None;
    }
    optional_string(details, name, value, min, max)
}

fn optional_string(
    details: &mut ValidationDetails,
    name: &str,
    value: Option<&Value>,
    min: usize,
    max: Option<usize>,
) -> Option<String> {
    let value = value?;
    let Some(s) = value.as_str() else {
        details.field(name, format!("Expected string, received {}", type_name(value)));
        return None;
    };

    let mut ok = min_len(details, name, s, min);
    if let Some(max) = max {
        ok &= max_len(details, name, s, max);
    }
    ok.then(|| s.to_string())
}

fn optional_bool(
    details: &mut ValidationDetails,
    name: &str,
    value: Option<&Value>,
) -> Option<bool> {
    let value = value?;
    match value.as_bool() {
        Some(b) => Some(b),
        None => {
            details.field(name, format!("Expected boolean, received {}", type_name(value)));
            None
        }
    }
}

fn min_len(details: &mut ValidationDetails, name: &str, s: &str, min: usize) -> bool {
    if s.chars().count() < min {
        details.field(name, format!("String must contain at least {min} character(s)"));
        return false;
    }
    true
}

fn max_len(details: &mut ValidationDetails, name: &str, s: &str, max: usize) -> bool {
    if s.chars().count() > max {
        details.field(name, format!("String must contain at most {max} character(s)"));
        return false;
    }
    true
}

fn instant(details: &mut ValidationDetails, name: &str, s: &str) -> Option<DateTime<Utc>> {
    let parsed = parse_instant(s);
    if parsed.is_none() {
        details.field(name, MSG_INVALID_DATETIME);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(v: Value) -> NormalizedWrite {
        NormalizedWrite::from_json(&v)
    }

    // -----------------------------------------------------------------------
    // Normalisation
    // -----------------------------------------------------------------------

    #[test]
    fn legacy_aliases_fold_onto_canonical_names() {
        let n = normalize(json!({
            "subject": "u",
            "expires_at": "2025-01-01T00:00:00Z",
            "causeCode": "TRIAL",
        }));
        assert_eq!(n.expires_at, Some(json!("2025-01-01T00:00:00Z")));
        assert_eq!(n.cause_code, Some(json!("TRIAL")));
    }

    #[test]
    fn canonical_spelling_wins() {
        let n = normalize(json!({
            "subject": "u",
            "expiresAt": "2025-01-01T00:00:00Z",
            "expires_at": "1999-01-01T00:00:00Z",
            "cause_code": "CANON",
            "causeCode": "ALIAS",
        }));
        assert_eq!(n.expires_at, Some(json!("2025-01-01T00:00:00Z")));
        assert_eq!(n.cause_code, Some(json!("CANON")));
    }

    #[test]
    fn null_canonical_falls_back_to_alias() {
        let n = normalize(json!({"expiresAt": null, "expires_at": "2025-01-01T00:00:00Z"}));
        assert_eq!(n.expires_at, Some(json!("2025-01-01T00:00:00Z")));
    }

    #[test]
    fn alias_and_canonical_validate_identically() {
        let canonical = normalize(json!({
            "subject": "u", "expiresAt": "2025-01-01T00:00:00Z", "cause_code": "X",
        }))
        .validate()
        .unwrap();
        let legacy = normalize(json!({
            "subject": "u", "expires_at": "2025-01-01T00:00:00Z", "causeCode": "X",
        }))
        .validate()
        .unwrap();
        assert_eq!(canonical, legacy);
    }

    #[test]
    fn non_object_body_normalises_to_empty() {
        assert_eq!(normalize(json!([1, 2])), NormalizedWrite::default());
        assert_eq!(normalize(Value::Null), NormalizedWrite::default());
    }

    // -----------------------------------------------------------------------
    // Write validation
    // -----------------------------------------------------------------------

    #[test]
    fn minimal_write_is_valid() {
        let upsert = normalize(json!({"subject": "user-42", "expiresAt": "2025-01-01T00:00:00Z"}))
            .validate()
            .unwrap();
        assert_eq!(upsert.identity, Identity::new("user-42", None));
        assert_eq!(upsert.expires_at, parse_instant("2025-01-01T00:00:00Z").unwrap());
        assert_eq!(upsert.cause_code, None);
        assert_eq!(upsert.renewable, None);
        assert_eq!(upsert.note, None);
    }

    #[test]
    fn full_write_is_valid() {
        let upsert = normalize(json!({
            "subject": "user-42",
            "scope": "billing",
            "expiresAt": "2024-12-31T23:00:00.250Z",
            "cause_code": "PAYMENT_FAILED",
            "renewable": false,
            "note": "",
        }))
        .validate()
        .unwrap();
        assert_eq!(upsert.identity.scope.as_deref(), Some("billing"));
        assert_eq!(upsert.expires_at, parse_instant("2024-12-31T23:00:00.250Z").unwrap());
        assert_eq!(upsert.renewable, Some(false));
        assert_eq!(upsert.note.as_deref(), Some(""));
    }

    #[test]
    fn missing_required_fields_reported_together() {
        let details = normalize(json!({})).validate().unwrap_err();
        assert_eq!(details.field_messages("subject"), ["Required"]);
        assert_eq!(details.field_messages("expiresAt"), ["Required"]);
        assert!(details.form_errors.is_empty());
    }

    #[test]
    fn empty_strings_rejected_where_min_is_one() {
        let details = normalize(json!({
            "subject": "", "scope": "", "expiresAt": "2025-01-01T00:00:00Z", "cause_code": "",
        }))
        .validate()
        .unwrap_err();
        for field in ["subject", "scope", "cause_code"] {
            assert_eq!(
                details.field_messages(field),
                ["String must contain at least 1 character(s)"],
                "{field}"
            );
        }
    }

    #[test]
    fn length_limits() {
        let ok = normalize(json!({
            "subject": "u",
            "expiresAt": "2025-01-01T00:00:00Z",
            "cause_code": "c".repeat(CAUSE_CODE_MAX),
            "note": "n".repeat(NOTE_MAX),
        }))
        .validate();
        assert!(ok.is_ok());

        let details = normalize(json!({
            "subject": "u",
            "expiresAt": "2025-01-01T00:00:00Z",
            "cause_code": "c".repeat(CAUSE_CODE_MAX + 1),
            "note": "n".repeat(NOTE_MAX + 1),
        }))
        .validate()
        .unwrap_err();
        assert_eq!(
            details.field_messages("cause_code"),
            ["String must contain at most 120 character(s)"]
        );
        assert_eq!(
            details.field_messages("note"),
            ["String must contain at most 500 character(s)"]
        );
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let ok = normalize(json!({
            "subject": "u",
            "expiresAt": "2025-01-01T00:00:00Z",
            "note": "é".repeat(NOTE_MAX),
        }))
        .validate();
        assert!(ok.is_ok());
    }

    #[test]
    fn wrong_types_reported() {
        let details = normalize(json!({
            "subject": 42,
            "expiresAt": "2025-01-01T00:00:00Z",
            "renewable": "yes",
            "scope": ["a"],
        }))
        .validate()
        .unwrap_err();
        assert_eq!(details.field_messages("subject"), ["Expected string, received number"]);
        assert_eq!(details.field_messages("renewable"), ["Expected boolean, received string"]);
        assert_eq!(details.field_messages("scope"), ["Expected string, received array"]);
    }

    #[test]
    fn expires_at_must_be_a_datetime() {
        let bad_forms = [
            "2025-01-01",
            "soon",
            "",
            "2025-01-01T25:00:00Z",
            "2025-01-01T00:00:00+01:00",
            " 2025-01-01T00:00:00Z ",
            "2025-01-01 00:00:00Z",
            "2025-01-01t00:00:00z",
            "2024-12-31T23:59:60Z",
        ];
        for bad in bad_forms {
            let details = normalize(json!({"subject": "u", "expiresAt": bad}))
                .validate()
                .unwrap_err();
            assert_eq!(details.field_messages("expiresAt"), ["Invalid datetime"], "{bad}");
        }
    }

    #[test]
    fn null_optionals_are_absent() {
        let upsert = normalize(json!({
            "subject": "u", "expiresAt": "2025-01-01T00:00:00Z",
            "scope": null, "renewable": null, "note": null, "cause_code": null,
        }))
        .validate()
        .unwrap();
        assert_eq!(upsert.identity.scope, None);
        assert_eq!(upsert.renewable, None);
    }

    // -----------------------------------------------------------------------
    // Read validation
    // -----------------------------------------------------------------------

    fn query(subject: Option<&str>, scope: Option<&str>, now: Option<&str>) -> ReadQuery {
        ReadQuery {
            subject: subject.map(String::from),
            scope: scope.map(String::from),
            now: now.map(String::from),
        }
    }

    #[test]
    fn read_requires_subject() {
        let details = query(None, None, None).validate().unwrap_err();
        assert_eq!(details.field_messages("subject"), ["Required"]);

        let details = query(Some(""), None, None).validate().unwrap_err();
        assert_eq!(
            details.field_messages("subject"),
            ["String must contain at least 1 character(s)"]
        );
    }

    #[test]
    fn read_rejects_empty_scope_and_bad_now() {
        let details = query(Some("u"), Some(""), Some("yesterday")).validate().unwrap_err();
        assert!(!details.field_messages("scope").is_empty());
        assert_eq!(details.field_messages("now"), ["Invalid datetime"]);

        let details = query(Some("u"), None, Some("2025-06-01T02:00:00+02:00"))
            .validate()
            .unwrap_err();
        assert_eq!(details.field_messages("now"), ["Invalid datetime"]);
    }

    #[test]
    fn read_with_override() {
        let req = query(Some("u"), Some("s"), Some("2025-06-01T00:00:00Z")).validate().unwrap();
        assert_eq!(req.identity, Identity::new("u", Some("s".into())));
        assert_eq!(req.now, parse_instant("2025-06-01T00:00:00Z"));
    }
}
