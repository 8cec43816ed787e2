use chrono::{DateTime, Utc};
use serde::Serialize;

use expirysignal_core::format_instant;

// ---------------------------------------------------------------------------
// Component identification, echoed in every signal payload
// ---------------------------------------------------------------------------

pub const COMPONENT: &str = "ExpirySignal";
pub const COMPONENT_ID: &str = "EXP-01";
pub const COMPONENT_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Advisory warnings
// ---------------------------------------------------------------------------

/// Present on every signal.
pub const WARN_SIGNAL_ONLY: &str = "Signal-only: ExpirySignal emits temporal validity. \
     Your application interprets the signal and enforces outcomes.";

/// Present whenever a record exists (write acknowledgement and found reads).
pub const WARN_NOT_AUTHORIZATION: &str =
    "Not expired is not authorization. Treat this signal as evidence only.";

/// Present when no record exists for the identity.
pub const WARN_ABSENCE_NOT_PERMISSION: &str = "Absence of record is not permission. \
     Default to fail-closed unless you explicitly choose otherwise.";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The unique key of an expiry record.
///
/// `scope: None` is its own identity: `("u", None)` and `("u", Some("a"))`
/// never alias each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity {
    pub subject: String,
    pub scope: Option<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            subject: subject.into(),
            scope,
        }
    }

    /// Storage key for the scope column. Valid scopes are never empty,
    /// so the empty string stands for "no scope".
    pub fn scope_key(&self) -> &str {
        self.scope.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// ExpiryRecord
// ---------------------------------------------------------------------------

/// The persisted expiry state for one identity.
///
/// `cause_code`, `renewable` and `note` are carried for the operator's
/// benefit only and never influence a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryRecord {
    pub subject: String,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub cause_code: Option<String>,
    pub renewable: Option<bool>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpiryRecord {
    /// Inclusive: a reference instant equal to `expires_at` is expired.
    pub fn is_expired_at(&self, reference: DateTime<Utc>) -> bool {
        reference >= self.expires_at
    }
}

/// A validated write: everything an upsert replaces, keyed by identity.
///
/// Optional fields left `None` are cleared on the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryUpsert {
    pub identity: Identity,
    pub expires_at: DateTime<Utc>,
    pub cause_code: Option<String>,
    pub renewable: Option<bool>,
    pub note: Option<String>,
}

/// A validated read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub identity: Identity,
    /// Caller-supplied reference instant; the clock is used when absent.
    pub now: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// Outcome reported to the caller.
///
/// ```text
/// no record ──write──▶ record ──write──▶ record
///                      │
///                      └─ each read: not_expired | expired (derived, never stored)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Stored,
    NoRecord,
    Expired,
    NotExpired,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::NoRecord => "no_record",
            Self::Expired => "expired",
            Self::NotExpired => "not_expired",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Fields shared by every signal payload.
#[derive(Debug, Clone, Serialize)]
pub struct SignalFields {
    pub component: &'static str,
    pub component_id: &'static str,
    pub version: &'static str,
    pub subject: String,
    pub scope: Option<String>,
    pub now: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<String>,
    pub cause_code: Option<String>,
    pub renewable: Option<bool>,
}

impl SignalFields {
    fn from_record(record: &ExpiryRecord, now: DateTime<Utc>) -> Self {
        Self {
            component: COMPONENT,
            component_id: COMPONENT_ID,
            version: COMPONENT_VERSION,
            subject: record.subject.clone(),
            scope: record.scope.clone(),
            now: format_instant(now),
            expires_at: Some(format_instant(record.expires_at)),
            cause_code: record.cause_code.clone(),
            renewable: record.renewable,
        }
    }

    fn absent(identity: Identity, now: DateTime<Utc>) -> Self {
        Self {
            component: COMPONENT,
            component_id: COMPONENT_ID,
            version: COMPONENT_VERSION,
            subject: identity.subject,
            scope: identity.scope,
            now: format_instant(now),
            expires_at: None,
            cause_code: None,
            renewable: None,
        }
    }
}

/// Body of a successful write: `{"status": "applied", "signal": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct WriteAck {
    pub status: &'static str,
    pub signal: StoredSignal,
}

impl WriteAck {
    pub fn applied(record: &ExpiryRecord, now: DateTime<Utc>) -> Self {
        Self {
            status: "applied",
            signal: StoredSignal {
                fields: SignalFields::from_record(record, now),
                signal: Signal::Stored,
                warnings: vec![WARN_SIGNAL_ONLY, WARN_NOT_AUTHORIZATION],
            },
        }
    }
}

/// The signal echoed back after a write. Carries no `expired` field.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSignal {
    #[serde(flatten)]
    pub fields: SignalFields,
    pub signal: Signal,
    pub warnings: Vec<&'static str>,
}

/// Body of a read.
#[derive(Debug, Clone, Serialize)]
pub struct ExpirySignal {
    #[serde(flatten)]
    pub fields: SignalFields,
    pub signal: Signal,
    /// `null` when there is no record.
    pub expired: Option<bool>,
    pub warnings: Vec<&'static str>,
}

impl ExpirySignal {
    /// No record exists. This is not a denial and not an error.
    pub fn no_record(identity: Identity, reference: DateTime<Utc>) -> Self {
        Self {
            fields: SignalFields::absent(identity, reference),
            signal: Signal::NoRecord,
            expired: None,
            warnings: vec![WARN_SIGNAL_ONLY, WARN_ABSENCE_NOT_PERMISSION],
        }
    }

    /// Compare `reference` with the stored expiry.
    pub fn evaluate(record: &ExpiryRecord, reference: DateTime<Utc>) -> Self {
        let expired = record.is_expired_at(reference);
        Self {
            fields: SignalFields::from_record(record, reference),
            signal: if expired {
                Signal::Expired
            } else {
                Signal::NotExpired
            },
            expired: Some(expired),
            warnings: vec![WARN_SIGNAL_ONLY, WARN_NOT_AUTHORIZATION],
        }
    }
}
