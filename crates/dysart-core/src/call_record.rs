//! Audit records for feature invocations and external requests.
//!
//! A [`CallRecord`] is opened immediately before a feature's update action
//! and concluded exactly once afterwards. Its id is content-derived from the
//! feature id, start time, triggering request and a process-local sequence
//! number, hashed with blake3.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::id::{CallRecordId, FeatureId, RequestId};

/// Number of hex characters in a record or request id.
pub const RECORD_ID_LEN: usize = 40;

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Exit status of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    Started,
    Done,
    Failed,
    Halted,
    Warning,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Started => "STARTED",
            CallStatus::Done => "DONE",
            CallStatus::Failed => "FAILED",
            CallStatus::Halted => "HALTED",
            CallStatus::Warning => "WARNING",
        }
    }

    /// Every status except `Started` is terminal.
    pub fn is_terminal(self) -> bool {
        self != CallStatus::Started
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(CallStatus::Started),
            "DONE" => Ok(CallStatus::Done),
            "FAILED" => Ok(CallStatus::Failed),
            "HALTED" => Ok(CallStatus::Halted),
            "WARNING" => Ok(CallStatus::Warning),
            other => Err(CoreError::InvalidConclusion {
                status: other.to_string(),
            }),
        }
    }
}

/// One invocation of a feature's update action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallRecordId,
    pub feature: FeatureId,
    /// The triggering request; `None` for root (user or scheduler) calls.
    pub request: Option<RequestId>,
    pub start_time: DateTime<Utc>,
    pub stop_time: Option<DateTime<Utc>>,
    pub status: CallStatus,
    /// Captured error text for failed invocations.
    #[serde(default)]
    pub info: Option<String>,
}

impl CallRecord {
    /// Opens a record in `STARTED` state at the current time.
    pub fn start(feature: FeatureId, request: Option<RequestId>) -> Self {
        Self::start_at(feature, request, Utc::now())
    }

    pub fn start_at(
        feature: FeatureId,
        request: Option<RequestId>,
        start_time: DateTime<Utc>,
    ) -> Self {
        let id = derive_record_id(&feature, start_time, request.as_ref());
        CallRecord {
            id,
            feature,
            request,
            start_time,
            stop_time: None,
            status: CallStatus::Started,
            info: None,
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.stop_time.is_some()
    }

    /// Concludes the record now. See [`CallRecord::conclude_at`].
    pub fn conclude(&mut self, status: CallStatus, info: Option<String>) -> Result<(), CoreError> {
        self.conclude_at(status, info, Utc::now())
    }

    /// Sets stop time, terminal status and info in one step.
    ///
    /// Fails if the record is already concluded or `status` is `Started`.
    /// A stop time earlier than the start time (clock skew) is clamped to
    /// the start time.
    pub fn conclude_at(
        &mut self,
        status: CallStatus,
        info: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if self.is_concluded() {
            return Err(CoreError::AlreadyConcluded {
                id: self.id.clone(),
            });
        }
        if !status.is_terminal() {
            return Err(CoreError::InvalidConclusion {
                status: status.to_string(),
            });
        }
        self.stop_time = Some(at.max(self.start_time));
        self.status = status;
        self.info = info;
        Ok(())
    }

    /// Wall-clock duration of a concluded record.
    pub fn elapsed(&self) -> Option<chrono::TimeDelta> {
        self.stop_time.map(|stop| stop - self.start_time)
    }
}

/// A persisted external request that triggered zero or more refreshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub time: DateTime<Utc>,
    pub remote: Option<String>,
    pub path: String,
    #[serde(default)]
    pub body: Value,
}

impl RequestRecord {
    pub fn new(path: impl Into<String>, remote: Option<String>, body: Value) -> Self {
        let time = Utc::now();
        let path = path.into();
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"request\0");
        hasher.update(time.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
        hasher.update(b"\0");
        hasher.update(remote.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
        hasher.update(&next_sequence().to_le_bytes());
        RequestRecord {
            id: RequestId(truncate_hex(&hasher.finalize())),
            time,
            remote,
            path,
            body,
        }
    }
}

fn next_sequence() -> u64 {
    RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

fn truncate_hex(hash: &blake3::Hash) -> String {
    hash.to_hex().as_str()[..RECORD_ID_LEN].to_string()
}

fn derive_record_id(
    feature: &FeatureId,
    start_time: DateTime<Utc>,
    request: Option<&RequestId>,
) -> CallRecordId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(feature.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(
        start_time
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    hasher.update(b"\0");
    if let Some(request) = request {
        hasher.update(request.as_str().as_bytes());
    }
    hasher.update(&next_sequence().to_le_bytes());
    CallRecordId(truncate_hex(&hasher.finalize()))
}
