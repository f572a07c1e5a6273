//! Identifier newtypes.
//!
//! Every identifier is a distinct wrapper over `String` so that a
//! [`FeatureId`] cannot be passed where a [`CallRecordId`] is expected.
//! All three serialize transparently as plain strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, externally visible feature identity (primary key in storage).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(pub String);

/// Content-derived identity of a [`crate::CallRecord`]: lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallRecordId(pub String);

/// Identity of a persisted external request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        FeatureId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl CallRecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The leading 16 characters, enough for humans to quote back.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(16);
        &self.0[..end]
    }

    /// Case-insensitive prefix match, as used by audit lookups.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.0.len() >= prefix.len()
            && self.0[..prefix.len()].eq_ignore_ascii_case(prefix)
    }
}

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FeatureId {
    fn from(s: &str) -> Self {
        FeatureId(s.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(s: String) -> Self {
        FeatureId(s)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CallRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
