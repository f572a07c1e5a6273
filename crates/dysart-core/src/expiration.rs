//! FRESH/EXPIRED policies.
//!
//! A policy is a side-effect-free predicate over a feature and its call
//! history. It never sees the graph; transitive staleness is the resolver's
//! job. Policies combine with the override flag and the "no results yet"
//! rule in [`effective_expired`], which no policy can bypass.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::feature::Feature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpirationStatus {
    Fresh,
    Expired,
}

/// Everything a policy may read.
#[derive(Debug, Clone, Copy)]
pub struct ExpirationInput<'a> {
    pub feature: &'a Feature,
    /// Stop time of the newest `DONE` call record for this feature.
    /// Failed attempts never count as a measurement.
    pub last_succeeded: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// A user-supplied expiration predicate attached at load time.
pub trait ExpirationHook: Send + Sync {
    fn evaluate(&self, input: &ExpirationInput<'_>) -> ExpirationStatus;
}

impl<F> ExpirationHook for F
where
    F: Fn(&ExpirationInput<'_>) -> ExpirationStatus + Send + Sync,
{
    fn evaluate(&self, input: &ExpirationInput<'_>) -> ExpirationStatus {
        self(input)
    }
}

/// The policy attached to one feature.
#[derive(Clone, Default)]
pub enum ExpirationPolicy {
    /// Only the override flag and missing results expire the feature.
    #[default]
    AlwaysFresh,
    AlwaysExpired,
    /// Expired once more than the given time has passed since the last
    /// successful call. Exactly-equal elapsed time is still fresh.
    Timeout(TimeDelta),
    Hook {
        name: String,
        hook: Arc<dyn ExpirationHook>,
    },
}

impl ExpirationPolicy {
    /// Builds a timeout policy from a std duration, saturating on overflow.
    pub fn timeout(duration: std::time::Duration) -> Self {
        ExpirationPolicy::Timeout(TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX))
    }

    /// Wraps a named closure as a hook policy.
    pub fn hook<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ExpirationInput<'_>) -> ExpirationStatus + Send + Sync + 'static,
    {
        ExpirationPolicy::Hook {
            name: name.into(),
            hook: Arc::new(f),
        }
    }

    pub fn evaluate(&self, input: &ExpirationInput<'_>) -> ExpirationStatus {
        match self {
            ExpirationPolicy::AlwaysFresh => ExpirationStatus::Fresh,
            ExpirationPolicy::AlwaysExpired => ExpirationStatus::Expired,
            ExpirationPolicy::Timeout(limit) => match input.last_succeeded {
                Some(stop) if input.now - stop > *limit => ExpirationStatus::Expired,
                Some(_) => ExpirationStatus::Fresh,
                None => ExpirationStatus::Expired,
            },
            ExpirationPolicy::Hook { hook, .. } => hook.evaluate(input),
        }
    }

    /// Whether evaluating this policy needs the feature's call history.
    pub fn reads_call_history(&self) -> bool {
        matches!(
            self,
            ExpirationPolicy::Timeout(_) | ExpirationPolicy::Hook { .. }
        )
    }

    pub fn name(&self) -> &str {
        match self {
            ExpirationPolicy::AlwaysFresh => "always_fresh",
            ExpirationPolicy::AlwaysExpired => "always_expired",
            ExpirationPolicy::Timeout(_) => "timeout",
            ExpirationPolicy::Hook { name, .. } => name,
        }
    }
}

impl fmt::Debug for ExpirationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpirationPolicy::Timeout(limit) => f.debug_tuple("Timeout").field(limit).finish(),
            ExpirationPolicy::Hook { name, .. } => {
                f.debug_struct("Hook").field("name", name).finish_non_exhaustive()
            }
            other => f.write_str(other.name()),
        }
    }
}

/// `override OR policy == EXPIRED OR no results`.
pub fn effective_expired(policy: &ExpirationPolicy, input: &ExpirationInput<'_>) -> bool {
    input.feature.is_overridden()
        || !input.feature.has_results()
        || policy.evaluate(input) == ExpirationStatus::Expired
}
