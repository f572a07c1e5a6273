//! Refresh hooks.
//!
//! Hooks run around a feature's update action: the pre-hook after the
//! call record is opened (a failure vetoes the update), the post-hook after
//! the record is concluded (a failure is only logged and reported). All
//! hooks share one asynchronous calling contract.

use std::sync::Arc;

use async_trait::async_trait;
use dysart_core::CallRecord;

use crate::error::HookError;

#[async_trait]
pub trait RefreshHook: Send + Sync {
    async fn call(&self, record: &CallRecord) -> Result<(), HookError>;
}

/// A hook together with the name it was registered under.
#[derive(Clone)]
pub struct NamedHook {
    pub name: String,
    pub hook: Arc<dyn RefreshHook>,
}

impl std::fmt::Debug for NamedHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedHook").field("name", &self.name).finish()
    }
}

/// Pre/post hooks attached to one feature.
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    pub pre_hook: Option<NamedHook>,
    pub post_hook: Option<NamedHook>,
}

/// Emits one log event per call record it sees.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHook;

#[async_trait]
impl RefreshHook for LogHook {
    async fn call(&self, record: &CallRecord) -> Result<(), HookError> {
        tracing::info!(
            feature = %record.feature,
            record = %record.id.short(),
            status = %record.status,
            "refresh hook"
        );
        Ok(())
    }
}
