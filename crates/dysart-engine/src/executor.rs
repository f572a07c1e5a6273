//! The refresh executor.
//!
//! [`Laboratory::refresh`] brings a feature and all of its stale ancestors
//! up to date. Each stale feature is updated exactly once per pass, strictly
//! sequentially and in resolver order, inside its own [`CallRecord`]:
//!
//! 1. open the record (`STARTED`) and persist it
//! 2. run the pre-hook; a failure concludes `FAILED` and aborts the pass
//! 3. hold the rig lock for the whole update action
//! 4. on success: append the snapshot, clear the override, persist the
//!    feature, then conclude `DONE`
//! 5. on failure (including a failed save in step 4): conclude `FAILED`
//!    with the error text, leave the feature untouched, abort the pass
//! 6. run the post-hook; its failure is logged and reported only
//!
//! There is no cancellation: a hung update blocks its pass.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use dysart_core::{CallRecord, CallStatus, FeatureId, RequestId, Snapshot};

use crate::error::EngineError;
use crate::hooks::{Attachments, NamedHook};
use crate::instrument::InstrumentHandle;
use crate::kind::{FeatureKind, ParentView, UpdateContext};
use crate::lab::Laboratory;

/// A post-hook that failed after its record was concluded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HookFailure {
    pub feature: FeatureId,
    pub hook: String,
    pub message: String,
}

/// What one refresh pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    /// Concluded records of the updates run, in execution order.
    pub executed: Vec<CallRecord>,
    pub hook_failures: Vec<HookFailure>,
}

impl RefreshReport {
    pub fn update_count(&self) -> usize {
        self.executed.len()
    }

    pub fn updated_features(&self) -> Vec<&FeatureId> {
        self.executed.iter().map(|r| &r.feature).collect()
    }
}

impl Laboratory {
    /// Refreshes `id` and every stale ancestor, ancestors first.
    ///
    /// `trigger` is the request that caused the pass, `None` for root
    /// calls. The first failing update or pre-hook aborts the pass and is
    /// returned; features already refreshed earlier in the pass stay
    /// refreshed.
    pub async fn refresh(
        &mut self,
        id: &FeatureId,
        trigger: Option<&RequestId>,
    ) -> Result<RefreshReport, EngineError> {
        let stale = self.stale_set(id)?;
        let mut report = RefreshReport::default();
        if stale.is_empty() {
            tracing::debug!(feature = %id, "already fresh");
            return Ok(report);
        }

        tracing::info!(feature = %id, stale = stale.len(), "refresh pass started");
        for node in &stale {
            let record = self.execute(node, trigger, &mut report).await?;
            report.executed.push(record);
        }
        tracing::info!(feature = %id, updated = report.update_count(), "refresh pass finished");
        Ok(report)
    }

    async fn execute(
        &mut self,
        id: &FeatureId,
        trigger: Option<&RequestId>,
        report: &mut RefreshReport,
    ) -> Result<CallRecord, EngineError> {
        let kind = self.registered_kind(id)?.kind.clone();
        let attachments = self.attachments.get(id).cloned().unwrap_or_default();
        let mut record = CallRecord::start(id.clone(), trigger.cloned());
        let ctx = self.update_context(id, record.clone())?;
        self.store.save_call_record(&record)?;
        tracing::info!(feature = %id, record = %record.id.short(), "update started");

        let outcome = match run_update(
            id,
            kind,
            attachments.pre_hook.clone(),
            self.instrument.clone(),
            &ctx,
        )
        .await
        {
            Ok(snapshot) => self.install_result(id, snapshot),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                record.conclude(CallStatus::Done, None)?;
                self.store.save_call_record(&record)?;
                tracing::info!(feature = %id, record = %record.id.short(), "update done");
                self.keep_parent_derivations(ctx);
                run_post_hook(&attachments, &record, report).await;
                Ok(record)
            }
            Err(err) => {
                tracing::error!(feature = %id, record = %record.id.short(), error = %err, "update failed");
                record.conclude(CallStatus::Failed, Some(err.to_string()))?;
                if let Err(save_err) = self.store.save_call_record(&record) {
                    tracing::error!(
                        feature = %id,
                        record = %record.id.short(),
                        error = %save_err,
                        "could not conclude record"
                    );
                }
                run_post_hook(&attachments, &record, report).await;
                Err(err)
            }
        }
    }

    /// Appends the new snapshot and consumes the override. Persisted before
    /// the record is concluded, so a crash here leaves a STARTED record.
    fn install_result(&mut self, id: &FeatureId, snapshot: Snapshot) -> Result<(), EngineError> {
        let mut updated = self.graph.feature(id)?.clone();
        updated.record_result(snapshot);
        updated.set_override(false);
        self.commit(updated)
    }

    /// Saves accessor values the update derived on its parents.
    fn keep_parent_derivations(&mut self, ctx: UpdateContext) {
        for parent in ctx.into_derived_parents() {
            let parent_id = parent.id().clone();
            if let Err(err) = self.commit(parent) {
                tracing::warn!(feature = %parent_id, error = %err, "derived parent values not saved");
            }
        }
    }

    /// Owned inputs for one update action: the feature and its parents as
    /// they are right now (already refreshed earlier in this pass).
    fn update_context(&self, id: &FeatureId, record: CallRecord) -> Result<UpdateContext, EngineError> {
        let feature = self.graph.feature(id)?.clone();
        let mut parents = IndexMap::new();
        for (role, parent) in self.graph.parents(id)? {
            let kind = self.registered_kind(parent.id())?.kind.clone();
            parents.insert(
                role,
                ParentView {
                    feature: parent.clone(),
                    kind,
                },
            );
        }
        Ok(UpdateContext::new(
            feature,
            parents,
            self.instrument.instrument(),
            record,
        ))
    }
}

async fn run_update(
    id: &FeatureId,
    kind: Arc<dyn FeatureKind>,
    pre_hook: Option<NamedHook>,
    instrument: InstrumentHandle,
    ctx: &UpdateContext,
) -> Result<Snapshot, EngineError> {
    if let Some(pre) = pre_hook {
        pre.hook
            .call(ctx.record())
            .await
            .map_err(|source| EngineError::PreHook {
                feature: id.clone(),
                hook: pre.name.clone(),
                source,
            })?;
    }
    let _rig = instrument.acquire().await;
    kind.update(ctx)
        .await
        .map_err(|source| EngineError::Update {
            feature: id.clone(),
            source,
        })
}

async fn run_post_hook(attachments: &Attachments, record: &CallRecord, report: &mut RefreshReport) {
    let Some(post) = &attachments.post_hook else {
        return;
    };
    if let Err(err) = post.hook.call(record).await {
        tracing::warn!(
            feature = %record.feature,
            record = %record.id.short(),
            hook = %post.name,
            error = %err,
            "post-hook failed"
        );
        report.hook_failures.push(HookFailure {
            feature: record.feature.clone(),
            hook: post.name.clone(),
            message: err.to_string(),
        });
    }
}
