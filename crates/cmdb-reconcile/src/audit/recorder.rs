//! Audit recording: id allocation and append.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, instrument};

use cmdb_core::TenantId;

use crate::audit::entry::AuditLogEntry;
use crate::audit::generator::{generate_audit_log, AuditSubject};
use crate::audit::AuditError;
use crate::context::RequestContext;
use crate::store::{StoreError, StoreResult};

/// Sequence name used for audit log ids.
pub const AUDIT_SEQUENCE: &str = "cc_AuditLog";

/// Maximum length of a recorded resource name, in characters.
pub const DEFAULT_RESOURCE_NAME_MAX_LEN: usize = 256;

/// Atomic, monotonic id allocation.
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    /// Allocate `count` increasing ids from the named sequence.
    async fn next_ids(&self, tenant: &TenantId, name: &str, count: usize) -> StoreResult<Vec<i64>>;
}

/// Append-only audit log.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append(&self, entries: &[AuditLogEntry]) -> StoreResult<()>;
}

/// Truncate to at most `max_len` characters.
#[must_use]
pub fn truncate_name(name: &str, max_len: usize) -> String {
    match name.char_indices().nth(max_len) {
        Some((byte_idx, _)) => name[..byte_idx].to_string(),
        None => name.to_string(),
    }
}

/// Builds audit entries, assigns their ids and appends them.
#[derive(Clone)]
pub struct AuditRecorder {
    sequences: Arc<dyn SequenceGenerator>,
    log: Arc<dyn AuditLogStore>,
    name_max_len: usize,
}

impl AuditRecorder {
    #[must_use]
    pub fn new(sequences: Arc<dyn SequenceGenerator>, log: Arc<dyn AuditLogStore>) -> Self {
        Self {
            sequences,
            log,
            name_max_len: DEFAULT_RESOURCE_NAME_MAX_LEN,
        }
    }

    /// Override the resource name limit.
    #[must_use]
    pub fn with_name_max_len(mut self, name_max_len: usize) -> Self {
        self.name_max_len = name_max_len;
        self
    }

    /// Record a single change.
    pub async fn record(
        &self,
        subject: AuditSubject,
        ctx: &RequestContext,
    ) -> Result<AuditLogEntry, AuditError> {
        let mut entries = self.record_batch(vec![subject], ctx).await?;
        entries
            .pop()
            .ok_or_else(|| AuditError::InvalidPayload("no audit entry produced".to_string()))
    }

    /// Record the changes of one logical operation under contiguous ids.
    ///
    /// Allocated ids are consumed even if the append fails.
    #[instrument(skip(self, subjects, ctx), fields(rid = %ctx.request_id, count = subjects.len()))]
    pub async fn record_batch(
        &self,
        subjects: Vec<AuditSubject>,
        ctx: &RequestContext,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        if subjects.is_empty() {
            return Ok(Vec::new());
        }

        let drafts = subjects
            .into_iter()
            .map(|subject| generate_audit_log(subject, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        let ids = self
            .sequences
            .next_ids(&ctx.tenant, AUDIT_SEQUENCE, drafts.len())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to allocate audit log ids");
                AuditError::Sequence(e)
            })?;

        if ids.len() != drafts.len() {
            error!(
                requested = drafts.len(),
                allocated = ids.len(),
                "Sequence generator returned the wrong number of ids"
            );
            return Err(AuditError::Sequence(StoreError::backend(format!(
                "requested {} ids, got {}",
                drafts.len(),
                ids.len()
            ))));
        }

        let now = Utc::now();
        let entries: Vec<AuditLogEntry> = drafts
            .into_iter()
            .zip(ids)
            .map(|(mut draft, id)| {
                draft.resource_name = truncate_name(&draft.resource_name, self.name_max_len);
                draft.into_entry(id, now)
            })
            .collect();

        self.log.append(&entries).await.map_err(|e| {
            error!(error = %e, "Failed to append audit log entries");
            AuditError::Append(e)
        })?;

        debug!(
            first_id = entries.first().map(|e| e.id),
            "Audit log entries appended"
        );
        Ok(entries)
    }
}
