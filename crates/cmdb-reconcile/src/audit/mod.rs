//! Change Audit
//!
//! Append-only record of who changed what, when, and in which business.
//!
//! - [`entry`] - Entry model and action/type enums
//! - [`generator`] - Payload construction per auditable change
//! - [`recorder`] - Id allocation and append

pub mod entry;
pub mod generator;
pub mod recorder;

use thiserror::Error;

use crate::store::StoreError;

pub use entry::{
    AuditAction, AuditHeader, AuditLogEntry, AuditType, HostTransferOpDetail, InstanceOpDetail,
    OperationDetail, ResourceType,
};
pub use generator::{
    generate_audit_log, AuditDraft, AuditSubject, HostRelationAudit, InstanceAudit,
};
pub use recorder::{
    truncate_name, AuditLogStore, AuditRecorder, SequenceGenerator, AUDIT_SEQUENCE,
    DEFAULT_RESOURCE_NAME_MAX_LEN,
};

/// Errors raised while recording audit entries.
///
/// Never unwinds the audited mutation.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to allocate audit ids: {0}")]
    Sequence(#[source] StoreError),

    #[error("Failed to append audit entries: {0}")]
    Append(#[source] StoreError),

    #[error("Invalid audit payload: {0}")]
    InvalidPayload(String),
}
