//! Audit payload generation.
//!
//! Every auditable change is described by one [`AuditSubject`] variant and
//! turned into an entry by [`generate_audit_log`].

use chrono::{DateTime, Utc};

use cmdb_core::{BizId, CiDocument, InstanceId, ObjectType};

use crate::audit::entry::{
    AuditAction, AuditHeader, AuditLogEntry, AuditType, HostTransferOpDetail, InstanceOpDetail,
    OperationDetail, ResourceType,
};
use crate::audit::AuditError;
use crate::context::RequestContext;
use crate::topology::{BizTopology, TopologyChange};

/// Attribute-level change of a model instance or a host.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceAudit {
    pub action: AuditAction,
    pub object_type: ObjectType,
    pub biz_id: BizId,
    pub instance_id: InstanceId,
    pub resource_name: String,
    /// Stored document before the change.
    pub before: Option<CiDocument>,
    /// Stored document after the change.
    pub after: Option<CiDocument>,
    pub changed_fields: Vec<String>,
    pub headers: Vec<AuditHeader>,
}

/// Topology move of one host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRelationAudit {
    pub action: AuditAction,
    pub biz_id: BizId,
    pub host_id: i64,
    pub host_inner_ip: String,
    pub previous: BizTopology,
    pub current: BizTopology,
}

impl HostRelationAudit {
    /// Build from a classified topology change.
    #[must_use]
    pub fn from_change(change: TopologyChange, host_inner_ip: impl Into<String>) -> Self {
        Self {
            action: change.action.into(),
            biz_id: change.audit_biz_id,
            host_id: change.host_id,
            host_inner_ip: host_inner_ip.into(),
            previous: change.previous,
            current: change.current,
        }
    }
}

/// Closed set of auditable changes.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditSubject {
    /// Generic model instance.
    Instance(InstanceAudit),
    /// Host attributes.
    Host(InstanceAudit),
    /// Host topology membership.
    HostRelation(HostRelationAudit),
}

impl AuditSubject {
    #[must_use]
    pub fn action(&self) -> AuditAction {
        match self {
            AuditSubject::Instance(a) | AuditSubject::Host(a) => a.action,
            AuditSubject::HostRelation(r) => r.action,
        }
    }
}

/// An audit entry waiting for its sequence id.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditDraft {
    pub audit_type: AuditType,
    pub resource_type: ResourceType,
    pub action: AuditAction,
    pub biz_id: BizId,
    pub resource_id: i64,
    pub resource_name: String,
    pub operation_detail: OperationDetail,
    context: RequestContext,
}

impl AuditDraft {
    /// Finalize with an allocated id.
    #[must_use]
    pub fn into_entry(self, id: i64, operation_time: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            id,
            audit_type: self.audit_type,
            resource_type: self.resource_type,
            action: self.action,
            tenant: self.context.tenant,
            user: self.context.user,
            request_id: self.context.request_id,
            app_code: self.context.app_code,
            biz_id: self.biz_id,
            resource_id: self.resource_id,
            resource_name: self.resource_name,
            operation_detail: self.operation_detail,
            operation_time,
        }
    }
}

/// Build the audit draft for a change.
///
/// # Errors
///
/// Returns `InvalidPayload` when the snapshots do not fit the action:
/// create and recover need the after-image, delete and archive the
/// before-image, update both plus at least one changed field, and host
/// relations only accept the topology verbs.
pub fn generate_audit_log(
    subject: AuditSubject,
    ctx: &RequestContext,
) -> Result<AuditDraft, AuditError> {
    match subject {
        AuditSubject::Instance(audit) => {
            instance_draft(audit, AuditType::ModelInstance, ResourceType::ModelInstance, ctx)
        }
        AuditSubject::Host(audit) => instance_draft(audit, AuditType::Host, ResourceType::Host, ctx),
        AuditSubject::HostRelation(audit) => host_relation_draft(audit, ctx),
    }
}

fn instance_draft(
    audit: InstanceAudit,
    audit_type: AuditType,
    resource_type: ResourceType,
    ctx: &RequestContext,
) -> Result<AuditDraft, AuditError> {
    let InstanceAudit {
        action,
        object_type,
        biz_id,
        instance_id,
        resource_name,
        before,
        after,
        changed_fields,
        headers,
    } = audit;

    let (pre_data, cur_data, update_fields) = match action {
        AuditAction::Create | AuditAction::Recover => {
            let after = after.ok_or_else(|| missing(action, "after-image"))?;
            (None, Some(after), Vec::new())
        }
        AuditAction::Delete | AuditAction::Archive => {
            let before = before.ok_or_else(|| missing(action, "before-image"))?;
            (Some(before), None, Vec::new())
        }
        AuditAction::Update => {
            let before = before.ok_or_else(|| missing(action, "before-image"))?;
            if changed_fields.is_empty() {
                return Err(AuditError::InvalidPayload(
                    "update audit requires at least one changed field".to_string(),
                ));
            }
            (Some(before), after, changed_fields)
        }
        AuditAction::Assign | AuditAction::Unassign | AuditAction::Transfer => {
            return Err(AuditError::InvalidPayload(format!(
                "action {action} does not apply to {resource_type} attributes"
            )))
        }
    };

    Ok(AuditDraft {
        audit_type,
        resource_type,
        action,
        biz_id,
        resource_id: instance_id.get(),
        resource_name,
        operation_detail: OperationDetail::Instance(InstanceOpDetail {
            object_type,
            pre_data,
            cur_data,
            update_fields,
            headers,
        }),
        context: ctx.clone(),
    })
}

fn host_relation_draft(
    audit: HostRelationAudit,
    ctx: &RequestContext,
) -> Result<AuditDraft, AuditError> {
    if !audit.action.is_topology() {
        return Err(AuditError::InvalidPayload(format!(
            "action {} does not apply to host relations",
            audit.action
        )));
    }

    Ok(AuditDraft {
        audit_type: AuditType::Host,
        resource_type: ResourceType::Host,
        action: audit.action,
        biz_id: audit.biz_id,
        resource_id: audit.host_id,
        resource_name: audit.host_inner_ip.clone(),
        operation_detail: OperationDetail::HostTransfer(HostTransferOpDetail {
            host_id: audit.host_id,
            host_inner_ip: audit.host_inner_ip,
            pre_data: audit.previous,
            cur_data: audit.current,
        }),
        context: ctx.clone(),
    })
}

fn missing(action: AuditAction, what: &str) -> AuditError {
    AuditError::InvalidPayload(format!("{action} audit requires the {what}"))
}
