//! Audit log entry model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cmdb_core::{BizId, CiDocument, ObjectType, TenantId};

use crate::topology::BizTopology;

/// Audit category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    ModelInstance,
    Host,
}

impl AuditType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditType::ModelInstance => "model_instance",
            AuditType::Host => "host",
        }
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model_instance" => Ok(AuditType::ModelInstance),
            "host" => Ok(AuditType::Host),
            _ => Err(format!("Invalid audit type: {s}")),
        }
    }
}

/// Kind of resource an entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    ModelInstance,
    Host,
}

impl ResourceType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::ModelInstance => "model_instance",
            ResourceType::Host => "host",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model_instance" => Ok(ResourceType::ModelInstance),
            "host" => Ok(ResourceType::Host),
            _ => Err(format!("Invalid resource type: {s}")),
        }
    }
}

/// Audited action verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Archive,
    Recover,
    /// Moved out of the default business into a real one.
    Assign,
    /// Moved back into the default business.
    Unassign,
    /// Moved between non-default containers.
    Transfer,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Archive => "archive",
            AuditAction::Recover => "recover",
            AuditAction::Assign => "assign",
            AuditAction::Unassign => "unassign",
            AuditAction::Transfer => "transfer",
        }
    }

    /// True for the topology verbs.
    #[must_use]
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            AuditAction::Assign | AuditAction::Unassign | AuditAction::Transfer
        )
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(AuditAction::Create),
            "update" => Ok(AuditAction::Update),
            "delete" => Ok(AuditAction::Delete),
            "archive" => Ok(AuditAction::Archive),
            "recover" => Ok(AuditAction::Recover),
            "assign" => Ok(AuditAction::Assign),
            "unassign" => Ok(AuditAction::Unassign),
            "transfer" => Ok(AuditAction::Transfer),
            _ => Err(format!("Invalid audit action: {s}")),
        }
    }
}

/// Attribute key and display name, used to render instance details.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuditHeader {
    pub property_id: String,
    pub property_name: String,
}

/// Detail of an instance or host attribute change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceOpDetail {
    pub object_type: ObjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_data: Option<CiDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cur_data: Option<CiDocument>,
    /// Keys written by an update.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_fields: Vec<String>,
    #[serde(default)]
    pub headers: Vec<AuditHeader>,
}

/// Detail of a host moving between topology nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostTransferOpDetail {
    #[serde(rename = "bk_host_id")]
    pub host_id: i64,
    #[serde(rename = "bk_host_innerip")]
    pub host_inner_ip: String,
    pub pre_data: BizTopology,
    pub cur_data: BizTopology,
}

/// Operation payload, by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum OperationDetail {
    Instance(InstanceOpDetail),
    HostTransfer(HostTransferOpDetail),
}

/// Immutable audit log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Sequence id, unique and increasing.
    pub id: i64,
    pub audit_type: AuditType,
    pub resource_type: ResourceType,
    pub action: AuditAction,
    pub tenant: TenantId,
    pub user: String,
    pub request_id: String,
    pub app_code: String,
    pub biz_id: BizId,
    pub resource_id: i64,
    pub resource_name: String,
    pub operation_detail: OperationDetail,
    pub operation_time: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Instance detail, if this is an attribute change.
    #[must_use]
    pub fn instance_detail(&self) -> Option<&InstanceOpDetail> {
        match &self.operation_detail {
            OperationDetail::Instance(detail) => Some(detail),
            OperationDetail::HostTransfer(_) => None,
        }
    }

    /// Transfer detail, if this is a topology change.
    #[must_use]
    pub fn transfer_detail(&self) -> Option<&HostTransferOpDetail> {
        match &self.operation_detail {
            OperationDetail::HostTransfer(detail) => Some(detail),
            OperationDetail::Instance(_) => None,
        }
    }
}
