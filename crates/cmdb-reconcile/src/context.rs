//! Request Context
//!
//! Ambient identity of whoever triggered a mutation. Passed explicitly to
//! every reconciliation and copied into the audit entries it produces.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cmdb_core::TenantId;

/// System user recorded for collector-driven changes.
pub const COLLECTOR_USER: &str = "cc_collector";

/// Owner used when a message does not name one.
pub const DEFAULT_TENANT: &str = "0";

/// Acting tenant, user, request id and client application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant: TenantId,
    pub user: String,
    pub request_id: String,
    pub app_code: String,
}

impl RequestContext {
    /// Context with a fresh request id.
    #[must_use]
    pub fn new(tenant: TenantId, user: impl Into<String>, app_code: impl Into<String>) -> Self {
        Self {
            tenant,
            user: user.into(),
            request_id: Uuid::new_v4().simple().to_string(),
            app_code: app_code.into(),
        }
    }

    /// Context of the passive collector acting for `tenant`.
    #[must_use]
    pub fn collector(tenant: TenantId) -> Self {
        Self::new(tenant, COLLECTOR_USER, COLLECTOR_USER)
    }

    /// Same actor and request, different tenant.
    #[must_use]
    pub fn with_tenant(&self, tenant: TenantId) -> Self {
        Self {
            tenant,
            ..self.clone()
        }
    }

    /// Replace the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_context() {
        let ctx = RequestContext::collector(TenantId::from(DEFAULT_TENANT));
        assert_eq!(ctx.user, COLLECTOR_USER);
        assert_eq!(ctx.tenant.as_str(), "0");
        assert_eq!(ctx.request_id.len(), 32);
    }

    #[test]
    fn test_with_tenant_keeps_request() {
        let ctx = RequestContext::collector(TenantId::from("0")).with_request_id("rid-1");
        let other = ctx.with_tenant(TenantId::from("tenant-b"));
        assert_eq!(other.request_id, "rid-1");
        assert_eq!(other.tenant.as_str(), "tenant-b");
        assert_eq!(other.user, ctx.user);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::collector(TenantId::from("0"));
        let b = RequestContext::collector(TenantId::from("0"));
        assert_ne!(a.request_id, b.request_id);
    }
}
