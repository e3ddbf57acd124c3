//! Reconciler
//!
//! Drives one inbound message through
//! `Resolving -> LookingUp -> {Creating | Diffing -> Updating} -> Done`
//! (terminal `Failed` on error):
//!
//! 1. Resolve the CI identity from the must-check uniqueness rule.
//! 2. Look the CI up in the cache, then the store (filling the cache).
//! 3. Create it when absent, or write only the changed attributes.
//! 4. Invalidate the cache entry after an update.
//! 5. Record an audit entry. Audit failures never undo the write.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn, Span};

use cmdb_core::{fields, CiDocument, Condition, InstanceId, ObjectType, TenantId};

use crate::audit::{
    AuditAction, AuditError, AuditHeader, AuditRecorder, AuditSubject, InstanceAudit,
};
use crate::cache::CacheGateway;
use crate::config::ReconcilerConfig;
use crate::context::RequestContext;
use crate::diff::{apply, DiffEngine};
use crate::error::ReconcileResult;
use crate::identity::{IdentityResolver, ResolvedIdentity};
use crate::message::InboundMessage;
use crate::metadata::{AttributeTable, ModelMetadata};
use crate::store::{CiStore, StoreError};

/// Object type whose audit entries are filed as host changes.
pub const HOST_OBJECT_TYPE: &str = "host";

/// Collaborators of the reconciler.
#[derive(Clone)]
pub struct ReconcilerDeps {
    pub store: Arc<dyn CiStore>,
    pub metadata: Arc<dyn ModelMetadata>,
    pub cache: CacheGateway,
    pub audit: AuditRecorder,
}

/// Reconciliation state, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Resolving,
    LookingUp,
    Creating,
    Diffing,
    Updating,
    Done,
    Failed,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconcileState::Resolving => "resolving",
            ReconcileState::LookingUp => "looking_up",
            ReconcileState::Creating => "creating",
            ReconcileState::Diffing => "diffing",
            ReconcileState::Updating => "updating",
            ReconcileState::Done => "done",
            ReconcileState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What happened to the CI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Result of a successful reconciliation.
#[derive(Debug)]
pub struct ReconcileReport {
    pub object_type: ObjectType,
    pub tenant: TenantId,
    pub instance_id: InstanceId,
    pub outcome: ReconcileOutcome,
    /// Attributes written by an update, sorted.
    pub changed_fields: Vec<String>,
    /// Id of the audit entry, when one was recorded.
    pub audit_id: Option<i64>,
    /// Audit failure that did not undo the write.
    pub audit_error: Option<AuditError>,
}

/// Reconciles inbound CI descriptions against the store.
pub struct Reconciler {
    store: Arc<dyn CiStore>,
    metadata: Arc<dyn ModelMetadata>,
    cache: CacheGateway,
    audit: AuditRecorder,
    resolver: IdentityResolver,
    diff: DiffEngine,
}

impl Reconciler {
    #[must_use]
    pub fn new(deps: ReconcilerDeps, config: &ReconcilerConfig) -> Self {
        let resolver = IdentityResolver::new(Arc::clone(&deps.metadata));
        Self {
            store: deps.store,
            metadata: deps.metadata,
            cache: deps.cache,
            audit: deps.audit.with_name_max_len(config.audit_name_max_len),
            resolver,
            diff: DiffEngine::new(config.relation_attribute.clone()),
        }
    }

    /// Parse and reconcile a raw collector message.
    ///
    /// The context tenant is replaced by the message's owner.
    pub async fn reconcile_message(
        &self,
        raw: &str,
        ctx: &RequestContext,
    ) -> ReconcileResult<ReconcileReport> {
        let message = InboundMessage::parse(raw).map_err(|e| {
            warn!(rid = %ctx.request_id, error = %e, "Dropping malformed message");
            e
        })?;
        let ctx = ctx.with_tenant(message.tenant.clone());
        self.reconcile(&message, &ctx).await
    }

    /// Reconcile one inbound document.
    #[instrument(
        skip(self, message, ctx),
        fields(
            object_type = %message.object_type,
            tenant = %message.tenant,
            rid = %ctx.request_id,
            instance_id = tracing::field::Empty,
        )
    )]
    pub async fn reconcile(
        &self,
        message: &InboundMessage,
        ctx: &RequestContext,
    ) -> ReconcileResult<ReconcileReport> {
        match self.run(message, ctx).await {
            Ok(report) => {
                debug!(state = %ReconcileState::Done, outcome = ?report.outcome, "Reconciliation finished");
                Ok(report)
            }
            Err(e) => {
                if e.is_dropped() {
                    warn!(state = %ReconcileState::Failed, error = %e, code = e.error_code(), "Message dropped");
                } else {
                    error!(state = %ReconcileState::Failed, error = %e, code = e.error_code(), "Reconciliation failed");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        message: &InboundMessage,
        ctx: &RequestContext,
    ) -> ReconcileResult<ReconcileReport> {
        let object_type = &message.object_type;
        let tenant = &message.tenant;

        debug!(state = %ReconcileState::Resolving, "Resolving identity");
        let attributes =
            AttributeTable::new(self.metadata.attributes(object_type, tenant).await?);
        let identity = self
            .resolver
            .resolve(object_type, tenant, &message.document, &attributes)
            .await?;

        debug!(state = %ReconcileState::LookingUp, cache_key = %identity.cache_key, "Looking up instance");
        match self.lookup(&identity).await? {
            None => self.create(message, &attributes, ctx).await,
            Some(existing) => {
                self.update(message, &identity, existing, &attributes, ctx)
                    .await
            }
        }
    }

    async fn lookup(&self, identity: &ResolvedIdentity) -> ReconcileResult<Option<CiDocument>> {
        if let Some(cached) = self.cache.get(&identity.cache_key).await {
            return Ok(Some(cached));
        }

        let found = self
            .store
            .read_one(&identity.object_type, &identity.condition)
            .await?;
        if let Some(document) = &found {
            self.cache.set(&identity.cache_key, document).await;
        }
        Ok(found)
    }

    async fn create(
        &self,
        message: &InboundMessage,
        attributes: &AttributeTable,
        ctx: &RequestContext,
    ) -> ReconcileResult<ReconcileReport> {
        debug!(state = %ReconcileState::Creating, "Creating instance");

        let mut document = message.document.clone();
        document.insert(
            fields::OBJECT_TYPE,
            Value::String(message.object_type.to_string()),
        );
        document.insert(fields::TENANT, Value::String(message.tenant.to_string()));
        document.remove(fields::INSTANCE_ID);

        let instance_id = self.store.create(&message.object_type, &document).await?;
        Span::current().record("instance_id", instance_id.get());
        document.insert(fields::INSTANCE_ID, Value::from(instance_id.get()));

        info!(instance_id = instance_id.get(), "Instance created");

        let subject = self.instance_subject(
            AuditAction::Create,
            &message.object_type,
            instance_id,
            None,
            document,
            Vec::new(),
            attributes,
        );
        let (audit_id, audit_error) = self.record_audit(subject, ctx).await;

        Ok(ReconcileReport {
            object_type: message.object_type.clone(),
            tenant: message.tenant.clone(),
            instance_id,
            outcome: ReconcileOutcome::Created,
            changed_fields: Vec::new(),
            audit_id,
            audit_error,
        })
    }

    async fn update(
        &self,
        message: &InboundMessage,
        identity: &ResolvedIdentity,
        existing: CiDocument,
        attributes: &AttributeTable,
        ctx: &RequestContext,
    ) -> ReconcileResult<ReconcileReport> {
        let instance_id = existing.instance_id().ok_or_else(|| {
            StoreError::backend(format!(
                "stored {} instance has no {}",
                message.object_type,
                fields::INSTANCE_ID
            ))
        })?;
        Span::current().record("instance_id", instance_id.get());

        debug!(state = %ReconcileState::Diffing, "Diffing against stored instance");
        let changes = self.diff.diff(&existing, &message.document, attributes);

        if changes.is_empty() {
            info!(instance_id = instance_id.get(), "Instance unchanged");
            return Ok(ReconcileReport {
                object_type: message.object_type.clone(),
                tenant: message.tenant.clone(),
                instance_id,
                outcome: ReconcileOutcome::Unchanged,
                changed_fields: Vec::new(),
                audit_id: None,
                audit_error: None,
            });
        }

        let changed_fields = changes.field_names();
        debug!(state = %ReconcileState::Updating, fields = ?changed_fields, "Updating instance");

        let condition = Condition::instance(&message.object_type, &message.tenant, instance_id);
        let matched = self
            .store
            .update_by_condition(&message.object_type, &condition, changes.as_document())
            .await?;
        if matched == 0 {
            self.cache.invalidate(&identity.cache_key).await;
            return Err(StoreError::backend(format!(
                "instance {instance_id} of {} vanished before update",
                message.object_type
            ))
            .into());
        }

        self.cache.invalidate(&identity.cache_key).await;
        info!(
            instance_id = instance_id.get(),
            changed = changed_fields.len(),
            "Instance updated"
        );

        let after = apply(&existing, &changes);
        let subject = self.instance_subject(
            AuditAction::Update,
            &message.object_type,
            instance_id,
            Some(existing),
            after,
            changed_fields.clone(),
            attributes,
        );
        let (audit_id, audit_error) = self.record_audit(subject, ctx).await;

        Ok(ReconcileReport {
            object_type: message.object_type.clone(),
            tenant: message.tenant.clone(),
            instance_id,
            outcome: ReconcileOutcome::Updated,
            changed_fields,
            audit_id,
            audit_error,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn instance_subject(
        &self,
        action: AuditAction,
        object_type: &ObjectType,
        instance_id: InstanceId,
        before: Option<CiDocument>,
        after: CiDocument,
        changed_fields: Vec<String>,
        attributes: &AttributeTable,
    ) -> AuditSubject {
        let is_host = object_type.as_str() == HOST_OBJECT_TYPE;
        let name_field = if is_host {
            fields::HOST_INNER_IP
        } else {
            fields::INSTANCE_NAME
        };
        let resource_name = after
            .key_value(name_field)
            .unwrap_or_else(|| instance_id.to_string());

        let mut headers: Vec<AuditHeader> = attributes
            .iter()
            .map(|attr| AuditHeader {
                property_id: attr.property_id.clone(),
                property_name: attr.property_name.clone(),
            })
            .collect();
        headers.sort();

        let audit = InstanceAudit {
            action,
            object_type: object_type.clone(),
            biz_id: after.biz_id(),
            instance_id,
            resource_name,
            before,
            after: Some(after),
            changed_fields,
            headers,
        };

        if is_host {
            AuditSubject::Host(audit)
        } else {
            AuditSubject::Instance(audit)
        }
    }

    async fn record_audit(
        &self,
        subject: AuditSubject,
        ctx: &RequestContext,
    ) -> (Option<i64>, Option<AuditError>) {
        match self.audit.record(subject, ctx).await {
            Ok(entry) => (Some(entry.id), None),
            Err(e) => {
                error!(error = %e, "Audit recording failed, change is kept");
                (None, Some(e))
            }
        }
    }
}
