//! CMDB Instance Reconciliation
//!
//! Turns collector telemetry into CI records: resolves identity through the
//! model's must-check uniqueness rule, writes only what changed, and records
//! an append-only audit trail of every mutation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────────────────────────────────────────┐
//! │ MessageSource│───▶│ CollectorWorker (N concurrent, cancellable)   │
//! └──────────────┘    └───────────────┬───────────────────────────────┘
//!                                     │ raw message
//!                                     ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Reconciler                                                       │
//! │  IdentityResolver ─▶ CacheGateway ─▶ CiStore ─▶ DiffEngine        │
//! │                          ▲               │                        │
//! │                          └─ invalidate ◀─┘                        │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 ▼
//!                         AuditRecorder ◀── HostTransferAudit
//!                         (SequenceGenerator + AuditLogStore)
//! ```
//!
//! Store-side collaborators are traits ([`CiStore`], [`ModelMetadata`],
//! [`SequenceGenerator`], [`AuditLogStore`], [`HostRelationSource`],
//! [`TopologyNameSource`]); [`memory`] has process-local implementations.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cmdb_core::{ObjectType, TenantId};
//! use cmdb_reconcile::memory::{
//!     MemoryAuditLog, MemoryCiStore, MemoryModelMetadata, MemorySequenceGenerator,
//! };
//! use cmdb_reconcile::{
//!     AttributeMeta, AttributeType, AuditRecorder, ReconcileOutcome, Reconciler,
//!     ReconcilerConfig, ReconcilerDeps, RequestContext, UniqueRule,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let metadata = Arc::new(MemoryModelMetadata::new());
//! metadata
//!     .add_attribute(AttributeMeta::new(
//!         1,
//!         "bk_switch",
//!         "bk_inst_name",
//!         "Name",
//!         AttributeType::SingleChar,
//!     ))
//!     .await;
//! metadata
//!     .add_rule(UniqueRule {
//!         id: 1,
//!         object_type: ObjectType::from("bk_switch"),
//!         keys: vec![1],
//!         must_check: true,
//!     })
//!     .await;
//!
//! let config = ReconcilerConfig::default();
//! let reconciler = Reconciler::new(
//!     ReconcilerDeps {
//!         store: Arc::new(MemoryCiStore::new()),
//!         metadata,
//!         cache: config.cache_gateway(),
//!         audit: AuditRecorder::new(
//!             Arc::new(MemorySequenceGenerator::new()),
//!             Arc::new(MemoryAuditLog::new()),
//!         ),
//!     },
//!     &config,
//! );
//!
//! let raw = r#"{"data":{"meta":{"model":{"bk_obj_id":"bk_switch"}},"data":{"bk_inst_name":"sw-01"}}}"#;
//! let ctx = RequestContext::collector(TenantId::from("0"));
//!
//! let first = reconciler.reconcile_message(raw, &ctx).await.unwrap();
//! assert_eq!(first.outcome, ReconcileOutcome::Created);
//!
//! let second = reconciler.reconcile_message(raw, &ctx).await.unwrap();
//! assert_eq!(second.outcome, ReconcileOutcome::Unchanged);
//! # }
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod identity;
pub mod memory;
pub mod message;
pub mod metadata;
pub mod reconciler;
pub mod store;
pub mod topology;
pub mod worker;

pub use audit::{
    generate_audit_log, AuditAction, AuditError, AuditLogEntry, AuditLogStore, AuditRecorder,
    AuditSubject, AuditType, OperationDetail, ResourceType, SequenceGenerator,
};
pub use cache::{AdvisoryCache, CacheError, CacheGateway, MokaCache};
pub use config::{ConfigError, ReconcilerConfig};
pub use context::RequestContext;
pub use diff::{ChangeSet, DiffEngine};
pub use error::{ReconcileError, ReconcileResult};
pub use identity::{IdentityResolver, ResolvedIdentity};
pub use message::InboundMessage;
pub use metadata::{AttributeMeta, AttributeTable, AttributeType, ModelMetadata, UniqueRule};
pub use reconciler::{
    ReconcileOutcome, ReconcileReport, ReconcileState, Reconciler, ReconcilerDeps,
};
pub use store::{CiStore, StoreError, StoreResult};
pub use topology::{
    classify, classify_changes, HostModuleRelation, HostRelationSource, HostTransferAudit,
    TopologyAction, TopologyChange, TopologyNameSource,
};
pub use worker::{CollectorWorker, MessageSource, WorkerConfig, WorkerStatsSnapshot};
