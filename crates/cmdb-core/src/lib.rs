//! CMDB Core Library
//!
//! Shared types for the CMDB reconciliation and audit crates.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (TenantId, ObjectType, InstanceId, BizId)
//! - [`document`] - Schema-driven CI documents and well-known field names
//! - [`condition`] - Equality/membership conditions used to query CI stores
//! - [`error`] - Core error type (CoreError)
//!
//! # Example
//!
//! ```
//! use cmdb_core::{CiDocument, Condition, ObjectType, TenantId};
//! use serde_json::json;
//!
//! let doc = CiDocument::from_value(json!({
//!     "bk_obj_id": "bk_switch",
//!     "bk_supplier_account": "0",
//!     "bk_inst_name": "core-sw-01",
//! }))
//! .unwrap();
//!
//! let cond = Condition::new()
//!     .eq("bk_obj_id", "bk_switch")
//!     .eq("bk_inst_name", "core-sw-01");
//!
//! assert!(cond.matches(&doc));
//! assert_eq!(doc.object_type(), Some(ObjectType::from("bk_switch")));
//! assert_eq!(doc.tenant(), Some(TenantId::from("0")));
//! ```

pub mod condition;
pub mod document;
pub mod error;
pub mod ids;

pub use condition::{Condition, Predicate};
pub use document::{fields, key_string, CiDocument};
pub use error::{CoreError, Result};
pub use ids::{BizId, InstanceId, ObjectType, TenantId};
