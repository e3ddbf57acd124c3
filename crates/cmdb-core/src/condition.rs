//! Query conditions
//!
//! Conditions are conjunctions of equality and membership predicates over
//! attribute identifiers. Store adapters compile them to their native query
//! language; [`Condition::matches`] evaluates them in memory.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{fields, CiDocument};
use crate::ids::{InstanceId, ObjectType, TenantId};

/// A single predicate over one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Attribute equals value.
    Equals { field: String, value: Value },

    /// Attribute equals one of the values.
    In { field: String, values: Vec<Value> },
}

impl Predicate {
    /// The attribute this predicate constrains.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Predicate::Equals { field, .. } | Predicate::In { field, .. } => field,
        }
    }

    /// Evaluate the predicate against a document.
    #[must_use]
    pub fn matches(&self, document: &CiDocument) -> bool {
        match self {
            Predicate::Equals { field, value } => document.get(field) == Some(value),
            Predicate::In { field, values } => document
                .get(field)
                .is_some_and(|actual| values.contains(actual)),
        }
    }
}

/// Conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    predicates: Vec<Predicate>,
}

impl Condition {
    /// Create an empty condition (matches everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Condition scoped to one object type within one tenant.
    #[must_use]
    pub fn scoped(object_type: &ObjectType, tenant: &TenantId) -> Self {
        Self::new()
            .eq(fields::OBJECT_TYPE, object_type.as_str())
            .eq(fields::TENANT, tenant.as_str())
    }

    /// Condition selecting one persisted instance.
    #[must_use]
    pub fn instance(object_type: &ObjectType, tenant: &TenantId, id: InstanceId) -> Self {
        Self::scoped(object_type, tenant).eq(fields::INSTANCE_ID, id.get())
    }

    /// Add an equality predicate.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Add a membership predicate.
    #[must_use]
    pub fn is_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.predicates.push(Predicate::In {
            field: field.into(),
            values,
        });
        self
    }

    /// The predicates, in insertion order.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// True if there are no predicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// The value required by the first equality predicate on `field`.
    #[must_use]
    pub fn equals_value(&self, field: &str) -> Option<&Value> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::Equals { field: f, value } if f == field => Some(value),
            _ => None,
        })
    }

    /// Evaluate every predicate against a document.
    #[must_use]
    pub fn matches(&self, document: &CiDocument) -> bool {
        self.predicates.iter().all(|p| p.matches(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host() -> CiDocument {
        CiDocument::from_value(json!({
            "bk_obj_id": "host",
            "bk_supplier_account": "0",
            "bk_inst_id": 3,
            "bk_host_innerip": "10.0.0.1",
            "bk_cloud_id": 0
        }))
        .unwrap()
    }

    #[test]
    fn test_scoped_condition_matches() {
        let cond = Condition::scoped(&ObjectType::from("host"), &TenantId::from("0"))
            .eq("bk_host_innerip", "10.0.0.1")
            .eq("bk_cloud_id", 0);
        assert!(cond.matches(&host()));
        assert_eq!(cond.predicates().len(), 4);
    }

    #[test]
    fn test_condition_is_type_strict() {
        let cond = Condition::new().eq("bk_cloud_id", "0");
        assert!(!cond.matches(&host()));
    }

    #[test]
    fn test_membership_predicate() {
        let cond = Condition::new().is_in("bk_inst_id", vec![json!(1), json!(3)]);
        assert!(cond.matches(&host()));

        let cond = Condition::new().is_in("bk_inst_id", vec![json!(1), json!(2)]);
        assert!(!cond.matches(&host()));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let cond = Condition::new().eq("vendor", "acme");
        assert!(!cond.matches(&host()));
        assert!(Condition::new().matches(&host()));
    }

    #[test]
    fn test_instance_condition() {
        let cond = Condition::instance(
            &ObjectType::from("host"),
            &TenantId::from("0"),
            InstanceId::new(3),
        );
        assert_eq!(cond.equals_value("bk_inst_id"), Some(&json!(3)));
        assert!(cond.matches(&host()));
        assert_eq!(cond.predicates()[2].field(), "bk_inst_id");
    }
}
