//! Diff Engine
//!
//! Computes the minimal set of attributes to write when an inbound document
//! describes an already persisted CI.
//!
//! Rules:
//! - Sparse: attributes absent from the inbound document are left alone.
//! - Store-managed attributes never appear in a change set.
//! - Comparison follows the declared attribute type when one is known.
//! - The relation attribute is first-write-wins: it is only written while
//!   the stored relation is empty.

use serde_json::Value;
use tracing::warn;

use cmdb_core::{fields, CiDocument};

use crate::metadata::{AttributeTable, AttributeType};

/// Default relation attribute carried by collector messages.
pub const DEFAULT_RELATION_ATTRIBUTE: &str = "host";

/// Attributes to write on an existing CI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: CiDocument,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Changed attribute keys, sorted.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.changes.keys().cloned().collect();
        names.sort();
        names
    }

    /// The changed attributes with their new values.
    #[must_use]
    pub fn as_document(&self) -> &CiDocument {
        &self.changes
    }

    #[must_use]
    pub fn into_document(self) -> CiDocument {
        self.changes
    }

    fn insert(&mut self, field: &str, value: &Value) {
        self.changes.insert(field, value.clone());
    }
}

/// Shape of a stored relation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationState {
    /// Nothing is related yet.
    Empty,
    /// A relation is already recorded.
    Occupied,
    /// The stored value has a shape the engine does not understand.
    Unrecognised,
}

/// Classify a relation value.
///
/// Empty means absent, null, `""`, `0`, `"0"`, `[]`, or a single-element
/// array whose element has an empty or zero `id`.
#[must_use]
pub fn relation_state(value: Option<&Value>) -> RelationState {
    match value {
        None => RelationState::Empty,
        Some(Value::Array(items)) => match items.as_slice() {
            [] => RelationState::Empty,
            [single] => element_state(single),
            _ => RelationState::Occupied,
        },
        Some(other) => element_state(other),
    }
}

fn element_state(value: &Value) -> RelationState {
    match value {
        Value::Object(obj) => match obj.get("id") {
            Some(id) => scalar_state(id),
            None => RelationState::Unrecognised,
        },
        other => scalar_state(other),
    }
}

fn scalar_state(value: &Value) -> RelationState {
    match value {
        Value::Null => RelationState::Empty,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == "0" {
                RelationState::Empty
            } else {
                RelationState::Occupied
            }
        }
        Value::Number(n) => {
            if n.as_f64() == Some(0.0) {
                RelationState::Empty
            } else {
                RelationState::Occupied
            }
        }
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => RelationState::Unrecognised,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn same_elements(a: &[Value], b: &[Value]) -> bool {
    a.iter().all(|x| b.contains(x)) && b.iter().all(|x| a.contains(x))
}

/// Compare two attribute values under a declared type.
///
/// Unknown types fall back to structural equality.
#[must_use]
pub fn values_equal(existing: &Value, incoming: &Value, ty: Option<&AttributeType>) -> bool {
    if existing == incoming {
        return true;
    }

    match ty {
        Some(ty) if ty.is_numeric() => match (as_number(existing), as_number(incoming)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        Some(AttributeType::Bool) => match (as_bool(existing), as_bool(incoming)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        Some(ty) if ty.is_set_valued() => match (existing, incoming) {
            (Value::Array(a), Value::Array(b)) => same_elements(a, b),
            _ => false,
        },
        _ => false,
    }
}

/// Computes change sets between stored and inbound documents.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    relation_attribute: String,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RELATION_ATTRIBUTE)
    }
}

impl DiffEngine {
    #[must_use]
    pub fn new(relation_attribute: impl Into<String>) -> Self {
        Self {
            relation_attribute: relation_attribute.into(),
        }
    }

    /// The single-valued relation attribute handled first-write-wins.
    #[must_use]
    pub fn relation_attribute(&self) -> &str {
        &self.relation_attribute
    }

    /// Compute the attributes of `incoming` that must be written onto `existing`.
    #[must_use]
    pub fn diff(
        &self,
        existing: &CiDocument,
        incoming: &CiDocument,
        attributes: &AttributeTable,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for (field, value) in incoming.iter() {
            if fields::is_system_managed(field) {
                continue;
            }

            if *field == self.relation_attribute {
                self.diff_relation(existing, field, value, &mut changes);
                continue;
            }

            match existing.get(field) {
                Some(current) if values_equal(current, value, attributes.type_of(field)) => {}
                None if value.is_null() => {}
                _ => changes.insert(field, value),
            }
        }

        changes
    }

    fn diff_relation(
        &self,
        existing: &CiDocument,
        field: &str,
        incoming: &Value,
        changes: &mut ChangeSet,
    ) {
        match relation_state(existing.get(field)) {
            RelationState::Empty => {
                if relation_state(Some(incoming)) != RelationState::Empty {
                    changes.insert(field, incoming);
                }
            }
            RelationState::Occupied => {
                if existing.get(field) != Some(incoming) {
                    warn!(
                        attribute = %field,
                        instance_id = ?existing.instance_id(),
                        "Relation already set, skipping overwrite"
                    );
                }
            }
            RelationState::Unrecognised => {
                warn!(
                    attribute = %field,
                    instance_id = ?existing.instance_id(),
                    stored = %existing.get(field).unwrap_or(&serde_json::Value::Null),
                    "Stored relation has an unrecognised shape, leaving it untouched"
                );
            }
        }
    }
}

/// Overlay a change set onto a stored document.
#[must_use]
pub fn apply(existing: &CiDocument, changes: &ChangeSet) -> CiDocument {
    let mut merged = existing.clone();
    merged.merge(changes.as_document());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::AttributeMeta;
    use serde_json::json;

    fn doc(value: Value) -> CiDocument {
        CiDocument::from_value(value).unwrap()
    }

    fn switch_types() -> AttributeTable {
        AttributeTable::new(vec![
            AttributeMeta::new(1, "bk_switch", "port_count", "Ports", AttributeType::Int),
            AttributeMeta::new(2, "bk_switch", "enabled", "Enabled", AttributeType::Bool),
            AttributeMeta::new(3, "bk_switch", "owners", "Owners", AttributeType::Organization),
            AttributeMeta::new(4, "bk_switch", "load", "Load", AttributeType::Float),
        ])
    }

    #[test]
    fn test_identical_documents_have_empty_diff() {
        let existing = doc(json!({"bk_inst_id": 1, "vendor": "acme", "port_count": 48}));
        let incoming = doc(json!({"vendor": "acme", "port_count": 48}));
        assert!(DiffEngine::default()
            .diff(&existing, &incoming, &switch_types())
            .is_empty());
    }

    #[test]
    fn test_diff_is_sparse_and_skips_system_fields() {
        let existing = doc(json!({"bk_inst_id": 1, "vendor": "acme", "os": "ios"}));
        let incoming = doc(json!({
            "bk_inst_id": 99,
            "bk_obj_id": "bk_switch",
            "last_time": "now",
            "default": 1,
            "vendor": "other",
            "serial": "X1"
        }));

        let changes = DiffEngine::default().diff(&existing, &incoming, &switch_types());
        assert_eq!(changes.field_names(), vec!["serial", "vendor"]);
        assert_eq!(changes.as_document().get("vendor"), Some(&json!("other")));
    }

    #[test]
    fn test_null_for_absent_attribute_is_not_a_change() {
        let existing = doc(json!({"bk_inst_id": 1, "vendor": "acme", "os": "ios"}));
        let incoming = doc(json!({"vendor": "acme", "serial": null, "os": null}));

        let changes = DiffEngine::default().diff(&existing, &incoming, &switch_types());
        assert_eq!(changes.field_names(), vec!["os"]);
        assert_eq!(changes.as_document().get("os"), Some(&Value::Null));
    }

    #[test]
    fn test_type_aware_comparison() {
        let types = switch_types();
        assert!(values_equal(&json!(48), &json!("48"), types.type_of("port_count")));
        assert!(values_equal(&json!(0.5), &json!("0.50"), types.type_of("load")));
        assert!(values_equal(&json!(true), &json!("true"), types.type_of("enabled")));
        assert!(values_equal(
            &json!([1, 2, 3]),
            &json!([3, 1, 2]),
            types.type_of("owners")
        ));
        assert!(!values_equal(&json!([1, 2]), &json!([1, 3]), types.type_of("owners")));
        // Undeclared attributes compare structurally.
        assert!(!values_equal(&json!(48), &json!("48"), None));
    }

    #[test]
    fn test_relation_state_shapes() {
        assert_eq!(relation_state(None), RelationState::Empty);
        assert_eq!(relation_state(Some(&Value::Null)), RelationState::Empty);
        assert_eq!(relation_state(Some(&json!(""))), RelationState::Empty);
        assert_eq!(relation_state(Some(&json!("0"))), RelationState::Empty);
        assert_eq!(relation_state(Some(&json!(0))), RelationState::Empty);
        assert_eq!(relation_state(Some(&json!([]))), RelationState::Empty);
        assert_eq!(relation_state(Some(&json!([{"id": ""}]))), RelationState::Empty);
        assert_eq!(relation_state(Some(&json!([{"id": "0"}]))), RelationState::Empty);
        assert_eq!(relation_state(Some(&json!([{"id": "7"}]))), RelationState::Occupied);
        assert_eq!(relation_state(Some(&json!([{"id": 7}]))), RelationState::Occupied);
        assert_eq!(relation_state(Some(&json!(7))), RelationState::Occupied);
        assert_eq!(relation_state(Some(&json!(true))), RelationState::Unrecognised);
        assert_eq!(relation_state(Some(&json!([[1]]))), RelationState::Unrecognised);
    }

    #[test]
    fn test_relation_first_write_wins() {
        let engine = DiffEngine::default();
        let types = AttributeTable::default();

        // Empty stored relation takes the inbound value.
        let existing = doc(json!({"host": [{"id": ""}]}));
        let incoming = doc(json!({"host": [{"id": "42"}]}));
        let changes = engine.diff(&existing, &incoming, &types);
        assert_eq!(changes.field_names(), vec!["host"]);

        // A recorded relation is never overwritten.
        let existing = doc(json!({"host": [{"id": "7"}]}));
        let changes = engine.diff(&existing, &incoming, &types);
        assert!(changes.is_empty());

        // An empty inbound relation writes nothing.
        let existing = doc(json!({"host": []}));
        let incoming = doc(json!({"host": [{"id": "0"}]}));
        assert!(engine.diff(&existing, &incoming, &types).is_empty());
    }

    #[test]
    fn test_unrecognised_relation_left_untouched() {
        let engine = DiffEngine::new("rack");
        let existing = doc(json!({"rack": {"nested": true}}));
        let incoming = doc(json!({"rack": "r-01"}));
        assert!(engine
            .diff(&existing, &incoming, &AttributeTable::default())
            .is_empty());
    }

    #[test]
    fn test_apply_merges_changes() {
        let existing = doc(json!({"bk_inst_id": 1, "vendor": "acme"}));
        let incoming = doc(json!({"vendor": "other"}));
        let changes = DiffEngine::default().diff(&existing, &incoming, &AttributeTable::default());
        let merged = apply(&existing, &changes);
        assert_eq!(merged.get("vendor"), Some(&json!("other")));
        assert_eq!(merged.get("bk_inst_id"), Some(&json!(1)));
    }
}
