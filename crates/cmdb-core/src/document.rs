//! CI Documents
//!
//! A CI document is a schema-driven `attribute id -> value` mapping. The
//! attribute set depends on the object type, so the document is kept as a
//! JSON object rather than a fixed struct.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::ids::{BizId, InstanceId, ObjectType, TenantId};

/// Well-known attribute identifiers.
pub mod fields {
    /// Object type identifier.
    pub const OBJECT_TYPE: &str = "bk_obj_id";
    /// Owner (tenant) identifier.
    pub const TENANT: &str = "bk_supplier_account";
    /// Store-assigned instance identifier.
    pub const INSTANCE_ID: &str = "bk_inst_id";
    /// Instance display name for generic models.
    pub const INSTANCE_NAME: &str = "bk_inst_name";
    /// Business the resource belongs to.
    pub const BIZ_ID: &str = "bk_biz_id";
    /// Business display name.
    pub const BIZ_NAME: &str = "bk_biz_name";
    /// Set display name.
    pub const SET_NAME: &str = "bk_set_name";
    /// Module display name.
    pub const MODULE_NAME: &str = "bk_module_name";
    /// Host identifier.
    pub const HOST_ID: &str = "bk_host_id";
    /// Host inner IP, used as the host display name.
    pub const HOST_INNER_IP: &str = "bk_host_innerip";
    /// Creation timestamp.
    pub const CREATE_TIME: &str = "create_time";
    /// Last update timestamp.
    pub const LAST_TIME: &str = "last_time";
    /// Built-in flag (e.g. the default "resource pool" business).
    pub const DEFAULT: &str = "default";

    /// Fields owned by the store. They never appear in a diff or an update payload.
    pub const SYSTEM_MANAGED: [&str; 6] =
        [OBJECT_TYPE, TENANT, INSTANCE_ID, CREATE_TIME, LAST_TIME, DEFAULT];

    /// Returns true if the field is store-managed.
    #[must_use]
    pub fn is_system_managed(field: &str) -> bool {
        SYSTEM_MANAGED.contains(&field)
    }
}

/// Stringify a value the way identity keys are built.
///
/// Strings are used as-is, numbers and booleans through their JSON text,
/// arrays and objects through their compact JSON. `null` and the empty
/// string yield `None`.
#[must_use]
pub fn key_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Parse an integer that may be stored as a number or a numeric string.
fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A configuration item document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiDocument(Map<String, Value>);

impl CiDocument {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap an existing JSON map.
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build a document from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::invalid_document(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Get an attribute value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set an attribute value, returning the previous one.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Check whether the attribute is present.
    #[must_use]
    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Iterate over `(attribute, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Attribute identifiers present in the document.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the document has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Convert into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// The object type carried by the document.
    #[must_use]
    pub fn object_type(&self) -> Option<ObjectType> {
        self.str_field(fields::OBJECT_TYPE).map(ObjectType::from)
    }

    /// The owner (tenant) carried by the document.
    #[must_use]
    pub fn tenant(&self) -> Option<TenantId> {
        self.str_field(fields::TENANT).map(TenantId::from)
    }

    /// The store-assigned instance id, if persisted.
    #[must_use]
    pub fn instance_id(&self) -> Option<InstanceId> {
        self.i64_field(fields::INSTANCE_ID).map(InstanceId::new)
    }

    /// The business id, zero when absent or unparsable.
    #[must_use]
    pub fn biz_id(&self) -> BizId {
        self.i64_field(fields::BIZ_ID)
            .map(BizId::new)
            .unwrap_or_default()
    }

    /// A non-empty string attribute.
    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// An integer attribute stored as a number or numeric string.
    #[must_use]
    pub fn i64_field(&self, field: &str) -> Option<i64> {
        self.0.get(field).and_then(value_as_i64)
    }

    /// The attribute stringified for identity keys (see [`key_string`]).
    #[must_use]
    pub fn key_value(&self, field: &str) -> Option<String> {
        self.0.get(field).and_then(key_string)
    }

    /// A copy of the document without store-managed fields.
    #[must_use]
    pub fn without_system_fields(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| !fields::is_system_managed(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Overlay every attribute of `patch` onto this document.
    pub fn merge(&mut self, patch: &CiDocument) {
        for (k, v) in patch.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl From<Map<String, Value>> for CiDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for CiDocument {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
