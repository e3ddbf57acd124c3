//! Inbound collector messages.
//!
//! ```json
//! {
//!   "data": {
//!     "meta": { "model": { "bk_obj_id": "bk_switch", "bk_supplier_account": "0" } },
//!     "data": "{\"bk_inst_name\": \"sw-01\"}"
//!   }
//! }
//! ```
//!
//! The attribute payload at `data.data` is either an object or a string
//! holding a JSON object.

use serde_json::Value;

use cmdb_core::{CiDocument, ObjectType, TenantId};

use crate::context::DEFAULT_TENANT;
use crate::error::{ReconcileError, ReconcileResult};

/// A parsed collector message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub object_type: ObjectType,
    pub tenant: TenantId,
    pub document: CiDocument,
}

impl InboundMessage {
    #[must_use]
    pub fn new(object_type: ObjectType, tenant: TenantId, document: CiDocument) -> Self {
        Self {
            object_type,
            tenant,
            document,
        }
    }

    /// Parse a raw message.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the message is not JSON, has no object type, or
    /// carries no attribute object.
    pub fn parse(raw: &str) -> ReconcileResult<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ReconcileError::parse(format!("message is not valid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Parse an already decoded message.
    pub fn from_value(value: &Value) -> ReconcileResult<Self> {
        let model = value.pointer("/data/meta/model");

        let object_type = model
            .and_then(|m| m.get("bk_obj_id"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ReconcileError::parse("missing data.meta.model.bk_obj_id"))?;

        let tenant = model
            .and_then(|m| m.get("bk_supplier_account"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TENANT);

        let document = match value.pointer("/data/data") {
            Some(Value::Object(map)) => CiDocument::from_map(map.clone()),
            Some(Value::String(raw)) => {
                let inner: Value = serde_json::from_str(raw).map_err(|e| {
                    ReconcileError::parse(format!("data.data is not valid JSON: {e}"))
                })?;
                CiDocument::from_value(inner).map_err(|e| ReconcileError::parse(e.to_string()))?
            }
            Some(_) => {
                return Err(ReconcileError::parse(
                    "data.data must be an object or a JSON string",
                ))
            }
            None => return Err(ReconcileError::parse("missing data.data")),
        };

        Ok(Self {
            object_type: ObjectType::from(object_type),
            tenant: TenantId::from(tenant),
            document,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_string_payload() {
        let raw = json!({
            "data": {
                "meta": {"model": {"bk_obj_id": "bk_switch", "bk_supplier_account": "tenant-a"}},
                "data": "{\"bk_inst_name\": \"sw-01\", \"ports\": 48}"
            }
        })
        .to_string();

        let msg = InboundMessage::parse(&raw).unwrap();
        assert_eq!(msg.object_type.as_str(), "bk_switch");
        assert_eq!(msg.tenant.as_str(), "tenant-a");
        assert_eq!(msg.document.get("ports"), Some(&json!(48)));
    }

    #[test]
    fn test_parse_object_payload_and_default_tenant() {
        let value = json!({
            "data": {
                "meta": {"model": {"bk_obj_id": "host"}},
                "data": {"bk_host_innerip": "10.0.0.1"}
            }
        });
        let msg = InboundMessage::from_value(&value).unwrap();
        assert_eq!(msg.tenant.as_str(), "0");
        assert_eq!(msg.document.str_field("bk_host_innerip"), Some("10.0.0.1"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(InboundMessage::parse("not json").unwrap_err().is_dropped());

        let no_type = json!({"data": {"meta": {"model": {}}, "data": {}}});
        let err = InboundMessage::from_value(&no_type).unwrap_err();
        assert!(err.to_string().contains("bk_obj_id"));

        let bad_payload = json!({
            "data": {"meta": {"model": {"bk_obj_id": "host"}}, "data": "[1,2]"}
        });
        assert!(matches!(
            InboundMessage::from_value(&bad_payload),
            Err(ReconcileError::Parse { .. })
        ));

        let number_payload = json!({
            "data": {"meta": {"model": {"bk_obj_id": "host"}}, "data": 5}
        });
        assert!(InboundMessage::from_value(&number_payload).is_err());
    }
}
