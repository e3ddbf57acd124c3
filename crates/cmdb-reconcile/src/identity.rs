//! Identity Resolver
//!
//! Maps an inbound document to the lookup condition and cache key of the CI
//! it describes, using the object type's single must-check uniqueness rule.

use std::sync::Arc;

use serde_json::{Number, Value};
use tracing::debug;

use cmdb_core::{CiDocument, Condition, ObjectType, TenantId};

use crate::error::{ReconcileError, ReconcileResult};
use crate::metadata::{AttributeTable, AttributeType, ModelMetadata};

/// Namespace tag for cache entries written by the collector.
pub const CACHE_NAMESPACE: &str = "cc_collector";

/// Build the cache key of an instance.
///
/// Format: `cc:v3:inst[<namespace>:<tenant>:<object type>:<v1>:<v2>...]`.
#[must_use]
pub fn instance_cache_key(
    namespace: &str,
    tenant: &TenantId,
    object_type: &ObjectType,
    values: &[String],
) -> String {
    format!(
        "cc:v3:inst[{namespace}:{tenant}:{object_type}:{}]",
        values.join(":")
    )
}

fn parse_number(s: &str) -> Option<Value> {
    s.parse::<i64>()
        .map(Value::from)
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number))
}

/// Every stored form a rule value may take.
///
/// Numbers and booleans also match their string rendering, and numeric or
/// boolean strings also match the typed value, so the store lookup agrees
/// with the cache key built from [`cmdb_core::key_string`].
fn lookup_values(raw: &Value, key: &str, ty: &AttributeType) -> Vec<Value> {
    let alternate = match raw {
        Value::String(s) if ty.is_numeric() => parse_number(s.trim()),
        Value::String(s) if *ty == AttributeType::Bool => {
            s.trim().parse::<bool>().ok().map(Value::Bool)
        }
        Value::Number(_) | Value::Bool(_) => Some(Value::String(key.to_string())),
        _ => None,
    };

    let mut values = vec![raw.clone()];
    if let Some(alternate) = alternate {
        if !values.contains(&alternate) {
            values.push(alternate);
        }
    }
    values
}

/// Outcome of identity resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub object_type: ObjectType,
    pub tenant: TenantId,
    pub cache_key: String,
    /// Condition over object type, tenant and every rule attribute.
    pub condition: Condition,
    /// Rule attribute keys, in rule order.
    pub unique_attributes: Vec<String>,
    /// Stringified values of the rule attributes, in rule order.
    pub unique_values: Vec<String>,
}

/// Resolves CI identity from must-check uniqueness rules.
#[derive(Clone)]
pub struct IdentityResolver {
    metadata: Arc<dyn ModelMetadata>,
    namespace: String,
}

impl IdentityResolver {
    /// Create a resolver using the collector cache namespace.
    #[must_use]
    pub fn new(metadata: Arc<dyn ModelMetadata>) -> Self {
        Self {
            metadata,
            namespace: CACHE_NAMESPACE.to_string(),
        }
    }

    /// Override the cache namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Resolve the identity of `document`.
    ///
    /// `attributes` is the declared attribute table of `object_type`, used to
    /// translate rule attribute ids into document keys.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the type has zero or several must-check rules,
    ///   or a rule references an undeclared attribute
    /// - `MissingUniqueValue` if a rule attribute is absent or empty
    /// - `Store` if the rule lookup fails
    pub async fn resolve(
        &self,
        object_type: &ObjectType,
        tenant: &TenantId,
        document: &CiDocument,
        attributes: &AttributeTable,
    ) -> ReconcileResult<ResolvedIdentity> {
        let rules = self.metadata.must_check_rules(object_type, tenant).await?;

        let rule = match rules.as_slice() {
            [rule] => rule,
            other => {
                return Err(ReconcileError::configuration(
                    object_type.as_str(),
                    format!(
                        "expected exactly one must-check unique rule, found {}",
                        other.len()
                    ),
                ))
            }
        };

        if rule.keys.is_empty() {
            return Err(ReconcileError::configuration(
                object_type.as_str(),
                format!("must-check unique rule {} has no attributes", rule.id),
            ));
        }

        let mut condition = Condition::scoped(object_type, tenant);
        let mut unique_attributes = Vec::with_capacity(rule.keys.len());
        let mut unique_values = Vec::with_capacity(rule.keys.len());

        for key_id in &rule.keys {
            let attr = attributes.by_id(*key_id).ok_or_else(|| {
                ReconcileError::configuration(
                    object_type.as_str(),
                    format!("unique rule {} references unknown attribute {key_id}", rule.id),
                )
            })?;

            let raw = document.get(&attr.property_id);
            let value = raw.and_then(cmdb_core::key_string).ok_or_else(|| {
                ReconcileError::missing_unique_value(object_type.as_str(), &attr.property_id)
            })?;

            if let Some(raw) = raw {
                let mut forms = lookup_values(raw, &value, &attr.property_type);
                condition = if forms.len() == 1 {
                    condition.eq(attr.property_id.clone(), forms.remove(0))
                } else {
                    condition.is_in(attr.property_id.clone(), forms)
                };
            }
            unique_attributes.push(attr.property_id.clone());
            unique_values.push(value);
        }

        let cache_key = instance_cache_key(&self.namespace, tenant, object_type, &unique_values);
        debug!(
            object_type = %object_type,
            tenant = %tenant,
            cache_key = %cache_key,
            "Resolved instance identity"
        );

        Ok(ResolvedIdentity {
            object_type: object_type.clone(),
            tenant: tenant.clone(),
            cache_key,
            condition,
            unique_attributes,
            unique_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AttributeMeta, UniqueRule};
    use crate::store::StoreResult;
    use cmdb_core::Predicate;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedRules(Vec<UniqueRule>);

    #[async_trait]
    impl ModelMetadata for FixedRules {
        async fn must_check_rules(
            &self,
            _object_type: &ObjectType,
            _tenant: &TenantId,
        ) -> StoreResult<Vec<UniqueRule>> {
            Ok(self.0.clone())
        }

        async fn attributes(
            &self,
            _object_type: &ObjectType,
            _tenant: &TenantId,
        ) -> StoreResult<Vec<AttributeMeta>> {
            Ok(Vec::new())
        }
    }

    fn rule(keys: Vec<i64>) -> UniqueRule {
        UniqueRule {
            id: 1,
            object_type: ObjectType::from("host"),
            keys,
            must_check: true,
        }
    }

    fn host_attributes() -> AttributeTable {
        AttributeTable::new(vec![
            AttributeMeta::new(10, "host", "bk_host_innerip", "Inner IP", AttributeType::SingleChar),
            AttributeMeta::new(11, "host", "bk_cloud_id", "Cloud", AttributeType::Int),
        ])
    }

    fn host_doc() -> CiDocument {
        CiDocument::from_value(json!({
            "bk_host_innerip": "10.0.0.1",
            "bk_cloud_id": 0,
            "bk_os_name": "linux"
        }))
        .unwrap()
    }

    fn resolver(rules: Vec<UniqueRule>) -> IdentityResolver {
        IdentityResolver::new(Arc::new(FixedRules(rules)))
    }

    #[test]
    fn test_cache_key_format() {
        let key = instance_cache_key(
            CACHE_NAMESPACE,
            &TenantId::from("0"),
            &ObjectType::from("host"),
            &["10.0.0.1".to_string(), "0".to_string()],
        );
        assert_eq!(key, "cc:v3:inst[cc_collector:0:host:10.0.0.1:0]");
    }

    #[tokio::test]
    async fn test_resolve_preserves_rule_order() {
        let identity = resolver(vec![rule(vec![11, 10])])
            .resolve(
                &ObjectType::from("host"),
                &TenantId::from("0"),
                &host_doc(),
                &host_attributes(),
            )
            .await
            .unwrap();

        assert_eq!(identity.unique_attributes, vec!["bk_cloud_id", "bk_host_innerip"]);
        assert_eq!(identity.unique_values, vec!["0", "10.0.0.1"]);
        assert_eq!(identity.cache_key, "cc:v3:inst[cc_collector:0:host:0:10.0.0.1]");
        assert_eq!(identity.condition.predicates().len(), 4);
        assert_eq!(
            identity.condition.predicates()[2],
            Predicate::In {
                field: "bk_cloud_id".into(),
                values: vec![json!(0), json!("0")],
            }
        );
        assert_eq!(
            identity.condition.equals_value("bk_host_innerip"),
            Some(&json!("10.0.0.1"))
        );
    }

    #[test]
    fn test_lookup_values_cover_string_and_typed_forms() {
        assert_eq!(
            lookup_values(&json!("0"), "0", &AttributeType::Int),
            vec![json!("0"), json!(0)]
        );
        assert_eq!(
            lookup_values(&json!(0), "0", &AttributeType::Int),
            vec![json!(0), json!("0")]
        );
        assert_eq!(
            lookup_values(&json!("true"), "true", &AttributeType::Bool),
            vec![json!("true"), json!(true)]
        );
        assert_eq!(
            lookup_values(&json!("abc"), "abc", &AttributeType::Int),
            vec![json!("abc")]
        );
        assert_eq!(
            lookup_values(&json!("007"), "007", &AttributeType::SingleChar),
            vec![json!("007")]
        );
    }

    #[tokio::test]
    async fn test_numeric_string_and_number_resolve_alike() {
        let typed = host_doc();
        let stringly = CiDocument::from_value(json!({
            "bk_host_innerip": "10.0.0.1",
            "bk_cloud_id": "0"
        }))
        .unwrap();
        let r = resolver(vec![rule(vec![10, 11])]);

        let a = r
            .resolve(&ObjectType::from("host"), &TenantId::from("0"), &typed, &host_attributes())
            .await
            .unwrap();
        let b = r
            .resolve(&ObjectType::from("host"), &TenantId::from("0"), &stringly, &host_attributes())
            .await
            .unwrap();

        assert_eq!(a.cache_key, b.cache_key);
        assert!(a.condition.matches(&stringly));
        assert!(b.condition.matches(&typed));
    }

    #[tokio::test]
    async fn test_resolve_requires_exactly_one_rule() {
        for rules in [vec![], vec![rule(vec![10]), rule(vec![11])]] {
            let err = resolver(rules)
                .resolve(
                    &ObjectType::from("host"),
                    &TenantId::from("0"),
                    &host_doc(),
                    &host_attributes(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, ReconcileError::Configuration { .. }));
            assert!(err.is_fatal());
        }
    }

    #[tokio::test]
    async fn test_resolve_rejects_unknown_rule_attribute() {
        let err = resolver(vec![rule(vec![99])])
            .resolve(
                &ObjectType::from("host"),
                &TenantId::from("0"),
                &host_doc(),
                &host_attributes(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown attribute 99"));
    }

    #[tokio::test]
    async fn test_resolve_missing_value() {
        let doc = CiDocument::from_value(json!({"bk_host_innerip": "", "bk_cloud_id": 0})).unwrap();
        let err = resolver(vec![rule(vec![10, 11])])
            .resolve(
                &ObjectType::from("host"),
                &TenantId::from("0"),
                &doc,
                &host_attributes(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::MissingUniqueValue { ref attribute, .. } if attribute == "bk_host_innerip"
        ));
    }
}
