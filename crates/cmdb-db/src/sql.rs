//! Condition compilation to JSONB containment filters.
//!
//! `Equals` becomes `data @> {"field": value}`; `In` becomes an `EXISTS` over
//! one containment object per candidate value. Every bind is JSONB.

use serde_json::{Map, Value};

use cmdb_core::{Condition, Predicate};

/// A `WHERE` fragment and its binds, numbered from a given placeholder.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SqlFilter {
    pub clause: String,
    pub binds: Vec<Value>,
}

fn containment(field: &str, value: &Value) -> Value {
    let mut object = Map::new();
    object.insert(field.to_string(), value.clone());
    Value::Object(object)
}

/// Compile a condition over the `data` column.
///
/// Placeholders start at `$first_param`. An empty condition compiles to `TRUE`.
pub(crate) fn render_condition(condition: &Condition, first_param: usize) -> SqlFilter {
    let mut clauses = Vec::with_capacity(condition.predicates().len());
    let mut binds = Vec::with_capacity(condition.predicates().len());

    for predicate in condition.predicates() {
        let param = first_param + binds.len();
        match predicate {
            Predicate::Equals { field, value } => {
                clauses.push(format!("data @> ${param}"));
                binds.push(containment(field, value));
            }
            Predicate::In { field, values } => {
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM jsonb_array_elements(${param}) AS candidate(v) WHERE data @> candidate.v)"
                ));
                binds.push(Value::Array(
                    values.iter().map(|v| containment(field, v)).collect(),
                ));
            }
        }
    }

    let clause = if clauses.is_empty() {
        "TRUE".to_string()
    } else {
        clauses.join(" AND ")
    };
    SqlFilter { clause, binds }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdb_core::{InstanceId, ObjectType, TenantId};
    use serde_json::json;

    #[test]
    fn test_empty_condition_is_true() {
        let filter = render_condition(&Condition::new(), 1);
        assert_eq!(filter.clause, "TRUE");
        assert!(filter.binds.is_empty());
    }

    #[test]
    fn test_instance_condition() {
        let cond = Condition::instance(
            &ObjectType::from("bk_switch"),
            &TenantId::from("0"),
            InstanceId::new(9),
        );
        let filter = render_condition(&cond, 2);
        assert_eq!(filter.clause, "data @> $2 AND data @> $3 AND data @> $4");
        assert_eq!(
            filter.binds,
            vec![
                json!({"bk_obj_id": "bk_switch"}),
                json!({"bk_supplier_account": "0"}),
                json!({"bk_inst_id": 9}),
            ]
        );
    }

    #[test]
    fn test_membership_predicate() {
        let cond = Condition::new()
            .eq("bk_cloud_id", 0)
            .is_in("bk_host_innerip", vec![json!("10.0.0.1"), json!("10.0.0.2")]);
        let filter = render_condition(&cond, 1);
        assert!(filter.clause.starts_with("data @> $1 AND EXISTS"));
        assert!(filter.clause.contains("jsonb_array_elements($2)"));
        assert_eq!(
            filter.binds[1],
            json!([{"bk_host_innerip": "10.0.0.1"}, {"bk_host_innerip": "10.0.0.2"}])
        );
    }
}
