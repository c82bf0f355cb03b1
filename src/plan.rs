//! Schema-driven attribute diffs used while planning.

use serde_json::Value;

use crate::schema::Schema;
use crate::types::AttributeChange;

/// Differences between prior state and the proposed configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeDiff {
    /// One entry per configurable attribute whose value differs.
    pub changes: Vec<AttributeChange>,
    /// Changed attributes that are marked `force_new`.
    pub replace_paths: Vec<String>,
}

impl AttributeDiff {
    /// Whether any changed attribute forces replacement.
    pub fn requires_replace(&self) -> bool {
        !self.replace_paths.is_empty()
    }
}

/// Compare configurable attributes of `prior` and `proposed`.
///
/// Computed-only attributes are owned by the provider and never diffed here.
/// A missing attribute and an explicit null are the same value.
pub fn diff(schema: &Schema, prior: &Value, proposed: &Value) -> AttributeDiff {
    let mut result = AttributeDiff::default();

    for (name, attr) in &schema.attributes {
        if attr.flags.is_computed_only() {
            continue;
        }
        let before = field(prior, name);
        let after = field(proposed, name);
        if before == after {
            continue;
        }

        if attr.force_new {
            result.replace_paths.push(name.clone());
        }
        result
            .changes
            .push(AttributeChange::new(name.as_str(), before.cloned(), after.cloned()));
    }
    result
}

/// Changes for creating a resource: every set attribute is added.
pub fn create_changes(schema: &Schema, proposed: &Value) -> Vec<AttributeChange> {
    schema
        .attributes
        .keys()
        .filter_map(|name| {
            field(proposed, name).map(|v| AttributeChange::added(name.as_str(), v.clone()))
        })
        .collect()
}

/// Changes for destroying a resource: every stored attribute is removed.
pub fn destroy_changes(schema: &Schema, prior: &Value) -> Vec<AttributeChange> {
    schema
        .attributes
        .keys()
        .filter_map(|name| {
            field(prior, name).map(|v| AttributeChange::removed(name.as_str(), v.clone()))
        })
        .collect()
}

fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value.get(name).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("label", Attribute::optional_string())
            .with_attribute("schema_path", Attribute::required_string().with_force_new())
            .with_attribute("x", Attribute::required_int64().with_force_new())
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let state = json!({"id": "p-1", "schema_path": "a.schem", "x": 1});
        let diff = diff(&schema(), &state, &state);
        assert!(diff.changes.is_empty());
        assert!(!diff.requires_replace());
    }

    #[test]
    fn test_diff_ignores_computed_and_nulls() {
        let prior = json!({"id": "p-1", "schema_path": "a.schem", "x": 1, "label": null});
        let proposed = json!({"id": null, "schema_path": "a.schem", "x": 1});
        assert!(diff(&schema(), &prior, &proposed).changes.is_empty());
    }

    #[test]
    fn test_diff_force_new_requires_replace() {
        let prior = json!({"schema_path": "a.schem", "x": 1});
        let proposed = json!({"schema_path": "a.schem", "x": 2});

        let diff = diff(&schema(), &prior, &proposed);
        assert_eq!(diff.replace_paths, vec!["x".to_string()]);
        assert_eq!(diff.changes, vec![AttributeChange::modified("x", json!(1), json!(2))]);
    }

    #[test]
    fn test_diff_in_place_change() {
        let prior = json!({"schema_path": "a.schem", "x": 1});
        let proposed = json!({"schema_path": "a.schem", "x": 1, "label": "keep"});

        let diff = diff(&schema(), &prior, &proposed);
        assert!(!diff.requires_replace());
        assert_eq!(diff.changes, vec![AttributeChange::added("label", json!("keep"))]);
    }

    #[test]
    fn test_create_and_destroy_changes() {
        let state = json!({"id": "p-1", "schema_path": "a.schem", "x": 1});

        let created = create_changes(&schema(), &json!({"schema_path": "a.schem", "x": 1}));
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|c| c.before.is_none()));

        let destroyed = destroy_changes(&schema(), &state);
        assert_eq!(destroyed.len(), 3);
        assert!(destroyed.iter().all(|c| c.after.is_none()));
    }
}
