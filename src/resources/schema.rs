//! The `minecraft_schema` resource.
//!
//! Places a schematic file into the world at a fixed origin. The world can
//! only place and remove schematics, so every configurable attribute forces
//! replacement, and so does a change to the file's contents: the digest
//! recorded in `schema_hash` at creation is compared with the file on every
//! plan.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::drift::{self, Baseline, Drift};
use crate::error::ProviderError;
use crate::hasher::hash_file;
use crate::plan;
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema};
use crate::types::{AttributeChange, PlanResult};
use crate::validation::{ensure_valid, validate};
use crate::world::Origin;

/// Registered type name.
pub const TYPE_NAME: &str = "minecraft_schema";

/// State and configuration of a placed schematic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaModel {
    /// Placement id, unknown until created.
    #[serde(default)]
    pub id: Option<String>,
    /// Path of the schematic file.
    pub schema_path: String,
    /// Digest of the file at the last create, unknown until created.
    #[serde(default)]
    pub schema_hash: Option<String>,
    /// Origin x.
    pub x: i64,
    /// Origin y.
    pub y: i64,
    /// Origin z.
    pub z: i64,
}

impl SchemaModel {
    fn origin(&self) -> Origin {
        Origin {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    /// Copy the provider-owned attributes from another model.
    fn with_computed_from(mut self, other: &SchemaModel) -> Self {
        self.id = other.id.clone();
        self.schema_hash = other.schema_hash.clone();
        self
    }
}

/// Resource implementation for [`TYPE_NAME`].
pub struct SchemaResource {
    context: ResourceContext,
}

impl SchemaResource {
    /// Create the resource for a request.
    pub fn new(context: ResourceContext) -> Self {
        Self { context }
    }

    /// Constructor used by the registry.
    pub fn boxed(context: ResourceContext) -> Box<dyn Resource> {
        Box::new(Self::new(context))
    }

    fn parse(&self, value: Value) -> Result<SchemaModel, ProviderError> {
        ensure_valid(validate(&self.schema(), &value))?;
        Ok(serde_json::from_value(value)?)
    }

    fn plan_replace(
        &self,
        prior: &SchemaModel,
        mut planned: SchemaModel,
        drift: &Drift,
        mut changes: Vec<AttributeChange>,
    ) -> Result<PlanResult, ProviderError> {
        planned.id = None;
        planned.schema_hash = match drift {
            Drift::Changed { current, .. } => Some(current.clone()),
            Drift::Unchanged => prior.schema_hash.clone(),
            Drift::NoBaseline => None,
        };

        if let Some(current) = drift.proposed_hash() {
            changes.push(AttributeChange::modified(
                "schema_hash",
                prior.schema_hash.clone().map(Value::String).unwrap_or(Value::Null),
                Value::String(current.to_string()),
            ));
        }

        Ok(PlanResult::with_changes(
            serde_json::to_value(planned)?,
            changes,
            true,
        ))
    }
}

#[async_trait::async_trait]
impl Resource for SchemaResource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A schematic file placed into the world")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("Placement identifier"),
            )
            .with_attribute(
                "schema_path",
                Attribute::required_string()
                    .with_description("Path to the schematic file")
                    .with_force_new(),
            )
            .with_attribute(
                "schema_hash",
                Attribute::computed_string()
                    .with_description("SHA-256 of the schematic file when it was placed"),
            )
            .with_attribute("x", Attribute::required_int64().with_force_new())
            .with_attribute("y", Attribute::required_int64().with_force_new())
            .with_attribute("z", Attribute::required_int64().with_force_new())
    }

    async fn plan(
        &self,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.schema();

        if proposed_state.is_null() {
            let prior = prior_state.unwrap_or(Value::Null);
            return Ok(PlanResult::with_changes(
                Value::Null,
                plan::destroy_changes(&schema, &prior),
                false,
            ));
        }

        if !config.is_null() {
            ensure_valid(self.validate(&config))?;
        }
        let proposed = self.parse(proposed_state)?;

        let Some(prior_value) = prior_state else {
            let planned = SchemaModel {
                id: None,
                schema_hash: None,
                ..proposed
            };
            let planned = serde_json::to_value(planned)?;
            let changes = plan::create_changes(&schema, &planned);
            return Ok(PlanResult::with_changes(planned, changes, false));
        };

        let prior = self.parse(prior_value.clone())?;
        let diff = plan::diff(&schema, &prior_value, &serde_json::to_value(&proposed)?);

        let proposed_path = proposed.schema_path.clone();
        let path = self.context.config.resolve(&proposed_path);
        let drift = drift::detect(Baseline::from_state(prior.schema_hash.as_deref()), &path)?;

        let mut result = if diff.requires_replace() || drift.requires_replace() {
            debug!(
                replace_paths = ?diff.replace_paths,
                drifted = drift.requires_replace(),
                "Planning replacement"
            );
            self.plan_replace(&prior, proposed, &drift, diff.changes)?
        } else {
            let planned = proposed.with_computed_from(&prior);
            PlanResult::with_changes(serde_json::to_value(planned)?, diff.changes, false)
        };

        // A changed path is already reported by the diff.
        if prior.schema_path == proposed_path {
            if let Some(warning) = drift.warning(&path) {
                result = result.with_diagnostic(warning);
            }
        }
        Ok(result)
    }

    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError> {
        let planned = self.parse(planned_state)?;
        let path = self.context.config.resolve(&planned.schema_path);
        let hash = hash_file(&path)?;

        if let Some(expected) = planned.schema_hash.as_deref() {
            if expected != hash {
                warn!(
                    path = %path.display(),
                    planned = %expected,
                    actual = %hash,
                    "Schema file changed between plan and apply"
                );
            }
        }

        let placement = self
            .context
            .world
            .place_schema(&path, &hash, planned.origin())
            .await?;
        info!(
            id = %placement.id,
            path = %path.display(),
            origin = %placement.origin,
            "Schematic placed"
        );

        let state = SchemaModel {
            id: Some(placement.id),
            schema_hash: Some(hash),
            ..planned
        };
        Ok(serde_json::to_value(state)?)
    }

    async fn read(&self, current_state: Value) -> Result<Value, ProviderError> {
        let current = self.parse(current_state)?;
        let id = current
            .id
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidRequest("state has no id".to_string()))?;

        match self.context.world.get_placement(id).await? {
            Some(_) => Ok(serde_json::to_value(&current)?),
            None => Err(ProviderError::NotFound(id.to_string())),
        }
    }

    async fn update(
        &self,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let diff = plan::diff(&self.schema(), &prior_state, &planned_state);
        if diff.requires_replace() {
            return Err(ProviderError::FailedPrecondition(format!(
                "changes to {} require replacement",
                diff.replace_paths.join(", ")
            )));
        }

        let prior = self.parse(prior_state)?;
        let planned = self.parse(planned_state)?;
        Ok(serde_json::to_value(planned.with_computed_from(&prior))?)
    }

    async fn delete(&self, current_state: Value) -> Result<(), ProviderError> {
        let current = self.parse(current_state)?;
        let Some(id) = current.id else {
            debug!("No placement id in state, nothing to delete");
            return Ok(());
        };

        if self.context.world.remove_placement(&id).await? {
            info!(id = %id, "Schematic removed");
        } else {
            warn!(id = %id, "Schematic already removed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::hasher::hash_bytes;
    use crate::schema::DiagnosticSeverity;
    use crate::world::{MemoryWorld, WorldClient};
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        dir: tempfile::TempDir,
        world: Arc<MemoryWorld>,
        resource: SchemaResource,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let world = Arc::new(MemoryWorld::new());
            let config = ProviderConfig {
                base_dir: Some(dir.path().to_path_buf()),
            };
            let resource = SchemaResource::new(ResourceContext::new(config, world.clone()));
            Self {
                dir,
                world,
                resource,
            }
        }

        fn write(&self, name: &str, contents: &str) {
            std::fs::write(self.dir.path().join(name), contents).unwrap();
        }
    }

    fn config(path: &str) -> Value {
        json!({"schema_path": path, "x": 0, "y": 64, "z": 0})
    }

    async fn created(fixture: &Fixture, contents: &str) -> Value {
        fixture.write("castle.schem", contents);
        let plan = fixture
            .resource
            .plan(None, config("castle.schem"), config("castle.schem"))
            .await
            .unwrap();
        fixture.resource.create(plan.planned_state).await.unwrap()
    }

    #[tokio::test]
    async fn test_plan_create_leaves_computed_unknown() {
        let fixture = Fixture::new();
        let plan = fixture
            .resource
            .plan(None, config("castle.schem"), config("castle.schem"))
            .await
            .unwrap();

        assert!(!plan.requires_replace);
        assert!(plan.diagnostics.is_empty());
        assert!(plan.planned_state["id"].is_null());
        assert!(plan.planned_state["schema_hash"].is_null());
        assert_eq!(plan.changes.len(), 4);
    }

    #[tokio::test]
    async fn test_create_records_hash() {
        let fixture = Fixture::new();
        let state = created(&fixture, "abc").await;

        assert_eq!(state["schema_hash"], json!(hash_bytes(b"abc")));
        assert_eq!(state["id"], json!("schema-1"));
        assert_eq!(fixture.world.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_missing_file_fails_without_placing() {
        let fixture = Fixture::new();
        let err = fixture
            .resource
            .create(config("missing.schem"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Io { .. }));
        assert!(fixture.world.is_empty().await);
    }

    #[tokio::test]
    async fn test_plan_unchanged_file_is_no_op() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;

        let plan = fixture
            .resource
            .plan(Some(state.clone()), config("castle.schem"), config("castle.schem"))
            .await
            .unwrap();

        assert!(!plan.requires_replace);
        assert!(plan.changes.is_empty());
        assert!(plan.diagnostics.is_empty());
        assert_eq!(plan.planned_state, state);
    }

    #[tokio::test]
    async fn test_plan_changed_file_requires_replace() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;
        fixture.write("castle.schem", "world");

        let plan = fixture
            .resource
            .plan(Some(state), config("castle.schem"), config("castle.schem"))
            .await
            .unwrap();

        let old = hash_bytes(b"hello");
        let new = hash_bytes(b"world");
        assert!(plan.requires_replace);
        assert_eq!(plan.planned_state["schema_hash"], json!(new));
        assert!(plan.planned_state["id"].is_null());
        assert_eq!(
            plan.changes,
            vec![AttributeChange::modified("schema_hash", json!(old), json!(new))]
        );

        assert_eq!(plan.diagnostics.len(), 1);
        let warning = &plan.diagnostics[0];
        assert_eq!(warning.severity, DiagnosticSeverity::Warning);
        let detail = warning.detail.as_deref().unwrap();
        assert!(detail.contains(&old) && detail.contains(&new));
    }

    #[tokio::test]
    async fn test_plan_moved_origin_requires_replace_without_warning() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;
        let moved = json!({"schema_path": "castle.schem", "x": 5, "y": 64, "z": 0});

        let plan = fixture
            .resource
            .plan(Some(state.clone()), moved.clone(), moved)
            .await
            .unwrap();

        assert!(plan.requires_replace);
        assert!(plan.diagnostics.is_empty());
        assert_eq!(plan.planned_state["schema_hash"], state["schema_hash"]);
        assert_eq!(plan.changes, vec![AttributeChange::modified("x", json!(0), json!(5))]);
    }

    #[tokio::test]
    async fn test_plan_new_path_replaces_without_content_warning() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;
        fixture.write("tower.schem", "world");

        let plan = fixture
            .resource
            .plan(Some(state), config("tower.schem"), config("tower.schem"))
            .await
            .unwrap();

        assert!(plan.requires_replace);
        assert!(plan.diagnostics.is_empty());
        assert_eq!(plan.planned_state["schema_hash"], json!(hash_bytes(b"world")));
        assert!(plan
            .changes
            .iter()
            .any(|c| c.path == "schema_path" && c.after == Some(json!("tower.schem"))));
    }

    #[tokio::test]
    async fn test_plan_without_recorded_hash_skips_check() {
        let fixture = Fixture::new();
        let legacy = json!({
            "id": "schema-9",
            "schema_path": "gone.schem",
            "schema_hash": "",
            "x": 0,
            "y": 64,
            "z": 0
        });

        let plan = fixture
            .resource
            .plan(Some(legacy), config("gone.schem"), config("gone.schem"))
            .await
            .unwrap();

        assert!(!plan.requires_replace);
        assert!(plan.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_plan_unreadable_file_is_error() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;
        std::fs::remove_file(fixture.dir.path().join("castle.schem")).unwrap();

        let err = fixture
            .resource
            .plan(Some(state), config("castle.schem"), config("castle.schem"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Io { .. }));
    }

    #[tokio::test]
    async fn test_plan_rejects_configured_hash() {
        let fixture = Fixture::new();
        let forged = json!({
            "schema_path": "castle.schem",
            "schema_hash": "forged",
            "x": 0,
            "y": 64,
            "z": 0
        });

        let err = fixture
            .resource
            .plan(None, forged.clone(), forged)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_plan_destroy() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;

        let plan = fixture
            .resource
            .plan(Some(state), Value::Null, Value::Null)
            .await
            .unwrap();
        assert!(plan.is_destroy());
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
        assert_eq!(plan.changes.len(), 6);
    }

    #[tokio::test]
    async fn test_read_keeps_recorded_hash() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;
        fixture.write("castle.schem", "world");

        let read = fixture.resource.read(state.clone()).await.unwrap();
        assert_eq!(read, state);
    }

    #[tokio::test]
    async fn test_read_missing_placement() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;
        fixture.world.remove_placement("schema-1").await.unwrap();

        let err = fixture.resource.read(state).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(id) if id == "schema-1"));
    }

    #[tokio::test]
    async fn test_update_rejects_replacing_changes() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;
        let mut moved = state.clone();
        moved["z"] = json!(9);

        let err = fixture.resource.update(state, moved).await.unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn test_update_carries_computed_forward() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;

        let updated = fixture
            .resource
            .update(state.clone(), config("castle.schem"))
            .await
            .unwrap();
        assert_eq!(updated, state);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let fixture = Fixture::new();
        let state = created(&fixture, "hello").await;

        fixture.resource.delete(state.clone()).await.unwrap();
        assert!(fixture.world.is_empty().await);
        fixture.resource.delete(state).await.unwrap();
    }
}
