//! Resource implementations and the registry that names them.
//!
//! Resource types are registered explicitly in a [`ResourceRegistry`] built
//! once at startup. The provider instantiates a resource from the registry
//! for each request, handing it a [`ResourceContext`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};
use crate::types::PlanResult;
use crate::validation::validate_config;
use crate::world::WorldClient;

/// Everything a resource needs to serve a request.
#[derive(Clone)]
pub struct ResourceContext {
    /// The configured provider settings.
    pub config: ProviderConfig,
    /// The world placements are made in.
    pub world: Arc<dyn WorldClient>,
}

impl ResourceContext {
    /// Create a context.
    pub fn new(config: ProviderConfig, world: Arc<dyn WorldClient>) -> Self {
        Self { config, world }
    }
}

/// A managed resource type.
///
/// States and configurations cross this boundary as JSON; implementations
/// validate and deserialize them into their own typed model.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// The resource's schema.
    fn schema(&self) -> Schema;

    /// Validate configuration before planning.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validate_config(&self.schema(), config)
    }

    /// Plan changes. A null `proposed_state` plans a destroy.
    async fn plan(
        &self,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create the resource from its planned state.
    async fn create(&self, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh the resource's state.
    async fn read(&self, current_state: Value) -> Result<Value, ProviderError>;

    /// Update the resource in place.
    async fn update(&self, prior_state: Value, planned_state: Value)
        -> Result<Value, ProviderError>;

    /// Delete the resource.
    async fn delete(&self, current_state: Value) -> Result<(), ProviderError>;
}

/// Builds a resource for one request.
pub type ResourceConstructor = fn(ResourceContext) -> Box<dyn Resource>;

/// Maps resource type names to their constructors.
#[derive(Default, Clone)]
pub struct ResourceRegistry {
    constructors: BTreeMap<String, ResourceConstructor>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type.
    pub fn with_resource(
        mut self,
        type_name: impl Into<String>,
        constructor: ResourceConstructor,
    ) -> Self {
        self.constructors.insert(type_name.into(), constructor);
        self
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Whether a type name is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Instantiate a resource by type name.
    pub fn instantiate(
        &self,
        type_name: &str,
        context: ResourceContext,
    ) -> Result<Box<dyn Resource>, ProviderError> {
        let constructor = self
            .constructors
            .get(type_name)
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))?;
        Ok(constructor(context))
    }

    /// Schemas of every registered type.
    pub fn schemas(&self, context: &ResourceContext) -> BTreeMap<String, Schema> {
        self.constructors
            .iter()
            .map(|(name, constructor)| (name.clone(), constructor(context.clone()).schema()))
            .collect()
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
