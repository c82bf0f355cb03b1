//! The Minecraft provider.
//!
//! [`MinecraftProvider`] implements [`ProviderService`] by looking up each
//! resource type in its [`ResourceRegistry`] and delegating to the resource.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::resource::{Resource, ResourceContext, ResourceRegistry};
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{PlanResult, ProviderMetadata, ServerCapabilities};
use crate::world::WorldClient;

/// Provider serving every type in its registry against one world.
pub struct MinecraftProvider {
    registry: ResourceRegistry,
    world: Arc<dyn WorldClient>,
    config: RwLock<Option<ProviderConfig>>,
}

impl MinecraftProvider {
    /// Create an unconfigured provider.
    pub fn new(registry: ResourceRegistry, world: Arc<dyn WorldClient>) -> Self {
        Self {
            registry,
            world,
            config: RwLock::new(None),
        }
    }

    /// The configuration applied by the last successful `configure`.
    pub async fn config(&self) -> Option<ProviderConfig> {
        self.config.read().await.clone()
    }

    async fn resource(&self, resource_type: &str) -> Result<Box<dyn Resource>, ProviderError> {
        let config = self.config.read().await.clone().ok_or_else(|| {
            ProviderError::FailedPrecondition(
                "provider must be configured before managing resources".to_string(),
            )
        })?;
        self.registry
            .instantiate(resource_type, ResourceContext::new(config, Arc::clone(&self.world)))
    }
}

#[async_trait::async_trait]
impl ProviderService for MinecraftProvider {
    fn schema(&self) -> ProviderSchema {
        let context = ResourceContext::new(ProviderConfig::default(), Arc::clone(&self.world));
        let mut schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        schema.resources = self.registry.schemas(&context);
        schema
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.registry.type_names(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(ProviderConfig::validate(&config))
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = ProviderConfig::validate(&config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }

        let parsed = ProviderConfig::from_value(config)?;
        info!(base_dir = ?parsed.base_dir, "Provider configured");
        *self.config.write().await = Some(parsed);
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        debug!("Provider stopping");
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        if !self.registry.contains(resource_type) {
            return Err(ProviderError::UnknownResource(resource_type.to_string()));
        }
        let context = ResourceContext::new(
            self.config().await.unwrap_or_default(),
            Arc::clone(&self.world),
        );
        let resource = self.registry.instantiate(resource_type, context)?;
        Ok(resource.validate(&config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.resource(resource_type)
            .await?
            .plan(prior_state, proposed_state, config)
            .await
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type).await?.create(planned_state).await
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type).await?.read(current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.resource(resource_type)
            .await?
            .update(prior_state, planned_state)
            .await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.resource(resource_type).await?.delete(current_state).await
    }
}
