//! Testing utilities for provider implementations.
//!
//! [`ProviderTester`] plays the host's part against a [`ProviderService`]
//! without a server: it plans a configuration against stored state and then
//! applies the plan the way a host would (create, update, replace or
//! delete). The `assert_*` helpers check plans and diagnostics.
//!
//! # Example
//!
//! ```ignore
//! use minecraft_provider::testing::{assert_plan_replaces, ProviderTester};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_replace_on_change() {
//!     let tester = ProviderTester::new(provider());
//!     tester.configure(json!({"base_dir": "/srv/schematics"})).await.unwrap();
//!
//!     let state = tester.converge("minecraft_schema", None, config()).await.unwrap();
//!     // ... edit the schematic file ...
//!     let plan = tester.plan("minecraft_schema", state, config()).await.unwrap();
//!     assert_plan_replaces(&plan);
//! }
//! ```

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::error::ProviderError;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::server::ProviderService;
use crate::types::PlanResult;

/// Drives a provider through plan and apply cycles.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap a provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names advertised in the provider's metadata.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Validate and then apply provider configuration.
    ///
    /// Error diagnostics from either step fail with [`TestError::Diagnostics`];
    /// configuration that does not validate is never applied.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        errors_only(self.provider.validate_provider_config(config.clone()).await?)?;
        errors_only(self.provider.configure(config).await?)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        errors_only(
            self.provider
                .validate_resource_config(resource_type, config)
                .await?,
        )
    }

    /// Plan `config` against `prior`. A null `config` plans a destroy.
    pub async fn plan(
        &self,
        resource_type: &str,
        prior: Option<Value>,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, prior, config.clone(), config)
            .await
    }

    /// Carry out a plan and return the refreshed state, or `None` once the
    /// resource is gone.
    ///
    /// A plan without changes only refreshes `prior`. A replacing plan
    /// deletes `prior` before creating the planned state.
    pub async fn apply(
        &self,
        resource_type: &str,
        prior: Option<Value>,
        plan: PlanResult,
    ) -> Result<Option<Value>, ProviderError> {
        let state = match prior {
            None if plan.is_destroy() => return Ok(None),
            Some(prior) if plan.is_destroy() => {
                debug!(resource_type, "Applying destroy");
                self.provider.delete(resource_type, prior).await?;
                return Ok(None);
            }
            None => {
                debug!(resource_type, "Applying create");
                self.provider
                    .create(resource_type, plan.planned_state)
                    .await?
            }
            Some(prior) if plan.requires_replace => {
                debug!(resource_type, "Applying replacement");
                self.provider.delete(resource_type, prior).await?;
                self.provider
                    .create(resource_type, plan.planned_state)
                    .await?
            }
            Some(prior) if plan.changes.is_empty() => prior,
            Some(prior) => {
                debug!(resource_type, changes = plan.changes.len(), "Applying update");
                self.provider
                    .update(resource_type, prior, plan.planned_state)
                    .await?
            }
        };
        self.provider.read(resource_type, state).await.map(Some)
    }

    /// Plan `config` against `prior` and apply the result.
    pub async fn converge(
        &self,
        resource_type: &str,
        prior: Option<Value>,
        config: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let plan = self.plan(resource_type, prior.clone(), config).await?;
        self.apply(resource_type, prior, plan).await
    }
}

/// Failure of a tester step that reports diagnostics.
#[derive(Debug, Error)]
pub enum TestError {
    /// The provider answered with error diagnostics.
    #[error("{}", describe_errors(.0))]
    Diagnostics(Vec<Diagnostic>),
    /// The provider returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn describe_errors(diagnostics: &[Diagnostic]) -> String {
    let lines: Vec<String> = diagnostics
        .iter()
        .map(|d| {
            let mut line = d.summary.clone();
            if let Some(detail) = &d.detail {
                line.push_str(": ");
                line.push_str(detail);
            }
            if let Some(attribute) = &d.attribute {
                line.push_str(&format!(" (at {})", attribute));
            }
            line
        })
        .collect();
    format!("{} error diagnostic(s): {}", diagnostics.len(), lines.join("; "))
}

fn errors_only(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<Diagnostic> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changes.iter().map(|c| c.path.as_str()).collect()
}

fn with_severity(
    diagnostics: &[Diagnostic],
    severity: DiagnosticSeverity,
) -> impl Iterator<Item = &Diagnostic> {
    diagnostics.iter().filter(move |d| d.severity == severity)
}

/// Assert that a plan changes nothing.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected an empty plan, got changes to {:?}",
        changed_paths(plan)
    );
}

/// Assert that a plan destroys and recreates the resource.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected a replacing plan, got in-place changes to {:?}",
        changed_paths(plan)
    );
}

/// Assert that a plan keeps the resource.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "Expected an in-place plan, got a replacement changing {:?}",
        changed_paths(plan)
    );
}

/// Assert that a plan changes the attribute at `path`.
///
/// # Panics
///
/// Panics if no change targets `path`.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let paths = changed_paths(plan);
    assert!(
        paths.contains(&path),
        "Expected '{}' among the changed attributes {:?}",
        path,
        paths
    );
}

/// Assert that no diagnostic is an error.
///
/// # Panics
///
/// Panics on the first error diagnostic.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    if let Some(error) = with_severity(diagnostics, DiagnosticSeverity::Error).next() {
        panic!("Expected no errors, got {:?}", error);
    }
}

/// Assert that some error diagnostic's summary contains `substring`.
///
/// # Panics
///
/// Panics if no error matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let mut errors = with_severity(diagnostics, DiagnosticSeverity::Error);
    assert!(
        errors.any(|d| d.summary.contains(substring)),
        "Expected an error containing '{}' in {:?}",
        substring,
        diagnostics
    );
}

/// Assert that some warning mentions `substring` in its summary or detail.
///
/// # Panics
///
/// Panics if no warning matches.
pub fn assert_has_warning(diagnostics: &[Diagnostic], substring: &str) {
    let mut warnings = with_severity(diagnostics, DiagnosticSeverity::Warning);
    assert!(
        warnings.any(|d| {
            d.summary.contains(substring)
                || d.detail.as_deref().is_some_and(|detail| detail.contains(substring))
        }),
        "Expected a warning mentioning '{}' in {:?}",
        substring,
        diagnostics
    );
}
