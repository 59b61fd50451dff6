//! Testing utilities for provider implementations.
//!
//! This module provides utilities to drive [`ResourceProvider`] implementations
//! phase by phase without a transport.
//!
//! # Example
//!
//! ```no_run
//! use command_provider::testing::ProviderTester;
//! use command_provider::CommandProvider;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), command_provider::testing::TestError> {
//! let tester = ProviderTester::new(CommandProvider::new());
//!
//! let resource = tester
//!     .lifecycle_create("greeting", json!({"create": {"command": ["echo", "hi"]}}))
//!     .await?;
//! assert_eq!(resource.state["stdout"], "hi\n");
//! # Ok(())
//! # }
//! ```

use serde_json::Value;

use crate::error::ProviderError;
use crate::server::ResourceProvider;
use crate::types::{
    CheckRequest, CheckResponse, CreateRequest, CreateResponse, DeleteRequest, DiffRequest,
    DiffResponse, PluginInfo, ReadRequest, UpdateRequest, UpdateResponse, Urn, COMMAND_TYPE,
};
use crate::validation::CheckFailure;

/// A test harness for provider implementations.
///
/// The tester builds URNs for named resources of one resource type and wraps every
/// phase in a simplified call.
pub struct ProviderTester<P: ResourceProvider> {
    provider: P,
    stack: String,
    project: String,
    resource_type: String,
}

/// A resource as the tester tracks it between lifecycle steps.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResource {
    /// The resource name.
    pub name: String,
    /// The id returned by create.
    pub id: String,
    /// The current state.
    pub state: Value,
    /// The inputs the state was produced from.
    pub inputs: Value,
}

impl<P: ResourceProvider> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            stack: "test".to_string(),
            project: "test".to_string(),
            resource_type: COMMAND_TYPE.to_string(),
        }
    }

    /// Use a different resource type in generated URNs.
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    /// Use a different stack and project in generated URNs.
    pub fn with_stack(mut self, stack: impl Into<String>, project: impl Into<String>) -> Self {
        self.stack = stack.into();
        self.project = project.into();
        self
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The URN of the resource called `name`.
    pub fn urn(&self, name: &str) -> String {
        Urn::new(&self.stack, &self.project, &self.resource_type, name).to_string()
    }

    // =========================================================================
    // Phases
    // =========================================================================

    /// Check new inputs, failing if the provider reports any failure.
    ///
    /// Returns the inputs to use for later phases.
    pub async fn check(&self, name: &str, news: Value) -> Result<Value, TestError> {
        let resp = self.check_raw(name, Value::Null, news).await?;
        if resp.failures.is_empty() {
            Ok(resp.inputs)
        } else {
            Err(TestError::Failures(resp.failures))
        }
    }

    /// Check new inputs and return the full response.
    pub async fn check_raw(
        &self,
        name: &str,
        olds: Value,
        news: Value,
    ) -> Result<CheckResponse, ProviderError> {
        self.provider
            .check(CheckRequest {
                urn: self.urn(name),
                olds,
                news,
            })
            .await
    }

    /// Diff a resource's state against new inputs.
    pub async fn diff(
        &self,
        name: &str,
        id: &str,
        olds: Value,
        news: Value,
    ) -> Result<DiffResponse, ProviderError> {
        self.provider
            .diff(DiffRequest {
                urn: self.urn(name),
                id: id.to_string(),
                olds,
                news,
            })
            .await
    }

    /// Create a resource.
    pub async fn create(
        &self,
        name: &str,
        properties: Value,
    ) -> Result<CreateResponse, ProviderError> {
        self.provider
            .create(CreateRequest {
                urn: self.urn(name),
                properties,
            })
            .await
    }

    /// Read a resource, returning its refreshed state.
    pub async fn read(
        &self,
        name: &str,
        id: &str,
        properties: Value,
        inputs: Value,
    ) -> Result<Value, ProviderError> {
        let resp = self
            .provider
            .read(ReadRequest {
                urn: self.urn(name),
                id: id.to_string(),
                properties,
                inputs,
            })
            .await?;
        Ok(resp.properties)
    }

    /// Update a resource.
    pub async fn update(
        &self,
        name: &str,
        id: &str,
        olds: Value,
        news: Value,
    ) -> Result<UpdateResponse, ProviderError> {
        self.provider
            .update(UpdateRequest {
                urn: self.urn(name),
                id: id.to_string(),
                olds,
                news,
            })
            .await
    }

    /// Delete a resource.
    pub async fn delete(
        &self,
        name: &str,
        id: &str,
        properties: Value,
    ) -> Result<(), ProviderError> {
        self.provider
            .delete(DeleteRequest {
                urn: self.urn(name),
                id: id.to_string(),
                properties,
            })
            .await
    }

    /// Cancel the provider.
    pub async fn cancel(&self) -> Result<(), ProviderError> {
        self.provider.cancel().await
    }

    /// Get the provider's plugin info.
    pub async fn plugin_info(&self) -> Result<PluginInfo, ProviderError> {
        self.provider.get_plugin_info().await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: check → create → read.
    pub async fn lifecycle_create(
        &self,
        name: &str,
        config: Value,
    ) -> Result<TestResource, TestError> {
        let inputs = self.check(name, config).await?;
        let created = self.create(name, inputs.clone()).await?;
        let state = self
            .read(name, &created.id, created.properties, inputs.clone())
            .await?;

        Ok(TestResource {
            name: name.to_string(),
            id: created.id,
            state,
            inputs,
        })
    }

    /// Run a full update lifecycle: check → diff → update → read.
    ///
    /// The update is skipped when the diff reports no changes.
    pub async fn lifecycle_update(
        &self,
        resource: &TestResource,
        config: Value,
    ) -> Result<TestResource, TestError> {
        let name = resource.name.as_str();
        let inputs = self.check(name, config).await?;

        let diff = self
            .diff(name, &resource.id, resource.state.clone(), inputs.clone())
            .await?;
        if !diff.has_changes() {
            return Ok(TestResource {
                inputs,
                ..resource.clone()
            });
        }

        let updated = self
            .update(name, &resource.id, resource.state.clone(), inputs.clone())
            .await?;
        let state = self
            .read(name, &resource.id, updated.properties, inputs.clone())
            .await?;

        Ok(TestResource {
            name: resource.name.clone(),
            id: resource.id.clone(),
            state,
            inputs,
        })
    }

    /// Run a delete lifecycle.
    pub async fn lifecycle_delete(&self, resource: &TestResource) -> Result<(), TestError> {
        self.delete(&resource.name, &resource.id, resource.state.clone())
            .await?;
        Ok(())
    }

    /// Run a full CRUD lifecycle: create → update → delete.
    ///
    /// Returns the resource after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        name: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<TestResource, TestError> {
        let created = self.lifecycle_create(name, initial_config).await?;
        let updated = self.lifecycle_update(&created, updated_config).await?;
        self.lifecycle_delete(&updated).await?;
        Ok(updated)
    }
}

/// Error type for test operations.
#[derive(Debug)]
pub enum TestError {
    /// Check reported invalid inputs.
    Failures(Vec<CheckFailure>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Failures(failures) => {
                writeln!(f, "Check failed with {} failure(s):", failures.len())?;
                for failure in failures {
                    writeln!(f, "  {}", failure)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a diff reports changes.
///
/// # Panics
///
/// Panics if the diff reports no changes.
pub fn assert_diff_changes(diff: &DiffResponse) {
    assert!(
        diff.has_changes(),
        "Expected diff to report changes, but it reported none"
    );
}

/// Assert that a diff reports no changes.
///
/// # Panics
///
/// Panics if the diff reports changes.
pub fn assert_diff_no_changes(diff: &DiffResponse) {
    assert!(
        !diff.has_changes(),
        "Expected diff to report no changes, but it reported changes"
    );
}

/// Assert that a check found nothing wrong.
///
/// # Panics
///
/// Panics if there are any failures.
pub fn assert_no_failures(failures: &[CheckFailure]) {
    assert!(
        failures.is_empty(),
        "Expected no failures, but got {}: {:?}",
        failures.len(),
        failures.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}

/// Assert that a check reported a failure at `property`.
///
/// # Panics
///
/// Panics if no failure is reported at the given path.
pub fn assert_failure_at(failures: &[CheckFailure], property: &str) {
    assert!(
        failures.iter().any(|f| f.property == property),
        "Expected a failure at '{}', but found failures at {:?}",
        property,
        failures.iter().map(|f| &f.property).collect::<Vec<_>>()
    );
}
