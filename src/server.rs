//! The phase contract a transport drives.
//!
//! [`ResourceProvider`] is the async trait every phase call goes through. A transport
//! wraps an implementation in a [`ProviderHandler`], which logs each call and maps
//! [`ProviderError`] onto `tonic::Status`.
//!
//! ```no_run
//! use command_provider::{CommandProvider, GetPluginInfo, ProviderHandler};
//!
//! # async fn example() -> Result<(), tonic::Status> {
//! let handler = ProviderHandler::new(CommandProvider::new());
//! let info = handler.get_plugin_info(GetPluginInfo).await?;
//! println!("provider version {}", info.version);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::error::ProviderError;
use crate::types::{
    CheckRequest, CheckResponse, CreateRequest, CreateResponse, DeleteRequest, DiffRequest,
    DiffResponse, PluginInfo, ReadRequest, ReadResponse, UpdateRequest, UpdateResponse,
};

/// Trait that resource providers implement.
///
/// Properties cross this boundary as `serde_json::Value` trees, with unknown values
/// encoded by [`crate::value::UNKNOWN_SENTINEL`].
#[async_trait::async_trait]
pub trait ResourceProvider: Send + Sync + 'static {
    /// Validate new inputs and return the inputs to use.
    async fn check(&self, request: CheckRequest) -> Result<CheckResponse, ProviderError>;

    /// Decide whether a resource must change.
    async fn diff(&self, request: DiffRequest) -> Result<DiffResponse, ProviderError>;

    /// Create a new resource.
    async fn create(&self, request: CreateRequest) -> Result<CreateResponse, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, request: ReadRequest) -> Result<ReadResponse, ProviderError>;

    /// Update an existing resource.
    async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, request: DeleteRequest) -> Result<(), ProviderError>;

    /// Abort in-flight and future operations.
    async fn cancel(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Return provider metadata.
    async fn get_plugin_info(&self) -> Result<PluginInfo, ProviderError>;
}

/// Marker request for [`ProviderHandler::get_plugin_info`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetPluginInfo;

/// Wraps a [`ResourceProvider`] for a transport: logs every call and converts errors
/// into `tonic::Status`.
pub struct ProviderHandler<P: ResourceProvider> {
    provider: Arc<P>,
}

impl<P: ResourceProvider> Clone for ProviderHandler<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: ResourceProvider> ProviderHandler<P> {
    /// Wrap a provider.
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Serve a Check call.
    #[instrument(skip(self, request), name = "rpc.check", fields(urn = %request.urn))]
    pub async fn check(&self, request: CheckRequest) -> Result<CheckResponse, tonic::Status> {
        debug!("Check called");
        match self.provider.check(request).await {
            Ok(resp) => {
                if resp.failures.is_empty() {
                    debug!("Check completed successfully");
                } else {
                    info!(failures = resp.failures.len(), "Check completed with failures");
                }
                Ok(resp)
            },
            Err(e) => {
                error!(error = %e, "Check failed");
                Err(e.into())
            },
        }
    }

    /// Serve a Diff call.
    #[instrument(skip(self, request), name = "rpc.diff", fields(urn = %request.urn))]
    pub async fn diff(&self, request: DiffRequest) -> Result<DiffResponse, tonic::Status> {
        debug!("Diff called");
        match self.provider.diff(request).await {
            Ok(resp) => {
                debug!(changes = resp.has_changes(), "Diff completed");
                Ok(resp)
            },
            Err(e) => {
                error!(error = %e, "Diff failed");
                Err(e.into())
            },
        }
    }

    /// Serve a Create call.
    #[instrument(skip(self, request), name = "rpc.create", fields(urn = %request.urn))]
    pub async fn create(&self, request: CreateRequest) -> Result<CreateResponse, tonic::Status> {
        info!("Create called");
        match self.provider.create(request).await {
            Ok(resp) => {
                info!(id = %resp.id, "Create completed successfully");
                Ok(resp)
            },
            Err(e) => {
                error!(error = %e, "Create failed");
                Err(e.into())
            },
        }
    }

    /// Serve a Read call.
    #[instrument(skip(self, request), name = "rpc.read", fields(urn = %request.urn))]
    pub async fn read(&self, request: ReadRequest) -> Result<ReadResponse, tonic::Status> {
        debug!("Read called");
        match self.provider.read(request).await {
            Ok(resp) => {
                debug!("Read completed successfully");
                Ok(resp)
            },
            Err(e) => {
                error!(error = %e, "Read failed");
                Err(e.into())
            },
        }
    }

    /// Serve an Update call.
    #[instrument(skip(self, request), name = "rpc.update", fields(urn = %request.urn))]
    pub async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, tonic::Status> {
        info!("Update called");
        match self.provider.update(request).await {
            Ok(resp) => {
                info!("Update completed successfully");
                Ok(resp)
            },
            Err(e) => {
                error!(error = %e, "Update failed");
                Err(e.into())
            },
        }
    }

    /// Serve a Delete call.
    #[instrument(skip(self, request), name = "rpc.delete", fields(urn = %request.urn))]
    pub async fn delete(&self, request: DeleteRequest) -> Result<(), tonic::Status> {
        info!("Delete called");
        match self.provider.delete(request).await {
            Ok(()) => {
                info!("Delete completed successfully");
                Ok(())
            },
            Err(e) => {
                error!(error = %e, "Delete failed");
                Err(e.into())
            },
        }
    }

    /// Serve a Cancel call.
    #[instrument(skip(self), name = "rpc.cancel")]
    pub async fn cancel(&self) -> Result<(), tonic::Status> {
        info!("Cancel called");
        self.provider.cancel().await.map_err(|e| {
            error!(error = %e, "Cancel failed");
            e.into()
        })
    }

    /// Serve a GetPluginInfo call.
    #[instrument(skip(self, _request), name = "rpc.get_plugin_info")]
    pub async fn get_plugin_info(
        &self,
        _request: GetPluginInfo,
    ) -> Result<PluginInfo, tonic::Status> {
        debug!("GetPluginInfo called");
        self.provider.get_plugin_info().await.map_err(Into::into)
    }
}
