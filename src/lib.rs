//! Command Provider
//!
//! This crate implements the engine of an infrastructure provider whose single
//! resource kind delegates its lifecycle to user-supplied commands. Property trees
//! arrive dynamically typed; the crate validates and decodes them into typed records
//! and drives the Check/Diff/Create/Read/Update/Delete lifecycle by running the
//! command configured for each phase.
//!
//! # Overview
//!
//! - **Value model** ([`value`]): self-describing property trees and their JSON form
//! - **Schemas** ([`schema`]): static shapes and field tags for typed records
//! - **Validation and decoding** ([`validation`], [`decode`]): one traversal that
//!   either collects every failure or stops at the first
//! - **Executor** ([`exec`]): runs a command and captures its output, observing cancellation
//! - **Provider** ([`provider`]): the [`CommandProvider`] lifecycle
//! - **Phase contract** ([`server`]): the [`ResourceProvider`] trait and its
//!   `tonic::Status` adapter
//! - **Error types**: [`ProviderError`] and its RPC status mapping
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```no_run
//! use command_provider::{init_logging, CommandProvider, DiffRequest, ResourceProvider, Urn};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = CommandProvider::new();
//!     let urn = Urn::new("dev", "infra", command_provider::COMMAND_TYPE, "build");
//!
//!     let diff = provider
//!         .diff(DiffRequest {
//!             urn: urn.to_string(),
//!             id: "build".to_string(),
//!             olds: json!({"inputs": {"compare": "v1"}}),
//!             news: json!({"compare": "v2", "create": {"command": ["make"]}}),
//!         })
//!         .await?;
//!     assert!(diff.has_changes());
//!     Ok(())
//! }
//! ```
//!
//! # Resource inputs
//!
//! ```text
//! {
//!   "compare": "<fingerprint>",
//!   "create":  {"command": ["..."], "stdin": "...", "environment": {"K": "V"}},
//!   "read":    {...},
//!   "update":  {...},
//!   "delete":  {...},
//!   "diff":    {...}
//! }
//! ```
//!
//! Only `create` is required.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod decode;
pub mod error;
pub mod exec;
pub mod logging;
pub mod provider;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;
pub mod value;

// Re-export main types at crate root
pub use decode::{decode_as, Decode};
pub use error::ProviderError;
pub use exec::{CommandExecutor, CommandOutput, ExecError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{CommandProvider, ProviderOptions};
pub use server::{GetPluginInfo, ProviderHandler, ResourceProvider};
pub use types::{
    CheckRequest, CheckResponse, CommandResourceArgs, CommandSpec, CreateRequest,
    CreateResponse, DeleteRequest, DiffChanges, DiffRequest, DiffResponse, Phase, PluginInfo,
    ReadRequest, ReadResponse, UpdateRequest, UpdateResponse, Urn, COMMAND_TYPE,
    LEGACY_COMMAND_TYPE,
};
pub use validation::{validate, CheckFailure, DecodeError, FailureKind};
pub use value::{PropertyMap, PropertyValue, UNKNOWN_SENTINEL};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tokio_util::sync::CancellationToken;
pub use tonic;
pub use tracing;
