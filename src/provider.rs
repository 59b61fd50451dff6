//! The command resource lifecycle.
//!
//! [`CommandProvider`] implements [`ResourceProvider`] for a single resource kind whose
//! behavior is delegated to user-supplied commands. Each lifecycle phase looks up its
//! command under the phase key (`create`, `read`, `update`, `delete`, `diff`), decodes
//! it as a [`CommandSpec`] and runs it with the shared [`CommandExecutor`].
//!
//! # State layout
//!
//! Create and Update return `{stdout, stderr, inputs}`, where `inputs` is the input
//! tree the command was run from. Read and Delete receive that state back and look
//! their command up in the nested `inputs` object.
//!
//! # Change detection
//!
//! Diff first compares the `compare` fingerprint and the `update` command of the old
//! and new inputs. If neither changed and a `diff` command is given, the command
//! decides: exit code 0 means the resource must change.
//!
//! # Example
//!
//! ```no_run
//! use command_provider::{CommandProvider, CreateRequest, ResourceProvider, Urn};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), command_provider::ProviderError> {
//! let provider = CommandProvider::new();
//! let urn = Urn::new("dev", "infra", "command:v1:Command", "hello");
//!
//! let created = provider
//!     .create(CreateRequest {
//!         urn: urn.to_string(),
//!         properties: json!({"create": {"command": ["echo", "hello"]}}),
//!     })
//!     .await?;
//! assert_eq!(created.properties["stdout"], "hello\n");
//! # Ok(())
//! # }
//! ```

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::decode::{decode_property, validate_property};
use crate::error::ProviderError;
use crate::exec::{CommandExecutor, CommandOutput};
use crate::server::ResourceProvider;
use crate::types::{
    CheckRequest, CheckResponse, CommandResourceArgs, CommandSpec, CreateRequest, CreateResponse,
    DeleteRequest, DiffRequest, DiffResponse, Phase, PluginInfo, ReadRequest, ReadResponse,
    UpdateRequest, UpdateResponse, Urn, COMMAND_TYPE, LEGACY_COMMAND_TYPE, PROVIDER_NAME,
};
use crate::validation::{join_path, CheckFailure, DecodeError};
use crate::value::{map_to_json, MarshalOptions, PropertyMap, PropertyValue};

/// Options for a [`CommandProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Provider name, used in logs.
    pub name: String,
    /// Version reported by GetPluginInfo.
    pub version: String,
    /// Resource types this provider accepts.
    pub resource_types: Vec<String>,
    /// Validate inputs during Check and report failures.
    pub strict_check: bool,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            name: PROVIDER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            resource_types: vec![COMMAND_TYPE.to_string(), LEGACY_COMMAND_TYPE.to_string()],
            strict_check: false,
        }
    }
}

impl ProviderOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the reported version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Accept an additional resource type.
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_types.push(resource_type.into());
        self
    }

    /// Enable or disable input validation during Check.
    pub fn with_strict_check(mut self, strict: bool) -> Self {
        self.strict_check = strict;
        self
    }
}

/// Drives the lifecycle of command resources.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    options: ProviderOptions,
    cancel: CancellationToken,
    executor: CommandExecutor,
}

impl Default for CommandProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandProvider {
    /// Create a provider with default options.
    pub fn new() -> Self {
        Self::with_options(ProviderOptions::default())
    }

    /// Create a provider with explicit options.
    pub fn with_options(options: ProviderOptions) -> Self {
        let cancel = CancellationToken::new();
        Self {
            options,
            executor: CommandExecutor::new(cancel.clone()),
            cancel,
        }
    }

    /// The provider's options.
    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    /// The process-wide cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn resolve_urn(&self, raw: &str) -> Result<Urn, ProviderError> {
        let urn = Urn::parse(raw)?;
        if !self
            .options
            .resource_types
            .iter()
            .any(|t| t == urn.resource_type())
        {
            return Err(ProviderError::UnknownResource(urn.resource_type().to_string()));
        }
        Ok(urn)
    }

    async fn run_phase(
        &self,
        urn: &Urn,
        phase: Phase,
        spec: &CommandSpec,
    ) -> Result<CommandOutput, ProviderError> {
        debug!(provider = %self.options.name, urn = %urn, phase = %phase, "Running command");
        let output = self.executor.run(spec).await?;
        if !output.success() {
            warn!(
                urn = %urn,
                phase = %phase,
                exit_code = output.exit_code,
                "Command exited with non-zero code"
            );
            return Err(ProviderError::CommandFailed {
                phase,
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

/// Convert a boundary tree into a property map. A missing tree is an empty map.
fn properties(value: &Value) -> Result<PropertyMap, ProviderError> {
    match PropertyValue::from_json(value, MarshalOptions::boundary()) {
        PropertyValue::Object(map) => Ok(map),
        PropertyValue::Null => Ok(PropertyMap::new()),
        other => Err(ProviderError::InvalidRequest(format!(
            "expected an object of properties, received a {} value",
            other.type_name()
        ))),
    }
}

/// The inputs recorded in a state tree, or the tree itself when it has none.
fn recorded_inputs(mut props: PropertyMap) -> PropertyMap {
    match props.remove("inputs") {
        Some(PropertyValue::Object(inputs)) => inputs,
        Some(other) => {
            props.insert("inputs".to_string(), other);
            props
        },
        None => props,
    }
}

/// Look up and decode the command for `phase`. `None` when the phase key is absent.
fn phase_command(props: &PropertyMap, phase: Phase) -> Result<Option<CommandSpec>, ProviderError> {
    let value = match props.get(phase.key()) {
        None | Some(PropertyValue::Null) => return Ok(None),
        Some(value) => value,
    };
    let spec: CommandSpec = decode_property(phase.key(), value)?;
    if spec.argv.is_empty() {
        return Err(DecodeError::Failure(empty_command(phase.key())).into());
    }
    Ok(Some(spec))
}

fn empty_command(key: &str) -> CheckFailure {
    CheckFailure::invalid(&join_path(key, "command"), "command must not be empty")
}

/// Failures for phase commands given with an empty `command` array.
fn empty_command_failures(props: &PropertyMap) -> Vec<CheckFailure> {
    [Phase::Create, Phase::Read, Phase::Update, Phase::Delete, Phase::Diff]
        .into_iter()
        .filter(|phase| {
            props
                .get(phase.key())
                .and_then(PropertyValue::as_object)
                .and_then(|spec| spec.get("command"))
                .and_then(PropertyValue::as_array)
                .is_some_and(<[PropertyValue]>::is_empty)
        })
        .map(|phase| empty_command(phase.key()))
        .collect()
}

/// The `compare` fingerprint, with absent, null and `""` all reading as unset.
fn fingerprint(props: &PropertyMap) -> Option<&PropertyValue> {
    props
        .get("compare")
        .filter(|value| !value.is_null() && value.as_str() != Some(""))
}

fn fingerprint_changed(old: &PropertyMap, new: &PropertyMap) -> bool {
    match fingerprint(new) {
        Some(value) if value.contains_unknowns() => true,
        new_compare => fingerprint(old) != new_compare,
    }
}

fn update_changed(old: &PropertyMap, new: &PropertyMap) -> Result<bool, ProviderError> {
    let key = Phase::Update.key();
    let new_update = match new.get(key) {
        Some(value) if value.contains_unknowns() => return Ok(true),
        Some(value) => decode_property::<Option<CommandSpec>>(key, value)?,
        None => None,
    };
    let old_update = match old.get(key) {
        Some(value) => match decode_property::<Option<CommandSpec>>(key, value) {
            Ok(spec) => spec,
            Err(e) => {
                debug!(error = %e, "Stored update command does not decode, treating as changed");
                return Ok(true);
            },
        },
        None => None,
    };
    Ok(old_update != new_update)
}

fn resource_state(output: CommandOutput, inputs: Value) -> Value {
    json!({
        "stdout": output.stdout,
        "stderr": output.stderr,
        "inputs": inputs,
    })
}

#[async_trait::async_trait]
impl ResourceProvider for CommandProvider {
    #[instrument(skip(self, request), fields(urn = %request.urn))]
    async fn check(&self, request: CheckRequest) -> Result<CheckResponse, ProviderError> {
        self.resolve_urn(&request.urn)?;

        if !self.options.strict_check {
            return Ok(CheckResponse {
                inputs: request.news,
                failures: Vec::new(),
            });
        }

        let news = properties(&request.news)?;
        let mut failures =
            validate_property::<CommandResourceArgs>("", &PropertyValue::Object(news.clone()))?;
        failures.extend(empty_command_failures(&news));
        if !failures.is_empty() {
            debug!(failures = failures.len(), "Check found invalid inputs");
        }

        Ok(CheckResponse {
            inputs: request.news,
            failures,
        })
    }

    #[instrument(skip(self, request), fields(urn = %request.urn))]
    async fn diff(&self, request: DiffRequest) -> Result<DiffResponse, ProviderError> {
        let urn = self.resolve_urn(&request.urn)?;
        let olds = properties(&request.olds)?;
        let news = properties(&request.news)?;

        let mut needs_change = false;
        match olds.get("inputs").and_then(PropertyValue::as_object) {
            Some(old_inputs) if !old_inputs.is_empty() => {
                let fingerprint = fingerprint_changed(old_inputs, &news);
                let update = update_changed(old_inputs, &news)?;
                debug!(
                    fingerprint_changed = fingerprint,
                    update_changed = update,
                    "Compared inputs"
                );
                needs_change = fingerprint || update;
            },
            _ => debug!("No previous inputs to compare"),
        }

        if !needs_change {
            match news.get(Phase::Diff.key()) {
                Some(value) if value.contains_unknowns() => {
                    debug!("Diff command is not known yet, assuming changes");
                    needs_change = true;
                },
                _ => {
                    if let Some(spec) = phase_command(&news, Phase::Diff)? {
                        let output = self.executor.run(&spec).await?;
                        debug!(exit_code = output.exit_code, "Diff command finished");
                        needs_change = output.success();
                    }
                },
            }
        }

        info!(urn = %urn, needs_change, "Diff completed");
        Ok(if needs_change {
            DiffResponse::changed()
        } else {
            DiffResponse::no_change()
        })
    }

    #[instrument(skip(self, request), fields(urn = %request.urn))]
    async fn create(&self, request: CreateRequest) -> Result<CreateResponse, ProviderError> {
        let urn = self.resolve_urn(&request.urn)?;
        let props = properties(&request.properties)?;
        let spec = phase_command(&props, Phase::Create)?
            .ok_or(ProviderError::CommandUnspecified(Phase::Create))?;

        let output = self.run_phase(&urn, Phase::Create, &spec).await?;
        let id = Uuid::new_v4().to_string();
        info!(urn = %urn, id = %id, "Created resource");

        Ok(CreateResponse {
            id,
            properties: resource_state(output, request.properties),
        })
    }

    #[instrument(skip(self, request), fields(urn = %request.urn, id = %request.id))]
    async fn read(&self, request: ReadRequest) -> Result<ReadResponse, ProviderError> {
        let urn = self.resolve_urn(&request.urn)?;
        let inputs = recorded_inputs(properties(&request.inputs)?);

        let Some(spec) = phase_command(&inputs, Phase::Read)? else {
            debug!(urn = %urn, "No read command, keeping known state");
            return Ok(ReadResponse {
                id: request.id,
                properties: request.properties,
            });
        };

        let output = self.run_phase(&urn, Phase::Read, &spec).await?;
        debug!(urn = %urn, "Refreshed resource");
        Ok(ReadResponse {
            id: request.id,
            properties: resource_state(output, map_to_json(&inputs)),
        })
    }

    #[instrument(skip(self, request), fields(urn = %request.urn, id = %request.id))]
    async fn update(&self, request: UpdateRequest) -> Result<UpdateResponse, ProviderError> {
        let urn = self.resolve_urn(&request.urn)?;
        let news = properties(&request.news)?;
        let spec = phase_command(&news, Phase::Update)?
            .ok_or(ProviderError::CommandUnspecified(Phase::Update))?;

        let output = self.run_phase(&urn, Phase::Update, &spec).await?;
        info!(urn = %urn, "Updated resource");

        Ok(UpdateResponse {
            properties: resource_state(output, request.news),
        })
    }

    #[instrument(skip(self, request), fields(urn = %request.urn, id = %request.id))]
    async fn delete(&self, request: DeleteRequest) -> Result<(), ProviderError> {
        let urn = self.resolve_urn(&request.urn)?;
        let state = recorded_inputs(properties(&request.properties)?);

        match phase_command(&state, Phase::Delete)? {
            Some(spec) => {
                self.run_phase(&urn, Phase::Delete, &spec).await?;
                info!(urn = %urn, "Deleted resource");
            },
            None => debug!(urn = %urn, "No delete command, skipping"),
        }
        Ok(())
    }

    async fn cancel(&self) -> Result<(), ProviderError> {
        if !self.cancel.is_cancelled() {
            info!(provider = %self.options.name, "Cancelling in-flight commands");
        }
        self.cancel.cancel();
        Ok(())
    }

    async fn get_plugin_info(&self) -> Result<PluginInfo, ProviderError> {
        Ok(PluginInfo {
            version: self.options.version.clone(),
        })
    }
}
