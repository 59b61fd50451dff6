//! Protocol types for the command resource.
//!
//! Request and response records carry properties as `serde_json::Value`, the same
//! representation a transport hands over. [`CommandSpec`] and [`CommandResourceArgs`]
//! are the statically typed views decoded from those properties.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decode::{Decode, RecordFields};
use crate::error::ProviderError;
use crate::schema::{RecordSchema, SchemaError, Shape};
use crate::validation::Decoded;

/// The resource type implemented by this provider.
pub const COMMAND_TYPE: &str = "command:v1:Command";

/// The resource type used by older SDKs, still accepted.
pub const LEGACY_COMMAND_TYPE: &str = "command:v1:exec";

/// The default provider name reported in logs.
pub const PROVIDER_NAME: &str = "command";

/// One lifecycle phase that runs a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Provision the resource.
    Create,
    /// Refresh the resource's state.
    Read,
    /// Change the resource in place.
    Update,
    /// Tear the resource down.
    Delete,
    /// Detect drift.
    Diff,
}

impl Phase {
    /// The property key holding this phase's command.
    pub fn key(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Diff => "diff",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A command to run for one phase.
///
/// On the wire this is `{command: [..], stdin?: string, environment?: {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    /// The program followed by its arguments.
    #[serde(rename = "command")]
    pub argv: Vec<String>,
    /// Text written to the program's stdin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    /// Replaces the inherited environment when non-empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl CommandSpec {
    /// A command with no stdin and the inherited environment.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
            environment: BTreeMap::new(),
        }
    }

    /// Set the stdin text.
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// The program to run, if any.
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

impl Decode for CommandSpec {
    fn shape() -> Shape {
        RecordSchema::new("CommandSpec")
            .with_field("Argv", "command", Vec::<String>::shape())
            .with_field("Stdin", "stdin,optional", Option::<String>::shape())
            .with_field(
                "Environment",
                "environment,optional",
                BTreeMap::<String, String>::shape(),
            )
            .into()
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        let mut fields = RecordFields::new("CommandSpec", decoded)?;
        let stdin: Option<String> = fields.take("Stdin")?;
        Ok(Self {
            argv: fields.take("Argv")?,
            stdin: stdin.filter(|s| !s.is_empty()),
            environment: fields.take("Environment")?,
        })
    }
}

/// The full input record of a command resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandResourceArgs {
    /// Opaque fingerprint; a change forces an update.
    pub compare: Option<String>,
    /// How to create the resource.
    pub create: CommandSpec,
    /// How to refresh the resource.
    pub read: Option<CommandSpec>,
    /// How to update the resource in place.
    pub update: Option<CommandSpec>,
    /// How to delete the resource.
    pub delete: Option<CommandSpec>,
    /// How to detect drift; exit 0 means the resource must change.
    pub diff: Option<CommandSpec>,
}

impl Decode for CommandResourceArgs {
    fn shape() -> Shape {
        RecordSchema::new("CommandResourceArgs")
            .with_field("Compare", ",optional", Option::<String>::shape())
            .with_field("Create", "", CommandSpec::shape())
            .with_field("Read", ",optional", Option::<CommandSpec>::shape())
            .with_field("Update", ",optional", Option::<CommandSpec>::shape())
            .with_field("Delete", ",optional", Option::<CommandSpec>::shape())
            .with_field("Diff", ",optional", Option::<CommandSpec>::shape())
            .into()
    }

    fn from_decoded(decoded: Decoded) -> Result<Self, SchemaError> {
        let mut fields = RecordFields::new("CommandResourceArgs", decoded)?;
        Ok(Self {
            compare: fields.take("Compare")?,
            create: fields.take("Create")?,
            read: fields.take("Read")?,
            update: fields.take("Update")?,
            delete: fields.take("Delete")?,
            diff: fields.take("Diff")?,
        })
    }
}

/// A parsed resource URN: `urn:pulumi:<stack>::<project>::<qualified type>::<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Urn {
    raw: String,
    stack: String,
    project: String,
    qualified_type: String,
    name: String,
}

impl Urn {
    const PREFIX: &'static str = "urn:pulumi:";

    /// Parse a URN string.
    pub fn parse(raw: &str) -> Result<Self, ProviderError> {
        let invalid = || ProviderError::InvalidRequest(format!("malformed URN: {}", raw));

        let rest = raw.strip_prefix(Self::PREFIX).ok_or_else(invalid)?;
        let mut parts = rest.splitn(4, "::");
        let stack = parts.next().ok_or_else(invalid)?;
        let project = parts.next().ok_or_else(invalid)?;
        let qualified_type = parts.next().ok_or_else(invalid)?;
        let name = parts.next().ok_or_else(invalid)?;
        if qualified_type.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            raw: raw.to_string(),
            stack: stack.to_string(),
            project: project.to_string(),
            qualified_type: qualified_type.to_string(),
            name: name.to_string(),
        })
    }

    /// Build a URN from its parts.
    pub fn new(stack: &str, project: &str, resource_type: &str, name: &str) -> Self {
        Self {
            raw: format!(
                "{}{}::{}::{}::{}",
                Self::PREFIX,
                stack,
                project,
                resource_type,
                name
            ),
            stack: stack.to_string(),
            project: project.to_string(),
            qualified_type: resource_type.to_string(),
            name: name.to_string(),
        }
    }

    /// The resource type: the last `$`-separated part of the qualified type.
    pub fn resource_type(&self) -> &str {
        self.qualified_type
            .rsplit('$')
            .next()
            .unwrap_or(&self.qualified_type)
    }

    /// The stack name.
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// The project name.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The URN as a string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Input to [`crate::ResourceProvider::check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    /// The resource URN.
    pub urn: String,
    /// The inputs from the previous deployment, if any.
    #[serde(default)]
    pub olds: serde_json::Value,
    /// The new inputs.
    pub news: serde_json::Value,
}

/// Output of [`crate::ResourceProvider::check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    /// The inputs to pass to later phases.
    pub inputs: serde_json::Value,
    /// Problems found in the inputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<crate::validation::CheckFailure>,
}

/// Input to [`crate::ResourceProvider::diff`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRequest {
    /// The resource URN.
    pub urn: String,
    /// The resource id.
    #[serde(default)]
    pub id: String,
    /// The stored state.
    #[serde(default)]
    pub olds: serde_json::Value,
    /// The new inputs.
    pub news: serde_json::Value,
}

/// Whether a diff found changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffChanges {
    /// Nothing to do.
    None,
    /// The resource must change.
    Some,
}

/// Output of [`crate::ResourceProvider::diff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResponse {
    /// Whether changes are needed.
    pub changes: DiffChanges,
    /// Properties whose change forces a replacement.
    pub replaces: Vec<String>,
    /// Whether a replacement deletes the old resource first.
    pub delete_before_replace: bool,
}

impl DiffResponse {
    /// A diff with no changes.
    pub fn no_change() -> Self {
        Self::from_needs_change(false)
    }

    /// A diff reporting changes.
    pub fn changed() -> Self {
        Self::from_needs_change(true)
    }

    fn from_needs_change(needs_change: bool) -> Self {
        Self {
            changes: if needs_change {
                DiffChanges::Some
            } else {
                DiffChanges::None
            },
            replaces: Vec::new(),
            delete_before_replace: true,
        }
    }

    /// Whether the diff reports changes.
    pub fn has_changes(&self) -> bool {
        self.changes == DiffChanges::Some
    }
}

/// Input to [`crate::ResourceProvider::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// The resource URN.
    pub urn: String,
    /// The checked inputs.
    pub properties: serde_json::Value,
}

/// Output of [`crate::ResourceProvider::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResponse {
    /// The new resource id.
    pub id: String,
    /// The resource state.
    pub properties: serde_json::Value,
}

/// Input to [`crate::ResourceProvider::read`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    /// The resource URN.
    pub urn: String,
    /// The resource id.
    pub id: String,
    /// The last known state.
    #[serde(default)]
    pub properties: serde_json::Value,
    /// The last known inputs.
    #[serde(default)]
    pub inputs: serde_json::Value,
}

/// Output of [`crate::ResourceProvider::read`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResponse {
    /// The resource id.
    pub id: String,
    /// The refreshed state.
    pub properties: serde_json::Value,
}

/// Input to [`crate::ResourceProvider::update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// The resource URN.
    pub urn: String,
    /// The resource id.
    #[serde(default)]
    pub id: String,
    /// The stored state.
    #[serde(default)]
    pub olds: serde_json::Value,
    /// The new inputs.
    pub news: serde_json::Value,
}

/// Output of [`crate::ResourceProvider::update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    /// The new state.
    pub properties: serde_json::Value,
}

/// Input to [`crate::ResourceProvider::delete`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// The resource URN.
    pub urn: String,
    /// The resource id.
    pub id: String,
    /// The stored state.
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Provider metadata returned by GetPluginInfo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// The provider version.
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_property;
    use crate::validation::DecodeError;
    use crate::value::{MarshalOptions, PropertyValue};
    use serde_json::json;

    fn prop(value: serde_json::Value) -> PropertyValue {
        PropertyValue::from_json(&value, MarshalOptions::boundary())
    }

    #[test]
    fn test_command_spec_decode() {
        let spec: CommandSpec = decode_property(
            "update",
            &prop(json!({
                "command": ["bash", "-c", "echo $VAR"],
                "environment": {"VAR": "Hello"}
            })),
        )
        .unwrap();
        assert_eq!(
            spec,
            CommandSpec::new(["bash", "-c", "echo $VAR"]).with_env("VAR", "Hello")
        );
        assert_eq!(spec.program(), Some("bash"));
    }

    #[test]
    fn test_command_spec_empty_stdin_is_absent() {
        let spec: CommandSpec =
            decode_property("create", &prop(json!({"command": ["cat"], "stdin": ""}))).unwrap();
        assert_eq!(spec.stdin, None);
    }

    #[test]
    fn test_command_spec_requires_command() {
        let err = decode_property::<CommandSpec>("create", &prop(json!({"stdin": "x"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "create.command: missing required property command");

        let err = decode_property::<CommandSpec>("create", &prop(json!({"command": "ls"})))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Failure(_)));
    }

    #[test]
    fn test_command_spec_serde_wire_names() {
        let spec = CommandSpec::new(["cat"]).with_stdin("hi");
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"command": ["cat"], "stdin": "hi"})
        );
    }

    #[test]
    fn test_resource_args_decode() {
        let args: CommandResourceArgs = decode_property(
            "",
            &prop(json!({
                "compare": "abc",
                "create": {"command": ["touch", "f"]},
                "delete": {"command": ["rm", "f"]}
            })),
        )
        .unwrap();
        assert_eq!(args.compare.as_deref(), Some("abc"));
        assert_eq!(args.create.argv, vec!["touch", "f"]);
        assert_eq!(args.delete, Some(CommandSpec::new(["rm", "f"])));
        assert!(args.read.is_none());
        assert!(args.update.is_none());
        assert!(args.diff.is_none());
    }

    #[test]
    fn test_phase_keys() {
        assert_eq!(Phase::Create.key(), "create");
        assert_eq!(Phase::Diff.to_string(), "diff");
        assert_eq!(serde_json::to_value(Phase::Delete).unwrap(), json!("delete"));
    }

    #[test]
    fn test_urn_parse() {
        let urn = Urn::parse("urn:pulumi:dev::infra::command:v1:Command::demo").unwrap();
        assert_eq!(urn.stack(), "dev");
        assert_eq!(urn.project(), "infra");
        assert_eq!(urn.resource_type(), COMMAND_TYPE);
        assert_eq!(urn.name(), "demo");

        let nested =
            Urn::parse("urn:pulumi:dev::infra::my:mod:Parent$command:v1:exec::child").unwrap();
        assert_eq!(nested.resource_type(), LEGACY_COMMAND_TYPE);

        let built = Urn::new("dev", "infra", COMMAND_TYPE, "demo");
        assert_eq!(built, urn);
    }

    #[test]
    fn test_urn_parse_rejects_malformed() {
        assert!(matches!(
            Urn::parse("not-a-urn"),
            Err(ProviderError::InvalidRequest(_))
        ));
        assert!(Urn::parse("urn:pulumi:dev::infra").is_err());
        assert!(Urn::parse("urn:pulumi:dev::infra::::name").is_err());
    }

    #[test]
    fn test_diff_response_constructors() {
        let none = DiffResponse::no_change();
        assert!(!none.has_changes());
        assert!(none.delete_before_replace);
        assert!(none.replaces.is_empty());

        assert_eq!(DiffResponse::changed().changes, DiffChanges::Some);
    }
}
