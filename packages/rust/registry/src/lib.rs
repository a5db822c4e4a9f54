//! Tool registry: named, versioned transformation units with enforced contracts.
//!
//! This crate provides:
//! - [`ToolRegistry`]: the catalog pipelines look tools up in
//! - [`Contract`]: structural validators for tool input and output
//! - [`Tool`] / [`FnTool`]: tool bodies
//! - [`builtin`]: the text-analysis tools registered at startup
//!
//! Registration and `[tools]` overrides happen once during process
//! initialization. Afterwards the registry is shared behind an `Arc` and only
//! read, so lookups need no locking.

pub mod builtin;
pub mod contract;
pub mod tool;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use ingestflow_shared::{DuplicatePolicy, IngestflowError, Result, ToolConfig};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

pub use builtin::register_builtin_tools;
pub use contract::{Contract, ContractViolation, FieldContract, ObjectContract};
pub use tool::{FnTool, Params, Tool};

// ---------------------------------------------------------------------------
// ToolDescriptor
// ---------------------------------------------------------------------------

/// Catalog entry for a registered tool.
///
/// Only [`ToolRegistry::configure`] changes it after registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    /// Unique key.
    pub name: String,
    pub version: String,
    pub description: String,
    pub input: Contract,
    pub output: Contract,
    /// Passed to the tool body on every call.
    pub defaults: Params,
    pub enabled: bool,
}

impl ToolDescriptor {
    /// Enabled descriptor accepting any input and output, with no defaults.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            input: Contract::Any,
            output: Contract::Any,
            defaults: Params::new(),
            enabled: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, contract: impl Into<Contract>) -> Self {
        self.input = contract.into();
        self
    }

    pub fn output(mut self, contract: impl Into<Contract>) -> Self {
        self.output = contract.into();
        self
    }

    pub fn default_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct RegisteredTool {
    descriptor: ToolDescriptor,
    body: Arc<dyn Tool>,
}

/// Catalog of tools keyed by name.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    policy: DuplicatePolicy,
}

impl ToolRegistry {
    /// Empty registry that rejects duplicate names.
    pub fn new() -> Self {
        Self::with_policy(DuplicatePolicy::Reject)
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            tools: HashMap::new(),
            policy,
        }
    }

    /// Register `tool` under `descriptor.name`.
    ///
    /// Fails with [`IngestflowError::DuplicateTool`] if the name is taken and
    /// the policy is [`DuplicatePolicy::Reject`].
    pub fn register(&mut self, descriptor: ToolDescriptor, tool: impl Tool + 'static) -> Result<()> {
        if descriptor.name.trim().is_empty() {
            return Err(IngestflowError::validation(
                descriptor.name,
                "tool name must not be empty",
            ));
        }

        if let Some(existing) = self.tools.get(&descriptor.name) {
            match self.policy {
                DuplicatePolicy::Reject => {
                    return Err(IngestflowError::DuplicateTool(descriptor.name));
                }
                DuplicatePolicy::Overwrite => {
                    warn!(
                        tool = %descriptor.name,
                        old_version = %existing.descriptor.version,
                        new_version = %descriptor.version,
                        "overwriting registered tool"
                    );
                }
            }
        }

        info!(tool = %descriptor.name, version = %descriptor.version, "registered tool");
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                body: Arc::new(tool),
            },
        );
        Ok(())
    }

    /// Apply a `[tools.<name>]` override: toggle the tool and merge its defaults.
    pub fn configure(&mut self, name: &str, config: &ToolConfig) -> Result<()> {
        let entry = self
            .tools
            .get_mut(name)
            .ok_or_else(|| IngestflowError::UnknownTool(name.to_string()))?;
        let descriptor = &mut entry.descriptor;

        descriptor.enabled = config.enabled;
        for (key, value) in &config.defaults {
            descriptor.defaults.insert(key.clone(), value.clone());
        }
        info!(
            tool = %name,
            enabled = config.enabled,
            overrides = config.defaults.len(),
            "configured tool"
        );
        Ok(())
    }

    /// Apply every `[tools]` override. Fails on the first unknown name.
    pub fn configure_all(&mut self, tools: &BTreeMap<String, ToolConfig>) -> Result<()> {
        for (name, config) in tools {
            self.configure(name, config)?;
        }
        Ok(())
    }

    /// Look up an enabled tool's descriptor by name.
    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor> {
        self.enabled_entry(name).map(|t| &t.descriptor)
    }

    fn enabled_entry(&self, name: &str) -> Result<&RegisteredTool> {
        match self.tools.get(name) {
            Some(entry) if entry.descriptor.enabled => Ok(entry),
            Some(_) => Err(IngestflowError::ToolDisabled(name.to_string())),
            None => Err(IngestflowError::UnknownTool(name.to_string())),
        }
    }

    /// Validate `input`, run the tool, and validate its output.
    ///
    /// The tool body never runs on input that fails the input contract, and a
    /// result that fails the output contract is never returned.
    #[instrument(skip(self, input), fields(tool = %name))]
    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value> {
        let entry = self.enabled_entry(name)?;
        let descriptor = &entry.descriptor;

        descriptor
            .input
            .validate(&input)
            .map_err(|v| IngestflowError::validation(name, format!("input {v}")))?;

        let output = entry
            .body
            .call(input, &descriptor.defaults)
            .await
            .map_err(|source| IngestflowError::ToolExecution {
                tool: name.to_string(),
                source,
            })?;

        descriptor
            .output
            .validate(&output)
            .map_err(|v| IngestflowError::validation(name, format!("output {v}")))?;

        debug!(version = %descriptor.version, "tool invocation succeeded");
        Ok(output)
    }

    /// All descriptors, disabled ones included, sorted by name.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        let mut descriptors: Vec<_> = self.tools.values().map(|t| &t.descriptor).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Enabled descriptors, sorted by name.
    pub fn enabled(&self) -> Vec<&ToolDescriptor> {
        self.list().into_iter().filter(|d| d.enabled).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("policy", &self.policy)
            .field("tools", &self.list())
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use ingestflow_shared::ToolFailure;
    use serde_json::json;

    fn text_contract() -> Contract {
        Contract::object().field("text", Contract::String).into()
    }

    fn upper_descriptor() -> ToolDescriptor {
        ToolDescriptor::new("upper", "1.2.0")
            .input(text_contract())
            .output(text_contract())
            .default_param("locale", "en")
    }

    fn upper_tool()
    -> FnTool<impl Fn(&Value, &Params) -> std::result::Result<Value, ToolFailure> + Send + Sync>
    {
        FnTool::new(|input: &Value, _: &Params| {
            let text = input["text"].as_str().unwrap_or_default();
            Ok(json!({ "text": text.to_uppercase() }))
        })
    }

    #[test]
    fn lookup_returns_registered_descriptor() {
        let mut registry = ToolRegistry::new();
        registry.register(upper_descriptor(), upper_tool()).unwrap();

        let descriptor = registry.lookup("upper").expect("registered");
        assert_eq!(descriptor, &upper_descriptor());
        assert_eq!(descriptor.version, "1.2.0");
        assert_eq!(descriptor.defaults["locale"], "en");
    }

    #[test]
    fn lookup_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let err = registry.lookup("missing").unwrap_err();
        assert!(matches!(err, IngestflowError::UnknownTool(ref n) if n == "missing"));
    }

    #[test]
    fn duplicate_registration_rejected_by_default() {
        let mut registry = ToolRegistry::new();
        registry.register(upper_descriptor(), upper_tool()).unwrap();

        let err = registry
            .register(ToolDescriptor::new("upper", "2.0"), upper_tool())
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate_tool");
        assert_eq!(registry.lookup("upper").unwrap().version, "1.2.0");
    }

    #[test]
    fn duplicate_registration_overwrites_when_configured() {
        let mut registry = ToolRegistry::with_policy(DuplicatePolicy::Overwrite);
        registry.register(upper_descriptor(), upper_tool()).unwrap();
        registry
            .register(ToolDescriptor::new("upper", "2.0"), upper_tool())
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("upper").unwrap().version, "2.0");
    }

    #[test]
    fn empty_name_rejected() {
        let mut registry = ToolRegistry::new();
        let err = registry
            .register(ToolDescriptor::new("  ", "1.0"), upper_tool())
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn invoke_runs_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(upper_descriptor(), upper_tool()).unwrap();

        let out = registry.invoke("upper", json!({"text": "abc"})).await.unwrap();
        assert_eq!(out, json!({"text": "ABC"}));
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_tool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("count", "1.0").input(text_contract()),
                FnTool::new(move |_: &Value, _: &Params| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({}))
                }),
            )
            .unwrap();

        let err = registry.invoke("count", json!({"text": 1})).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("input $.text"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_output_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("liar", "1.0").output(text_contract()),
                FnTool::new(|_: &Value, _: &Params| Ok(json!({"txt": "oops"}))),
            )
            .unwrap();

        let err = registry.invoke("liar", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("output $.text"));
    }

    #[tokio::test]
    async fn tool_failure_wrapped_with_cause() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("fail", "1.0"),
                FnTool::new(|_: &Value, _: &Params| Err(ToolFailure::failed("always fails"))),
            )
            .unwrap();

        let err = registry.invoke("fail", json!({})).await.unwrap_err();
        match err {
            IngestflowError::ToolExecution { tool, source } => {
                assert_eq!(tool, "fail");
                assert_eq!(source, ToolFailure::failed("always fails"));
            }
            other => panic!("expected ToolExecution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn defaults_passed_to_tool() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("echo_params", "1.0").default_param("max", 3),
                FnTool::new(|_: &Value, params: &Params| Ok(Value::Object(params.clone()))),
            )
            .unwrap();

        let out = registry.invoke("echo_params", json!(null)).await.unwrap();
        assert_eq!(out, json!({"max": 3}));
    }

    fn echo_params_tool()
    -> FnTool<impl Fn(&Value, &Params) -> std::result::Result<Value, ToolFailure> + Send + Sync>
    {
        FnTool::new(|_: &Value, params: &Params| Ok(Value::Object(params.clone())))
    }

    #[tokio::test]
    async fn configured_defaults_override_builtin_ones() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new("echo_params", "1.0")
                    .default_param("max", 3)
                    .default_param("mode", "short"),
                echo_params_tool(),
            )
            .unwrap();

        let mut defaults = Params::new();
        defaults.insert("max".into(), json!(1));
        defaults.insert("lang".into(), json!("fr"));
        registry
            .configure(
                "echo_params",
                &ToolConfig {
                    enabled: true,
                    defaults,
                },
            )
            .unwrap();

        let out = registry.invoke("echo_params", json!(null)).await.unwrap();
        assert_eq!(out, json!({"max": 1, "mode": "short", "lang": "fr"}));
    }

    #[tokio::test]
    async fn disabled_tool_cannot_be_used() {
        let mut registry = ToolRegistry::new();
        registry.register(upper_descriptor(), upper_tool()).unwrap();
        registry
            .register(ToolDescriptor::new("echo_params", "1.0"), echo_params_tool())
            .unwrap();

        let mut tools = BTreeMap::new();
        tools.insert(
            "upper".to_string(),
            ToolConfig {
                enabled: false,
                ..ToolConfig::default()
            },
        );
        registry.configure_all(&tools).unwrap();

        let err = registry.lookup("upper").unwrap_err();
        assert_eq!(err.kind(), "tool_disabled");
        let err = registry.invoke("upper", json!({"text": "abc"})).await.unwrap_err();
        assert!(matches!(err, IngestflowError::ToolDisabled(ref n) if n == "upper"));

        assert!(registry.contains("upper"));
        let listed: Vec<(&str, bool)> = registry
            .list()
            .iter()
            .map(|d| (d.name.as_str(), d.enabled))
            .collect();
        assert_eq!(listed, vec![("echo_params", true), ("upper", false)]);
        let enabled: Vec<&str> = registry.enabled().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(enabled, vec!["echo_params"]);
    }

    #[test]
    fn configuring_unknown_tool_fails() {
        let mut registry = ToolRegistry::new();
        let err = registry
            .configure("missing", &ToolConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), "unknown_tool");
    }

    #[test]
    fn debug_lists_descriptors() {
        let mut registry = ToolRegistry::new();
        registry
            .register(upper_descriptor().description("Uppercase text"), upper_tool())
            .unwrap();
        let shown = format!("{registry:?}");
        assert!(shown.contains("upper"));
        assert!(shown.contains("Uppercase text"));
    }

    #[test]
    fn list_is_sorted_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new("zeta", "1"), upper_tool()).unwrap();
        registry.register(ToolDescriptor::new("alpha", "1"), upper_tool()).unwrap();

        let names: Vec<&str> = registry.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(registry.contains("zeta"));
    }
}
