use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::agent::Agent;
use crate::context::ContextVariables;

/// What a tool hands back to the runner.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Ordinary data, recorded in the conversation as the tool's output.
    Output(Value),
    /// Transfer control: the given agent becomes active for the following turns.
    Handoff(Arc<Agent>),
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        ToolOutput::Output(Value::String(text.into()))
    }

    pub fn json(value: impl Serialize) -> Result<Self, ToolError> {
        serde_json::to_value(value)
            .map(ToolOutput::Output)
            .map_err(|err| ToolError::failed(format!("failed to serialize output: {err}")))
    }

    pub fn handoff(agent: impl Into<Arc<Agent>>) -> Self {
        ToolOutput::Handoff(agent.into())
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Output(value)
    }
}

/// Renders a tool value the way it is written into the conversation.
pub fn render_output(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("tool {name} not found (available: [{}])", .available.join(", "))]
    NotFound { name: String, available: Vec<String> },

    #[error("failed to parse arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn failed(message: impl fmt::Display) -> Self {
        ToolError::Failed(message.to_string())
    }
}

/// Tool declaration advertised to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Option<Value> {
        None
    }

    async fn call(&self, arguments: Value, vars: &ContextVariables)
        -> Result<ToolOutput, ToolError>;
}

type Callback =
    Arc<dyn Fn(Value, ContextVariables) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync>;

/// A tool backed by a closure.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Option<Value>,
    callback: Callback,
}

impl FunctionTool {
    /// # Panics
    ///
    /// Panics when `name` is empty.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, callback: F) -> Self
    where
        F: Fn(Value, ContextVariables) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        let name = name.into();
        assert!(!name.trim().is_empty(), "tool name cannot be empty");
        Self {
            name,
            description: description.into(),
            parameters: None,
            callback: Arc::new(move |args, vars| Box::pin(callback(args, vars))),
        }
    }

    /// Same as [`FunctionTool::new`] for callbacks that do not need to await anything.
    pub fn sync<F>(name: impl Into<String>, description: impl Into<String>, callback: F) -> Self
    where
        F: Fn(Value, &ContextVariables) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        Self::new(name, description, move |args, vars| {
            let callback = Arc::clone(&callback);
            async move { (*callback)(args, &vars) }
        })
    }

    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Option<Value> {
        self.parameters.clone()
    }

    async fn call(
        &self,
        arguments: Value,
        vars: &ContextVariables,
    ) -> Result<ToolOutput, ToolError> {
        (self.callback)(arguments, vars.clone()).await
    }
}

/// Ordered set of tools keyed by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registering a second tool under an existing name replaces the first one in place.
    ///
    /// # Panics
    ///
    /// Panics when the tool's name is empty.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_shared(Arc::new(tool));
    }

    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        assert!(!tool.name().trim().is_empty(), "tool name cannot be empty");
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(existing) => {
                tracing::warn!(tool = tool.name(), "replacing tool registered under the same name");
                *existing = tool;
            }
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        self.tools
            .iter()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool
                    .parameters()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            })
            .collect()
    }

    /// Parses the raw argument payload and invokes the named tool.
    ///
    /// An empty payload is treated as `{}`; anything that is not a JSON object is rejected.
    pub async fn call(
        &self,
        name: &str,
        raw_arguments: &str,
        vars: &ContextVariables,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
            available: self.names(),
        })?;
        let arguments = parse_arguments(raw_arguments)?;
        tool.call(arguments, vars).await
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    let value: Value =
        serde_json::from_str(raw).map_err(|err| ToolError::InvalidArguments(err.to_string()))?;
    if !value.is_object() {
        return Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got `{raw}`"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the `text` field back"
        }

        async fn call(
            &self,
            input: Value,
            _vars: &ContextVariables,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::Output(input["text"].clone()))
        }
    }

    #[tokio::test]
    async fn calls_registered_tool_with_parsed_arguments() {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);

        let output = tools
            .call("echo", r#"{"text":"ping"}"#, &ContextVariables::new())
            .await
            .unwrap();
        assert!(matches!(output, ToolOutput::Output(Value::String(ref s)) if s == "ping"));
    }

    #[tokio::test]
    async fn missing_tool_lists_available_names() {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);

        let err = tools
            .call("search", "{}", &ContextVariables::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::NotFound {
                name: "search".into(),
                available: vec!["echo".into()],
            }
        );
        assert_eq!(err.to_string(), "tool search not found (available: [echo])");
    }

    #[tokio::test]
    async fn empty_arguments_default_to_object_and_non_objects_are_rejected() {
        let tool = FunctionTool::sync("count_keys", "Counts argument keys", |args, _| {
            Ok(json!(args.as_object().map(|o| o.len()).unwrap_or_default()).into())
        });
        let mut tools = ToolRegistry::new();
        tools.register(tool);
        let vars = ContextVariables::new();

        let output = tools.call("count_keys", "", &vars).await.unwrap();
        assert!(matches!(output, ToolOutput::Output(ref v) if v == &json!(0)));

        let err = tools.call("count_keys", "[1,2]", &vars).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        let err = tools.call("count_keys", "{not json", &vars).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn function_tools_share_context_variables() {
        let writer = FunctionTool::new("remember", "Stores a value", |args, vars| async move {
            vars.set("remembered", args["value"].clone());
            Ok(ToolOutput::text("stored"))
        });
        let vars = ContextVariables::new();
        writer.call(json!({"value": 5}), &vars).await.unwrap();
        assert_eq!(vars.get("remembered"), Some(json!(5)));
    }

    #[test]
    fn describe_defaults_to_empty_object_schema() {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        tools.register(
            FunctionTool::sync("lookup", "Finds things", |_, _| Ok(ToolOutput::text("ok")))
                .with_parameters(json!({"type": "object", "properties": {"id": {"type": "string"}}})),
        );

        let described = tools.describe();
        assert_eq!(described[0].parameters, json!({"type": "object", "properties": {}}));
        assert_eq!(described[1].name, "lookup");
        assert!(described[1].parameters["properties"]["id"].is_object());
    }

    #[test]
    fn duplicate_names_replace_in_place() {
        let mut tools = ToolRegistry::new();
        tools.register(FunctionTool::sync("a", "first", |_, _| Ok(ToolOutput::text("1"))));
        tools.register(EchoTool);
        tools.register(FunctionTool::sync("a", "second", |_, _| Ok(ToolOutput::text("2"))));

        assert_eq!(tools.names(), vec!["a".to_string(), "echo".to_string()]);
        assert_eq!(tools.get("a").unwrap().description(), "second");
    }

    #[test]
    #[should_panic(expected = "tool name cannot be empty")]
    fn empty_tool_name_panics() {
        let _ = FunctionTool::sync("", "nameless", |_, _| Ok(ToolOutput::text("")));
    }

    #[test]
    fn render_output_keeps_strings_unquoted() {
        assert_eq!(render_output(&json!("plain")), "plain");
        assert_eq!(render_output(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
