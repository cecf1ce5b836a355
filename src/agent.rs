use std::fmt;
use std::sync::Arc;

use crate::context::RunContext;
use crate::guardrails::Guardrail;
use crate::hooks::AgentHook;
use crate::response_format::ResponseFormat;
use crate::tool::{Tool, ToolRegistry};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful agent.";

/// Produces the system instructions for a turn.
///
/// Literal text and context-dependent instructions share one representation; the runner resolves
/// them at the start of every turn.
#[derive(Clone)]
pub struct Instructions(Arc<dyn Fn(&RunContext) -> String + Send + Sync>);

impl Instructions {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self(Arc::new(move |_| text.clone()))
    }

    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&RunContext) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn resolve(&self, ctx: &RunContext) -> String {
        (self.0)(ctx)
    }
}

impl Default for Instructions {
    fn default() -> Self {
        Self::text(DEFAULT_INSTRUCTIONS)
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Instructions(..)")
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

/// A persona: instructions, a model id, default generation parameters, tools and guardrails.
///
/// Agents are immutable once handed to the runner and are shared behind `Arc`, which is also how a
/// handoff tool refers to its target.
#[derive(Clone)]
pub struct Agent {
    name: String,
    model: String,
    instructions: Instructions,
    tools: ToolRegistry,
    parallel_tool_calls: bool,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    response_format: Option<ResponseFormat>,
    hook: Option<Arc<dyn AgentHook>>,
    input_guardrails: Vec<Arc<dyn Guardrail>>,
    output_guardrails: Vec<Arc<dyn Guardrail>>,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: DEFAULT_MODEL.to_string(),
            instructions: Instructions::default(),
            tools: ToolRegistry::new(),
            parallel_tool_calls: true,
            temperature: None,
            max_tokens: None,
            response_format: None,
            hook: None,
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<Instructions>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_dynamic_instructions<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext) -> String + Send + Sync + 'static,
    {
        self.instructions = Instructions::dynamic(f);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn AgentHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: Arc<dyn Guardrail>) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: Arc<dyn Guardrail>) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn instructions(&self) -> &Instructions {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn parallel_tool_calls(&self) -> bool {
        self.parallel_tool_calls
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn response_format(&self) -> Option<&ResponseFormat> {
        self.response_format.as_ref()
    }

    pub fn hook(&self) -> Option<&Arc<dyn AgentHook>> {
        self.hook.as_ref()
    }

    pub fn input_guardrails(&self) -> &[Arc<dyn Guardrail>] {
        &self.input_guardrails
    }

    pub fn output_guardrails(&self) -> &[Arc<dyn Guardrail>] {
        &self.output_guardrails
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |guardrails: &[Arc<dyn Guardrail>]| {
            guardrails
                .iter()
                .map(|g| g.name().to_string())
                .collect::<Vec<_>>()
        };
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools)
            .field("parallel_tool_calls", &self.parallel_tool_calls)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("response_format", &self.response_format)
            .field("has_hook", &self.hook.is_some())
            .field("input_guardrails", &names(&self.input_guardrails))
            .field("output_guardrails", &names(&self.output_guardrails))
            .finish()
    }
}
