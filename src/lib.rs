//! Turn-based agent runtime.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an OpenAI-compatible client.
//! - Tools (`Tool`, `FunctionTool`, `ToolRegistry`) whose results can hand the conversation to
//!   another `Agent`.
//! - Input and output guardrails (`PiiDetector`, `UrlFilter`, `PatternGuardrail`).
//! - Session stores that persist conversations between runs (`MemorySession`, `FileSession`).
//! - A `Runner` that drives the loop between the model and tools.

mod agent;
mod config;
mod context;
mod error;
mod guardrails;
mod hooks;
mod llm;
mod logging;
mod message;
mod response_format;
mod result;
mod runner;
mod session;
mod tool;

pub use agent::{Agent, Instructions, DEFAULT_INSTRUCTIONS, DEFAULT_MODEL};
pub use config::{
    ModelSettings, RunConfig, RunSettings, RuntimeConfig, SessionBackend, SessionPersistence,
    SessionSettings, DEFAULT_MAX_TURNS, DEFAULT_TIMEOUT,
};
pub use context::{ContextVariables, RunContext};
pub use error::{AgentError, BoxError, ErrorKind, Result, RunError, SessionStage};
pub use guardrails::{
    FnGuardrail, Guardrail, GuardrailResult, GuardrailSide, PatternGuardrail, PiiDetector,
    PiiPattern, UrlFilter,
};
pub use hooks::{AgentHook, FnHook};
pub use llm::{CompletionRequest, LanguageModel, ModelCompletion, OpenAIClient, StubModel};
pub use logging::{init_tracing, LoggingConfig};
pub use message::{truncate_tool_call_id, Message, Role, ToolCallRequest, MAX_TOOL_CALL_ID_LEN};
pub use response_format::ResponseFormat;
pub use result::{RunResult, Step, ToolCall, ToolCallOutcome, Usage};
pub use runner::{RunRequest, Runner};
pub use session::{FileSession, MemorySession, Session, SessionError};
pub use tool::{render_output, FunctionTool, Tool, ToolDescription, ToolError, ToolOutput, ToolRegistry};

/// Re-exported so callers can cancel runs without depending on `tokio-util` directly.
pub use tokio_util::sync::CancellationToken;
