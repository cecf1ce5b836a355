//! The execution loop.
//!
//! A run moves through `before hook → input guardrails → load session → turns → output guardrails →
//! save session → after hook`. Failures before the loop finishes carry no result; failures after
//! it carry the computed [`RunResult`] alongside the error.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::agent::Agent;
use crate::config::{RunConfig, SessionPersistence};
use crate::context::{ContextVariables, RunContext};
use crate::error::{AgentError, Result, RunError, SessionStage};
use crate::guardrails::{Guardrail, GuardrailSide};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::message::{Message, ToolCallRequest};
use crate::result::{RunResult, Step, ToolCall, ToolCallOutcome, Usage};
use crate::session::Session;
use crate::tool::{render_output, ToolError, ToolOutput};

/// Logs at INFO when the run is in debug mode, DEBUG otherwise.
macro_rules! verbose {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Everything one run needs besides the model.
#[derive(Clone)]
pub struct RunRequest {
    agent: Arc<Agent>,
    messages: Vec<Message>,
    context_variables: Option<ContextVariables>,
    config: Option<RunConfig>,
    session: Option<(Arc<dyn Session>, String)>,
    cancellation: CancellationToken,
}

impl RunRequest {
    pub fn new(agent: impl Into<Arc<Agent>>, messages: Vec<Message>) -> Self {
        Self {
            agent: agent.into(),
            messages,
            context_variables: None,
            config: None,
            session: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// A request whose only message is `text` from the user.
    pub fn user(agent: impl Into<Arc<Agent>>, text: impl Into<String>) -> Self {
        Self::new(agent, vec![Message::user(text)])
    }

    /// Variables shared with every tool invocation; the caller keeps its handle and can read
    /// what tools wrote once the run finishes.
    pub fn with_context_variables(mut self, vars: ContextVariables) -> Self {
        self.context_variables = Some(vars);
        self
    }

    /// Used as given; merge onto [`RunConfig::default`] first to override only some fields.
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// History is loaded from and saved to `store` under `session_id`. An empty id disables
    /// persistence.
    pub fn with_session(mut self, store: Arc<dyn Session>, session_id: impl Into<String>) -> Self {
        self.session = Some((store, session_id.into()));
        self
    }

    /// Cancelling `token` aborts the run with [`AgentError::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

impl fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRequest")
            .field("agent", &self.agent.name())
            .field("messages", &self.messages.len())
            .field("config", &self.config)
            .field("session_id", &self.session.as_ref().map(|(_, id)| id))
            .finish_non_exhaustive()
    }
}

/// Drives agents against a language model.
pub struct Runner<M: ?Sized> {
    model: Arc<M>,
}

impl<M: ?Sized> Clone for Runner<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
        }
    }
}

struct LoopOutcome {
    history: Vec<Message>,
    loaded: usize,
    agent: Arc<Agent>,
    usage: Usage,
    steps: Vec<Step>,
    final_output: String,
}

impl<M: LanguageModel + ?Sized> Runner<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    pub async fn run(&self, request: RunRequest) -> std::result::Result<RunResult, RunError> {
        let RunRequest {
            agent,
            messages,
            context_variables,
            config,
            session,
            cancellation,
        } = request;

        if messages.is_empty() {
            return Err(AgentError::Precondition("at least one message is required".into()).into());
        }

        let config = config.unwrap_or_default();
        let ctx = RunContext::new(&cancellation, config.timeout);
        let vars = context_variables.unwrap_or_default();
        let session = session.filter(|(_, id)| !id.is_empty());

        let span = tracing::info_span!("run", run_id = %ctx.run_id(), agent = %agent.name());
        async move {
            tracing::info!(
                messages = messages.len(),
                max_turns = config.max_turns,
                timeout_ms = config.timeout.as_millis() as u64,
                "run started"
            );

            let outcome = self
                .run_loop(&ctx, &agent, messages, &vars, &config, session.as_ref())
                .await
                .map_err(|err| {
                    tracing::warn!(error = %err, "run aborted");
                    RunError::new(err)
                })?;
            self.finish(&ctx, &agent, &config, session.as_ref(), outcome)
                .await
        }
        .instrument(span)
        .await
    }

    async fn run_loop(
        &self,
        ctx: &RunContext,
        agent: &Arc<Agent>,
        messages: Vec<Message>,
        vars: &ContextVariables,
        config: &RunConfig,
        session: Option<&(Arc<dyn Session>, String)>,
    ) -> Result<LoopOutcome> {
        if let Some(hook) = agent.hook() {
            ctx.guard(hook.before_run(ctx, agent))
                .await?
                .map_err(|source| AgentError::BeforeHook {
                    agent: agent.name().to_string(),
                    source,
                })?;
        }

        if let Some(last) = messages.last() {
            let payload = last.render();
            run_guardrails(ctx, agent.input_guardrails(), GuardrailSide::Input, &payload).await?;
        }

        let mut history = match session {
            Some((store, id)) => match ctx.guard(store.get(id)).await? {
                Ok(stored) => {
                    tracing::debug!(session_id = %id, loaded = stored.len(), "session history loaded");
                    stored
                }
                Err(err) if err.is_not_found() => Vec::new(),
                Err(source) => {
                    return Err(AgentError::Session {
                        stage: SessionStage::Load,
                        source,
                    })
                }
            },
            None => Vec::new(),
        };
        let loaded = history.len();
        history.extend(messages);

        let mut active = Arc::clone(agent);
        let mut usage = Usage::default();
        let mut steps: Vec<Step> = Vec::new();
        let mut turn = 0usize;

        let last = loop {
            if config.max_turns > 0 && turn >= config.max_turns {
                return Err(AgentError::MaxTurnsExceeded {
                    max_turns: config.max_turns,
                });
            }
            ctx.check()?;

            let started = Instant::now();
            turn += 1;

            let request = build_request(ctx, &active, config, &history);
            verbose!(
                config.debug,
                turn,
                agent = %active.name(),
                tools = request.tools.len(),
                "calling model"
            );
            let completion = ctx.guard(self.model.complete(&request)).await??;
            usage += completion.usage;

            let mut message = completion.message;
            message.truncate_tool_call_ids();
            history.push(message.clone());

            if !message.has_tool_calls() {
                steps.push(Step {
                    agent_name: active.name().to_string(),
                    step_number: turn,
                    duration: started.elapsed(),
                    tool_calls: Vec::new(),
                });
                break message;
            }

            let dispatch = dispatch_tools(ctx, &active, &message.tool_calls, vars, config.debug).await?;
            history.extend(dispatch.messages);
            steps.push(Step {
                agent_name: active.name().to_string(),
                step_number: turn,
                duration: started.elapsed(),
                tool_calls: dispatch.records,
            });
            if let Some(next) = dispatch.handoff {
                tracing::info!(from = %active.name(), to = %next.name(), "handoff");
                active = next;
            }
        };

        let final_output = match (&last.content, &last.refusal) {
            (Some(content), _) if !content.is_empty() => content.clone(),
            (_, Some(refusal)) => refusal.clone(),
            _ => String::new(),
        };

        Ok(LoopOutcome {
            history,
            loaded,
            agent: active,
            usage,
            steps,
            final_output,
        })
    }

    async fn finish(
        &self,
        ctx: &RunContext,
        agent: &Arc<Agent>,
        config: &RunConfig,
        session: Option<&(Arc<dyn Session>, String)>,
        outcome: LoopOutcome,
    ) -> std::result::Result<RunResult, RunError> {
        let LoopOutcome {
            history,
            loaded,
            agent: final_agent,
            usage,
            steps,
            final_output,
        } = outcome;

        let result = RunResult {
            messages: history,
            agent: final_agent,
            usage,
            steps,
            final_output,
        };

        if !result.final_output.is_empty() {
            // The entry agent's policy holds across handoffs.
            let checked = run_guardrails(
                ctx,
                agent.output_guardrails(),
                GuardrailSide::Output,
                &result.final_output,
            )
            .await;
            if let Err(err) = checked {
                tracing::warn!(error = %err, "output rejected");
                return Err(RunError::with_result(err, result));
            }
        }

        if let Some((store, id)) = session {
            let to_save = match config.session_persistence {
                SessionPersistence::Delta => &result.messages[loaded..],
                SessionPersistence::FullHistory => &result.messages[..],
            };
            let saved = match ctx.guard(store.append(id, to_save)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(AgentError::Session {
                    stage: SessionStage::Save,
                    source,
                }),
                Err(err) => Err(err),
            };
            if let Err(err) = saved {
                tracing::warn!(session_id = %id, error = %err, "session save failed");
                return Err(RunError::with_result(err, result));
            }
            tracing::debug!(session_id = %id, saved = to_save.len(), "session saved");
        }

        if let Some(hook) = agent.hook() {
            let after = match ctx.guard(hook.after_run(ctx, agent)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(AgentError::AfterHook {
                    agent: agent.name().to_string(),
                    source,
                }),
                Err(err) => Err(err),
            };
            if let Err(err) = after {
                return Err(RunError::with_result(err, result));
            }
        }

        tracing::info!(
            turns = result.steps.len(),
            final_agent = %result.agent.name(),
            total_tokens = result.usage.total_tokens,
            "run completed"
        );
        Ok(result)
    }
}

/// Runs `guardrails` in order; the first tripwire or malfunction stops the run.
async fn run_guardrails(
    ctx: &RunContext,
    guardrails: &[Arc<dyn Guardrail>],
    side: GuardrailSide,
    payload: &str,
) -> Result<()> {
    for guardrail in guardrails {
        let outcome = ctx
            .guard(guardrail.check(payload))
            .await?
            .map_err(|source| AgentError::GuardrailFailed {
                guardrail: guardrail.name().to_string(),
                side,
                source,
            })?;

        if outcome.tripwire_triggered {
            let guardrail = guardrail.name().to_string();
            let message = outcome.message;
            let metadata = outcome.metadata;
            return Err(match side {
                GuardrailSide::Input => AgentError::InputGuardrailTripwire {
                    guardrail,
                    message,
                    metadata,
                },
                GuardrailSide::Output => AgentError::OutputGuardrailTripwire {
                    guardrail,
                    message,
                    metadata,
                },
            });
        }
        if !outcome.passed {
            tracing::warn!(
                guardrail = guardrail.name(),
                %side,
                message = %outcome.message,
                "advisory guardrail failed"
            );
        }
    }
    Ok(())
}

/// Resolves instructions and generation parameters for the active agent. Run-config overrides
/// take priority over agent defaults.
fn build_request(
    ctx: &RunContext,
    agent: &Agent,
    config: &RunConfig,
    history: &[Message],
) -> CompletionRequest {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(agent.instructions().resolve(ctx)));
    messages.extend_from_slice(history);

    let tools = agent.tools().describe();
    let parallel = config
        .parallel_tool_calls
        .unwrap_or_else(|| agent.parallel_tool_calls());

    CompletionRequest {
        model: agent.model().to_string(),
        messages,
        parallel_tool_calls: (!tools.is_empty() && !parallel).then_some(false),
        tools,
        temperature: config.temperature.or(agent.temperature()),
        max_tokens: config.max_tokens.or(agent.max_tokens()),
        response_format: config
            .response_format
            .clone()
            .or_else(|| agent.response_format().cloned()),
    }
}

struct Dispatch {
    messages: Vec<Message>,
    records: Vec<ToolCall>,
    handoff: Option<Arc<Agent>>,
}

/// Executes the requested tools one after another. Tool failures become tool messages; only the
/// deadline or cancellation stops the dispatch.
async fn dispatch_tools(
    ctx: &RunContext,
    agent: &Agent,
    calls: &[ToolCallRequest],
    vars: &ContextVariables,
    debug: bool,
) -> Result<Dispatch> {
    let mut dispatch = Dispatch {
        messages: Vec::with_capacity(calls.len()),
        records: Vec::with_capacity(calls.len()),
        handoff: None,
    };

    for call in calls {
        let started = Instant::now();
        let outcome = ctx
            .guard(agent.tools().call(&call.name, &call.arguments, vars))
            .await?;

        let (content, outcome) = match outcome {
            Ok(ToolOutput::Output(value)) => (render_output(&value), ToolCallOutcome::Output(value)),
            Ok(ToolOutput::Handoff(next)) => {
                let notice = format!("Transferred to {}", next.name());
                let outcome = ToolCallOutcome::Handoff(next.name().to_string());
                dispatch.handoff = Some(next);
                (notice, outcome)
            }
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "tool call failed");
                (tool_failure_message(&call.name, &err), ToolCallOutcome::Failed(err))
            }
        };
        verbose!(
            debug,
            tool = %call.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool call finished"
        );

        dispatch.messages.push(Message::tool(&call.id, content));
        dispatch.records.push(ToolCall {
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            outcome,
            duration: started.elapsed(),
        });
    }
    Ok(dispatch)
}

fn tool_failure_message(name: &str, err: &ToolError) -> String {
    match err {
        ToolError::NotFound { available, .. } => format!(
            "Error: Tool {name} not found. Available tools: [{}]",
            available.join(", ")
        ),
        other => format!("Error executing tool {name}: {other}"),
    }
}
