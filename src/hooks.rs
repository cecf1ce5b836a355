use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::agent::Agent;
use crate::context::RunContext;
use crate::error::BoxError;

/// Lifecycle callbacks attached to an [`Agent`].
///
/// `before_run` runs once before any guardrail or model call and aborts the run on error.
/// `after_run` runs last; its error is reported alongside the already computed result.
#[async_trait]
pub trait AgentHook: Send + Sync {
    async fn before_run(&self, _ctx: &RunContext, _agent: &Agent) -> Result<(), BoxError> {
        Ok(())
    }

    async fn after_run(&self, _ctx: &RunContext, _agent: &Agent) -> Result<(), BoxError> {
        Ok(())
    }
}

type HookFn = Arc<dyn Fn(RunContext, Arc<Agent>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Closure-based hook; either side may be left empty.
#[derive(Clone, Default)]
pub struct FnHook {
    before: Option<HookFn>,
    after: Option<HookFn>,
}

impl FnHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RunContext, Arc<Agent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.before = Some(Arc::new(move |ctx, agent| Box::pin(f(ctx, agent))));
        self
    }

    pub fn after<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RunContext, Arc<Agent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.after = Some(Arc::new(move |ctx, agent| Box::pin(f(ctx, agent))));
        self
    }
}

#[async_trait]
impl AgentHook for FnHook {
    async fn before_run(&self, ctx: &RunContext, agent: &Agent) -> Result<(), BoxError> {
        match &self.before {
            Some(f) => f(ctx.clone(), Arc::new(agent.clone())).await,
            None => Ok(()),
        }
    }

    async fn after_run(&self, ctx: &RunContext, agent: &Agent) -> Result<(), BoxError> {
        match &self.after {
            Some(f) => f(ctx.clone(), Arc::new(agent.clone())).await,
            None => Ok(()),
        }
    }
}
