//! Per-run context: cancellation, the run deadline, and the variables shared between tools.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AgentError, Result};

/// Cancellation and deadline state for one run.
///
/// The runner derives a child token from the caller's token, so cancelling a run never cancels the
/// caller's other work. The deadline is fixed when the run starts.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    cancellation: CancellationToken,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl RunContext {
    /// `timeout` of zero means no deadline.
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        Self {
            run_id: Uuid::new_v4(),
            cancellation: parent.child_token(),
            timeout,
            deadline,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    /// Checkpoint: fails with `Timeout` once the deadline has passed, or `Cancelled` when the
    /// caller cancelled the run.
    pub fn check(&self) -> Result<()> {
        if self.deadline_passed() {
            return Err(self.timeout_error());
        }
        if self.cancellation.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        Ok(())
    }

    /// Drives `fut` until it completes, the deadline passes or the run is cancelled.
    pub async fn guard<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = deadline => {
                self.cancellation.cancel();
                Err(self.timeout_error())
            }
            _ = self.cancellation.cancelled() => Err(AgentError::Cancelled),
            value = fut => Ok(value),
        }
    }

    fn timeout_error(&self) -> AgentError {
        AgentError::Timeout {
            timeout: self.timeout,
        }
    }
}

/// Key/value store shared by every tool invocation of a run.
///
/// Cloning is cheap and yields a handle to the same store. Each operation takes the lock for its own
/// duration only; a read-modify-write sequence across calls is not atomic, use [`update`] for that.
///
/// [`update`]: ContextVariables::update
#[derive(Debug, Clone, Default)]
pub struct ContextVariables {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl ContextVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Atomically replaces the value under `key` with `f(current)`.
    pub fn update<F>(&self, key: impl Into<String>, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let key = key.into();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let next = f(guard.get(&key));
        guard.insert(key, next.clone());
        next
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl From<HashMap<String, Value>> for ContextVariables {
    fn from(map: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ContextVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect::<HashMap<_, _>>()
            .into()
    }
}
