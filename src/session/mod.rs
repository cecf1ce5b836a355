//! Conversation history persistence.
//!
//! A [`Session`] maps a conversation id to its ordered message list. Stores never reorder or
//! deduplicate messages; `append` only ever adds to the end.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::BoxError;
use crate::message::Message;

mod file;
mod memory;

pub use file::FileSession;
pub use memory::MemorySession;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{0}' not found")]
    NotFound(String),

    #[error("invalid session id: {0}")]
    InvalidId(String),

    #[error("session '{session_id}' {operation} failed: {source}")]
    Storage {
        session_id: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl SessionError {
    pub(crate) fn storage(
        session_id: &str,
        operation: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        SessionError::Storage {
            session_id: session_id.to_string(),
            operation,
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }
}

#[async_trait]
pub trait Session: Send + Sync {
    /// Every stored message for `session_id`, oldest first.
    async fn get(&self, session_id: &str) -> Result<Vec<Message>, SessionError>;

    /// Appends to the conversation, creating it when absent.
    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<(), SessionError>;

    /// Empties an existing conversation.
    async fn clear(&self, session_id: &str) -> Result<(), SessionError>;

    /// Removes the conversation entirely.
    async fn delete(&self, session_id: &str) -> Result<(), SessionError>;
}
