use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Session, SessionError};
use crate::message::Message;

/// Volatile session store. Contents are lost when the value is dropped.
#[derive(Debug, Default)]
pub struct MemorySession {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn get(&self, session_id: &str) -> Result<Vec<Message>, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<(), SessionError> {
        match self.sessions.write().await.get_mut(session_id) {
            Some(messages) => {
                messages.clear();
                Ok(())
            }
            None => Err(SessionError::NotFound(session_id.to_string())),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_get_preserves_order() {
        let store = MemorySession::new();
        store
            .append("conv", &[Message::user("hi"), Message::assistant("hello")])
            .await
            .unwrap();
        store.append("conv", &[Message::user("again")]).await.unwrap();

        let messages = store.get("conv").await.unwrap();
        let texts: Vec<_> = messages.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["hi", "hello", "again"]);
    }

    #[tokio::test]
    async fn get_returns_an_independent_copy() {
        let store = MemorySession::new();
        store.append("conv", &[Message::user("hi")]).await.unwrap();

        let mut copy = store.get("conv").await.unwrap();
        copy.push(Message::user("local only"));
        assert_eq!(store.get("conv").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_and_delete_semantics() {
        let store = MemorySession::new();
        assert!(store.get("missing").await.unwrap_err().is_not_found());
        assert!(store.clear("missing").await.unwrap_err().is_not_found());
        assert!(store.delete("missing").await.unwrap_err().is_not_found());

        store.append("conv", &[Message::user("hi")]).await.unwrap();
        store.clear("conv").await.unwrap();
        assert!(store.get("conv").await.unwrap().is_empty());

        store.delete("conv").await.unwrap();
        assert!(store.get("conv").await.unwrap_err().is_not_found());
        assert!(store.is_empty().await);
    }
}
