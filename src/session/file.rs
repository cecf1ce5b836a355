use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Session, SessionError};
use crate::message::Message;

/// Durable session store: one indented JSON file per conversation under a root directory.
///
/// Writes go to `<id>.json.tmp` and are renamed over `<id>.json`, so readers never observe a
/// partially written file. A single lock serialises every operation on this store instance;
/// separate instances pointed at the same directory are not coordinated.
#[derive(Debug)]
pub struct FileSession {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileSession {
    /// Creates the root directory when it does not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        validate_session_id(session_id)?;
        Ok(self.root.join(format!("{session_id}.json")))
    }

    async fn read(&self, session_id: &str, path: &Path) -> Result<Option<Vec<Message>>, SessionError> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SessionError::storage(session_id, "read", err)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|err| SessionError::storage(session_id, "decode", err))
    }

    async fn write_atomic(
        &self,
        session_id: &str,
        path: &Path,
        messages: &[Message],
    ) -> Result<(), SessionError> {
        let data = serde_json::to_vec_pretty(messages)
            .map_err(|err| SessionError::storage(session_id, "encode", err))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let pending = PendingFile::new(tmp);
        tokio::fs::write(pending.path(), data)
            .await
            .map_err(|err| SessionError::storage(session_id, "write", err))?;
        tokio::fs::rename(pending.path(), path)
            .await
            .map_err(|err| SessionError::storage(session_id, "rename", err))?;
        pending.persist();
        Ok(())
    }

    async fn exists(&self, session_id: &str, path: &Path) -> Result<bool, SessionError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|err| SessionError::storage(session_id, "stat", err))
    }
}

/// Temporary file removed on drop unless persisted.
///
/// Covers failed writes and renames as well as a write future dropped mid-flight by a deadline.
struct PendingFile {
    path: PathBuf,
    armed: bool,
}

impl PendingFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file has been renamed into place; nothing left to clean up.
    fn persist(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove temporary session file");
            }
        }
    }
}

/// Session ids become file names, so anything that could escape the root directory is rejected.
fn validate_session_id(session_id: &str) -> Result<(), SessionError> {
    if session_id.is_empty() {
        return Err(SessionError::InvalidId("session id cannot be empty".to_string()));
    }
    if session_id.contains(['/', '\\', '\0']) || session_id.contains("..") {
        return Err(SessionError::InvalidId(format!(
            "session id contains invalid characters: {session_id:?}"
        )));
    }
    if session_id.chars().any(char::is_control) {
        return Err(SessionError::InvalidId(format!(
            "session id contains control characters: {session_id:?}"
        )));
    }
    Ok(())
}

#[async_trait]
impl Session for FileSession {
    async fn get(&self, session_id: &str) -> Result<Vec<Message>, SessionError> {
        let path = self.session_path(session_id)?;
        let _guard = self.lock.lock().await;
        self.read(session_id, &path)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<(), SessionError> {
        let path = self.session_path(session_id)?;
        let _guard = self.lock.lock().await;
        let mut stored = self.read(session_id, &path).await?.unwrap_or_default();
        stored.extend_from_slice(messages);
        self.write_atomic(session_id, &path, &stored).await
    }

    async fn clear(&self, session_id: &str) -> Result<(), SessionError> {
        let path = self.session_path(session_id)?;
        let _guard = self.lock.lock().await;
        if !self.exists(session_id, &path).await? {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        self.write_atomic(session_id, &path, &[]).await
    }

    async fn delete(&self, session_id: &str) -> Result<(), SessionError> {
        let path = self.session_path(session_id)?;
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(SessionError::NotFound(session_id.to_string()))
            }
            Err(err) => Err(SessionError::storage(session_id, "delete", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCallRequest;

    #[tokio::test]
    async fn creates_root_and_writes_indented_json() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("sessions");
        let store = FileSession::new(&root).unwrap();
        assert!(root.is_dir());

        store.append("conv-1", &[Message::user("hi")]).await.unwrap();
        let raw = std::fs::read_to_string(root.join("conv-1.json")).unwrap();
        assert!(raw.starts_with("[\n  {"));
        assert!(!root.join("conv-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn history_survives_store_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        let call = ToolCallRequest::new("call_1", "lookup", r#"{"id":7}"#);
        {
            let store = FileSession::new(dir.path()).unwrap();
            store
                .append(
                    "conv",
                    &[
                        Message::user("find 7"),
                        Message::assistant_tool_calls(vec![call.clone()]),
                    ],
                )
                .await
                .unwrap();
        }

        let store = FileSession::new(dir.path()).unwrap();
        store.append("conv", &[Message::tool("call_1", "found")]).await.unwrap();
        let messages = store.get("conv").await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].tool_calls, vec![call]);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn clear_and_delete_report_missing_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSession::new(dir.path()).unwrap();
        assert!(store.get("nope").await.unwrap_err().is_not_found());
        assert!(store.clear("nope").await.unwrap_err().is_not_found());
        assert!(store.delete("nope").await.unwrap_err().is_not_found());

        store.append("conv", &[Message::user("hi")]).await.unwrap();
        store.clear("conv").await.unwrap();
        assert!(store.get("conv").await.unwrap().is_empty());
        store.delete("conv").await.unwrap();
        assert!(store.get("conv").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn rejects_ids_that_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSession::new(dir.path()).unwrap();
        for id in ["", "../escape", "a/b", "a\\b", "bad\nid"] {
            let err = store.append(id, &[Message::user("x")]).await.unwrap_err();
            assert!(matches!(err, SessionError::InvalidId(_)), "{id:?} accepted");
        }
    }

    #[tokio::test]
    async fn corrupt_files_are_storage_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let store = FileSession::new(dir.path()).unwrap();
        let err = store.get("broken").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Storage { operation: "decode", .. }
        ));
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("conv.json");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), "x").unwrap();
        let store = FileSession::new(dir.path()).unwrap();

        let err = store.clear("conv").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Storage { operation: "rename", .. }
        ));
        assert!(!dir.path().join("conv.json.tmp").exists());
    }

    #[test]
    fn pending_file_is_removed_unless_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let abandoned = dir.path().join("a.json.tmp");
        std::fs::write(&abandoned, "[]").unwrap();
        drop(PendingFile::new(abandoned.clone()));
        assert!(!abandoned.exists());

        let kept = dir.path().join("b.json.tmp");
        std::fs::write(&kept, "[]").unwrap();
        PendingFile::new(kept.clone()).persist();
        assert!(kept.exists());

        // Never written: dropping is a no-op.
        drop(PendingFile::new(dir.path().join("c.json.tmp")));
    }
}
