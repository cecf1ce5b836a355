//! Behaviour shared by every session backend.

use turnstile::{FileSession, MemorySession, Message, Session, SessionError};

async fn exercise(store: &dyn Session) {
    let m1 = vec![Message::user("first"), Message::assistant("reply")];
    let m2 = vec![Message::user("second")];

    assert!(store.get("conv").await.unwrap_err().is_not_found());

    store.append("conv", &m1).await.unwrap();
    store.append("conv", &m2).await.unwrap();
    let all = store.get("conv").await.unwrap();
    assert_eq!(all, [m1.clone(), m2.clone()].concat());

    store.append("other", &m2).await.unwrap();
    assert_eq!(store.get("other").await.unwrap(), m2);

    store.clear("conv").await.unwrap();
    assert!(store.get("conv").await.unwrap().is_empty());

    store.delete("conv").await.unwrap();
    assert!(matches!(
        store.get("conv").await.unwrap_err(),
        SessionError::NotFound(id) if id == "conv"
    ));
    assert!(store.clear("conv").await.unwrap_err().is_not_found());
    assert!(store.delete("conv").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn memory_backend_contract() {
    exercise(&MemorySession::new()).await;
}

#[tokio::test]
async fn file_backend_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise(&FileSession::new(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn file_backend_survives_reconstruction() {
    let dir = tempfile::tempdir().unwrap();
    FileSession::new(dir.path())
        .unwrap()
        .append("conv", &[Message::user("persisted")])
        .await
        .unwrap();

    let reopened = FileSession::new(dir.path()).unwrap();
    assert_eq!(reopened.get("conv").await.unwrap(), vec![Message::user("persisted")]);

    let raw = std::fs::read_to_string(dir.path().join("conv.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed[0]["role"], "user");
}

#[tokio::test]
async fn concurrent_appends_are_serialised() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(FileSession::new(dir.path()).unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = std::sync::Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.append("shared", &[Message::user(format!("m{i}"))]).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(store.get("shared").await.unwrap().len(), 8);
}
