//! Message Store Integration Tests
//!
//! Tests for the JSONL log format, sharing a session between store
//! instances, and bulk delete.

use std::io::Write;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;
use voicelink::domain::{Author, ChangeBatch, Message, MessageKind, Role};
use voicelink::store::{BatchStream, JsonlMessageStore, MessageStore, StoreError};

fn message(text: &str, identity: &str, local_time: u64) -> Message {
    Message::new(
        text,
        Role::Sender,
        MessageKind::Text,
        Author::new(identity, "Aiko").with_avatar("avatars/aiko.png"),
        local_time,
    )
}

async fn next_batch(rx: &mut BatchStream) -> ChangeBatch {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for batch")
        .expect("stream closed")
        .expect("store error")
}

#[tokio::test]
async fn test_log_lines_carry_wire_fields() {
    let temp = TempDir::new().unwrap();
    let store = JsonlMessageStore::new(temp.path());

    let id = store.append("chat", message("hello", "u1", 42)).await.unwrap();

    let content = std::fs::read_to_string(store.log_path("chat")).unwrap();
    let line: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();

    assert_eq!(line["id"], id.as_str());
    assert_eq!(line["text"], "hello");
    assert_eq!(line["role"], "sender");
    assert_eq!(line["type"], "text");
    assert_eq!(line["localTime"], 42);
    assert_eq!(line["author"]["identity"], "u1");
    assert_eq!(line["author"]["avatarRef"], "avatars/aiko.png");
    assert!(line["serverTime"].is_string());
}

#[tokio::test]
async fn test_partial_trailing_line_is_ignored() {
    let temp = TempDir::new().unwrap();
    let store = JsonlMessageStore::new(temp.path());
    store.append("chat", message("complete", "u1", 1)).await.unwrap();

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(store.log_path("chat"))
        .unwrap();
    file.write_all(br#"{"id":"half-writ"#).unwrap();

    let all = store.read_all("chat").await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].text, "complete");
}

#[tokio::test]
async fn test_invalid_session_name_rejected() {
    let temp = TempDir::new().unwrap();
    let store = JsonlMessageStore::new(temp.path());

    let result = store.append("../escape", message("x", "u1", 1)).await;
    assert!(matches!(result, Err(StoreError::InvalidSession(_))));
    assert!(store.subscribe("..").await.is_err());
}

#[tokio::test]
async fn test_second_instance_sees_appends() {
    let temp = TempDir::new().unwrap();
    let receiver_store = JsonlMessageStore::new(temp.path());
    let sender_store = JsonlMessageStore::new(temp.path());

    let mut rx = receiver_store.subscribe("chat").await.unwrap();
    assert!(next_batch(&mut rx).await.snapshot.is_empty());

    let id = sender_store
        .append("chat", message("from elsewhere", "u2", 7))
        .await
        .unwrap();

    let batch = next_batch(&mut rx).await;
    let added: Vec<&Message> = batch.added().collect();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].id, id);
}

#[tokio::test]
async fn test_bulk_delete_of_fifty() {
    let temp = TempDir::new().unwrap();
    let store = JsonlMessageStore::new(temp.path());

    for t in 0..50 {
        store.append("chat", message("line", "u1", t)).await.unwrap();
    }

    let mut rx = store.subscribe("chat").await.unwrap();
    assert_eq!(next_batch(&mut rx).await.snapshot.len(), 50);

    let ids: Vec<String> = store
        .read_all("chat")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    store.delete_all("chat", &ids).await.unwrap();

    let batch = next_batch(&mut rx).await;
    assert!(batch.snapshot.is_empty());
    assert_eq!(batch.added().count(), 0);
    assert_eq!(batch.changes.len(), 50);
    assert!(store.read_all("chat").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_line_is_skipped_and_cleared() {
    let temp = TempDir::new().unwrap();
    let store = JsonlMessageStore::new(temp.path());
    let first = store.append("chat", message("before", "u1", 1)).await.unwrap();

    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(store.log_path("chat"))
        .unwrap();
    file.write_all(b"{garbage\n").unwrap();
    drop(file);

    let second = store.append("chat", message("after", "u2", 2)).await.unwrap();

    let all = store.read_all("chat").await.unwrap();
    let texts: Vec<&str> = all.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["before", "after"]);

    let mut rx = store.subscribe("chat").await.unwrap();
    assert_eq!(next_batch(&mut rx).await.snapshot.len(), 2);

    // Clearing still works and leaves no trace of the bad line
    store.delete_all("chat", &[first, second]).await.unwrap();
    let content = std::fs::read_to_string(store.log_path("chat")).unwrap();
    assert!(content.is_empty());
}
