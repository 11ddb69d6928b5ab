//! Session lifecycle: upload, ask, reset, and failure handling.

mod common;

use std::sync::Arc;

use docqa::session::{Session, SessionError, SessionState, UploadOutcome};
use tempfile::TempDir;

use common::{fakes, minimal_pdf, test_config, Fakes};

fn session(tmp: &TempDir, reply: &[&str]) -> (Session, Fakes) {
    let fakes = fakes(reply);
    let config = Arc::new(test_config(tmp.path()));
    (Session::new(config, fakes.providers.clone()), fakes)
}

#[tokio::test]
async fn test_upload_then_ask_records_turn() {
    let tmp = TempDir::new().unwrap();
    let (mut session, fakes) = session(&tmp, &["It erupted ", "at dawn."]);
    assert_eq!(session.state(), SessionState::Empty);

    let outcome = session
        .upload("volcano.pdf", &minimal_pdf("The volcano erupted at dawn"))
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Processed { chunks: 1 });
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.document_name(), Some("volcano.pdf"));

    let mut streamed = String::new();
    let turn = session
        .ask("When did the volcano erupt?", |t| streamed.push_str(t))
        .await
        .unwrap();

    assert_eq!(turn.response, "It erupted at dawn.");
    assert_eq!(streamed, turn.response);
    assert_eq!(turn.sources.len(), 1);
    assert!(turn.sources[0].text.contains("volcano"));
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.chatbot().unwrap().history().len(), 2);
    assert_eq!(fakes.chat.calls(), 1);
}

#[tokio::test]
async fn test_same_bytes_reuse_index() {
    let tmp = TempDir::new().unwrap();
    let (mut session, fakes) = session(&tmp, &["ok"]);
    let pdf = minimal_pdf("Lava flows downhill");

    session.upload("a.pdf", &pdf).await.unwrap();
    let first_path = session.upload_path().unwrap().to_path_buf();
    session.ask("Where does lava go?", |_| {}).await.unwrap();

    // Same bytes under a new name: nothing rebuilt, conversation kept
    let outcome = session.upload("renamed.pdf", &pdf).await.unwrap();
    assert_eq!(outcome, UploadOutcome::Unchanged { chunks: 1 });
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.document_name(), Some("renamed.pdf"));
    assert_eq!(session.upload_path().unwrap(), first_path);
    assert!(first_path.exists());

    let namespace = session.chatbot().unwrap().store().namespace().to_string();
    assert_eq!(fakes.index.len(&namespace), 1);
}

#[tokio::test]
async fn test_new_file_resets_session() {
    let tmp = TempDir::new().unwrap();
    let (mut session, _fakes) = session(&tmp, &["ok"]);

    session
        .upload("notes.pdf", &minimal_pdf("Apple trees bloom in spring"))
        .await
        .unwrap();
    let old_path = session.upload_path().unwrap().to_path_buf();
    let old_conversation = session.chatbot().unwrap().conversation_id();
    session.ask("When do apple trees bloom?", |_| {}).await.unwrap();

    // Same name, different content
    let outcome = session
        .upload("notes.pdf", &minimal_pdf("Jazz clubs stay open at night"))
        .await
        .unwrap();
    assert_eq!(outcome, UploadOutcome::Processed { chunks: 1 });
    assert!(session.history().is_empty());
    assert!(session.chatbot().unwrap().history().is_empty());
    assert_ne!(session.chatbot().unwrap().conversation_id(), old_conversation);
    assert!(!old_path.exists());

    let turn = session.ask("Any jazz at night?", |_| {}).await.unwrap();
    assert!(turn.sources[0].text.contains("Jazz"));
}

#[tokio::test]
async fn test_generation_error_keeps_history() {
    let tmp = TempDir::new().unwrap();
    let (mut session, fakes) = session(&tmp, &["partial"]);
    session
        .upload("v.pdf", &minimal_pdf("The volcano erupted at dawn"))
        .await
        .unwrap();
    session.ask("volcano?", |_| {}).await.unwrap();

    fakes.chat.set_failing(true);
    let err = session.ask("volcano again?", |_| {}).await.unwrap_err();
    assert!(matches!(err, SessionError::Generation(_)));
    assert!(err.to_string().contains("model overloaded"));

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.chatbot().unwrap().history().len(), 2);

    // Recovers once the provider does
    fakes.chat.set_failing(false);
    session.ask("volcano once more?", |_| {}).await.unwrap();
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_ask_requires_document_and_query() {
    let tmp = TempDir::new().unwrap();
    let (mut session, fakes) = session(&tmp, &["ok"]);

    let err = session.ask("anything?", |_| {}).await.unwrap_err();
    assert!(matches!(err, SessionError::NoDocument));

    session
        .upload("v.pdf", &minimal_pdf("The volcano erupted at dawn"))
        .await
        .unwrap();
    let err = session.ask("   ", |_| {}).await.unwrap_err();
    assert!(matches!(err, SessionError::EmptyQuery));
    assert_eq!(fakes.chat.calls(), 0);
}

#[tokio::test]
async fn test_failed_upload_leaves_session_empty() {
    let tmp = TempDir::new().unwrap();
    let (mut session, _fakes) = session(&tmp, &["ok"]);
    session
        .upload("v.pdf", &minimal_pdf("The volcano erupted at dawn"))
        .await
        .unwrap();

    let err = session
        .upload("notes.txt", b"just some plain text")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Ingestion(_)));
    assert_eq!(session.state(), SessionState::Empty);
    assert!(session.document_name().is_none());
    assert_eq!(session.chunk_count(), 0);

    let err = session.ask("volcano?", |_| {}).await.unwrap_err();
    assert!(matches!(err, SessionError::NoDocument));
}

#[tokio::test]
async fn test_clear_history_empties_both_histories() {
    let tmp = TempDir::new().unwrap();
    let (mut session, _fakes) = session(&tmp, &["ok"]);
    session
        .upload("v.pdf", &minimal_pdf("The volcano erupted at dawn"))
        .await
        .unwrap();
    session.ask("volcano?", |_| {}).await.unwrap();

    session.clear_history();
    assert!(session.history().is_empty());
    assert!(session.chatbot().unwrap().history().is_empty());
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_model_context_is_bounded() {
    let tmp = TempDir::new().unwrap();
    let (mut session, fakes) = session(&tmp, &["ok"]);
    session
        .upload("v.pdf", &minimal_pdf("The volcano erupted at dawn"))
        .await
        .unwrap();

    for n in 0..12 {
        session.ask(&format!("volcano question {}", n), |_| {}).await.unwrap();
    }
    assert_eq!(session.history().len(), 12);
    assert_eq!(session.chatbot().unwrap().history().len(), 20);

    // Last request carried 20 history messages plus the new prompt
    let sent = fakes.chat.sent.lock().unwrap();
    assert_eq!(sent.last().unwrap().len(), 21);
}

#[tokio::test]
async fn test_ending_session_removes_staged_upload() {
    let tmp = TempDir::new().unwrap();
    let (mut session, _fakes) = session(&tmp, &["ok"]);
    session
        .upload("v.pdf", &minimal_pdf("The volcano erupted at dawn"))
        .await
        .unwrap();

    let path = session.upload_path().unwrap().to_path_buf();
    assert!(path.starts_with(tmp.path()));
    assert!(path.exists());

    drop(session);
    assert!(!path.exists());
}
