//! Session-start and message-received against a scripted agent service.

mod common;

use std::sync::Arc;
use std::time::Duration;

use agent_relay::agent::{MessageRole, RunError, ThreadMessage};
use agent_relay::error::RelayError;
use agent_relay::session::SessionStore;
use agent_relay::ui::ChatSink;
use common::{Script, ScriptedAgent, test_state};

#[tokio::test]
async fn test_session_start_creates_one_thread() {
    let agent = ScriptedAgent::replying("hi");
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();

    for _ in 0..3 {
        let mut ctx = session.lock().await;
        state
            .handler
            .on_session_start(&mut ctx, session.channel())
            .await
            .unwrap();
    }

    assert_eq!(agent.create_count(), 1);
    assert_eq!(session.try_thread_id().as_deref(), Some("thread_1"));
    // Nothing is shown on a successful start.
    assert!(session.channel().is_empty());
}

#[tokio::test]
async fn test_user_message_appended_before_run() {
    let agent = ScriptedAgent::replying("Hi there");
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();
    let mut ctx = session.lock().await;

    state
        .handler
        .on_session_start(&mut ctx, session.channel())
        .await
        .unwrap();
    state
        .handler
        .on_message(&mut ctx, "Hello", session.channel())
        .await;

    assert_eq!(
        agent.calls(),
        vec![
            "create_thread",
            "append_message thread_1 user Hello",
            "run_and_wait thread_1 asst_test",
            "list_messages thread_1",
        ]
    );
    let user_messages: Vec<ThreadMessage> = agent
        .thread("thread_1")
        .into_iter()
        .filter(|m| m.role == MessageRole::User)
        .collect();
    assert_eq!(user_messages, vec![ThreadMessage::text(MessageRole::User, "Hello")]);
}

#[tokio::test]
async fn test_failed_run_renders_detail() {
    let agent = ScriptedAgent::new(Script::Fail(RunError {
        code: Some("rate_limit_exceeded".to_string()),
        message: "rate limited".to_string(),
    }));
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();
    let mut ctx = session.lock().await;

    let outcome = state
        .handler
        .on_message(&mut ctx, "Hello", session.channel())
        .await;

    assert!(matches!(outcome.error, Some(RelayError::RunFailed { .. })));
    let transcript = session.channel().transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].id, outcome.message_id);
    assert_eq!(transcript[0].content, "Error: rate limited");
    assert!(transcript.iter().all(|m| m.content != "thinking..."));
    // A failed run never lists messages.
    assert!(!agent.calls().iter().any(|c| c.starts_with("list_messages")));
}

#[tokio::test]
async fn test_silent_run_is_empty_response() {
    let agent = ScriptedAgent::new(Script::Silent);
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();
    let mut ctx = session.lock().await;

    let outcome = state
        .handler
        .on_message(&mut ctx, "Hello", session.channel())
        .await;

    assert!(matches!(outcome.error, Some(RelayError::EmptyResponse)));
    assert_eq!(
        session.channel().get(&outcome.message_id).unwrap().content,
        "Error: No response from the model."
    );
}

#[tokio::test]
async fn test_reply_updates_placeholder_in_place() {
    let agent = ScriptedAgent::replying("The capital of France is Paris.");
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();
    let mut events = session.channel().subscribe();
    let mut ctx = session.lock().await;

    let outcome = state
        .handler
        .on_message(&mut ctx, "What is the capital of France?", session.channel())
        .await;
    assert!(outcome.error.is_none());

    let transcript = session.channel().transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].author, "agent");
    assert_eq!(transcript[0].content, "The capital of France is Paris.");

    // First the placeholder appears, then the same message is updated.
    match events.recv().await.unwrap() {
        agent_relay::ui::UiEvent::MessageCreated(m) => {
            assert_eq!(m.id, outcome.message_id);
            assert_eq!(m.content, "thinking...");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match events.recv().await.unwrap() {
        agent_relay::ui::UiEvent::MessageUpdated { id, content } => {
            assert_eq!(id, outcome.message_id);
            assert_eq!(content, "The capital of France is Paris.");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_sequential_messages_reuse_thread() {
    let agent = ScriptedAgent::replying("ok");
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();
    let mut ctx = session.lock().await;

    state
        .handler
        .on_session_start(&mut ctx, session.channel())
        .await
        .unwrap();
    state.handler.on_message(&mut ctx, "one", session.channel()).await;
    agent.set_script(Script::Reply("two done".to_string()));
    let second = state.handler.on_message(&mut ctx, "two", session.channel()).await;

    assert_eq!(agent.create_count(), 1);
    assert_eq!(ctx.thread_id(), Some("thread_1"));
    assert!(
        agent
            .calls()
            .iter()
            .filter(|c| c.starts_with("append_message"))
            .all(|c| c.starts_with("append_message thread_1 "))
    );
    assert_eq!(
        session.channel().get(&second.message_id).unwrap().content,
        "two done"
    );
}

#[tokio::test]
async fn test_failed_start_is_retried_by_first_message() {
    let agent = ScriptedAgent::replying("recovered");
    agent.set_fail_create(true);
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();
    let mut ctx = session.lock().await;

    let err = state
        .handler
        .on_session_start(&mut ctx, session.channel())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "thread_error");
    assert!(ctx.thread_id().is_none());
    assert!(
        session.channel().transcript()[0]
            .content
            .starts_with("Error: could not create conversation thread")
    );

    agent.set_fail_create(false);
    let outcome = state
        .handler
        .on_message(&mut ctx, "Hello", session.channel())
        .await;
    assert!(outcome.error.is_none());
    assert_eq!(ctx.thread_id(), Some("thread_1"));
    assert_eq!(agent.create_count(), 2);
}

#[tokio::test]
async fn test_thread_failure_on_message() {
    let agent = ScriptedAgent::replying("never");
    agent.set_fail_create(true);
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();
    let mut ctx = session.lock().await;

    let outcome = state
        .handler
        .on_message(&mut ctx, "Hello", session.channel())
        .await;

    assert_eq!(outcome.error.as_ref().map(RelayError::kind), Some("thread_error"));
    assert!(!agent.calls().iter().any(|c| c.starts_with("append_message")));
}

#[tokio::test]
async fn test_transport_failure_is_rendered() {
    let agent = ScriptedAgent::new(Script::Unreachable);
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();
    let mut ctx = session.lock().await;

    let outcome = state
        .handler
        .on_message(&mut ctx, "Hello", session.channel())
        .await;

    assert_eq!(
        outcome.error.as_ref().map(RelayError::kind),
        Some("transport_error")
    );
    assert_eq!(
        session.channel().get(&outcome.message_id).unwrap().content,
        "Error: API error (502): bad gateway"
    );
}

#[tokio::test]
async fn test_same_session_events_are_serialized() {
    let agent = ScriptedAgent::replying("done");
    agent.set_run_delay(Duration::from_millis(50));
    let state = test_state(Arc::clone(&agent));
    let session = state.sessions.create();

    let mut tasks = Vec::new();
    for text in ["first", "second"] {
        let state = state.clone();
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            let mut ctx = session.lock().await;
            state.handler.on_message(&mut ctx, text, session.channel()).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().error.is_none());
    }

    // Without serialization the second message would open its own thread.
    assert_eq!(agent.create_count(), 1);
    let calls = agent.calls();
    let runs: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| c.starts_with("run_and_wait"))
        .map(|(i, _)| i)
        .collect();
    let appends: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| c.starts_with("append_message"))
        .map(|(i, _)| i)
        .collect();
    assert!(appends[1] > runs[0], "second append overlapped first run: {calls:?}");
}

#[tokio::test]
async fn test_sessions_get_separate_threads() {
    let agent = ScriptedAgent::replying("ok");
    let state = test_state(Arc::clone(&agent));
    let store: &SessionStore = &state.sessions;

    let a = store.create();
    let b = store.create();
    for session in [&a, &b] {
        let mut ctx = session.lock().await;
        state
            .handler
            .on_session_start(&mut ctx, session.channel())
            .await
            .unwrap();
    }

    assert_eq!(agent.create_count(), 2);
    assert_ne!(a.try_thread_id(), b.try_thread_id());
}

#[test]
fn test_channel_is_a_chat_sink() {
    fn assert_sink<T: ChatSink>() {}
    assert_sink::<agent_relay::ui::SessionChannel>();
}
