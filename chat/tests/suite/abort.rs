use anyhow::Result;
use api_test_support::Reply;
use api_test_support::ScriptedStream;
use api_test_support::ScriptedTransport;
use api_test_support::sse_body;
use assert_matches::assert_matches;
use datapillar_api::StreamStatus;
use datapillar_chat::AbortOutcome;
use datapillar_chat::Phase;
use datapillar_chat::SendOutcome;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::TestSession;
use super::drain;
use super::interrupt_event;
use super::message;
use super::session;

async fn waiting_session(
    transport: &ScriptedTransport,
    interrupt_id: Option<&str>,
) -> (TestSession, String) {
    transport.push_stream(ScriptedStream::Hang(sse_body(
        1,
        &[interrupt_event(interrupt_id, &["yes", "no"])],
    )));
    let mut session = session(transport);
    let SendOutcome::Started { message_id } = session.send("建一个同步任务").await else {
        panic!("expected start");
    };
    drain(&mut session).await;
    assert!(session.is_waiting());
    (session, message_id)
}

#[tokio::test]
async fn abort_while_waiting_sends_interrupt_id() -> Result<()> {
    let transport = ScriptedTransport::new();
    let (mut session, message_id) = waiting_session(&transport, Some("int-7")).await;
    transport.push_reply(Reply::Json(json!({"message": "已取消本次生成"})));

    let outcome = session.abort().await?;

    assert_eq!(
        outcome,
        AbortOutcome::Aborted {
            message_id: message_id.clone(),
            message: "已取消本次生成".to_string(),
        }
    );
    assert_eq!(
        transport.bodies_for("/workflow/abort"),
        vec![json!({"sessionId": "s-1", "interruptId": "int-7"})]
    );
    assert_eq!(transport.streamed().len(), 1);
    let aborted = message(&session, &message_id);
    assert_eq!(aborted.content, "已取消本次生成");
    assert_eq!(aborted.stream_status, Some(StreamStatus::Aborted));
    assert_eq!(aborted.interrupt, None);
    assert_matches!(session.phase(), Phase::Idle);
    Ok(())
}

#[tokio::test]
async fn abort_while_running_closes_stream_then_aborts_without_id() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push_stream(ScriptedStream::Hang(String::new()));
    let mut session = session(&transport);
    let SendOutcome::Started { message_id } = session.send("hello").await else {
        panic!("expected start");
    };
    let Phase::Running { handle, .. } = session.phase().clone() else {
        panic!("expected running phase");
    };
    transport.push_reply(Reply::Json(json!({"message": "已停止"})));

    session.abort().await?;

    assert!(handle.is_closed());
    assert_eq!(
        transport.bodies_for("/workflow/abort"),
        vec![json!({"sessionId": "s-1"})]
    );
    let aborted = message(&session, &message_id);
    assert_eq!(aborted.stream_status, Some(StreamStatus::Aborted));
    assert_eq!(aborted.content, "已停止");
    assert!(session.next_event().await.is_none());
    assert_matches!(session.phase(), Phase::Idle);
    Ok(())
}

#[tokio::test]
async fn waiting_without_interrupt_id_uses_plain_abort() -> Result<()> {
    let transport = ScriptedTransport::new();
    let (mut session, _) = waiting_session(&transport, None).await;
    transport.push_reply(Reply::Json(json!({"message": "ok"})));

    session.abort().await?;

    assert_eq!(
        transport.bodies_for("/workflow/abort"),
        vec![json!({"sessionId": "s-1"})]
    );
    Ok(())
}

#[tokio::test]
async fn abort_when_idle_is_a_noop() -> Result<()> {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport);

    assert_eq!(session.abort().await?, AbortOutcome::Idle);
    assert!(transport.executed().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_abort_leaves_state_for_retry() -> Result<()> {
    let transport = ScriptedTransport::new();
    let (mut session, message_id) = waiting_session(&transport, Some("int-7")).await;
    let before = session.store().clone();
    transport.push_reply(Reply::Status(500, "abort failed".to_string()));

    let err = session.abort().await;

    assert!(err.is_err());
    assert_eq!(session.store(), &before);
    assert!(session.is_waiting());

    transport.push_reply(Reply::Json(json!({"message": "已取消"})));
    let outcome = session.abort().await?;
    assert_matches!(outcome, AbortOutcome::Aborted { message_id: id, .. } if id == message_id);
    assert_eq!(transport.bodies_for("/workflow/abort").len(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_abort_while_running_stays_running_for_retry() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push_stream(ScriptedStream::Hang(String::new()));
    let mut session = session(&transport);
    let SendOutcome::Started { message_id } = session.send("hello").await else {
        panic!("expected start");
    };
    transport.push_reply(Reply::Status(502, "gateway down".to_string()));

    assert!(session.abort().await.is_err());

    // The transport is already closed, but the run must not be reported as
    // failed: the backend may still be generating.
    assert!(session.next_event().await.is_none());
    assert!(session.is_generating());
    assert_eq!(
        message(&session, &message_id).stream_status,
        Some(StreamStatus::Running)
    );
    assert_eq!(session.send("another prompt").await, SendOutcome::Ignored);

    transport.push_reply(Reply::Json(json!({"message": "已停止"})));
    let outcome = session.abort().await?;

    assert_matches!(outcome, AbortOutcome::Aborted { message_id: id, .. } if id == message_id);
    assert_eq!(
        transport.bodies_for("/workflow/abort"),
        vec![json!({"sessionId": "s-1"}), json!({"sessionId": "s-1"})]
    );
    assert_eq!(
        message(&session, &message_id).stream_status,
        Some(StreamStatus::Aborted)
    );
    assert_matches!(session.phase(), Phase::Idle);
    Ok(())
}
