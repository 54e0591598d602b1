use anyhow::Result;
use api_test_support::ScriptedStream;
use api_test_support::ScriptedTransport;
use api_test_support::sse_body;
use assert_matches::assert_matches;
use datapillar_api::StreamStatus;
use datapillar_chat::ChatError;
use datapillar_chat::InterruptState;
use datapillar_chat::Phase;
use datapillar_chat::SendOutcome;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::TestSession;
use super::activity_event;
use super::drain;
use super::interrupt_event;
use super::message;
use super::session;

/// Starts a run that pauses on an interrupt offering two source tables.
async fn paused_session(transport: &ScriptedTransport) -> (TestSession, String) {
    transport.push_stream(ScriptedStream::Hang(sse_body(
        1,
        &[
            activity_event("running", "analyst", "analysis", "running", "分析需求中"),
            interrupt_event(Some("int-1"), &["ods_order", "dwd_order"]),
        ],
    )));
    let mut session = session(transport);
    let SendOutcome::Started { message_id } = session.send("同步订单").await else {
        panic!("expected start");
    };
    drain(&mut session).await;
    (session, message_id)
}

#[tokio::test]
async fn interrupt_stores_options_and_stops_generating() -> Result<()> {
    let transport = ScriptedTransport::new();
    let (session, message_id) = paused_session(&transport).await;

    let paused = message(&session, &message_id);
    assert_eq!(
        paused.interrupt,
        Some(InterruptState {
            interrupt_id: Some("int-1".to_string()),
            options: vec!["ods_order".to_string(), "dwd_order".to_string()],
        })
    );
    assert_eq!(paused.stream_status, None);
    assert_eq!(paused.content, "请选择源表");
    assert!(!session.is_generating());
    assert!(session.is_waiting());
    assert_matches!(
        session.phase(),
        Phase::WaitingForResume { interrupt_id: Some(id), .. } if id == "int-1"
    );
    assert_eq!(session.pending_options(), ["ods_order", "dwd_order"]);
    Ok(())
}

#[tokio::test]
async fn option_is_sent_as_resume_value() -> Result<()> {
    let transport = ScriptedTransport::new();
    let (mut session, message_id) = paused_session(&transport).await;
    transport.push_stream(ScriptedStream::Body(sse_body(
        3,
        &[activity_event("done", "architect", "design", "done", "已按 dwd_order 生成")],
    )));

    let outcome = session.select_option(1).await?;

    assert_eq!(
        outcome,
        SendOutcome::Resumed {
            message_id: message_id.clone()
        }
    );
    let resumed = message(&session, &message_id);
    assert_eq!(resumed.interrupt, None);
    assert_eq!(resumed.stream_status, Some(StreamStatus::Running));
    assert_eq!(
        transport.bodies_for("/workflow/chat")[1],
        json!({
            "userInput": null,
            "sessionId": "s-1",
            "model": null,
            "resumeValue": "dwd_order"
        })
    );

    drain(&mut session).await;
    let finished = message(&session, &message_id);
    assert_eq!(finished.stream_status, Some(StreamStatus::Done));
    assert_eq!(finished.content, "已按 dwd_order 生成");
    assert_eq!(session.store().messages().len(), 3);
    assert_eq!(session.store().messages()[2].content, "dwd_order");
    assert!(transport.bodies_for("/workflow/abort").is_empty());
    Ok(())
}

#[tokio::test]
async fn free_text_while_waiting_resumes_instead_of_prompting() -> Result<()> {
    let transport = ScriptedTransport::new();
    let (mut session, message_id) = paused_session(&transport).await;

    let outcome = session.send("用 ods_order_v2").await;

    assert_eq!(outcome, SendOutcome::Resumed { message_id });
    let chat_bodies = transport.bodies_for("/workflow/chat");
    assert_eq!(chat_bodies.len(), 2);
    assert_eq!(chat_bodies[1]["userInput"], json!(null));
    assert_eq!(chat_bodies[1]["resumeValue"], json!("用 ods_order_v2"));
    assert_eq!(session.store().last_prompt(), Some("同步订单"));
    assert!(session.is_generating());
    Ok(())
}

#[tokio::test]
async fn out_of_range_option_is_rejected() -> Result<()> {
    let transport = ScriptedTransport::new();
    let (mut session, _) = paused_session(&transport).await;

    let err = session.select_option(5).await;

    assert_matches!(err, Err(ChatError::NoSuchOption(5)));
    assert!(session.is_waiting());
    assert_eq!(transport.bodies_for("/workflow/chat").len(), 1);
    Ok(())
}
