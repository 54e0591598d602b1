use anyhow::Result;
use api_test_support::ScriptedStream;
use api_test_support::ScriptedTransport;
use api_test_support::sse_body;
use assert_matches::assert_matches;
use datapillar_api::ActivityStatus;
use datapillar_api::StreamStatus;
use datapillar_chat::Phase;
use datapillar_chat::Role;
use datapillar_chat::SendOutcome;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::activity_event;
use super::drain;
use super::message;
use super::session;

#[tokio::test]
async fn done_clears_active_message_so_next_prompt_creates_a_new_one() -> Result<()> {
    let transport = ScriptedTransport::new();
    let mut done = activity_event("done", "architect", "design", "done", "工作流已生成");
    done["activity"]["recommendations"] = json!(["增加数据质量校验"]);
    done["workflow"] = json!({"nodes": [{"id": "extract"}, {"id": "load"}], "edges": [{"from": "extract", "to": "load"}]});
    transport.push_stream(ScriptedStream::Body(sse_body(
        1,
        &[
            activity_event("running", "analyst", "analysis", "running", "分析需求中"),
            activity_event("running", "analyst", "analysis", "done", "需求分析完成"),
            done,
        ],
    )));
    let mut session = session(&transport);

    let first = session.send("把订单表同步到数仓").await;
    let SendOutcome::Started { message_id: first_id } = first else {
        panic!("unexpected outcome {first:?}");
    };
    assert!(session.is_generating());
    assert_eq!(session.active_message_id(), Some(first_id.as_str()));

    assert_eq!(drain(&mut session).await, 3);

    assert_matches!(session.phase(), Phase::Idle);
    assert_eq!(session.active_message_id(), None);
    let finished = message(&session, &first_id);
    assert_eq!(finished.stream_status, Some(StreamStatus::Done));
    assert_eq!(finished.content, "工作流已生成");
    assert_eq!(
        finished.recommendations,
        Some(vec!["增加数据质量校验".to_string()])
    );
    assert_eq!(finished.process_rows.len(), 2);
    assert_eq!(finished.process_rows[0].status, ActivityStatus::Done);
    assert_eq!(session.store().workflow().map(|w| w.nodes.len()), Some(2));
    assert_eq!(session.store().last_prompt(), Some("把订单表同步到数仓"));
    assert!(session.store().is_initialized());

    transport.push_stream(ScriptedStream::Body(sse_body(
        1,
        &[activity_event("done", "analyst", "analysis", "done", "第二轮完成")],
    )));
    let second = session.send("再加一个清洗步骤").await;
    let SendOutcome::Started { message_id: second_id } = second else {
        panic!("unexpected outcome {second:?}");
    };
    assert_ne!(first_id, second_id);
    drain(&mut session).await;

    assert_eq!(message(&session, &first_id).content, "工作流已生成");
    assert_eq!(message(&session, &second_id).content, "第二轮完成");
    let roles: Vec<Role> = session.store().messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    Ok(())
}

#[tokio::test]
async fn send_while_generating_is_a_noop() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push_stream(ScriptedStream::Hang(String::new()));
    let mut session = session(&transport);

    assert_matches!(session.send("first").await, SendOutcome::Started { .. });
    let before = session.store().clone();

    assert_eq!(session.send("second").await, SendOutcome::Ignored);
    assert_eq!(session.send("   ").await, SendOutcome::Ignored);

    assert_eq!(transport.bodies_for("/workflow/chat").len(), 1);
    assert_eq!(session.store(), &before);
    let Phase::Running { handle, .. } = session.phase() else {
        panic!("expected running phase");
    };
    assert!(!handle.is_closed());
    Ok(())
}

#[tokio::test]
async fn model_selection_is_sent_with_prompt() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push_stream(ScriptedStream::Hang(String::new()));
    let mut session = session(&transport);
    session.store_mut().set_default_model_id(Some("3".to_string()));
    session.store_mut().set_selected_model_id(Some("12".to_string()));

    session.send("hello").await;

    assert_eq!(
        transport.bodies_for("/workflow/chat"),
        vec![json!({"userInput": "hello", "sessionId": "s-1", "model": "12"})]
    );
    Ok(())
}

#[tokio::test]
async fn malformed_frame_marks_message_failed() -> Result<()> {
    let transport = ScriptedTransport::new();
    let mut body = sse_body(
        1,
        &[activity_event("running", "analyst", "analysis", "running", "分析中")],
    );
    body.push_str("id: 2\ndata: {not json\n\n");
    transport.push_stream(ScriptedStream::Hang(body));
    let mut session = session(&transport);

    let SendOutcome::Started { message_id } = session.send("hello").await else {
        panic!("expected start");
    };
    assert_eq!(drain(&mut session).await, 2);

    let failed = message(&session, &message_id);
    assert_eq!(failed.stream_status, Some(StreamStatus::Error));
    assert_eq!(failed.process_rows.len(), 2);
    assert_eq!(
        failed.process_rows[1].key(),
        "system:error:system_error"
    );
    assert_matches!(session.phase(), Phase::Idle);
    Ok(())
}

#[tokio::test]
async fn rejected_start_surfaces_inline_error() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push_reply(api_test_support::Reply::Status(
        503,
        "service unavailable".to_string(),
    ));
    let mut session = session(&transport);

    let SendOutcome::Started { message_id } = session.send("hello").await else {
        panic!("expected start");
    };
    drain(&mut session).await;

    let failed = message(&session, &message_id);
    assert_eq!(failed.stream_status, Some(StreamStatus::Error));
    assert!(
        failed.content.contains("service unavailable"),
        "content: {}",
        failed.content
    );
    assert!(transport.streamed().is_empty());
    Ok(())
}

#[tokio::test]
async fn events_without_active_message_are_ignored() -> Result<()> {
    let transport = ScriptedTransport::new();
    let mut session = session(&transport);
    let event = serde_json::from_value(activity_event(
        "running", "analyst", "analysis", "running", "stray",
    ))?;

    session.apply_event(&event);

    assert!(session.store().is_empty());
    assert!(session.next_event().await.is_none());
    Ok(())
}

#[tokio::test]
async fn new_session_resets_but_keeps_model() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push_stream(ScriptedStream::Hang(String::new()));
    let mut session = session(&transport);
    session.store_mut().set_selected_model_id(Some("12".to_string()));
    session.send("hello").await;
    let Phase::Running { handle, .. } = session.phase().clone() else {
        panic!("expected running phase");
    };

    session.new_session();

    assert!(handle.is_closed());
    assert_ne!(session.session_id(), "s-1");
    assert!(session.store().is_empty());
    assert_eq!(session.store().selected_model_id(), Some("12"));
    assert_matches!(session.phase(), Phase::Idle);
    Ok(())
}

#[tokio::test]
async fn latest_step_follows_newest_timestamp_of_last_answer() -> Result<()> {
    let transport = ScriptedTransport::new();
    let mut analysis = activity_event("running", "analyst", "analysis", "done", "需求分析完成");
    analysis["ts"] = json!(1_700_000_000_900i64);
    let mut design = activity_event("done", "architect", "design", "done", "工作流已生成");
    design["ts"] = json!(1_700_000_000_400i64);
    transport.push_stream(ScriptedStream::Body(sse_body(1, &[analysis, design])));
    let mut session = session(&transport);
    assert_eq!(session.latest_step(), None);

    assert_matches!(session.send("同步订单表").await, SendOutcome::Started { .. });
    assert_eq!(drain(&mut session).await, 2);

    let latest = session
        .latest_step()
        .unwrap_or_else(|| panic!("expected a latest step"));
    assert_eq!(latest.event_name, "analysis");
    assert_eq!(latest.agent_en.as_deref(), Some("analyst"));
    Ok(())
}
