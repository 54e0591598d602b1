use std::time::Duration;

use api_test_support::ScriptedTransport;
use api_test_support::test_provider;
use datapillar_api::WorkflowClient;
use datapillar_api::auth::NoAuth;
use datapillar_chat::ChatMessage;
use datapillar_chat::ChatSession;
use datapillar_chat::MAX_ACTIVITY_ROWS;
use serde_json::Value;
use serde_json::json;

mod abort;
mod interrupt_resume;
mod streaming;

pub(crate) const SESSION_ID: &str = "s-1";

pub(crate) type TestSession = ChatSession<ScriptedTransport, NoAuth>;

pub(crate) fn session(transport: &ScriptedTransport) -> TestSession {
    let client = WorkflowClient::new(transport.clone(), test_provider(), NoAuth);
    ChatSession::with_session_id(client, SESSION_ID, MAX_ACTIVITY_ROWS)
}

/// Applies events until the session stops streaming.
pub(crate) async fn drain(session: &mut TestSession) -> usize {
    let mut applied = 0;
    while tokio::time::timeout(Duration::from_secs(5), session.next_event())
        .await
        .unwrap_or_else(|_| panic!("session did not stop streaming"))
        .is_some()
    {
        applied += 1;
    }
    applied
}

pub(crate) fn message<'a>(session: &'a TestSession, id: &str) -> &'a ChatMessage {
    session
        .store()
        .message(id)
        .unwrap_or_else(|| panic!("message {id} missing"))
}

pub(crate) fn activity_event(
    status: &str,
    agent: &str,
    event_name: &str,
    activity_status: &str,
    summary: &str,
) -> Value {
    json!({
        "ts": 1_700_000_000_000i64,
        "run_id": "run-1",
        "status": status,
        "activity": {
            "agent_en": agent,
            "event": "agent",
            "event_name": event_name,
            "status": activity_status,
            "summary": summary
        }
    })
}

pub(crate) fn interrupt_event(interrupt_id: Option<&str>, options: &[&str]) -> Value {
    let mut interrupt = json!({ "options": options });
    if let Some(id) = interrupt_id {
        interrupt["interrupt_id"] = json!(id);
    }
    json!({
        "ts": 1_700_000_000_500i64,
        "run_id": "run-1",
        "status": "running",
        "activity": {
            "agent_cn": "需求分析师",
            "agent_en": "analyst",
            "event": "interrupt",
            "event_name": "confirm_source",
            "status": "waiting",
            "summary": "请选择源表",
            "interrupt": interrupt
        }
    })
}
