use datapillar_api::ActivityEvent;
use datapillar_api::ActivityStatus;
use serde::Deserialize;
use serde::Serialize;

/// Default cap on the activity rows kept per assistant message.
pub const MAX_ACTIVITY_ROWS: usize = 200;

/// One agent step as displayed under an assistant message. Rows are
/// identified by [`ActivityRow::key`], never by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_cn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_en: Option<String>,
    pub event: String,
    pub event_name: String,
    pub status: ActivityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Server timestamp (ms) of the event that last wrote this row.
    pub timestamp: i64,
}

impl ActivityRow {
    pub fn from_event(activity: &ActivityEvent, timestamp: i64) -> Self {
        Self {
            agent_cn: activity.agent_cn.clone(),
            agent_en: activity.agent_en.clone(),
            event: activity.event.clone(),
            event_name: activity.event_name.clone(),
            status: activity.status,
            summary: activity.summary.clone(),
            timestamp,
        }
    }

    pub fn key(&self) -> String {
        activity_key(
            self.agent_en.as_deref(),
            self.agent_cn.as_deref(),
            &self.event,
            &self.event_name,
        )
    }
}

/// `agent:event:event_name`, where the agent is the English name when
/// present and non-empty, otherwise the Chinese display name.
pub fn activity_key(
    agent_en: Option<&str>,
    agent_cn: Option<&str>,
    event: &str,
    event_name: &str,
) -> String {
    let agent = agent_en
        .filter(|name| !name.is_empty())
        .or(agent_cn)
        .unwrap_or_default();
    format!("{agent}:{event}:{event_name}")
}

/// Merges `incoming` into `rows`: a row with the same key is overwritten in
/// place, otherwise the row is appended. The oldest rows are dropped until
/// at most `max_rows` remain.
pub fn upsert_agent_activity(
    mut rows: Vec<ActivityRow>,
    incoming: ActivityRow,
    max_rows: usize,
) -> Vec<ActivityRow> {
    let key = incoming.key();
    match rows.iter().position(|row| row.key() == key) {
        Some(index) => rows[index] = incoming,
        None => rows.push(incoming),
    }
    if rows.len() > max_rows {
        let excess = rows.len() - max_rows;
        rows.drain(..excess);
    }
    rows
}

/// Row with the greatest timestamp. On ties the earliest row in list order
/// wins.
pub fn latest_activity(rows: &[ActivityRow]) -> Option<&ActivityRow> {
    rows.iter()
        .reduce(|best, row| if row.timestamp > best.timestamp { row } else { best })
}
