use datapillar_api::ActivityStatus;
use datapillar_api::SseEvent;
use datapillar_api::StreamStatus;
use datapillar_chat::AbortOutcome;
use datapillar_chat::ActivityRow;
use owo_colors::OwoColorize;
use owo_colors::Style;

use crate::event_processor::EventProcessor;
use crate::event_processor::RunStatus;

/// Renders the run as it streams: one line per agent step, the summary when
/// the run pauses or ends, and numbered options for interrupts.
pub(crate) struct EventProcessorWithHumanOutput {
    bold: Style,
    dimmed: Style,
    green: Style,
    red: Style,
    yellow: Style,
    cyan: Style,
}

impl EventProcessorWithHumanOutput {
    pub(crate) fn create_with_ansi(with_ansi: bool) -> Self {
        if with_ansi {
            Self {
                bold: Style::new().bold(),
                dimmed: Style::new().dimmed(),
                green: Style::new().green(),
                red: Style::new().red(),
                yellow: Style::new().yellow(),
                cyan: Style::new().cyan(),
            }
        } else {
            Self {
                bold: Style::new(),
                dimmed: Style::new(),
                green: Style::new(),
                red: Style::new(),
                yellow: Style::new(),
                cyan: Style::new(),
            }
        }
    }

    fn status_style(&self, status: ActivityStatus) -> Style {
        match status {
            ActivityStatus::Running => self.cyan,
            ActivityStatus::Waiting => self.yellow,
            ActivityStatus::Done => self.green,
            ActivityStatus::Error | ActivityStatus::Aborted => self.red,
        }
    }
}

fn status_label(status: ActivityStatus) -> &'static str {
    match status {
        ActivityStatus::Running => "running",
        ActivityStatus::Waiting => "waiting",
        ActivityStatus::Done => "done",
        ActivityStatus::Error => "error",
        ActivityStatus::Aborted => "aborted",
    }
}

#[allow(clippy::print_stdout)]
impl EventProcessor for EventProcessorWithHumanOutput {
    fn print_session_started(&mut self, session_id: &str, base_url: &str, restored: bool) {
        println!(
            "{} {} {}",
            "session".style(self.bold),
            session_id,
            format!("({base_url})").style(self.dimmed)
        );
        if restored {
            println!("{}", "restored cached conversation".style(self.dimmed));
        }
        println!(
            "{}",
            "type a prompt; /abort stops the run, /new starts over, /quit exits".style(self.dimmed)
        );
    }

    fn process_event(&mut self, event: &SseEvent, status: RunStatus, options: &[String]) {
        if let Some(activity) = &event.activity {
            let agent = activity
                .agent_cn
                .as_deref()
                .or(activity.agent_en.as_deref())
                .unwrap_or("agent");
            println!(
                "  {} {} {}",
                format!("[{}]", status_label(activity.status))
                    .style(self.status_style(activity.status)),
                agent.style(self.bold),
                activity.event_name.style(self.dimmed),
            );
        }
        if let Some(workflow) = &event.workflow {
            println!(
                "  {}",
                format!(
                    "workflow updated: {} nodes, {} edges",
                    workflow.nodes.len(),
                    workflow.edges.len()
                )
                .style(self.dimmed)
            );
        }

        let summary = event
            .activity
            .as_ref()
            .and_then(|activity| activity.summary.as_deref());
        match status {
            RunStatus::Running => {}
            RunStatus::WaitingForInput => {
                if let Some(summary) = summary {
                    println!("{}", summary.style(self.yellow));
                }
                for (index, option) in options.iter().enumerate() {
                    println!("  {}. {option}", index + 1);
                }
                println!(
                    "{}",
                    "reply with text or an option number; /abort cancels".style(self.dimmed)
                );
            }
            RunStatus::Finished => {
                let style = match event.status {
                    StreamStatus::Done => self.green,
                    _ => self.red,
                };
                if let Some(summary) = summary {
                    println!("{}", summary.style(style));
                }
                if let Some(recommendations) = event
                    .activity
                    .as_ref()
                    .and_then(|activity| activity.recommendations.as_ref())
                {
                    for recommendation in recommendations {
                        println!("  {} {recommendation}", "→".style(self.cyan));
                    }
                }
            }
        }
    }

    fn print_latest_step(&mut self, step: &ActivityRow) {
        let agent = step
            .agent_cn
            .as_deref()
            .or(step.agent_en.as_deref())
            .unwrap_or("agent");
        println!(
            "{} {} {} {}",
            "latest step:".style(self.dimmed),
            agent.style(self.bold),
            step.event_name,
            format!("[{}]", status_label(step.status)).style(self.status_style(step.status)),
        );
    }

    fn print_abort(&mut self, outcome: &AbortOutcome) {
        match outcome {
            AbortOutcome::Aborted { message, .. } => println!("{}", message.style(self.yellow)),
            AbortOutcome::Idle => println!("{}", "nothing to abort".style(self.dimmed)),
        }
    }

    fn print_error(&mut self, message: &str) {
        println!("{} {message}", "error:".style(self.red));
    }
}
