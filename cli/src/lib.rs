// Interactive front end for the workflow builder chat.
//
// Conversation output goes to stdout (human-readable, or JSONL with
// `--json`); logs always go to stderr.

mod cli;
mod event_processor;
mod event_processor_with_human_output;
pub mod event_processor_with_jsonl_output;

pub use cli::Cli;
pub use cli::Color;
use datapillar_api::WorkflowClient;
use datapillar_api::auth::StaticAuth;
use datapillar_chat::ChatSession;
use datapillar_chat::Config;
use datapillar_chat::ConfigOverrides;
use datapillar_chat::FileSnapshotStore;
use datapillar_chat::SendOutcome;
use datapillar_client::ReqwestTransport;
use supports_color::Stream;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::io::Lines;
use tokio::io::Stdin;
use tracing::debug;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::event_processor::EventProcessor;
use crate::event_processor::RunStatus;
use crate::event_processor_with_human_output::EventProcessorWithHumanOutput;
use crate::event_processor_with_jsonl_output::EventProcessorWithJsonOutput;

type Session = ChatSession<ReqwestTransport, StaticAuth>;

#[derive(Debug, PartialEq, Eq)]
enum InputCommand {
    Quit,
    New,
    Abort,
    Text(String),
}

impl InputCommand {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "/quit" | "/exit" => InputCommand::Quit,
            "/new" => InputCommand::New,
            "/abort" => InputCommand::Abort,
            text => InputCommand::Text(text.to_string()),
        }
    }
}

enum Input {
    Line(String),
    Eof,
    Interrupted,
}

enum Step {
    Event(Option<datapillar_api::SseEvent>),
    Interrupted,
}

/// One-based option number typed by the user, as a zero-based index.
fn option_index(text: &str, option_count: usize) -> Option<usize> {
    let number = text.trim().parse::<usize>().ok()?;
    number.checked_sub(1).filter(|index| *index < option_count)
}

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        base_url,
        model,
        session_id,
        no_cache,
        color,
        json: json_mode,
        verbose,
        prompt,
    } = cli;

    let (stdout_with_ansi, stderr_with_ansi) = match color {
        Color::Always => (true, true),
        Color::Never => (false, false),
        Color::Auto => (
            supports_color::on_cached(Stream::Stdout).is_some(),
            supports_color::on_cached(Stream::Stderr).is_some(),
        ),
    };

    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(stderr_with_ansi)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();

    let config = Config::load_with_overrides(ConfigOverrides { base_url, model })?;
    let auth = StaticAuth {
        token: config.api_key(),
        tenant_id: config.tenant_id.clone(),
    };
    if auth.token.is_none() {
        warn!(
            env = %config.api_key_env,
            "no API key found; requests are sent without a bearer token"
        );
    }
    let client = WorkflowClient::new(
        ReqwestTransport::new(reqwest::Client::new()),
        config.provider(),
        auth,
    );
    let mut session = match session_id {
        Some(id) => ChatSession::with_session_id(client, id, config.max_activity_rows),
        None => ChatSession::new(client, config.max_activity_rows),
    };
    session
        .store_mut()
        .set_default_model_id(config.model.clone());

    let cache = (!no_cache).then(|| FileSnapshotStore::in_home(&config.datapillar_home));
    let mut restored = false;
    if let Some(cache) = &cache {
        match session.restore(cache).await {
            Ok(applied) => restored = applied,
            Err(err) => warn!(error = %err, "failed to restore cached conversation"),
        }
    }

    let mut processor: Box<dyn EventProcessor> = if json_mode {
        Box::new(EventProcessorWithJsonOutput)
    } else {
        Box::new(EventProcessorWithHumanOutput::create_with_ansi(
            stdout_with_ansi,
        ))
    };
    processor.print_session_started(session.session_id(), &config.base_url, restored);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = prompt;
    loop {
        let line = match pending.take() {
            Some(prompt) => prompt,
            None => match read_input(&mut lines).await? {
                Input::Line(line) => line,
                Input::Eof => break,
                Input::Interrupted if session.is_waiting() => {
                    abort_run(&mut session, processor.as_mut()).await;
                    continue;
                }
                Input::Interrupted => break,
            },
        };

        match InputCommand::parse(&line) {
            InputCommand::Quit => break,
            InputCommand::New => {
                session.new_session();
                processor.print_session_started(session.session_id(), &config.base_url, false);
            }
            InputCommand::Abort => abort_run(&mut session, processor.as_mut()).await,
            InputCommand::Text(text) => {
                let outcome = if session.is_waiting()
                    && let Some(index) = option_index(&text, session.pending_options().len())
                {
                    match session.select_option(index).await {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            processor.print_error(&err.user_message());
                            continue;
                        }
                    }
                } else {
                    session.send(&text).await
                };
                if outcome == SendOutcome::Ignored {
                    if session.is_generating() {
                        processor.print_error("a run is still active; use /abort to stop it");
                    } else {
                        debug!("input ignored");
                    }
                    continue;
                }
                drive_run(&mut session, processor.as_mut()).await;
            }
        }
    }

    if let Some(cache) = &cache
        && let Err(err) = session.persist(cache).await
    {
        warn!(error = %err, "failed to save conversation cache");
    }
    Ok(())
}

async fn read_input(lines: &mut Lines<BufReader<Stdin>>) -> std::io::Result<Input> {
    tokio::select! {
        line = lines.next_line() => Ok(match line? {
            Some(line) => Input::Line(line),
            None => Input::Eof,
        }),
        _ = tokio::signal::ctrl_c() => Ok(Input::Interrupted),
    }
}

fn run_status(session: &Session) -> RunStatus {
    if session.is_waiting() {
        RunStatus::WaitingForInput
    } else if session.is_generating() {
        RunStatus::Running
    } else {
        RunStatus::Finished
    }
}

/// Applies events until the run pauses or ends. Ctrl-C aborts the run.
async fn drive_run(session: &mut Session, processor: &mut dyn EventProcessor) {
    loop {
        let step = tokio::select! {
            event = session.next_event() => Step::Event(event),
            _ = tokio::signal::ctrl_c() => Step::Interrupted,
        };
        match step {
            Step::Event(Some(event)) => {
                let status = run_status(session);
                processor.process_event(&event, status, session.pending_options());
                if status != RunStatus::Running {
                    if let Some(step) = session.latest_step() {
                        processor.print_latest_step(step);
                    }
                    return;
                }
            }
            Step::Event(None) if session.is_generating() => {
                processor.print_error(
                    "stopped listening, but the abort did not reach the server; \
                     the run may still be active, use /abort to retry",
                );
                return;
            }
            Step::Event(None) => {
                processor.print_error("event stream closed before the run finished");
                return;
            }
            Step::Interrupted => {
                abort_run(session, processor).await;
                if !session.is_generating() {
                    return;
                }
            }
        }
    }
}

async fn abort_run(session: &mut Session, processor: &mut dyn EventProcessor) {
    match session.abort().await {
        Ok(outcome) => processor.print_abort(&outcome),
        Err(err) => processor.print_error(&format!("abort failed: {}", err.user_message())),
    }
}
