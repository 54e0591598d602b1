use clap::Parser;
use clap::ValueEnum;

#[derive(Parser, Debug)]
#[command(version, about = "Chat with the Datapillar AI workflow builder")]
pub struct Cli {
    /// Base URL of the AI gateway, e.g. `http://localhost:7000/api/ai`.
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// Model id sent with each request.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Continue an existing session id, restoring its cached conversation.
    #[arg(long = "session", value_name = "SESSION_ID")]
    pub session_id: Option<String>,

    /// Do not read or write the conversation cache.
    #[arg(long = "no-cache", default_value_t = false)]
    pub no_cache: bool,

    /// Specifies color settings for use in the output.
    #[arg(long = "color", value_enum, default_value_t = Color::Auto)]
    pub color: Color,

    /// Print events to stdout as JSONL.
    #[arg(long = "json", default_value_t = false)]
    pub json: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// First prompt to send. Further input is read from stdin.
    #[arg(value_name = "PROMPT", value_hint = clap::ValueHint::Other)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Color {
    Always,
    Never,
    #[default]
    Auto,
}
