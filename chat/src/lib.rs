//! Application state for the AI workflow builder chat: the activity
//! reconciler, the message store and its cache snapshot, and the session
//! controller that drives runs through interrupt, resume and abort.

mod activity;
mod cache;
pub mod config;
mod error;
mod message;
mod session;
mod store;

pub use activity::ActivityRow;
pub use activity::MAX_ACTIVITY_ROWS;
pub use activity::activity_key;
pub use activity::latest_activity;
pub use activity::upsert_agent_activity;
pub use cache::CacheSnapshot;
pub use cache::FileSnapshotStore;
pub use cache::SnapshotStore;
pub use config::Config;
pub use config::ConfigOverrides;
pub use config::ConfigToml;
pub use error::ChatError;
pub use error::ConfigError;
pub use error::Result;
pub use message::ChatMessage;
pub use message::InterruptState;
pub use message::MessagePatch;
pub use message::Role;
pub use session::AbortOutcome;
pub use session::ChatSession;
pub use session::Phase;
pub use session::SendOutcome;
pub use store::ChatStore;
