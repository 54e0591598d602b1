pub mod auth;
pub mod common;
pub mod endpoint;
pub mod error;
pub mod provider;
pub mod sse;

pub use crate::auth::AuthProvider;
pub use crate::common::AbortRequest;
pub use crate::common::AbortResponse;
pub use crate::common::ActivityEvent;
pub use crate::common::ActivityStatus;
pub use crate::common::ChatRequest;
pub use crate::common::INTERRUPT_EVENT;
pub use crate::common::InterruptPayload;
pub use crate::common::SseEvent;
pub use crate::common::StreamHandle;
pub use crate::common::StreamStatus;
pub use crate::common::WorkflowGraph;
pub use crate::common::WorkflowStream;
pub use crate::endpoint::workflow::WorkflowClient;
pub use crate::error::ApiError;
pub use crate::provider::Provider;
pub use crate::provider::ReconnectConfig;
pub use crate::provider::RetryConfig;
pub use datapillar_client::TransportError;
