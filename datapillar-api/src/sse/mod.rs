pub mod workflow;

pub use workflow::process_workflow_sse;
