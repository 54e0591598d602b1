pub(crate) mod session;
pub mod workflow;
