mod coalesce;
mod optimistic;
mod or_cancel;

pub use coalesce::RequestCoalescer;
pub use optimistic::apply_optimistic;
pub use or_cancel::CancelErr;
pub use or_cancel::OrCancelExt;
