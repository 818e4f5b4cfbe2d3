//! Price alerts and reply tracking

pub mod alerts;
pub mod replies;

pub use alerts::{AlertBook, AlertOp, PriceAlert, DEFAULT_GAP};
pub use replies::{ReplyTracker, TrackedThread};
