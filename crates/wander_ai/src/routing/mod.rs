//! Wander routing
//!
//! Query classification, sequential provider fallback chains with timeouts
//! and cancellation, and the router that ties them to the Registry.

mod fallback;
mod query_classifier;
mod query_router;

pub use fallback::*;
pub use query_classifier::*;
pub use query_router::*;
