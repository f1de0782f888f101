//! Deferred write batching for progress mutations.

pub mod deferred;

pub use deferred::{ApplyOutcome, DeferredWriter, FlushReason, SavePolicy};
