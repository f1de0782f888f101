//! Retry policies and store health tracking.

pub mod health;
pub mod retry;
