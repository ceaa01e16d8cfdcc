//! Edge Job Dispatch Engine
//!
//! This library turns a single device into a worker node for a remote
//! compute-job queue: it polls for available jobs, claims at most one at a
//! time under battery and power constraints, executes it through a
//! type-dispatched handler with a bounded timeout, and reports the result
//! back to the coordinator.
//!
//! The engine performs no inference itself; execution backends plug in
//! behind [`services::registry::JobHandler`]. Job state lives in memory for
//! the engine's lifetime.

pub mod config;
pub mod dispatcher;
pub mod models;
pub mod services;
pub mod state;
