pub mod gate;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod retry;
