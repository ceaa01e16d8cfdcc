pub mod device;
pub mod job;
pub mod status;
