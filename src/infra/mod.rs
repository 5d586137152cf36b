pub mod engines;
pub mod error;
pub mod http;
pub mod storage;
pub mod telemetry;
