pub mod calibration;
pub mod classify;
pub mod metrics;
pub mod prediction;
pub mod recommend;
pub mod trend;
