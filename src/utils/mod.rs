//! Utility modules for media-conductor

pub mod throttle;

pub use throttle::LogThrottler;
