//! Configuration models for throttles.

pub mod throttle;

pub use throttle::ThrottleConfig;
