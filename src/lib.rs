//! Drivers bridging astronomy equipment to physical hardware: a motorized
//! focuser on a serial line and a flat-field light panel behind the Home
//! Assistant REST API. Each device pairs a hardware bridge (connection
//! ownership, command serialization, background state polling) with a thin
//! driver adapter that reflects observed hardware state into property vectors.

pub mod bridge;
pub mod config;
pub mod driver;
pub mod properties;
pub mod serial;
