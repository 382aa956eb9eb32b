pub mod focuser;
pub mod light;

pub use focuser::FocuserDriver;
pub use light::FlattenerDriver;

// Standard vector/element identifiers shared with the control protocol.
pub const CONNECTION: &str = "CONNECTION";
pub const CONNECT: &str = "CONNECT";
pub const DISCONNECT: &str = "DISCONNECT";
pub const INFO: &str = "INFO";
pub const MANUFACTURER: &str = "MANUFACTURER";
pub const MODEL: &str = "MODEL";
