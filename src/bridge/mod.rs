pub mod focuser;
pub mod home_assistant;
pub mod light;

pub use focuser::{FocuserBridge, FocuserSnapshot};
pub use home_assistant::HomeAssistant;
pub use light::{LightBridge, SwitchBackend};

use std::sync::Arc;

/// Invoked by a bridge whenever freshly observed hardware state has been
/// applied to its snapshot. The receiver reads the new state back through
/// the bridge's cached getters.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Connection lifecycle of a hardware bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Bridge not connected")]
    NotConnected,

    #[error("Position did not converge to {target} after {attempts} attempts")]
    ConvergenceTimeout { target: f64, attempts: u32 },

    #[error("No position report received after {attempts} attempts")]
    HandshakeTimeout { attempts: u32 },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Serial error: {0}")]
    Serial(#[from] crate::serial::SerialError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
