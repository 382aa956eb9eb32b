pub mod port;
pub mod wire;

pub use port::{open_focuser_port, BAUD_RATE};
pub use wire::{parse_status_line, FocuserCommand, StatusPayload};

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Failed to open serial port: {0}")]
    Open(#[from] tokio_serial::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
