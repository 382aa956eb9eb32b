use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::Result;

/// Line rate of the focuser controller board.
pub const BAUD_RATE: u32 = 9600;

/// Open the focuser's serial port for async line-oriented I/O.
pub fn open_focuser_port(path: &str) -> Result<SerialStream> {
    let stream = tokio_serial::new(path, BAUD_RATE).open_native_async()?;
    Ok(stream)
}
