//! Wire format spoken by the focuser controller: newline-delimited JSON
//! objects in both directions. Outbound commands carry exactly one key;
//! inbound status reports wrap position and motion state in a `status`
//! object.

use serde::{Deserialize, Serialize};

/// Outbound instruction for the focuser controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocuserCommand {
    /// Move to an absolute position.
    Position(f64),
    /// Redefine the current position without moving.
    Reset(f64),
    /// Set the motion speed.
    Speed(f64),
}

impl FocuserCommand {
    /// Encode as a single newline-terminated JSON line.
    pub fn to_line(&self) -> String {
        let body = match self {
            FocuserCommand::Position(v) => serde_json::json!({ "position": v }),
            FocuserCommand::Reset(v) => serde_json::json!({ "reset": v }),
            FocuserCommand::Speed(v) => serde_json::json!({ "speed": v }),
        };
        format!("{}\n", body)
    }
}

/// Status report sent asynchronously by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub position: f64,
    pub status: String,
}

#[derive(Deserialize)]
struct StatusLine {
    status: StatusPayload,
}

/// Parse one inbound line. Returns `None` for blank lines, lines without a
/// `status` object, or malformed JSON - a bad line is skipped, never fatal
/// to the reader loop.
pub fn parse_status_line(line: &str) -> Option<StatusPayload> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<StatusLine>(line) {
        Ok(parsed) => Some(parsed.status),
        Err(e) => {
            log::debug!("Skipping unparseable serial line {:?}: {}", line, e);
            None
        }
    }
}
