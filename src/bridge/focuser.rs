//! Bridge to the serial focuser controller.
//!
//! One background task owns the serial stream: it is the single writer for
//! outbound commands (issuance order preserved) and the single consumer of
//! inbound status lines. The last applied status is cached in a snapshot
//! published through a watch channel, so property-side readers never touch
//! the port and never observe a torn update.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::serial::{self, parse_status_line, FocuserCommand, StatusPayload};

use super::{BridgeError, ConnectionState, Result, UpdateCallback};

/// Accepted distance between reported and target position.
pub const POSITION_TOLERANCE: f64 = 0.01;
/// Bound on convergence polling before giving up.
pub const CONVERGENCE_ATTEMPTS: u32 = 30;
/// Interval between convergence polls.
pub const CONVERGENCE_POLL_INTERVAL: Duration = Duration::from_secs(1);

const COMMAND_CAPACITY: usize = 16;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Last-known focuser state. A cache of the most recent status report,
/// possibly stale between reads - never a guarantee of current physical
/// state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FocuserSnapshot {
    pub position: Option<f64>,
    pub status: Option<String>,
}

enum FocuserRequest {
    Send(FocuserCommand),
    Shutdown,
}

struct Active {
    cmd_tx: mpsc::Sender<FocuserRequest>,
    task: JoinHandle<()>,
}

pub struct FocuserBridge {
    port: String,
    on_update: UpdateCallback,
    snapshot: Arc<watch::Sender<FocuserSnapshot>>,
    state: Arc<watch::Sender<ConnectionState>>,
    active: Mutex<Option<Active>>,
}

impl FocuserBridge {
    pub fn new(port: &str, on_update: UpdateCallback) -> Self {
        let (snapshot, _) = watch::channel(FocuserSnapshot::default());
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            port: port.to_string(),
            on_update,
            snapshot: Arc::new(snapshot),
            state: Arc::new(state),
            active: Mutex::new(None),
        }
    }

    /// Open the configured serial port and start the reader/writer task.
    /// Returns once the task is running; hardware-side progress is observed
    /// through the connection state and snapshot.
    pub async fn connect(&self) -> Result<()> {
        let stream = match serial::open_focuser_port(&self.port) {
            Ok(stream) => stream,
            Err(e) => {
                self.state
                    .send_replace(ConnectionState::Error(e.to_string()));
                return Err(e.into());
            }
        };
        self.connect_stream(stream).await
    }

    /// Start the bridge over an already-open byte stream. Used by
    /// `connect()` with the real port and by tests with in-memory duplex
    /// streams.
    pub async fn connect_stream<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if !current.task.is_finished() {
                log::warn!("Focuser bridge already connected on {}", self.port);
                return Ok(());
            }
        }

        // Snapshot is rebuilt from scratch for the new connection; the
        // previous one stays readable until this point.
        self.snapshot.send_replace(FocuserSnapshot::default());
        self.state.send_replace(ConnectionState::Connecting);

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let task = tokio::spawn(run_loop(
            stream,
            cmd_rx,
            self.snapshot.clone(),
            self.state.clone(),
            self.on_update.clone(),
        ));
        *active = Some(Active { cmd_tx, task });

        log::info!("Focuser bridge started on {}", self.port);
        Ok(())
    }

    /// Stop the reader/writer task and mark the bridge disconnected. The
    /// snapshot keeps its last cached values so reads after disconnect
    /// answer without I/O.
    pub async fn disconnect(&self) {
        let active = self.active.lock().await.take();
        if let Some(active) = active {
            let _ = active.cmd_tx.send(FocuserRequest::Shutdown).await;
            if tokio::time::timeout(SHUTDOWN_GRACE, active.task)
                .await
                .is_err()
            {
                log::warn!("Focuser task did not stop within {:?}", SHUTDOWN_GRACE);
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
        log::info!("Focuser bridge on {} disconnected", self.port);
    }

    /// Request an absolute move. Fire-and-forget; progress arrives through
    /// status reports.
    pub async fn set_position(&self, target: f64) -> Result<()> {
        self.send(FocuserCommand::Position(target)).await
    }

    /// Redefine the controller's current position without moving.
    pub async fn reset_position(&self, position: f64) -> Result<()> {
        self.send(FocuserCommand::Reset(position)).await
    }

    pub async fn set_speed(&self, speed: f64) -> Result<()> {
        self.send(FocuserCommand::Speed(speed)).await
    }

    /// Cached position from the last status report. Never touches the port.
    pub fn position(&self) -> Option<f64> {
        self.snapshot.borrow().position
    }

    /// Cached motion status string ("idle", "moving", ...) from the last
    /// status report.
    pub fn status(&self) -> Option<String> {
        self.snapshot.borrow().status.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FocuserSnapshot> {
        self.snapshot.subscribe()
    }

    /// Poll the snapshot until the reported position is within
    /// [`POSITION_TOLERANCE`] of `target`, waiting
    /// [`CONVERGENCE_POLL_INTERVAL`] between polls for at most
    /// [`CONVERGENCE_ATTEMPTS`] attempts. Long-running: callers must keep
    /// this off any context that has to stay responsive.
    pub async fn wait_for_position(&self, target: f64) -> Result<f64> {
        for _ in 0..CONVERGENCE_ATTEMPTS {
            tokio::time::sleep(CONVERGENCE_POLL_INTERVAL).await;
            if let ConnectionState::Error(msg) = self.connection_state() {
                return Err(BridgeError::ConnectionLost(msg));
            }
            if let Some(pos) = self.position() {
                if (pos - target).abs() <= POSITION_TOLERANCE {
                    return Ok(pos);
                }
            }
        }
        Err(BridgeError::ConvergenceTimeout {
            target,
            attempts: CONVERGENCE_ATTEMPTS,
        })
    }

    /// Wait for the first status report of a fresh connection. Used as the
    /// connect handshake: no report within the bound means the controller
    /// is not talking.
    pub async fn wait_for_first_position(&self) -> Result<f64> {
        for _ in 0..CONVERGENCE_ATTEMPTS {
            tokio::time::sleep(CONVERGENCE_POLL_INTERVAL).await;
            if let ConnectionState::Error(msg) = self.connection_state() {
                return Err(BridgeError::ConnectionLost(msg));
            }
            if let Some(pos) = self.position() {
                return Ok(pos);
            }
        }
        Err(BridgeError::HandshakeTimeout {
            attempts: CONVERGENCE_ATTEMPTS,
        })
    }

    async fn send(&self, cmd: FocuserCommand) -> Result<()> {
        let guard = self.active.lock().await;
        let active = guard.as_ref().ok_or(BridgeError::NotConnected)?;
        active
            .cmd_tx
            .send(FocuserRequest::Send(cmd))
            .await
            .map_err(|_| BridgeError::NotConnected)
    }
}

/// Single task owning both directions of the serial stream. `select!`
/// between the command channel and inbound lines keeps command writes and
/// status reads interleaving without a second writer, and lets shutdown
/// take effect even while the line is quiet.
async fn run_loop<S>(
    stream: S,
    mut cmd_rx: mpsc::Receiver<FocuserRequest>,
    snapshot: Arc<watch::Sender<FocuserSnapshot>>,
    state: Arc<watch::Sender<ConnectionState>>,
    on_update: UpdateCallback,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();
    let mut last_applied: Option<StatusPayload> = None;

    loop {
        tokio::select! {
            request = cmd_rx.recv() => match request {
                Some(FocuserRequest::Send(cmd)) => {
                    let line = cmd.to_line();
                    log::debug!("Focuser command: {}", line.trim());
                    let write = async {
                        writer.write_all(line.as_bytes()).await?;
                        writer.flush().await
                    };
                    if let Err(e) = write.await {
                        log::error!("Focuser command write failed: {}", e);
                        state.send_replace(ConnectionState::Error(e.to_string()));
                        break;
                    }
                }
                Some(FocuserRequest::Shutdown) | None => {
                    state.send_replace(ConnectionState::Disconnected);
                    break;
                }
            },
            read = lines.next_line() => match read {
                Ok(Some(line)) => {
                    if matches!(&*state.borrow(), ConnectionState::Connecting) {
                        state.send_replace(ConnectionState::Connected);
                    }
                    let Some(payload) = parse_status_line(&line) else {
                        continue;
                    };
                    // Controllers repeat their status; only a changed
                    // payload updates the snapshot and notifies.
                    if last_applied.as_ref() == Some(&payload) {
                        continue;
                    }
                    snapshot.send_replace(FocuserSnapshot {
                        position: Some(payload.position),
                        status: Some(payload.status.clone()),
                    });
                    last_applied = Some(payload);
                    on_update();
                }
                Ok(None) => {
                    // End of stream is terminal for this connection.
                    log::info!("Focuser serial stream closed");
                    state.send_replace(ConnectionState::Disconnected);
                    break;
                }
                Err(e) => {
                    log::error!("Focuser serial read failed: {}", e);
                    state.send_replace(ConnectionState::Error(e.to_string()));
                    break;
                }
            },
        }
    }
}
