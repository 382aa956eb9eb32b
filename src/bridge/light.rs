//! Bridge to the flat-panel light.
//!
//! The panel has no push channel, so the bridge polls its backend on a
//! fixed interval. Every tick is an observation, not a delta: the callback
//! fires on each one, including failed polls, which surface as the
//! `"error"` state so the driver side can raise an alert instead of
//! showing stale data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::{Result, UpdateCallback};

/// Default interval between state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// State reported when a poll fails.
pub const STATE_ERROR: &str = "error";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Seam between the light bridge and whatever drives the physical switch.
/// Production uses the Home Assistant REST implementation; tests plug in
/// doubles.
#[async_trait]
pub trait SwitchBackend: Send + Sync {
    /// Switch the light on or off. Returns the state the backend reported
    /// for the entity as part of the call, if it reported one.
    async fn turn(&self, on: bool) -> Result<Option<String>>;

    /// Fetch the entity's current state string ("on"/"off"/other).
    async fn state(&self) -> Result<String>;
}

struct PollTask {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct LightBridge {
    backend: Arc<dyn SwitchBackend>,
    on_update: UpdateCallback,
    connected: Arc<AtomicBool>,
    snapshot: Arc<watch::Sender<Option<String>>>,
    poll_interval: Duration,
    task: Mutex<Option<PollTask>>,
}

impl LightBridge {
    pub fn new(
        backend: Arc<dyn SwitchBackend>,
        on_update: UpdateCallback,
        poll_interval: Duration,
    ) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            backend,
            on_update,
            connected: Arc::new(AtomicBool::new(false)),
            snapshot: Arc::new(snapshot),
            poll_interval,
            task: Mutex::new(None),
        }
    }

    /// Mark the bridge connected and start the poll loop.
    pub async fn connect(&self) {
        let mut task = self.task.lock().await;
        if let Some(current) = task.as_ref() {
            if !current.handle.is_finished() {
                log::warn!("Light bridge already connected");
                return;
            }
        }

        self.snapshot.send_replace(None);
        self.connected.store(true, Ordering::SeqCst);

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let handle = tokio::spawn(poll_loop(
            self.backend.clone(),
            self.snapshot.clone(),
            self.on_update.clone(),
            self.connected.clone(),
            self.poll_interval,
            stop_rx,
        ));
        *task = Some(PollTask { stop_tx, handle });

        log::info!("Light bridge polling started ({:?} interval)", self.poll_interval);
    }

    /// Stop the poll loop. The snapshot keeps its last cached value.
    pub async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.stop_tx.send(()).await;
            if tokio::time::timeout(SHUTDOWN_GRACE, task.handle)
                .await
                .is_err()
            {
                log::warn!("Light poll task did not stop within {:?}", SHUTDOWN_GRACE);
            }
        }
        log::info!("Light bridge disconnected");
    }

    /// Switch the panel on or off. On top of the network side effect, a
    /// reported entity state refreshes the snapshot and fires the callback
    /// synchronously, independent of the periodic poll.
    pub async fn set_state(&self, on: bool) -> Result<()> {
        let reported = self.backend.turn(on).await?;
        if let Some(state) = reported {
            log::debug!("Service call reported light state {:?}", state);
            self.snapshot.send_replace(Some(state));
            (self.on_update)();
        }
        Ok(())
    }

    /// Cached state from the last poll or service call. Never performs I/O.
    pub fn state(&self) -> Option<String> {
        self.snapshot.borrow().clone()
    }

    /// Live state query against the backend. The poll loop's job; exposed
    /// for one-off checks.
    pub async fn fetch_state(&self) -> Result<String> {
        self.backend.state().await
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

async fn poll_loop(
    backend: Arc<dyn SwitchBackend>,
    snapshot: Arc<watch::Sender<Option<String>>>,
    on_update: UpdateCallback,
    connected: Arc<AtomicBool>,
    interval: Duration,
    mut stop_rx: mpsc::Receiver<()>,
) {
    loop {
        if !connected.load(Ordering::SeqCst) {
            break;
        }

        let state = match backend.state().await {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Light state poll failed: {}", e);
                STATE_ERROR.to_string()
            }
        };
        snapshot.send_replace(Some(state));
        on_update();

        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
