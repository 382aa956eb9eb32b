use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use astro_bridge::bridge::{BridgeError, LightBridge, Result, SwitchBackend};
use async_trait::async_trait;

/// Scriptable stand-in for the Home Assistant backend.
#[derive(Default)]
struct MockBackend {
    calls: Mutex<Vec<String>>,
    /// State the service call reports for the entity; `None` means the
    /// entity was absent from the response list.
    turn_reply: Mutex<Option<String>>,
    /// Error message returned by `turn`, if set.
    turn_error: Mutex<Option<String>>,
    /// Replies for successive `state` polls; the last entry repeats.
    state_replies: Mutex<VecDeque<std::result::Result<String, String>>>,
}

impl MockBackend {
    fn replying_to_turn(state: &str) -> Arc<Self> {
        let mock = Self::default();
        *mock.turn_reply.lock().unwrap() = Some(state.to_string());
        Arc::new(mock)
    }

    fn with_states(replies: &[std::result::Result<&str, &str>]) -> Arc<Self> {
        let mock = Self::default();
        *mock.state_replies.lock().unwrap() = replies
            .iter()
            .map(|r| match r {
                Ok(s) => Ok((*s).to_string()),
                Err(e) => Err((*e).to_string()),
            })
            .collect();
        Arc::new(mock)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SwitchBackend for MockBackend {
    async fn turn(&self, on: bool) -> Result<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("turn_{}", if on { "on" } else { "off" }));
        if let Some(message) = self.turn_error.lock().unwrap().clone() {
            return Err(BridgeError::Protocol(message));
        }
        Ok(self.turn_reply.lock().unwrap().clone())
    }

    async fn state(&self) -> Result<String> {
        self.calls.lock().unwrap().push("state".to_string());
        let mut replies = self.state_replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front().unwrap_or(Err("unscripted".to_string()))
        } else {
            replies
                .front()
                .cloned()
                .unwrap_or(Err("unscripted".to_string()))
        };
        reply.map_err(BridgeError::Protocol)
    }
}

fn counting_bridge(
    backend: Arc<MockBackend>,
    interval: Duration,
) -> (LightBridge, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let bridge = LightBridge::new(
        backend,
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
        interval,
    );
    (bridge, count)
}

async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn set_state_refreshes_snapshot_synchronously() {
    let backend = MockBackend::replying_to_turn("on");
    let (bridge, count) = counting_bridge(backend.clone(), Duration::from_secs(60));

    // No poll loop is running; the callback comes from set_state itself.
    bridge.set_state(true).await.unwrap();
    assert_eq!(bridge.state().as_deref(), Some("on"));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(backend.calls(), vec!["turn_on"]);
}

#[tokio::test]
async fn set_state_is_idempotent() {
    let backend = MockBackend::replying_to_turn("on");
    let (bridge, count) = counting_bridge(backend, Duration::from_secs(60));

    bridge.set_state(true).await.unwrap();
    assert_eq!(bridge.state().as_deref(), Some("on"));
    bridge.set_state(true).await.unwrap();
    assert_eq!(bridge.state().as_deref(), Some("on"));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn set_state_without_entity_in_response_fires_no_callback() {
    let backend = Arc::new(MockBackend::default());
    let (bridge, count) = counting_bridge(backend, Duration::from_secs(60));

    bridge.set_state(false).await.unwrap();
    assert_eq!(bridge.state(), None);
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn set_state_propagates_backend_error() {
    let backend = Arc::new(MockBackend::default());
    *backend.turn_error.lock().unwrap() = Some("service unavailable".to_string());
    let (bridge, count) = counting_bridge(backend, Duration::from_secs(60));

    let result = bridge.set_state(true).await;
    assert!(matches!(result, Err(BridgeError::Protocol(_))));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn poll_fires_callback_on_every_tick() {
    let backend = MockBackend::with_states(&[Ok("off")]);
    let (bridge, count) = counting_bridge(backend, Duration::from_millis(100));

    bridge.connect().await;
    wait_until(|| count.load(Ordering::SeqCst) >= 3).await;
    assert_eq!(bridge.state().as_deref(), Some("off"));

    bridge.disconnect().await;
    let settled = count.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(count.load(Ordering::SeqCst), settled);
}

#[tokio::test(start_paused = true)]
async fn poll_failure_maps_to_error_state_and_still_notifies() {
    let backend = MockBackend::with_states(&[Err("timeout")]);
    let (bridge, count) = counting_bridge(backend, Duration::from_millis(100));

    bridge.connect().await;
    wait_until(|| count.load(Ordering::SeqCst) >= 1).await;
    assert_eq!(bridge.state().as_deref(), Some("error"));

    bridge.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn poll_recovers_after_transient_failure() {
    let backend = MockBackend::with_states(&[Err("timeout"), Ok("on")]);
    let (bridge, count) = counting_bridge(backend, Duration::from_millis(100));

    bridge.connect().await;
    wait_until(|| count.load(Ordering::SeqCst) >= 2).await;
    wait_until(|| bridge.state().as_deref() == Some("on")).await;

    bridge.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn disconnect_keeps_cached_state() {
    let backend = MockBackend::with_states(&[Ok("on")]);
    let (bridge, count) = counting_bridge(backend, Duration::from_millis(100));

    bridge.connect().await;
    assert!(bridge.is_connected());
    wait_until(|| count.load(Ordering::SeqCst) >= 1).await;

    bridge.disconnect().await;
    assert!(!bridge.is_connected());
    // Cached value survives, no live fetch is attempted.
    assert_eq!(bridge.state().as_deref(), Some("on"));
}
