//! Flattener (flat panel) driver adapter.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::bridge::{LightBridge, SwitchBackend, UpdateCallback};
use crate::properties::{Dispatcher, PropertyState, SwitchVector, TextVector, WriteEvent};

use super::{CONNECT, CONNECTION, DISCONNECT, INFO, MANUFACTURER, MODEL};

pub const DEVICE: &str = "Flattener";
pub const LIGHT_CONTROL: &str = "FLAT_LIGHT_CONTROL";
pub const LIGHT_ON: &str = "FLAT_LIGHT_ON";
pub const LIGHT_OFF: &str = "FLAT_LIGHT_OFF";

const STATE_ON: &str = "on";
const STATE_OFF: &str = "off";

pub struct FlattenerDriver {
    bridge: Arc<LightBridge>,
    pub connection: Arc<SwitchVector>,
    pub info: Arc<TextVector>,
    pub light: Arc<SwitchVector>,
}

impl FlattenerDriver {
    pub fn new(backend: Arc<dyn SwitchBackend>, poll_interval: Duration) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let on_update: UpdateCallback = Arc::new(move || {
                if let Some(driver) = weak.upgrade() {
                    driver.apply_bridge_update();
                }
            });
            Self {
                bridge: Arc::new(LightBridge::new(backend, on_update, poll_interval)),
                connection: Arc::new(SwitchVector::new(
                    CONNECTION,
                    &[(CONNECT, false), (DISCONNECT, true)],
                )),
                info: Arc::new(TextVector::new(
                    INFO,
                    &[(MANUFACTURER, "astro-bridge"), (MODEL, "Flattener")],
                )),
                light: Arc::new(SwitchVector::new(
                    LIGHT_CONTROL,
                    &[(LIGHT_ON, false), (LIGHT_OFF, true)],
                )),
            }
        })
    }

    pub fn bridge(&self) -> &Arc<LightBridge> {
        &self.bridge
    }

    pub fn register(self: &Arc<Self>, dispatcher: &Dispatcher) {
        let driver = self.clone();
        dispatcher.register(DEVICE, CONNECTION, move |event| {
            let driver = driver.clone();
            Box::pin(async move { driver.handle_connection(event).await })
        });

        let driver = self.clone();
        dispatcher.register(DEVICE, LIGHT_CONTROL, move |event| {
            let driver = driver.clone();
            Box::pin(async move { driver.handle_light(event).await })
        });
    }

    pub async fn shutdown(&self) {
        self.bridge.disconnect().await;
    }

    async fn handle_connection(&self, event: WriteEvent) {
        let requested = event.value.as_switch().unwrap_or(false);
        match event.element.as_str() {
            CONNECT if requested => {
                self.connection.set_state(PropertyState::Busy);
                // Light status stays Busy until the first poll reports in.
                self.light.set_state(PropertyState::Busy);
                self.bridge.connect().await;
                self.connection.select(CONNECT, PropertyState::Ok);
                self.info.set_state(PropertyState::Ok);
                log::info!("Flattener connected");
            }
            DISCONNECT if requested => {
                self.bridge.disconnect().await;
                self.connection.select(DISCONNECT, PropertyState::Ok);
                log::info!("Flattener disconnected");
            }
            _ => {}
        }
    }

    async fn handle_light(&self, event: WriteEvent) {
        let Some(value) = event.value.as_switch() else {
            return;
        };
        // Writes arrive against either element of the one-of-many pair;
        // turning "off" on means the same as turning "on" off.
        let on = match event.element.as_str() {
            LIGHT_ON => value,
            LIGHT_OFF => !value,
            _ => return,
        };

        self.light.set_state(PropertyState::Busy);
        if let Err(e) = self.bridge.set_state(on).await {
            log::error!("Failed to switch flat panel: {}", e);
            self.light.set_state(PropertyState::Alert);
        }
        // On success the synchronous bridge callback has already applied
        // the reported state.
    }

    /// Bridge callback: anything other than a clean on/off report raises
    /// an alert rather than leaving stale values displayed.
    fn apply_bridge_update(&self) {
        match self.bridge.state().as_deref() {
            Some(STATE_ON) => self.light.select(LIGHT_ON, PropertyState::Ok),
            Some(STATE_OFF) => self.light.select(LIGHT_OFF, PropertyState::Ok),
            Some(other) => {
                log::warn!("Flat panel reported state {:?}", other);
                self.light.set_state(PropertyState::Alert);
            }
            None => {}
        }
    }
}
