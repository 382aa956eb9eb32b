//! Focuser driver adapter: property writes in, bridge commands out, bridge
//! callbacks back into property updates with Idle/Busy/Ok/Alert
//! transitions.

use std::sync::{Arc, Weak};

use crate::bridge::{FocuserBridge, Result, UpdateCallback};
use crate::properties::{
    Dispatcher, NumberVector, PropertyState, SwitchVector, TextVector, WriteEvent,
};

use super::{CONNECT, CONNECTION, DISCONNECT, INFO, MANUFACTURER, MODEL};

pub const DEVICE: &str = "NodeFocuser";
pub const ABS_POSITION: &str = "ABS_FOCUS_POSITION";
pub const ABS_POSITION_ELEMENT: &str = "FOCUS_ABSOLUTE_POSITION";
pub const REL_POSITION: &str = "REL_FOCUS_POSITION";
pub const REL_POSITION_ELEMENT: &str = "FOCUS_RELATIVE_POSITION";
pub const MOTION: &str = "FOCUS_MOTION";
pub const MOTION_INWARD: &str = "FOCUS_INWARD";
pub const MOTION_OUTWARD: &str = "FOCUS_OUTWARD";
pub const SPEED: &str = "SPEED";
pub const SPEED_ELEMENT: &str = "SPEED_VALUE";

const STATUS_IDLE: &str = "idle";

pub struct FocuserDriver {
    bridge: Arc<FocuserBridge>,
    min_position: f64,
    max_position: f64,
    pub connection: Arc<SwitchVector>,
    pub info: Arc<TextVector>,
    pub position: Arc<NumberVector>,
    pub rel_position: Arc<NumberVector>,
    pub motion: Arc<SwitchVector>,
    pub speed: Arc<NumberVector>,
}

impl FocuserDriver {
    pub fn new(port: &str, min_position: f64, max_position: f64) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let on_update: UpdateCallback = Arc::new(move || {
                if let Some(driver) = weak.upgrade() {
                    driver.apply_bridge_update();
                }
            });
            Self {
                bridge: Arc::new(FocuserBridge::new(port, on_update)),
                min_position,
                max_position,
                connection: Arc::new(SwitchVector::new(
                    CONNECTION,
                    &[(CONNECT, false), (DISCONNECT, true)],
                )),
                info: Arc::new(TextVector::new(
                    INFO,
                    &[(MANUFACTURER, "astro-bridge"), (MODEL, "NodeFocuser")],
                )),
                position: Arc::new(NumberVector::new(
                    ABS_POSITION,
                    &[(ABS_POSITION_ELEMENT, 0.0)],
                )),
                rel_position: Arc::new(NumberVector::new(
                    REL_POSITION,
                    &[(REL_POSITION_ELEMENT, 0.0)],
                )),
                motion: Arc::new(SwitchVector::new(
                    MOTION,
                    &[(MOTION_INWARD, true), (MOTION_OUTWARD, false)],
                )),
                speed: Arc::new(NumberVector::new(SPEED, &[(SPEED_ELEMENT, 100.0)])),
            }
        })
    }

    pub fn bridge(&self) -> &Arc<FocuserBridge> {
        &self.bridge
    }

    pub fn register(self: &Arc<Self>, dispatcher: &Dispatcher) {
        let driver = self.clone();
        dispatcher.register(DEVICE, CONNECTION, move |event| {
            let driver = driver.clone();
            Box::pin(async move { driver.handle_connection(event).await })
        });

        let driver = self.clone();
        dispatcher.register(DEVICE, ABS_POSITION, move |event| {
            let driver = driver.clone();
            Box::pin(async move { driver.handle_absolute_move(event).await })
        });

        let driver = self.clone();
        dispatcher.register(DEVICE, REL_POSITION, move |event| {
            let driver = driver.clone();
            Box::pin(async move { driver.handle_relative_move(event).await })
        });

        let driver = self.clone();
        dispatcher.register(DEVICE, SPEED, move |event| {
            let driver = driver.clone();
            Box::pin(async move { driver.handle_speed(event).await })
        });
    }

    pub async fn shutdown(&self) {
        self.bridge.disconnect().await;
    }

    async fn handle_connection(&self, event: WriteEvent) {
        let requested = event.value.as_switch().unwrap_or(false);
        match event.element.as_str() {
            CONNECT if requested => self.connect().await,
            DISCONNECT if requested => self.disconnect().await,
            _ => {}
        }
    }

    async fn connect(&self) {
        self.connection.set_state(PropertyState::Busy);
        match self.try_connect().await {
            Ok(position) => {
                // Seed the position vector from the handshake so clients
                // see the real position before any move.
                self.position
                    .apply(ABS_POSITION_ELEMENT, position, PropertyState::Idle);
                self.connection.select(CONNECT, PropertyState::Ok);
                self.info.set_state(PropertyState::Ok);
                log::info!("Focuser connected at position {}", position);
            }
            Err(e) => {
                log::error!("Focuser connection failed: {}", e);
                self.bridge.disconnect().await;
                self.connection.select(DISCONNECT, PropertyState::Alert);
            }
        }
    }

    async fn try_connect(&self) -> Result<f64> {
        self.bridge.connect().await?;
        self.bridge.wait_for_first_position().await
    }

    async fn disconnect(&self) {
        self.bridge.disconnect().await;
        self.connection.select(DISCONNECT, PropertyState::Ok);
    }

    async fn handle_absolute_move(&self, event: WriteEvent) {
        let Some(target) = event.value.as_number() else {
            return;
        };
        let target = target.clamp(self.min_position, self.max_position);
        self.position.set_state(PropertyState::Busy);
        if let Err(e) = self.bridge.set_position(target).await {
            log::error!("Focuser move to {} failed: {}", target, e);
            self.position.set_state(PropertyState::Alert);
        }
        // Settles to Ok via the bridge callback once the controller
        // reports idle at the new position.
    }

    async fn handle_relative_move(&self, event: WriteEvent) {
        let Some(step) = event.value.as_number() else {
            return;
        };
        let Some(current) = self.position.value(ABS_POSITION_ELEMENT) else {
            self.rel_position.set_state(PropertyState::Alert);
            return;
        };
        let direction = if self.motion.is_on(MOTION_OUTWARD).unwrap_or(false) {
            1.0
        } else {
            -1.0
        };
        let target =
            (current + direction * step).clamp(self.min_position, self.max_position);

        self.rel_position.set_state(PropertyState::Busy);
        self.position.set_state(PropertyState::Busy);
        if let Err(e) = self.bridge.set_position(target).await {
            log::error!("Focuser step to {} failed: {}", target, e);
            self.rel_position.set_state(PropertyState::Alert);
            self.position.set_state(PropertyState::Alert);
            return;
        }

        match self.bridge.wait_for_position(target).await {
            Ok(_) => self.rel_position.set_state(PropertyState::Ok),
            Err(e) => {
                log::warn!("Focuser step did not converge: {}", e);
                self.rel_position.set_state(PropertyState::Alert);
            }
        }
    }

    async fn handle_speed(&self, event: WriteEvent) {
        let Some(speed) = event.value.as_number() else {
            return;
        };
        match self.bridge.set_speed(speed).await {
            Ok(()) => self.speed.apply(SPEED_ELEMENT, speed, PropertyState::Ok),
            Err(e) => {
                log::error!("Focuser speed change failed: {}", e);
                self.speed.set_state(PropertyState::Alert);
            }
        }
    }

    /// Bridge callback: mirror the snapshot into the position vector,
    /// value and status applied together.
    fn apply_bridge_update(&self) {
        let Some(status) = self.bridge.status() else {
            return;
        };
        let state = if status == STATUS_IDLE {
            PropertyState::Ok
        } else {
            PropertyState::Busy
        };
        if let Some(position) = self.bridge.position() {
            self.position.apply(ABS_POSITION_ELEMENT, position, state);
        }
    }
}
