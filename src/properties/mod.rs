//! Minimal property layer the driver adapters publish through.
//!
//! Each vector groups named elements with one shared status. Value and
//! status always change under a single lock acquisition, so an observer
//! never sees a new value paired with a stale status. Write events are
//! dispatched through an explicit name-to-handler map; handlers run as
//! spawned tasks so a slow hardware operation cannot stall the dispatch
//! path.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Status carried by every property vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyState {
    Idle,
    Ok,
    Busy,
    Alert,
}

struct Element<T> {
    name: String,
    value: T,
}

struct VectorInner<T> {
    elements: Vec<Element<T>>,
    state: PropertyState,
}

impl<T> VectorInner<T> {
    fn find(&self, name: &str) -> Option<&Element<T>> {
        self.elements.iter().find(|e| e.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Element<T>> {
        self.elements.iter_mut().find(|e| e.name == name)
    }
}

fn build_elements<T: Clone>(elements: &[(&str, T)]) -> Vec<Element<T>> {
    elements
        .iter()
        .map(|(name, value)| Element {
            name: (*name).to_string(),
            value: value.clone(),
        })
        .collect()
}

macro_rules! vector_common {
    () => {
        pub fn name(&self) -> &str {
            &self.name
        }

        pub fn state(&self) -> PropertyState {
            self.lock().state
        }

        pub fn set_state(&self, state: PropertyState) {
            self.lock().state = state;
        }
    };
}

/// Vector of named numeric values.
pub struct NumberVector {
    name: String,
    inner: Mutex<VectorInner<f64>>,
}

impl NumberVector {
    pub fn new(name: &str, elements: &[(&str, f64)]) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(VectorInner {
                elements: build_elements(elements),
                state: PropertyState::Idle,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VectorInner<f64>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    vector_common!();

    pub fn value(&self, element: &str) -> Option<f64> {
        self.lock().find(element).map(|e| e.value)
    }

    /// Set value and status together.
    pub fn apply(&self, element: &str, value: f64, state: PropertyState) {
        let mut inner = self.lock();
        if let Some(e) = inner.find_mut(element) {
            e.value = value;
        }
        inner.state = state;
    }
}

/// Vector of named on/off elements.
pub struct SwitchVector {
    name: String,
    inner: Mutex<VectorInner<bool>>,
}

impl SwitchVector {
    pub fn new(name: &str, elements: &[(&str, bool)]) -> Self {
        Self {
            name: name.to_string(),
            inner: Mutex::new(VectorInner {
                elements: build_elements(elements),
                state: PropertyState::Idle,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VectorInner<bool>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    vector_common!();

    pub fn is_on(&self, element: &str) -> Option<bool> {
        self.lock().find(element).map(|e| e.value)
    }

    /// One-of-many selection: turn `element` on, everything else off, and
    /// set the status, all atomically.
    pub fn select(&self, element: &str, state: PropertyState) {
        let mut inner = self.lock();
        for e in inner.elements.iter_mut() {
            e.value = e.name == element;
        }
        inner.state = state;
    }
}

/// Vector of named text values.
pub struct TextVector {
    name: String,
    inner: Mutex<VectorInner<String>>,
}

impl TextVector {
    pub fn new(name: &str, elements: &[(&str, &str)]) -> Self {
        let elements: Vec<(&str, String)> = elements
            .iter()
            .map(|(name, value)| (*name, (*value).to_string()))
            .collect();
        Self {
            name: name.to_string(),
            inner: Mutex::new(VectorInner {
                elements: build_elements(&elements),
                state: PropertyState::Idle,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VectorInner<String>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    vector_common!();

    pub fn text(&self, element: &str) -> Option<String> {
        self.lock().find(element).map(|e| e.value.clone())
    }

    pub fn apply(&self, element: &str, value: &str, state: PropertyState) {
        let mut inner = self.lock();
        if let Some(e) = inner.find_mut(element) {
            e.value = value.to_string();
        }
        inner.state = state;
    }
}

/// Value carried by a property write.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Number(f64),
    Switch(bool),
    Text(String),
}

impl PropertyValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<bool> {
        match self {
            PropertyValue::Switch(v) => Some(*v),
            _ => None,
        }
    }
}

/// A remote write against one element of a device's vector.
#[derive(Debug, Clone)]
pub struct WriteEvent {
    pub device: String,
    pub vector: String,
    pub element: String,
    pub value: PropertyValue,
}

type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type WriteHandler = Arc<dyn Fn(WriteEvent) -> HandlerFuture + Send + Sync>;

/// Maps (device, vector) pairs to write handlers, registered once at
/// startup. Dispatch spawns the handler, so the caller returns
/// immediately no matter how long the hardware takes.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Mutex<HashMap<(String, String), WriteHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, device: &str, vector: &str, handler: F)
    where
        F: Fn(WriteEvent) -> HandlerFuture + Send + Sync + 'static,
    {
        let mut handlers = match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.insert(
            (device.to_string(), vector.to_string()),
            Arc::new(handler),
        );
    }

    /// Dispatch a write to its registered handler. Returns whether a
    /// handler was found.
    pub fn dispatch(&self, event: WriteEvent) -> bool {
        let handler = {
            let handlers = match self.handlers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            handlers
                .get(&(event.device.clone(), event.vector.clone()))
                .cloned()
        };
        match handler {
            Some(handler) => {
                tokio::spawn(handler(event));
                true
            }
            None => {
                log::warn!(
                    "No handler registered for {}/{}",
                    event.device,
                    event.vector
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn apply_updates_value_and_state_together() {
        let vector = NumberVector::new("ABS_FOCUS_POSITION", &[("FOCUS_ABSOLUTE_POSITION", 0.0)]);
        vector.apply("FOCUS_ABSOLUTE_POSITION", 1234.0, PropertyState::Busy);
        assert_eq!(vector.value("FOCUS_ABSOLUTE_POSITION"), Some(1234.0));
        assert_eq!(vector.state(), PropertyState::Busy);
    }

    #[test]
    fn select_is_one_of_many() {
        let vector = SwitchVector::new(
            "FLAT_LIGHT_CONTROL",
            &[("FLAT_LIGHT_ON", false), ("FLAT_LIGHT_OFF", true)],
        );
        vector.select("FLAT_LIGHT_ON", PropertyState::Ok);
        assert_eq!(vector.is_on("FLAT_LIGHT_ON"), Some(true));
        assert_eq!(vector.is_on("FLAT_LIGHT_OFF"), Some(false));
        assert_eq!(vector.state(), PropertyState::Ok);
    }

    #[test]
    fn unknown_element_leaves_values_untouched() {
        let vector = NumberVector::new("SPEED", &[("SPEED_VALUE", 100.0)]);
        vector.apply("NO_SUCH_ELEMENT", 5.0, PropertyState::Ok);
        assert_eq!(vector.value("SPEED_VALUE"), Some(100.0));
        assert_eq!(vector.state(), PropertyState::Ok);
    }

    #[tokio::test]
    async fn dispatch_runs_registered_handler() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        dispatcher.register("FOCUSER", "CONNECTION", move |event| {
            let counter = counter.clone();
            Box::pin(async move {
                assert_eq!(event.element, "CONNECT");
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });

        let dispatched = dispatcher.dispatch(WriteEvent {
            device: "FOCUSER".to_string(),
            vector: "CONNECTION".to_string(),
            element: "CONNECT".to_string(),
            value: PropertyValue::Switch(true),
        });
        assert!(dispatched);

        for _ in 0..10 {
            if hits.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_without_handler_reports_false() {
        let dispatcher = Dispatcher::new();
        let dispatched = dispatcher.dispatch(WriteEvent {
            device: "FOCUSER".to_string(),
            vector: "UNKNOWN".to_string(),
            element: "X".to_string(),
            value: PropertyValue::Text("y".to_string()),
        });
        assert!(!dispatched);
    }
}
