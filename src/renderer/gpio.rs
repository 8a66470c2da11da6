//! Desktop stand-in for the device's pin/callback API.
//!
//! Renderers written for the board register edge callbacks for their buttons at
//! construction time. On the desktop nothing ever toggles a pin, so the stub only keeps
//! enough bookkeeping for those registrations to succeed, plus [`GpioStub::simulate_edge`]
//! to fire one by hand.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pin numbering scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinNumbering {
    #[default]
    Bcm,
    Board,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// Callback invoked with the channel number that saw an edge.
pub type EdgeCallback = Box<dyn FnMut(u8) + Send>;

struct Registration {
    edge: Edge,
    callback: Option<EdgeCallback>,
}

#[derive(Default)]
struct GpioState {
    numbering: PinNumbering,
    directions: BTreeMap<u8, Direction>,
    levels: BTreeMap<u8, bool>,
    registrations: BTreeMap<u8, Registration>,
}

/// Shared handle to the simulated pin controller.
#[derive(Clone, Default)]
pub struct GpioStub {
    inner: Arc<Mutex<GpioState>>,
}

impl std::fmt::Debug for GpioStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("GpioStub")
            .field("numbering", &state.numbering)
            .field("pins", &state.directions.len())
            .field("callbacks", &state.registrations.len())
            .finish()
    }
}

impl GpioStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_numbering(&self, numbering: PinNumbering) {
        self.inner.lock().numbering = numbering;
    }

    pub fn numbering(&self) -> PinNumbering {
        self.inner.lock().numbering
    }

    pub fn setup(&self, channel: u8, direction: Direction, initial: Option<bool>) {
        let mut state = self.inner.lock();
        state.directions.insert(channel, direction);
        if let Some(level) = initial {
            state.levels.insert(channel, level);
        }
    }

    /// Level of a pin; low unless something drove it high.
    pub fn input(&self, channel: u8) -> bool {
        self.inner
            .lock()
            .levels
            .get(&channel)
            .copied()
            .unwrap_or(false)
    }

    pub fn output(&self, channel: u8, level: bool) {
        self.inner.lock().levels.insert(channel, level);
    }

    /// Register an edge callback, replacing any previous one on the channel.
    pub fn add_event_detect(&self, channel: u8, edge: Edge, callback: EdgeCallback) {
        self.inner.lock().registrations.insert(
            channel,
            Registration {
                edge,
                callback: Some(callback),
            },
        );
    }

    pub fn remove_event_detect(&self, channel: u8) {
        self.inner.lock().registrations.remove(&channel);
    }

    pub fn edge_for(&self, channel: u8) -> Option<Edge> {
        self.inner
            .lock()
            .registrations
            .get(&channel)
            .map(|registration| registration.edge)
    }

    /// Fire the callback registered on `channel`. Returns false when none is registered.
    ///
    /// The lock is released while the callback runs so it may call back into the stub.
    pub fn simulate_edge(&self, channel: u8) -> bool {
        let callback = {
            let mut state = self.inner.lock();
            match state.registrations.get_mut(&channel) {
                Some(registration) => registration.callback.take(),
                None => None,
            }
        };
        let Some(mut callback) = callback else {
            return false;
        };

        callback(channel);

        let mut state = self.inner.lock();
        if let Some(registration) = state.registrations.get_mut(&channel) {
            if registration.callback.is_none() {
                registration.callback = Some(callback);
            }
        }
        true
    }

    pub fn registered_channels(&self) -> Vec<u8> {
        self.inner.lock().registrations.keys().copied().collect()
    }

    /// Forget every pin and callback.
    pub fn cleanup(&self) {
        let mut state = self.inner.lock();
        state.directions.clear();
        state.levels.clear();
        state.registrations.clear();
    }

    pub fn cleanup_channel(&self, channel: u8) {
        let mut state = self.inner.lock();
        state.directions.remove(&channel);
        state.levels.remove(&channel);
        state.registrations.remove(&channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callbacks_fire_on_simulated_edges() {
        let gpio = GpioStub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        gpio.add_event_detect(
            6,
            Edge::Falling,
            Box::new(move |channel| {
                assert_eq!(channel, 6);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(gpio.simulate_edge(6));
        assert!(gpio.simulate_edge(6));
        assert!(!gpio.simulate_edge(19));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(gpio.registered_channels(), vec![6]);
        assert_eq!(gpio.edge_for(6), Some(Edge::Falling));
    }

    #[test]
    fn callback_may_reenter_the_stub() {
        let gpio = GpioStub::new();
        let inner = gpio.clone();
        gpio.add_event_detect(
            13,
            Edge::Both,
            Box::new(move |_| inner.output(13, true)),
        );
        assert!(gpio.simulate_edge(13));
        assert!(gpio.input(13));
    }

    #[test]
    fn cleanup_drops_registrations_and_levels() {
        let gpio = GpioStub::new();
        gpio.setup(5, Direction::Output, Some(true));
        gpio.add_event_detect(5, Edge::Rising, Box::new(|_| {}));
        assert!(gpio.input(5));

        gpio.cleanup();
        assert!(!gpio.input(5));
        assert!(gpio.registered_channels().is_empty());
    }
}
