use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use vstatus_protocol::StatusEvent;

use crate::links::StatusNotifier;

/// Notifier that records every pushed event.
#[derive(Debug)]
pub struct RecordingNotifier {
    events: Mutex<Vec<StatusEvent>>,
    connected: AtomicBool,
    closes: AtomicUsize,
}

impl RecordingNotifier {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl StatusNotifier for RecordingNotifier {
    fn notify(&self, event: StatusEvent) {
        if self.is_connected() {
            self.events.lock().unwrap().push(event);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
