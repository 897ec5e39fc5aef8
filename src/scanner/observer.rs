use std::sync::Arc;

use crate::decoder::DecodeResult;

use super::error::AcquisitionError;
use super::state::ScanSnapshot;

/// Receives scan events. These are also the UI hook points: an overlay
/// listens for state and torch changes, a submitter listens for decodes.
///
/// Callbacks run on the sampling task while the session is locked, so they
/// must return quickly and must not call back into the controller. Hand
/// slow work (network, disk) to another task.
pub trait ScanObserver: Send + Sync + 'static {
    fn on_decoded(&self, session_id: &str, result: &DecodeResult);

    fn on_state_changed(&self, _snapshot: &ScanSnapshot) {}

    fn on_acquisition_failed(&self, _error: &AcquisitionError) {}

    fn on_torch_changed(&self, _session_id: &str, _on: bool) {}
}

/// Adapts a plain `(payload) -> ()` success callback.
pub struct FnObserver<F> {
    callback: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&str) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ScanObserver for FnObserver<F>
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn on_decoded(&self, _session_id: &str, result: &DecodeResult) {
        (self.callback)(&result.payload);
    }
}

/// Fans every event out to several observers, in registration order.
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn ScanObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: Arc<dyn ScanObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl ScanObserver for ObserverSet {
    fn on_decoded(&self, session_id: &str, result: &DecodeResult) {
        for observer in &self.observers {
            observer.on_decoded(session_id, result);
        }
    }

    fn on_state_changed(&self, snapshot: &ScanSnapshot) {
        for observer in &self.observers {
            observer.on_state_changed(snapshot);
        }
    }

    fn on_acquisition_failed(&self, error: &AcquisitionError) {
        for observer in &self.observers {
            observer.on_acquisition_failed(error);
        }
    }

    fn on_torch_changed(&self, session_id: &str, on: bool) {
        for observer in &self.observers {
            observer.on_torch_changed(session_id, on);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    #[test]
    fn fn_observer_receives_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer = FnObserver::new(move |payload: &str| sink.lock().unwrap().push(payload.to_string()));

        observer.on_decoded("s1", &DecodeResult::new("BAG-001", Utc::now()));

        assert_eq!(*seen.lock().unwrap(), vec!["BAG-001".to_string()]);
    }

    #[test]
    fn set_fans_out_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::clone(&seen);
        let b = Arc::clone(&seen);
        let set = ObserverSet::new()
            .with(Arc::new(FnObserver::new(move |p: &str| a.lock().unwrap().push(format!("a:{p}")))))
            .with(Arc::new(FnObserver::new(move |p: &str| b.lock().unwrap().push(format!("b:{p}")))));

        set.on_decoded("s1", &DecodeResult::new("X", Utc::now()));
        assert_eq!(set.len(), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["a:X".to_string(), "b:X".to_string()]);
    }

    #[test]
    fn pushed_observers_join_the_fan_out() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut set = ObserverSet::new();
        assert!(set.is_empty());

        set.on_decoded("s1", &DecodeResult::new("dropped", Utc::now()));
        set.push(Arc::new(FnObserver::new(move |p: &str| sink.lock().unwrap().push(p.to_string()))));
        set.on_decoded("s1", &DecodeResult::new("BAG-001", Utc::now()));

        assert!(!set.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["BAG-001".to_string()]);
    }
}
