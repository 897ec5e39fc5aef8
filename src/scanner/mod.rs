pub mod config;
pub mod controller;
pub mod dedupe;
pub mod error;
mod loop_worker;
pub mod negotiate;
pub mod observer;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{RestartPolicy, ScannerConfig};
pub use controller::{ScanController, SessionHandle};
pub use dedupe::DuplicateFilter;
pub use error::{AcquisitionError, CandidateAttempt, Capability, CapabilityError};
pub use observer::{FnObserver, ObserverSet, ScanObserver};
pub use state::{ScanSession, ScanSnapshot, ScanState};
