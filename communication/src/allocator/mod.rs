//! Types and traits for the construction of fabric endpoints.

pub use self::generic::{Generic, GenericBuilder};
pub use self::process::{Process, ProcessBuilder};
pub use self::thread::{Thread, ThreadBuilder};

pub mod generic;
pub mod process;
pub mod thread;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::fabric::FabricError;

/// A proto-fabric, which implements `Send` and can be completed with `build`.
///
/// This trait exists because endpoints contain non-Send elements; what we
/// hand to freshly spawned worker threads are builders, each of which then
/// constructs its actual endpoint in place.
pub trait FabricBuilder: Send {
    /// The type of built endpoint.
    type Fabric: crate::Fabric;
    /// Builds the endpoint, consuming self.
    fn build(self) -> Self::Fabric;
}

/// A process-wide abort flag shared by all endpoints of a transport.
///
/// The first worker to trip the latch wins; its reason is reported to every
/// worker whose fabric call observes the latch. This is the in-process
/// equivalent of an abort record traveling with the next exchange.
#[derive(Clone)]
pub struct AbortLatch {
    tripped: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl AbortLatch {
    /// Creates an untripped latch.
    pub fn new() -> Self {
        AbortLatch {
            tripped: Arc::new(AtomicBool::new(false)),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Trips the latch. Only the first reason is retained.
    pub fn trip(&self, reason: String) {
        let mut slot = self.reason.lock().expect("abort reason poisoned");
        if slot.is_none() {
            *slot = Some(reason);
        }
        self.tripped.store(true, Ordering::Release);
    }

    /// Returns an error if the latch has been tripped.
    pub fn check(&self) -> Result<(), FabricError> {
        if self.tripped.load(Ordering::Acquire) {
            let reason = self
                .reason
                .lock()
                .expect("abort reason poisoned")
                .clone()
                .unwrap_or_default();
            Err(FabricError::Aborted(reason))
        } else {
            Ok(())
        }
    }
}

impl Default for AbortLatch {
    fn default() -> Self {
        AbortLatch::new()
    }
}
