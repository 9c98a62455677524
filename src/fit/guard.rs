//! Single-flight guard for training runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AppError, ErrorKind};

/// Admits at most one training run at a time.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

/// Held while a run is in flight; dropping it frees the slot.
#[derive(Debug)]
pub struct FlightTicket {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or fail with `Busy` if a run is already in flight.
    pub fn begin(&self) -> Result<FlightTicket, AppError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AppError::new(ErrorKind::Busy, "A training run is already in progress."))?;
        Ok(FlightTicket {
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for FlightTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_run_is_rejected_until_first_finishes() {
        let guard = SingleFlight::new();
        let ticket = guard.begin().unwrap();
        assert!(guard.is_busy());
        let err = guard.clone().begin().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        drop(ticket);
        assert!(!guard.is_busy());
        assert!(guard.begin().is_ok());
    }
}
