use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug)]
struct AdmissionState {
    /// The most handlers allowed to run at once.
    max_clients: usize,

    /// Handlers admitted and not yet terminated.
    running: usize,

    /// The highest value `running` has reached.
    peak: usize,

    /// Set once the listener is asked to stop.
    stop_requested: bool,
}

/// Caps the number of live connection handlers.
///
/// The counter, the stop flag and the listener's wait all sit behind one mutex, and the
/// wait predicate is re-checked under it after every wake. A handler that terminates
/// between the listener's check and its wait therefore can't be missed.
#[derive(Debug)]
pub struct Admission {
    state: Mutex<AdmissionState>,
    changed: Condvar,
}

impl Admission {
    pub fn new(max_clients: usize) -> Self {
        Self {
            state: Mutex::new(AdmissionState {
                max_clients,
                running: 0,
                peak: 0,
                stop_requested: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        // The state is plain counters, so a panic elsewhere can't leave it torn.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Blocks until a handler slot is free or a stop is requested. Returns false when
    /// the listener should stop.
    pub fn wait_for_slot(&self) -> bool {
        let state = self.lock();
        let state = self
            .changed
            .wait_while(state, |s| s.running >= s.max_clients && !s.stop_requested)
            .unwrap_or_else(|e| e.into_inner());

        !state.stop_requested
    }

    /// Counts a newly accepted connection. Returns the new number of running handlers, or
    /// `None` if a stop was requested, in which case nothing is counted.
    pub fn admit(&self) -> Option<usize> {
        let mut state = self.lock();
        if state.stop_requested {
            return None;
        }

        debug_assert!(state.running < state.max_clients);
        state.running += 1;
        state.peak = state.peak.max(state.running);
        Some(state.running)
    }

    /// Uncounts a terminated handler and wakes the listener. Returns the number still
    /// running.
    pub fn release(&self) -> usize {
        let mut state = self.lock();
        debug_assert!(state.running > 0, "released more handlers than admitted");
        state.running = state.running.saturating_sub(1);
        self.changed.notify_all();
        state.running
    }

    pub fn request_stop(&self) {
        let mut state = self.lock();
        state.stop_requested = true;
        self.changed.notify_all();
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    pub fn running(&self) -> usize {
        self.lock().running
    }

    pub fn peak(&self) -> usize {
        self.lock().peak
    }

    pub fn max_clients(&self) -> usize {
        self.lock().max_clients
    }
}
