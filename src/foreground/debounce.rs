//! Debouncer: collapses rapid foreground toggles into one stable
//! transition so the expensive re-plan runs at most once per window dwell.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::types::ProcessId;

struct State {
    last_stable_pid: Option<ProcessId>,
    last_fire: Option<Instant>,
    /// Bumped on every incoming event; a pending timer compares its captured
    /// generation against the current one on wake to detect "cancel and
    /// reschedule" without an actual cancellable timer.
    generation: u64,
}

/// `debounce_ms`, a user-supplied sink. The sink is a plain closure invoked
/// outside the lock.
pub struct Debouncer {
    debounce_ms: u64,
    state: Arc<Mutex<State>>,
    sink: Arc<dyn Fn(ProcessId) + Send + Sync>,
}

impl Debouncer {
    pub fn new(debounce_ms: u64, sink: impl Fn(ProcessId) + Send + Sync + 'static) -> Self {
        Debouncer {
            debounce_ms,
            state: Arc::new(Mutex::new(State { last_stable_pid: None, last_fire: None, generation: 0 })),
            sink: Arc::new(sink),
        }
    }

    /// Feeds one incoming foreground PID through the debounce contract.
    pub fn on_event(&self, pid: ProcessId) {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());

        if guard.last_stable_pid == Some(pid) {
            return; // step 1: drop
        }

        let elapsed_enough = guard.last_fire.map(|t| t.elapsed() >= Duration::from_millis(self.debounce_ms)).unwrap_or(true);

        if self.debounce_ms == 0 || elapsed_enough {
            // step 2: fire immediately
            guard.last_stable_pid = Some(pid);
            guard.last_fire = Some(Instant::now());
            guard.generation += 1;
            drop(guard);
            (self.sink)(pid);
            return;
        }

        // step 3: schedule a one-shot timer, canceling any pending one by
        // bumping the generation counter the prior timer thread is watching.
        guard.generation += 1;
        let my_generation = guard.generation;
        drop(guard);

        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let debounce_ms = self.debounce_ms;
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(debounce_ms));
            let mut guard = state.lock().unwrap_or_else(|p| p.into_inner());
            if guard.generation != my_generation {
                return; // a newer event superseded this timer; step 3 cancel
            }
            guard.last_stable_pid = Some(pid);
            guard.last_fire = Some(Instant::now());
            drop(guard);
            sink(pid); // step 4: invoked outside the lock
        });
    }

    pub fn last_stable_pid(&self) -> Option<ProcessId> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).last_stable_pid
    }
}
