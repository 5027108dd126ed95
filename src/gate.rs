// src/gate.rs

//! Non-blocking single-flight gate, keyed by gate name.
//!
//! At most one [`GatePermit`] exists per name at any time. Acquisition never
//! waits: a caller that finds the gate held gets `None` straight away. The
//! permit releases the gate when dropped, so every exit path of the holder
//! (normal return, error, panic unwinding, task abort) gives it back.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ExecutionGate {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ExecutionGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to take the gate named `name`.
    pub fn try_acquire(&self, name: &str) -> Option<GatePermit> {
        if !self.lock().insert(name.to_string()) {
            debug!(gate = %name, "gate already held");
            return None;
        }
        debug!(gate = %name, "gate acquired");
        Some(GatePermit {
            gate: self.clone(),
            name: name.to_string(),
        })
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    fn release(&self, name: &str) {
        if self.lock().remove(name) {
            debug!(gate = %name, "gate released");
        }
    }
}

/// Proof of holding a gate. Dropping it releases the gate.
#[must_use = "the gate is released as soon as the permit is dropped"]
pub struct GatePermit {
    gate: ExecutionGate,
    name: String,
}

impl GatePermit {
    /// Release explicitly; equivalent to dropping the permit.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePermit")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let gate = ExecutionGate::new();
        let permit = gate.try_acquire("python").expect("first acquire");
        assert!(gate.try_acquire("python").is_none());
        assert!(gate.is_held("python"));

        permit.release();
        assert!(!gate.is_held("python"));
        assert!(gate.try_acquire("python").is_some());
    }

    #[test]
    fn gates_are_independent_per_name() {
        let gate = ExecutionGate::new();
        let _a = gate.try_acquire("patterns").unwrap();
        let _b = gate.try_acquire("similar").unwrap();
        assert!(gate.try_acquire("patterns").is_none());
        assert!(gate.try_acquire("similar").is_none());
    }

    #[test]
    fn permit_is_released_when_holder_panics() {
        let gate = ExecutionGate::new();
        let worker_gate = gate.clone();
        let res = std::thread::spawn(move || {
            let _permit = worker_gate.try_acquire("python").unwrap();
            panic!("worker blew up");
        })
        .join();

        assert!(res.is_err());
        assert!(!gate.is_held("python"));
    }

    #[test]
    fn concurrent_acquirers_get_exactly_one_permit() {
        let gate = ExecutionGate::new();
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let winners: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    gate.try_acquire("python")
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        assert_eq!(winners.iter().filter(|p| p.is_some()).count(), 1);
    }
}
