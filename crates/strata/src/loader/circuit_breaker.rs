// crates/strata/src/loader/circuit_breaker.rs
// Circuit breaker: counts consecutive failures per key and temporarily
// rejects work for keys whose source keeps failing.

use crate::config::CircuitConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use strata_types::CircuitState;
use tracing::{info, warn};

/// Circuit state for a single key.
#[derive(Debug, Clone)]
enum State {
    /// Normal operation, counting consecutive failures.
    Closed { failures: u32 },
    /// Tripped: every request is rejected until cooldown expires.
    Open { tripped_at: Instant },
    /// Cooldown expired and one probe is in flight.
    HalfOpen,
}

impl Default for State {
    fn default() -> Self {
        Self::Closed { failures: 0 }
    }
}

#[derive(Debug, Default, Clone)]
struct Entry {
    state: State,
    last_failure: Option<SystemTime>,
}

/// Point-in-time view of one key's circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot<K> {
    pub key: K,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure: Option<chrono::DateTime<chrono::Utc>>,
    pub threshold: u32,
    #[serde(with = "duration_ms")]
    pub cooldown: Duration,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

/// Thread-safe circuit breaker tracking health per key.
#[derive(Debug, Clone)]
pub struct CircuitBreaker<K> {
    states: Arc<Mutex<HashMap<K, Entry>>>,
    threshold: u32,
    cooldown: Duration,
}

impl<K> CircuitBreaker<K>
where
    K: Hash + Eq + Clone + fmt::Display,
{
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown,
        }
    }

    /// Ask to run an operation for `key`.
    ///
    /// Returns `true` when Closed, or when an Open circuit's cooldown has
    /// elapsed (the caller becomes the half-open probe). Returns `false`
    /// while Open, and while another probe is in flight.
    pub fn try_acquire(&self, key: &K) -> bool {
        let Ok(mut states) = self.states.lock() else {
            return true; // If mutex is poisoned, allow the request
        };
        let entry = states.entry(key.clone()).or_default();

        match entry.state {
            State::Closed { .. } => true,
            State::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.cooldown {
                    info!(key = %key, "Circuit half-open, allowing probe request");
                    entry.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => false,
        }
    }

    /// Record a successful operation: the circuit closes and the count resets
    pub fn record_success(&self, key: &K) {
        let Ok(mut states) = self.states.lock() else {
            return;
        };
        let entry = states.entry(key.clone()).or_default();

        let was_half_open = matches!(entry.state, State::HalfOpen);
        entry.state = State::Closed { failures: 0 };

        if was_half_open {
            info!(key = %key, "Circuit recovered (half-open probe succeeded)");
        }
    }

    /// Record a failed operation, possibly tripping the circuit
    pub fn record_failure(&self, key: &K) {
        let Ok(mut states) = self.states.lock() else {
            return;
        };
        let entry = states.entry(key.clone()).or_default();
        let now = Instant::now();
        entry.last_failure = Some(SystemTime::now());

        match &mut entry.state {
            State::Closed { failures } => {
                *failures += 1;
                if *failures >= self.threshold {
                    warn!(
                        key = %key,
                        failures = *failures,
                        "Circuit tripped, rejecting requests for {}ms",
                        self.cooldown.as_millis()
                    );
                    entry.state = State::Open { tripped_at: now };
                }
            }
            State::HalfOpen => {
                warn!(key = %key, "Half-open probe failed, circuit re-tripped");
                entry.state = State::Open { tripped_at: now };
            }
            State::Open { .. } => {}
        }
    }

    pub fn snapshot(&self, key: &K) -> CircuitSnapshot<K> {
        let entry = self
            .states
            .lock()
            .ok()
            .and_then(|states| states.get(key).cloned())
            .unwrap_or_default();
        self.to_snapshot(key.clone(), &entry)
    }

    /// Snapshots of every key seen so far
    pub fn snapshots(&self) -> Vec<CircuitSnapshot<K>> {
        let Ok(states) = self.states.lock() else {
            return Vec::new();
        };
        states
            .iter()
            .map(|(key, entry)| self.to_snapshot(key.clone(), entry))
            .collect()
    }

    /// Forget every key (all circuits closed)
    pub fn reset(&self) {
        if let Ok(mut states) = self.states.lock() {
            states.clear();
        }
    }

    fn to_snapshot(&self, key: K, entry: &Entry) -> CircuitSnapshot<K> {
        let (state, consecutive_failures) = match entry.state {
            State::Closed { failures } => (CircuitState::Closed, failures),
            State::Open { .. } => (CircuitState::Open, self.threshold),
            State::HalfOpen => (CircuitState::HalfOpen, self.threshold),
        };
        CircuitSnapshot {
            key,
            state,
            consecutive_failures,
            last_failure: entry.last_failure.map(chrono::DateTime::from),
            threshold: self.threshold,
            cooldown: self.cooldown,
        }
    }

    #[cfg(test)]
    fn force_open(&self, key: &K, tripped_at: Instant) {
        let mut states = self.states.lock().unwrap();
        states.insert(
            key.clone(),
            Entry {
                state: State::Open { tripped_at },
                last_failure: Some(SystemTime::now()),
            },
        );
    }
}
