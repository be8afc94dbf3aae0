//! CircuitBreakerProber - consecutive-failure send gate
//!
//! Each transport gets its own breaker. After `failure_threshold` failures in
//! a row the breaker opens and refuses sends for `recovery_timeout`; it then
//! goes half-open and needs `half_open_successes` clean sends to close again.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use contracts::{HealthProber, ShipperError};

/// Breaker position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    state: BreakerState,
    failure_count: u32,
    half_open_success_count: u32,
    last_failure_time: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            half_open_success_count: 0,
            last_failure_time: None,
        }
    }
}

/// Health prober built from per-transport circuit breakers
#[derive(Debug)]
pub struct CircuitBreakerProber {
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_successes: u32,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl CircuitBreakerProber {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            half_open_successes: 3,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Clean sends needed in half-open state before closing
    pub fn with_half_open_successes(mut self, successes: u32) -> Self {
        self.half_open_successes = successes.max(1);
        self
    }

    /// Current breaker state for `transport`
    pub fn state(&self, transport: &str) -> BreakerState {
        self.breakers
            .lock()
            .get(transport)
            .map_or(BreakerState::Closed, |b| b.state)
    }

    fn record_success(&self, breaker: &mut Breaker, transport: &str) {
        match breaker.state {
            BreakerState::HalfOpen => {
                breaker.half_open_success_count = breaker.half_open_success_count.saturating_add(1);
                if breaker.half_open_success_count >= self.half_open_successes {
                    *breaker = Breaker::new();
                    info!(transport, "Circuit breaker closed after successful recovery");
                }
            }
            BreakerState::Closed | BreakerState::Open => {
                breaker.failure_count = 0;
                breaker.last_failure_time = None;
            }
        }
    }

    fn record_failure(&self, breaker: &mut Breaker, transport: &str) {
        breaker.last_failure_time = Some(Instant::now());
        match breaker.state {
            BreakerState::HalfOpen => {
                breaker.state = BreakerState::Open;
                breaker.half_open_success_count = 0;
                warn!(transport, "Circuit breaker reopened due to failure during recovery");
            }
            BreakerState::Closed => {
                breaker.failure_count = breaker.failure_count.saturating_add(1);
                if breaker.failure_count >= self.failure_threshold {
                    breaker.state = BreakerState::Open;
                    warn!(
                        transport,
                        failure_count = breaker.failure_count,
                        threshold = self.failure_threshold,
                        "Circuit breaker opened due to failure threshold"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }
}

impl HealthProber for CircuitBreakerProber {
    fn admit(&self, transport: &str) -> Result<(), ShipperError> {
        let mut breakers = self.breakers.lock();
        let breaker = breakers
            .entry(transport.to_string())
            .or_insert_with(Breaker::new);

        if breaker.state != BreakerState::Open {
            return Ok(());
        }

        let cooled_down = breaker
            .last_failure_time
            .is_none_or(|at| at.elapsed() >= self.recovery_timeout);
        if cooled_down {
            breaker.state = BreakerState::HalfOpen;
            breaker.half_open_success_count = 0;
            info!(transport, "Circuit breaker half-open, trying a send");
            return Ok(());
        }

        Err(ShipperError::unhealthy(
            transport,
            format!(
                "circuit open after {} consecutive failures",
                breaker.failure_count
            ),
        ))
    }

    fn record_outcome(&self, transport: &str, outcome: &Result<(), ShipperError>) {
        let mut breakers = self.breakers.lock();
        let breaker = breakers
            .entry(transport.to_string())
            .or_insert_with(Breaker::new);

        match outcome {
            Ok(()) => self.record_success(breaker, transport),
            Err(_) => self.record_failure(breaker, transport),
        }
    }
}
