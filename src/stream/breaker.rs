use crate::error::{Classify, IndexError};

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    /// Cool-down elapsed; one probe call is allowed through.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker around search index calls.
///
/// Only retryable errors count as failures. A permanent rejection still proves
/// the index is answering, so it resets the counter like a success.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Runs `call` unless the breaker is open. While open (or while the half-open
    /// probe is in flight) this fails fast with `IndexError::CircuitOpen`.
    pub async fn call<T, F>(&self, call: F) -> Result<T, IndexError>
    where
        F: Future<Output = Result<T, IndexError>>,
    {
        self.acquire()?;
        let mut guard = Attempt {
            breaker: self,
            settled: false,
        };

        let result = call.await;
        match &result {
            Err(e) if e.is_retryable() => self.on_failure(),
            _ => self.on_success(),
        }
        guard.settled = true;
        result
    }

    fn acquire(&self) -> Result<(), IndexError> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => Err(IndexError::CircuitOpen),
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|opened| opened.elapsed() >= self.cooldown);
                if cooled {
                    tracing::info!("Circuit breaker half-open, sending probe");
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(IndexError::CircuitOpen)
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!("Circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let reopen = match inner.state {
            BreakerState::HalfOpen => true,
            _ => inner.consecutive_failures >= self.threshold,
        };
        if reopen && inner.state != BreakerState::Open {
            tracing::warn!(
                "Circuit breaker open after {} consecutive failures, cooling down for {:?}",
                inner.consecutive_failures,
                self.cooldown
            );
        }
        if reopen {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Counts a dropped (cancelled) call as a failure so a half-open probe can
/// never leave the breaker stuck.
struct Attempt<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_failure();
        }
    }
}
