//! Per-tier circuit breaker state machine: closed → open → half-open → closed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::{ResilienceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures while closed before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    pub recovery_timeout: Duration,
    /// Consecutive successes while half-open before the breaker closes.
    pub success_threshold: u32,
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration, success_threshold: u32) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            success_threshold,
        }
    }

    /// Tolerant of failures, quick to retry, closes on a single success.
    /// Intended for cheap, high-volume tiers.
    pub fn cheap() -> Self {
        Self::new(10, Duration::from_secs(5), 1)
    }

    /// Strict and slow to trust again. Intended for expensive tiers where a
    /// single flaky probe shouldn't reopen the floodgates.
    pub fn expensive() -> Self {
        Self::new(3, Duration::from_secs(30), 3)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(15), 1)
    }
}

struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
    /// A probe is in flight while half-open; only one is allowed at a time.
    probe_in_flight: bool,
}

/// A single tier's breaker. Cheap to clone (wraps an `Arc`), safe to share
/// across concurrent callers.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: RwLock<Inner>,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                opened_at: None,
                probe_in_flight: false,
            }),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
        })
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().expect("lock not poisoned").state
    }

    /// Call before attempting the guarded operation. Returns
    /// `Err(CircuitOpen)` if the call must be rejected; otherwise the caller
    /// may proceed and must report the outcome via `record_success`/
    /// `record_failure`.
    pub fn allow(&self) -> Result<()> {
        let mut inner = self.inner.write().expect("lock not poisoned");
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(ResilienceError::CircuitOpen)
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(ResilienceError::CircuitOpen)
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write().expect("lock not poisoned");
        self.consecutive_failures.store(0, Ordering::SeqCst);
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.opened_at = None;
                    self.consecutive_successes.store(0, Ordering::SeqCst);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.write().expect("lock not poisoned");
        self.consecutive_successes.store(0, Ordering::SeqCst);
        match inner.state {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }
}

/// Holds one breaker per named tier, created lazily from tier-specific
/// defaults on first access.
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    defaults: RwLock<HashMap<String, BreakerConfig>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            defaults: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the default config used when `get_or_create` first sees
    /// `tier`. Has no effect on a tier whose breaker already exists.
    pub fn set_default(&self, tier: impl Into<String>, config: BreakerConfig) {
        self.defaults.write().expect("lock not poisoned").insert(tier.into(), config);
    }

    pub fn get_or_create(&self, tier: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().expect("lock not poisoned").get(tier) {
            return existing.clone();
        }

        let mut breakers = self.breakers.write().expect("lock not poisoned");
        if let Some(existing) = breakers.get(tier) {
            return existing.clone();
        }

        let config = self
            .defaults
            .read()
            .expect("lock not poisoned")
            .get(tier)
            .cloned()
            .unwrap_or_default();
        let breaker = CircuitBreaker::new(config);
        breakers.insert(tier.to_string(), breaker.clone());
        breaker
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(BreakerConfig::new(3, Duration::from_secs(60), 1));
        for _ in 0..3 {
            breaker.allow().unwrap();
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.allow().is_err());
    }

    #[test]
    fn half_open_allows_one_probe_then_closes_on_success() {
        let breaker = CircuitBreaker::new(BreakerConfig::new(1, Duration::from_millis(1), 1));
        breaker.allow().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));
        breaker.allow().unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow().is_err(), "second probe must be rejected while one is in flight");

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(BreakerConfig::new(1, Duration::from_millis(1), 1));
        breaker.allow().unwrap();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        breaker.allow().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn registry_applies_tier_specific_defaults() {
        let registry = BreakerRegistry::new();
        registry.set_default("cheap", BreakerConfig::cheap());
        registry.set_default("expensive", BreakerConfig::expensive());

        let cheap = registry.get_or_create("cheap");
        let expensive = registry.get_or_create("expensive");
        assert_eq!(cheap.config.failure_threshold, 10);
        assert_eq!(expensive.config.failure_threshold, 3);
    }

    #[test]
    fn registry_reuses_breaker_across_calls() {
        let registry = BreakerRegistry::new();
        let a = registry.get_or_create("tier-a");
        a.record_failure();
        let b = registry.get_or_create("tier-a");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
