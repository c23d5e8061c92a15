//! # Randomized worker lifetimes.
//!
//! [`TtlJitter`] spreads TTL rotations of a pool so that workers spawned together
//! do not all rotate at the same instant.
//!
//! The lifetime of a worker is `ttl + ttl × variance × (1 + r)` with `r` drawn
//! uniformly from `[0, 1)`, so it always lies in
//! `[ttl × (1 + variance), ttl × (1 + 2 × variance))`.

use std::time::Duration;

use rand::Rng;

/// TTL randomization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TtlJitter {
    /// Base lifetime.
    pub ttl: Duration,
    /// Randomized share of `ttl` (negative values are treated as 0).
    pub variance: f64,
}

impl TtlJitter {
    /// Creates a jitter for the given base lifetime and variance.
    pub fn new(ttl: Duration, variance: f64) -> Self {
        Self { ttl, variance }
    }

    /// Draws one lifetime.
    pub fn sample(&self) -> Duration {
        let r: f64 = rand::rng().random_range(0.0..1.0);
        self.lifetime(r)
    }

    /// Lifetime for a given random draw `r` in `[0, 1)`.
    fn lifetime(&self, r: f64) -> Duration {
        let variance = if self.variance.is_finite() {
            self.variance.max(0.0)
        } else {
            0.0
        };
        let extra = self.ttl.as_secs_f64() * variance * (1.0 + r);
        if !extra.is_finite() || extra <= 0.0 {
            return self.ttl;
        }
        let extra = Duration::try_from_secs_f64(extra).unwrap_or(Duration::MAX);
        self.ttl.saturating_add(extra)
    }
}
