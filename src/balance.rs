//! Load balancing strategies for discovery.
//!
//! A strategy is a pure selection function over candidate counts; the
//! discovery layer owns the server list and asks the strategy for one
//! index per lookup.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A selection strategy choosing one index among `n` candidates.
pub trait LoadBalance: Send {
    /// Pick an index in `[0, n)`.
    ///
    /// Callers guarantee `n > 0`; selection over an empty list is
    /// rejected before the strategy is consulted.
    fn pick(&mut self, n: usize) -> usize;
}

/// Round-robin selection: a monotonic counter modulo `n`.
#[derive(Debug, Default)]
pub struct RoundRobin {
    index: usize,
}

impl RoundRobin {
    /// Create a round-robin strategy starting at index 0.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalance for RoundRobin {
    fn pick(&mut self, n: usize) -> usize {
        let picked = self.index % n;
        self.index = (self.index + 1) % n;
        picked
    }
}

/// Uniform random selection over a generator seeded once at construction.
pub struct Random {
    rng: StdRng,
}

impl Random {
    /// Create a random strategy seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a random strategy with a fixed seed (reproducible picks).
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalance for Random {
    fn pick(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }
}
