//! Mirror host selection.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Equivalent hosts serving the same tiles, picked uniformly at random.
pub struct MirrorPool {
    hosts: Vec<String>,
    rng: Mutex<StdRng>,
}

impl MirrorPool {
    /// Build a pool. `hosts` must not be empty.
    pub fn new(hosts: Vec<String>, rng: StdRng) -> Self {
        debug_assert!(!hosts.is_empty(), "mirror pool needs at least one host");
        Self {
            hosts,
            rng: Mutex::new(rng),
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// A random host.
    pub fn pick(&self) -> &str {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.hosts
            .choose(&mut *rng)
            .map(String::as_str)
            .unwrap_or_default()
    }
}
