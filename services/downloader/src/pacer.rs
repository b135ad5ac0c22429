//! Burst pacing.
//!
//! Attempts are grouped into bursts whose length is drawn from
//! `[burst_min, burst_max]`. When a burst ends, the pacer asks for a pause
//! of `[pause_min, pause_max]` seconds if more than `transfer_threshold`
//! tiles in it went over the network. Cached tiles count toward the burst
//! length but not toward the threshold.

use std::time::Duration;

use map_common::PacingConfig;
use rand::rngs::StdRng;
use rand::Rng;

use crate::fetch::DownloadOutcome;

/// What to do when a burst is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstEnd {
    /// Sleep before starting the next burst
    Pause(Duration),
    /// Too few transfers to bother pausing
    Skip { fetched: usize },
}

/// In-memory burst counter.
pub struct Pacer {
    config: PacingConfig,
    rng: StdRng,
    burst_len: usize,
    attempts: usize,
    transfers: usize,
}

impl Pacer {
    pub fn new(config: PacingConfig, mut rng: StdRng) -> Self {
        let burst_len = draw_burst(&config, &mut rng);
        Self {
            config,
            rng,
            burst_len,
            attempts: 0,
            transfers: 0,
        }
    }

    /// Length of the current burst.
    pub fn burst_len(&self) -> usize {
        self.burst_len
    }

    /// Attempts left before the current burst ends (never zero).
    pub fn remaining(&self) -> usize {
        self.burst_len - self.attempts
    }

    /// Whether no attempt has been recorded in the current burst yet.
    pub fn at_burst_start(&self) -> bool {
        self.attempts == 0
    }

    /// Count one attempt. Returns the burst decision when this attempt
    /// completes the burst, after which a new burst length is drawn.
    pub fn record(&mut self, transferred: bool) -> Option<BurstEnd> {
        self.attempts += 1;
        if transferred {
            self.transfers += 1;
        }
        if self.attempts < self.burst_len {
            return None;
        }

        let fetched = self.transfers;
        let end = if fetched > self.config.transfer_threshold {
            let secs = self
                .rng
                .gen_range(self.config.pause_min_secs..=self.config.pause_max_secs);
            BurstEnd::Pause(Duration::from_secs(secs))
        } else {
            BurstEnd::Skip { fetched }
        };

        self.attempts = 0;
        self.transfers = 0;
        self.burst_len = draw_burst(&self.config, &mut self.rng);
        Some(end)
    }

    /// Count one outcome; only `Fetched` is a transfer.
    pub fn observe(&mut self, outcome: DownloadOutcome) -> Option<BurstEnd> {
        self.record(outcome.is_transfer())
    }
}

fn draw_burst(config: &PacingConfig, rng: &mut StdRng) -> usize {
    rng.gen_range(config.burst_min..=config.burst_max).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn fixed_burst(len: usize) -> PacingConfig {
        PacingConfig {
            burst_min: len,
            burst_max: len,
            ..PacingConfig::default()
        }
    }

    /// Feed a burst of `len` outcomes with `fetched` transfers first.
    fn run_burst(pacer: &mut Pacer, len: usize, fetched: usize) -> Vec<BurstEnd> {
        (0..len)
            .filter_map(|i| {
                let outcome = if i < fetched {
                    DownloadOutcome::Fetched
                } else {
                    DownloadOutcome::AlreadyCached
                };
                pacer.observe(outcome)
            })
            .collect()
    }

    #[test]
    fn test_busy_burst_pauses_once() {
        let mut pacer = Pacer::new(fixed_burst(60), StdRng::seed_from_u64(3));
        let ends = run_burst(&mut pacer, 60, 15);
        assert_eq!(ends.len(), 1);
        match ends[0] {
            BurstEnd::Pause(d) => assert!((5..=20).contains(&d.as_secs())),
            other => panic!("expected a pause, got {other:?}"),
        }
    }

    #[test]
    fn test_cache_heavy_burst_skips_pause() {
        let mut pacer = Pacer::new(fixed_burst(60), StdRng::seed_from_u64(3));
        let ends = run_burst(&mut pacer, 60, 5);
        assert_eq!(ends, vec![BurstEnd::Skip { fetched: 5 }]);
    }

    #[test]
    fn test_threshold_is_strictly_more_than() {
        let mut pacer = Pacer::new(fixed_burst(20), StdRng::seed_from_u64(3));
        assert_eq!(run_burst(&mut pacer, 20, 10), vec![BurstEnd::Skip { fetched: 10 }]);
        assert!(matches!(
            run_burst(&mut pacer, 20, 11).as_slice(),
            [BurstEnd::Pause(_)]
        ));
    }

    #[test]
    fn test_failures_do_not_count_as_transfers() {
        let mut pacer = Pacer::new(fixed_burst(12), StdRng::seed_from_u64(3));
        let mut ends = Vec::new();
        for _ in 0..12 {
            ends.extend(pacer.observe(DownloadOutcome::NetworkFailure));
        }
        assert_eq!(ends, vec![BurstEnd::Skip { fetched: 0 }]);
    }

    #[test]
    fn test_remaining_counts_down_and_resets() {
        let mut pacer = Pacer::new(fixed_burst(3), StdRng::seed_from_u64(3));
        assert!(pacer.at_burst_start());
        assert_eq!(pacer.remaining(), 3);
        assert_eq!(pacer.record(true), None);
        assert_eq!(pacer.remaining(), 2);
        assert!(!pacer.at_burst_start());
        assert_eq!(pacer.record(true), None);
        assert!(pacer.record(true).is_some());
        assert_eq!(pacer.remaining(), 3);
        assert!(pacer.at_burst_start());
    }

    #[test]
    fn test_burst_lengths_are_drawn_from_range() {
        let mut pacer = Pacer::new(PacingConfig::default(), StdRng::seed_from_u64(11));
        for _ in 0..50 {
            let len = pacer.burst_len();
            assert!((50..=100).contains(&len));
            for _ in 0..len {
                pacer.record(false);
            }
        }
    }

    #[test]
    fn test_seeded_pacers_agree() {
        let mut a = Pacer::new(PacingConfig::default(), StdRng::seed_from_u64(99));
        let mut b = Pacer::new(PacingConfig::default(), StdRng::seed_from_u64(99));
        for _ in 0..500 {
            assert_eq!(a.record(true), b.record(true));
        }
    }
}
