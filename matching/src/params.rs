//! The parameter oracle: per-phase radius, sampling probability, stall
//! threshold, and batch sizing, derived from the global state observed at
//! each phase boundary.

use crate::config::{Config, Estimator, SamplingMode, StallMode};
use crate::hashing::sample_threshold;

/// Scales the derived exponentiation radius.
const C_RADIUS: f64 = 1.0;
/// Safety divisor in the batch bound `|batch| · B_est ≤ S / C_BATCH`.
const C_BATCH: u64 = 2;

/// The parameters governing one phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseParams {
    /// Exponentiation rounds.
    pub r_rounds: usize,
    /// Sampling probability.
    pub p_phase: f64,
    /// Inclusion threshold `⌊p_phase · 2^64⌋`.
    pub sample_cut: u64,
    /// Sparse-degree bound above which an edge stalls.
    pub t_phase: u64,
    /// Candidates per batch on each worker.
    pub batch_size: usize,
    /// The degree estimate the parameters were derived from.
    pub delta_est: u64,
}

/// Derives phase parameters and tracks the ball-size estimate.
pub struct ParameterOracle {
    capacity: u64,
    peers: usize,
    mode: SamplingMode,
    fixed_p: f64,
    safety: f64,
    estimator: Estimator,
    stall_mode: StallMode,
    t_base: u64,
    r_override: Option<usize>,
    small_factor: f64,
    ball_peak: u64,
    ball_last: u64,
}

impl ParameterOracle {
    /// Creates an oracle for a run with edge budget `capacity` on `peers`
    /// workers.
    pub fn new(config: &Config, capacity: u64, peers: usize) -> Self {
        ParameterOracle {
            capacity,
            peers,
            mode: config.sampling.mode,
            fixed_p: config.sampling.p,
            safety: config.sampling.safety,
            estimator: config.sampling.estimator,
            stall_mode: config.stall.mode,
            t_base: config.stall.t_base,
            r_override: config.r_rounds,
            small_factor: config.finish.small_threshold_factor,
            ball_peak: 0,
            ball_last: 0,
        }
    }

    /// Feeds back the largest ball observed in a batch.
    pub fn observe_ball_max(&mut self, observed: u64) {
        self.ball_last = observed;
        if observed > self.ball_peak {
            self.ball_peak = observed;
        }
    }

    /// The current over-estimate of the next maximum ball size.
    pub fn ball_estimate(&self) -> u64 {
        let base = match self.estimator {
            Estimator::PeakHold => self.ball_peak,
            Estimator::Last => self.ball_last,
        };
        2 * base.max(1)
    }

    /// Residual size below which the finisher takes over.
    pub fn small_threshold(&self) -> u64 {
        let scaled = (self.small_factor * self.capacity as f64) as u64;
        (self.capacity / C_BATCH).min(scaled)
    }

    /// Derives the parameters for one phase.
    pub fn phase_params(&self, global_active: u64, delta_est: u64) -> PhaseParams {
        let r_rounds = self.r_override.unwrap_or_else(|| {
            let delta = delta_est.max(2) as f64;
            let derived = (C_RADIUS * delta.ln().sqrt()).ceil() as usize;
            derived.clamp(1, 4)
        });

        let ball_est = self.ball_estimate();
        let p_phase = match self.mode {
            SamplingMode::Fixed => self.fixed_p,
            SamplingMode::Adaptive => {
                let budget = (self.peers as f64) * (self.capacity as f64);
                let demand = (global_active.max(1) as f64) * (ball_est as f64);
                (self.safety * budget / demand).min(0.5)
            }
        };

        let t_phase = match self.stall_mode {
            StallMode::HardThreshold => self.t_base,
            // a high quantile of the expected sparse degree; tightens as
            // the active graph thins out
            StallMode::Dynamic => ((2.0 * p_phase * delta_est as f64).ceil() as u64).max(2),
        };

        let batch_size = (self.capacity / (C_BATCH * ball_est)).max(1) as usize;

        PhaseParams {
            r_rounds,
            p_phase,
            sample_cut: sample_threshold(p_phase),
            t_phase,
            batch_size,
            delta_est,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    #[test]
    fn radius_is_clamped() {
        let config = Config::default();
        let oracle = ParameterOracle::new(&config, 1000, 4);
        assert_eq!(oracle.phase_params(100, 0).r_rounds, 1);
        assert_eq!(oracle.phase_params(100, 2).r_rounds, 1);
        assert!(oracle.phase_params(100, u64::MAX).r_rounds <= 4);
    }

    #[test]
    fn override_wins() {
        let mut config = Config::default();
        config.r_rounds = Some(3);
        let oracle = ParameterOracle::new(&config, 1000, 4);
        assert_eq!(oracle.phase_params(100, 1_000_000).r_rounds, 3);
    }

    #[test]
    fn peak_hold_never_decreases() {
        let config = Config::default();
        let mut oracle = ParameterOracle::new(&config, 1000, 4);
        oracle.observe_ball_max(10);
        assert_eq!(oracle.ball_estimate(), 20);
        oracle.observe_ball_max(4);
        assert_eq!(oracle.ball_estimate(), 20);
        oracle.observe_ball_max(16);
        assert_eq!(oracle.ball_estimate(), 32);
    }

    #[test]
    fn adaptive_probability_is_capped() {
        let config = Config::default();
        let oracle = ParameterOracle::new(&config, 1000, 4);
        let params = oracle.phase_params(10, 5);
        assert_eq!(params.p_phase, 0.5);
        let crowded = oracle.phase_params(1_000_000, 5);
        assert!(crowded.p_phase < 0.5);
    }

    #[test]
    fn batches_respect_the_budget() {
        let config = Config::default();
        let mut oracle = ParameterOracle::new(&config, 1000, 4);
        oracle.observe_ball_max(100);
        let params = oracle.phase_params(10_000, 50);
        assert!(params.batch_size as u64 * oracle.ball_estimate() <= 1000 / 2);
    }
}
