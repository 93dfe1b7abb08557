//! Immutable run configuration.

/// How the per-phase sampling probability is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingMode {
    /// Use the configured probability every phase.
    Fixed,
    /// Derive the probability from the active size and ball estimate.
    Adaptive,
}

/// Which ball-size estimator feeds the oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Estimator {
    /// Twice the most recent observed maximum.
    Last,
    /// Twice the largest maximum observed so far; never decreases in a run.
    PeakHold,
}

/// How the stall threshold is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StallMode {
    /// Use the configured base threshold as-is.
    HardThreshold,
    /// Scale with the expected sparse degree under this phase's sampling.
    Dynamic,
}

/// What to do when a ball outgrows the budget mid-exponentiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Stall the candidate for this phase and drop its partial ball.
    Stall,
    /// Fail fast through the memory guard.
    Abort,
}

/// How the residual graph is finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishStrategy {
    /// Gather residual edges to rank 0 and match sequentially.
    Gather,
    /// Repeat distributed arbitration rounds until nothing remains.
    Distributed,
}

/// Sampling options.
#[derive(Clone, Copy, Debug)]
pub struct Sampling {
    /// Fixed or adaptive probability selection.
    pub mode: SamplingMode,
    /// The probability used in fixed mode.
    pub p: f64,
    /// Safety factor applied in adaptive mode.
    pub safety: f64,
    /// Ball-size estimator feeding the adaptive formula.
    pub estimator: Estimator,
}

/// Stalling options.
#[derive(Clone, Copy, Debug)]
pub struct Stall {
    /// Hard or dynamic threshold selection.
    pub mode: StallMode,
    /// The base threshold used in hard mode.
    pub t_base: u64,
}

/// Memory guard options.
#[derive(Clone, Copy, Debug)]
pub struct Memory {
    /// The per-run resident budget in bytes. Zero disables the guard.
    pub limit_bytes: u64,
    /// Fraction of the budget that triggers transient cleanup.
    pub soft_frac: f64,
    /// Fraction of the budget that triggers a coordinated abort.
    pub hard_frac: f64,
}

/// Finisher options.
#[derive(Clone, Copy, Debug)]
pub struct Finish {
    /// Gather-to-zero or distributed finishing.
    pub strategy: FinishStrategy,
    /// Scales the small-residual threshold, as a fraction of the budget.
    pub small_threshold_factor: f64,
}

/// The engine's immutable configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Exponent of the per-machine edge budget `S = c_mem · n^alpha`.
    pub alpha: f64,
    /// Constant factor of the per-machine edge budget.
    pub c_mem: f64,
    /// Overrides the derived exponentiation radius when set.
    pub r_rounds: Option<usize>,
    /// Hard cap on phases.
    pub phase_budget: usize,
    /// Sampling options.
    pub sampling: Sampling,
    /// Stalling options.
    pub stall: Stall,
    /// Memory guard options.
    pub memory: Memory,
    /// Finisher options.
    pub finish: Finish,
    /// Ball overflow policy.
    pub overflow: OverflowPolicy,
    /// Compact stores between phases when the active fraction drops below
    /// this value.
    pub compact_threshold: f64,
    /// Enables expensive correctness checks.
    pub test_mode: bool,
    /// Base seed feeding every hash of the run.
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            alpha: 0.5,
            c_mem: 1000.0,
            r_rounds: None,
            phase_budget: 64,
            sampling: Sampling {
                mode: SamplingMode::Adaptive,
                p: 0.5,
                safety: 0.5,
                estimator: Estimator::PeakHold,
            },
            stall: Stall {
                mode: StallMode::Dynamic,
                t_base: 32,
            },
            memory: Memory {
                limit_bytes: 0,
                soft_frac: 0.75,
                hard_frac: 0.90,
            },
            finish: Finish {
                strategy: FinishStrategy::Gather,
                small_threshold_factor: 0.05,
            },
            overflow: OverflowPolicy::Stall,
            compact_threshold: 0.4,
            test_mode: false,
            seed: 42,
        }
    }
}

impl Config {
    /// The per-machine edge budget `S` for a graph on `n` vertices.
    ///
    /// Floored so that tiny test graphs still get a workable budget.
    pub fn capacity(&self, n_global: u64) -> u64 {
        let derived = (self.c_mem * (n_global.max(1) as f64).powf(self.alpha)).ceil() as u64;
        derived.max(64)
    }

    /// Returns a `getopts::Options` describing the engine's knobs.
    pub fn options() -> getopts::Options {
        let mut opts = getopts::Options::new();
        opts.optopt("", "alpha", "memory exponent, 0 < alpha < 1", "A");
        opts.optopt("", "c-mem", "memory constant factor", "C");
        opts.optopt("", "rounds", "override exponentiation radius", "R");
        opts.optopt("", "phases", "hard cap on phases", "NUM");
        opts.optopt("", "sampling", "sampling mode: fixed | adaptive", "MODE");
        opts.optopt("", "sampling-p", "fixed sampling probability", "P");
        opts.optopt("", "safety", "adaptive sampling safety factor", "F");
        opts.optopt("", "estimator", "ball estimator: last | peak_hold", "EST");
        opts.optopt("", "stall", "stall mode: hard_threshold | dynamic", "MODE");
        opts.optopt("", "t-base", "hard stall threshold", "T");
        opts.optopt("", "mem-limit", "resident budget in MiB, 0 disables", "MB");
        opts.optopt("", "finish", "finish strategy: gather | distributed", "STRAT");
        opts.optopt("", "small-factor", "small-residual threshold factor", "F");
        opts.optopt("", "seed", "base hash seed", "SEED");
        opts.optflag("", "test-mode", "enable expensive correctness checks");
        opts
    }

    /// Builds a configuration from parsed matches, over the defaults.
    pub fn from_matches(matches: &getopts::Matches) -> Result<Config, String> {
        let mut config = Config::default();
        if let Some(text) = matches.opt_str("alpha") {
            config.alpha = text.parse().map_err(|e| format!("--alpha: {:?}", e))?;
            if config.alpha <= 0.0 || config.alpha >= 1.0 {
                return Err("--alpha must lie strictly between 0 and 1".to_owned());
            }
        }
        if let Some(text) = matches.opt_str("c-mem") {
            config.c_mem = text.parse().map_err(|e| format!("--c-mem: {:?}", e))?;
        }
        if let Some(text) = matches.opt_str("rounds") {
            config.r_rounds = Some(text.parse().map_err(|e| format!("--rounds: {:?}", e))?);
        }
        if let Some(text) = matches.opt_str("phases") {
            config.phase_budget = text.parse().map_err(|e| format!("--phases: {:?}", e))?;
        }
        if let Some(text) = matches.opt_str("sampling") {
            config.sampling.mode = match text.as_str() {
                "fixed" => SamplingMode::Fixed,
                "adaptive" => SamplingMode::Adaptive,
                other => return Err(format!("--sampling: unknown mode {:?}", other)),
            };
        }
        if let Some(text) = matches.opt_str("sampling-p") {
            config.sampling.p = text.parse().map_err(|e| format!("--sampling-p: {:?}", e))?;
        }
        if let Some(text) = matches.opt_str("safety") {
            config.sampling.safety = text.parse().map_err(|e| format!("--safety: {:?}", e))?;
        }
        if let Some(text) = matches.opt_str("estimator") {
            config.sampling.estimator = match text.as_str() {
                "last" => Estimator::Last,
                "peak_hold" => Estimator::PeakHold,
                other => return Err(format!("--estimator: unknown estimator {:?}", other)),
            };
        }
        if let Some(text) = matches.opt_str("stall") {
            config.stall.mode = match text.as_str() {
                "hard_threshold" => StallMode::HardThreshold,
                "dynamic" => StallMode::Dynamic,
                other => return Err(format!("--stall: unknown mode {:?}", other)),
            };
        }
        if let Some(text) = matches.opt_str("t-base") {
            config.stall.t_base = text.parse().map_err(|e| format!("--t-base: {:?}", e))?;
        }
        if let Some(text) = matches.opt_str("mem-limit") {
            let mib: u64 = text.parse().map_err(|e| format!("--mem-limit: {:?}", e))?;
            config.memory.limit_bytes = mib * 1024 * 1024;
        }
        if let Some(text) = matches.opt_str("finish") {
            config.finish.strategy = match text.as_str() {
                "gather" => FinishStrategy::Gather,
                "distributed" => FinishStrategy::Distributed,
                other => return Err(format!("--finish: unknown strategy {:?}", other)),
            };
        }
        if let Some(text) = matches.opt_str("small-factor") {
            config.finish.small_threshold_factor =
                text.parse().map_err(|e| format!("--small-factor: {:?}", e))?;
        }
        if let Some(text) = matches.opt_str("seed") {
            config.seed = text.parse().map_err(|e| format!("--seed: {:?}", e))?;
        }
        config.test_mode = matches.opt_present("test-mode");
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn capacity_follows_the_power_law() {
        let config = Config::default();
        // 1000 * sqrt(10^6), give or take a ulp under powf
        let capacity = config.capacity(1_000_000);
        assert!((1_000_000..=1_000_001).contains(&capacity));
        assert!(config.capacity(1) >= 64);
        assert!(config.capacity(100) < config.capacity(10_000));
    }

    #[test]
    fn parses_knobs() {
        let args = vec![
            "--alpha".to_owned(),
            "0.3".to_owned(),
            "--sampling".to_owned(),
            "fixed".to_owned(),
            "--sampling-p".to_owned(),
            "1.0".to_owned(),
            "--finish".to_owned(),
            "distributed".to_owned(),
            "--test-mode".to_owned(),
        ];
        let matches = Config::options().parse(args).unwrap();
        let config = Config::from_matches(&matches).unwrap();
        assert_eq!(config.alpha, 0.3);
        assert_eq!(config.sampling.mode, SamplingMode::Fixed);
        assert_eq!(config.sampling.p, 1.0);
        assert_eq!(config.finish.strategy, FinishStrategy::Distributed);
        assert!(config.test_mode);
    }

    #[test]
    fn rejects_degenerate_alpha() {
        let args = vec!["--alpha".to_owned(), "1.5".to_owned()];
        let matches = Config::options().parse(args).unwrap();
        assert!(Config::from_matches(&matches).is_err());
    }
}
