use thiserror::Error;
use tracing::warn;

/// Default upper bound on the number of learning iterations. Each pass of the learner
/// through its invariant checks counts as one iteration.
pub const ITERATION_THRESHOLD: usize = if cfg!(debug_assertions) { 300 } else { 200000 };

/// Probability with which a random walk resets after a step, unless configured otherwise.
pub const DEFAULT_RESET_PROBABILITY: f64 = 0.09;

/// Raised for configurations that cannot be run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The reset probability of a random walk is outside of `[0, 1]`.
    #[error("reset probability must lie in [0, 1], got {0}")]
    ResetProbability(f64),
    /// The length range of random words is empty.
    #[error("minimal word length {min} exceeds maximal word length {max}")]
    LengthRange {
        /// Configured minimal length.
        min: usize,
        /// Configured maximal length.
        max: usize,
    },
    /// Random words must contain at least one symbol.
    #[error("random words must have a maximal length of at least one")]
    EmptyWords,
    /// Learning needs at least one iteration.
    #[error("the iteration budget must be positive")]
    NoIterations,
}

/// Selects how equivalence queries are approximated. Both strategies are incomplete: if
/// they find no counterexample within their budget, this is only evidence for equivalence.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleStrategy {
    /// A single long random walk, which is interrupted by a reset with the given probability
    /// after every step.
    RandomWalk {
        /// The total number of steps.
        steps: usize,
        /// Probability of resetting after a step.
        reset_probability: f64,
    },
    /// A batch of independent random words, each run from reset.
    RandomWords {
        /// The number of words.
        words: usize,
        /// Minimal length of a word.
        min_len: usize,
        /// Maximal length of a word.
        max_len: usize,
    },
}

impl OracleStrategy {
    /// A random walk with the given number of steps and the default reset probability.
    pub fn random_walk(steps: usize) -> Self {
        Self::RandomWalk {
            steps,
            reset_probability: DEFAULT_RESET_PROBABILITY,
        }
    }

    /// A batch of `words` random words with lengths between `min_len` and `max_len`.
    pub fn random_words(words: usize, min_len: usize, max_len: usize) -> Self {
        Self::RandomWords {
            words,
            min_len,
            max_len,
        }
    }

    /// Checks that the strategy can be run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::RandomWalk {
                reset_probability, ..
            } if !(0.0..=1.0).contains(reset_probability) => {
                Err(ConfigError::ResetProbability(*reset_probability))
            }
            Self::RandomWords {
                min_len, max_len, ..
            } if min_len > max_len => Err(ConfigError::LengthRange {
                min: *min_len,
                max: *max_len,
            }),
            Self::RandomWords { max_len: 0, .. } => Err(ConfigError::EmptyWords),
            _ => Ok(()),
        }
    }
}

impl Default for OracleStrategy {
    fn default() -> Self {
        Self::random_walk(1000)
    }
}

/// Configuration of a single learning session.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningConfig {
    /// How equivalence queries are answered.
    pub oracle: OracleStrategy,
    /// Upper bound on the number of iterations before the session is given up.
    pub max_iterations: usize,
    /// Seed for the random choices of the oracle, which makes runs reproducible.
    pub seed: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            oracle: OracleStrategy::default(),
            max_iterations: ITERATION_THRESHOLD,
            seed: 0,
        }
    }
}

impl LearningConfig {
    /// The default configuration, where the iteration budget may be overridden through the
    /// `MAX_ITERATIONS` environment variable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("MAX_ITERATIONS") {
            match value.parse() {
                Ok(max) => config.max_iterations = max,
                Err(e) => warn!("ignoring MAX_ITERATIONS=\"{value}\": {e}"),
            }
        }
        config
    }

    /// Replaces the oracle strategy.
    pub fn with_oracle(mut self, oracle: OracleStrategy) -> Self {
        self.oracle = oracle;
        self
    }

    /// Replaces the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Replaces the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks that the configuration can be run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        self.oracle.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        assert!(LearningConfig::default().validate().is_ok());
        assert_eq!(
            OracleStrategy::random_words(10, 4, 2).validate(),
            Err(ConfigError::LengthRange { min: 4, max: 2 })
        );
        assert_eq!(
            OracleStrategy::RandomWalk {
                steps: 10,
                reset_probability: 1.5
            }
            .validate(),
            Err(ConfigError::ResetProbability(1.5))
        );
        assert_eq!(
            LearningConfig::default().with_max_iterations(0).validate(),
            Err(ConfigError::NoIterations)
        );
    }
}
