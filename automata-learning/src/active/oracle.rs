use automata_core::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, trace, warn};

use crate::{LearningError, OracleStrategy, DEFAULT_RESET_PROBABILITY};

use super::cache::QueryCache;

/// An input sequence on which the hypothesis and the device disagree, together with the
/// outputs the device produced on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterexample<S, O> {
    /// The input sequence, to be run from reset.
    pub input: Word<S>,
    /// The outputs the device produced.
    pub observed: Vec<O>,
}

/// Approximates equivalence queries: searches for an input on which a hypothesis and the
/// device under learning disagree.
///
/// Returning `Ok(None)` means no counterexample was found within the budget of the oracle,
/// which is evidence but not proof of equivalence. Every observation of the device is
/// recorded in the given cache, so that contradicting answers surface as
/// [`LearningError::NonDeterministicSul`].
pub trait EquivalenceOracle<S: Symbol, O: Color> {
    /// Searches for a counterexample to `hypothesis`.
    fn find_counterexample<T>(
        &mut self,
        hypothesis: &MealyMachine<S, O>,
        sul: &mut SulAdapter<T>,
        cache: &mut QueryCache<S, O>,
    ) -> Result<Option<Counterexample<S, O>>, LearningError<S, O>>
    where
        T: Sul<Symbol = S, Output = O>;
}

/// Performs a long random walk on both the device and the hypothesis, resetting both with a
/// fixed probability after each step. The first step on which the outputs differ ends the
/// search, the counterexample is the walk since the last reset.
#[derive(Debug, Clone)]
pub struct RandomWalkOracle {
    steps: usize,
    reset_probability: f64,
    rng: StdRng,
}

impl RandomWalkOracle {
    /// Creates a new random walk oracle with the given step budget. The reset probability
    /// is clamped to `[0, 1]`, NaN falls back to [`DEFAULT_RESET_PROBABILITY`].
    pub fn new(steps: usize, reset_probability: f64, seed: u64) -> Self {
        let reset_probability = if reset_probability.is_nan() {
            warn!("reset probability is NaN, using {DEFAULT_RESET_PROBABILITY}");
            DEFAULT_RESET_PROBABILITY
        } else {
            reset_probability.clamp(0.0, 1.0)
        };
        Self {
            steps,
            reset_probability,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<S: Symbol, O: Color> EquivalenceOracle<S, O> for RandomWalkOracle {
    fn find_counterexample<T>(
        &mut self,
        hypothesis: &MealyMachine<S, O>,
        sul: &mut SulAdapter<T>,
        cache: &mut QueryCache<S, O>,
    ) -> Result<Option<Counterexample<S, O>>, LearningError<S, O>>
    where
        T: Sul<Symbol = S, Output = O>,
    {
        let alphabet = hypothesis.alphabet();
        if alphabet.is_empty() {
            return Ok(None);
        }
        let mut simulation = hypothesis.simulate();
        let mut walk = vec![];
        let mut observed = vec![];

        sul.reset()?;
        for _ in 0..self.steps {
            if !walk.is_empty() && self.rng.gen_bool(self.reset_probability) {
                cache.insert(&walk, &observed)?;
                walk.clear();
                observed.clear();
                sul.reset()?;
                simulation.reset()?;
            }

            let sym = alphabet[self.rng.gen_range(0..alphabet.size())].clone();
            let output = sul.step(&sym)?;
            let expected = simulation.step(&sym)?;
            walk.push(sym);
            observed.push(output);

            if observed.last() != Some(&expected) {
                trace!("random walk diverged on {}", walk.show());
                cache.insert(&walk, &observed)?;
                return Ok(Some(Counterexample {
                    input: walk,
                    observed,
                }));
            }
        }
        cache.insert(&walk, &observed)?;
        debug!("random walk of {} steps found no counterexample", self.steps);
        Ok(None)
    }
}

/// Runs a batch of independent random words, each from reset, and compares the complete
/// output vectors of device and hypothesis.
#[derive(Debug, Clone)]
pub struct RandomWordOracle {
    words: usize,
    min_len: usize,
    max_len: usize,
    rng: StdRng,
}

impl RandomWordOracle {
    /// Creates an oracle that tries `words` words with lengths in `min_len..=max_len`.
    pub fn new(words: usize, min_len: usize, max_len: usize, seed: u64) -> Self {
        let max_len = std::cmp::max(max_len, 1);
        Self {
            words,
            min_len: std::cmp::min(min_len, max_len),
            max_len,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<S: Symbol, O: Color> EquivalenceOracle<S, O> for RandomWordOracle {
    fn find_counterexample<T>(
        &mut self,
        hypothesis: &MealyMachine<S, O>,
        sul: &mut SulAdapter<T>,
        cache: &mut QueryCache<S, O>,
    ) -> Result<Option<Counterexample<S, O>>, LearningError<S, O>>
    where
        T: Sul<Symbol = S, Output = O>,
    {
        let alphabet = hypothesis.alphabet();
        if alphabet.is_empty() {
            return Ok(None);
        }
        for _ in 0..self.words {
            let length = self.rng.gen_range(self.min_len..=self.max_len);
            let word: Word<S> = (0..length)
                .map(|_| alphabet[self.rng.gen_range(0..alphabet.size())].clone())
                .collect();
            let observed = sul.query(&word)?;
            cache.insert(&word, &observed)?;
            if hypothesis.transform(&word).as_ref() != Some(&observed) {
                trace!("random word {} is a counterexample", word.show());
                return Ok(Some(Counterexample {
                    input: word,
                    observed,
                }));
            }
        }
        debug!("{} random words found no counterexample", self.words);
        Ok(None)
    }
}

/// An oracle that knows the machine to be learned. Equivalence queries are answered exactly
/// by searching the product of target and hypothesis for a separating word. This is useful
/// for testing the learner against known machines.
#[derive(Clone)]
pub struct MealyOracle<S, O> {
    target: MealyMachine<S, O>,
}

impl<S: Symbol, O: Color> std::fmt::Debug for MealyOracle<S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MealyOracle with target\n{:?}", self.target)
    }
}

impl<S: Symbol, O: Color> MealyOracle<S, O> {
    /// Creates a new [`MealyOracle`] for the given target.
    pub fn new(target: MealyMachine<S, O>) -> Self {
        Self { target }
    }
}

impl<S: Symbol, O: Color> EquivalenceOracle<S, O> for MealyOracle<S, O> {
    fn find_counterexample<T>(
        &mut self,
        hypothesis: &MealyMachine<S, O>,
        sul: &mut SulAdapter<T>,
        cache: &mut QueryCache<S, O>,
    ) -> Result<Option<Counterexample<S, O>>, LearningError<S, O>>
    where
        T: Sul<Symbol = S, Output = O>,
    {
        let Some(input) = self.target.witness_inequivalence(hypothesis) else {
            return Ok(None);
        };
        let observed = sul.query(&input)?;
        cache.insert(&input, &observed)?;
        Ok(Some(Counterexample { input, observed }))
    }
}

/// The oracle that is selected through an [`OracleStrategy`].
#[derive(Debug, Clone)]
pub enum ConfiguredOracle {
    /// See [`RandomWalkOracle`].
    RandomWalk(RandomWalkOracle),
    /// See [`RandomWordOracle`].
    RandomWords(RandomWordOracle),
}

impl ConfiguredOracle {
    /// Instantiates the oracle described by `strategy`, seeding its random choices.
    pub fn new(strategy: &OracleStrategy, seed: u64) -> Self {
        match strategy {
            OracleStrategy::RandomWalk {
                steps,
                reset_probability,
            } => Self::RandomWalk(RandomWalkOracle::new(*steps, *reset_probability, seed)),
            OracleStrategy::RandomWords {
                words,
                min_len,
                max_len,
            } => Self::RandomWords(RandomWordOracle::new(*words, *min_len, *max_len, seed)),
        }
    }
}

impl<S: Symbol, O: Color> EquivalenceOracle<S, O> for ConfiguredOracle {
    fn find_counterexample<T>(
        &mut self,
        hypothesis: &MealyMachine<S, O>,
        sul: &mut SulAdapter<T>,
        cache: &mut QueryCache<S, O>,
    ) -> Result<Option<Counterexample<S, O>>, LearningError<S, O>>
    where
        T: Sul<Symbol = S, Output = O>,
    {
        match self {
            Self::RandomWalk(oracle) => oracle.find_counterexample(hypothesis, sul, cache),
            Self::RandomWords(oracle) => oracle.find_counterexample(hypothesis, sul, cache),
        }
    }
}
