use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use automata_core::{mealy::MealyError, prelude::*, show_duration};
use owo_colors::OwoColorize;
use tracing::{debug, error, info, trace, warn};

use crate::{LearningConfig, LearningError};

use super::{ConfiguredOracle, EquivalenceOracle, Experiment, ObservationTable};

/// The phases a learning session goes through. A session starts in [`Phase::Init`] and
/// ends in [`Phase::Converged`], unless it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase<S> {
    /// The table is seeded, the device has not been touched yet.
    Init,
    /// Outstanding membership queries are performed.
    Filling,
    /// Closedness and consistency are checked.
    CheckInvariants,
    /// The table is refined, afterwards it has to be filled again.
    Refining(Refinement<S>),
    /// A hypothesis is built from the closed and consistent table.
    BuildHypothesis,
    /// The oracle searches for a counterexample to the hypothesis.
    Equivalence,
    /// No counterexample was found, the current hypothesis is final.
    Converged,
}

/// The ways in which the observation table is refined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refinement<S> {
    /// An unclosed row is moved into the upper part.
    Promote(Word<S>),
    /// A distinguishing experiment resolves an inconsistency.
    AddExperiment(Experiment<S>),
    /// All prefixes of a verified counterexample are added to the upper part.
    Counterexample(Word<S>),
}

/// A flag that can be used to cancel a running session from another thread. The session
/// checks it between iterations, queries themselves are never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a new token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Statistics of a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LearningStats {
    /// Membership queries that had to be posed to the device.
    pub membership_queries: usize,
    /// Membership queries that were answered from the cache.
    pub cache_hits: usize,
    /// Total number of steps performed on the device, including equivalence testing.
    pub sul_steps: usize,
    /// Total number of resets of the device.
    pub sul_resets: usize,
    /// Number of equivalence queries.
    pub equivalence_rounds: usize,
    /// Number of verified counterexamples.
    pub counterexamples: usize,
    /// Number of iterations, i.e. passes through the invariant checks.
    pub iterations: usize,
    /// Wall clock time the session took.
    pub duration: Duration,
}

/// The result of a converged session.
#[derive(Debug, Clone)]
pub struct LearningOutcome<S: Symbol, O: Color> {
    /// The final hypothesis.
    pub hypothesis: MealyMachine<S, O>,
    /// Statistics about the session.
    pub stats: LearningStats,
}

/// An implementation of the L* algorithm for Mealy machines. One instance is one learning
/// session for one device: it exclusively owns the observation table, the current
/// hypothesis and the device adapter, and it moves through the [`Phase`]s until it
/// converges or fails.
pub struct LStar<T: Sul, Q = ConfiguredOracle> {
    table: ObservationTable<T::Symbol, T::Output>,
    sul: SulAdapter<T>,
    oracle: Q,
    config: LearningConfig,
    phase: Phase<T::Symbol>,
    hypothesis: Option<MealyMachine<T::Symbol, T::Output>>,
    cancel: Option<CancellationToken>,
    iterations: usize,
    equivalence_rounds: usize,
    counterexamples: usize,
    started: Option<Instant>,
}

impl<T: Sul> LStar<T, ConfiguredOracle> {
    /// Creates a session for `sul` which uses the oracle selected in `config`.
    pub fn new(alphabet: Alphabet<T::Symbol>, sul: T, config: LearningConfig) -> Self {
        let oracle = ConfiguredOracle::new(&config.oracle, config.seed);
        Self::with_oracle(alphabet, sul, oracle, config)
    }
}

impl<T, Q> LStar<T, Q>
where
    T: Sul,
    Q: EquivalenceOracle<T::Symbol, T::Output>,
{
    /// Creates a session for `sul` with a custom oracle. The oracle settings in `config`
    /// are ignored.
    pub fn with_oracle(
        alphabet: Alphabet<T::Symbol>,
        sul: T,
        oracle: Q,
        config: LearningConfig,
    ) -> Self {
        Self {
            table: ObservationTable::new(alphabet),
            sul: SulAdapter::new(sul),
            oracle,
            config,
            phase: Phase::Init,
            hypothesis: None,
            cancel: None,
            iterations: 0,
            equivalence_rounds: 0,
            counterexamples: 0,
            started: None,
        }
    }

    /// Makes the session observe the given cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The phase the session is in.
    pub fn phase(&self) -> &Phase<T::Symbol> {
        &self.phase
    }

    /// The observation table of the session.
    pub fn table(&self) -> &ObservationTable<T::Symbol, T::Output> {
        &self.table
    }

    /// The most recently built hypothesis.
    pub fn hypothesis(&self) -> Option<&MealyMachine<T::Symbol, T::Output>> {
        self.hypothesis.as_ref()
    }

    /// Performs exactly one phase transition and returns the phase that was entered. Once
    /// [`Phase::Converged`] is reached, further calls do nothing. If the transition fails,
    /// the session stays in the phase it was in.
    pub fn step(&mut self) -> Result<&Phase<T::Symbol>, LearningError<T::Symbol, T::Output>> {
        let next = self.advance(self.phase.clone())?;
        trace!("entering phase {:?}", next);
        self.phase = next;
        Ok(&self.phase)
    }

    fn advance(
        &mut self,
        phase: Phase<T::Symbol>,
    ) -> Result<Phase<T::Symbol>, LearningError<T::Symbol, T::Output>> {
        Ok(match phase {
            Phase::Init => {
                self.started.get_or_insert_with(Instant::now);
                self.sul.pre()?;
                Phase::Filling
            }
            Phase::Filling => {
                self.table.fill(&mut self.sul)?;
                Phase::CheckInvariants
            }
            Phase::CheckInvariants => self.check_invariants()?,
            Phase::Refining(refinement) => {
                self.refine(refinement)?;
                Phase::Filling
            }
            Phase::BuildHypothesis => {
                let hypothesis = self.table.hypothesis()?;
                debug!("hypothesis has {} states", hypothesis.size());
                trace!("{}\n{:?}", "HYPOTHESIS".bold(), hypothesis);
                self.hypothesis = Some(hypothesis);
                Phase::Equivalence
            }
            Phase::Equivalence => self.equivalence()?,
            Phase::Converged => Phase::Converged,
        })
    }

    fn check_invariants(
        &mut self,
    ) -> Result<Phase<T::Symbol>, LearningError<T::Symbol, T::Output>> {
        self.iterations += 1;
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(LearningError::Cancelled {
                iterations: self.iterations,
            });
        }
        if self.iterations > self.config.max_iterations {
            return Err(LearningError::BudgetExceeded {
                iterations: self.config.max_iterations,
                partial: self.hypothesis.clone().map(Box::new),
            });
        }
        trace!(
            "{} {}\n{:?}",
            "ITERATION".bold().blue(),
            self.iterations,
            self.table
        );

        if let Some(row) = self.table.find_unclosed() {
            debug!("table is not closed, promoting {}", row.show());
            return Ok(Phase::Refining(Refinement::Promote(row)));
        }
        if let Some(experiment) = self.table.find_inconsistency() {
            debug!(
                "table is not consistent, adding experiment {}",
                experiment.symbols().show()
            );
            return Ok(Phase::Refining(Refinement::AddExperiment(experiment)));
        }
        Ok(Phase::BuildHypothesis)
    }

    fn refine(
        &mut self,
        refinement: Refinement<T::Symbol>,
    ) -> Result<(), LearningError<T::Symbol, T::Output>> {
        match refinement {
            Refinement::Promote(row) => {
                self.table.promote(&row);
            }
            Refinement::AddExperiment(experiment) => {
                self.table.add_experiment(experiment);
            }
            Refinement::Counterexample(word) => {
                let before = self.table.upper().len();
                self.table.process_counterexample(&word);
                if self.table.upper().len() <= before {
                    return Err(LearningError::StalledCounterexample { word });
                }
            }
        }
        Ok(())
    }

    fn equivalence(&mut self) -> Result<Phase<T::Symbol>, LearningError<T::Symbol, T::Output>> {
        let Some(hypothesis) = self.hypothesis.as_ref() else {
            return Ok(Phase::BuildHypothesis);
        };
        self.equivalence_rounds += 1;
        let found = self.oracle.find_counterexample(
            hypothesis,
            &mut self.sul,
            self.table.cache_mut(),
        )?;
        let Some(counterexample) = found else {
            return Ok(Phase::Converged);
        };

        // replay from reset, bypassing the cache, to make sure the mismatch is genuine
        let replayed = self.sul.query(&counterexample.input)?;
        let predicted = hypothesis.transform(&counterexample.input);
        if replayed != counterexample.observed || predicted.as_ref() == Some(&replayed) {
            return Err(LearningError::NonDeterministicSul {
                word: counterexample.input,
                cached: counterexample.observed,
                observed: replayed,
            });
        }

        self.counterexamples += 1;
        debug!(
            "found counterexample {}, hypothesis predicted {:?} but device produced {:?}",
            counterexample.input.show(),
            predicted,
            replayed
        );
        Ok(Phase::Refining(Refinement::Counterexample(
            counterexample.input,
        )))
    }

    fn stats(&self) -> LearningStats {
        let table = self.table.stats();
        let sul = self.sul.stats();
        LearningStats {
            membership_queries: table.membership_queries,
            cache_hits: table.cache_hits,
            sul_steps: sul.steps,
            sul_resets: sul.resets,
            equivalence_rounds: self.equivalence_rounds,
            counterexamples: self.counterexamples,
            iterations: self.iterations,
            duration: self.started.map(|s| s.elapsed()).unwrap_or_default(),
        }
    }

    /// Runs the session to completion. The device is reset afterwards, regardless of
    /// whether the session converged or failed.
    pub fn run(
        mut self,
    ) -> Result<LearningOutcome<T::Symbol, T::Output>, LearningError<T::Symbol, T::Output>> {
        info!("starting L* session");
        let result = self.drive();
        let post = self.sul.post();

        match result {
            Ok(hypothesis) => {
                post?;
                let stats = self.stats();
                info!(
                    "L* converged to {} states after {} iterations and {} counterexamples, took {}",
                    hypothesis.size(),
                    stats.iterations,
                    stats.counterexamples,
                    show_duration(stats.duration)
                );
                Ok(LearningOutcome { hypothesis, stats })
            }
            Err(e) => {
                if let Err(reset) = post {
                    warn!("could not reset device after failed session: {reset}");
                }
                if e.is_non_deterministic() {
                    error!("{e}");
                } else {
                    warn!("L* session aborted: {e}");
                }
                Err(e)
            }
        }
    }

    fn drive(
        &mut self,
    ) -> Result<MealyMachine<T::Symbol, T::Output>, LearningError<T::Symbol, T::Output>> {
        while self.step()? != &Phase::Converged {}
        self.hypothesis
            .take()
            .ok_or(LearningError::Construction(MealyError::NoStates))
    }
}

#[cfg(test)]
mod tests {
    use automata_core::{alphabet::CharAlphabet, prelude::*};

    use crate::{active::MealyOracle, LearningConfig, LearningError, OracleStrategy};

    use super::*;

    fn target() -> MealyMachine<char, u8> {
        MealyMachine::builder(CharAlphabet::of_size(3))
            .with_transitions([
                (0, 'a', 0, 0),
                (0, 'b', 1, 1),
                (0, 'c', 2, 2),
                (1, 'a', 2, 0),
                (1, 'b', 1, 1),
                (1, 'c', 2, 2),
                (2, 'a', 2, 2),
                (2, 'b', 0, 0),
                (2, 'c', 2, 1),
            ])
            .into_mealy(0)
            .unwrap()
    }

    #[test_log::test]
    fn lstar_mealy() {
        let target = target();
        let learned = LStar::with_oracle(
            target.alphabet().clone(),
            target.simulate(),
            MealyOracle::new(target.clone()),
            LearningConfig::default(),
        )
        .run()
        .unwrap();
        assert_eq!(learned.hypothesis.size(), 3);
        assert!(learned.hypothesis.bisimilar(&target));
    }

    #[test_log::test]
    fn lstar_with_random_oracles() {
        let target = target();
        for strategy in [
            OracleStrategy::random_walk(2000),
            OracleStrategy::random_words(300, 2, 6),
        ] {
            let config = LearningConfig::default().with_oracle(strategy).with_seed(11);
            let learned = LStar::new(target.alphabet().clone(), target.simulate(), config)
                .run()
                .unwrap();
            assert!(learned.hypothesis.bisimilar(&target));
            assert!(learned.stats.equivalence_rounds >= 1);
        }
    }

    #[test]
    fn phases_follow_the_state_machine() {
        let target = target();
        let mut lstar = LStar::with_oracle(
            target.alphabet().clone(),
            target.simulate(),
            MealyOracle::new(target.clone()),
            LearningConfig::default(),
        );
        assert_eq!(lstar.phase(), &Phase::Init);
        assert_eq!(lstar.step().unwrap(), &Phase::Filling);
        assert_eq!(lstar.step().unwrap(), &Phase::CheckInvariants);
        // ε and `a` agree, but `b` and `c` lead to new rows
        assert_eq!(
            lstar.step().unwrap(),
            &Phase::Refining(Refinement::Promote(vec!['b']))
        );
        assert_eq!(lstar.step().unwrap(), &Phase::Filling);

        let mut seen = vec![];
        while lstar.phase() != &Phase::Converged {
            let phase = lstar.step().unwrap().clone();
            if phase == Phase::BuildHypothesis {
                // closedness and consistency hold whenever a hypothesis is built
                assert!(lstar.table().is_closed());
                assert!(lstar.table().is_consistent());
            }
            seen.push(phase);
        }
        assert!(seen.contains(&Phase::Equivalence));
        assert_eq!(lstar.hypothesis().map(|h| h.size()), Some(3));
    }

    #[test]
    fn failed_steps_keep_the_phase() {
        use automata_core::vending::{reference_alphabet, FlakyVendingMachine, REFERENCE_PRICE};

        let sul = FlakyVendingMachine::new(REFERENCE_PRICE, 3);
        let mut lstar = LStar::new(reference_alphabet(), sul, LearningConfig::default());
        assert_eq!(lstar.step().unwrap(), &Phase::Filling);
        assert!(matches!(lstar.step(), Err(LearningError::Query(_))));
        assert_eq!(lstar.phase(), &Phase::Filling);
        // the device stays jammed, so does the session
        assert!(matches!(lstar.step(), Err(LearningError::Query(_))));
        assert_eq!(lstar.phase(), &Phase::Filling);
        assert!(lstar.hypothesis().is_none());
    }

    #[test]
    fn budget_is_enforced() {
        let target = target();
        let result = LStar::with_oracle(
            target.alphabet().clone(),
            target.simulate(),
            MealyOracle::new(target.clone()),
            LearningConfig::default().with_max_iterations(1),
        )
        .run();
        assert!(matches!(
            result,
            Err(LearningError::BudgetExceeded { iterations: 1, .. })
        ));
    }

    #[test]
    fn cancellation_is_observed() {
        let target = target();
        let token = CancellationToken::new();
        token.cancel();
        let result = LStar::new(
            target.alphabet().clone(),
            target.simulate(),
            LearningConfig::default(),
        )
        .with_cancellation(token)
        .run();
        assert!(matches!(result, Err(LearningError::Cancelled { iterations: 1 })));
    }
}
