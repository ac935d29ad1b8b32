use automata_core::{mealy::MealyError, prelude::*};
use thiserror::Error;

/// Everything that can end a learning session prematurely. Failures are always local to
/// the session of one device, they never affect sessions of other devices.
#[derive(Debug, Error)]
pub enum LearningError<S: Symbol, O: Color> {
    /// The device raised an error during a reset or a step.
    #[error(transparent)]
    Query(#[from] QueryFailure),
    /// Replaying the same input sequence from reset produced different outputs. This
    /// violates the central assumption of the learner, the session cannot continue.
    #[error(
        "non-deterministic SUL: {} produced {:?} before and {:?} now",
        .word.show(),
        .cached,
        .observed
    )]
    NonDeterministicSul {
        /// The input sequence on which the outputs differ.
        word: Word<S>,
        /// The outputs that were recorded first.
        cached: Vec<O>,
        /// The outputs that were observed later.
        observed: Vec<O>,
    },
    /// The configured maximum number of iterations was reached without convergence.
    #[error("learning did not converge within {iterations} iterations")]
    BudgetExceeded {
        /// The number of iterations that were performed.
        iterations: usize,
        /// The last hypothesis that was built, if any.
        partial: Option<Box<MealyMachine<S, O>>>,
    },
    /// The session was cancelled from the outside between two iterations.
    #[error("learning was cancelled after {iterations} iterations")]
    Cancelled {
        /// The number of iterations that were performed.
        iterations: usize,
    },
    /// A counterexample was processed but did not add a new access sequence. For a
    /// deterministic device this cannot happen.
    #[error("counterexample {} did not refine the observation table", .word.show())]
    StalledCounterexample {
        /// The offending counterexample.
        word: Word<S>,
    },
    /// The observation table did not give rise to a total machine.
    #[error("could not construct hypothesis: {0}")]
    Construction(#[from] MealyError),
}

impl<S: Symbol, O: Color> LearningError<S, O> {
    /// Returns true if this error signals that the device behaves non-deterministically.
    pub fn is_non_deterministic(&self) -> bool {
        matches!(
            self,
            Self::NonDeterministicSul { .. } | Self::StalledCounterexample { .. }
        )
    }

    /// A short name of the kind of failure, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Query(_) => "QueryFailure",
            Self::NonDeterministicSul { .. } => "NonDeterministicSUL",
            Self::BudgetExceeded { .. } => "LearningBudgetExceeded",
            Self::Cancelled { .. } => "Cancelled",
            Self::StalledCounterexample { .. } => "NonDeterministicSUL",
            Self::Construction(_) => "Construction",
        }
    }
}
