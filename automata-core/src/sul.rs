use thiserror::Error;
use tracing::{debug, trace};

use crate::prelude::*;

/// Raised when the device under learning fails to perform a reset or a step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("query failed: {reason}")]
pub struct QueryFailure {
    reason: String,
}

impl QueryFailure {
    /// Creates a new failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason that was given by the failing device.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// A system under learning (SUL) is a black box that can be brought back to its initial
/// state and that reacts to a single input symbol with a single output.
///
/// The learner relies on the SUL being a deterministic Mealy machine: from the same reset
/// state the same inputs must always produce the same outputs. Implementations that
/// violate this are detected and reported by the learner, they are not assumed away.
pub trait Sul {
    /// The type of input symbols.
    type Symbol: Symbol;
    /// The type of observable outputs, which are only ever compared for equality.
    type Output: Color;

    /// Returns the device to its canonical initial state.
    fn reset(&mut self) -> Result<(), QueryFailure>;

    /// Applies exactly one symbol and returns the output the device produced.
    fn step(&mut self, symbol: &Self::Symbol) -> Result<Self::Output, QueryFailure>;
}

impl<T: Sul + ?Sized> Sul for &mut T {
    type Symbol = T::Symbol;
    type Output = T::Output;

    fn reset(&mut self) -> Result<(), QueryFailure> {
        T::reset(self)
    }

    fn step(&mut self, symbol: &Self::Symbol) -> Result<Self::Output, QueryFailure> {
        T::step(self, symbol)
    }
}

impl<T: Sul + ?Sized> Sul for Box<T> {
    type Symbol = T::Symbol;
    type Output = T::Output;

    fn reset(&mut self) -> Result<(), QueryFailure> {
        T::reset(self)
    }

    fn step(&mut self, symbol: &Self::Symbol) -> Result<Self::Output, QueryFailure> {
        T::step(self, symbol)
    }
}

/// Counts how often the wrapped device has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SulStats {
    /// Number of complete queries, i.e. a reset followed by a sequence of steps.
    pub queries: usize,
    /// Number of individual steps.
    pub steps: usize,
    /// Number of resets, including the ones before and after a session.
    pub resets: usize,
}

/// Wraps a [`Sul`] for the duration of a learning session. The adapter guarantees that the
/// device is reset right before the first query of a session ([`SulAdapter::pre`]) and
/// right after it ends ([`SulAdapter::post`]), since a device that keeps state across
/// sessions makes all outputs depend on the test history.
#[derive(Debug)]
pub struct SulAdapter<T> {
    sul: T,
    stats: SulStats,
}

impl<T: Sul> SulAdapter<T> {
    /// Wraps the given device.
    pub fn new(sul: T) -> Self {
        Self {
            sul,
            stats: SulStats::default(),
        }
    }

    /// Resets the device before the first query of a session.
    pub fn pre(&mut self) -> Result<(), QueryFailure> {
        self.reset()?;
        debug!("device reset before learning");
        Ok(())
    }

    /// Resets the device after a session ended, regardless of how it ended.
    pub fn post(&mut self) -> Result<(), QueryFailure> {
        self.reset()?;
        debug!("device reset after learning");
        Ok(())
    }

    /// Resets the device.
    pub fn reset(&mut self) -> Result<(), QueryFailure> {
        self.stats.resets += 1;
        self.sul.reset()
    }

    /// Performs a single step on the device.
    pub fn step(&mut self, symbol: &T::Symbol) -> Result<T::Output, QueryFailure> {
        self.stats.steps += 1;
        let output = self.sul.step(symbol)?;
        trace!("step {} produced {:?}", symbol.show(), output);
        Ok(output)
    }

    /// Performs a membership query: resets the device and then feeds it `word`,
    /// collecting one output per symbol.
    pub fn query(&mut self, word: &[T::Symbol]) -> Result<Vec<T::Output>, QueryFailure> {
        self.stats.queries += 1;
        self.reset()?;
        let outputs = word
            .iter()
            .map(|sym| self.step(sym))
            .collect::<Result<Vec<_>, _>>()?;
        trace!("query {} gave {:?}", word.show(), outputs);
        Ok(outputs)
    }

    /// Returns the usage statistics collected so far.
    pub fn stats(&self) -> SulStats {
        self.stats
    }

    /// Gives access to the wrapped device.
    pub fn inner(&self) -> &T {
        &self.sul
    }

    /// Consumes the adapter and returns the wrapped device.
    pub fn into_inner(self) -> T {
        self.sul
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    impl Sul for Counter {
        type Symbol = char;
        type Output = u32;

        fn reset(&mut self) -> Result<(), QueryFailure> {
            self.0 = 0;
            Ok(())
        }

        fn step(&mut self, symbol: &char) -> Result<u32, QueryFailure> {
            match symbol {
                'i' => self.0 += 1,
                'x' => return Err(QueryFailure::new("boom")),
                _ => {}
            }
            Ok(self.0)
        }
    }

    #[test_log::test]
    fn adapter_resets_and_counts() {
        let mut adapter = SulAdapter::new(Counter(7));
        adapter.pre().unwrap();
        assert_eq!(adapter.inner().0, 0);
        assert_eq!(adapter.query(&['i', 'i', 'n']).unwrap(), vec![1, 2, 2]);
        assert_eq!(adapter.query(&['i']).unwrap(), vec![1]);
        adapter.post().unwrap();
        assert_eq!(
            adapter.stats(),
            SulStats {
                queries: 2,
                steps: 4,
                resets: 4
            }
        );
    }

    #[test]
    fn adapter_surfaces_failures() {
        let mut adapter = SulAdapter::new(Counter(0));
        let err = adapter.query(&['i', 'x', 'i']).unwrap_err();
        assert_eq!(err.reason(), "boom");
        assert_eq!(adapter.stats().steps, 2);
    }
}
