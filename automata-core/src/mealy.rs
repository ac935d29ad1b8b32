use std::collections::VecDeque;

use itertools::Itertools;
use thiserror::Error;

use crate::{alphabet::Alphabet, math, prelude::*};

/// States of a [`MealyMachine`] are identified by dense indices starting at zero.
pub type StateIndex = usize;

/// Raised when the parts given to build a [`MealyMachine`] do not form a total,
/// deterministic machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MealyError {
    /// The machine needs at least one state.
    #[error("a Mealy machine needs at least one state")]
    NoStates,
    /// The initial state does not exist.
    #[error("initial state {0} does not exist")]
    MissingInitial(StateIndex),
    /// Some state has no transition for some symbol.
    #[error("state {state} has no transition on {symbol}")]
    Incomplete {
        /// The state that lacks a transition.
        state: StateIndex,
        /// Displayed form of the symbol that is missing.
        symbol: String,
    },
    /// Some state has two transitions on the same symbol.
    #[error("state {state} has more than one transition on {symbol}")]
    Nondeterministic {
        /// The offending state.
        state: StateIndex,
        /// Displayed form of the duplicated symbol.
        symbol: String,
    },
    /// A transition uses a symbol that is not part of the alphabet.
    #[error("symbol {0} is not part of the alphabet")]
    UnknownSymbol(String),
    /// A transition leads to a state that does not exist.
    #[error("transition leads to non-existent state {0}")]
    DanglingTarget(StateIndex),
}

/// A deterministic and complete Mealy machine. Every state has exactly one transition for
/// every symbol of the alphabet, and every transition carries an output. Running the machine
/// on a word of length `n` therefore produces exactly `n` outputs.
///
/// Learned hypotheses are represented by this type. Instances are immutable once built; to
/// run one as if it were a device, use [`MealyMachine::simulate`].
#[derive(Clone, PartialEq, Eq)]
pub struct MealyMachine<S, O> {
    alphabet: Alphabet<S>,
    initial: StateIndex,
    // edges[q][i] is the transition of state q on the i-th symbol of the alphabet
    edges: Vec<Vec<(StateIndex, O)>>,
}

impl<S: Symbol, O: Color> MealyMachine<S, O> {
    /// Builds a machine from a table which gives, for each state and in alphabet order, the
    /// target state and the output of the transition.
    pub fn from_parts(
        alphabet: Alphabet<S>,
        initial: StateIndex,
        edges: Vec<Vec<(StateIndex, O)>>,
    ) -> Result<Self, MealyError> {
        if edges.is_empty() {
            return Err(MealyError::NoStates);
        }
        if initial >= edges.len() {
            return Err(MealyError::MissingInitial(initial));
        }
        for (state, row) in edges.iter().enumerate() {
            if row.len() < alphabet.size() {
                return Err(MealyError::Incomplete {
                    state,
                    symbol: alphabet[row.len()].show(),
                });
            }
            if row.len() > alphabet.size() {
                return Err(MealyError::Nondeterministic {
                    state,
                    symbol: "?".to_string(),
                });
            }
            if let Some((target, _)) = row.iter().find(|(t, _)| *t >= edges.len()) {
                return Err(MealyError::DanglingTarget(*target));
            }
        }
        Ok(Self {
            alphabet,
            initial,
            edges,
        })
    }

    /// Starts building a machine over the given alphabet.
    pub fn builder(alphabet: Alphabet<S>) -> MealyBuilder<S, O> {
        MealyBuilder::new(alphabet)
    }

    /// The alphabet the machine reads.
    pub fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    /// The number of states.
    pub fn size(&self) -> usize {
        self.edges.len()
    }

    /// The initial state.
    pub fn initial(&self) -> StateIndex {
        self.initial
    }

    /// Iterates over all state indices.
    pub fn state_indices(&self) -> std::ops::Range<StateIndex> {
        0..self.size()
    }

    /// Takes the transition of `state` on `symbol` and returns the reached state together
    /// with the emitted output. Returns `None` if the state does not exist or the symbol
    /// is not part of the alphabet.
    pub fn step(&self, state: StateIndex, symbol: &S) -> Option<(StateIndex, &O)> {
        let position = self.alphabet.index_of(symbol)?;
        self.edges
            .get(state)
            .map(|row| &row[position])
            .map(|(target, output)| (*target, output))
    }

    /// Returns the state that is reached from `state` on `symbol`.
    pub fn successor(&self, state: StateIndex, symbol: &S) -> Option<StateIndex> {
        self.step(state, symbol).map(|(target, _)| target)
    }

    /// Returns the state that is reached by reading `word` from the initial state.
    pub fn reached_state(&self, word: &[S]) -> Option<StateIndex> {
        self.reached_state_from(self.initial, word)
    }

    /// Returns the state that is reached by reading `word` from `source`.
    pub fn reached_state_from(&self, source: StateIndex, word: &[S]) -> Option<StateIndex> {
        word.iter()
            .try_fold(source, |state, sym| self.successor(state, sym))
    }

    /// Runs the machine on `word` from the initial state and returns one output per symbol.
    pub fn transform(&self, word: &[S]) -> Option<Vec<O>> {
        self.transform_from(self.initial, word)
    }

    /// Runs the machine on `word` from `source` and returns one output per symbol.
    pub fn transform_from(&self, source: StateIndex, word: &[S]) -> Option<Vec<O>> {
        let mut state = source;
        let mut outputs = Vec::with_capacity(word.len());
        for sym in word {
            let (target, output) = self.step(state, sym)?;
            outputs.push(output.clone());
            state = target;
        }
        Some(outputs)
    }

    /// Returns the output of the last transition that is taken on `word`, which is `None`
    /// for the empty word.
    pub fn last_output(&self, word: &[S]) -> Option<O> {
        let (last, prefix) = word.split_last()?;
        let state = self.reached_state(prefix)?;
        self.step(state, last).map(|(_, output)| output.clone())
    }

    /// Iterates over all transitions as tuples `(source, symbol, output, target)`. This is
    /// the form in which learned models are handed to external visualisers.
    pub fn transitions(&self) -> impl Iterator<Item = (StateIndex, &S, &O, StateIndex)> + '_ {
        self.edges.iter().enumerate().flat_map(move |(source, row)| {
            row.iter()
                .zip(self.alphabet.universe())
                .map(move |((target, output), sym)| (source, sym, output, *target))
        })
    }

    /// Returns a vector over all distinct outputs that the machine can emit on reachable
    /// transitions.
    pub fn output_range(&self) -> Vec<O> {
        self.reachable_states()
            .into_iter()
            .flat_map(|q| self.edges[q].iter().map(|(_, o)| o.clone()))
            .unique()
            .collect()
    }

    /// Computes the set of states reachable from the initial state.
    pub fn reachable_states(&self) -> math::Set<StateIndex> {
        let mut seen = math::Set::from_iter([self.initial]);
        let mut queue = VecDeque::from([self.initial]);
        while let Some(q) = queue.pop_front() {
            for (target, _) in &self.edges[q] {
                if seen.insert(*target) {
                    queue.push_back(*target);
                }
            }
        }
        seen
    }

    /// Attempts to construct a word that separates the two machines, meaning
    /// it produces different outputs when run in both machines. The search is breadth-first
    /// over the product of both machines, so the returned word is a shortest witness.
    /// If no such word exists, the function returns `None`. Symbols that only one of the
    /// machines knows are considered separating as well.
    pub fn witness_inequivalence(&self, other: &MealyMachine<S, O>) -> Option<Word<S>> {
        if let Some(sym) = self
            .alphabet
            .universe()
            .chain(other.alphabet.universe())
            .find(|sym| !self.alphabet.contains(sym) || !other.alphabet.contains(sym))
        {
            return Some(vec![sym.clone()]);
        }

        let start = (self.initial, other.initial);
        let mut access: math::Map<(StateIndex, StateIndex), Word<S>> = math::Map::default();
        access.insert(start, vec![]);
        let mut queue = VecDeque::from([start]);

        while let Some((l, r)) = queue.pop_front() {
            let word = access.get(&(l, r)).cloned().unwrap_or_default();
            for sym in self.alphabet.universe() {
                let (lt, lo) = self.step(l, sym)?;
                let (rt, ro) = other.step(r, sym)?;
                let extended = crate::word::extend(&word, sym);
                if lo != ro {
                    return Some(extended);
                }
                if !access.contains_key(&(lt, rt)) {
                    access.insert((lt, rt), extended);
                    queue.push_back((lt, rt));
                }
            }
        }
        None
    }

    /// Returns true if and only if both machines are bisimilar, meaning for all possible
    /// inputs, they will produce the same output.
    pub fn bisimilar(&self, other: &MealyMachine<S, O>) -> bool {
        self.witness_inequivalence(other).is_none()
    }

    /// Creates a cursor that runs this machine through the [`Sul`] interface.
    pub fn simulate(&self) -> Simulation<'_, S, O> {
        Simulation {
            machine: self,
            state: self.initial,
        }
    }
}

impl<S: Symbol, O: Color> std::fmt::Debug for MealyMachine<S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        let mut header = vec!["state".to_string()];
        header.extend(self.alphabet.universe().map(|sym| sym.show()));
        builder.push_record(header);

        for (q, row) in self.edges.iter().enumerate() {
            let mut record = vec![if q == self.initial {
                format!("→q{q}")
            } else {
                format!("q{q}")
            }];
            record.extend(
                row.iter()
                    .map(|(target, output)| format!("q{target} | {output:?}")),
            );
            builder.push_record(record);
        }

        write!(f, "{}", builder.build())
    }
}

/// Runs a [`MealyMachine`] through the [`Sul`] interface, which allows to learn, test or
/// difference a model exactly like a real device.
#[derive(Clone)]
pub struct Simulation<'a, S, O> {
    machine: &'a MealyMachine<S, O>,
    state: StateIndex,
}

impl<S: Symbol, O: Color> std::fmt::Debug for Simulation<'_, S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("size", &self.machine.size())
            .field("state", &self.state)
            .finish()
    }
}

impl<S: Symbol, O: Color> Simulation<'_, S, O> {
    /// The state the simulation currently is in.
    pub fn state(&self) -> StateIndex {
        self.state
    }
}

impl<S: Symbol, O: Color> Sul for Simulation<'_, S, O> {
    type Symbol = S;
    type Output = O;

    fn reset(&mut self) -> Result<(), QueryFailure> {
        self.state = self.machine.initial;
        Ok(())
    }

    fn step(&mut self, symbol: &S) -> Result<O, QueryFailure> {
        let (target, output) = self.machine.step(self.state, symbol).ok_or_else(|| {
            QueryFailure::new(format!("symbol {} is not part of the alphabet", symbol.show()))
        })?;
        self.state = target;
        Ok(output.clone())
    }
}

/// Helper for building [`MealyMachine`]s from transition tuples of the form
/// `(source, symbol, output, target)`.
#[derive(Clone)]
pub struct MealyBuilder<S, O> {
    alphabet: Alphabet<S>,
    transitions: Vec<(StateIndex, S, O, StateIndex)>,
}

impl<S: Symbol, O: Color> std::fmt::Debug for MealyBuilder<S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MealyBuilder")
            .field("alphabet", &self.alphabet)
            .field("transitions", &self.transitions)
            .finish()
    }
}

impl<S: Symbol, O: Color> MealyBuilder<S, O> {
    /// Creates an empty builder for the given alphabet.
    pub fn new(alphabet: Alphabet<S>) -> Self {
        Self {
            alphabet,
            transitions: vec![],
        }
    }

    /// Adds the given transitions.
    pub fn with_transitions<I: IntoIterator<Item = (StateIndex, S, O, StateIndex)>>(
        mut self,
        transitions: I,
    ) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Builds the machine with `initial` as its initial state. The number of states is
    /// one more than the largest state index mentioned in any transition.
    pub fn into_mealy(self, initial: StateIndex) -> Result<MealyMachine<S, O>, MealyError> {
        let size = self
            .transitions
            .iter()
            .map(|(source, _, _, target)| std::cmp::max(*source, *target) + 1)
            .max()
            .unwrap_or(0);
        let mut rows: Vec<Vec<Option<(StateIndex, O)>>> =
            vec![vec![None; self.alphabet.size()]; size];

        for (source, sym, output, target) in self.transitions {
            let position = self
                .alphabet
                .index_of(&sym)
                .ok_or_else(|| MealyError::UnknownSymbol(sym.show()))?;
            if rows[source][position].replace((target, output)).is_some() {
                return Err(MealyError::Nondeterministic {
                    state: source,
                    symbol: sym.show(),
                });
            }
        }

        let edges = rows
            .into_iter()
            .enumerate()
            .map(|(state, row)| {
                row.into_iter()
                    .enumerate()
                    .map(|(position, edge)| {
                        edge.ok_or_else(|| MealyError::Incomplete {
                            state,
                            symbol: self.alphabet[position].show(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        MealyMachine::from_parts(self.alphabet, initial, edges)
    }
}
