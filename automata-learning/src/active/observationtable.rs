use automata_core::{prelude::*, word::extend};
use itertools::Itertools;
use tracing::{debug, trace};

use crate::LearningError;

use super::cache::{CacheConflict, QueryCache};

/// A suffix that labels a column of the [`ObservationTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Experiment<S>(pub(crate) Vec<S>);

impl<S> Experiment<S> {
    /// The symbols of the experiment.
    pub fn symbols(&self) -> &[S] {
        &self.0
    }

    /// The length of the experiment.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty experiment.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S> From<Vec<S>> for Experiment<S> {
    fn from(value: Vec<S>) -> Self {
        Self(value)
    }
}

/// The signature of a row: for each experiment, in the order of the experiments, the
/// outputs produced on that experiment after reading the row's access sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputRow<O>(pub(crate) Vec<Vec<O>>);

impl<O> OutputRow<O> {
    /// The cells of the row.
    pub fn cells(&self) -> &[Vec<O>] {
        &self.0
    }
}

/// Counts the membership queries a table has posed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Queries that had to be forwarded to the device.
    pub membership_queries: usize,
    /// Queries that were answered from the cache.
    pub cache_hits: usize,
}

/// The observation table of L*. Rows are labelled by access sequences and split into the
/// upper part `S` (which contains the empty word) and the lower part `S·Σ \ S` of one-symbol
/// extensions; columns are labelled by [`Experiment`]s `E`. The cell for a row `u` and an
/// experiment `e` holds the outputs the device produces on `e` after it has read `u`.
///
/// Rows, experiments and cells are only ever appended. Every filled cell is the exact
/// answer of the device, as recorded in the [`QueryCache`].
pub struct ObservationTable<S, O> {
    alphabet: Alphabet<S>,
    upper: Vec<Word<S>>,
    lower: Vec<Word<S>>,
    experiments: Vec<Experiment<S>>,
    rows: math::Map<Word<S>, OutputRow<O>>,
    cache: QueryCache<S, O>,
    stats: TableStats,
}

impl<S: Symbol, O: Color> ObservationTable<S, O> {
    /// Creates the initial table: `S = {ε}`, the lower part contains every symbol and the
    /// experiments are the empty word followed by every single symbol.
    pub fn new(alphabet: Alphabet<S>) -> Self {
        let lower = alphabet.universe().map(|sym| vec![sym.clone()]).collect();
        let experiments = std::iter::once(Experiment(vec![]))
            .chain(alphabet.universe().map(|sym| Experiment(vec![sym.clone()])))
            .collect();
        Self {
            alphabet,
            upper: vec![vec![]],
            lower,
            experiments,
            rows: math::Map::default(),
            cache: QueryCache::new(),
            stats: TableStats::default(),
        }
    }

    /// The alphabet of the table.
    pub fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    /// The access sequences in the upper part `S`.
    pub fn upper(&self) -> &[Word<S>] {
        &self.upper
    }

    /// The access sequences in the lower part.
    pub fn lower(&self) -> &[Word<S>] {
        &self.lower
    }

    /// The experiments `E`.
    pub fn experiments(&self) -> &[Experiment<S>] {
        &self.experiments
    }

    /// Gives access to the cache of all observations made so far.
    pub fn cache(&self) -> &QueryCache<S, O> {
        &self.cache
    }

    /// Mutable access to the cache, used to record observations made by oracles.
    pub fn cache_mut(&mut self) -> &mut QueryCache<S, O> {
        &mut self.cache
    }

    /// Query statistics of this table.
    pub fn stats(&self) -> TableStats {
        self.stats
    }

    /// Returns the signature of the row labelled with `word`. It is only complete if the
    /// table was filled after the last modification.
    pub fn signature(&self, word: &[S]) -> Option<&OutputRow<O>> {
        self.rows.get(word)
    }

    /// Returns true if `word` labels a row in the upper or lower part.
    pub fn has_row(&self, word: &[S]) -> bool {
        self.upper.iter().chain(self.lower.iter()).any(|w| w == word)
    }

    /// The output the device produces on `symbol` after reading `row`, read off the
    /// column of the single-symbol experiment.
    pub fn output(&self, row: &[S], symbol: &S) -> Option<&O> {
        let column = self
            .experiments
            .iter()
            .position(|e| e.0.len() == 1 && &e.0[0] == symbol)?;
        self.rows.get(row)?.0.get(column)?.first()
    }

    /// Returns true if every row has a cell for every experiment.
    pub fn is_filled(&self) -> bool {
        self.upper.iter().chain(self.lower.iter()).all(|w| {
            self.rows
                .get(w)
                .map(|row| row.0.len() == self.experiments.len())
                .unwrap_or(false)
        })
    }

    /// Poses the membership query `row ++ suffix` and returns the outputs produced on the
    /// `suffix` part. Answers are taken from the cache if possible, otherwise the device is
    /// reset, fed the whole word and the result is recorded.
    pub fn query<T>(
        &mut self,
        sul: &mut SulAdapter<T>,
        row: &[S],
        suffix: &[S],
    ) -> Result<Vec<O>, LearningError<S, O>>
    where
        T: Sul<Symbol = S, Output = O>,
    {
        let word = Concat(row, suffix).into_vec();
        let outputs = match self.cache.lookup(&word) {
            Some(outputs) => {
                self.stats.cache_hits += 1;
                outputs
            }
            None => {
                self.stats.membership_queries += 1;
                let outputs = sul.query(&word)?;
                self.record(&word, &outputs)?;
                outputs
            }
        };
        Ok(outputs[row.len()..].to_vec())
    }

    /// Records an observation of the device in the cache. Fails if it contradicts an
    /// earlier observation.
    pub fn record(&mut self, word: &[S], outputs: &[O]) -> Result<(), LearningError<S, O>> {
        self.cache.insert(word, outputs).map_err(LearningError::from)
    }

    /// Performs all outstanding membership queries, so that afterwards every row has a cell
    /// for every experiment. Returns the number of cells that were filled.
    pub fn fill<T>(&mut self, sul: &mut SulAdapter<T>) -> Result<usize, LearningError<S, O>>
    where
        T: Sul<Symbol = S, Output = O>,
    {
        let experiment_count = self.experiments.len();
        let pending = self
            .upper
            .iter()
            .chain(self.lower.iter())
            .flat_map(|w| {
                let stored = self.rows.get(w).map(|r| r.0.len()).unwrap_or(0);
                (stored..experiment_count).map(move |i| (w.clone(), i))
            })
            .collect_vec();

        let filled = pending.len();
        for (word, i) in pending {
            let suffix = self.experiments[i].0.clone();
            let cell = self.query(sul, &word, &suffix)?;
            trace!(
                "cell ({}, {}) is {:?}",
                word.show(),
                suffix.show(),
                cell
            );
            let row = self.rows.entry(word).or_insert_with(|| OutputRow(vec![]));
            debug_assert_eq!(row.0.len(), i, "cells must be filled in order");
            row.0.push(cell);
        }

        if cfg!(debug_assertions) && !self.is_filled() {
            panic!("table is not filled after filling it:\n{:?}", self);
        }
        debug!("filled {filled} cells");
        Ok(filled)
    }

    /// Checks closedness: every row of the lower part must have the signature of some row of
    /// the upper part. Returns the first lower row (in insertion order) that violates this.
    pub fn find_unclosed(&self) -> Option<Word<S>> {
        let known: math::Set<_> = self
            .upper
            .iter()
            .filter_map(|w| self.rows.get(w))
            .collect();
        self.lower
            .iter()
            .find(|w| self.rows.get(*w).map_or(false, |row| !known.contains(row)))
            .cloned()
    }

    /// Checks consistency: any two upper rows with the same signature must have one-symbol
    /// extensions with the same signatures. On a violation, the distinguishing experiment
    /// `σ·e` is returned, where `(σ, e)` is the first disagreeing pair in alphabet order
    /// times experiment order.
    pub fn find_inconsistency(&self) -> Option<Experiment<S>> {
        for (i, left) in self.upper.iter().enumerate() {
            'right: for right in &self.upper[(i + 1)..] {
                if self.rows.get(left) != self.rows.get(right) {
                    continue 'right;
                }
                for sym in self.alphabet.universe() {
                    let (Some(l), Some(r)) = (
                        self.rows.get(&extend(left, sym)),
                        self.rows.get(&extend(right, sym)),
                    ) else {
                        continue;
                    };
                    if let Some((_, e)) = l
                        .0
                        .iter()
                        .zip(r.0.iter())
                        .zip(self.experiments.iter())
                        .find(|((lc, rc), _)| lc != rc)
                    {
                        let distinguishing = Experiment(Concat(&[sym.clone()], &e.0).into_vec());
                        trace!(
                            "rows {} and {} are inconsistent, adding {}",
                            left.show(),
                            right.show(),
                            distinguishing.0.show()
                        );
                        return Some(distinguishing);
                    }
                }
            }
        }
        None
    }

    /// Returns true if the table is closed.
    pub fn is_closed(&self) -> bool {
        self.find_unclosed().is_none()
    }

    /// Returns true if the table is consistent.
    pub fn is_consistent(&self) -> bool {
        self.find_inconsistency().is_none()
    }

    /// Moves `word` into the upper part and adds its one-symbol extensions to the lower part.
    /// Returns false if `word` already was in the upper part.
    pub fn promote(&mut self, word: &[S]) -> bool {
        if self.upper.iter().any(|w| w == word) {
            return false;
        }
        self.lower.retain(|w| w != word);
        self.upper.push(word.to_vec());
        let extensions = self
            .alphabet
            .universe()
            .map(|sym| extend(word, sym))
            .collect_vec();
        for extension in extensions {
            if !self.has_row(&extension) {
                self.lower.push(extension);
            }
        }
        true
    }

    /// Adds a new experiment. Returns false if it was already present.
    pub fn add_experiment(&mut self, experiment: Experiment<S>) -> bool {
        if self.experiments.contains(&experiment) {
            return false;
        }
        self.experiments.push(experiment);
        true
    }

    /// Processes a counterexample by adding every prefix of it (including itself) to the
    /// upper part. Returns the number of access sequences that were added.
    pub fn process_counterexample(&mut self, word: &[S]) -> usize {
        let added = automata_core::word::prefixes(word)
            .map(|prefix| self.promote(prefix))
            .filter(|added| *added)
            .count();
        debug!(
            "counterexample {} added {added} access sequences",
            word.show()
        );
        added
    }
}

impl<S: Symbol, O: Color> From<CacheConflict<S, O>> for LearningError<S, O> {
    fn from(value: CacheConflict<S, O>) -> Self {
        LearningError::NonDeterministicSul {
            word: value.word,
            cached: value.cached,
            observed: value.observed,
        }
    }
}

impl<S: Symbol, O: Color> std::fmt::Debug for ObservationTable<S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        let mut header = vec!["".to_string()];
        header.extend(self.experiments.iter().map(|e| e.0.show()));
        builder.push_record(header);

        for (marker, word) in self
            .upper
            .iter()
            .map(|w| ("S", w))
            .chain(self.lower.iter().map(|w| ("SΣ", w)))
        {
            let mut record = vec![format!("{marker} {}", word.show())];
            if let Some(row) = self.rows.get(word) {
                record.extend(row.0.iter().map(|cell| format!("{cell:?}")));
            }
            record.resize(self.experiments.len() + 1, String::new());
            builder.push_record(record);
        }

        write!(f, "{}", builder.build())
    }
}

#[cfg(test)]
mod tests {
    use automata_core::{alphabet::CharAlphabet, prelude::*};

    use super::*;

    // counts the a's modulo 2 and outputs the parity on b
    fn parity() -> MealyMachine<char, u8> {
        MealyMachine::builder(CharAlphabet::of_size(2))
            .with_transitions([(0, 'a', 0, 1), (0, 'b', 0, 0), (1, 'a', 0, 0), (1, 'b', 1, 1)])
            .into_mealy(0)
            .unwrap()
    }

    #[test_log::test]
    fn initial_table_is_filled_and_unclosed() {
        let target = parity();
        let mut sul = SulAdapter::new(target.simulate());
        let mut table = ObservationTable::new(target.alphabet().clone());
        assert_eq!(table.experiments().len(), 3);
        assert_eq!(table.lower().len(), 2);

        let filled = table.fill(&mut sul).unwrap();
        assert_eq!(filled, 9);
        assert!(table.is_filled());
        // filling twice does not pose any query
        assert_eq!(table.fill(&mut sul).unwrap(), 0);
        assert_eq!(table.output(&[], &'b'), Some(&0));
        assert_eq!(table.output(&['a'], &'b'), Some(&1));

        assert_eq!(table.find_unclosed(), Some(vec!['a']));
        assert!(table.promote(&['a']));
        assert!(!table.promote(&['a']));
        table.fill(&mut sul).unwrap();
        assert!(table.is_closed());
        assert!(table.is_consistent());
        assert_eq!(table.upper().len(), 2);
        assert_eq!(table.lower(), &[vec!['b'], vec!['a', 'a'], vec!['a', 'b']]);
    }

    #[test]
    fn cached_queries_do_not_reach_the_device() {
        let target = parity();
        let mut sul = SulAdapter::new(target.simulate());
        let mut table = ObservationTable::new(target.alphabet().clone());
        assert_eq!(table.query(&mut sul, &['a', 'a'], &['b']).unwrap(), vec![0]);
        assert_eq!(table.query(&mut sul, &['a'], &['a']).unwrap(), vec![0]);
        assert_eq!(table.query(&mut sul, &[], &['a', 'a', 'b']).unwrap(), vec![0, 0, 0]);
        assert_eq!(table.stats().membership_queries, 1);
        assert_eq!(table.stats().cache_hits, 2);
        assert_eq!(sul.stats().queries, 1);
    }

    #[test]
    fn counterexamples_add_all_prefixes() {
        let target = parity();
        let mut table: ObservationTable<char, u8> =
            ObservationTable::new(target.alphabet().clone());
        let added = table.process_counterexample(&['b', 'a', 'b']);
        // ε is already present
        assert_eq!(added, 3);
        assert_eq!(
            table.upper(),
            &[vec![], vec!['b'], vec!['b', 'a'], vec!['b', 'a', 'b']]
        );
        assert!(table.lower().iter().all(|w| !table.upper().contains(w)));
        assert_eq!(table.process_counterexample(&['b', 'a']), 0);
    }

    #[test]
    fn inconsistency_yields_distinguishing_experiment() {
        // state 2 can only be told apart from 0 by reading `b` twice
        let target: MealyMachine<char, u8> = MealyMachine::builder(CharAlphabet::of_size(2))
            .with_transitions([
                (0, 'a', 0, 0),
                (0, 'b', 0, 1),
                (1, 'a', 0, 0),
                (1, 'b', 0, 2),
                (2, 'a', 0, 0),
                (2, 'b', 1, 0),
            ])
            .into_mealy(0)
            .unwrap();
        let mut sul = SulAdapter::new(target.simulate());
        let mut table = ObservationTable::new(target.alphabet().clone());
        table.process_counterexample(&['b', 'b', 'b']);
        table.fill(&mut sul).unwrap();
        // ε and b have equal signatures, but bb and b differ in the b column
        assert_eq!(table.signature(&[]), table.signature(&['b']));
        assert_eq!(table.find_inconsistency(), Some(Experiment(vec!['b', 'b'])));
        assert!(table.add_experiment(Experiment(vec!['b', 'b'])));
        table.fill(&mut sul).unwrap();
        assert_ne!(table.signature(&[]), table.signature(&['b']));
    }

    #[test]
    fn conflicting_observations_are_rejected() {
        let target = parity();
        let mut table = ObservationTable::new(target.alphabet().clone());
        table.record(&['a', 'b'], &[0, 1]).unwrap();
        let err = table.record(&['a', 'b'], &[0, 0]).unwrap_err();
        assert!(err.is_non_deterministic());
    }
}
