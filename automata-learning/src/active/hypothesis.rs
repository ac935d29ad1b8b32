use automata_core::{mealy::MealyError, prelude::*, show_duration, word::extend};
use tracing::debug;

use super::{ObservationTable, OutputRow};

impl<S: Symbol, O: Color> ObservationTable<S, O> {
    /// Builds the hypothesis of the table. Upper rows are grouped by signature into states,
    /// the representative of a state being the first upper row with that signature. The
    /// transition of a state on `σ` leads to the state whose signature is that of
    /// `representative · σ` and emits the output recorded for `(representative, σ)`.
    ///
    /// The result is total if the table is closed and minimal if it is consistent, both
    /// should therefore be established before calling this. A table that is not closed
    /// produces [`MealyError::Incomplete`].
    pub fn hypothesis(&self) -> Result<MealyMachine<S, O>, MealyError> {
        let start = std::time::Instant::now();
        let mut states: math::Bijection<StateIndex, &OutputRow<O>> = math::Bijection::new();
        let mut representatives: Vec<&Word<S>> = vec![];

        for mr in self.upper() {
            let Some(signature) = self.signature(mr) else {
                return Err(MealyError::Incomplete {
                    state: representatives.len(),
                    symbol: mr.show(),
                });
            };
            if !states.contains_right(&signature) {
                states.insert(representatives.len(), signature);
                representatives.push(mr);
            }
        }

        let initial = self
            .signature(&[])
            .and_then(|sig| states.get_by_right(&sig))
            .copied()
            .ok_or(MealyError::NoStates)?;

        let mut edges = Vec::with_capacity(representatives.len());
        for (state, mr) in representatives.iter().enumerate() {
            let mut row = Vec::with_capacity(self.alphabet().size());
            for sym in self.alphabet().universe() {
                let incomplete = || MealyError::Incomplete {
                    state,
                    symbol: sym.show(),
                };
                let target = self
                    .signature(&extend(mr, sym))
                    .and_then(|sig| states.get_by_right(&sig))
                    .copied()
                    .ok_or_else(incomplete)?;
                let output = self.output(mr, sym).cloned().ok_or_else(incomplete)?;
                row.push((target, output));
            }
            edges.push(row);
        }

        debug!(
            "building hypothesis with {} states took {}",
            representatives.len(),
            show_duration(start.elapsed())
        );
        MealyMachine::from_parts(self.alphabet().clone(), initial, edges)
    }
}

#[cfg(test)]
mod tests {
    use automata_core::{alphabet::CharAlphabet, prelude::*};

    use crate::active::ObservationTable;

    #[test_log::test]
    fn hypothesis_of_closed_table() {
        let target: MealyMachine<char, u8> = MealyMachine::builder(CharAlphabet::of_size(2))
            .with_transitions([(0, 'a', 0, 1), (0, 'b', 0, 0), (1, 'a', 0, 0), (1, 'b', 1, 1)])
            .into_mealy(0)
            .unwrap();
        let mut sul = SulAdapter::new(target.simulate());
        let mut table = ObservationTable::new(target.alphabet().clone());
        table.fill(&mut sul).unwrap();

        // not closed yet, `a` leads to an unknown signature
        assert!(table.hypothesis().is_err());

        table.promote(&['a']);
        table.fill(&mut sul).unwrap();
        let hypothesis = table.hypothesis().unwrap();
        assert_eq!(hypothesis.size(), 2);
        assert_eq!(hypothesis.initial(), 0);
        assert!(hypothesis.bisimilar(&target));
    }

    #[test]
    fn single_state_hypothesis() {
        let target: MealyMachine<char, u8> = MealyMachine::builder(CharAlphabet::of_size(2))
            .with_transitions([(0, 'a', 3, 0), (0, 'b', 4, 0)])
            .into_mealy(0)
            .unwrap();
        let mut sul = SulAdapter::new(target.simulate());
        let mut table = ObservationTable::new(target.alphabet().clone());
        table.fill(&mut sul).unwrap();
        assert!(table.is_closed() && table.is_consistent());
        let hypothesis = table.hypothesis().unwrap();
        assert_eq!(hypothesis.size(), 1);
        assert_eq!(hypothesis.transform(&['a', 'b', 'a']), Some(vec![3, 4, 3]));
    }
}
