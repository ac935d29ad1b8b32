/// A prefix tree that remembers every answer the device gave.
pub mod cache;
pub use cache::{CacheConflict, QueryCache};

mod observationtable;
pub use observationtable::{Experiment, ObservationTable, OutputRow, TableStats};

mod hypothesis;

pub(crate) mod oracle;
pub use oracle::*;

mod lstar;
pub use lstar::*;

mod campaign;
pub use campaign::{Campaign, SessionReport};

#[cfg(test)]
mod tests {
    use automata_core::{prelude::*, vending::*};
    use itertools::Itertools;

    use super::{EquivalenceOracle, LStar, Phase, QueryCache, RandomWalkOracle, Refinement};
    use crate::{LearningConfig, LearningError, OracleStrategy};

    fn config() -> LearningConfig {
        LearningConfig::default()
            .with_oracle(OracleStrategy::random_words(300, 2, 7))
            .with_seed(5)
    }

    #[test_log::test]
    fn forgetful_machine_has_a_single_state() {
        let learned = LStar::new(reference_alphabet(), ForgetfulVendingMachine, config())
            .run()
            .unwrap();
        assert_eq!(learned.hypothesis.size(), 1);

        // no budget uncovers anything once the model has converged
        for (steps, seed) in [(100, 1), (5000, 2), (20000, 3)] {
            let mut oracle = RandomWalkOracle::new(steps, 0.09, seed);
            let mut sul = SulAdapter::new(ForgetfulVendingMachine);
            let mut cache = QueryCache::new();
            assert_eq!(
                oracle
                    .find_counterexample(&learned.hypothesis, &mut sul, &mut cache)
                    .unwrap(),
                None
            );
        }
    }

    #[test_log::test]
    fn correct_machine_tracks_its_balance() {
        let learned = LStar::new(reference_alphabet(), VendingMachine::default(), config())
            .run()
            .unwrap();
        // balances 0, 0.5, 1, 1.5 and at least 2
        assert_eq!(learned.hypothesis.size(), 5);
        let input = vec![VendingSymbol::coin(1.0), VendingSymbol::button("coke")];
        assert_eq!(
            learned.hypothesis.transform(&input),
            Some(vec![VendingOutput::Ack, VendingOutput::Insufficient])
        );
    }

    #[test_log::test]
    fn off_by_one_machine_has_fewer_states() {
        let sul = VendingMachine::with_threshold(REFERENCE_PRICE, 100);
        let learned = LStar::new(reference_alphabet(), sul, config()).run().unwrap();
        assert_eq!(learned.hypothesis.size(), 3);
    }

    #[test_log::test]
    fn leaky_reset_is_flagged() {
        let input = vec![VendingSymbol::coin(1.0), VendingSymbol::coin(1.0)];
        let mut sul = SulAdapter::new(LeakyVendingMachine::default());
        let mut cache = QueryCache::new();
        let first = sul.query(&input).unwrap();
        cache.insert(&input, &first).unwrap();
        let second = sul.query(&input).unwrap();
        assert_ne!(first, second);
        assert!(cache.insert(&input, &second).is_err());

        let result = LStar::new(
            reference_alphabet(),
            LeakyVendingMachine::default(),
            config(),
        )
        .run();
        assert!(matches!(result, Err(LearningError::NonDeterministicSul { .. })));
    }

    #[test]
    fn upper_rows_grow_with_every_counterexample() {
        let mut lstar = LStar::new(reference_alphabet(), VendingMachine::default(), config());
        let mut counterexamples = 0;
        while lstar.phase() != &Phase::Converged {
            let before = lstar.table().upper().len();
            let was_counterexample =
                matches!(lstar.phase(), Phase::Refining(Refinement::Counterexample(_)));
            lstar.step().unwrap();
            if was_counterexample {
                counterexamples += 1;
                assert!(lstar.table().upper().len() > before);
            }
        }
        assert!(counterexamples <= 5);
    }

    #[test]
    fn hypothesis_agrees_with_device_on_short_words() {
        let alphabet = reference_alphabet();
        let learned = LStar::new(alphabet.clone(), VendingMachine::default(), config())
            .run()
            .unwrap();
        let mut sul = SulAdapter::new(VendingMachine::default());
        for len in 1..=3 {
            for word in (0..len)
                .map(|_| alphabet.universe().cloned())
                .multi_cartesian_product()
            {
                assert_eq!(
                    learned.hypothesis.transform(&word),
                    Some(sul.query(&word).unwrap()),
                    "mismatch on {}",
                    word.show()
                );
            }
        }
    }
}
