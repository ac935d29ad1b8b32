use automata_core::{
    prelude::*,
    vending::{reference_cases, VendingOutput, VendingSymbol},
};
use tracing::debug;

/// An input sequence together with the outputs a correct device produces for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCase<S, O> {
    pub input: Word<S>,
    pub expected: Vec<O>,
}

/// Describes correct behavior through fixed, representative input sequences. In contrast
/// to the divergence ranking, which only knows how the learned models relate to each other,
/// a contract classifies each model on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract<S, O> {
    name: String,
    cases: Vec<ContractCase<S, O>>,
}

/// A case of a [`Contract`] on which a model does not produce the expected outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractViolation<S, O> {
    pub input: Word<S>,
    pub expected: Vec<O>,
    /// What the model produced, `None` if the input is not over its alphabet.
    pub actual: Option<Vec<O>>,
}

/// The result of checking a model against a [`Contract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractVerdict<S, O> {
    Conforms,
    Violates(Vec<ContractViolation<S, O>>),
}

impl<S, O> ContractVerdict<S, O> {
    /// Returns true if no case was violated.
    pub fn conforms(&self) -> bool {
        matches!(self, Self::Conforms)
    }

    /// The number of violated cases.
    pub fn violations(&self) -> usize {
        match self {
            Self::Conforms => 0,
            Self::Violates(violations) => violations.len(),
        }
    }
}

impl<S: Symbol, O: Color> Contract<S, O> {
    /// Creates a contract from pairs of input sequences and expected outputs.
    pub fn new<I>(name: impl Into<String>, cases: I) -> Self
    where
        I: IntoIterator<Item = (Word<S>, Vec<O>)>,
    {
        Self {
            name: name.into(),
            cases: cases
                .into_iter()
                .map(|(input, expected)| ContractCase { input, expected })
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cases(&self) -> &[ContractCase<S, O>] {
        &self.cases
    }

    /// Runs every case on `model` from its initial state.
    pub fn check(&self, model: &MealyMachine<S, O>) -> ContractVerdict<S, O> {
        let violations: Vec<_> = self
            .cases
            .iter()
            .filter_map(|case| {
                let actual = model.transform(&case.input);
                if actual.as_ref() == Some(&case.expected) {
                    return None;
                }
                debug!(
                    "contract {} violated on {}: expected {:?}, got {:?}",
                    self.name,
                    case.input.show(),
                    case.expected,
                    actual
                );
                Some(ContractViolation {
                    input: case.input.clone(),
                    expected: case.expected.clone(),
                    actual,
                })
            })
            .collect();
        if violations.is_empty() {
            ContractVerdict::Conforms
        } else {
            ContractVerdict::Violates(violations)
        }
    }
}

impl Contract<VendingSymbol, VendingOutput> {
    /// The reference rules of the vending domain for items that cost `price` cents: adding a
    /// coin always acknowledges, a purchase with a balance of at least the price dispenses
    /// and resets the balance, otherwise it is refused as insufficient.
    pub fn vending(alphabet: &Alphabet<VendingSymbol>, price: u32) -> Self {
        Self::new("vending reference", reference_cases(alphabet, price))
    }
}

#[cfg(test)]
mod tests {
    use automata_core::vending::*;

    use super::*;

    fn learned(sul: VendingMachine) -> MealyMachine<VendingSymbol, VendingOutput> {
        crate::active::LStar::new(
            reference_alphabet(),
            sul,
            crate::LearningConfig::default()
                .with_oracle(crate::OracleStrategy::random_words(300, 2, 7)),
        )
        .run()
        .unwrap()
        .hypothesis
    }

    #[test_log::test]
    fn correct_machine_conforms() {
        let contract = Contract::vending(&reference_alphabet(), REFERENCE_PRICE);
        assert!(!contract.cases().is_empty());
        assert_eq!(
            contract.check(&learned(VendingMachine::default())),
            ContractVerdict::Conforms
        );
    }

    #[test_log::test]
    fn early_dispensing_violates() {
        let contract = Contract::vending(&reference_alphabet(), REFERENCE_PRICE);
        let verdict = contract.check(&learned(VendingMachine::with_threshold(
            REFERENCE_PRICE,
            100,
        )));
        assert!(!verdict.conforms());
        let ContractVerdict::Violates(violations) = verdict else {
            unreachable!()
        };
        let single_coin = vec![VendingSymbol::coin(1.0), VendingSymbol::button("coke")];
        let violation = violations
            .iter()
            .find(|v| v.input == single_coin)
            .expect("one coin of 1 does not buy anything");
        assert_eq!(
            violation.actual,
            Some(vec![
                VendingOutput::Ack,
                VendingOutput::Dispense(Item::new("coke"))
            ])
        );
    }

    #[test]
    fn foreign_inputs_are_violations() {
        let contract = Contract::new("foreign", [(vec!['z'], vec![0u8])]);
        let model = MealyMachine::builder(Alphabet::new(['a']))
            .with_transitions([(0, 'a', 0u8, 0)])
            .into_mealy(0)
            .unwrap();
        assert_eq!(contract.check(&model).violations(), 1);
    }
}
