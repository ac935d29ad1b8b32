use automata_core::{math, prelude::*};
use itertools::Itertools;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::{active::SessionReport, LearningError};

mod contract;
pub use contract::{Contract, ContractCase, ContractVerdict, ContractViolation};

mod report;
pub use report::{DiffReport, PairDiff, Ranked, ReportSink, TracingSink, Verdict};

/// Settings of the [`Differencer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffConfig {
    /// Candidate sequences have a length of at least one and at most `max_len`.
    pub max_len: usize,
    /// If there are more candidates than this, a random sample of this size is used.
    pub max_sequences: usize,
    /// Only keep divergences whose first mismatch is on the last symbol, which drops the
    /// extensions of a shorter divergence.
    pub minimal_only: bool,
    /// Seed for sampling candidates.
    pub seed: u64,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_len: 3,
            max_sequences: 50000,
            minimal_only: false,
            seed: 0,
        }
    }
}

impl DiffConfig {
    /// Sets the maximal length of candidate sequences.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Sets the number of candidates above which sampling is used.
    pub fn with_max_sequences(mut self, max_sequences: usize) -> Self {
        self.max_sequences = max_sequences;
        self
    }

    /// Sets whether only minimal divergences are kept.
    pub fn minimal_only(mut self, minimal_only: bool) -> Self {
        self.minimal_only = minimal_only;
        self
    }

    /// Sets the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// An input sequence on which two models produce different outputs when run from their
/// initial states.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Divergence<S, O> {
    /// The input sequence.
    pub input: Word<S>,
    /// The outputs of the left model.
    pub left_outputs: Vec<O>,
    /// The outputs of the right model.
    pub right_outputs: Vec<O>,
}

impl<S: Clone, O: Clone + Eq> Divergence<S, O> {
    /// The same divergence seen from the other model.
    pub fn swapped(&self) -> Self {
        Self {
            input: self.input.clone(),
            left_outputs: self.right_outputs.clone(),
            right_outputs: self.left_outputs.clone(),
        }
    }

    /// Position of the first symbol on which the outputs differ.
    pub fn first_mismatch(&self) -> usize {
        self.left_outputs
            .iter()
            .zip(&self.right_outputs)
            .position(|(l, r)| l != r)
            .unwrap_or(self.input.len())
    }
}

/// Compares learned models by running the same input sequences on all of them.
#[derive(Clone)]
pub struct Differencer<S> {
    alphabet: Alphabet<S>,
    config: DiffConfig,
}

impl<S: Symbol> std::fmt::Debug for Differencer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Differencer")
            .field("alphabet", &self.alphabet)
            .field("config", &self.config)
            .finish()
    }
}

impl<S: Symbol + Send + Sync> Differencer<S> {
    /// Creates a differencer that draws candidates from `alphabet`.
    pub fn new(alphabet: Alphabet<S>, config: DiffConfig) -> Self {
        Self { alphabet, config }
    }

    /// The settings of the differencer.
    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// All words of length one up to the maximal length, shortest first and in alphabet
    /// order. If there are too many, a seeded sample is drawn instead, which is sorted the
    /// same way and therefore reproducible.
    pub fn candidates(&self) -> Vec<Word<S>> {
        let max_len = self.config.max_len;
        if self.alphabet.is_empty() || max_len == 0 {
            return vec![];
        }

        let mut total = 0usize;
        let mut layer = 1usize;
        for _ in 1..=max_len {
            layer = layer.saturating_mul(self.alphabet.size());
            total = total.saturating_add(layer);
        }

        if total <= self.config.max_sequences {
            return (1..=max_len)
                .flat_map(|len| {
                    (0..len)
                        .map(|_| self.alphabet.universe().cloned())
                        .multi_cartesian_product()
                })
                .collect();
        }

        debug!(
            "{} candidate sequences exceed the limit of {}, sampling",
            total, self.config.max_sequences
        );
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut sample = math::Set::default();
        // duplicates are dropped, so bound the number of draws
        for _ in 0..self.config.max_sequences.saturating_mul(2) {
            if sample.len() >= self.config.max_sequences {
                break;
            }
            let len = rng.gen_range(1..=max_len);
            let word: Word<S> = (0..len)
                .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.size())].clone())
                .collect();
            sample.insert(word);
        }
        sample
            .into_iter()
            .sorted_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            .collect()
    }

    /// Runs every candidate on both models and records those on which the output vectors
    /// differ, in candidate order.
    pub fn diff<O>(
        &self,
        left: &MealyMachine<S, O>,
        right: &MealyMachine<S, O>,
        candidates: &[Word<S>],
    ) -> Vec<Divergence<S, O>>
    where
        O: Color + Send + Sync,
    {
        candidates
            .par_iter()
            .filter_map(|input| {
                let left_outputs = left.transform(input)?;
                let right_outputs = right.transform(input)?;
                if left_outputs == right_outputs {
                    return None;
                }
                let divergence = Divergence {
                    input: input.clone(),
                    left_outputs,
                    right_outputs,
                };
                if self.config.minimal_only && divergence.first_mismatch() + 1 != input.len() {
                    return None;
                }
                Some(divergence)
            })
            .collect()
    }

    /// Compares all pairs of the given models and ranks them. Each model is scored with the
    /// number of divergences it takes part in, the model with the lowest score is the most
    /// likely correct one. If a contract is given, every model is classified against it as
    /// well and the number of violations orders models with the same score.
    pub fn compare<O>(
        &self,
        models: &[(String, MealyMachine<S, O>)],
        contract: Option<&Contract<S, O>>,
    ) -> DiffReport<S, O>
    where
        O: Color + Send + Sync,
    {
        self.compare_with(models, vec![], models.len(), contract)
    }

    /// Compares the models of all sessions that converged. Aborted sessions are listed in
    /// the report, which also states how many models were requested.
    pub fn compare_sessions<O>(
        &self,
        sessions: &[SessionReport<S, O>],
        contract: Option<&Contract<S, O>>,
    ) -> DiffReport<S, O>
    where
        O: Color + Send + Sync,
    {
        let mut models = vec![];
        let mut aborted = vec![];
        for session in sessions {
            match &session.result {
                Ok(outcome) => models.push((session.id.clone(), outcome.hypothesis.clone())),
                Err(e) => aborted.push((session.id.clone(), describe(e))),
            }
        }
        self.compare_with(&models, aborted, sessions.len(), contract)
    }

    fn compare_with<O>(
        &self,
        models: &[(String, MealyMachine<S, O>)],
        aborted: Vec<(String, String)>,
        requested: usize,
        contract: Option<&Contract<S, O>>,
    ) -> DiffReport<S, O>
    where
        O: Color + Send + Sync,
    {
        let compared: Vec<String> = models.iter().map(|(id, _)| id.clone()).collect();
        for (id, reason) in &aborted {
            warn!("{id} is missing from the comparison: {reason}");
        }

        if models.len() < 2 {
            warn!(
                "only {} of {} models converged, nothing to compare",
                models.len(),
                requested
            );
            let contracts = classify(models, contract);
            return DiffReport {
                requested,
                compared,
                aborted,
                candidates: 0,
                pairs: vec![],
                ranking: rank(&vec![0; models.len()], &contracts, &models_ids(models)),
                verdict: Verdict::Insufficient {
                    converged: models.len(),
                    requested,
                },
            };
        }

        let candidates = self.candidates();
        info!(
            "comparing {} models on {} candidate sequences",
            models.len(),
            candidates.len()
        );

        let pairs: Vec<PairDiff<S, O>> = (0..models.len())
            .tuple_combinations()
            .collect_vec()
            .into_par_iter()
            .map(|(i, j)| {
                let (left_id, left) = &models[i];
                let (right_id, right) = &models[j];
                let divergences = self.diff(left, right, &candidates);
                let shortest_witness = left.witness_inequivalence(right);
                trace!(
                    "{left_id} and {right_id} diverge on {} sequences",
                    divergences.len()
                );
                PairDiff {
                    left: i,
                    right: j,
                    divergences,
                    shortest_witness,
                }
            })
            .collect();

        let mut scores = vec![0usize; models.len()];
        for pair in &pairs {
            scores[pair.left] += pair.divergences.len();
            scores[pair.right] += pair.divergences.len();
        }

        let contracts = classify(models, contract);
        let ranking = rank(&scores, &contracts, &models_ids(models));

        let best = scores.iter().copied().min().unwrap_or_default();
        let leaders: Vec<String> = scores
            .iter()
            .enumerate()
            .filter(|(_, score)| **score == best)
            .map(|(i, _)| models[i].0.clone())
            .collect();
        let verdict = match leaders.as_slice() {
            [single] => Verdict::MostLikelyCorrect(single.clone()),
            _ => Verdict::Ambiguous(leaders),
        };

        DiffReport {
            requested,
            compared,
            aborted,
            candidates: candidates.len(),
            pairs,
            ranking,
            verdict,
        }
    }
}

fn models_ids<S, O>(models: &[(String, MealyMachine<S, O>)]) -> Vec<String> {
    models.iter().map(|(id, _)| id.clone()).collect()
}

fn classify<S, O>(
    models: &[(String, MealyMachine<S, O>)],
    contract: Option<&Contract<S, O>>,
) -> Vec<Option<ContractVerdict<S, O>>>
where
    S: Symbol,
    O: Color,
{
    models
        .iter()
        .map(|(_, model)| contract.map(|c| c.check(model)))
        .collect()
}

fn rank<S: Symbol, O: Color>(
    scores: &[usize],
    contracts: &[Option<ContractVerdict<S, O>>],
    ids: &[String],
) -> Vec<Ranked<S, O>> {
    let mut order = (0..scores.len()).collect_vec();
    order.sort_by_key(|&i| {
        let violations = contracts[i].as_ref().map_or(0, |c| c.violations());
        (scores[i], violations, i)
    });
    order
        .into_iter()
        .map(|i| Ranked {
            id: ids[i].clone(),
            divergences: scores[i],
            contract: contracts[i].clone(),
        })
        .collect()
}

fn describe<S: Symbol, O: Color>(error: &LearningError<S, O>) -> String {
    format!("{}: {error}", error.kind())
}

#[cfg(test)]
mod tests {
    use automata_core::{alphabet::CharAlphabet, vending::*};

    use super::*;
    use crate::{active::Campaign, LearningConfig, OracleStrategy};

    fn toggle(output_on_b: u8) -> MealyMachine<char, u8> {
        MealyMachine::builder(CharAlphabet::of_size(2))
            .with_transitions([
                (0, 'a', 0, 1),
                (0, 'b', 0, 0),
                (1, 'a', 0, 0),
                (1, 'b', output_on_b, 1),
            ])
            .into_mealy(0)
            .unwrap()
    }

    fn constant() -> MealyMachine<char, u8> {
        MealyMachine::builder(CharAlphabet::of_size(2))
            .with_transitions([(0, 'a', 0, 0), (0, 'b', 0, 0)])
            .into_mealy(0)
            .unwrap()
    }

    #[test]
    fn enumerates_all_short_words() {
        let differencer = Differencer::new(CharAlphabet::of_size(2), DiffConfig::default());
        let candidates = differencer.candidates();
        assert_eq!(candidates.len(), 2 + 4 + 8);
        assert_eq!(candidates[0], vec!['a']);
        assert_eq!(candidates[2], vec!['a', 'a']);
        assert_eq!(candidates.last(), Some(&vec!['b', 'b', 'b']));
        assert!(format!("{:?}", differencer).contains("max_len: 3"));
    }

    #[test]
    fn samples_when_there_are_too_many_words() {
        let config = DiffConfig::default()
            .with_max_len(6)
            .with_max_sequences(20)
            .with_seed(4);
        let differencer = Differencer::new(CharAlphabet::of_size(3), config);
        let candidates = differencer.candidates();
        assert_eq!(candidates.len(), 20);
        assert!(candidates.iter().all(|w| (1..=6).contains(&w.len())));
        assert_eq!(candidates, differencer.candidates());
    }

    #[test]
    fn diff_is_symmetric() {
        let differencer = Differencer::new(CharAlphabet::of_size(2), DiffConfig::default());
        let candidates = differencer.candidates();
        let (a, b) = (toggle(1), constant());
        let forward = differencer.diff(&a, &b, &candidates);
        let backward = differencer.diff(&b, &a, &candidates);
        assert!(!forward.is_empty());
        assert_eq!(forward.iter().map(|d| d.swapped()).collect_vec(), backward);
    }

    #[test]
    fn diff_is_idempotent() {
        let differencer = Differencer::new(CharAlphabet::of_size(2), DiffConfig::default());
        let models = vec![
            ("toggle".to_string(), toggle(1)),
            ("silent".to_string(), toggle(0)),
            ("constant".to_string(), constant()),
        ];
        let first = differencer.compare(&models, None);
        let second = differencer.compare(&models, None);
        assert_eq!(first.pairs, second.pairs);
        assert_eq!(first.verdict, second.verdict);
    }

    #[test]
    fn identical_models_do_not_diverge() {
        let differencer = Differencer::new(CharAlphabet::of_size(2), DiffConfig::default());
        let candidates = differencer.candidates();
        assert!(differencer
            .diff(&toggle(1), &toggle(1), &candidates)
            .is_empty());
    }

    #[test]
    fn minimal_divergences_end_in_the_first_mismatch() {
        let config = DiffConfig::default().minimal_only(true);
        let differencer = Differencer::new(CharAlphabet::of_size(2), config);
        let candidates = differencer.candidates();
        let divergences = differencer.diff(&toggle(1), &constant(), &candidates);
        assert!(!divergences.is_empty());
        assert!(divergences
            .iter()
            .all(|d| d.first_mismatch() + 1 == d.input.len()));
        assert_eq!(divergences[0].input, vec!['a', 'b']);
    }

    #[test]
    fn majority_decides_the_verdict() {
        let differencer = Differencer::new(CharAlphabet::of_size(2), DiffConfig::default());
        let models = vec![
            ("first".to_string(), toggle(1)),
            ("second".to_string(), toggle(1)),
            ("odd".to_string(), constant()),
        ];
        let report = differencer.compare(&models, None);
        assert_eq!(report.pairs.len(), 3);
        assert_eq!(report.verdict, Verdict::Ambiguous(vec!["first".into(), "second".into()]));
        assert_eq!(report.ranking.last().map(|r| r.id.as_str()), Some("odd"));

        let models = vec![
            ("toggle".to_string(), toggle(1)),
            ("silent".to_string(), toggle(0)),
            ("constant".to_string(), constant()),
        ];
        let report = differencer.compare(&models, None);
        // the silent toggle agrees with the constant machine on every sequence
        assert!(report.pairs[2].divergences.is_empty());
        assert_eq!(report.pairs[2].shortest_witness, None);
    }

    #[test]
    fn fewer_than_two_models_are_reported() {
        let differencer = Differencer::new(CharAlphabet::of_size(2), DiffConfig::default());
        let report = differencer.compare(&[("alone".to_string(), toggle(1))], None);
        assert_eq!(
            report.verdict,
            Verdict::Insufficient {
                converged: 1,
                requested: 1
            }
        );
        assert!(report.pairs.is_empty());
        assert_eq!(report.ranking.len(), 1);

        let report = differencer.compare::<u8>(&[], None);
        assert_eq!(
            report.verdict,
            Verdict::Insufficient {
                converged: 0,
                requested: 0
            }
        );
    }

    #[test_log::test]
    fn off_by_one_threshold_is_exposed() {
        let alphabet = reference_alphabet();
        let config = LearningConfig::default()
            .with_oracle(OracleStrategy::random_words(300, 2, 7))
            .with_seed(1);
        let sessions = Campaign::new(alphabet.clone(), config).learn(vec![
            ("correct".to_string(), VendingMachine::default()),
            (
                "faulty".to_string(),
                VendingMachine::with_threshold(REFERENCE_PRICE, 100),
            ),
        ]);
        assert!(sessions.iter().all(|s| s.is_converged()));

        let contract = Contract::vending(&alphabet, REFERENCE_PRICE);
        let differencer = Differencer::new(alphabet, DiffConfig::default());
        let report = differencer.compare_sessions(&sessions, Some(&contract));

        let input = vec![VendingSymbol::coin(1.0), VendingSymbol::button("coke")];
        let pair = &report.pairs[0];
        let divergence = pair
            .divergences
            .iter()
            .find(|d| d.input == input)
            .expect("the models differ after a single coin");
        assert_eq!(
            divergence.left_outputs,
            vec![VendingOutput::Ack, VendingOutput::Insufficient]
        );
        assert_eq!(
            divergence.right_outputs,
            vec![
                VendingOutput::Ack,
                VendingOutput::Dispense(Item::new("coke"))
            ]
        );
        assert_eq!(pair.shortest_witness.as_ref().map(|w| w.len()), Some(2));

        // both models take part in every divergence, only the contract separates them
        assert!(matches!(report.verdict, Verdict::Ambiguous(_)));
        assert_eq!(report.ranking[0].id, "correct");
        assert_eq!(report.ranking[1].id, "faulty");
        assert!(report.ranking[0]
            .contract
            .as_ref()
            .is_some_and(|c| c.conforms()));
        assert!(report.ranking[1]
            .contract
            .as_ref()
            .is_some_and(|c| c.violations() > 0));
    }

    #[test_log::test]
    fn aborted_sessions_are_listed() {
        let alphabet = reference_alphabet();
        let sessions = Campaign::new(alphabet.clone(), LearningConfig::default())
            .learn_sequential(vec![
                (
                    "jammed".to_string(),
                    FlakyVendingMachine::new(REFERENCE_PRICE, 10),
                ),
                (
                    "also jammed".to_string(),
                    FlakyVendingMachine::new(REFERENCE_PRICE, 0),
                ),
            ]);
        let report =
            Differencer::new(alphabet, DiffConfig::default()).compare_sessions(&sessions, None);
        assert_eq!(report.aborted.len(), 2);
        assert!(report.is_partial());
        assert_eq!(
            report.verdict,
            Verdict::Insufficient {
                converged: 0,
                requested: 2
            }
        );
    }
}
