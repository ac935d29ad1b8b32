use std::fmt::Display;

use automata_core::prelude::*;
use tracing::{debug, info, warn};

use super::{ContractVerdict, Divergence};

/// The divergences between two models, identified by their position in
/// [`DiffReport::compared`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairDiff<S, O> {
    pub left: usize,
    pub right: usize,
    /// Divergences on the candidate sequences, in candidate order.
    pub divergences: Vec<Divergence<S, O>>,
    /// A shortest sequence that separates the two models, regardless of the maximal
    /// candidate length. `None` if the models are equivalent.
    pub shortest_witness: Option<Word<S>>,
}

/// A model and its position in the ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked<S, O> {
    pub id: String,
    /// The number of divergences the model takes part in.
    pub divergences: usize,
    /// The classification against the contract, if one was given.
    pub contract: Option<ContractVerdict<S, O>>,
}

/// The consensus of the pairwise comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A single model has strictly fewer divergences than all others.
    MostLikelyCorrect(String),
    /// Several models share the lowest number of divergences.
    Ambiguous(Vec<String>),
    /// Fewer than two models converged, so nothing could be compared.
    Insufficient { converged: usize, requested: usize },
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::MostLikelyCorrect(id) => write!(f, "{id} is most likely correct"),
            Verdict::Ambiguous(ids) => write!(f, "ambiguous between {}", ids.join(", ")),
            Verdict::Insufficient {
                converged,
                requested,
            } => write!(
                f,
                "insufficient, only {converged} of {requested} models converged"
            ),
        }
    }
}

/// Everything the differencer found out about a set of models.
#[derive(Debug, Clone)]
pub struct DiffReport<S, O> {
    /// The number of models that were requested.
    pub requested: usize,
    /// Ids of the models that took part in the comparison.
    pub compared: Vec<String>,
    /// Ids of the models whose session was aborted, with the reason.
    pub aborted: Vec<(String, String)>,
    /// The number of candidate sequences every pair was compared on.
    pub candidates: usize,
    pub pairs: Vec<PairDiff<S, O>>,
    /// All compared models, best first.
    pub ranking: Vec<Ranked<S, O>>,
    pub verdict: Verdict,
}

impl<S: Symbol, O: Color> DiffReport<S, O> {
    /// Returns true if the report is based on fewer models than requested.
    pub fn is_partial(&self) -> bool {
        self.compared.len() < self.requested
    }

    /// All divergences together with the ids of the two models.
    pub fn divergences(&self) -> impl Iterator<Item = (&str, &str, &Divergence<S, O>)> + '_ {
        self.pairs.iter().flat_map(move |pair| {
            let left = self.compared[pair.left].as_str();
            let right = self.compared[pair.right].as_str();
            pair.divergences.iter().map(move |d| (left, right, d))
        })
    }

    /// The rank of every entry of [`DiffReport::ranking`]. Models with the same number of
    /// divergences and contract violations share a rank.
    pub fn ranks(&self) -> Vec<usize> {
        let key = |r: &Ranked<S, O>| {
            (
                r.divergences,
                r.contract.as_ref().map_or(0, |c| c.violations()),
            )
        };
        let mut ranks: Vec<usize> = Vec::with_capacity(self.ranking.len());
        let mut previous = None;
        for (position, ranked) in self.ranking.iter().enumerate() {
            let current = key(ranked);
            let rank = match (previous, ranks.last()) {
                (Some(previous), Some(&rank)) if previous == current => rank,
                _ => position + 1,
            };
            ranks.push(rank);
            previous = Some(current);
        }
        ranks
    }

    /// Renders the ranking as a table.
    pub fn ranking_table(&self) -> tabled::Table {
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(["rank", "model", "divergences", "contract"]);
        for (rank, ranked) in self.ranks().into_iter().zip(&self.ranking) {
            let contract = match &ranked.contract {
                None => "-".to_string(),
                Some(ContractVerdict::Conforms) => "conforms".to_string(),
                Some(verdict) => format!("{} violations", verdict.violations()),
            };
            builder.push_record([
                rank.to_string(),
                ranked.id.clone(),
                ranked.divergences.to_string(),
                contract,
            ]);
        }
        builder.build()
    }

    /// Renders the pairwise comparison as a table.
    pub fn pairs_table(&self) -> tabled::Table {
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(["left", "right", "divergences", "first", "shortest witness"]);
        for pair in &self.pairs {
            builder.push_record([
                self.compared[pair.left].clone(),
                self.compared[pair.right].clone(),
                pair.divergences.len().to_string(),
                pair.divergences
                    .first()
                    .map(|d| d.input.show())
                    .unwrap_or_else(|| "-".to_string()),
                pair.shortest_witness
                    .as_ref()
                    .map(|w| w.show())
                    .unwrap_or_else(|| "equivalent".to_string()),
            ]);
        }
        builder.build()
    }
}

/// Receives the outbound results: every converged model and the final report. This is the
/// seam to visualizers and report generators.
pub trait ReportSink<S: Symbol, O: Color> {
    /// Called once for every model that converged.
    fn hypothesis(&mut self, id: &str, model: &MealyMachine<S, O>);
    /// Called once with the result of the comparison.
    fn report(&mut self, report: &DiffReport<S, O>);
}

/// Writes everything to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl<S: Symbol, O: Color> ReportSink<S, O> for TracingSink {
    fn hypothesis(&mut self, id: &str, model: &MealyMachine<S, O>) {
        info!("{id}: model with {} states", model.size());
        debug!("{id}:\n{:?}", model);
    }

    fn report(&mut self, report: &DiffReport<S, O>) {
        for (id, reason) in &report.aborted {
            warn!("{id} aborted: {reason}");
        }
        for (left, right, divergence) in report.divergences() {
            debug!(
                "{left} and {right} diverge on {}: {:?} vs {:?}",
                divergence.input.show(),
                divergence.left_outputs,
                divergence.right_outputs
            );
        }
        if report.is_partial() {
            warn!(
                "ranking is based on {} of {} requested models",
                report.compared.len(),
                report.requested
            );
        }
        info!("ranking\n{}", report.ranking_table());
        match &report.verdict {
            Verdict::MostLikelyCorrect(_) => info!("{}", report.verdict),
            _ => warn!("{}", report.verdict),
        }
    }
}

#[cfg(test)]
mod tests {
    use automata_core::alphabet::CharAlphabet;

    use super::*;
    use crate::diff::{DiffConfig, Differencer};

    #[derive(Default)]
    struct Collect(Vec<String>, Option<Verdict>);

    impl ReportSink<char, u8> for Collect {
        fn hypothesis(&mut self, id: &str, _model: &MealyMachine<char, u8>) {
            self.0.push(id.to_string());
        }

        fn report(&mut self, report: &DiffReport<char, u8>) {
            self.1 = Some(report.verdict.clone());
        }
    }

    fn machine(output: u8) -> MealyMachine<char, u8> {
        MealyMachine::builder(CharAlphabet::of_size(2))
            .with_transitions([(0, 'a', 0, 1), (0, 'b', 0, 0), (1, 'a', 0, 0), (1, 'b', output, 1)])
            .into_mealy(0)
            .unwrap()
    }

    #[test_log::test]
    fn sinks_receive_models_and_report() {
        let models = vec![
            ("one".to_string(), machine(1)),
            ("two".to_string(), machine(2)),
            ("again".to_string(), machine(1)),
        ];
        let report = Differencer::new(CharAlphabet::of_size(2), DiffConfig::default())
            .compare(&models, None);

        let mut sink = Collect::default();
        for (id, model) in &models {
            sink.hypothesis(id, model);
        }
        sink.report(&report);
        TracingSink.report(&report);

        assert_eq!(sink.0, vec!["one", "two", "again"]);
        assert_eq!(
            sink.1,
            Some(Verdict::Ambiguous(vec!["one".into(), "again".into()]))
        );
        assert_eq!(report.divergences().count(), 2 * report.pairs[0].divergences.len());
        assert!(!report.is_partial());

        // one and again are tied, two comes last
        assert_eq!(report.ranks(), vec![1, 1, 3]);
        let table = report.ranking_table().to_string();
        assert!(table.contains("two"));
        assert!(report.pairs_table().to_string().contains("ab"));
    }
}
