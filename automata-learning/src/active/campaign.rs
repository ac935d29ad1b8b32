use automata_core::prelude::*;
use rayon::prelude::*;
use tracing::{info, info_span, warn};

use crate::{LearningConfig, LearningError};

use super::{CancellationToken, LStar, LearningOutcome};

/// The outcome of learning one device, identified by the id it was given.
#[derive(Debug)]
pub struct SessionReport<S: Symbol, O: Color> {
    /// Identifier of the device.
    pub id: String,
    /// The learned model or the reason why the session was aborted.
    pub result: Result<LearningOutcome<S, O>, LearningError<S, O>>,
}

impl<S: Symbol, O: Color> SessionReport<S, O> {
    /// Returns true if the session converged.
    pub fn is_converged(&self) -> bool {
        self.result.is_ok()
    }

    /// The learned model, if the session converged.
    pub fn hypothesis(&self) -> Option<&MealyMachine<S, O>> {
        self.result.as_ref().ok().map(|outcome| &outcome.hypothesis)
    }
}

/// Learns models of several devices that share an alphabet. Every device gets its own
/// session with its own table and hypothesis, sessions run in parallel on the rayon thread
/// pool. A failing session never affects the others.
#[derive(Clone)]
pub struct Campaign<S> {
    alphabet: Alphabet<S>,
    config: LearningConfig,
    cancel: Option<CancellationToken>,
}

impl<S: Symbol> std::fmt::Debug for Campaign<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Campaign")
            .field("alphabet", &self.alphabet)
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl<S: Symbol + Send + Sync> Campaign<S> {
    /// Creates a campaign in which every session uses `config`.
    pub fn new(alphabet: Alphabet<S>, config: LearningConfig) -> Self {
        Self {
            alphabet,
            config,
            cancel: None,
        }
    }

    /// Makes every session observe the given cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Learns all given devices in parallel. The reports are returned in the order in which
    /// the devices were given.
    pub fn learn<T>(&self, suls: Vec<(String, T)>) -> Vec<SessionReport<S, T::Output>>
    where
        T: Sul<Symbol = S> + Send,
        T::Output: Send,
    {
        let reports: Vec<_> = suls
            .into_par_iter()
            .map(|(id, sul)| self.session(id, sul))
            .collect();
        summarize(&reports);
        reports
    }

    /// Learns all given devices one after the other.
    pub fn learn_sequential<T>(&self, suls: Vec<(String, T)>) -> Vec<SessionReport<S, T::Output>>
    where
        T: Sul<Symbol = S>,
    {
        let reports: Vec<_> = suls
            .into_iter()
            .map(|(id, sul)| self.session(id, sul))
            .collect();
        summarize(&reports);
        reports
    }

    fn session<T>(&self, id: String, sul: T) -> SessionReport<S, T::Output>
    where
        T: Sul<Symbol = S>,
    {
        let span = info_span!("session", id = %id);
        let _guard = span.enter();
        let mut lstar = LStar::new(self.alphabet.clone(), sul, self.config.clone());
        if let Some(token) = &self.cancel {
            lstar = lstar.with_cancellation(token.clone());
        }
        SessionReport {
            id,
            result: lstar.run(),
        }
    }
}

fn summarize<S: Symbol, O: Color>(reports: &[SessionReport<S, O>]) {
    for report in reports {
        match &report.result {
            Ok(outcome) => info!(
                "{}: learned {} states",
                report.id,
                outcome.hypothesis.size()
            ),
            Err(e) => warn!("{}: session aborted with {}: {e}", report.id, e.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use automata_core::vending::*;

    use super::*;
    use crate::OracleStrategy;

    type BoxedSul = Box<dyn Sul<Symbol = VendingSymbol, Output = VendingOutput> + Send>;

    #[test_log::test]
    fn failures_stay_local() {
        let config =
            LearningConfig::default().with_oracle(OracleStrategy::random_words(200, 2, 6));
        let campaign = Campaign::new(reference_alphabet(), config);
        assert!(format!("{:?}", campaign).contains("push_button(coke)"));
        let suls: Vec<(String, BoxedSul)> = vec![
            ("correct".to_string(), Box::new(VendingMachine::default()) as BoxedSul),
            (
                "jammed".to_string(),
                Box::new(FlakyVendingMachine::new(REFERENCE_PRICE, 25)) as BoxedSul,
            ),
            ("leaky".to_string(), Box::new(LeakyVendingMachine::default()) as BoxedSul),
            ("forgetful".to_string(), Box::new(ForgetfulVendingMachine) as BoxedSul),
        ];
        let reports = campaign.learn(suls);

        assert_eq!(
            reports.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["correct", "jammed", "leaky", "forgetful"]
        );
        assert!(reports[0].is_converged());
        assert!(matches!(reports[1].result, Err(LearningError::Query(_))));
        assert!(reports[2]
            .result
            .as_ref()
            .is_err_and(|e| e.is_non_deterministic()));
        assert_eq!(reports[3].hypothesis().map(|h| h.size()), Some(1));
    }
}
