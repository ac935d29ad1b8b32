//! Active learning of Mealy machine models for black-box devices and comparison of the
//! learned models.
//!
//! A device is accessed only through the [`Sul`](automata_core::sul::Sul) trait. The
//! [`active::LStar`] learner builds a model of one device, a [`active::Campaign`] learns
//! several devices side by side and the [`diff::Differencer`] compares the models that
//! converged and ranks them.
#![allow(missing_docs)]

/// Deals with active learning: the observation table, the equivalence oracles and the
/// L* learner that drives them.
pub mod active;

/// Pairwise comparison of learned models and classification against a behavioral
/// contract.
pub mod diff;

mod error;
pub use error::LearningError;

mod config;
pub use config::*;

/// Re-exports everything that is needed to learn and compare models.
pub mod prelude {
    pub use super::{
        active::{
            Campaign, CancellationToken, EquivalenceOracle, LStar, LearningOutcome, MealyOracle,
            Phase, SessionReport,
        },
        diff::{
            Contract, ContractVerdict, DiffConfig, DiffReport, Differencer, Divergence,
            ReportSink, TracingSink, Verdict,
        },
        LearningConfig, LearningError, OracleStrategy,
    };
}
