//! Core vocabulary for learning and testing reactive black-box devices: symbols,
//! alphabets and words, the [`Sul`] abstraction over a device under learning,
//! and the [`MealyMachine`] representation of learned models.
#![deny(missing_docs)]
use std::{fmt::Debug, hash::Hash};

/// Defines some mathematical objects that are used such as bijections,
/// sets and mappings.
pub mod math;

mod show;
pub use show::{show_duration, Show};

/// An alphabet is the fixed, ordered collection of input symbols that every
/// device under test accepts.
pub mod alphabet;

/// Finite words over some alphabet and helpers for building them.
pub mod word;

/// The interface to a system under learning and the adapter that enforces
/// resets and keeps statistics.
pub mod sul;

/// Deterministic Mealy machines, which is the representation of every learned model.
pub mod mealy;

/// The reference domain: vending machines that accept coins and buttons.
pub mod vending;

/// A color is simply a type that can be used to label transitions, in our case
/// it is the output a device produces for a single input symbol.
pub trait Color: Clone + Eq + Hash + Debug {}
impl<T: Eq + Clone + Hash + Debug> Color for T {}

/// The prelude is supposed to make using this package easier. Including everything, i.e.
/// `use automata_core::prelude::*;` should be enough to use the package.
pub mod prelude {
    pub use super::{
        alphabet::{Alphabet, Symbol},
        math,
        mealy::{MealyBuilder, MealyMachine, Simulation, StateIndex},
        show::Show,
        sul::{QueryFailure, Sul, SulAdapter, SulStats},
        word::{Concat, Word},
        Color,
    };
}
