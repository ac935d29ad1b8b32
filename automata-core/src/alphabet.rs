use std::{fmt::Debug, hash::Hash};

use itertools::Itertools;

use crate::prelude::*;

/// A symbol of an alphabet, which is also the type of the symbols in a word. Anything that
/// can be compared, ordered, hashed and displayed qualifies, for example a `char` or a
/// [`crate::vending::VendingSymbol`].
pub trait Symbol: Clone + Eq + Ord + Hash + Debug + Show {}
impl<S: Clone + Eq + Ord + Hash + Debug + Show> Symbol for S {}

/// The fixed finite set of input symbols that is shared by all devices under test.
///
/// Semantically this is a set, but the order in which symbols were given is kept so that
/// every iteration over the alphabet (and therefore every learning run) is reproducible.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Alphabet<S> {
    symbols: Vec<S>,
}

/// Alphabet of plain characters, mainly used for small hand-written machines.
pub type CharAlphabet = Alphabet<char>;

impl<S: Symbol> Alphabet<S> {
    /// Creates a new alphabet from the given symbols. Duplicates are removed, the first
    /// occurrence of a symbol determines its position.
    pub fn new<I: IntoIterator<Item = S>>(symbols: I) -> Self {
        Self {
            symbols: symbols.into_iter().unique().collect(),
        }
    }

    /// Returns an iterator over all symbols in the fixed order of the alphabet.
    pub fn universe(&self) -> std::slice::Iter<'_, S> {
        self.symbols.iter()
    }

    /// The number of symbols.
    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    /// Returns true if the alphabet has no symbols at all.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Returns true if `symbol` belongs to the alphabet.
    pub fn contains(&self, symbol: &S) -> bool {
        self.symbols.contains(symbol)
    }

    /// Gives the position of `symbol` in the alphabet, if it is present.
    pub fn index_of(&self, symbol: &S) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Returns the symbol at position `index`.
    pub fn get(&self, index: usize) -> Option<&S> {
        self.symbols.get(index)
    }

    /// Returns true if every symbol of `word` is part of the alphabet.
    pub fn admits(&self, word: &[S]) -> bool {
        word.iter().all(|sym| self.contains(sym))
    }
}

impl CharAlphabet {
    /// Creates a [`CharAlphabet`] consisting of the first `size` lowercase letters.
    pub fn of_size(size: usize) -> Self {
        assert!(size <= 26, "at most 26 letters are supported");
        Self::new(('a'..='z').take(size))
    }
}

impl<S: Symbol> FromIterator<S> for Alphabet<S> {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl<S: Symbol> std::ops::Index<usize> for Alphabet<S> {
    type Output = S;
    fn index(&self, index: usize) -> &Self::Output {
        &self.symbols[index]
    }
}

impl<'a, S> IntoIterator for &'a Alphabet<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;
    fn into_iter(self) -> Self::IntoIter {
        self.symbols.iter()
    }
}

impl<S: Show> Debug for Alphabet<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.symbols.iter().map(|sym| sym.show()).join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_order_and_dedup() {
        let alphabet = Alphabet::new(['c', 'a', 'c', 'b']);
        assert_eq!(alphabet.size(), 3);
        assert_eq!(alphabet.universe().copied().collect::<String>(), "cab");
        assert_eq!(alphabet.index_of(&'b'), Some(2));
        assert!(alphabet.admits(&['a', 'b']));
        assert!(!alphabet.admits(&['a', 'd']));
        assert_eq!(format!("{:?}", CharAlphabet::of_size(2)), "{a, b}");
    }
}
