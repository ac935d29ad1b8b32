use crate::alphabet::Symbol;

/// A finite word, i.e. a sequence of input symbols. Access sequences, suffixes
/// (experiments) and counterexamples are all represented as words.
pub type Word<S> = Vec<S>;

/// Concatenation of two finite words, the result is collected into a new [`Word`].
#[derive(Debug, Clone, Copy)]
pub struct Concat<'a, S>(pub &'a [S], pub &'a [S]);

impl<'a, S: Symbol> Concat<'a, S> {
    /// Iterates over the symbols of the concatenation.
    pub fn symbols(&self) -> impl Iterator<Item = &'a S> + 'a {
        let (left, right) = (self.0, self.1);
        left.iter().chain(right.iter())
    }

    /// Collects the concatenation into an owned word.
    pub fn into_vec(self) -> Word<S> {
        self.symbols().cloned().collect()
    }

    /// The length of the concatenation.
    pub fn len(&self) -> usize {
        self.0.len() + self.1.len()
    }

    /// Returns true if both parts are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Appends a single symbol to a copy of `word`.
pub fn extend<S: Symbol>(word: &[S], symbol: &S) -> Word<S> {
    let mut out = Vec::with_capacity(word.len() + 1);
    out.extend_from_slice(word);
    out.push(symbol.clone());
    out
}

/// Iterates over all prefixes of `word`, from the empty word up to and including `word`.
pub fn prefixes<S>(word: &[S]) -> impl Iterator<Item = &[S]> + '_ {
    (0..=word.len()).map(move |i| &word[..i])
}
