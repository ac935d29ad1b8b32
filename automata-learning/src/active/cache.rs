use automata_core::prelude::*;
use tracing::trace;

/// A conflict between a new observation and what was recorded before for the same input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConflict<S, O> {
    /// The shortest prefix of the inserted word on which the outputs differ.
    pub word: Word<S>,
    /// Outputs that were recorded for `word` earlier.
    pub cached: Vec<O>,
    /// Outputs that were just observed for `word`.
    pub observed: Vec<O>,
}

#[derive(Debug, Clone)]
struct Node<S, O> {
    // maps a symbol to the output that was produced for it and the index of the child node
    children: math::Map<S, (O, usize)>,
}

impl<S, O> Default for Node<S, O> {
    fn default() -> Self {
        Self {
            children: math::Map::default(),
        }
    }
}

/// Stores the outputs of every query that was ever posed to a device in a prefix tree.
/// Since a device is deterministic, the outputs for a word also determine the outputs for
/// all of its prefixes, so a single query answers many future ones.
///
/// Inserting outputs that contradict what was recorded before yields a [`CacheConflict`],
/// which is the point where non-deterministic devices are detected.
#[derive(Debug, Clone)]
pub struct QueryCache<S, O> {
    nodes: Vec<Node<S, O>>,
}

impl<S: Symbol, O: Color> Default for QueryCache<S, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Symbol, O: Color> QueryCache<S, O> {
    /// Creates an empty cache which only knows the empty word.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
        }
    }

    /// The number of distinct non-empty words for which outputs are known.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Returns true if nothing but the empty word is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the outputs recorded for `word`, if they are known.
    pub fn lookup(&self, word: &[S]) -> Option<Vec<O>> {
        let mut node = 0;
        let mut outputs = Vec::with_capacity(word.len());
        for sym in word {
            let (output, child) = self.nodes[node].children.get(sym)?;
            outputs.push(output.clone());
            node = *child;
        }
        Some(outputs)
    }

    /// Records that `word` produced `outputs`. Both must have the same length.
    pub fn insert(&mut self, word: &[S], outputs: &[O]) -> Result<(), CacheConflict<S, O>> {
        debug_assert_eq!(word.len(), outputs.len());
        let mut node = 0;
        for (position, (sym, output)) in word.iter().zip(outputs).enumerate() {
            node = match self.nodes[node].children.get(sym) {
                Some((known, child)) if known == output => *child,
                Some(_) => {
                    let prefix = &word[..=position];
                    trace!("conflicting outputs for {}", prefix.show());
                    return Err(CacheConflict {
                        word: prefix.to_vec(),
                        cached: self.lookup(prefix).unwrap_or_default(),
                        observed: outputs[..=position].to_vec(),
                    });
                }
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[node]
                        .children
                        .insert(sym.clone(), (output.clone(), child));
                    child
                }
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_answered() {
        let mut cache = QueryCache::new();
        cache.insert(&['a', 'b', 'c'], &[1, 2, 3]).unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.lookup(&['a', 'b']), Some(vec![1, 2]));
        assert_eq!(cache.lookup(&[]), Some(vec![]));
        assert_eq!(cache.lookup(&['b']), None);
        cache.insert(&['a', 'b'], &[1, 2]).unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn conflicts_are_detected() {
        let mut cache = QueryCache::new();
        cache.insert(&['a', 'a'], &[1, 2]).unwrap();
        let conflict = cache.insert(&['a', 'a', 'b'], &[1, 3, 0]).unwrap_err();
        assert_eq!(
            conflict,
            CacheConflict {
                word: vec!['a', 'a'],
                cached: vec![1, 2],
                observed: vec![1, 3],
            }
        );
    }
}
