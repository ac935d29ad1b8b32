pub use indexmap::map;
pub use indexmap::set;

/// Type alias for sets that keep insertion order, we use this to hide which type of
/// `HashSet` we are actually using.
pub type Set<S> = indexmap::IndexSet<S>;

/// Type alias for maps that keep insertion order, we use this to hide which type of
/// `HashMap` we are actually using.
pub type Map<K, V> = indexmap::IndexMap<K, V>;

/// Represents a bijective mapping between `L` and `R`, that is a mapping which associates
/// each `L` with precisely one `R` and vice versa.
pub type Bijection<L, R> = bimap::BiHashMap<L, R>;
