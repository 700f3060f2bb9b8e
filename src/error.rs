use thiserror::Error;

/// Errors reported at the crate's call boundaries.
///
/// Only malformed constructions and arity disagreements are errors.
/// Unification failure and query exhaustion are not: the former is an
/// ordinary `false` outcome of [`crate::unify`], the latter is the end of a
/// [`crate::Solutions`] iteration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A relation was declared or queried with an empty argument list.
    #[error("relation `{name}` must take at least one argument")]
    ZeroArity {
        /// Offending relation name.
        name: String,
    },

    /// An argument list's length disagrees with an entry's declared arity.
    #[error("`{name}` expects {expected} arguments, got {got}")]
    ArityMismatch {
        /// Relation name.
        name: String,
        /// Declared arity.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },
}
