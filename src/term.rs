use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A concrete atomic datum held inside a term.
///
/// Equality is the host type's equality; comparing values of different
/// kinds never succeeds, which surfaces as an ordinary unification failure
/// rather than a fault.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    /// A signed integer datum.
    Int(i64),
    /// A symbolic string datum.
    Sym(String),
}

impl From<i64> for Value {
    fn from(datum: i64) -> Self {
        Value::Int(datum)
    }
}

impl From<&str> for Value {
    fn from(datum: &str) -> Self {
        Value::Sym(datum.to_owned())
    }
}

impl From<String> for Value {
    fn from(datum: String) -> Self {
        Value::Sym(datum)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(datum) => write!(f, "{datum}"),
            Value::Sym(datum) => write!(f, "{datum}"),
        }
    }
}

/// Identity of a variable: an index, not a pointer.
///
/// A variable carries no data of its own; it only gains meaning through a
/// query's [`Bindings`]. Identities are minted by
/// [`Database::var`](crate::Database::var).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VarId(pub(crate) u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

/// A named, fixed-arity, ordered tuple of sub-terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Compound {
    /// Functor name.
    pub name: String,
    /// Positional sub-terms; may themselves be compounds.
    pub args: Vec<Term>,
}

/// A unifiable term.
///
/// A term's identity is immutable once created; only a variable's
/// *binding* changes over a query's lifetime, and that binding lives in
/// the query's [`Bindings`], never in the term itself. `==` is structural
/// equality and never consults bindings (two distinct unbound variables
/// are not equal); unifiability is decided by [`unify`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Term {
    /// An unbound placeholder with a unique identity.
    Var(VarId),
    /// A concrete atomic value.
    Value(Value),
    /// A named tuple of sub-terms.
    Compound(Compound),
}

impl Term {
    /// Wraps an integer datum.
    #[must_use]
    pub fn int(datum: i64) -> Self {
        Term::Value(Value::Int(datum))
    }

    /// Wraps a symbolic string datum.
    #[must_use]
    pub fn sym(datum: impl Into<String>) -> Self {
        Term::Value(Value::Sym(datum.into()))
    }

    /// Builds a compound term from a functor name and sub-terms.
    #[must_use]
    pub fn compound(name: impl Into<String>, args: impl IntoIterator<Item = Term>) -> Self {
        Term::Compound(Compound {
            name: name.into(),
            args: args.into_iter().collect(),
        })
    }

    /// Returns the variable identity when this term is a variable.
    #[must_use]
    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Term::Var(var) => Some(*var),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(var) => write!(f, "{var}"),
            Term::Value(value) => write!(f, "{value}"),
            Term::Compound(compound) => fmt_call(f, &compound.name, &compound.args),
        }
    }
}

/// Renders `name(arg, arg, ...)`.
pub(crate) fn fmt_call(f: &mut fmt::Formatter<'_>, name: &str, args: &[Term]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (index, arg) in args.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    write!(f, ")")
}

/// Per-query substitution environment: the variable bindings made during a
/// resolution attempt, plus the trail that can undo them.
///
/// The trail records bound variables in creation order. [`Bindings::mark`]
/// captures a checkpoint and [`Bindings::undo_to`] rolls every binding made
/// since that checkpoint back, which is how failed unification attempts
/// stay invisible to their callers. An environment never outlives its
/// query, so the same terms can be reused across independent queries.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: IndexMap<VarId, Term>,
    trail: SmallVec<[VarId; 32]>,
}

impl Bindings {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no variable is currently bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Current trail checkpoint.
    #[must_use]
    pub fn mark(&self) -> usize {
        self.trail.len()
    }

    /// Rolls back every binding made since `mark`.
    pub fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            if let Some(var) = self.trail.pop() {
                self.map.swap_remove(&var);
            }
        }
    }

    /// Looks up the term currently bound to `var`, if any.
    #[must_use]
    pub fn get(&self, var: VarId) -> Option<&Term> {
        self.map.get(&var)
    }

    fn bind(&mut self, var: VarId, term: Term) {
        self.map.insert(var, term);
        self.trail.push(var);
    }

    /// Dereferences variable chains until reaching an unbound variable or a
    /// non-variable term. Does not descend into compound sub-terms.
    #[must_use]
    pub fn walk(&self, term: &Term) -> Term {
        let mut current = term;
        while let Term::Var(var) = current {
            match self.map.get(var) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.clone()
    }

    /// Applies the substitution through the whole term, compound sub-terms
    /// included. Unbound variables resolve to themselves.
    #[must_use]
    pub fn resolve(&self, term: &Term) -> Term {
        match self.walk(term) {
            Term::Compound(compound) => Term::Compound(Compound {
                name: compound.name,
                args: compound.args.iter().map(|arg| self.resolve(arg)).collect(),
            }),
            other => other,
        }
    }
}

/// Attempts to make `a` and `b` structurally identical by binding free
/// variables in `env`.
///
/// Both sides are dereferenced through the substitution before comparison.
/// An unbound variable binds to the other side's current value; two values
/// succeed iff their datums are equal under the host type's equality (a
/// kind mismatch is just failure); compounds require equal name and arity
/// and unify pairwise in positional order, aborting on the first failing
/// position. Every other combination fails.
///
/// Side effects are confined to trail entries in `env`; no term mutates in
/// place. A failing call can leave bindings from already-unified positions
/// behind; callers undo through a trail checkpoint, which is exactly what
/// [`unify_args`] does.
pub fn unify(a: &Term, b: &Term, env: &mut Bindings) -> bool {
    let a = env.walk(a);
    let b = env.walk(b);
    match (a, b) {
        (Term::Var(x), Term::Var(y)) if x == y => true,
        (Term::Var(var), other) | (other, Term::Var(var)) => {
            if occurs(var, &other, env) {
                return false;
            }
            env.bind(var, other);
            true
        }
        (Term::Value(u), Term::Value(v)) => u == v,
        (Term::Compound(p), Term::Compound(q)) => {
            p.name == q.name
                && p.args.len() == q.args.len()
                && p.args.iter().zip(&q.args).all(|(s, t)| unify(s, t, env))
        }
        _ => false,
    }
}

/// Occurs check: would binding `var` to `term` create a cyclic
/// substitution?
fn occurs(var: VarId, term: &Term, env: &Bindings) -> bool {
    match env.walk(term) {
        Term::Var(other) => other == var,
        Term::Value(_) => false,
        Term::Compound(compound) => compound.args.iter().any(|arg| occurs(var, arg, env)),
    }
}

/// Unifies two argument lists positionally, all-or-nothing.
///
/// A length mismatch fails with no side effects. Otherwise a trail
/// checkpoint is taken, positions unify in order, and any failure rolls the
/// environment back to the checkpoint before returning. A caller can safely
/// re-attempt with different arguments after a failure.
pub fn unify_args(pattern: &[Term], args: &[Term], env: &mut Bindings) -> bool {
    if pattern.len() != args.len() {
        return false;
    }
    let mark = env.mark();
    for (p, a) in pattern.iter().zip(args) {
        if !unify(p, a, env) {
            env.undo_to(mark);
            return false;
        }
    }
    true
}
