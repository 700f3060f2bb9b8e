use std::fmt;

use indexmap::IndexMap;
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::solve::Solutions;
use crate::term::{fmt_call, unify_args, Bindings, Term, VarId};

/// One ground or partially-ground relation instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fact {
    /// Relation name.
    pub name: String,
    /// Positional arguments; variables are permitted as explicit unbound
    /// markers.
    pub args: Vec<Term>,
}

impl Fact {
    /// Number of positional arguments.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Attempts to unify `args` against this fact, atomically.
    ///
    /// On success the bindings are retained in `env`; on failure `env` is
    /// exactly as it was before the call, so the caller can re-attempt with
    /// different arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArityMismatch`] when the argument list's length
    /// disagrees with the fact's arity.
    pub fn attempt(&self, args: &[Term], env: &mut Bindings) -> Result<bool, Error> {
        if args.len() != self.arity() {
            return Err(Error::ArityMismatch {
                name: self.name.clone(),
                expected: self.arity(),
                got: args.len(),
            });
        }
        Ok(unify_args(&self.args, args, env))
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_call(f, &self.name, &self.args)
    }
}

/// One pending invocation in a clause body or query: a relation name
/// applied to argument terms.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Goal {
    /// Relation name the goal resolves against.
    pub name: String,
    /// Argument terms, possibly sharing variables with other goals.
    pub args: Vec<Term>,
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_call(f, &self.name, &self.args)
    }
}

/// A rule: the head holds whenever every body goal holds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Clause {
    /// Relation name.
    pub name: String,
    /// Formal parameters the caller's arguments unify against.
    pub head: Vec<Term>,
    /// Ordered conjunction of goals.
    pub body: Vec<Goal>,
}

impl Clause {
    /// Number of head parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.head.len()
    }
}

/// A database entry: a stored fact or a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Entry {
    /// A concrete relation instance.
    Fact(Fact),
    /// A derived relation definition.
    Rule(Clause),
}

/// Appends body goals to a freshly added rule, in order.
///
/// Returned by [`Database::add_rule`]; goals are tried in append order
/// during resolution.
#[derive(Debug)]
pub struct RuleBuilder<'a> {
    clause: &'a mut Clause,
}

impl RuleBuilder<'_> {
    /// Appends one goal to the rule's body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroArity`] for an empty argument list.
    pub fn goal(self, name: &str, args: impl Into<Vec<Term>>) -> Result<Self, Error> {
        let args = args.into();
        if args.is_empty() {
            return Err(Error::ZeroArity {
                name: name.to_owned(),
            });
        }
        self.clause.body.push(Goal {
            name: name.to_owned(),
            args,
        });
        Ok(self)
    }
}

/// A name+arity indexed store of facts and rules.
///
/// The database owns every entry for its whole lifetime. Entries under one
/// key keep their insertion order, which is the order the resolver tries
/// alternatives in. Queries borrow the store shared (`&self`), so it cannot
/// change underneath a live [`Solutions`] iterator; additions between
/// queries are visible to subsequent queries only.
#[derive(Debug, Clone)]
pub struct Database {
    buckets: IndexMap<String, IndexMap<usize, Vec<Entry>>>,
    next_var: u32,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: IndexMap::new(),
            next_var: 0,
        }
    }

    /// Mints a fresh, unbound variable marker.
    ///
    /// The returned term may appear in facts, rule heads, body goals and
    /// queries, and may be reused across independent queries: bindings live
    /// in each query's own environment, never in the variable itself.
    pub fn var(&mut self) -> Term {
        let id = VarId(self.next_var);
        self.next_var += 1;
        Term::Var(id)
    }

    /// First variable identity no registered term uses; renamed clause
    /// copies are minted from here up.
    pub(crate) fn var_floor(&self) -> u32 {
        self.next_var
    }

    /// Registers a fact under the (name, arity) key, after every entry
    /// already there. Arguments may mix concrete values, compounds and
    /// variable markers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroArity`] for an empty argument list.
    pub fn add_fact(&mut self, name: &str, args: impl Into<Vec<Term>>) -> Result<(), Error> {
        let args = args.into();
        if args.is_empty() {
            return Err(Error::ZeroArity {
                name: name.to_owned(),
            });
        }
        debug!("fact {name}/{} added", args.len());
        self.bucket_mut(name, args.len()).push(Entry::Fact(Fact {
            name: name.to_owned(),
            args,
        }));
        Ok(())
    }

    /// Registers a rule with the given head parameters and returns a
    /// builder for appending its body goals in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroArity`] for an empty head.
    pub fn add_rule(
        &mut self,
        name: &str,
        head: impl Into<Vec<Term>>,
    ) -> Result<RuleBuilder<'_>, Error> {
        let head = head.into();
        if head.is_empty() {
            return Err(Error::ZeroArity {
                name: name.to_owned(),
            });
        }
        debug!("rule {name}/{} added", head.len());
        let bucket = self.bucket_mut(name, head.len());
        bucket.push(Entry::Rule(Clause {
            name: name.to_owned(),
            head,
            body: Vec::new(),
        }));
        let Some(Entry::Rule(clause)) = bucket.last_mut() else {
            unreachable!("the entry pushed above is a rule");
        };
        Ok(RuleBuilder { clause })
    }

    /// Ordered entries stored under (name, arity); an unknown key is an
    /// empty slice, not a failure.
    #[must_use]
    pub fn lookup(&self, name: &str, arity: usize) -> &[Entry] {
        self.buckets
            .get(name)
            .and_then(|by_arity| by_arity.get(&arity))
            .map_or(&[], Vec::as_slice)
    }

    /// Total number of stored entries across all keys.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.buckets
            .values()
            .flat_map(IndexMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Whether the database holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Starts a query and returns its lazy solution sequence.
    ///
    /// Arguments may mix values, compounds and variable markers. Each
    /// [`Solution`](crate::Solution) reports the resolved term for every
    /// distinct variable in `args`; an unknown name or arity simply yields
    /// no solutions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroArity`] for an empty argument list.
    pub fn query(&self, name: &str, args: impl Into<Vec<Term>>) -> Result<Solutions<'_>, Error> {
        let args = args.into();
        if args.is_empty() {
            return Err(Error::ZeroArity {
                name: name.to_owned(),
            });
        }
        Ok(Solutions::new(self, name, args))
    }

    fn bucket_mut(&mut self, name: &str, arity: usize) -> &mut Vec<Entry> {
        self.buckets
            .entry(name.to_owned())
            .or_default()
            .entry(arity)
            .or_default()
    }
}
