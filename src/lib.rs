//! # Microprolog
//!
//! A minimal Prolog-style logic programming engine in Rust: typed
//! unification over atomic values, fact and rule storage indexed by name
//! and arity, and lazy query resolution with backtracking.
//!
//! ## Features
//!
//! - Unification with a rollback trail
//! - Facts and rules stored in insertion order per (name, arity)
//! - Backtracking resolution as a lazy solution iterator
//!
//! ## Example
//!
//! ```rust
//! use microprolog::{Database, Term};
//!
//! let mut db = Database::new();
//! db.add_fact("likes", [Term::sym("amy"), Term::sym("cake")]).unwrap();
//! let who = db.var();
//! let solutions: Vec<_> = db
//!     .query("likes", [who.clone(), Term::sym("cake")])
//!     .unwrap()
//!     .collect();
//! assert_eq!(solutions.len(), 1);
//! assert_eq!(solutions[0].get(&who), Some(&Term::sym("amy")));
//! ```

/// Fact and rule storage.
pub mod database;
/// Error taxonomy.
pub mod error;
/// Backtracking resolution.
pub mod solve;
/// Terms, bindings and unification.
pub mod term;

pub use database::{Clause, Database, Entry, Fact, Goal, RuleBuilder};
pub use error::Error;
pub use solve::{Solution, Solutions};
pub use term::{unify, unify_args, Bindings, Compound, Term, Value, VarId};
