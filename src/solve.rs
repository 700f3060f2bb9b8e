use indexmap::IndexMap;
use log::trace;
use smallvec::{smallvec, SmallVec};

use crate::database::{Clause, Database, Entry, Goal};
use crate::term::{unify_args, Bindings, Compound, Term, VarId};

/// One answer to a query: the resolved term for every distinct variable in
/// the query's arguments, in first-occurrence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    bindings: IndexMap<VarId, Term>,
}

impl Solution {
    /// Resolved term for a query variable. `None` when the term is not a
    /// variable of the query; an unbound variable resolves to itself.
    #[must_use]
    pub fn get(&self, var: &Term) -> Option<&Term> {
        match var {
            Term::Var(id) => self.bindings.get(id),
            _ => None,
        }
    }

    /// Iterates over (variable, resolved term) pairs in first-occurrence
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Term)> + '_ {
        self.bindings.iter().map(|(id, term)| (*id, term))
    }

    /// Number of distinct variables the query mentioned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the query mentioned no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A saved resolution state: the goal being retried, the next untried
/// alternative in its bucket, the trail checkpoint to roll back to, and the
/// goals that were still pending when the goal was attempted.
#[derive(Debug)]
struct ChoicePoint {
    goal: Goal,
    next_alt: usize,
    mark: usize,
    pending: SmallVec<[Goal; 8]>,
}

/// Lazy, backtracking sequence of solutions to one query.
///
/// Resolution is a depth-first search over the database's entries with two
/// explicit stacks: pending goals and choice points. Alternatives for a
/// goal are tried strictly in insertion order; there is no cut, so the
/// search is exhaustive unless the caller stops early. Each call to
/// [`Iterator::next`] resumes from the most recent choice point; dropping
/// the iterator abandons the search with no side effects, since every
/// binding it made lives in its own environment.
#[derive(Debug)]
pub struct Solutions<'a> {
    db: &'a Database,
    env: Bindings,
    goals: SmallVec<[Goal; 8]>,
    choices: Vec<ChoicePoint>,
    query_vars: Vec<VarId>,
    next_var: u32,
    resume: bool,
    done: bool,
}

impl<'a> Solutions<'a> {
    pub(crate) fn new(db: &'a Database, name: &str, args: Vec<Term>) -> Self {
        let mut query_vars = Vec::new();
        for term in &args {
            collect_vars(term, &mut query_vars);
        }
        Solutions {
            db,
            env: Bindings::new(),
            goals: smallvec![Goal {
                name: name.to_owned(),
                args,
            }],
            choices: Vec::new(),
            query_vars,
            next_var: db.var_floor(),
            resume: false,
            done: false,
        }
    }

    /// Tries the goal's alternatives in insertion order starting at
    /// `start`, recording a choice point when untried alternatives remain.
    ///
    /// Discharging the goal against a fact retains its bindings; entering a
    /// rule additionally pushes the renamed body goals. Failed attempts
    /// roll their own bindings back, so on a `false` return the environment
    /// is exactly as it was on entry.
    fn step(&mut self, goal: Goal, start: usize) -> bool {
        let entries = self.db.lookup(&goal.name, goal.args.len());
        let mark = self.env.mark();
        for (index, entry) in entries.iter().enumerate().skip(start) {
            match entry {
                Entry::Fact(fact) => {
                    if unify_args(&fact.args, &goal.args, &mut self.env) {
                        trace!("{goal} matched fact #{index}");
                        self.note_choice(&goal, index + 1, entries.len(), mark);
                        return true;
                    }
                }
                Entry::Rule(clause) => {
                    let (head, body) = self.rename(clause);
                    if unify_args(&head, &goal.args, &mut self.env) {
                        trace!("{goal} entered rule #{index}, {} body goals", body.len());
                        self.note_choice(&goal, index + 1, entries.len(), mark);
                        for body_goal in body.into_iter().rev() {
                            self.goals.push(body_goal);
                        }
                        return true;
                    }
                }
            }
        }
        trace!("{goal} exhausted its alternatives");
        false
    }

    /// Records a choice point when the goal still has untried alternatives.
    /// The pending-goal snapshot is taken before any body goals are pushed.
    fn note_choice(&mut self, goal: &Goal, next_alt: usize, total: usize, mark: usize) {
        if next_alt < total {
            self.choices.push(ChoicePoint {
                goal: goal.clone(),
                next_alt,
                mark,
                pending: self.goals.clone(),
            });
        }
    }

    /// Pops choice points, rolling the trail and pending goals back to
    /// each, until one yields a successful alternative.
    fn backtrack(&mut self) -> bool {
        while let Some(ChoicePoint {
            goal,
            next_alt,
            mark,
            pending,
        }) = self.choices.pop()
        {
            trace!("backtracking to {goal}, alternative #{next_alt}");
            self.env.undo_to(mark);
            self.goals = pending;
            if self.step(goal, next_alt) {
                return true;
            }
        }
        false
    }

    /// Copies a clause with every variable renamed to a fresh identity, so
    /// recursive or repeated invocations never alias bindings.
    fn rename(&mut self, clause: &Clause) -> (Vec<Term>, Vec<Goal>) {
        let mut renamed = IndexMap::new();
        let head = clause
            .head
            .iter()
            .map(|term| self.rename_term(term, &mut renamed))
            .collect();
        let body = clause
            .body
            .iter()
            .map(|goal| Goal {
                name: goal.name.clone(),
                args: goal
                    .args
                    .iter()
                    .map(|term| self.rename_term(term, &mut renamed))
                    .collect(),
            })
            .collect();
        (head, body)
    }

    fn rename_term(&mut self, term: &Term, renamed: &mut IndexMap<VarId, VarId>) -> Term {
        match term {
            Term::Var(var) => {
                if let Some(fresh) = renamed.get(var) {
                    Term::Var(*fresh)
                } else {
                    let fresh = VarId(self.next_var);
                    self.next_var += 1;
                    renamed.insert(*var, fresh);
                    Term::Var(fresh)
                }
            }
            Term::Value(_) => term.clone(),
            Term::Compound(compound) => Term::Compound(Compound {
                name: compound.name.clone(),
                args: compound
                    .args
                    .iter()
                    .map(|arg| self.rename_term(arg, renamed))
                    .collect(),
            }),
        }
    }

    fn solution(&self) -> Solution {
        let bindings = self
            .query_vars
            .iter()
            .map(|var| (*var, self.env.resolve(&Term::Var(*var))))
            .collect();
        Solution { bindings }
    }
}

impl Iterator for Solutions<'_> {
    type Item = Solution;

    fn next(&mut self) -> Option<Solution> {
        if self.done {
            return None;
        }
        if self.resume {
            self.resume = false;
            if !self.backtrack() {
                self.done = true;
                return None;
            }
        }
        loop {
            let Some(goal) = self.goals.pop() else {
                // Goal stack empty: a solution. The next call resumes from
                // the most recent choice point.
                self.resume = true;
                return Some(self.solution());
            };
            if !self.step(goal, 0) && !self.backtrack() {
                self.done = true;
                return None;
            }
        }
    }
}

/// Collects distinct variable identities in first-occurrence order.
fn collect_vars(term: &Term, out: &mut Vec<VarId>) {
    match term {
        Term::Var(var) => {
            if !out.contains(var) {
                out.push(*var);
            }
        }
        Term::Value(_) => {}
        Term::Compound(compound) => {
            for arg in &compound.args {
                collect_vars(arg, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family() -> Database {
        let mut db = Database::new();
        db.add_fact("parent", [Term::sym("tom"), Term::sym("bob")])
            .unwrap();
        db.add_fact("parent", [Term::sym("bob"), Term::sym("ann")])
            .unwrap();
        db
    }

    fn add_grandparent_rule(db: &mut Database) {
        let x = db.var();
        let y = db.var();
        let z = db.var();
        db.add_rule("grandparent", [x.clone(), z.clone()])
            .unwrap()
            .goal("parent", [x, y.clone()])
            .unwrap()
            .goal("parent", [y, z])
            .unwrap();
    }

    #[test]
    fn backtracking_enumerates_matches_in_insertion_order() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut db = Database::new();
        db.add_fact("likes", [Term::sym("amy"), Term::sym("pie")])
            .unwrap();
        db.add_fact("likes", [Term::sym("amy"), Term::sym("cake")])
            .unwrap();
        db.add_fact("likes", [Term::sym("bob"), Term::sym("cake")])
            .unwrap();
        let x = db.var();
        let mut solutions = db.query("likes", [x.clone(), Term::sym("cake")]).unwrap();
        let first = solutions.next().unwrap();
        assert_eq!(first.get(&x), Some(&Term::sym("amy")));
        let second = solutions.next().unwrap();
        assert_eq!(second.get(&x), Some(&Term::sym("bob")));
        assert_eq!(solutions.next(), None);
        // The sequence stays exhausted.
        assert_eq!(solutions.next(), None);
    }

    #[test]
    fn ground_queries_confirm_membership() {
        let db = family();
        let mut solutions = db
            .query("parent", [Term::sym("tom"), Term::sym("bob")])
            .unwrap();
        let solution = solutions.next().unwrap();
        assert!(solution.is_empty());
        assert_eq!(solutions.next(), None);
        assert_eq!(
            db.query("parent", [Term::sym("ann"), Term::sym("tom")])
                .unwrap()
                .next(),
            None
        );
    }

    #[test]
    fn unknown_relations_yield_no_solutions() {
        let db = Database::new();
        assert_eq!(db.query("missing", [Term::sym("x")]).unwrap().next(), None);
    }

    #[test]
    fn rules_resolve_through_their_bodies() {
        let mut db = family();
        add_grandparent_rule(&mut db);
        let w = db.var();
        let results: Vec<_> = db
            .query("grandparent", [Term::sym("tom"), w.clone()])
            .unwrap()
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get(&w), Some(&Term::sym("ann")));
    }

    #[test]
    fn alternatives_backtrack_through_rule_bodies_in_order() {
        let mut db = family();
        db.add_fact("parent", [Term::sym("tom"), Term::sym("liz")])
            .unwrap();
        db.add_fact("parent", [Term::sym("liz"), Term::sym("sue")])
            .unwrap();
        add_grandparent_rule(&mut db);
        let w = db.var();
        let grandchildren: Vec<_> = db
            .query("grandparent", [Term::sym("tom"), w.clone()])
            .unwrap()
            .map(|s| s.get(&w).cloned().unwrap())
            .collect();
        assert_eq!(grandchildren, vec![Term::sym("ann"), Term::sym("sue")]);
    }

    #[test]
    fn rules_enumerate_all_head_instantiations() {
        let mut db = family();
        add_grandparent_rule(&mut db);
        let a = db.var();
        let b = db.var();
        let results: Vec<_> = db
            .query("grandparent", [a.clone(), b.clone()])
            .unwrap()
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get(&a), Some(&Term::sym("tom")));
        assert_eq!(results[0].get(&b), Some(&Term::sym("ann")));
    }

    #[test]
    fn recursive_rules_get_fresh_variables_per_invocation() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut db = family();
        db.add_fact("parent", [Term::sym("ann"), Term::sym("joe")])
            .unwrap();
        let x = db.var();
        let y = db.var();
        let z = db.var();
        db.add_rule("ancestor", [x.clone(), z.clone()])
            .unwrap()
            .goal("parent", [x.clone(), z.clone()])
            .unwrap();
        db.add_rule("ancestor", [x.clone(), z.clone()])
            .unwrap()
            .goal("parent", [x, y.clone()])
            .unwrap()
            .goal("ancestor", [y, z])
            .unwrap();
        let w = db.var();
        let ancestors: Vec<_> = db
            .query("ancestor", [Term::sym("tom"), w.clone()])
            .unwrap()
            .map(|s| s.get(&w).cloned().unwrap())
            .collect();
        assert_eq!(
            ancestors,
            vec![Term::sym("bob"), Term::sym("ann"), Term::sym("joe")]
        );
    }

    #[test]
    fn facts_may_carry_variable_markers() {
        let mut db = Database::new();
        let anyone = db.var();
        db.add_fact("likes", [anyone, Term::sym("cake")]).unwrap();
        let mut solutions = db
            .query("likes", [Term::sym("zoe"), Term::sym("cake")])
            .unwrap();
        assert!(solutions.next().is_some());
        drop(solutions);
        // The fact's variable is unharmed by the previous query.
        let mut again = db
            .query("likes", [Term::sym("ada"), Term::sym("cake")])
            .unwrap();
        assert!(again.next().is_some());
    }

    #[test]
    fn solutions_with_unbound_variables_resolve_to_themselves() {
        let mut db = Database::new();
        let anyone = db.var();
        db.add_fact("likes", [anyone, Term::sym("cake")]).unwrap();
        let x = db.var();
        let solution = db
            .query("likes", [x.clone(), Term::sym("cake")])
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(solution.get(&x), Some(&x));
    }

    #[test]
    fn repeated_query_variables_constrain_solutions() {
        let mut db = Database::new();
        db.add_fact("likes", [Term::sym("amy"), Term::sym("bob")])
            .unwrap();
        db.add_fact("likes", [Term::sym("bob"), Term::sym("bob")])
            .unwrap();
        let x = db.var();
        let narcissists: Vec<_> = db
            .query("likes", [x.clone(), x.clone()])
            .unwrap()
            .map(|s| s.get(&x).cloned().unwrap())
            .collect();
        assert_eq!(narcissists, vec![Term::sym("bob")]);
    }

    #[test]
    fn solutions_project_distinct_variables_in_first_occurrence_order() {
        let mut db = family();
        let a = db.var();
        let b = db.var();
        let solution = db
            .query("parent", [a.clone(), b.clone()])
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(solution.len(), 2);
        assert_eq!(solution.get(&a), Some(&Term::sym("tom")));
        assert_eq!(solution.get(&b), Some(&Term::sym("bob")));
        let ids: Vec<VarId> = solution.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a.as_var().unwrap(), b.as_var().unwrap()]);
    }

    #[test]
    fn compound_arguments_unify_inside_queries() {
        let mut db = Database::new();
        db.add_fact(
            "edge",
            [
                Term::compound("node", [Term::int(1)]),
                Term::compound("node", [Term::int(2)]),
            ],
        )
        .unwrap();
        let x = db.var();
        let solution = db
            .query(
                "edge",
                [
                    Term::compound("node", [Term::int(1)]),
                    Term::compound("node", [x.clone()]),
                ],
            )
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(solution.get(&x), Some(&Term::int(2)));
    }

    #[test]
    fn rules_with_unsatisfiable_bodies_fail_cleanly() {
        let mut db = family();
        let x = db.var();
        db.add_rule("royal", [x.clone()])
            .unwrap()
            .goal("crowned", [x])
            .unwrap();
        assert_eq!(db.query("royal", [Term::sym("tom")]).unwrap().next(), None);
    }
}
