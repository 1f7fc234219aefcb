//! Action/goto table construction.
//!
//! Shifts and gotos come straight from the automaton's transitions;
//! reductions come from the extended grammar's lookaheads. Where a shift and
//! a reduction (or two reductions) compete for the same lookahead, rule
//! precedence and associativity decide. Conflicts that precedence cannot
//! settle are collected and reported together, so one build shows the
//! grammar author every problem.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::syntax::automaton::{
    extended_rules, reduction_lookaheads, StateId, TranslationTable,
};
use crate::syntax::grammar::{Grammar, RuleId, Symbol, Terminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Shift(StateId),
    Reduce(RuleId),
    Accept(RuleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    ShiftReduce,
    ReduceReduce,
}

/// An ambiguity the grammar's precedences do not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub state: StateId,
    pub lookahead: Terminal,
    pub rules: Vec<String>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ConflictKind::ShiftReduce => "shift/reduce",
            ConflictKind::ReduceReduce => "reduce/reduce",
        };
        write!(
            f,
            "{} conflict in state {} on {}: {}",
            kind,
            self.state,
            self.lookahead.describe(),
            self.rules.join(" vs ")
        )
    }
}

/// The generated parser's tables.
#[derive(Debug, Clone)]
pub struct ParseTable {
    grammar: Grammar,
    actions: Vec<BTreeMap<Terminal, Action>>,
    gotos: Vec<BTreeMap<String, StateId>>,
    modes: Vec<Option<String>>,
}

impl ParseTable {
    pub fn build(grammar: Grammar) -> Result<Self> {
        let automaton = TranslationTable::build(&grammar)?;
        let extended = extended_rules(&grammar, &automaton)?;
        let lookaheads = reduction_lookaheads(&grammar, &extended);

        let state_count = automaton.len();
        let mut actions: Vec<BTreeMap<Terminal, Action>> = vec![BTreeMap::new(); state_count];
        let mut gotos: Vec<BTreeMap<String, StateId>> = vec![BTreeMap::new(); state_count];

        for ((state, symbol), &target) in &automaton.transitions {
            match symbol {
                Symbol::Terminal(terminal) => {
                    actions[*state].insert(terminal.clone(), Action::Shift(target));
                }
                Symbol::Nonterminal(name) => {
                    gotos[*state].insert(name.clone(), target);
                }
            }
        }

        let mut conflicts = Vec::new();
        for (&(state, rule), terminals) in &lookaheads {
            for terminal in terminals {
                let candidate =
                    if rule == grammar.start_rule() && grammar.end_symbols().contains(terminal) {
                        Action::Accept(rule)
                    } else {
                        Action::Reduce(rule)
                    };
                let existing = actions[state].get(terminal).copied();
                let resolved = match existing {
                    None => Ok(candidate),
                    Some(Action::Shift(target)) => {
                        let shift = shift_precedence(&grammar, &automaton, state, terminal);
                        resolve_shift_reduce(&grammar, shift, rule).map(|shift_wins| {
                            if shift_wins {
                                Action::Shift(target)
                            } else {
                                candidate
                            }
                        })
                    }
                    Some(present @ (Action::Reduce(other) | Action::Accept(other))) => {
                        if other == rule {
                            Ok(candidate)
                        } else {
                            resolve_reduce_reduce(&grammar, other, rule).map(|keep_present| {
                                if keep_present {
                                    present
                                } else {
                                    candidate
                                }
                            })
                        }
                    }
                };
                match resolved {
                    Ok(action) => {
                        actions[state].insert(terminal.clone(), action);
                    }
                    Err((kind, rules)) => conflicts.push(Conflict {
                        kind,
                        state,
                        lookahead: terminal.clone(),
                        rules,
                    }),
                }
            }
        }

        if !conflicts.is_empty() {
            let problems = conflicts.iter().map(|c| c.to_string()).collect();
            return Err(CompileError::new(ErrorKind::Grammar { problems }));
        }

        tracing::debug!(
            states = state_count,
            rules = grammar.rules().len(),
            "built parse table for '{}'",
            grammar.start()
        );

        let modes = automaton.states.into_iter().map(|s| s.mode).collect();
        Ok(Self {
            grammar,
            actions,
            gotos,
            modes,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn state_count(&self) -> usize {
        self.actions.len()
    }

    pub fn action(&self, state: StateId, terminal: &Terminal) -> Option<Action> {
        self.actions.get(state)?.get(terminal).copied()
    }

    pub fn goto(&self, state: StateId, nonterminal: &str) -> Option<StateId> {
        self.gotos.get(state)?.get(nonterminal).copied()
    }

    /// The action of a state that needs no lookahead at all: its only entry
    /// is keyed by `Terminal::Empty`.
    pub fn lookahead_free(&self, state: StateId) -> Option<Action> {
        let actions = self.actions.get(state)?;
        if actions.len() == 1 {
            actions.get(&Terminal::Empty).copied()
        } else {
            None
        }
    }

    /// Terminals that have an action in `state`.
    pub fn expected(&self, state: StateId) -> Vec<Terminal> {
        self.actions
            .get(state)
            .map(|actions| {
                actions
                    .keys()
                    .filter(|t| **t != Terminal::Empty)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The lexer mode of `state`, `None` if it inherits.
    pub fn mode(&self, state: StateId) -> Option<&str> {
        self.modes.get(state)?.as_deref()
    }
}

/// Precedence of shifting `terminal` in `state`: the highest precedence of
/// the items that shift it, `None` if any of them has none. The flag is set
/// when a highest-precedence item is right-associative.
fn shift_precedence(
    grammar: &Grammar,
    automaton: &TranslationTable,
    state: StateId,
    terminal: &Terminal,
) -> Option<(u32, bool)> {
    let symbol = Symbol::Terminal(terminal.clone());
    let mut best: Option<(u32, bool)> = None;
    for item in &automaton.states[state].items {
        let Some(slot) = item.next_slot(grammar) else {
            continue;
        };
        if !slot.contains(&symbol) {
            continue;
        }
        let rule = grammar.rule(item.rule);
        let prec = rule.prec?;
        best = match best {
            Some((current, rassoc)) if current > prec => Some((current, rassoc)),
            Some((current, rassoc)) if current == prec => Some((current, rassoc || rule.rassoc)),
            _ => Some((prec, rule.rassoc)),
        };
    }
    best
}

type Unresolved = (ConflictKind, Vec<String>);

/// `Ok(true)` when the shift wins.
fn resolve_shift_reduce(
    grammar: &Grammar,
    shift: Option<(u32, bool)>,
    reduce: RuleId,
) -> std::result::Result<bool, Unresolved> {
    let reduce_rule = grammar.rule(reduce);
    match (shift, reduce_rule.prec) {
        (Some((shift_prec, rassoc)), Some(reduce_prec)) => {
            Ok(shift_prec > reduce_prec || (shift_prec == reduce_prec && rassoc))
        }
        _ => Err((
            ConflictKind::ShiftReduce,
            vec!["shift".to_string(), format!("reduce {}", reduce_rule)],
        )),
    }
}

/// `Ok(true)` when the already present reduction wins.
fn resolve_reduce_reduce(
    grammar: &Grammar,
    existing: RuleId,
    candidate: RuleId,
) -> std::result::Result<bool, Unresolved> {
    let a = grammar.rule(existing);
    let b = grammar.rule(candidate);
    match (a.prec, b.prec) {
        (Some(pa), Some(pb)) if pa != pb => Ok(pa > pb),
        _ => Err((
            ConflictKind::ReduceReduce,
            vec![format!("reduce {}", a), format!("reduce {}", b)],
        )),
    }
}
