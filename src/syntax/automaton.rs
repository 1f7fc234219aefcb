//! LR(0) item-set automaton and the extended grammar derived from it.
//!
//! The automaton is built breadth-first from the closure of the start item;
//! states are deduplicated on their full closure. The extended grammar tags
//! every symbol with the pair of states it moves between, which gives
//! precise (LALR) lookaheads for each reduction point when Follow sets are
//! computed over it.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::errors::{CompileError, ErrorKind, Result};
use crate::syntax::grammar::{
    compute_first, compute_follow, Grammar, Production, RuleId, Slot, Symbol, SymbolLike,
    Terminal,
};

pub type StateId = usize;

// ============================================================================
// ITEMS AND ITEM SETS
// ============================================================================

/// A dotted rule: `pointer` is the position of the dot, `0..=len(rhs)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Item {
    pub rule: RuleId,
    pub pointer: usize,
}

impl Item {
    pub fn new(rule: RuleId, pointer: usize) -> Self {
        Self { rule, pointer }
    }

    /// The slot right after the dot, `None` for a complete item.
    pub fn next_slot<'g>(&self, grammar: &'g Grammar) -> Option<&'g Slot> {
        grammar.rule(self.rule).rhs.get(self.pointer)
    }

    pub fn is_complete(&self, grammar: &Grammar) -> bool {
        self.pointer == grammar.rule(self.rule).len()
    }

    /// True when the dot sits before the first or after the last slot.
    fn is_at_boundary(&self, grammar: &Grammar) -> bool {
        self.pointer == 0 || self.is_complete(grammar)
    }
}

/// A closure-complete set of items with its lexer mode.
///
/// The mode comes from the items whose dot is at either end of their rule.
/// `None` inherits the mode of the nearest moded state below it on the
/// parse stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSet {
    pub items: BTreeSet<Item>,
    pub mode: Option<String>,
}

/// Closes a kernel: every nonterminal expected after a dot contributes all
/// of its rules at pointer 0, to a fixed point.
pub fn closure(grammar: &Grammar, kernel: BTreeSet<Item>) -> BTreeSet<Item> {
    let mut items = kernel;
    let mut pending: Vec<Item> = items.iter().copied().collect();
    while let Some(item) = pending.pop() {
        let Some(slot) = item.next_slot(grammar) else {
            continue;
        };
        for name in slot.iter().filter_map(Symbol::as_nonterminal) {
            for &rule in grammar.productions_of(name) {
                let predicted = Item::new(rule, 0);
                if items.insert(predicted) {
                    pending.push(predicted);
                }
            }
        }
    }
    items
}

// ============================================================================
// TRANSLATION TABLE
// ============================================================================

/// Numbered item sets and the deterministic `(state, symbol) → state` map.
/// State 0 is always the start state.
#[derive(Debug, Clone)]
pub struct TranslationTable {
    pub states: Vec<ItemSet>,
    pub transitions: BTreeMap<(StateId, Symbol), StateId>,
}

impl TranslationTable {
    pub fn build(grammar: &Grammar) -> Result<Self> {
        let start = closure(grammar, BTreeSet::from([Item::new(grammar.start_rule(), 0)]));
        let mut sets: Vec<BTreeSet<Item>> = vec![start.clone()];
        let mut index: HashMap<BTreeSet<Item>, StateId> = HashMap::from([(start, 0)]);
        let mut transitions = BTreeMap::new();
        let mut queue = VecDeque::from([0]);

        while let Some(state) = queue.pop_front() {
            let mut moves: BTreeMap<Symbol, BTreeSet<Item>> = BTreeMap::new();
            for item in &sets[state] {
                if let Some(slot) = item.next_slot(grammar) {
                    for symbol in slot.iter() {
                        moves
                            .entry(symbol.clone())
                            .or_default()
                            .insert(Item::new(item.rule, item.pointer + 1));
                    }
                }
            }
            for (symbol, kernel) in moves {
                let target_items = closure(grammar, kernel);
                let target = match index.get(&target_items) {
                    Some(&existing) => existing,
                    None => {
                        let id = sets.len();
                        index.insert(target_items.clone(), id);
                        sets.push(target_items);
                        queue.push_back(id);
                        id
                    }
                };
                transitions.insert((state, symbol), target);
            }
        }

        let mut problems = Vec::new();
        let mut states = Vec::with_capacity(sets.len());
        for (id, items) in sets.into_iter().enumerate() {
            let modes: BTreeSet<&String> = items
                .iter()
                .filter(|item| item.is_at_boundary(grammar))
                .filter_map(|item| grammar.rule(item.rule).mode.as_ref())
                .collect();
            if modes.len() > 1 {
                let names: Vec<&str> = modes.iter().map(|m| m.as_str()).collect();
                problems.push(format!(
                    "mode/mode conflict in state {}: {}",
                    id,
                    names.join(" vs ")
                ));
            }
            let mode = modes.into_iter().next().cloned();
            states.push(ItemSet { items, mode });
        }
        if !problems.is_empty() {
            return Err(CompileError::new(ErrorKind::Grammar { problems }));
        }

        Ok(Self {
            states,
            transitions,
        })
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn goto(&self, state: StateId, symbol: &Symbol) -> Option<StateId> {
        self.transitions.get(&(state, symbol.clone())).copied()
    }
}

// ============================================================================
// EXTENDED GRAMMAR
// ============================================================================

/// A symbol tagged with the states it leads from and to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtendedSymbol {
    pub start: StateId,
    pub symbol: Symbol,
    pub end: Option<StateId>,
}

impl SymbolLike for ExtendedSymbol {
    fn terminal(&self) -> Option<&Terminal> {
        self.symbol.as_terminal()
    }
}

/// A rule of the extended grammar: one path of `rule` through the
/// automaton, starting in `lhs.start` and finishing in `final_state`.
#[derive(Debug, Clone)]
pub struct ExtendedRule {
    pub rule: RuleId,
    pub lhs: ExtendedSymbol,
    pub rhs: Vec<Vec<ExtendedSymbol>>,
    pub final_state: StateId,
}

pub fn extended_rules(grammar: &Grammar, table: &TranslationTable) -> Result<Vec<ExtendedRule>> {
    let mut out = Vec::new();
    for (state, set) in table.states.iter().enumerate() {
        for item in set.items.iter().filter(|item| item.pointer == 0) {
            let rule = grammar.rule(item.rule);
            let lhs_symbol = rule.lhs_symbol();
            let lhs = ExtendedSymbol {
                start: state,
                end: table.goto(state, &lhs_symbol),
                symbol: lhs_symbol,
            };
            walk_rule(grammar, table, item.rule, &lhs, 0, state, Vec::new(), &mut out)?;
        }
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn walk_rule(
    grammar: &Grammar,
    table: &TranslationTable,
    rule: RuleId,
    lhs: &ExtendedSymbol,
    position: usize,
    current: StateId,
    acc: Vec<Vec<ExtendedSymbol>>,
    out: &mut Vec<ExtendedRule>,
) -> Result<()> {
    let Some(slot) = grammar.rule(rule).rhs.get(position) else {
        out.push(ExtendedRule {
            rule,
            lhs: lhs.clone(),
            rhs: acc,
            final_state: current,
        });
        return Ok(());
    };

    // Alternatives reaching different states become separate rules.
    let mut groups: BTreeMap<StateId, Vec<ExtendedSymbol>> = BTreeMap::new();
    for symbol in slot.iter() {
        let target = table.goto(current, symbol).ok_or_else(|| {
            CompileError::internal(format!(
                "automaton has no move on {} from state {}",
                symbol, current
            ))
        })?;
        groups.entry(target).or_default().push(ExtendedSymbol {
            start: current,
            symbol: symbol.clone(),
            end: Some(target),
        });
    }
    for (target, symbols) in groups {
        let mut next = acc.clone();
        next.push(symbols);
        walk_rule(grammar, table, rule, lhs, position + 1, target, next, out)?;
    }
    Ok(())
}

/// Lookahead terminals for reducing each rule in each final state: the
/// union of Follow(lhs) over the extended rules that end there.
pub fn reduction_lookaheads(
    grammar: &Grammar,
    extended: &[ExtendedRule],
) -> BTreeMap<(StateId, RuleId), BTreeSet<Terminal>> {
    let productions: Vec<Production<ExtendedSymbol>> = extended
        .iter()
        .map(|rule| Production {
            lhs: rule.lhs.clone(),
            slots: rule.rhs.clone(),
        })
        .collect();
    let first = compute_first(&productions);
    let start = ExtendedSymbol {
        start: 0,
        symbol: Symbol::Nonterminal(grammar.start().to_string()),
        end: None,
    };
    let follow = compute_follow(&productions, &first, &start, grammar.end_symbols());

    let mut lookaheads: BTreeMap<(StateId, RuleId), BTreeSet<Terminal>> = BTreeMap::new();
    for rule in extended {
        let entry = lookaheads.entry((rule.final_state, rule.rule)).or_default();
        if let Some(terminals) = follow.get(&rule.lhs) {
            entry.extend(terminals.iter().cloned());
        }
    }
    lookaheads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::grammar::{nt, t, Rule};

    fn list_grammar() -> Grammar {
        Grammar::new(
            "start",
            vec![
                Rule::new("start", [nt("list")]),
                Rule::new("list", [nt("list"), t("x")]),
                Rule::new("list", [t("x")]),
            ],
            [Terminal::Eof],
        )
        .unwrap()
    }

    #[test]
    fn start_state_is_closed() {
        let grammar = list_grammar();
        let table = TranslationTable::build(&grammar).unwrap();
        assert_eq!(table.states[0].items.len(), 3);
        assert!(table.goto(0, &nt("list")).is_some());
        assert!(table.goto(0, &t("x")).is_some());
    }

    #[test]
    fn lookaheads_follow_the_list() {
        let grammar = list_grammar();
        let table = TranslationTable::build(&grammar).unwrap();
        let extended = extended_rules(&grammar, &table).unwrap();
        let lookaheads = reduction_lookaheads(&grammar, &extended);
        let after_x = table.goto(0, &t("x")).unwrap();
        let expected = BTreeSet::from([Terminal::kind("x"), Terminal::Eof]);
        assert_eq!(lookaheads.get(&(after_x, 2)), Some(&expected));
    }

    #[test]
    fn modes_switch_back_after_the_closing_token() {
        let grammar = Grammar::new(
            "start",
            vec![
                Rule::new("start", [nt("quoted")]),
                Rule::new("quoted", [t("q"), nt("body"), t("q")]).mode("outer"),
                Rule::empty("body").mode("inner"),
                Rule::new("body", [nt("body"), t("c")]).mode("inner"),
            ],
            [Terminal::Eof],
        )
        .unwrap();
        let table = TranslationTable::build(&grammar).unwrap();
        let mode = |state: StateId| table.states[state].mode.as_deref();

        let opened = table.goto(0, &t("q")).unwrap();
        let in_body = table.goto(opened, &nt("body")).unwrap();
        let closed = table.goto(in_body, &t("q")).unwrap();
        assert_eq!(mode(0), Some("outer"));
        assert_eq!(mode(opened), Some("inner"));
        assert_eq!(mode(in_body), None);
        assert_eq!(mode(closed), Some("outer"));
    }

    #[test]
    fn disagreeing_modes_are_reported() {
        let grammar = Grammar::new(
            "start",
            vec![
                Rule::new("start", [nt("choice")]),
                Rule::new("choice", [t("x")]).mode("one"),
                Rule::new("choice", [t("y")]).mode("two"),
            ],
            [Terminal::Eof],
        )
        .unwrap();
        let error = TranslationTable::build(&grammar).unwrap_err();
        match error.kind {
            ErrorKind::Grammar { problems } => {
                assert!(problems[0].contains("mode/mode conflict"), "{problems:?}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
