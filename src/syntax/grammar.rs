//! Grammar definition for the parser generator.
//!
//! A [`Grammar`] is a list of [`Rule`]s over [`Symbol`]s plus a start
//! nonterminal and the set of terminals that may end a parse. Each position
//! of a rule's right-hand side is a [`Slot`], a set of alternative symbols,
//! so `type := ("u8" | "u16") ...` needs a single rule.
//!
//! First and Follow sets are computed here by fixed-point relaxation. The
//! same machinery serves the extended grammar built from the automaton (see
//! `automaton.rs`), hence the small [`SymbolLike`] abstraction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::errors::{CompileError, ErrorKind, Result};

pub type RuleId = usize;

// ============================================================================
// SYMBOLS
// ============================================================================

/// A terminal symbol: a token kind, end of input, or the empty marker.
///
/// `Empty` means "nothing": inside a First set it marks a nullable
/// sequence, as an action-table key it marks an action that needs no
/// lookahead token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Terminal {
    Kind(String),
    Eof,
    Empty,
}

impl Terminal {
    pub fn kind(name: impl Into<String>) -> Self {
        Terminal::Kind(name.into())
    }

    /// Human-readable form used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Terminal::Kind(kind) => format!("`{}`", kind),
            Terminal::Eof => "end of input".to_string(),
            Terminal::Empty => "nothing".to_string(),
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Kind(kind) => write!(f, "{}", kind),
            Terminal::Eof => write!(f, "$eof"),
            Terminal::Empty => write!(f, "$empty"),
        }
    }
}

/// A grammar symbol, compared and hashed by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    Terminal(Terminal),
    Nonterminal(String),
}

/// Shorthand for a token-kind terminal symbol.
pub fn t(kind: &str) -> Symbol {
    Symbol::Terminal(Terminal::kind(kind))
}

/// Shorthand for a nonterminal symbol.
pub fn nt(name: &str) -> Symbol {
    Symbol::Nonterminal(name.to_string())
}

impl Symbol {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }

    pub fn as_terminal(&self) -> Option<&Terminal> {
        match self {
            Symbol::Terminal(terminal) => Some(terminal),
            Symbol::Nonterminal(_) => None,
        }
    }

    pub fn as_nonterminal(&self) -> Option<&str> {
        match self {
            Symbol::Nonterminal(name) => Some(name),
            Symbol::Terminal(_) => None,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Terminal(terminal) => write!(f, "'{}'", terminal),
            Symbol::Nonterminal(name) => write!(f, "{}", name),
        }
    }
}

/// One right-hand-side position: a set of alternative symbols.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(BTreeSet<Symbol>);

impl Slot {
    pub fn any<I: IntoIterator<Item = Symbol>>(symbols: I) -> Self {
        let set: BTreeSet<Symbol> = symbols.into_iter().collect();
        assert!(!set.is_empty(), "a slot needs at least one symbol");
        Slot(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.0.iter()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.0.contains(symbol)
    }
}

impl From<Symbol> for Slot {
    fn from(symbol: Symbol) -> Self {
        Slot(BTreeSet::from([symbol]))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            if let Some(symbol) = self.0.iter().next() {
                return write!(f, "{}", symbol);
            }
        }
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "({})", parts.join(" | "))
    }
}

// ============================================================================
// RULES
// ============================================================================

/// A grammar rule `lhs := rhs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub lhs: String,
    pub rhs: Vec<Slot>,
    pub prec: Option<u32>,
    pub rassoc: bool,
    /// Lexer mode of the states where this rule starts or completes.
    pub mode: Option<String>,
    /// Name handed to the node builder on reduction.
    pub label: Option<String>,
}

impl Rule {
    pub fn new<I, S>(lhs: &str, rhs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Slot>,
    {
        Self {
            lhs: lhs.to_string(),
            rhs: rhs.into_iter().map(Into::into).collect(),
            prec: None,
            rassoc: false,
            mode: None,
            label: None,
        }
    }

    /// A rule with an empty right-hand side.
    pub fn empty(lhs: &str) -> Self {
        Self::new(lhs, Vec::<Slot>::new())
    }

    pub fn prec(mut self, prec: u32) -> Self {
        self.prec = Some(prec);
        self
    }

    pub fn right(mut self) -> Self {
        self.rassoc = true;
        self
    }

    pub fn mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn lhs_symbol(&self) -> Symbol {
        Symbol::Nonterminal(self.lhs.clone())
    }

    pub fn len(&self) -> usize {
        self.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :=", self.lhs)?;
        if self.rhs.is_empty() {
            write!(f, " ε")?;
        }
        for slot in &self.rhs {
            write!(f, " {}", slot)?;
        }
        Ok(())
    }
}

// ============================================================================
// GRAMMAR
// ============================================================================

/// A validated grammar with exactly one start rule.
#[derive(Debug, Clone)]
pub struct Grammar {
    start: String,
    rules: Vec<Rule>,
    end_symbols: BTreeSet<Terminal>,
    by_lhs: BTreeMap<String, Vec<RuleId>>,
    start_rule: RuleId,
}

impl Grammar {
    /// Validates the rules and builds the grammar.
    ///
    /// All structural problems (no start rule, several start rules,
    /// undefined nonterminals) are reported together.
    pub fn new<I>(start: &str, rules: Vec<Rule>, end_symbols: I) -> Result<Self>
    where
        I: IntoIterator<Item = Terminal>,
    {
        let mut by_lhs: BTreeMap<String, Vec<RuleId>> = BTreeMap::new();
        for (id, rule) in rules.iter().enumerate() {
            by_lhs.entry(rule.lhs.clone()).or_default().push(id);
        }

        let mut problems = Vec::new();
        let start_rules = by_lhs.get(start).cloned().unwrap_or_default();
        match start_rules.len() {
            0 => problems.push(format!("missing starting rule for '{}'", start)),
            1 => {}
            n => problems.push(format!("{} starting rules for '{}', expected one", n, start)),
        }

        let mut undefined = BTreeSet::new();
        for rule in &rules {
            for symbol in rule.rhs.iter().flat_map(Slot::iter) {
                if let Symbol::Nonterminal(name) = symbol {
                    if !by_lhs.contains_key(name) {
                        undefined.insert(name.clone());
                    }
                }
            }
        }
        for name in undefined {
            problems.push(format!("nonterminal '{}' has no rules", name));
        }

        if !problems.is_empty() {
            return Err(CompileError::new(ErrorKind::Grammar { problems }));
        }

        let end_symbols: BTreeSet<Terminal> = end_symbols.into_iter().collect();
        Ok(Self {
            start: start.to_string(),
            start_rule: start_rules[0],
            rules,
            end_symbols,
            by_lhs,
        })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn start_rule(&self) -> RuleId {
        self.start_rule
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn end_symbols(&self) -> &BTreeSet<Terminal> {
        &self.end_symbols
    }

    /// Rules whose left-hand side is `name`.
    pub fn productions_of(&self, name: &str) -> &[RuleId] {
        self.by_lhs.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First sets of every nonterminal; `Terminal::Empty` marks nullable ones.
    pub fn first_sets(&self) -> BTreeMap<String, BTreeSet<Terminal>> {
        let productions = self.productions();
        unwrap_names(compute_first(&productions))
    }

    /// Follow sets of every nonterminal.
    pub fn follow_sets(&self) -> BTreeMap<String, BTreeSet<Terminal>> {
        let productions = self.productions();
        let first = compute_first(&productions);
        let start = Symbol::Nonterminal(self.start.clone());
        unwrap_names(compute_follow(&productions, &first, &start, &self.end_symbols))
    }

    fn productions(&self) -> Vec<Production<Symbol>> {
        self.rules
            .iter()
            .map(|rule| Production {
                lhs: rule.lhs_symbol(),
                slots: rule
                    .rhs
                    .iter()
                    .map(|slot| slot.iter().cloned().collect())
                    .collect(),
            })
            .collect()
    }
}

fn unwrap_names(
    sets: BTreeMap<Symbol, BTreeSet<Terminal>>,
) -> BTreeMap<String, BTreeSet<Terminal>> {
    sets.into_iter()
        .filter_map(|(symbol, set)| match symbol {
            Symbol::Nonterminal(name) => Some((name, set)),
            Symbol::Terminal(_) => None,
        })
        .collect()
}

// ============================================================================
// FIRST / FOLLOW (generic over the symbol representation)
// ============================================================================

/// What First/Follow need to know about a symbol.
pub(crate) trait SymbolLike: Ord + Clone {
    fn terminal(&self) -> Option<&Terminal>;
}

impl SymbolLike for Symbol {
    fn terminal(&self) -> Option<&Terminal> {
        self.as_terminal()
    }
}

/// A production with alternation slots, in the shape First/Follow use.
#[derive(Debug, Clone)]
pub(crate) struct Production<S> {
    pub lhs: S,
    pub slots: Vec<Vec<S>>,
}

pub(crate) type TerminalSets<S> = BTreeMap<S, BTreeSet<Terminal>>;

/// First set of one symbol given the nonterminal First sets.
fn first_of_symbol<S: SymbolLike>(symbol: &S, first: &TerminalSets<S>) -> BTreeSet<Terminal> {
    match symbol.terminal() {
        Some(terminal) => BTreeSet::from([terminal.clone()]),
        None => first.get(symbol).cloned().unwrap_or_default(),
    }
}

/// First set of a sequence of slots; contains `Empty` iff the whole
/// sequence is nullable.
pub(crate) fn first_of_sequence<S: SymbolLike>(
    slots: &[Vec<S>],
    first: &TerminalSets<S>,
) -> BTreeSet<Terminal> {
    let mut result = BTreeSet::new();
    for slot in slots {
        let mut slot_first = BTreeSet::new();
        for alternative in slot {
            slot_first.extend(first_of_symbol(alternative, first));
        }
        let nullable = slot_first.remove(&Terminal::Empty);
        result.extend(slot_first);
        if !nullable {
            return result;
        }
    }
    result.insert(Terminal::Empty);
    result
}

pub(crate) fn compute_first<S: SymbolLike>(productions: &[Production<S>]) -> TerminalSets<S> {
    let mut first: TerminalSets<S> = productions
        .iter()
        .map(|p| (p.lhs.clone(), BTreeSet::new()))
        .collect();

    loop {
        let mut changed = false;
        for production in productions {
            let derived = first_of_sequence(&production.slots, &first);
            if let Some(entry) = first.get_mut(&production.lhs) {
                for terminal in derived {
                    changed |= entry.insert(terminal);
                }
            }
        }
        if !changed {
            return first;
        }
    }
}

pub(crate) fn compute_follow<S: SymbolLike>(
    productions: &[Production<S>],
    first: &TerminalSets<S>,
    start: &S,
    end_symbols: &BTreeSet<Terminal>,
) -> TerminalSets<S> {
    let mut follow: TerminalSets<S> = productions
        .iter()
        .map(|p| (p.lhs.clone(), BTreeSet::new()))
        .collect();
    follow.insert(start.clone(), end_symbols.clone());

    loop {
        let mut changed = false;
        for production in productions {
            let lhs_follow = follow.get(&production.lhs).cloned().unwrap_or_default();
            for (index, slot) in production.slots.iter().enumerate() {
                let rest = first_of_sequence(&production.slots[index + 1..], first);
                let rest_nullable = rest.contains(&Terminal::Empty);
                for symbol in slot.iter().filter(|s| s.terminal().is_none()) {
                    let entry = follow.entry(symbol.clone()).or_default();
                    for terminal in rest.iter().filter(|t| **t != Terminal::Empty) {
                        changed |= entry.insert(terminal.clone());
                    }
                    if rest_nullable {
                        for terminal in &lhs_follow {
                            changed |= entry.insert(terminal.clone());
                        }
                    }
                }
            }
        }
        if !changed {
            return follow;
        }
    }
}
