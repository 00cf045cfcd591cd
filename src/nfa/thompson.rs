/*!
Thompson construction: pattern tree in, epsilon-NFA out.

Each pattern node compiles to a small gadget with one entry and one
exit state, and gadgets compose by epsilon transitions. The
construction always allocates a gadget's entry state before anything
else in its subtree, so the entry of the root gadget is state 0 — the
NFA's start state.
*/

use log::debug;

use crate::{
    error::CompileError,
    nfa::{builder::Builder, Nfa},
    syntax::{Node, NodeRef, Pattern, RepeatKind},
    util::id::StateID,
};

/// Compile the given pattern into an epsilon-NFA accepting the same
/// language.
pub fn compile(pattern: &Pattern) -> Result<Nfa, CompileError> {
    let mut compiler = Compiler { pattern, builder: Builder::new() };
    let frag = compiler.compile(NodeRef::ROOT)?;
    assert_eq!(
        frag.start,
        StateID::ZERO,
        "the root fragment must start at state 0",
    );
    let nfa = compiler.builder.finish(frag.accept);
    debug!(
        "thompson NFA built: {} states, {} transitions",
        nfa.len(),
        nfa.transition_len(),
    );
    Ok(nfa)
}

/// A compiled sub-automaton with a single entry and a single exit.
#[derive(Clone, Copy, Debug)]
struct Frag {
    start: StateID,
    accept: StateID,
}

struct Compiler<'a> {
    pattern: &'a Pattern,
    builder: Builder,
}

impl<'a> Compiler<'a> {
    fn compile(&mut self, at: NodeRef) -> Result<Frag, CompileError> {
        match *self.pattern.node(at) {
            Node::Empty => self.c_empty(),
            Node::AnyNotNewline => {
                self.c_bytes((0u16..256).map(|b| b as u8).filter(|&b| b != b'\n'))
            }
            Node::Char(byte) => self.c_bytes([byte]),
            Node::CharSet(setref) => {
                let set = self.pattern.charset(setref).clone();
                self.c_bytes(set.bytes())
            }
            Node::Sequence { first, count } => self.c_sequence(first, count),
            Node::Alternation { first, count } => {
                self.c_alternation(first, count)
            }
            Node::Repeat { child, kind } => self.c_repeat(child, kind),
        }
    }

    /// A single state with no transitions: accepts exactly the empty
    /// string.
    fn c_empty(&mut self) -> Result<Frag, CompileError> {
        let state = self.builder.add_state()?;
        Ok(Frag { start: state, accept: state })
    }

    /// Two states with one byte transition per element of `bytes`.
    /// Compiles `char`, `.` and character classes.
    fn c_bytes<I: IntoIterator<Item = u8>>(
        &mut self,
        bytes: I,
    ) -> Result<Frag, CompileError> {
        let start = self.builder.add_state()?;
        let accept = self.builder.add_state()?;
        for byte in bytes {
            self.builder.add_transition(start, Some(byte), accept);
        }
        Ok(Frag { start, accept })
    }

    /// Concatenation: each child's exit is wired to the next child's
    /// entry by an epsilon transition.
    fn c_sequence(
        &mut self,
        first: NodeRef,
        count: u32,
    ) -> Result<Frag, CompileError> {
        debug_assert!(count > 0, "empty sequences parse to Node::Empty");
        let mut frag: Option<Frag> = None;
        for child in self.pattern.children(first, count) {
            let next = self.compile(child)?;
            frag = Some(match frag {
                None => next,
                Some(prev) => {
                    self.builder.add_transition(prev.accept, None, next.start);
                    Frag { start: prev.start, accept: next.accept }
                }
            });
        }
        Ok(frag.expect("sequence has at least one child"))
    }

    /// A fresh entry with epsilon transitions to every child's entry,
    /// and a fresh exit fed by every child's exit.
    fn c_alternation(
        &mut self,
        first: NodeRef,
        count: u32,
    ) -> Result<Frag, CompileError> {
        let start = self.builder.add_state()?;
        let mut frags = Vec::with_capacity(count as usize);
        for child in self.pattern.children(first, count) {
            frags.push(self.compile(child)?);
        }
        let accept = self.builder.add_state()?;
        for frag in frags {
            self.builder.add_transition(start, None, frag.start);
            self.builder.add_transition(frag.accept, None, accept);
        }
        Ok(Frag { start, accept })
    }

    fn c_repeat(
        &mut self,
        child: NodeRef,
        kind: RepeatKind,
    ) -> Result<Frag, CompileError> {
        let start = self.builder.add_state()?;
        let inner = self.compile(child)?;
        let accept = self.builder.add_state()?;
        self.builder.add_transition(start, None, inner.start);
        match kind {
            RepeatKind::ZeroOrMore => {
                self.builder.add_transition(start, None, accept);
                self.builder.add_transition(inner.accept, None, inner.start);
                self.builder.add_transition(inner.accept, None, accept);
            }
            RepeatKind::OnceOrMore => {
                self.builder.add_transition(inner.accept, None, inner.start);
                self.builder.add_transition(inner.accept, None, accept);
            }
            RepeatKind::ZeroOrOnce => {
                self.builder.add_transition(start, None, accept);
                self.builder.add_transition(inner.accept, None, accept);
            }
        }
        Ok(Frag { start, accept })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn nfa(pattern: &str) -> Nfa {
        compile(&parse(pattern.as_bytes()).unwrap()).unwrap()
    }

    fn accept_count(nfa: &Nfa) -> usize {
        nfa.state_ids().filter(|&id| nfa.is_accept(id)).count()
    }

    #[test]
    fn empty_pattern_is_one_accepting_state() {
        let nfa = nfa("");
        assert_eq!(nfa.len(), 1);
        assert_eq!(nfa.transition_len(), 0);
        assert!(nfa.is_accept(StateID::ZERO));
    }

    #[test]
    fn single_char() {
        let nfa = nfa("a");
        assert_eq!(nfa.len(), 2);
        assert_eq!(nfa.transition_len(), 1);
        let t = nfa.transitions(StateID::ZERO)[0];
        assert_eq!(t.symbol, Some(b'a'));
        assert!(nfa.is_accept(t.dst));
    }

    #[test]
    fn dot_skips_newline() {
        let nfa = nfa(".");
        assert_eq!(nfa.len(), 2);
        assert_eq!(nfa.transition_len(), 255);
        assert!(nfa
            .transitions(StateID::ZERO)
            .iter()
            .all(|t| t.symbol != Some(b'\n')));
    }

    #[test]
    fn charset_counts() {
        let nfa1 = nfa("[a-c]");
        assert_eq!(nfa1.transition_len(), 3);
        let nfa2 = nfa("[^a-c]");
        assert_eq!(nfa2.transition_len(), 253);
    }

    #[test]
    fn exactly_one_accept_state() {
        for pattern in ["", "a", "abc", "a|b|c", "a*", "(ab)+c?", "a|"] {
            let nfa = nfa(pattern);
            assert_eq!(accept_count(&nfa), 1, "pattern: {}", pattern);
        }
    }

    #[test]
    fn epsilons_sort_before_bytes() {
        let nfa = nfa("(a|b)*c");
        for id in nfa.state_ids() {
            let group = nfa.transitions(id);
            let first_byte =
                group.iter().position(|t| t.symbol.is_some());
            if let Some(first_byte) = first_byte {
                assert!(group[first_byte..]
                    .iter()
                    .all(|t| t.symbol.is_some()));
            }
        }
    }
}
