use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::{
    automaton::{State, Transition},
    dfa::Dfa,
    error::CompileError,
    nfa::Nfa,
    util::{byteset::ByteSet, id::StateID, sparse_set::SparseSet},
};

/// Convert the given NFA to an equivalent DFA with the default
/// configuration.
pub fn determinize(nfa: &Nfa) -> Result<Dfa, CompileError> {
    Config::new().run(nfa)
}

/// A configuration for subset construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    state_limit: Option<usize>,
}

impl Config {
    /// Return a new default configuration.
    pub fn new() -> Config {
        Config::default()
    }

    /// Set a limit on the number of DFA states.
    ///
    /// Subset construction can in principle build exponentially many
    /// states. When a limit is set and reached, construction fails
    /// instead of exhausting memory. By default there is no limit.
    pub fn state_limit(mut self, limit: Option<usize>) -> Config {
        self.state_limit = limit;
        self
    }

    /// Run subset construction on the given NFA with this
    /// configuration.
    pub fn run(&self, nfa: &Nfa) -> Result<Dfa, CompileError> {
        let runner = Runner {
            nfa,
            scratch: SparseSet::new(nfa.len()),
            stack: vec![],
            subsets: vec![],
            cache: HashMap::new(),
            states: vec![],
            transitions: vec![],
            state_limit: self.state_limit.unwrap_or(StateID::LIMIT),
        };
        runner.run()
    }
}

/// The working state of one subset construction.
///
/// Each DFA state is a set of NFA states, canonicalized by sorting, so
/// that two discoveries of the same subset intern to the same DFA
/// state regardless of the order in which its members were found.
struct Runner<'a> {
    /// The NFA being determinized.
    nfa: &'a Nfa,
    /// Scratch space for computing epsilon closures and move sets.
    scratch: SparseSet,
    /// Scratch space for the closure worklist, for depth first
    /// traversal without recursion.
    stack: Vec<StateID>,
    /// The canonical (sorted) NFA subset of each DFA state, indexed by
    /// DFA state.
    subsets: Vec<Rc<[StateID]>>,
    /// Maps a canonical subset to its interned DFA state, so equal
    /// subsets share one state. The keys are the same allocations as
    /// in `subsets`.
    cache: HashMap<Rc<[StateID]>, StateID>,
    /// The DFA state table under construction. A state's transition
    /// range is filled in when the worklist processes it.
    states: Vec<State>,
    /// The DFA transition table under construction.
    transitions: Vec<Transition<u8>>,
    /// Maximum number of DFA states before giving up.
    state_limit: usize,
}

impl<'a> Runner<'a> {
    fn run(mut self) -> Result<Dfa, CompileError> {
        // The start state is the closure of the NFA start state.
        self.scratch.clear();
        self.closure(StateID::ZERO);
        let (start, _) = self.intern_scratch()?;
        debug_assert_eq!(start, StateID::ZERO);

        let mut uncompiled = vec![start];
        while let Some(dfa_id) = uncompiled.pop() {
            let subset = Rc::clone(&self.subsets[dfa_id]);
            let first = self.transitions.len();
            for byte in self.follow(&subset).iter() {
                self.scratch.clear();
                self.move_closure(&subset, byte);
                if self.scratch.is_empty() {
                    // No live NFA state: rejection is represented by
                    // the absence of a transition.
                    continue;
                }
                let (next, is_new) = self.intern_scratch()?;
                self.transitions.push(Transition { dst: next, symbol: byte });
                if is_new {
                    uncompiled.push(next);
                }
            }
            let len = self.transitions.len() - first;
            let accept = self.states[dfa_id].is_accept();
            self.states[dfa_id] = State::new(first, len, accept);
        }

        debug!(
            "determinized NFA with {} states into DFA with {} states",
            self.nfa.len(),
            self.states.len(),
        );
        Ok(Dfa::from_parts(self.states, self.transitions))
    }

    /// Add the epsilon closure of `start` to the scratch set.
    ///
    /// Epsilon transitions sort first in every group, so the scan of a
    /// group stops at its first byte transition.
    fn closure(&mut self, start: StateID) {
        self.stack.push(start);
        while let Some(id) = self.stack.pop() {
            if !self.scratch.insert(id) {
                continue;
            }
            for t in self.nfa.transitions(id) {
                if t.symbol.is_some() {
                    break;
                }
                self.stack.push(t.dst);
            }
        }
    }

    /// Returns the set of bytes for which any state in `subset` has an
    /// outgoing byte transition.
    fn follow(&self, subset: &[StateID]) -> ByteSet {
        let mut set = ByteSet::empty();
        for &id in subset {
            for t in self.nfa.byte_transitions(id) {
                set.add(t.symbol.expect("byte transition"));
            }
        }
        set
    }

    /// Compute `closure(move(subset, byte))` into the scratch set.
    fn move_closure(&mut self, subset: &[StateID], byte: u8) {
        for &id in subset {
            for t in self.nfa.byte_transitions(id) {
                if t.symbol == Some(byte) {
                    self.closure(t.dst);
                }
            }
        }
    }

    /// Intern the scratch set as a DFA state, canonicalizing it by
    /// sorting. Returns the state's identifier and whether it was
    /// newly created.
    fn intern_scratch(&mut self) -> Result<(StateID, bool), CompileError> {
        let mut members: Vec<StateID> = self.scratch.iter().collect();
        members.sort();
        let subset: Rc<[StateID]> = members.into();
        if let Some(&id) = self.cache.get(&subset) {
            return Ok((id, false));
        }
        if self.states.len() >= self.state_limit {
            return Err(CompileError::too_many_states(
                self.states.len() + 1,
                self.state_limit,
            ));
        }
        let id = StateID::new(self.states.len()).map_err(|_| {
            CompileError::too_many_states(self.states.len(), StateID::LIMIT)
        })?;
        let accept =
            subset.iter().any(|&nfa_id| self.nfa.is_accept(nfa_id));
        // The transition range is a placeholder until the worklist
        // processes this state.
        self.states.push(State::new(0, 0, accept));
        self.subsets.push(Rc::clone(&subset));
        self.cache.insert(subset, id);
        Ok((id, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{nfa::thompson, syntax::parse};

    fn dfa(pattern: &str) -> Dfa {
        let pattern = parse(pattern.as_bytes()).unwrap();
        let nfa = thompson::compile(&pattern).unwrap();
        determinize(&nfa).unwrap()
    }

    #[test]
    fn start_state_is_zero_and_closed() {
        // `a*` has an epsilon path from the start to the accept, so
        // DFA state 0 must be accepting.
        let dfa = dfa("a*");
        assert!(dfa.is_accept(StateID::ZERO));
    }

    #[test]
    fn equal_subsets_are_shared() {
        // Every `a` after the first leads back to the same subset, so
        // the DFA stays finite (and tiny) despite the loop.
        let dfa1 = dfa("a*");
        assert_eq!(dfa1.len(), 2);
        let dfa2 = dfa("(ab)*");
        assert_eq!(dfa2.len(), 3);
    }

    #[test]
    fn any_byte_star() {
        let dfa = dfa("[\\x00-\\xFF]*");
        // No minimization happens, so the start state and the loop
        // state stay separate. Both accept.
        assert_eq!(dfa.len(), 2);
        assert!(dfa.state_ids().all(|id| dfa.is_accept(id)));
        assert_eq!(dfa.transitions(StateID::ZERO).len(), 256);
    }

    #[test]
    fn state_limit_is_respected() {
        let pattern = parse(b"abcdefgh").unwrap();
        let nfa = thompson::compile(&pattern).unwrap();
        assert!(Config::new().state_limit(Some(4)).run(&nfa).is_err());
        assert!(Config::new().state_limit(Some(64)).run(&nfa).is_ok());
    }

    #[test]
    fn agrees_with_language() {
        let dfa = dfa("a(bc)*a");
        assert!(dfa.matches(b"aa"));
        assert!(dfa.matches(b"abca"));
        assert!(dfa.matches(b"abcbcbca"));
        assert!(!dfa.matches(b"abcbc"));
        assert!(!dfa.matches(b"a"));
    }
}
