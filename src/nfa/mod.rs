/*!
The epsilon-NFA and its construction from a pattern.

An [`Nfa`] is an [`Automaton`] whose symbols are `Option<u8>`: `None`
is an epsilon transition and sorts before every byte symbol, so the
epsilon transitions of a state always form a prefix of its transition
group. The subset construction relies on that ordering to stop scanning
a group at the first byte transition.

NFAs are built by [`thompson::compile`] from a parsed pattern. Every
NFA built by this crate starts at state 0 and has exactly one accepting
state.
*/

pub use crate::automaton::{Automaton, State, Transition};

pub mod thompson;

mod builder;

/// An epsilon-NFA. The symbol `None` denotes an epsilon transition.
pub type Nfa = Automaton<Option<u8>>;

impl Nfa {
    /// Returns the transitions of the given state that consume a byte,
    /// i.e. its transition group without the epsilon prefix.
    pub fn byte_transitions(
        &self,
        id: crate::util::id::StateID,
    ) -> &[Transition<Option<u8>>] {
        let group = self.transitions(id);
        let start = group.iter().position(|t| t.symbol.is_some());
        match start {
            None => &[],
            Some(start) => &group[start..],
        }
    }
}
