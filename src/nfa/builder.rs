use crate::{
    automaton::{State, Transition},
    error::CompileError,
    nfa::Nfa,
    util::id::StateID,
};

/// An NFA under construction.
///
/// The Thompson compiler records states and transitions in whatever
/// order its recursion visits them; transitions arrive as a typed edge
/// list. [`Builder::finish`] sorts the edges into the contiguous,
/// symbol-ordered groups that the final [`Nfa`] representation
/// requires and marks the single accepting state.
#[derive(Clone, Debug, Default)]
pub(crate) struct Builder {
    state_count: usize,
    edges: Vec<Edge>,
}

#[derive(Clone, Copy, Debug)]
struct Edge {
    from: StateID,
    symbol: Option<u8>,
    to: StateID,
}

impl Builder {
    pub(crate) fn new() -> Builder {
        Builder::default()
    }

    /// Add a new state with no transitions and return its identifier.
    pub(crate) fn add_state(&mut self) -> Result<StateID, CompileError> {
        let id = StateID::new(self.state_count).map_err(|_| {
            CompileError::too_many_states(self.state_count, StateID::LIMIT)
        })?;
        self.state_count += 1;
        Ok(id)
    }

    /// Add a transition. A symbol of `None` is an epsilon transition.
    pub(crate) fn add_transition(
        &mut self,
        from: StateID,
        symbol: Option<u8>,
        to: StateID,
    ) {
        debug_assert!(from.as_usize() < self.state_count);
        debug_assert!(to.as_usize() < self.state_count);
        self.edges.push(Edge { from, symbol, to });
    }

    /// Assemble the final NFA, with `accept` as its single accepting
    /// state.
    pub(crate) fn finish(mut self, accept: StateID) -> Nfa {
        // `Option<u8>` orders `None` first, which is exactly the
        // epsilon-before-bytes order each group must have.
        self.edges.sort_by_key(|e| (e.from, e.symbol));

        let mut states = Vec::with_capacity(self.state_count);
        let mut transitions = Vec::with_capacity(self.edges.len());
        let mut edges = self.edges.into_iter().peekable();
        for id in 0..self.state_count {
            let first = transitions.len();
            while let Some(edge) =
                edges.next_if(|e| e.from.as_usize() == id)
            {
                transitions
                    .push(Transition { dst: edge.to, symbol: edge.symbol });
            }
            states.push(State::new(
                first,
                transitions.len() - first,
                id == accept.as_usize(),
            ));
        }
        Nfa::from_parts(states, transitions)
    }
}
