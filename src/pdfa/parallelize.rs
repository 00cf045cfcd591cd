use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::{
    dfa::Dfa,
    error::CompileError,
    pdfa::{ParaStateID, ParallelDfa},
    util::id::StateID,
};

/// The entry used in function tables for "no continuation". Distinct
/// from any DFA state index.
const REJECTED: u32 = u32::MAX;

/// A configuration for parallel DFA construction.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    state_limit: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config { state_limit: ParaStateID::LIMIT }
    }
}

impl Config {
    /// Return a new default configuration.
    pub fn new() -> Config {
        Config::default()
    }

    /// Set the maximum number of parallel states to enumerate before
    /// giving up with a `StateLimitReached` error.
    ///
    /// The default is 255, which is also the hard cap imposed by the
    /// 8-bit state encoding shared with the device kernels. Lowering
    /// the limit bounds construction time and memory for hostile
    /// patterns; raising it beyond 255 has no effect other than
    /// changing which error is reported when the hard cap is hit.
    pub fn state_limit(mut self, limit: usize) -> Config {
        self.state_limit = limit;
        self
    }

    /// Build the parallel DFA for the given DFA with this
    /// configuration.
    pub fn run(&self, dfa: &Dfa) -> Result<ParallelDfa, CompileError> {
        let runner = Runner {
            dfa,
            pool: vec![],
            cache: HashMap::new(),
            table: MergeTable::new(),
            state_limit: self.state_limit,
        };
        runner.run()
    }
}

/// One parallel state's content: the function it applies, as a vector
/// indexed by DFA state holding either a DFA state index or
/// [`REJECTED`].
type FnTable = Rc<[u32]>;

/// The working state of one parallelization.
///
/// Parallel states are content-addressed: `cache` maps a function
/// table to its interned identifier, and `pool` holds the tables by
/// identifier. Both share the same allocations.
struct Runner<'a> {
    dfa: &'a Dfa,
    pool: Vec<FnTable>,
    cache: HashMap<FnTable, ParaStateID>,
    table: MergeTable,
    state_limit: usize,
}

impl<'a> Runner<'a> {
    fn run(mut self) -> Result<ParallelDfa, CompileError> {
        // Step 1: the generators. Each input byte induces a function
        // of the DFA state set; bytes with no surviving continuation
        // at all map straight to the sentinel.
        let mut initial = Box::new([ParaStateID::REJECT; 256]);
        for byte in 0u16..256 {
            let f: Vec<u32> = (0..self.dfa.len())
                .map(|q| {
                    self.dfa
                        .next_state(StateID::must(q), byte as u8)
                        .map_or(REJECTED, |id| id.as_u32())
                })
                .collect();
            if f.iter().all(|&q| q == REJECTED) {
                continue;
            }
            initial[byte as usize] = self.intern(f)?.0;
        }
        let generators = self.pool.len();

        // Step 2: close the pool under composition. Each sweep visits
        // every ordered pair over the current pool, both ways around;
        // interning can grow the pool mid-sweep, which extends the
        // ranges of the inner loops. Stop once a full sweep discovers
        // nothing new. Termination: there are only finitely many
        // functions of a finite state set (and the state limit cuts
        // off long before that bound matters).
        let mut sweeps = 0;
        loop {
            sweeps += 1;
            let mut grew = false;
            let mut i = 0;
            while i < self.pool.len() {
                let mut j = 0;
                while j < self.pool.len() {
                    grew |= self.merge_pair(i, j)?;
                    if i != j {
                        grew |= self.merge_pair(j, i)?;
                    }
                    j += 1;
                }
                i += 1;
            }
            if !grew {
                break;
            }
        }

        // Step 3: acceptance. A parallel state accepts when its
        // function sends the DFA start state into an accepting state.
        let mut accepting = [0u64; 4];
        for (i, f) in self.pool.iter().enumerate() {
            let to = f[0];
            if to != REJECTED && self.dfa.is_accept(StateID::must(to as usize))
            {
                accepting[i / 64] |= 1 << (i % 64);
            }
        }
        let empty_is_accepting = self.dfa.is_accept(StateID::ZERO);

        let len = self.pool.len();
        let footprint = len * len + 256;
        if footprint > ParallelDfa::MAX_FOOTPRINT {
            return Err(CompileError::merge_table_overflow(
                footprint,
                ParallelDfa::MAX_FOOTPRINT,
            ));
        }
        debug!(
            "parallel DFA built: {} generators, {} states after {} sweeps, \
             {} table bytes",
            generators, len, sweeps, footprint,
        );
        Ok(ParallelDfa::from_parts(
            initial,
            self.table.finish(len),
            len,
            accepting,
            empty_is_accepting,
        ))
    }

    /// Compose pool entries `a` then `b`, intern the result and record
    /// it in the merge table. Returns true when a new parallel state
    /// was created.
    fn merge_pair(
        &mut self,
        a: usize,
        b: usize,
    ) -> Result<bool, CompileError> {
        let fa = &self.pool[a];
        let fb = &self.pool[b];
        let f: Vec<u32> = fa
            .iter()
            .map(|&mid| {
                if mid == REJECTED {
                    REJECTED
                } else {
                    fb[mid as usize]
                }
            })
            .collect();
        let (id, is_new) = if f.iter().all(|&q| q == REJECTED) {
            // The composite rejects everywhere; that *is* the
            // sentinel, not a new state.
            (ParaStateID::REJECT, false)
        } else {
            self.intern(f)?
        };
        self.table.set(a, b, id);
        Ok(is_new)
    }

    /// Intern a function table, returning its identifier and whether
    /// it was newly added. Adding a state grows the merge table to
    /// match.
    fn intern(
        &mut self,
        f: Vec<u32>,
    ) -> Result<(ParaStateID, bool), CompileError> {
        if let Some(&id) = self.cache.get(f.as_slice()) {
            return Ok((id, false));
        }
        if self.pool.len() >= self.state_limit {
            return Err(CompileError::state_limit_reached(self.state_limit));
        }
        if self.pool.len() >= ParaStateID::LIMIT {
            // Reachable only with a raised state limit: the 8-bit
            // encoding cannot address more states.
            return Err(CompileError::too_many_states(
                self.pool.len() + 1,
                ParaStateID::LIMIT,
            ));
        }
        let id = ParaStateID::new(self.pool.len());
        let f: FnTable = f.into();
        self.pool.push(Rc::clone(&f));
        self.cache.insert(f, id);
        self.table.grow(self.pool.len());
        Ok((id, true))
    }
}

/// The merge table while it grows.
///
/// A square matrix of parallel state ids with amortized doubling:
/// when the logical size outgrows the allocated capacity, the cells
/// are copy-rewritten into a larger square, with fresh rows and
/// columns initialized to reject. [`MergeTable::finish`] repacks the
/// matrix tightly for the final, immutable table.
#[derive(Debug)]
struct MergeTable {
    /// The allocated row length.
    cap: usize,
    /// The logical row length; always `<= cap`.
    len: usize,
    /// `cap * cap` cells, row-major with stride `cap`.
    cells: Vec<ParaStateID>,
}

impl MergeTable {
    fn new() -> MergeTable {
        MergeTable { cap: 0, len: 0, cells: vec![] }
    }

    /// Grow the logical size to `len` rows and columns, reallocating
    /// when the capacity is exhausted.
    fn grow(&mut self, len: usize) {
        debug_assert!(len >= self.len);
        if len > self.cap {
            let cap = core::cmp::max(len, core::cmp::max(8, self.cap * 2));
            let mut cells = vec![ParaStateID::REJECT; cap * cap];
            for row in 0..self.len {
                for col in 0..self.len {
                    cells[row * cap + col] =
                        self.cells[row * self.cap + col];
                }
            }
            self.cap = cap;
            self.cells = cells;
        }
        self.len = len;
    }

    fn set(&mut self, row: usize, col: usize, id: ParaStateID) {
        debug_assert!(row < self.len && col < self.len);
        self.cells[row * self.cap + col] = id;
    }

    /// Repack into a tight `len * len` table.
    fn finish(self, len: usize) -> Box<[ParaStateID]> {
        assert_eq!(len, self.len, "merge table size out of sync");
        let mut packed = Vec::with_capacity(len * len);
        for row in 0..len {
            packed.extend_from_slice(
                &self.cells[row * self.cap..row * self.cap + len],
            );
        }
        packed.into_boxed_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dfa, nfa::thompson, syntax::parse};

    fn dfa_of(pattern: &str) -> Dfa {
        let pattern = parse(pattern.as_bytes()).unwrap();
        let nfa = thompson::compile(&pattern).unwrap();
        dfa::determinize(&nfa).unwrap()
    }

    #[test]
    fn agrees_with_dfa_byte_by_byte() {
        // The merge table and initial states must reproduce the DFA's
        // own transition function for every input that only needs the
        // generators: simulate both on a bag of short strings.
        for pattern in ["abc", "a*b", "a(bc)*a", "[a-c]+|x"] {
            let dfa = dfa_of(pattern);
            let pdfa = Config::new().run(&dfa).unwrap();
            let alphabet = b"abcx!";
            for &b0 in alphabet {
                for &b1 in alphabet {
                    for &b2 in alphabet {
                        let input = [b0, b1, b2];
                        assert_eq!(
                            dfa.matches(&input),
                            pdfa.matches(&input),
                            "pattern {:?}, input {:?}",
                            pattern,
                            input,
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn state_limit_reached() {
        // A pattern with plenty of distinct compositions: long enough
        // literal chains generate one function per prefix length.
        let dfa = dfa_of("abcdefghijklmnop");
        let err = Config::new().state_limit(4).run(&dfa).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("state limit"), "unexpected message: {}", msg);
        assert!(Config::new().run(&dfa).is_ok());
    }

    #[test]
    fn footprint_overflow() {
        // A literal of L distinct bytes yields one parallel state per
        // non-empty substring, i.e. L*(L+1)/2 states. At L=19 that is
        // 190 states: under the 255-state cap, but 190*190 + 256
        // exceeds the 32 KiB table budget.
        let dfa = dfa_of("abcdefghijklmnopqrs");
        let err = Config::new().run(&dfa).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("device memory"), "unexpected message: {}", msg);
        // One byte shorter is 171 states, which fits.
        let dfa = dfa_of("abcdefghijklmnopqr");
        let pdfa = Config::new().run(&dfa).unwrap();
        assert_eq!(pdfa.len(), 171);
    }

    #[test]
    fn generators_dedupe() {
        // In `[ab]c`, the bytes 'a' and 'b' induce the same function
        // and must intern to the same parallel state.
        let dfa = dfa_of("[ab]c");
        let pdfa = Config::new().run(&dfa).unwrap();
        assert_eq!(pdfa.initial_state(b'a'), pdfa.initial_state(b'b'));
        assert!(pdfa.initial_state(b'z').is_reject());
    }

    #[test]
    fn merge_table_growth_preserves_entries() {
        let mut table = MergeTable::new();
        table.grow(2);
        table.set(0, 0, ParaStateID::new(1));
        table.set(1, 0, ParaStateID::new(0));
        // Force several reallocation steps.
        table.grow(9);
        table.grow(30);
        table.set(29, 29, ParaStateID::new(5));
        assert_eq!(table.cells[0], ParaStateID::new(1));
        let packed = table.finish(30);
        assert_eq!(packed.len(), 900);
        assert_eq!(packed[0], ParaStateID::new(1));
        assert_eq!(packed[30], ParaStateID::new(0));
        assert_eq!(packed[29 * 30 + 29], ParaStateID::new(5));
        assert_eq!(packed[1], ParaStateID::REJECT);
    }
}
