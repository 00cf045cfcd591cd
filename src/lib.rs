/*!
Whole-string regular expression matching by parallel reduction.

This crate decides whether an *entire* input is in the language of a
regular expression. Instead of walking a DFA one byte at a time, the
pattern is compiled into a *parallel DFA* (PDFA) whose states are
functions from DFA states to DFA states. Function composition is
associative, so the per-byte functions of an input can be folded by a
balanced reduction tree in logarithmic depth. That makes acceptance
testing of gigabyte-scale inputs a good fit for a GPU, with the host
only reading back a single byte at the end.

The compilation pipeline is:

```text
pattern text -> Pattern -> NFA -> DFA -> ParallelDfa
```

and each stage is available on its own (see [`syntax`], [`nfa`],
[`dfa`] and [`pdfa`]). The [`engine`] module contains the reduction
driver along with the device contract it drives; [`engine::HostDevice`]
executes the same two-kernel scheme on the CPU and is what the tests
run against.

# Example

```
use parex::{
    engine::{Engine, HostDevice},
    pdfa::ParallelDfa,
};

// Serial reduction on the host.
let pdfa = ParallelDfa::new("[A-Za-z_][A-Za-z0-9_]*")?;
assert!(pdfa.matches(b"snake_case_123"));
assert!(!pdfa.matches(b"123snake"));

// The same decision through the block-parallel engine.
let engine = Engine::new(HostDevice::new())?;
let pattern = engine.compile("[A-Za-z_][A-Za-z0-9_]*")?;
assert_eq!(engine.matches(&pattern, b"snake_case_123")?, true);
# Ok::<(), Box<dyn std::error::Error>>(())
```

# Supported syntax

`.` (any byte except `\n`), `*`, `+`, `?`, `|`, grouping with `()`,
character classes with `^` negation and `a-b` ranges, and the escapes
`\n \r \t \\ \' \" \- \^ \$ \( \) \[ \] \.` plus `\xHH`. Matching is
byte-level and acceptance-only: no capture groups, no backreferences,
no `^`/`$` anchors (the whole input must match), no counted repetition.
*/

pub use crate::{
    error::CompileError,
    util::id::{StateID, StateIDError},
};

mod automaton;
pub mod dfa;
pub mod engine;
mod error;
pub mod nfa;
pub mod pdfa;
pub mod syntax;
mod util;
