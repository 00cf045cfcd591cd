use crate::syntax::ParseError;

/// An error that occurred while compiling a pattern into an automaton.
///
/// This error does not provide many introspection capabilities. There
/// are generally only two things you can do with it:
///
/// * Obtain a human readable message via its `std::fmt::Display` impl.
/// * Access an underlying [`ParseError`] from its `source` method via
///   the `std::error::Error` trait, when compilation failed before any
///   automaton was built.
///
/// Otherwise, compile errors occur when one of the automata breaches a
/// size cap. The parallel DFA in particular is limited to 255 states
/// (one 8-bit index value is reserved for the reject sentinel) and to
/// a 32 KiB device table footprint, because both kernels keep the full
/// merge table in block-local memory. Patterns exceeding the caps
/// cannot be compiled without changing the pattern.
#[derive(Clone, Debug)]
pub struct CompileError {
    kind: ErrorKind,
}

#[derive(Clone, Debug)]
enum ErrorKind {
    /// An error that occurred while parsing the pattern text.
    Parse(ParseError),
    /// Too many states for the automaton's state index type, or for a
    /// configured determinization limit.
    TooManyStates { given: usize, limit: usize },
    /// The configured parallel-DFA state limit was reached during the
    /// merge closure.
    StateLimitReached { limit: usize },
    /// The parallel DFA's tables would not fit the device's block
    /// memory budget.
    MergeTableOverflow { footprint: usize, limit: usize },
}

impl CompileError {
    fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn parse(err: ParseError) -> CompileError {
        CompileError { kind: ErrorKind::Parse(err) }
    }

    pub(crate) fn too_many_states(
        given: usize,
        limit: usize,
    ) -> CompileError {
        CompileError { kind: ErrorKind::TooManyStates { given, limit } }
    }

    pub(crate) fn state_limit_reached(limit: usize) -> CompileError {
        CompileError { kind: ErrorKind::StateLimitReached { limit } }
    }

    pub(crate) fn merge_table_overflow(
        footprint: usize,
        limit: usize,
    ) -> CompileError {
        CompileError {
            kind: ErrorKind::MergeTableOverflow { footprint, limit },
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind() {
            ErrorKind::Parse(ref err) => Some(err),
            ErrorKind::TooManyStates { .. } => None,
            ErrorKind::StateLimitReached { .. } => None,
            ErrorKind::MergeTableOverflow { .. } => None,
        }
    }
}

impl core::fmt::Display for CompileError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.kind() {
            ErrorKind::Parse(_) => write!(f, "error parsing pattern"),
            ErrorKind::TooManyStates { given, limit } => write!(
                f,
                "building the automaton requires {} states, \
                 which exceeds the limit of {}",
                given, limit,
            ),
            ErrorKind::StateLimitReached { limit } => write!(
                f,
                "parallel DFA construction reached the state limit of {}",
                limit,
            ),
            ErrorKind::MergeTableOverflow { footprint, limit } => write!(
                f,
                "parallel DFA tables require {} bytes of device memory, \
                 which exceeds the limit of {}",
                footprint, limit,
            ),
        }
    }
}
