/*!
Cross-engine acceptance tests.

Four ways of deciding the same question must always agree: the
sequential DFA walk, the serial parallel-DFA reduction, and the
block-parallel engine on the host device with one and with many worker
threads. The tests drive them with a fixed scenario table, with inputs
generated by random walks of the DFA (biased towards acceptance), and
with plain random bytes (biased towards rejection).
*/

use parex::{
    dfa::{self, Dfa},
    engine::{CompiledPattern, Engine, HostDevice},
    nfa::thompson,
    pdfa::ParallelDfa,
    syntax, StateID,
};

/// All engines for one pattern, compiled once.
struct Engines {
    dfa: Dfa,
    pdfa: ParallelDfa,
    serial_engine: Engine<HostDevice>,
    serial_pattern: CompiledPattern<HostDevice>,
    parallel_engine: Engine<HostDevice>,
    parallel_pattern: CompiledPattern<HostDevice>,
}

impl Engines {
    fn new(pattern: &str) -> Engines {
        let parsed = syntax::parse(pattern.as_bytes()).unwrap();
        let nfa = thompson::compile(&parsed).unwrap();
        let dfa = dfa::determinize(&nfa).unwrap();
        let pdfa = ParallelDfa::new(pattern).unwrap();
        let serial_engine = Engine::new(HostDevice::with_threads(1)).unwrap();
        let serial_pattern = serial_engine.compile(pattern).unwrap();
        let parallel_engine =
            Engine::new(HostDevice::with_threads(8)).unwrap();
        let parallel_pattern = parallel_engine.compile(pattern).unwrap();
        Engines {
            dfa,
            pdfa,
            serial_engine,
            serial_pattern,
            parallel_engine,
            parallel_pattern,
        }
    }

    /// Assert that every engine returns `expected` for this input.
    fn check(&self, input: &[u8], expected: bool, what: &str) {
        assert_eq!(self.dfa.matches(input), expected, "dfa: {}", what);
        assert_eq!(self.pdfa.matches(input), expected, "pdfa: {}", what);
        assert_eq!(
            self.serial_engine
                .matches(&self.serial_pattern, input)
                .unwrap(),
            expected,
            "engine/1: {}",
            what,
        );
        assert_eq!(
            self.parallel_engine
                .matches(&self.parallel_pattern, input)
                .unwrap(),
            expected,
            "engine/8: {}",
            what,
        );
    }

    /// Assert that every engine agrees with the DFA on this input.
    fn check_agreement(&self, input: &[u8], what: &str) {
        self.check(input, self.dfa.matches(input), what);
    }
}

#[test]
fn scenario_table() {
    let scenarios: &[(&str, &[&[u8]], &[&[u8]])] = &[
        ("", &[b""], &[b"a"]),
        ("abc", &[b"abc"], &[b"", b"ab", b"abcd"]),
        ("abc|def", &[b"abc", b"def"], &[b"abcdef", b""]),
        ("a*b", &[b"b", b"aaaab"], &[b"ba", b"c", b""]),
        (
            "a(bc)*a",
            &[b"aa", b"abca", b"abcbcbca"],
            &[b"abcbc", b"a", b""],
        ),
        ("a[^b-l]c", &[b"aac", b"amc"], &[b"abc", b"alc", b"ac"]),
        (
            "[A-Za-z_][A-Za-z0-9_]*",
            &[b"_1234", b"test123", b"x"],
            &[b"123test", b"", b"no-dash"],
        ),
    ];
    for &(pattern, accepts, rejects) in scenarios {
        let engines = Engines::new(pattern);
        for &input in accepts {
            engines.check(input, true, &format!("{:?} vs {:?}", pattern, input));
        }
        for &input in rejects {
            engines.check(
                input,
                false,
                &format!("{:?} vs {:?}", pattern, input),
            );
        }
    }
}

#[test]
fn empty_pattern_edge_cases() {
    let engines = Engines::new("");
    engines.check(b"", true, "empty vs empty");
    engines.check(b"a", false, "empty vs a");

    let engines = Engines::new("a|");
    assert!(engines.pdfa.empty_is_accepting());
    engines.check(b"", true, "a| vs empty");
    engines.check(b"a", true, "a| vs a");
    engines.check(b"aa", false, "a| vs aa");
}

/// The byte-level definition of well-formed UTF-8, as a pattern.
const UTF8: &str = "([\\x00-\\x7F]\
    |[\\xC2-\\xDF][\\x80-\\xBF]\
    |\\xE0[\\xA0-\\xBF][\\x80-\\xBF]\
    |[\\xE1-\\xEC][\\x80-\\xBF][\\x80-\\xBF]\
    |\\xED[\\x80-\\x9F][\\x80-\\xBF]\
    |[\\xEE-\\xEF][\\x80-\\xBF][\\x80-\\xBF]\
    |\\xF0[\\x90-\\xBF][\\x80-\\xBF][\\x80-\\xBF]\
    |[\\xF1-\\xF3][\\x80-\\xBF][\\x80-\\xBF][\\x80-\\xBF]\
    |\\xF4[\\x80-\\x8F][\\x80-\\xBF][\\x80-\\xBF])*";

#[test]
fn utf8_pattern() {
    let engines = Engines::new(UTF8);
    let valid: &[&str] = &[
        "",
        "plain ascii",
        "naïve café",
        "κόσμε",
        "日本語テキスト",
        "🦀 emoji and ‱ punctuation",
    ];
    for &text in valid {
        debug_assert!(std::str::from_utf8(text.as_bytes()).is_ok());
        engines.check(text.as_bytes(), true, text);
    }
    let invalid: &[&[u8]] = &[
        b"\x80",                  // stray continuation
        b"\xC2",                  // truncated two-byte sequence
        b"\xC0\xAF",              // overlong encoding
        b"\xE0\x80\x80",          // overlong encoding
        b"\xED\xA0\x80",          // surrogate
        b"\xF4\x90\x80\x80",      // beyond U+10FFFF
        b"valid until \xFF here", // lone invalid byte
    ];
    for &bytes in invalid {
        debug_assert!(std::str::from_utf8(bytes).is_err());
        engines.check(bytes, false, &format!("{:?}", bytes));
    }
}

#[test]
fn round_trip_parse_render() {
    // Patterns free of `.` and of mergeable classes survive a
    // parse -> render -> parse round trip structurally.
    for pattern in
        ["abc", "a(bc)*a", "abc|def", "(a|b)+", "a[x-z]b?", "a|", ""]
    {
        let parsed = syntax::parse(pattern.as_bytes()).unwrap();
        let reparsed =
            syntax::parse(parsed.to_string().as_bytes()).unwrap();
        assert_eq!(parsed, reparsed, "pattern: {}", pattern);
    }
}

/// A tiny xorshift PRNG; the tests need cheap deterministic bytes, not
/// quality randomness.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

/// Generate an input by walking the DFA's transitions at random,
/// preferring to stop in accepting states. The walk produces inputs
/// that exercise the live part of the automaton; acceptance itself is
/// not guaranteed (dead ends are kept as useful reject cases).
fn random_walk(dfa: &Dfa, rng: &mut Rng, max_len: usize) -> Vec<u8> {
    let mut input = Vec::new();
    let mut state = StateID::ZERO;
    while input.len() < max_len {
        if dfa.is_accept(state) && rng.below(8) == 0 {
            break;
        }
        let group = dfa.transitions(state);
        if group.is_empty() {
            break;
        }
        let t = group[rng.below(group.len())];
        input.push(t.symbol);
        state = t.dst;
    }
    input
}

#[test]
fn fuzz_accept_biased_walks() {
    let patterns = [
        "a*b",
        "a(bc)*a",
        "[A-Za-z_][A-Za-z0-9_]*",
        "(a|ab)*(c|)",
        UTF8,
    ];
    let mut rng = Rng(0x9E3779B97F4A7C15);
    for pattern in patterns {
        let engines = Engines::new(pattern);
        for round in 0..40 {
            let input = random_walk(&engines.dfa, &mut rng, 2000);
            engines.check_agreement(
                &input,
                &format!("{:?} walk round {}", pattern, round),
            );
            // Mutating one byte flips many walks into rejections.
            if !input.is_empty() {
                let mut mutated = input.clone();
                let at = rng.below(mutated.len());
                mutated[at] = mutated[at].wrapping_add(1);
                engines.check_agreement(
                    &mutated,
                    &format!("{:?} mutated round {}", pattern, round),
                );
            }
        }
    }
}

#[test]
fn fuzz_reject_biased_random_bytes() {
    let patterns = ["a*b", "abc|def", "[a-m]+[n-z]+", UTF8];
    let mut rng = Rng(0xDEADBEEFCAFEF00D);
    for pattern in patterns {
        let engines = Engines::new(pattern);
        for round in 0..40 {
            let len = rng.below(3000);
            let input: Vec<u8> =
                (0..len).map(|_| rng.next() as u8).collect();
            engines.check_agreement(
                &input,
                &format!("{:?} random round {}", pattern, round),
            );
        }
    }
}

#[test]
fn large_input_crosses_reduction_levels() {
    // Large enough for several reduce passes on the wide side of the
    // tree: ~17 MiB forces two reduce passes after the initial pass.
    let engines = Engines::new("(ab)*");
    let len = 4097 * 4096;
    let mut input: Vec<u8> = std::iter::repeat([b'a', b'b'])
        .take(len / 2)
        .flatten()
        .collect();
    engines.check(&input, true, "alternating ab, 17 MiB");
    input[1234567] = b'a';
    engines.check(&input, false, "alternating ab with one flip");
}

quickcheck::quickcheck! {
    fn prop_engines_agree_on_arbitrary_bytes(input: Vec<u8>) -> bool {
        let engines = Engines::new("(a|b)*c|[0-9]+");
        let expected = engines.dfa.matches(&input);
        engines.pdfa.matches(&input) == expected
            && engines
                .serial_engine
                .matches(&engines.serial_pattern, &input)
                .unwrap()
                == expected
            && engines
                .parallel_engine
                .matches(&engines.parallel_pattern, &input)
                .unwrap()
                == expected
    }
}
