use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use log::debug;

use parex::{
    dfa,
    engine::{Engine, HostDevice},
    nfa::thompson,
    pdfa::ParallelDfa,
    syntax,
};

const USAGE: &str = "\
Decide whether an entire input matches a regular expression.

USAGE:
    parex [OPTIONS] <pattern> <path>

    Reads the input from <path>, or from stdin when <path> is '-'.
    Exits 0 when the whole input matches, 1 when it does not.

OPTIONS:
    -e, --engine <which>    One of: dfa, serial, parallel [default: parallel]
    -t, --threads <n>       Worker threads for the parallel engine
    -q, --quiet             Do not print the verdict
    -h, --help              Print this help
";

fn main() -> anyhow::Result<()> {
    env_logger::init();
    match run(&mut lexopt::Parser::from_env()) {
        Ok(matched) => {
            std::process::exit(if matched { 0 } else { 1 });
        }
        Err(err) => {
            if std::env::var("RUST_BACKTRACE").map_or(false, |v| v == "1") {
                writeln!(&mut std::io::stderr(), "{:?}", err).unwrap();
            } else {
                writeln!(&mut std::io::stderr(), "{:#}", err).unwrap();
            }
            std::process::exit(2);
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Which {
    Dfa,
    Serial,
    Parallel,
}

fn run(p: &mut lexopt::Parser) -> anyhow::Result<bool> {
    use lexopt::Arg::*;

    let mut which = Which::Parallel;
    let mut threads: Option<usize> = None;
    let mut quiet = false;
    let mut pattern: Option<String> = None;
    let mut path: Option<PathBuf> = None;
    while let Some(arg) = p.next()? {
        match arg {
            Short('h') | Long("help") => {
                print!("{}", USAGE);
                std::process::exit(0);
            }
            Short('q') | Long("quiet") => {
                quiet = true;
            }
            Short('e') | Long("engine") => {
                which = match p.value()?.to_str() {
                    Some("dfa") => Which::Dfa,
                    Some("serial") => Which::Serial,
                    Some("parallel") => Which::Parallel,
                    _ => anyhow::bail!(
                        "--engine must be one of: dfa, serial, parallel"
                    ),
                };
            }
            Short('t') | Long("threads") => {
                let value = p.value()?.into_string().map_err(|_| {
                    anyhow::anyhow!("--threads must be a number")
                })?;
                threads =
                    Some(value.parse().context("--threads must be a number")?);
            }
            Value(v) if pattern.is_none() => {
                pattern = Some(
                    v.into_string()
                        .map_err(|_| anyhow::anyhow!("pattern not UTF-8"))?,
                );
            }
            Value(v) if path.is_none() => {
                path = Some(PathBuf::from(v));
            }
            arg => {
                return Err(anyhow::anyhow!("unexpected argument {:?}", arg)
                    .context(USAGE));
            }
        }
    }
    let pattern = pattern.with_context(|| USAGE)?;
    let path = path.with_context(|| USAGE)?;

    let haystack = read_input(&path)?;
    debug!("input loaded: {} bytes", haystack.len());

    let matched = match which {
        Which::Dfa => {
            let parsed = syntax::parse(pattern.as_bytes())
                .with_context(|| format!("failed to parse {:?}", pattern))?;
            let nfa = thompson::compile(&parsed)?;
            let dfa = dfa::determinize(&nfa)?;
            dfa.matches(&haystack)
        }
        Which::Serial => {
            let pdfa = ParallelDfa::new(&pattern)
                .with_context(|| format!("failed to compile {:?}", pattern))?;
            pdfa.matches(&haystack)
        }
        Which::Parallel => {
            let device = match threads {
                None => HostDevice::new(),
                Some(threads) => HostDevice::with_threads(threads),
            };
            let engine = Engine::new(device)?;
            let compiled = engine
                .compile(&pattern)
                .with_context(|| format!("failed to compile {:?}", pattern))?;
            engine.matches(&compiled, &haystack)?
        }
    };
    if !quiet {
        println!("{}", if matched { "match" } else { "no match" });
    }
    Ok(matched)
}

/// Read the haystack, memory mapping regular files so that
/// gigabyte-scale inputs do not get copied.
fn read_input(path: &std::path::Path) -> anyhow::Result<Input> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
        return Ok(Input::Owned(buf));
    }
    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    // SAFETY: we only read the mapping, and the process does not
    // write to the underlying file while it is mapped.
    let map = unsafe {
        memmap2::Mmap::map(&file)
            .with_context(|| format!("failed to mmap {}", path.display()))?
    };
    Ok(Input::Mapped(map))
}

enum Input {
    Owned(Vec<u8>),
    Mapped(memmap2::Mmap),
}

impl std::ops::Deref for Input {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Input::Owned(buf) => buf,
            Input::Mapped(map) => map,
        }
    }
}
