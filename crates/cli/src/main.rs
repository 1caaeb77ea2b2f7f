#![forbid(unsafe_code)]

mod script;

use arena::{Arena, ArenaConfig, ArenaError};
use script::{parse_script, Runner, ScriptError};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: arena-demo [--capacity-mb N] [--chunk-cap N] [--less-ram] [script.trace]";

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Options {
    config: ArenaConfig,
    script: Option<PathBuf>,
}

fn main() -> Result<(), CliError> {
    init_tracing();
    let opts = parse_args(env::args().skip(1).collect(), |key| env::var(key).ok())?;
    tracing::debug!(
        capacity = opts.config.capacity,
        chunk_cap = opts.config.chunk_cap,
        "arena configured"
    );
    let mut arena = Arena::try_new(opts.config)?;

    let stdout = io::stdout();
    match opts.script {
        Some(path) => run_script(&path, &mut arena, stdout.lock()),
        None => run_example(&mut arena, stdout.lock()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// The preset (`--less-ram` or the compiled-in default) is the base;
/// `ARENA_CAPACITY_MB` / `ARENA_CHUNK_CAP` override it and explicit flags
/// override both, whatever their order on the command line.
fn parse_args(
    args: Vec<String>,
    env_var: impl Fn(&str) -> Option<String>,
) -> Result<Options, CliError> {
    let mut less_ram = false;
    let mut capacity_mb = None;
    let mut chunk_cap = None;
    let mut script = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            "--less-ram" => less_ram = true,
            "--capacity-mb" => {
                let value = iter.next().ok_or_else(|| {
                    CliError::Message("expected number after --capacity-mb".into())
                })?;
                capacity_mb = Some(parse_number("--capacity-mb", &value)?);
            }
            "--chunk-cap" => {
                let value = iter.next().ok_or_else(|| {
                    CliError::Message("expected number after --chunk-cap".into())
                })?;
                chunk_cap = Some(parse_number("--chunk-cap", &value)?);
            }
            other if other.starts_with('-') => {
                return Err(CliError::Message(format!("unknown flag {other}\n{USAGE}")))
            }
            other if script.is_none() => script = Some(PathBuf::from(other)),
            _ => return Err(CliError::Message(format!("unexpected arguments\n{USAGE}"))),
        }
    }

    let mut config = if less_ram {
        ArenaConfig::less_ram()
    } else {
        ArenaConfig::default()
    };

    let env_mb = env_var("ARENA_CAPACITY_MB")
        .map(|mb| parse_number("ARENA_CAPACITY_MB", &mb).map(|n| ("ARENA_CAPACITY_MB", n)))
        .transpose()?;
    if let Some((what, mb)) = capacity_mb.map(|mb| ("--capacity-mb", mb)).or(env_mb) {
        config = ArenaConfig::try_custom_mb(mb, config.chunk_cap)
            .ok_or_else(|| CliError::Message(format!("{what}: {mb} MiB is too large")))?;
    }

    let env_cap = env_var("ARENA_CHUNK_CAP")
        .map(|cap| parse_number("ARENA_CHUNK_CAP", &cap))
        .transpose()?;
    if let Some(cap) = chunk_cap.or(env_cap) {
        config = config.with_chunk_cap(cap);
    }

    Ok(Options { config, script })
}

fn parse_number(what: &str, value: &str) -> Result<usize, CliError> {
    value
        .parse()
        .map_err(|_| CliError::Message(format!("{what}: '{value}' is not a number")))
}

/// Allocate room for the alphabet, fill and print it, then tear everything
/// down.
fn run_example(arena: &mut Arena, mut out: impl Write) -> Result<(), CliError> {
    let s = arena.allocate(26)?;
    for (i, b) in arena.bytes_mut(s)?.iter_mut().take(26).enumerate() {
        *b = b'a' + i as u8;
    }
    let text = String::from_utf8_lossy(&arena.bytes(s)?[..26]).into_owned();
    writeln!(out, "{text}").map_err(|e| CliError::Message(format!("write stdout: {e}")))?;
    arena.release(s)?;
    arena.reset_all();
    Ok(())
}

fn run_script(path: &Path, arena: &mut Arena, out: impl Write) -> Result<(), CliError> {
    let src = fs::read_to_string(path)
        .map_err(|e| CliError::Message(format!("failed to read {}: {e}", path.display())))?;
    let commands = parse_script(&src)?;
    Runner::new(arena, out).run(&commands)?;
    Ok(())
}
