#![forbid(unsafe_code)]

use arena::{Arena, ArenaError, Offset};
use std::collections::HashMap;
use std::io::{self, Write};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: {msg}")]
    Syntax { line: usize, msg: String },
    #[error("line {line}: unknown allocation '{name}'")]
    UnknownName { line: usize, name: String },
    #[error("line {line}: '{name}' is still allocated; free it first")]
    Rebound { line: usize, name: String },
    #[error("line {line}: {len} bytes do not fit in '{name}' ({size} bytes)")]
    Overflow {
        line: usize,
        name: String,
        len: usize,
        size: usize,
    },
    #[error("line {line}: {source}")]
    Arena {
        line: usize,
        #[source]
        source: ArenaError,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One line of a trace script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Alloc { name: String, size: usize },
    Write { name: String, text: String },
    Print { name: String },
    Free { name: String },
    Collect,
    Reset,
    Dump,
}

/// Parse a script into `(line number, command)` pairs.
pub fn parse_script(src: &str) -> Result<Vec<(usize, Command)>, ScriptError> {
    let mut out = Vec::new();
    for (idx, raw) in src.lines().enumerate() {
        let line = idx + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        out.push((line, parse_line(line, text)?));
    }
    Ok(out)
}

fn parse_line(line: usize, text: &str) -> Result<Command, ScriptError> {
    let syntax = |msg: &str| ScriptError::Syntax {
        line,
        msg: msg.into(),
    };
    let (word, rest) = text
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((text, ""));

    let name_only = |rest: &str| -> Result<String, ScriptError> {
        match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
            [name] => Ok((*name).to_string()),
            _ => Err(syntax("expected exactly one allocation name")),
        }
    };

    match word {
        "alloc" => {
            let mut parts = rest.split_whitespace();
            let (Some(name), Some(size), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(syntax("usage: alloc <name> <size>"));
            };
            let size = size
                .parse()
                .map_err(|_| syntax("size must be a non-negative integer"))?;
            Ok(Command::Alloc {
                name: name.into(),
                size,
            })
        }
        "write" => {
            let Some((name, text)) = rest.split_once(char::is_whitespace) else {
                return Err(syntax("usage: write <name> <text>"));
            };
            Ok(Command::Write {
                name: name.into(),
                text: text.trim_start().into(),
            })
        }
        "print" => Ok(Command::Print {
            name: name_only(rest)?,
        }),
        "free" => Ok(Command::Free {
            name: name_only(rest)?,
        }),
        "collect" if rest.is_empty() => Ok(Command::Collect),
        "reset" if rest.is_empty() => Ok(Command::Reset),
        "dump" if rest.is_empty() => Ok(Command::Dump),
        "collect" | "reset" | "dump" => Err(syntax("command takes no arguments")),
        other => Err(syntax(&format!("unknown command '{other}'"))),
    }
}

/// Replays commands against one arena, binding names to offsets.
pub struct Runner<'a, W: Write> {
    arena: &'a mut Arena,
    names: HashMap<String, Offset>,
    out: W,
}

impl<'a, W: Write> Runner<'a, W> {
    pub fn new(arena: &'a mut Arena, out: W) -> Self {
        Self {
            arena,
            names: HashMap::new(),
            out,
        }
    }

    pub fn run(&mut self, commands: &[(usize, Command)]) -> Result<(), ScriptError> {
        for (line, cmd) in commands {
            self.step(*line, cmd)?;
        }
        Ok(())
    }

    fn step(&mut self, line: usize, cmd: &Command) -> Result<(), ScriptError> {
        let arena_err = |source| ScriptError::Arena { line, source };
        debug!(line, ?cmd, "script step");
        match cmd {
            Command::Alloc { name, size } => {
                if self.names.contains_key(name) {
                    return Err(ScriptError::Rebound {
                        line,
                        name: name.clone(),
                    });
                }
                let off = self.arena.allocate(*size).map_err(arena_err)?;
                self.names.insert(name.clone(), off);
                writeln!(self.out, "{name} = {off}")?;
            }
            Command::Write { name, text } => {
                let off = self.lookup(line, name)?;
                let region = self.arena.bytes_mut(off).map_err(arena_err)?;
                let bytes = text.as_bytes();
                if bytes.len() > region.len() {
                    return Err(ScriptError::Overflow {
                        line,
                        name: name.clone(),
                        len: bytes.len(),
                        size: region.len(),
                    });
                }
                region[..bytes.len()].copy_from_slice(bytes);
                region[bytes.len()..].fill(0);
            }
            Command::Print { name } => {
                let off = self.lookup(line, name)?;
                let region = self.arena.bytes(off).map_err(arena_err)?;
                let end = region.iter().position(|&b| b == 0).unwrap_or(region.len());
                writeln!(self.out, "{}", String::from_utf8_lossy(&region[..end]))?;
            }
            Command::Free { name } => {
                let off = self.lookup(line, name)?;
                self.arena.release(off).map_err(arena_err)?;
                self.names.remove(name);
            }
            Command::Collect => {
                let report = self.arena.coalesce();
                writeln!(
                    self.out,
                    "collect: merged {}, reclaimed {}",
                    report.merged, report.reclaimed
                )?;
            }
            Command::Reset => {
                self.arena.reset_all();
                self.names.clear();
            }
            Command::Dump => {
                write!(self.out, "{}", self.arena)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, line: usize, name: &str) -> Result<Offset, ScriptError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ScriptError::UnknownName {
                line,
                name: name.into(),
            })
    }
}
