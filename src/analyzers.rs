//! External analysis tools.
//!
//! Each analyzer is a shell command template run through `sh -c`. Its
//! stdout and stderr are captured as opaque text and attached to the
//! prompt; nothing here interprets the tools' output formats.

use globset::{Glob, GlobSet, GlobSetBuilder};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

use crate::sink::{ByteSink, SinkError};

lazy_static! {
    /// `{file}`, `{dir}` and `{stem}` placeholders in command templates.
    static ref PLACEHOLDER: Regex = Regex::new(r"\{(file|dir|stem)\}").unwrap();
}

/// Errors raised while running an analyzer.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("failed to run analyzer {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read output of analyzer {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("analyzer {name} output: {source}")]
    Output {
        name: String,
        #[source]
        source: SinkError,
    },
}

/// One configured analyzer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzerSpec {
    pub name: String,
    /// Shell command template, e.g. `cppcheck --enable=all {file}`.
    pub command: String,
    /// Glob patterns selecting the files this analyzer runs on (empty: all).
    #[serde(default)]
    pub files: Vec<String>,
    /// Whether a failure to launch aborts the run.
    #[serde(default)]
    pub required: bool,
}

impl AnalyzerSpec {
    /// Compile the `files` patterns; `None` means the analyzer runs on every file.
    pub fn file_matcher(&self) -> Result<Option<GlobSet>, globset::Error> {
        if self.files.is_empty() {
            return Ok(None);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in &self.files {
            builder.add(Glob::new(pattern)?);
        }
        builder.build().map(Some)
    }

    /// Whether this analyzer should run for `file`.
    ///
    /// Patterns are tried against the file name and the full path.
    pub fn applies_to(&self, file: &Path) -> Result<bool, globset::Error> {
        let Some(set) = self.file_matcher()? else {
            return Ok(true);
        };

        let name_matches = file
            .file_name()
            .map(|n| set.is_match(Path::new(n)))
            .unwrap_or(false);
        Ok(name_matches || set.is_match(file))
    }
}

/// Analyzers written by `gpt-analyzer init --analyzers`.
pub fn presets() -> Vec<AnalyzerSpec> {
    let c_files = || vec!["*.c".to_string(), "*.h".to_string()];
    vec![
        AnalyzerSpec {
            name: "cppcheck".to_string(),
            command: "cppcheck --enable=all --inconclusive --quiet --suppress=missingIncludeSystem {file}"
                .to_string(),
            files: c_files(),
            required: false,
        },
        AnalyzerSpec {
            name: "flawfinder".to_string(),
            command: "flawfinder --columns --context {file}".to_string(),
            files: c_files(),
            required: false,
        },
        AnalyzerSpec {
            name: "gcc-warnings".to_string(),
            command: "gcc -fsyntax-only -Wall -Wextra -Wpedantic -Wformat=2 -Wshadow {file}"
                .to_string(),
            files: vec!["*.c".to_string()],
            required: false,
        },
    ]
}

/// Captured output of one analyzer run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerOutput {
    pub name: String,
    pub command: String,
    /// Exit code, or `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout then stderr, lossily decoded.
    pub output: String,
    /// Whether output was cut at the configured byte limit.
    pub truncated: bool,
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Substitute placeholders in `template` with quoted values derived from `file`.
pub fn expand_command(template: &str, file: &Path) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let value = match &caps[1] {
                "file" => file.to_string_lossy().to_string(),
                "dir" => match file.parent() {
                    Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().to_string(),
                    _ => ".".to_string(),
                },
                _ => file
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default(),
            };
            shell_quote(&value)
        })
        .into_owned()
}

/// The program a command template starts, if it can be told statically.
///
/// Leading `NAME=value` assignments are skipped. Quoted, parameterised or
/// placeholder words return `None`.
fn program_name(template: &str) -> Option<&str> {
    let word = template.split_whitespace().find(|w| !is_env_assignment(w))?;
    if word.contains(['\'', '"', '$', '{', '`']) {
        return None;
    }
    Some(word)
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Ask the shell whether `program` resolves to a command.
fn program_available(program: &str) -> io::Result<bool> {
    Command::new("sh")
        .arg("-c")
        .arg("command -v \"$1\" >/dev/null 2>&1")
        .arg("sh")
        .arg(program)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
}

/// Run a single analyzer against `file`, keeping at most `max_output` bytes.
///
/// stderr is merged into stdout by the shell so one pipe is read in order.
/// Once the cap is reached the pipe is closed and the process killed, so a
/// tool that never stops writing cannot grow memory or stall the run.
pub fn run_analyzer(
    spec: &AnalyzerSpec,
    file: &Path,
    max_output: usize,
) -> Result<AnalyzerOutput, AnalyzerError> {
    let spawn_err = |source: io::Error| AnalyzerError::Spawn {
        name: spec.name.clone(),
        source,
    };
    let io_err = |source: io::Error| AnalyzerError::Io {
        name: spec.name.clone(),
        source,
    };

    if let Some(program) = program_name(&spec.command) {
        if !program_available(program).map_err(spawn_err)? {
            return Err(spawn_err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: command not found", program),
            )));
        }
    }

    let command = expand_command(&spec.command, file);
    log::debug!("running analyzer {}: {}", spec.name, command);

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(format!("exec 2>&1\n{}", command))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout not captured")))?;

    let mut sink = ByteSink::with_limit(max_output);
    let copied = io::copy(&mut stdout.by_ref().take(max_output as u64), &mut sink);
    let truncated = match copied {
        Ok(n) if n as usize == max_output => {
            let mut extra = [0u8; 1];
            matches!(stdout.read(&mut extra), Ok(n) if n > 0)
        }
        Ok(_) => false,
        Err(e) => {
            drop(stdout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(match e.kind() {
                io::ErrorKind::OutOfMemory => AnalyzerError::Output {
                    name: spec.name.clone(),
                    source: SinkError::OutOfMemory {
                        requested: max_output.saturating_add(1),
                        limit: Some(max_output),
                    },
                },
                _ => io_err(e),
            });
        }
    };

    drop(stdout);
    if truncated {
        log::debug!("analyzer {} exceeded {} bytes, stopping it", spec.name, max_output);
        let _ = child.kill();
    }
    let status = child.wait().map_err(io_err)?;

    Ok(AnalyzerOutput {
        name: spec.name.clone(),
        command,
        exit_code: if truncated { None } else { status.code() },
        output: String::from_utf8_lossy(sink.finish()).into_owned(),
        truncated,
    })
}

/// Run every analyzer in order.
///
/// Optional analyzers that cannot be launched are skipped with a warning;
/// a required one aborts the whole run.
pub fn run_all(
    specs: &[&AnalyzerSpec],
    file: &Path,
    max_output: usize,
) -> Result<Vec<AnalyzerOutput>, AnalyzerError> {
    let mut outputs = Vec::with_capacity(specs.len());

    for spec in specs {
        match run_analyzer(spec, file, max_output) {
            Ok(out) => {
                log::info!(
                    "analyzer {} exited with {:?} ({} bytes)",
                    out.name,
                    out.exit_code,
                    out.output.len()
                );
                outputs.push(out);
            }
            Err(e) if !spec.required => {
                log::warn!("skipping analyzer: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outputs)
}
