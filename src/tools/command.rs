use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Lines of tool output kept in a failure message
const OUTPUT_TAIL_LINES: usize = 20;

/// Failure of one collaborator invocation
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {output_tail}")]
    Failed {
        program: String,
        status: ExitStatus,
        output_tail: String,
    },

    #[error("`{program}` timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("failed to remove previous output {path:?}: {source}")]
    ClearOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` did not produce {path:?}")]
    MissingOutput { program: String, path: PathBuf },
}

/// An external program plus any fixed leading arguments (e.g. `python3 bse.py`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Parse a whitespace-separated command line; `None` when blank
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    /// Human-readable name used in errors and logs
    pub fn display_name(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Outcome of a successful invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub elapsed: Duration,
}

/// Run a tool to completion and check its exit status
///
/// The child is killed if the timeout elapses.
pub async fn run_tool(
    spec: &ToolSpec,
    args: &[OsString],
    timeout: Option<Duration>,
) -> Result<ToolOutput, ToolError> {
    let program = spec.display_name();
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    debug!("Running {} {:?}", program, args);
    let started = Instant::now();

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| ToolError::TimedOut {
                program: program.clone(),
                timeout: limit,
            })?,
        None => command.output().await,
    }
    .map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(ToolError::Failed {
            program,
            status: output.status,
            output_tail: tail_lines(&combined, OUTPUT_TAIL_LINES),
        });
    }

    let elapsed = started.elapsed();
    debug!("{} finished in {:.1}s", program, elapsed.as_secs_f64());
    if !combined.trim().is_empty() {
        debug!("{} output:\n{}", program, combined.trim_end());
    }

    Ok(ToolOutput { elapsed })
}

/// Remove outputs left by an earlier run, so only fresh files pass [`ensure_outputs`]
pub fn clear_outputs(paths: &[&Path]) -> Result<(), ToolError> {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed previous output {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ToolError::ClearOutput {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
    Ok(())
}

/// Check that a tool left every expected file behind
pub fn ensure_outputs(spec: &ToolSpec, paths: &[&Path]) -> Result<(), ToolError> {
    match paths.iter().find(|path| !path.is_file()) {
        Some(missing) => Err(ToolError::MissingOutput {
            program: spec.display_name(),
            path: missing.to_path_buf(),
        }),
        None => Ok(()),
    }
}

/// Last `count` lines of `text`, joined with " | "
fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join(" | ")
}
