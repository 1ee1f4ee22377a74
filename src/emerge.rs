use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::pretend::{DryRunResult, Outcome};
use crate::process;

/// Arguments for a dependency-resolution dry run of `atom`.
///
/// Autounmask is enabled so the report lists required keyword and mask
/// changes, but nothing is written to the configuration.
pub fn pretend_args(atom: &str) -> Vec<String> {
    [
        "--pretend",
        "--verbose",
        "--tree",
        "--autounmask",
        "--autounmask-write=n",
        "--color=n",
        atom,
    ]
    .map(String::from)
    .to_vec()
}

/// Arguments to merge `atom`, skipping it when already installed with the
/// same USE flags.
pub fn install_args(atom: &str) -> Vec<String> {
    ["--verbose", "--noreplace", "--newuse", atom]
        .map(String::from)
        .to_vec()
}

/// Arguments to unmerge `atom` without reverse-dependency checks.
pub fn uninstall_args(atom: &str) -> Vec<String> {
    ["--verbose", "--rage-clean", atom]
        .map(String::from)
        .to_vec()
}

/// Stdout followed by stderr, with a line break between them so the last
/// stdout line never runs into the first stderr line.
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&String::from_utf8_lossy(stderr));
    text
}

/// A finished dry run: the interpreted output plus the exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PretendRun {
    /// Interpreted output.
    pub result: DryRunResult,
    /// Exit code of emerge; `-1` when it was terminated by a signal.
    pub exit_code: i32,
}

impl PretendRun {
    /// See [`DryRunResult::outcome`].
    pub fn outcome(&self) -> Outcome {
        self.result.outcome(self.exit_code)
    }
}

/// Runs emerge dry runs.
#[derive(Debug, Clone)]
pub struct Emerge {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl Default for Emerge {
    fn default() -> Self {
        Emerge {
            program: PathBuf::from("emerge"),
            timeout: None,
        }
    }
}

impl Emerge {
    /// Use a specific emerge binary.
    pub fn with_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.program = program.into();
        self
    }

    /// Kill the dry run once `timeout` passes.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `emerge --pretend` for `atom` and interpret its combined output.
    pub fn pretend(&self, atom: &str) -> Result<PretendRun> {
        let output = process::run(
            Command::new(&self.program).args(pretend_args(atom)),
            self.timeout,
        )?;

        let text = combine_output(&output.stdout, &output.stderr);

        let exit_code = output.status.code().unwrap_or(-1);
        debug!("emerge --pretend {atom}: exit code {exit_code}");

        Ok(PretendRun {
            result: DryRunResult::parse(&text),
            exit_code,
        })
    }
}
