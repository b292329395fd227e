//! Linear programs solved by an external solver script.

use anyhow::{Context as _, anyhow};
use floodns_core::lp::{LpError, LpSolution, LpSolver};
use std::{
    ffi::OsString,
    fs::{self, File},
    path::PathBuf,
    process::{Command, Stdio},
};
use tempfile::TempDir;

const PROGRAM_FILE_NAME: &str = "program.lp";
const SOLUTION_FILE_NAME: &str = "solution.sol";

/// Runs `<interpreter> <script> <program file>` and reads the solution the
/// script prints on its standard output.
///
/// The default interpreter is `python3`, for the GLOP wrapper script that
/// reads the program file and prints
///
/// ```text
/// Value of objective function: <objective>
/// Actual values of the variables:
/// <name> <value>
/// ...
/// ```
///
/// The program and the captured solution are kept in a temporary directory
/// removed once solved.
#[derive(Debug, Clone)]
pub struct GlopSolver {
    interpreter: OsString,
    script: PathBuf,
}

impl GlopSolver {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: OsString::from("python3"),
            script: script.into(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<OsString>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    fn run(&self, program: &str) -> anyhow::Result<String> {
        let dir = TempDir::new().context("cannot create the solver directory")?;
        let program_path = dir.path().join(PROGRAM_FILE_NAME);
        let solution_path = dir.path().join(SOLUTION_FILE_NAME);

        fs::write(&program_path, program)
            .with_context(|| anyhow!("cannot write {}", program_path.display()))?;
        let solution = File::create(&solution_path)
            .with_context(|| anyhow!("cannot create {}", solution_path.display()))?;

        tracing::debug!(script = %self.script.display(), "running the lp solver");
        let status = Command::new(&self.interpreter)
            .arg(&self.script)
            .arg(&program_path)
            .stdin(Stdio::null())
            .stdout(solution)
            .status()
            .with_context(|| anyhow!("cannot start {:?}", self.interpreter))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {status}", self.script.display()));
        }

        fs::read_to_string(&solution_path)
            .with_context(|| anyhow!("cannot read {}", solution_path.display()))
    }
}

impl LpSolver for GlopSolver {
    fn solve(&mut self, program: &str) -> Result<LpSolution, LpError> {
        let report = self.run(program).map_err(LpError::Solver)?;
        LpSolution::parse(&report)
    }
}
