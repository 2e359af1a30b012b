//! Test cases, runs and verdicts.
//!
//! A [`TestCase`] comes from a script's directive block. [`ScriptRunner`]
//! turns it into an [`ExecutionResult`], and [`judge`] decides the
//! [`Verdict`] from the result, the declared outcome and any golden output.

pub mod config;
pub mod discovery;
pub mod report;
pub mod runner;
pub mod suite;

use std::path::{Path, PathBuf};

use serde::Serialize;

pub use crate::directives::ExpectedOutcome;
pub use crate::runtime::SoftFailure;
pub use config::HarnessConfig;
pub use runner::{RunnerOptions, ScriptRunner};
pub use suite::{run_suite, SuiteOutcome, TestOutcome};

use crate::directives::{parse_directives, DirectiveSet};
use crate::errors::{ErrorType, RigError, SourceContext};

// ============================================================================
// TEST CASES
// ============================================================================

/// One script and how it expects to be run. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub source_path: PathBuf,
    pub directives: DirectiveSet,
    pub expected_outcome: ExpectedOutcome,
}

impl TestCase {
    pub fn from_source(path: &Path, source: &SourceContext) -> Result<Self, RigError> {
        let directives = parse_directives(source)?;
        let expected_outcome = directives.expected_outcome();
        Ok(Self {
            source_path: path.to_path_buf(),
            directives,
            expected_outcome,
        })
    }

    pub fn load(path: &Path) -> Result<Self, RigError> {
        let text = std::fs::read_to_string(path).map_err(|e| RigError::io(path.display(), e))?;
        Self::from_source(path, &SourceContext::from_file(path.display().to_string(), text))
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Everything observable about one run.
#[derive(Debug)]
pub struct ExecutionResult {
    pub stdout: Vec<String>,
    pub failures: Vec<SoftFailure>,
    pub error: Option<RigError>,
    pub exit_code: i32,
}

impl ExecutionResult {
    /// A run that never got to execute script code.
    pub fn aborted(error: RigError) -> Self {
        Self {
            stdout: Vec::new(),
            failures: Vec::new(),
            error: Some(error),
            exit_code: 1,
        }
    }

    /// True when anything went wrong: an error, a soft failure or a nonzero
    /// exit.
    pub fn failed(&self) -> bool {
        self.error.is_some() || !self.failures.is_empty() || self.exit_code != 0
    }

    /// The error message and every soft failure message, one per line.
    pub fn failure_text(&self) -> String {
        let mut lines: Vec<String> = self.failures.iter().map(|f| f.message.clone()).collect();
        if let Some(error) = &self.error {
            lines.push(error.to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail { reasons: Vec<String> },
    Skip { reason: String },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

// ============================================================================
// JUDGEMENT
// ============================================================================

/// Splits output text into lines the way captured output is stored.
pub fn output_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let text = text.replace("\r\n", "\n");
    let text = text.strip_suffix('\n').unwrap_or(&text);
    text.split('\n').map(str::to_string).collect()
}

/// Decides a run's verdict. `golden` is the expected stdout, when a golden
/// file exists.
pub fn judge(expected: &ExpectedOutcome, result: &ExecutionResult, golden: Option<&str>) -> Verdict {
    let mut reasons = Vec::new();

    if let Some(error) = result.error.as_ref().filter(|e| e.error_type() == ErrorType::Timeout) {
        reasons.push(error.to_string());
        return Verdict::Fail { reasons };
    }

    match expected {
        ExpectedOutcome::Pass => {
            for failure in &result.failures {
                reasons.push(format!("line {}: fail: {}", failure.line, failure.message));
            }
            if let Some(error) = &result.error {
                reasons.push(format!("{}: {}", error.error_type(), error));
            }
            if result.exit_code != 0 && reasons.is_empty() {
                reasons.push(format!("exited with code {}", result.exit_code));
            }
        }
        ExpectedOutcome::Fail { message } => {
            if !result.failed() {
                reasons.push("expected the script to fail, but it passed".to_string());
            } else if let Some(message) = message {
                let text = result.failure_text();
                if !text.contains(message.as_str()) {
                    reasons.push(format!("failure text does not contain '{message}': {text}"));
                }
            }
        }
    }

    if let Some(golden) = golden {
        if output_lines(golden) != result.stdout {
            reasons.push("output did not match the golden file".to_string());
        }
    }

    if reasons.is_empty() {
        Verdict::Pass
    } else {
        Verdict::Fail { reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stdout: &[&str], failures: usize, exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            failures: (0..failures)
                .map(|i| SoftFailure {
                    message: format!("f{i}"),
                    line: i + 1,
                })
                .collect(),
            error: None,
            exit_code,
        }
    }

    #[test]
    fn clean_run_passes() {
        let verdict = judge(&ExpectedOutcome::Pass, &result(&["a"], 0, 0), Some("a\n"));
        assert_eq!(verdict, Verdict::Pass);
    }

    #[test]
    fn soft_failures_fail_the_case() {
        let verdict = judge(&ExpectedOutcome::Pass, &result(&[], 1, 1), None);
        assert!(matches!(verdict, Verdict::Fail { reasons } if reasons[0].contains("f0")));
    }

    #[test]
    fn golden_mismatch_fails() {
        let verdict = judge(&ExpectedOutcome::Pass, &result(&["a"], 0, 0), Some("b\n"));
        assert!(!verdict.is_pass());
    }

    #[test]
    fn expected_failure_must_happen() {
        let expected = ExpectedOutcome::Fail {
            message: Some("f0".to_string()),
        };
        assert_eq!(judge(&expected, &result(&[], 1, 1), None), Verdict::Pass);
        assert!(!judge(&expected, &result(&[], 0, 0), None).is_pass());
    }

    #[test]
    fn timeouts_always_fail() {
        let mut run = result(&[], 0, 1);
        run.error = Some(RigError::Timeout { limit_ms: 5 });
        let expected = ExpectedOutcome::Fail { message: None };
        assert!(!judge(&expected, &run, None).is_pass());
    }

    #[test]
    fn output_lines_normalise_line_endings() {
        assert_eq!(output_lines("a\r\nb\n"), vec!["a", "b"]);
        assert!(output_lines("").is_empty());
    }
}
