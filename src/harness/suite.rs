//! Running a directory of scripts.
//!
//! Errors while loading one script (unreadable file, malformed directives)
//! fail that script only; the rest of the suite still runs.

use std::path::Path;

use regex::Regex;
use serde::Serialize;

use crate::errors::{RigError, SourceContext};

use super::{
    config::HarnessConfig,
    discovery::{discover_scripts, filtered_out, relative_name, skip_reason},
    judge,
    runner::{RunnerOptions, ScriptRunner},
    ExecutionResult, TestCase, Verdict,
};

/// The verdict for one discovered script.
#[derive(Debug)]
pub struct TestOutcome {
    /// Path relative to the suite root.
    pub name: String,
    pub verdict: Verdict,
    pub bug: Option<String>,
    pub result: Option<ExecutionResult>,
    /// Expected output, when a golden file exists.
    pub golden: Option<String>,
}

#[derive(Debug, Default)]
pub struct SuiteOutcome {
    pub outcomes: Vec<TestOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SuiteCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Percentage of executed cases that passed.
    pub rate: f64,
}

impl SuiteOutcome {
    pub fn counts(&self) -> SuiteCounts {
        let count = |f: fn(&Verdict) -> bool| self.outcomes.iter().filter(|o| f(&o.verdict)).count();
        let passed = count(|v| matches!(v, Verdict::Pass));
        let failed = count(|v| matches!(v, Verdict::Fail { .. }));
        let skipped = count(|v| matches!(v, Verdict::Skip { .. }));
        let ran = passed + failed;
        SuiteCounts {
            total: self.outcomes.len(),
            passed,
            failed,
            skipped,
            rate: if ran > 0 {
                passed as f64 / ran as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    pub fn all_passed(&self) -> bool {
        self.counts().failed == 0
    }
}

/// Discovers and runs every script under `root`.
#[tracing::instrument(skip_all, fields(root = %root.display()))]
pub fn run_suite(
    config: &HarnessConfig,
    root: &Path,
    filter: Option<&Regex>,
) -> Result<SuiteOutcome, RigError> {
    let scripts = discover_scripts(root, &config.extensions)?;
    let runner = ScriptRunner::new(RunnerOptions::from(config));
    let base = if root.is_file() {
        root.parent().unwrap_or(root)
    } else {
        root
    };

    let mut suite = SuiteOutcome::default();
    for path in scripts {
        let name = relative_name(base, &path);
        suite.outcomes.push(run_one(config, &runner, &path, name, filter));
    }
    let counts = suite.counts();
    tracing::info!(
        passed = counts.passed,
        failed = counts.failed,
        skipped = counts.skipped,
        "suite finished"
    );
    Ok(suite)
}

fn run_one(
    config: &HarnessConfig,
    runner: &ScriptRunner,
    path: &Path,
    name: String,
    filter: Option<&Regex>,
) -> TestOutcome {
    let failed = |name: String, error: RigError| TestOutcome {
        name,
        verdict: Verdict::Fail {
            reasons: vec![format!("{}: {}", error.error_type(), error)],
        },
        bug: None,
        result: Some(ExecutionResult::aborted(error)),
        golden: None,
    };

    // Filtered scripts are not even read.
    if let Some(reason) = filtered_out(&name, filter) {
        return TestOutcome {
            name,
            verdict: Verdict::Skip { reason },
            bug: None,
            result: None,
            golden: None,
        };
    }

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable script");
            return failed(name, RigError::io(path.display(), e));
        }
    };
    let source = SourceContext::from_file(path.display().to_string(), text);
    let case = match TestCase::from_source(path, &source) {
        Ok(case) => case,
        Err(error) => return failed(name, error),
    };
    let bug = case.directives.bug().map(str::to_string);

    if let Some(reason) = skip_reason(&case.directives, &name, None) {
        return TestOutcome {
            name,
            verdict: Verdict::Skip { reason },
            bug,
            result: None,
            golden: None,
        };
    }

    let golden = std::fs::read_to_string(config.golden_path(path)).ok();
    let result = runner.run(&case);
    let verdict = judge(&case.expected_outcome, &result, golden.as_deref());
    TestOutcome {
        name,
        verdict,
        bug,
        result: Some(result),
        golden,
    }
}
