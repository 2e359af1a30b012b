//! Runs one test case in a fresh engine.

use std::{thread, time::Duration};

use crate::{
    engine::{ScriptEngine, Termination},
    errors::{RigError, SourceContext},
    runtime::{CaptureHandle, Limits},
};

use super::{config::HarnessConfig, ExecutionResult, TestCase};

/// Stack for the evaluation thread. The evaluator recurses per nested call,
/// so the main thread's default stack is not enough for `max_depth` calls.
const RUNNER_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    pub timeout: Option<Duration>,
    pub max_depth: usize,
    /// Engine options applied before the script's own `@option`s.
    pub default_options: Vec<String>,
    /// Forces scripting mode regardless of directives.
    pub scripting: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            timeout: limits.timeout,
            max_depth: limits.max_depth,
            default_options: Vec::new(),
            scripting: false,
        }
    }
}

impl From<&HarnessConfig> for RunnerOptions {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_depth: config.max_depth,
            default_options: config.default_options.clone(),
            scripting: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptRunner {
    options: RunnerOptions,
}

impl ScriptRunner {
    pub fn new(options: RunnerOptions) -> Self {
        Self { options }
    }

    /// Runs `case` and captures everything it does. Never returns an error:
    /// failures of any kind end up in the result.
    pub fn run(&self, case: &TestCase) -> ExecutionResult {
        let options = self.options.clone();
        let case = case.clone();
        let spawned = thread::Builder::new()
            .name("scriptrig-run".to_string())
            .stack_size(RUNNER_STACK_SIZE)
            .spawn(move || run_in_place(&options, &case));
        match spawned {
            Ok(handle) => handle.join().unwrap_or_else(|_| {
                ExecutionResult::aborted(RigError::Internal {
                    message: "the script runner panicked".to_string(),
                })
            }),
            Err(e) => ExecutionResult::aborted(RigError::Internal {
                message: format!("cannot start the script runner: {e}"),
            }),
        }
    }

    /// The engine options a case runs with.
    pub fn engine_options(&self, case: &TestCase) -> Vec<String> {
        engine_options(&self.options, case)
    }
}

fn engine_options(options: &RunnerOptions, case: &TestCase) -> Vec<String> {
    let mut all = options.default_options.clone();
    for option in case.directives.options() {
        if !all.contains(&option) {
            all.push(option);
        }
    }
    let scripting = all.iter().any(|o| o.trim_start_matches('-') == "scripting");
    if options.scripting && !scripting {
        all.push("-scripting".to_string());
    }
    all
}

fn run_in_place(options: &RunnerOptions, case: &TestCase) -> ExecutionResult {
    let path = &case.source_path;
    let _span = tracing::info_span!("run", path = %path.display()).entered();

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => return ExecutionResult::aborted(RigError::io(path.display(), e)),
    };
    let source = SourceContext::from_file(path.display().to_string(), text);

    let capture = CaptureHandle::new();
    let engine = ScriptEngine::new(&engine_options(options, case))
        .with_output(capture.output())
        .with_limits(Limits {
            max_depth: options.max_depth,
            timeout: options.timeout,
        });
    engine.bind_script(path, &case.directives.arguments());

    let (explicit_exit, error) = match engine.execute(&source) {
        Ok(Termination::Completed(_)) => (None, None),
        Ok(Termination::Exited(code)) => (Some(code), None),
        Err(error) => {
            tracing::debug!(kind = %error.error_type(), "run ended with an error");
            (None, Some(error))
        }
    };
    let failures = engine.failures();
    let clean = failures.is_empty() && error.is_none();
    // A soft failure or an error keeps the run failed even after exit(0).
    let exit_code = match explicit_exit {
        Some(code) if code != 0 || clean => code,
        _ if clean => 0,
        _ => 1,
    };

    ExecutionResult {
        stdout: capture.lines(),
        failures,
        error,
        exit_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::DirectiveSet;
    use std::path::PathBuf;

    #[test]
    fn forced_scripting_is_added_once() {
        let case = TestCase {
            source_path: PathBuf::from("t.js"),
            directives: DirectiveSet::default(),
            expected_outcome: Default::default(),
        };
        let runner = ScriptRunner::new(RunnerOptions {
            scripting: true,
            default_options: vec!["-scripting".to_string()],
            ..RunnerOptions::default()
        });
        assert_eq!(runner.engine_options(&case), vec!["-scripting"]);
    }

    #[test]
    fn missing_file_is_captured_not_raised() {
        let case = TestCase {
            source_path: PathBuf::from("definitely/not/here.js"),
            directives: DirectiveSet::default(),
            expected_outcome: Default::default(),
        };
        let result = ScriptRunner::default().run(&case);
        assert!(matches!(result.error, Some(RigError::Io { .. })));
        assert_eq!(result.exit_code, 1);
    }
}
