//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use scriptrig::{
    runtime::{CaptureHandle, SoftFailure},
    RigError, ScriptEngine, SourceContext, Termination,
};

/// What a snippet did when run in a fresh engine.
pub struct Run {
    pub stdout: Vec<String>,
    pub outcome: Result<Termination, RigError>,
    pub failures: Vec<SoftFailure>,
}

pub fn run_with(source: &str, options: &[&str]) -> Run {
    let options: Vec<String> = options.iter().map(|o| o.to_string()).collect();
    let capture = CaptureHandle::new();
    let engine = ScriptEngine::new(&options).with_output(capture.output());
    let outcome = engine.execute(&SourceContext::from_file("test.js", source));
    Run {
        stdout: capture.lines(),
        outcome,
        failures: engine.failures(),
    }
}

/// Runs standard-mode `source` and returns its output; panics on error.
pub fn output_of(source: &str) -> Vec<String> {
    let run = run_with(source, &[]);
    if let Err(e) = &run.outcome {
        panic!("script failed: {e}");
    }
    run.stdout
}

pub fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/scripts")
}
