//! The scriptrig command line.
//!
//! `run` executes one script, `test` runs a suite, and `preprocess` and
//! `directives` expose the two front-end passes for debugging.

use std::{
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use regex::Regex;

use crate::{
    directives::parse_directives,
    errors::{print_error, RigError, SourceContext},
    harness::{
        config::HarnessConfig, judge, report, run_suite, RunnerOptions, ScriptRunner, TestCase,
        Verdict,
    },
    preprocess::preprocess,
};

// ============================================================================
// CLI ARGUMENTS
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "scriptrig",
    version,
    about = "Runs scripting-mode regression scripts and checks their output."
)]
pub struct RigArgs {
    #[command(subcommand)]
    pub command: ArgsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ArgsCommand {
    /// Run one script. Exits nonzero on any fail() call or uncaught error.
    Run {
        #[arg(required = true)]
        file: PathBuf,
        /// Treat the script as scripting-mode source.
        #[arg(long)]
        scripting: bool,
        /// Extra engine option, such as -Dkey=value. Repeatable.
        #[arg(long = "option", value_name = "FLAG", allow_hyphen_values = true)]
        options: Vec<String>,
        /// Wall-clock limit; 0 disables it.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Discover and run every test script under a directory.
    Test {
        /// Defaults to the configured test root.
        path: Option<PathBuf>,
        /// Only run scripts whose relative path matches this regex.
        #[arg(long)]
        filter: Option<String>,
        /// Configuration file; defaults to ./scriptrig.yaml when present.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print a JSON report instead of coloured text.
        #[arg(long)]
        json: bool,
    },
    /// Print the standard-mode source a scripting-mode script rewrites to.
    Preprocess {
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Print a script's directives as JSON.
    Directives {
        #[arg(required = true)]
        file: PathBuf,
    },
}

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

pub fn run() {
    let args = RigArgs::parse();

    let code = match args.command {
        ArgsCommand::Run {
            file,
            scripting,
            options,
            timeout_ms,
        } => run_script(&file, scripting, options, timeout_ms),
        ArgsCommand::Test {
            path,
            filter,
            config,
            json,
        } => run_tests(path, filter, config, json),
        ArgsCommand::Preprocess { file } => {
            let source = read_source_or_exit(&file);
            match preprocess(&source) {
                Ok(out) => {
                    print!("{}", out.code);
                    0
                }
                Err(e) => fail_with(e),
            }
        }
        ArgsCommand::Directives { file } => {
            let source = read_source_or_exit(&file);
            match parse_directives(&source) {
                Ok(set) => match serde_json::to_string_pretty(&set) {
                    Ok(json) => {
                        println!("{json}");
                        0
                    }
                    Err(e) => fail_with(RigError::Internal {
                        message: e.to_string(),
                    }),
                },
                Err(e) => fail_with(e),
            }
        }
    };

    if code != 0 {
        process::exit(code);
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_script(file: &Path, scripting: bool, options: Vec<String>, timeout_ms: Option<u64>) -> i32 {
    let config = match HarnessConfig::discover(Path::new(".")) {
        Ok(config) => config,
        Err(e) => return fail_with(e),
    };
    let case = match TestCase::load(file) {
        Ok(case) => case,
        Err(e) => return fail_with(e),
    };

    let mut runner_options = RunnerOptions::from(&config);
    runner_options.scripting = scripting;
    runner_options.default_options.extend(options);
    if let Some(ms) = timeout_ms {
        runner_options.timeout = (ms > 0).then(|| std::time::Duration::from_millis(ms));
    }

    let result = ScriptRunner::new(runner_options).run(&case);
    for line in &result.stdout {
        println!("{line}");
    }
    for failure in &result.failures {
        eprintln!("{}:{}: fail: {}", file.display(), failure.line, failure.message);
    }

    let golden = std::fs::read_to_string(config.golden_path(file)).ok();
    let verdict = judge(&case.expected_outcome, &result, golden.as_deref());
    let code = result.exit_code;
    if let Some(error) = result.error {
        print_error(error);
    }
    if !verdict.is_pass() && code == 0 {
        if let Verdict::Fail { reasons } = &verdict {
            for reason in reasons {
                eprintln!("{}: {reason}", file.display());
            }
        }
        return 1;
    }
    code
}

fn run_tests(
    path: Option<PathBuf>,
    filter: Option<String>,
    config_path: Option<PathBuf>,
    json: bool,
) -> i32 {
    let config = match config_path {
        Some(path) => HarnessConfig::load(&path),
        None => HarnessConfig::discover(Path::new(".")),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => return fail_with(e),
    };
    let filter = match filter.as_deref().map(Regex::new).transpose() {
        Ok(filter) => filter,
        Err(e) => {
            return fail_with(RigError::Config {
                message: format!("invalid --filter: {e}"),
            })
        }
    };
    let root = path.unwrap_or_else(|| config.test_root.clone());

    let suite = match run_suite(&config, &root, filter.as_ref()) {
        Ok(suite) => suite,
        Err(e) => return fail_with(e),
    };

    if json {
        match report::to_json(&suite) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                return fail_with(RigError::Internal {
                    message: e.to_string(),
                })
            }
        }
    } else {
        let mut reporter = report::Reporter::stdout(config.use_colors);
        if let Err(e) = reporter.suite(&suite) {
            tracing::warn!(error = %e, "cannot write the report");
        }
    }

    if suite.all_passed() {
        0
    } else {
        1
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn fail_with(error: RigError) -> i32 {
    print_error(error);
    1
}

fn read_source_or_exit(path: &Path) -> SourceContext {
    match std::fs::read_to_string(path) {
        Ok(text) => SourceContext::from_file(path.display().to_string(), text),
        Err(e) => {
            print_error(RigError::io(path.display(), e));
            process::exit(1);
        }
    }
}
