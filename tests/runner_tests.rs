mod common;

use std::{fs, time::Duration};

use common::fixtures;
use regex::Regex;
use scriptrig::{
    harness::{
        judge, run_suite, ExpectedOutcome, HarnessConfig, RunnerOptions, ScriptRunner, TestCase,
        Verdict,
    },
    ErrorType, RigError,
};
use tempfile::TempDir;

fn script(dir: &TempDir, name: &str, body: &str) -> TestCase {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    TestCase::load(&path).unwrap()
}

const HEADER: &str = "/*\n * @test\n * @run\n */\n";

#[test]
fn clean_script_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(&dir, "ok.js", &format!("{HEADER}print('hello');\n"));
    let result = ScriptRunner::default().run(&case);
    assert_eq!(result.stdout, vec!["hello"]);
    assert!(result.error.is_none());
    assert_eq!(result.exit_code, 0);
    assert_eq!(judge(&case.expected_outcome, &result, None), Verdict::Pass);
}

#[test]
fn soft_failures_set_a_nonzero_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(
        &dir,
        "soft.js",
        &format!("{HEADER}fail('one');\nprint('still here');\n"),
    );
    let result = ScriptRunner::default().run(&case);
    assert_eq!(result.stdout, vec!["still here"]);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].line, 5);
    assert_eq!(result.exit_code, 1);
}

#[test]
fn explicit_exit_code_wins() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(&dir, "exit.js", &format!("{HEADER}quit(3);\n"));
    assert_eq!(ScriptRunner::default().run(&case).exit_code, 3);

    let case = script(&dir, "clean_exit.js", &format!("{HEADER}exit(0);\n"));
    assert_eq!(ScriptRunner::default().run(&case).exit_code, 0);
}

#[test]
fn exit_zero_after_a_soft_failure_still_fails() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(&dir, "soft_exit.js", &format!("{HEADER}fail('boom');\nexit(0);\n"));
    let result = ScriptRunner::default().run(&case);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.exit_code, 1);
    assert!(matches!(
        judge(&case.expected_outcome, &result, None),
        Verdict::Fail { .. }
    ));
}

#[test]
fn uncaught_errors_are_captured() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(&dir, "throw.js", &format!("{HEADER}throw new Error('boom');\n"));
    let result = ScriptRunner::default().run(&case);
    let error = result.error.as_ref().expect("captured error");
    assert_eq!(error.error_type(), ErrorType::Evaluation);
    assert_eq!(error.to_string(), "Error: boom");
    assert_eq!(result.exit_code, 1);
}

#[test]
fn declared_failure_passes_when_the_message_matches() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(
        &dir,
        "expected.js",
        "/*\n * @test\n * @run/fail boom\n */\nthrow new Error('boom');\n",
    );
    assert_eq!(
        case.expected_outcome,
        ExpectedOutcome::Fail {
            message: Some("boom".to_string())
        }
    );
    let result = ScriptRunner::default().run(&case);
    assert_eq!(judge(&case.expected_outcome, &result, None), Verdict::Pass);
}

#[test]
fn deep_recursion_throws_a_catchable_range_error() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(
        &dir,
        "deep.js",
        &format!(
            "{HEADER}function down(n) {{ return down(n + 1); }}\n\
             try {{ down(0); }} catch (e) {{ print(e instanceof RangeError); }}\n"
        ),
    );
    let result = ScriptRunner::default().run(&case);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.stdout, vec!["true"]);
}

#[test]
fn runaway_loops_time_out() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(
        &dir,
        "spin.js",
        "/*\n * @test\n * @run/fail\n */\nwhile (true) {}\n",
    );
    let runner = ScriptRunner::new(RunnerOptions {
        timeout: Some(Duration::from_millis(50)),
        ..RunnerOptions::default()
    });
    let result = runner.run(&case);
    assert!(matches!(result.error, Some(RigError::Timeout { limit_ms: 50 })));
    assert!(!judge(&case.expected_outcome, &result, None).is_pass());
}

#[test]
fn scripting_mode_comes_from_directives() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(
        &dir,
        "heredoc.js",
        "/*\n * @test\n * @option -scripting\n * @run\n */\nvar t = <<EOD\nbody\nEOD\nprint(t.length);\n",
    );
    let result = ScriptRunner::default().run(&case);
    assert!(result.error.is_none(), "{:?}", result.error);
    assert_eq!(result.stdout, vec!["4"]);
}

#[test]
fn arguments_and_script_location_are_bound() {
    let dir = tempfile::tempdir().unwrap();
    let case = script(
        &dir,
        "args.js",
        "/*\n * @test\n * @argument alpha\n * @argument beta\n * @run\n */\n\
         print(arguments.join(' '));\nprint(__FILE__.indexOf('args.js') > 0);\n",
    );
    let result = ScriptRunner::default().run(&case);
    assert_eq!(result.stdout, vec!["alpha beta", "true"]);
}

#[test]
fn parse_errors_fail_one_case_not_the_suite() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a_broken.js"), "/*\n * @test\n */\nprint(1);\n").unwrap();
    fs::write(
        dir.path().join("b_heredoc.js"),
        "/*\n * @test\n * @option -scripting\n * @run\n */\nprint(<<EOD)\nnever closed\n",
    )
    .unwrap();
    fs::write(dir.path().join("c_ok.js"), format!("{HEADER}print('fine');\n")).unwrap();
    fs::write(dir.path().join("c_ok.js.EXPECTED"), "fine\n").unwrap();

    let config = HarnessConfig {
        use_colors: false,
        ..HarnessConfig::default()
    };
    let suite = run_suite(&config, dir.path(), None).unwrap();
    let verdicts: Vec<_> = suite
        .outcomes
        .iter()
        .map(|o| (o.name.as_str(), o.verdict.is_pass()))
        .collect();
    assert_eq!(
        verdicts,
        vec![("a_broken.js", false), ("b_heredoc.js", false), ("c_ok.js", true)]
    );
    let counts = suite.counts();
    assert_eq!((counts.passed, counts.failed, counts.skipped), (1, 2, 0));
}

#[test]
fn huge_array_indices_do_not_take_down_the_suite() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a_huge.js"),
        format!(
            "{HEADER}var a = [];\na[1e15] = 1;\na[4000000000] = 2;\nprint(a.length + ',' + a[1e15]);\n\
             try {{ a.length = 4294967295; }} catch (e) {{ print(e.name); }}\n\
             try {{ new Array(1e15); }} catch (e) {{ print(e.name); }}\n\
             a.length = 4294967296;\n"
        ),
    )
    .unwrap();
    fs::write(dir.path().join("b_ok.js"), format!("{HEADER}print('ok');\n")).unwrap();
    let config = HarnessConfig {
        use_colors: false,
        ..HarnessConfig::default()
    };

    let suite = run_suite(&config, dir.path(), None).unwrap();
    assert_eq!(suite.outcomes.len(), 2);

    let huge = &suite.outcomes[0];
    assert_eq!(huge.name, "a_huge.js");
    assert!(matches!(huge.verdict, Verdict::Fail { .. }));
    let result = huge.result.as_ref().unwrap();
    assert_eq!(result.stdout, vec!["0,1", "RangeError", "RangeError"]);
    assert!(result.error.as_ref().unwrap().to_string().starts_with("RangeError"));

    assert_eq!(suite.outcomes[1].name, "b_ok.js");
    assert_eq!(suite.outcomes[1].verdict, Verdict::Pass);
}

#[test]
fn bundled_fixtures_all_pass() {
    let config = HarnessConfig {
        use_colors: false,
        ..HarnessConfig::default()
    };
    let suite = run_suite(&config, &fixtures(), None).unwrap();
    for outcome in &suite.outcomes {
        assert!(
            !matches!(outcome.verdict, Verdict::Fail { .. }),
            "{}: {:?}",
            outcome.name,
            outcome.verdict
        );
    }
    let counts = suite.counts();
    assert!(counts.passed >= 6);
    assert_eq!(counts.skipped, 1);
}

#[test]
fn filter_limits_the_suite() {
    let config = HarnessConfig {
        use_colors: false,
        ..HarnessConfig::default()
    };
    let filter = Regex::new("shift").unwrap();
    let suite = run_suite(&config, &fixtures(), Some(&filter)).unwrap();
    let ran: Vec<_> = suite
        .outcomes
        .iter()
        .filter(|o| !matches!(o.verdict, Verdict::Skip { .. }))
        .map(|o| o.name.as_str())
        .collect();
    assert_eq!(ran, vec!["basic/shift.js"]);
}

#[test]
fn configuration_can_force_default_options() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("scriptrig.yaml");
    fs::write(&config_path, "default_options: [-scripting]\ntimeout_ms: 2000\n").unwrap();
    let config = HarnessConfig::load(&config_path).unwrap();
    let case = script(&dir, "s.js", &format!("{HEADER}print($OPTIONS._scripting);\n"));
    let result = ScriptRunner::new(RunnerOptions::from(&config)).run(&case);
    assert_eq!(result.stdout, vec!["true"]);
}
