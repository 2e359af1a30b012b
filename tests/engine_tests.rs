mod common;

use common::{output_of, run_with};
use scriptrig::{runtime::Value, ErrorType, RigError, ScriptEngine, Termination};

#[test]
fn left_shift_prints_eight() {
    assert_eq!(output_of("var x = 1 << 3; print(x);"), vec!["8"]);
}

#[test]
fn shift_split_across_lines_is_still_a_shift() {
    let run = run_with("var x = 1\n<<\n3;\nprint(x);", &["-scripting"]);
    assert!(run.outcome.is_ok());
    assert_eq!(run.stdout, vec!["8"]);
}

#[test]
fn large_object_literal_reads_before_it_writes() {
    let mut props = vec![
        "p0: x".to_string(),
        "p1: x = 'new'".to_string(),
        "p2: x".to_string(),
    ];
    props.extend((3..260).map(|i| format!("p{i}: {i}")));
    let source = format!(
        "var x = 'old'; var o = {{ {} }};\nprint(o.p0); print(o.p2); print(Object.keys(o).length);",
        props.join(", ")
    );
    assert_eq!(output_of(&source), vec!["old", "new", "260"]);
}

#[test]
fn engine_keys_are_reachable_but_not_enumerable() {
    let capture = scriptrig::runtime::CaptureHandle::new();
    let engine = ScriptEngine::new(&[]).with_output(capture.output());
    engine.put(ScriptEngine::FILENAME, "foo");
    engine.put("__FILE__", "foo");
    engine.put("visible", 1.0);

    let script = "var seen = []; for (var k in this) seen.push(k); print(seen.join(','));\n\
                  print(this['javax.script.filename']);";
    engine.eval(script).unwrap();

    assert_eq!(capture.lines(), vec!["visible,seen,k", "foo"]);
    assert!(!engine.is_enumerable(ScriptEngine::FILENAME));
    assert!(!engine.is_enumerable("__FILE__"));
    assert!(engine.is_enumerable("visible"));
}

#[test]
fn soft_failure_does_not_stop_the_script() {
    let run = run_with("print('a');\nfail('x');\nprint('b');", &[]);
    assert!(matches!(run.outcome, Ok(Termination::Completed(_))));
    assert_eq!(run.stdout, vec!["a", "b"]);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].message, "x");
    assert_eq!(run.failures[0].line, 2);
}

#[test]
fn interpolation_evaluates_each_expression_once_in_order() {
    let source = "var n = 0;\nfunction next() { n++; return n; }\nprint(\"${next()}-${next()}\");\nprint(n);";
    let run = run_with(source, &["-scripting"]);
    assert!(run.outcome.is_ok());
    assert_eq!(run.stdout, vec!["1-2", "2"]);
}

#[test]
fn heredoc_is_an_expression() {
    let source = "var who = 'you';\nprint(<<EOD + \"!!!!\")\nHi ${who}\nEOD\nprint('done');";
    let run = run_with(source, &["-scripting"]);
    assert!(run.outcome.is_ok());
    assert_eq!(run.stdout, vec!["Hi you!!!!", "done"]);
}

#[test]
fn only_literal_heredocs_keep_the_final_newline() {
    let source = "var c = 3;\nprint(<<EOD + \"!!!!\")\nover ${c}\nlines.\nEOD\nprint(<<<EOD + \"!!!!\")\nover ${c}\nlines.\nEOD\n";
    let run = run_with(source, &["-scripting"]);
    assert!(run.outcome.is_ok());
    assert_eq!(
        run.stdout,
        vec!["over 3", "lines.!!!!", "over ${c}", "lines.", "!!!!"]
    );
}

#[test]
fn options_are_exposed_on_the_options_object() {
    let run = run_with("print($OPTIONS._scripting);", &["-scripting"]);
    assert_eq!(run.stdout, vec!["true"]);
    assert_eq!(output_of("print(typeof $OPTIONS._scripting);"), vec!["undefined"]);
}

#[test]
fn closures_capture_their_scope() {
    let source = "function counter() { var c = 0; return function () { return ++c; }; }\n\
                  var a = counter(), b = counter();\n\
                  a(); a();\n\
                  print(a() + ',' + b());";
    assert_eq!(output_of(source), vec!["3,1"]);
}

#[test]
fn try_finally_and_error_types() {
    let source = "try { null.x; } catch (e) { print(e instanceof TypeError); } finally { print('f'); }\n\
                  try { throw new RangeError('r'); } catch (e) { print(e.name + ':' + e.message); }";
    assert_eq!(output_of(source), vec!["true", "f", "RangeError:r"]);
}

#[test]
fn uncaught_throw_is_reported_with_its_message() {
    let run = run_with("print('a');\nmissing();", &[]);
    assert_eq!(run.stdout, vec!["a"]);
    let err = run.outcome.unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Evaluation);
    assert!(err.to_string().starts_with("ReferenceError"), "{err}");
}

#[test]
fn syntax_errors_are_not_evaluation_errors() {
    let run = run_with("var = 3;", &[]);
    assert!(matches!(run.outcome, Err(RigError::Syntax { .. })));
}

#[test]
fn eval_runs_in_the_global_scope() {
    let source = "var g = 1;\nfunction f() { var g = 2; return eval('g'); }\nprint(f());\nprint(eval('1 + 1'));";
    assert_eq!(output_of(source), vec!["1", "2"]);
}

#[test]
fn nested_engines_have_their_own_globals() {
    let source = "var e = ScriptEngine.create();\n\
                  e.put('a', 5);\n\
                  print(e.eval('a * 2'));\n\
                  print(typeof a);\n\
                  print(e.get('a'));";
    assert_eq!(output_of(source), vec!["10", "undefined", "5"]);
}

#[test]
fn exit_inside_a_nested_engine_only_ends_that_eval() {
    let source = "var e = ScriptEngine.create();\n\
                  print(typeof e.eval('exit(2); 1'));\n\
                  print('still running');";
    assert_eq!(output_of(source), vec!["undefined", "still running"]);
}

#[test]
fn json_keeps_property_order() {
    let source = "print(JSON.stringify({ b: 1, a: [1, 'x', null], c: { d: true } }));\n\
                  var o = JSON.parse('{\"z\": 1, \"y\": [2]}');\n\
                  print(Object.keys(o).join());";
    assert_eq!(
        output_of(source),
        vec![r#"{"b":1,"a":[1,"x",null],"c":{"d":true}}"#, "z,y"]
    );
}

#[test]
fn string_and_array_methods() {
    let source = "print('a,b,c'.split(',').reverse().join('-'));\n\
                  print('Hello'.toUpperCase().charAt(1));\n\
                  print([1, 2, 3].map(function (x) { return x * 2; }).filter(function (x) { return x > 2; }));\n\
                  print('abcdef'.substring(4, 1) + 'abcdef'.slice(-2));";
    assert_eq!(output_of(source), vec!["c-b-a", "E", "4,6", "bcdef"]);
}

#[test]
fn exit_stops_the_script() {
    let run = run_with("print(1); exit(4); print(2);", &[]);
    assert!(matches!(run.outcome, Ok(Termination::Exited(4))));
    assert_eq!(run.stdout, vec!["1"]);
}

#[test]
fn eval_returns_the_completion_value() {
    let engine = ScriptEngine::new(&[]);
    let value = engine.eval("var t = 20; t + 1").unwrap();
    assert!(matches!(value, Value::Number(n) if n == 21.0));
}
