mod common;

use common::{output_of, run_with};
use scriptrig::{
    directives::parse_directives,
    preprocess::{prepare, preprocess, SourceMode},
    ErrorType, SourceContext,
};

fn ctx(src: &str) -> SourceContext {
    SourceContext::from_file("t.js", src)
}

#[test]
fn scripting_output_runs_the_same_in_standard_mode() {
    let src = "var name = 'rig';\nvar greeting = <<EOD\nhello ${name}\nEOD\nprint(greeting.length);\nprint(\"x${1 + 1}y\");\n";
    let rewritten = preprocess(&ctx(src)).unwrap().code;

    let scripting = run_with(src, &["-scripting"]);
    assert!(scripting.outcome.is_ok());
    assert_eq!(scripting.stdout, output_of(&rewritten));
    assert_eq!(scripting.stdout, vec!["9", "x2y"]);
}

#[test]
fn line_numbers_survive_rewriting() {
    let src = "var a = <<EOD\none\ntwo\nEOD\nfail('here');\n";
    let rewritten = preprocess(&ctx(src)).unwrap().code;
    assert_eq!(rewritten.lines().count(), src.lines().count());

    let run = run_with(src, &["-scripting"]);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].line, 5);
}

#[test]
fn heredoc_tokens_describe_their_bodies() {
    let src = "print(<<<RAW)\nkeep ${this}\n\"quoted\"\nRAW\n";
    let pre = preprocess(&ctx(src)).unwrap();
    assert_eq!(pre.heredocs.len(), 1);
    let token = &pre.heredocs[0];
    assert_eq!(token.delimiter, "RAW");
    assert!(!token.interpolation_allowed);
    assert_eq!(token.raw_body, "keep ${this}\n\"quoted\"\n");
    assert_eq!(token.to_literal(), r#""keep ${this}\n\"quoted\"\n""#);
    assert_eq!((token.start_line, token.end_line), (1, 4));
}

#[test]
fn standard_mode_leaves_scripting_syntax_alone() {
    let src = "var s = \"${x}\";";
    assert_eq!(prepare(&ctx(src), SourceMode::Standard).unwrap(), src);
    assert_eq!(output_of("print(\"${x}\");"), vec!["${x}"]);
}

#[test]
fn preprocessing_errors_have_their_own_types() {
    let heredoc = prepare(&ctx("print(<<EOD)\nnever\n"), SourceMode::Scripting).unwrap_err();
    assert_eq!(heredoc.error_type(), ErrorType::UnterminatedHeredoc);
    assert!(heredoc.is_parse_time());

    let interp = prepare(&ctx("print(\"${a\");"), SourceMode::Scripting).unwrap_err();
    assert_eq!(interp.error_type(), ErrorType::UnterminatedInterpolation);
}

#[test]
fn directive_header_drives_scripting_mode() {
    let src = "/*\n * @test\n * @option -scripting\n * @argument one\n * @bug 42\n * @run\n */\n";
    let set = parse_directives(&ctx(src)).unwrap();
    assert!(set.is_test());
    assert!(set.scripting());
    assert_eq!(set.arguments(), vec!["one"]);
    assert_eq!(set.bug(), Some("42"));
}
