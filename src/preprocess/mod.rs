//! Scripting-mode preprocessing.
//!
//! Scripting mode adds shell conveniences on top of standard source:
//!
//! - `#` whole-line comments,
//! - `${expr}` interpolation inside double-quoted strings,
//! - heredocs: `<<EOD` (interpolating) and `<<<EOD` / `<<'EOD'` (literal),
//!   closed by a line starting with the delimiter.
//!
//! [`preprocess`] rewrites interpolations and heredocs into plain string
//! expressions so the standard parser never sees them. `#` lines pass through
//! untouched and are dropped by the scripting-mode lexer. Line numbers of the
//! output match the input.

mod interpolate;
mod scanner;

use serde::Serialize;

use crate::errors::{RigError, SourceContext};

pub use interpolate::escape_literal;

/// How a script's source is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SourceMode {
    #[default]
    Standard,
    Scripting,
}

/// A heredoc found during preprocessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeredocToken {
    pub delimiter: String,
    /// Body text before interpolation. Lines are joined by `\n`; the last
    /// line keeps its newline only in the `<<<` form.
    pub raw_body: String,
    pub interpolation_allowed: bool,
    pub start_line: usize,
    pub end_line: usize,
}

impl HeredocToken {
    /// The body as a standard-mode string literal, ignoring interpolation.
    pub fn to_literal(&self) -> String {
        escape_literal(&self.raw_body)
    }
}

/// Output of [`preprocess`].
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub code: String,
    pub heredocs: Vec<HeredocToken>,
}

/// Rewrites scripting-mode source into standard-mode source.
#[tracing::instrument(skip_all, fields(name = %source.name, len = source.content.len()))]
pub fn preprocess(source: &SourceContext) -> Result<Preprocessed, RigError> {
    let (code, heredocs) = scanner::Scanner::new(source).run()?;
    Ok(Preprocessed { code, heredocs })
}

/// Returns the source the parser should see for the given mode.
pub fn prepare(source: &SourceContext, mode: SourceMode) -> Result<String, RigError> {
    match mode {
        SourceMode::Standard => Ok(source.content.clone()),
        SourceMode::Scripting => preprocess(source).map(|p| p.code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorType;

    fn rewrite(src: &str) -> String {
        preprocess(&SourceContext::from_file("t.js", src))
            .expect("preprocess")
            .code
    }

    fn error(src: &str) -> RigError {
        preprocess(&SourceContext::from_file("t.js", src)).expect_err("should fail")
    }

    #[test]
    fn shift_operators_are_untouched() {
        for src in ["var x = 1 << 3;", "x <<= 2;", "var x = 1\n<<\n3;", "a << b + c;"] {
            assert_eq!(rewrite(src), src);
        }
    }

    #[test]
    fn heredoc_becomes_a_literal_and_keeps_line_count() {
        let src = "var y = <<EOD;\nThere we go\nEOD y = \"No\";\nprint(y);\n";
        let out = rewrite(src);
        assert_eq!(out, "var y = \"There we go\";\n\n y = \"No\";\nprint(y);\n");
        assert_eq!(out.lines().count(), src.lines().count());
    }

    #[test]
    fn heredoc_expression_keeps_rest_of_line() {
        let src = "print(<<EOD + \"!!!!\")\nHi ${c}\nEOD\nnext();\n";
        assert_eq!(
            rewrite(src),
            "print((\"Hi \" + (c)) + \"!!!!\")\n\n\nnext();\n"
        );
    }

    #[test]
    fn literal_heredocs_do_not_interpolate() {
        let src = "print(<<<EOD)\nover ${c}\nEOD\n";
        assert_eq!(rewrite(src), "print(\"over ${c}\\n\")\n\n\n");
        let quoted = "print(<<'EOD')\nover ${c}\nEOD\n";
        assert_eq!(rewrite(quoted), "print(\"over ${c}\")\n\n\n");
    }

    #[test]
    fn closing_delimiter_may_be_indented() {
        let src = "f(<<HTML)\n  <p>\n  HTML\n";
        assert_eq!(rewrite(src), "f(\"  <p>\")\n\n\n");
    }

    #[test]
    fn spaced_identifier_at_line_end_opens_a_heredoc() {
        let src = "var s = << EOD\nbody\nEOD\n";
        assert_eq!(rewrite(src), "var s = \"body\"\n\n\n");
    }

    #[test]
    fn two_heredocs_on_one_line() {
        let src = "f(<<A, <<B);\none\nA\ntwo\nB\n";
        let pre = preprocess(&SourceContext::from_file("t.js", src)).expect("preprocess");
        assert_eq!(pre.code, "f(\"one\", \"two\");\n\n\n\n\n");
        assert_eq!(pre.heredocs.len(), 2);
        assert_eq!(pre.heredocs[1].start_line, 1);
        assert_eq!(pre.heredocs[1].end_line, 5);
    }

    #[test]
    fn trailing_code_before_second_body_is_rejected() {
        let err = error("f(<<A, <<B);\none\nA x();\ntwo\nB\n");
        assert!(matches!(err, RigError::MalformedHeredoc { .. }));
    }

    #[test]
    fn unterminated_heredoc_reports_delimiter_and_line() {
        let err = error("var a = 1;\nprint(<<EOD)\nnever closed\n");
        match err {
            RigError::UnterminatedHeredoc {
                delimiter, line, ..
            } => {
                assert_eq!(delimiter, "EOD");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unterminated_interpolation_reports_line() {
        let err = error("var a;\nprint(\"x ${a\");\n");
        assert_eq!(err.error_type(), ErrorType::UnterminatedInterpolation);
        assert!(matches!(err, RigError::UnterminatedInterpolation { line: 2, .. }));
    }

    #[test]
    fn hash_lines_and_comments_are_not_scanned() {
        let src = "# see <<EOD and ${x}\n// <<EOD\n/* ${y} */ x = 1;\n";
        assert_eq!(rewrite(src), src);
    }

    #[test]
    fn standard_mode_is_identity() {
        let ctx = SourceContext::from_file("t.js", "print(\"${a}\")");
        assert_eq!(
            prepare(&ctx, SourceMode::Standard).expect("prepare"),
            "print(\"${a}\")"
        );
    }
}
