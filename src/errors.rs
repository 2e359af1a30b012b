//! scriptrig error handling.
//!
//! Every failure the harness can produce is a [`RigError`]. Variants that point
//! into a script carry the script text as a `NamedSource` plus a labelled span,
//! so the CLI can render them through `miette` with the offending line shown.

use std::{fmt, ops::Range, sync::Arc};

use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use serde::Serialize;
use thiserror::Error;

use crate::Span;

pub type SourceArc = Arc<NamedSource<String>>;

// ============================================================================
// SOURCE CONTEXT
// ============================================================================

/// A named piece of source text used for error reporting.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    /// Create a source context from real file content.
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a fallback when real source is unavailable.
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "fallback".to_string(),
            content: format!("// {}", context),
        }
    }

    /// Convert to NamedSource for use with miette error reporting.
    pub fn to_named_source(&self) -> SourceArc {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }

    /// 1-based line number of a byte offset.
    pub fn line_of(&self, offset: usize) -> usize {
        line_of(&self.content, offset)
    }

    pub fn syntax_error(&self, message: impl Into<String>, span: Span) -> RigError {
        RigError::Syntax {
            message: message.into(),
            src: self.to_named_source(),
            span: self.clamp(span),
        }
    }

    pub fn evaluation_error(&self, message: impl Into<String>, span: Span) -> RigError {
        RigError::Evaluation {
            message: message.into(),
            src: self.to_named_source(),
            span: self.clamp(span),
        }
    }

    pub fn malformed_directive(
        &self,
        message: impl Into<String>,
        span: Span,
        help: Option<String>,
    ) -> RigError {
        RigError::MalformedDirective {
            message: message.into(),
            src: self.to_named_source(),
            span: self.clamp(span),
            help,
        }
    }

    // miette refuses to render a label past the end of the source.
    fn clamp(&self, span: Span) -> SourceSpan {
        let len = self.content.len();
        let start = span.start.min(len);
        let end = span.end.clamp(start, len);
        to_source_span(start..end)
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("default context")
    }
}

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

/// Type-safe error classification used by expectations and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorType {
    MalformedDirective,
    UnterminatedHeredoc,
    UnterminatedInterpolation,
    Syntax,
    Evaluation,
    SoftFailure,
    Timeout,
    Io,
    Config,
    Internal,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::MalformedDirective => "MalformedDirective",
            ErrorType::UnterminatedHeredoc => "UnterminatedHeredoc",
            ErrorType::UnterminatedInterpolation => "UnterminatedInterpolation",
            ErrorType::Syntax => "Syntax",
            ErrorType::Evaluation => "Evaluation",
            ErrorType::SoftFailure => "SoftFailure",
            ErrorType::Timeout => "Timeout",
            ErrorType::Io => "Io",
            ErrorType::Config => "Config",
            ErrorType::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// THE ERROR TYPE
// ============================================================================

#[derive(Error, Diagnostic, Debug)]
pub enum RigError {
    #[error("malformed directive: {message}")]
    #[diagnostic(code(scriptrig::directives::malformed))]
    MalformedDirective {
        message: String,
        #[source_code]
        src: SourceArc,
        #[label("in this directive block")]
        span: SourceSpan,
        #[help]
        help: Option<String>,
    },

    #[error("unterminated heredoc '{delimiter}' opened on line {line}")]
    #[diagnostic(
        code(scriptrig::preprocess::unterminated_heredoc),
        help("close the block with a line that starts with '{delimiter}'")
    )]
    UnterminatedHeredoc {
        delimiter: String,
        line: usize,
        #[source_code]
        src: SourceArc,
        #[label("heredoc opened here")]
        span: SourceSpan,
    },

    #[error("malformed heredoc '{delimiter}' on line {line}: {reason}")]
    #[diagnostic(code(scriptrig::preprocess::malformed_heredoc))]
    MalformedHeredoc {
        delimiter: String,
        line: usize,
        reason: String,
        #[source_code]
        src: SourceArc,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("unterminated interpolation opened on line {line}")]
    #[diagnostic(
        code(scriptrig::preprocess::unterminated_interpolation),
        help("close the expression with '}}' or escape the opener as '\\${{'")
    )]
    UnterminatedInterpolation {
        line: usize,
        #[source_code]
        src: SourceArc,
        #[label("'${{' without a matching '}}'")]
        span: SourceSpan,
    },

    #[error("nested interpolation on line {line}")]
    #[diagnostic(
        code(scriptrig::preprocess::nested_interpolation),
        help("escape the inner opener as '\\${{'")
    )]
    NestedInterpolation {
        line: usize,
        #[source_code]
        src: SourceArc,
        #[label("'${{' inside an interpolation")]
        span: SourceSpan,
    },

    #[error("empty interpolation on line {line}")]
    #[diagnostic(code(scriptrig::preprocess::empty_interpolation))]
    EmptyInterpolation {
        line: usize,
        #[source_code]
        src: SourceArc,
        #[label("no expression between '${{' and '}}'")]
        span: SourceSpan,
    },

    #[error("syntax error: {message}")]
    #[diagnostic(code(scriptrig::parse::syntax))]
    Syntax {
        message: String,
        #[source_code]
        src: SourceArc,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error("{message}")]
    #[diagnostic(code(scriptrig::eval::uncaught))]
    Evaluation {
        message: String,
        #[source_code]
        src: SourceArc,
        #[label("thrown here")]
        span: SourceSpan,
    },

    #[error("script exceeded the {limit_ms} ms time limit")]
    #[diagnostic(code(scriptrig::eval::timeout))]
    Timeout { limit_ms: u64 },

    #[error("cannot read '{path}': {message}")]
    #[diagnostic(code(scriptrig::io))]
    Io { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(scriptrig::config))]
    Config { message: String },

    #[error("internal error: {message}")]
    #[diagnostic(code(scriptrig::internal))]
    Internal { message: String },
}

impl RigError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            RigError::MalformedDirective { .. } => ErrorType::MalformedDirective,
            RigError::UnterminatedHeredoc { .. } => ErrorType::UnterminatedHeredoc,
            RigError::UnterminatedInterpolation { .. } => ErrorType::UnterminatedInterpolation,
            RigError::MalformedHeredoc { .. }
            | RigError::NestedInterpolation { .. }
            | RigError::EmptyInterpolation { .. }
            | RigError::Syntax { .. } => ErrorType::Syntax,
            RigError::Evaluation { .. } => ErrorType::Evaluation,
            RigError::Timeout { .. } => ErrorType::Timeout,
            RigError::Io { .. } => ErrorType::Io,
            RigError::Config { .. } => ErrorType::Config,
            RigError::Internal { .. } => ErrorType::Internal,
        }
    }

    /// True for errors raised before any script code ran.
    pub fn is_parse_time(&self) -> bool {
        !matches!(
            self.error_type(),
            ErrorType::Evaluation | ErrorType::Timeout | ErrorType::SoftFailure | ErrorType::Internal
        )
    }

    pub fn io(path: impl fmt::Display, err: std::io::Error) -> Self {
        RigError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// UTILITIES
// ============================================================================

pub fn to_source_span(range: Range<usize>) -> SourceSpan {
    SourceSpan::from(range)
}

/// 1-based line number of `offset` within `text`.
pub fn line_of(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

/// Prints a RigError with full miette diagnostics.
pub fn print_error(error: RigError) {
    let report = Report::new(error);
    eprintln!("{report:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_numbers_are_one_based() {
        let text = "a\nb\nc";
        assert_eq!(line_of(text, 0), 1);
        assert_eq!(line_of(text, 2), 2);
        assert_eq!(line_of(text, 4), 3);
        assert_eq!(line_of(text, 100), 3);
    }

    #[test]
    fn spans_are_clamped_to_source() {
        let ctx = SourceContext::from_file("t.js", "abc");
        let err = ctx.syntax_error("boom", Span { start: 2, end: 50 });
        let RigError::Syntax { span, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(span.offset(), 2);
        assert_eq!(span.len(), 1);
    }

    #[test]
    fn report_renders_code_and_help() {
        let ctx = SourceContext::from_file("t.js", "print(<<EOD)\nbody\n");
        let err = RigError::UnterminatedHeredoc {
            delimiter: "EOD".into(),
            line: 1,
            src: ctx.to_named_source(),
            span: to_source_span(6..11),
        };
        assert_eq!(err.error_type(), ErrorType::UnterminatedHeredoc);
        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("scriptrig::preprocess::unterminated_heredoc"));
        assert!(output.contains("EOD"));
    }
}
