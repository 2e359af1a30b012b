//! Directive (pragma) parsing.
//!
//! A script describes how it wants to be run in block comments at the top of
//! the file:
//!
//! ```text
//! /**
//!  * @test
//!  * @option -scripting
//!  * @run
//!  */
//! ```
//!
//! Only the leading comment region is scanned. Unknown tags are kept but
//! flagged so that newer suites still load.

use pest::{iterators::Pair, Parser};
use pest_derive::Parser;
use serde::Serialize;

use crate::errors::{RigError, SourceContext};
use crate::Span;

#[derive(Parser)]
#[grammar = "directives/directives.pest"]
struct DirectiveParser;

const KNOWN_TAGS: &[&str] = &[
    "test", "run", "run/fail", "option", "bug", "subtest", "argument",
];

// ============================================================================
// TYPES
// ============================================================================

/// One `@name value` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    pub name: String,
    pub value: Option<String>,
    pub known: bool,
    pub line: usize,
}

/// What a test case expects of its own run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExpectedOutcome {
    #[default]
    Pass,
    /// `@run/fail`: the run must fail, and the failure text must contain
    /// `message` when one is given.
    Fail { message: Option<String> },
}

/// All directives of one script, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectiveSet {
    pub directives: Vec<Directive>,
}

impl DirectiveSet {
    fn tagged<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Directive> + 'a {
        self.directives.iter().filter(move |d| d.name == name)
    }

    fn has(&self, name: &str) -> bool {
        self.tagged(name).next().is_some()
    }

    pub fn is_test(&self) -> bool {
        self.has("test")
    }

    pub fn is_subtest(&self) -> bool {
        self.has("subtest")
    }

    /// Engine flags from every `@option`, split on whitespace.
    pub fn options(&self) -> Vec<String> {
        self.tagged("option")
            .filter_map(|d| d.value.as_deref())
            .flat_map(str::split_whitespace)
            .map(str::to_string)
            .collect()
    }

    pub fn arguments(&self) -> Vec<String> {
        self.tagged("argument")
            .filter_map(|d| d.value.clone())
            .collect()
    }

    /// True when `-scripting` is among the options.
    pub fn scripting(&self) -> bool {
        self.options()
            .iter()
            .any(|o| o.trim_start_matches('-') == "scripting")
    }

    pub fn expected_outcome(&self) -> ExpectedOutcome {
        match self.tagged("run/fail").next() {
            Some(d) => ExpectedOutcome::Fail {
                message: d.value.clone(),
            },
            None => ExpectedOutcome::Pass,
        }
    }

    pub fn bug(&self) -> Option<&str> {
        self.tagged("bug").find_map(|d| d.value.as_deref())
    }

    pub fn unknown(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter().filter(|d| !d.known)
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Reads the directive tags from the leading comment region of `source`.
#[tracing::instrument(skip_all, fields(name = %source.name))]
pub fn parse_directives(source: &SourceContext) -> Result<DirectiveSet, RigError> {
    let text = source.content.as_str();
    let mut pairs = DirectiveParser::parse(Rule::prologue, text).map_err(|e| {
        let at = match e.location {
            pest::error::InputLocation::Pos(pos) => pos,
            pest::error::InputLocation::Span((start, _)) => start,
        };
        source.malformed_directive(e.variant.message().to_string(), Span::new(at, at + 1), None)
    })?;

    let mut set = DirectiveSet::default();
    let mut test_block: Option<Span> = None;
    let Some(prologue) = pairs.next() else {
        return Ok(set);
    };

    for block in prologue.into_inner() {
        if block.as_rule() != Rule::block_comment {
            continue;
        }
        let block_span = span_of(&block);
        for tag in block.into_inner() {
            if !starts_its_line(text, tag.as_span().start()) {
                continue;
            }
            let directive = build_directive(tag, source);
            if directive.name == "test" {
                test_block.get_or_insert(block_span);
            }
            set.directives.push(directive);
        }
    }

    if let Some(span) = test_block {
        if !set.has("run") && !set.has("run/fail") {
            return Err(source.malformed_directive(
                "'@test' without '@run'",
                span,
                Some("add '@run' or '@run/fail' to the directive block".into()),
            ));
        }
    }

    for unknown in set.unknown() {
        tracing::debug!(tag = %unknown.name, line = unknown.line, "ignoring unknown directive");
    }
    Ok(set)
}

fn build_directive(tag: Pair<Rule>, source: &SourceContext) -> Directive {
    let line = source.line_of(tag.as_span().start());
    let mut name = String::new();
    let mut value = None;
    for part in tag.into_inner() {
        match part.as_rule() {
            Rule::tag_name => name = part.as_str().to_string(),
            Rule::tag_value => {
                let text = part.as_str().trim();
                if !text.is_empty() {
                    value = Some(text.to_string());
                }
            }
            _ => {}
        }
    }
    let known = KNOWN_TAGS.contains(&name.as_str());
    Directive {
        name,
        value,
        known,
        line,
    }
}

/// A tag counts only when nothing but indentation and `*` precede it.
fn starts_its_line(text: &str, at: usize) -> bool {
    text[..at]
        .chars()
        .rev()
        .take_while(|c| *c != '\n')
        .all(|c| c == ' ' || c == '\t' || c == '*' || c == '/')
}

fn span_of(pair: &Pair<Rule>) -> Span {
    Span::new(pair.as_span().start(), pair.as_span().end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorType;

    fn parse(src: &str) -> Result<DirectiveSet, RigError> {
        parse_directives(&SourceContext::from_file("t.js", src))
    }

    const SCRIPTING_TEST: &str = "/*\n * Copyright notice\n * mail: someone@example.com\n */\n\n/**\n * Test scripting mode.\n *\n * @test\n * @option -scripting\n * @bug 8050432\n * @run\n */\n\nprint(1);\n";

    #[test]
    fn reads_tags_after_a_license_block() {
        let set = parse(SCRIPTING_TEST).expect("parse");
        assert!(set.is_test());
        assert!(set.scripting());
        assert_eq!(set.bug(), Some("8050432"));
        assert_eq!(set.options(), vec!["-scripting"]);
        assert_eq!(set.expected_outcome(), ExpectedOutcome::Pass);
        assert!(set.directives.iter().all(|d| d.name != "example.com"));
    }

    #[test]
    fn run_fail_carries_its_message() {
        let set = parse("/**\n * @test\n * @run/fail TypeError\n */\n").expect("parse");
        assert_eq!(
            set.expected_outcome(),
            ExpectedOutcome::Fail {
                message: Some("TypeError".into())
            }
        );
    }

    #[test]
    fn tags_after_code_are_ignored() {
        let set = parse("print(1);\n/**\n * @test\n */\n").expect("parse");
        assert!(set.directives.is_empty());
    }

    #[test]
    fn options_repeat_and_split() {
        let set = parse("/*\n * @test\n * @option -scripting -Dx=1\n * @option --strict\n * @argument a b\n * @run\n */")
            .expect("parse");
        assert_eq!(set.options(), vec!["-scripting", "-Dx=1", "--strict"]);
        assert_eq!(set.arguments(), vec!["a b"]);
    }

    #[test]
    fn unknown_tags_are_kept_but_flagged() {
        let set = parse("/**\n * @test\n * @fork\n * @run\n */").expect("parse");
        let unknown: Vec<_> = set.unknown().map(|d| d.name.as_str()).collect();
        assert_eq!(unknown, vec!["fork"]);
    }

    #[test]
    fn test_without_run_is_malformed() {
        let err = parse("/**\n * @test\n * @option -scripting\n */\n").expect_err("malformed");
        assert_eq!(err.error_type(), ErrorType::MalformedDirective);
    }

    #[test]
    fn shebang_and_line_comments_may_precede_tags() {
        let set = parse("#!/usr/bin/env scriptrig\n// helper\n/*\n * @subtest\n */\n").expect("parse");
        assert!(set.is_subtest());
        assert!(!set.is_test());
    }
}
