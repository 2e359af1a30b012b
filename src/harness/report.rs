//! Suite reporting: coloured console output and JSON.

use std::io;

use difference::{Changeset, Difference};
use serde::Serialize;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use super::{
    suite::{SuiteCounts, SuiteOutcome, TestOutcome},
    ExecutionResult, SoftFailure, Verdict,
};

// ============================================================================
// CONSOLE
// ============================================================================

pub struct Reporter<W: WriteColor> {
    out: W,
}

impl Reporter<StandardStream> {
    pub fn stdout(use_colors: bool) -> Self {
        let choice = if use_colors {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self::new(StandardStream::stdout(choice))
    }
}

impl<W: WriteColor> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn label(&mut self, text: &str, color: Color) -> io::Result<()> {
        self.out
            .set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(self.out, "{text}")?;
        self.out.reset()
    }

    pub fn outcome(&mut self, outcome: &TestOutcome) -> io::Result<()> {
        let bug = outcome
            .bug
            .as_deref()
            .map(|b| format!(" (bug {b})"))
            .unwrap_or_default();
        match &outcome.verdict {
            Verdict::Pass => {
                self.label("PASS", Color::Green)?;
                writeln!(self.out, ": {}{bug}", outcome.name)
            }
            Verdict::Skip { reason } => {
                self.label("SKIP", Color::Yellow)?;
                writeln!(self.out, ": {} ({reason})", outcome.name)
            }
            Verdict::Fail { reasons } => {
                self.label("FAIL", Color::Red)?;
                writeln!(self.out, ": {}{bug}", outcome.name)?;
                for reason in reasons {
                    writeln!(self.out, "  {reason}")?;
                }
                if let (Some(golden), Some(result)) = (&outcome.golden, &outcome.result) {
                    if super::output_lines(golden) != result.stdout {
                        writeln!(self.out, "  diff (expected -, actual +):")?;
                        self.diff(golden, &result.stdout.join("\n"))?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Line diff between expected and actual output.
    pub fn diff(&mut self, expected: &str, actual: &str) -> io::Result<()> {
        let expected = expected.replace("\r\n", "\n");
        let changeset = Changeset::new(expected.trim_end_matches('\n'), actual, "\n");
        for diff in &changeset.diffs {
            let (prefix, color, text) = match diff {
                Difference::Same(text) => (' ', None, text),
                Difference::Rem(text) => ('-', Some(Color::Red), text),
                Difference::Add(text) => ('+', Some(Color::Green), text),
            };
            match color {
                Some(color) => self.out.set_color(ColorSpec::new().set_fg(Some(color)))?,
                None => self.out.reset()?,
            }
            for line in text.split('\n') {
                writeln!(self.out, "  {prefix}{line}")?;
            }
        }
        self.out.reset()
    }

    pub fn summary(&mut self, counts: &SuiteCounts) -> io::Result<()> {
        writeln!(self.out)?;
        write!(self.out, "Test summary: total {}, ", counts.total)?;
        self.label("passed", Color::Green)?;
        write!(self.out, " {}, ", counts.passed)?;
        self.label("failed", Color::Red)?;
        write!(self.out, " {}, ", counts.failed)?;
        self.label("skipped", Color::Yellow)?;
        writeln!(self.out, " {}", counts.skipped)?;
        writeln!(
            self.out,
            "Success rate: {:.1}% ({}/{})",
            counts.rate,
            counts.passed,
            counts.passed + counts.failed
        )
    }

    pub fn suite(&mut self, suite: &SuiteOutcome) -> io::Result<()> {
        for outcome in &suite.outcomes {
            self.outcome(outcome)?;
        }
        self.summary(&suite.counts())
    }
}

// ============================================================================
// JSON
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CaseReport<'a> {
    pub name: &'a str,
    #[serde(flatten)]
    pub verdict: &'a Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bug: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub stdout: &'a [String],
    pub failures: &'a [SoftFailure],
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub exit_code: i32,
}

impl<'a> From<&'a ExecutionResult> for RunReport<'a> {
    fn from(result: &'a ExecutionResult) -> Self {
        Self {
            stdout: &result.stdout,
            failures: &result.failures,
            error: result.error.as_ref().map(|e| e.to_string()),
            error_type: result.error.as_ref().map(|e| e.error_type().to_string()),
            exit_code: result.exit_code,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SuiteReport<'a> {
    pub summary: SuiteCounts,
    pub cases: Vec<CaseReport<'a>>,
}

impl<'a> From<&'a SuiteOutcome> for SuiteReport<'a> {
    fn from(suite: &'a SuiteOutcome) -> Self {
        Self {
            summary: suite.counts(),
            cases: suite
                .outcomes
                .iter()
                .map(|o| CaseReport {
                    name: &o.name,
                    verdict: &o.verdict,
                    bug: o.bug.as_deref(),
                    run: o.result.as_ref().map(RunReport::from),
                })
                .collect(),
        }
    }
}

pub fn to_json(suite: &SuiteOutcome) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&SuiteReport::from(suite))
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::NoColor;

    fn outcome(name: &str, verdict: Verdict) -> TestOutcome {
        TestOutcome {
            name: name.to_string(),
            verdict,
            bug: None,
            result: None,
            golden: None,
        }
    }

    fn render(suite: &SuiteOutcome) -> String {
        let mut reporter = Reporter::new(NoColor::new(Vec::new()));
        reporter.suite(suite).unwrap();
        String::from_utf8(reporter.into_inner().into_inner()).unwrap()
    }

    #[test]
    fn console_report_lists_every_case_and_a_summary() {
        let suite = SuiteOutcome {
            outcomes: vec![
                outcome("a.js", Verdict::Pass),
                outcome(
                    "b.js",
                    Verdict::Fail {
                        reasons: vec!["line 3: fail: boom".to_string()],
                    },
                ),
                outcome(
                    "c.js",
                    Verdict::Skip {
                        reason: "marked @subtest".to_string(),
                    },
                ),
            ],
        };
        let text = render(&suite);
        assert!(text.contains("PASS: a.js"));
        assert!(text.contains("FAIL: b.js\n  line 3: fail: boom"));
        assert!(text.contains("SKIP: c.js (marked @subtest)"));
        assert!(text.contains("total 3, passed 1, failed 1, skipped 1"));
        assert!(text.contains("Success rate: 50.0% (1/2)"));
    }

    #[test]
    fn failing_golden_output_is_diffed() {
        let mut failing = outcome(
            "d.js",
            Verdict::Fail {
                reasons: vec!["output did not match the golden file".to_string()],
            },
        );
        failing.golden = Some("one\ntwo\n".to_string());
        failing.result = Some(ExecutionResult {
            stdout: vec!["one".to_string(), "three".to_string()],
            failures: Vec::new(),
            error: None,
            exit_code: 0,
        });
        let text = render(&SuiteOutcome {
            outcomes: vec![failing],
        });
        assert!(text.contains("  -two"));
        assert!(text.contains("  +three"));
    }

    #[test]
    fn json_report_flattens_verdicts() {
        let suite = SuiteOutcome {
            outcomes: vec![outcome("a.js", Verdict::Pass)],
        };
        let json: serde_json::Value = serde_json::from_str(&to_json(&suite).unwrap()).unwrap();
        assert_eq!(json["summary"]["passed"], 1);
        assert_eq!(json["cases"][0]["verdict"], "pass");
        assert_eq!(json["cases"][0]["name"], "a.js");
    }
}
