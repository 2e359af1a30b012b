//! Character-level rewrite of scripting-mode source.
//!
//! The scanner copies source through unchanged except for three constructs:
//! double-quoted strings containing `${`, heredocs, and nothing else. Comments
//! and `#` lines are copied verbatim but never searched for those constructs.

use tracing::debug;

use super::interpolate::{self, Body, InterpolationError, Segment};
use super::HeredocToken;
use crate::errors::{to_source_span, RigError, SourceContext};

/// Heredocs opened on the line currently being scanned.
struct HeredocGroup {
    /// Where the next body on this line starts.
    next_body: usize,
    /// Where scanning resumes once the opening line is done.
    resume_at: usize,
    /// End of the line holding the last closing delimiter.
    closing_line_end: usize,
    delimiter: String,
}

pub(crate) struct Scanner<'a> {
    ctx: &'a SourceContext,
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    out: String,
    heredocs: Vec<HeredocToken>,
    group: Option<HeredocGroup>,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(ctx: &'a SourceContext) -> Self {
        Self {
            ctx,
            src: &ctx.content,
            bytes: ctx.content.as_bytes(),
            pos: 0,
            out: String::with_capacity(ctx.content.len()),
            heredocs: Vec::new(),
            group: None,
        }
    }

    pub(crate) fn run(mut self) -> Result<(String, Vec<HeredocToken>), RigError> {
        while self.pos < self.bytes.len() {
            self.copy_plain();
            let Some(&b) = self.bytes.get(self.pos) else {
                break;
            };
            let next = self.bytes.get(self.pos + 1).copied();
            match (b, next) {
                (b'\n', _) => self.newline(),
                (b'#', _) if self.at_line_start() => self.copy_to_line_end(),
                (b'/', Some(b'/')) => self.copy_to_line_end(),
                (b'/', Some(b'*')) => self.copy_block_comment(),
                (b'"', _) | (b'\'', _) => self.string()?,
                (b'`', _) => self.copy_backtick(),
                (b'<', Some(b'<')) => self.shift_or_heredoc()?,
                _ => {
                    self.out.push(b as char);
                    self.pos += 1;
                }
            }
        }
        Ok((self.out, self.heredocs))
    }

    fn copy_plain(&mut self) {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if matches!(b, b'\n' | b'#' | b'/' | b'"' | b'\'' | b'`' | b'<') {
                break;
            }
            self.pos += 1;
        }
        self.out.push_str(&self.src[start..self.pos]);
    }

    fn newline(&mut self) {
        match self.group.take() {
            Some(group) => {
                // Keep line numbers stable: one newline per line the bodies used.
                let skipped = self.src[self.pos..group.resume_at]
                    .bytes()
                    .filter(|b| *b == b'\n')
                    .count();
                self.out.extend(std::iter::repeat('\n').take(skipped));
                self.pos = group.resume_at;
            }
            None => {
                self.out.push('\n');
                self.pos += 1;
            }
        }
    }

    fn at_line_start(&self) -> bool {
        self.src[..self.pos]
            .bytes()
            .rev()
            .take_while(|b| *b != b'\n')
            .all(|b| b == b' ' || b == b'\t')
    }

    fn line_end(&self, from: usize) -> usize {
        self.src[from..]
            .find('\n')
            .map_or(self.src.len(), |i| from + i)
    }

    fn copy_to_line_end(&mut self) {
        let end = self.line_end(self.pos);
        self.out.push_str(&self.src[self.pos..end]);
        self.pos = end;
    }

    fn copy_block_comment(&mut self) {
        let end = self.src[self.pos + 2..]
            .find("*/")
            .map_or(self.src.len(), |i| self.pos + 2 + i + 2);
        self.out.push_str(&self.src[self.pos..end]);
        self.pos = end;
    }

    fn copy_backtick(&mut self) {
        let mut end = self.pos + 1;
        while let Some(&b) = self.bytes.get(end) {
            end += 1;
            match b {
                b'\\' => end += 1,
                b'`' => break,
                _ => {}
            }
        }
        let end = end.min(self.src.len());
        self.out.push_str(&self.src[self.pos..end]);
        self.pos = end;
    }

    fn string(&mut self) -> Result<(), RigError> {
        let quote = self.bytes[self.pos];
        let body_start = self.pos + 1;
        match interpolate::split(&self.src[body_start..], Body::Quoted(quote)) {
            Ok(split) if !split.interpolated => {
                let end = body_start + split.end;
                self.out.push_str(&self.src[self.pos..end]);
                self.pos = end;
            }
            Ok(split) => {
                self.out
                    .push_str(&interpolate::render(&split.segments, Body::Quoted(quote)));
                self.pos = body_start + split.end;
            }
            // Leave the broken literal for the parser to report.
            Err(InterpolationError::UnclosedString) => {
                self.out.push(quote as char);
                self.pos += 1;
            }
            Err(err) => return Err(self.interpolation_error(err, body_start)),
        }
        Ok(())
    }

    fn interpolation_error(&self, err: InterpolationError, base: usize) -> RigError {
        let at = match err {
            InterpolationError::Unterminated { at }
            | InterpolationError::Nested { at }
            | InterpolationError::Empty { at } => at,
            InterpolationError::UnclosedString => 0,
        };
        let offset = (base + at).min(self.src.len());
        let line = self.ctx.line_of(offset);
        let src = self.ctx.to_named_source();
        let span = to_source_span(offset..(offset + 2).min(self.src.len()));
        match err {
            InterpolationError::Nested { .. } => RigError::NestedInterpolation { line, src, span },
            InterpolationError::Empty { .. } => RigError::EmptyInterpolation { line, src, span },
            InterpolationError::Unterminated { .. } | InterpolationError::UnclosedString => {
                RigError::UnterminatedInterpolation { line, src, span }
            }
        }
    }

    // ------------------------------------------------------------------------
    // HEREDOCS
    // ------------------------------------------------------------------------

    fn shift_or_heredoc(&mut self) -> Result<(), RigError> {
        let open = self.pos;
        let mut cursor = open + 2;
        let literal_form = self.bytes.get(cursor) == Some(&b'<');
        if literal_form {
            cursor += 1;
        }

        let Some(opener) = self.heredoc_opener(cursor) else {
            debug!(offset = open, "'<<' is a shift operator");
            self.out.push_str(&self.src[open..cursor]);
            self.pos = cursor;
            return Ok(());
        };

        let interpolation_allowed = !literal_form && opener.quote != Some(b'\'');
        let open_line = self.ctx.line_of(open);
        let opening_line_end = self.line_end(opener.after);
        let body_start = match &self.group {
            Some(group) => group.next_body,
            None => opening_line_end + 1,
        };

        let Some(closing) = self.find_closing(&opener.delimiter, body_start) else {
            return Err(RigError::UnterminatedHeredoc {
                delimiter: opener.delimiter,
                line: open_line,
                src: self.ctx.to_named_source(),
                span: to_source_span(open..opener.after),
            });
        };

        if let Some(group) = &self.group {
            let trailing = &self.src[group.resume_at..group.closing_line_end];
            if !trailing.trim().is_empty() {
                return Err(RigError::MalformedHeredoc {
                    delimiter: group.delimiter.clone(),
                    line: self.ctx.line_of(group.resume_at),
                    reason: "code after a closing delimiter must follow the last heredoc opened on the line".into(),
                    src: self.ctx.to_named_source(),
                    span: to_source_span(group.resume_at..group.closing_line_end),
                });
            }
        }

        let mut raw_body = self.src[body_start.min(closing.line_start)..closing.line_start]
            .replace("\r\n", "\n");
        // Only `<<<` keeps the newline that ends the last body line.
        if !literal_form && raw_body.ends_with('\n') {
            raw_body.pop();
        }
        let segments = if interpolation_allowed {
            interpolate::split(&raw_body, Body::Heredoc)
                .map_err(|err| self.interpolation_error(err, body_start))?
                .segments
        } else {
            vec![Segment::Text(raw_body.clone())]
        };
        self.out
            .push_str(&interpolate::render(&segments, Body::Heredoc));

        debug!(
            delimiter = %opener.delimiter,
            line = open_line,
            interpolation_allowed,
            "rewrote heredoc"
        );
        self.heredocs.push(HeredocToken {
            delimiter: opener.delimiter.clone(),
            raw_body,
            interpolation_allowed,
            start_line: open_line,
            end_line: self.ctx.line_of(closing.line_start),
        });

        self.group = Some(HeredocGroup {
            next_body: (closing.line_end + 1).min(self.src.len()),
            resume_at: closing.delimiter_end,
            closing_line_end: closing.line_end,
            delimiter: opener.delimiter,
        });
        self.pos = opener.after;
        Ok(())
    }

    /// Lookahead at the raw characters after `<<` / `<<<`.
    ///
    /// A heredoc opens when an identifier (optionally quoted) directly follows
    /// the operator, or when, after spaces or tabs, a bare identifier is the
    /// last thing on the line. Anything else leaves `<<` as an operator.
    fn heredoc_opener(&self, cursor: usize) -> Option<Opener> {
        let bytes = self.bytes;
        match bytes.get(cursor) {
            Some(&b) if is_ident_start(b) => {
                let end = self.ident_end(cursor);
                Some(Opener {
                    delimiter: self.src[cursor..end].to_string(),
                    quote: None,
                    after: end,
                })
            }
            Some(&q @ (b'\'' | b'"')) => {
                let start = cursor + 1;
                if !bytes.get(start).is_some_and(|b| is_ident_start(*b)) {
                    return None;
                }
                let end = self.ident_end(start);
                (bytes.get(end) == Some(&q)).then(|| Opener {
                    delimiter: self.src[start..end].to_string(),
                    quote: Some(q),
                    after: end + 1,
                })
            }
            Some(b' ' | b'\t') => {
                let start = cursor + self.src[cursor..].len()
                    - self.src[cursor..].trim_start_matches([' ', '\t']).len();
                if !bytes.get(start).is_some_and(|b| is_ident_start(*b)) {
                    return None;
                }
                let end = self.ident_end(start);
                let rest = &self.src[end..self.line_end(end)];
                rest.trim_end_matches('\r').is_empty().then(|| Opener {
                    delimiter: self.src[start..end].to_string(),
                    quote: None,
                    after: end,
                })
            }
            _ => None,
        }
    }

    fn ident_end(&self, start: usize) -> usize {
        let mut end = start;
        while self.bytes.get(end).is_some_and(|b| is_ident_part(*b)) {
            end += 1;
        }
        end
    }

    /// Finds the first line at or after `from` that starts (after indentation)
    /// with `delimiter` not followed by another identifier character.
    fn find_closing(&self, delimiter: &str, from: usize) -> Option<Closing> {
        let mut line_start = from;
        while line_start < self.src.len() {
            let line_end = self.line_end(line_start);
            let line = &self.src[line_start..line_end];
            let trimmed = line.trim_start_matches([' ', '\t']);
            if let Some(after) = trimmed.strip_prefix(delimiter) {
                if !after.bytes().next().is_some_and(is_ident_part) {
                    let indent = line.len() - trimmed.len();
                    return Some(Closing {
                        line_start,
                        line_end,
                        delimiter_end: line_start + indent + delimiter.len(),
                    });
                }
            }
            line_start = line_end + 1;
        }
        None
    }
}

struct Opener {
    delimiter: String,
    quote: Option<u8>,
    after: usize,
}

struct Closing {
    line_start: usize,
    line_end: usize,
    delimiter_end: usize,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_part(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}
