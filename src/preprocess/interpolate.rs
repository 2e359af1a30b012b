//! `${expr}` splitting and string-literal rendering.
//!
//! Both quoted strings and heredoc bodies go through [`split`]; the result is
//! rendered back into a standard-mode expression by [`render`]. Offsets in
//! [`InterpolationError`] are relative to the text handed to `split`.

/// How the text handed to [`split`] is delimited and escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Body {
    /// Contents of a string literal opened with the given quote. Scanning stops
    /// at the matching quote; backslash escapes are kept raw.
    Quoted(u8),
    /// A heredoc body: verbatim text, only `\${` is an escape.
    Heredoc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    Expr { code: String, offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterpolationError {
    Unterminated { at: usize },
    Nested { at: usize },
    Empty { at: usize },
    /// A quoted string ran into a line break or the end of input.
    UnclosedString,
}

/// Result of splitting: the segments and the offset just past the closing
/// quote (or the end of the text for heredoc bodies).
pub(crate) struct Split {
    pub segments: Vec<Segment>,
    pub end: usize,
    pub interpolated: bool,
}

pub(crate) fn split(text: &str, body: Body) -> Result<Split, InterpolationError> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut seg_start = 0;
    let mut pos = 0;
    let mut interpolated = false;

    loop {
        let Some(&b) = bytes.get(pos) else {
            return match body {
                Body::Quoted(_) => Err(InterpolationError::UnclosedString),
                Body::Heredoc => {
                    current.push_str(&text[seg_start..pos]);
                    push_text(&mut segments, current);
                    Ok(Split {
                        segments,
                        end: pos,
                        interpolated,
                    })
                }
            };
        };

        match (body, b) {
            (Body::Quoted(q), _) if b == q => {
                current.push_str(&text[seg_start..pos]);
                push_text(&mut segments, current);
                return Ok(Split {
                    segments,
                    end: pos + 1,
                    interpolated,
                });
            }
            (Body::Quoted(_), b'\n') => return Err(InterpolationError::UnclosedString),
            (Body::Quoted(_), b'\\') => {
                pos += 1 + char_len(text, pos + 1);
            }
            (Body::Heredoc, b'\\') if text[pos + 1..].starts_with("${") => {
                current.push_str(&text[seg_start..pos]);
                current.push_str("${");
                pos += 3;
                seg_start = pos;
            }
            (Body::Quoted(b'\''), _) => pos += 1,
            (_, b'$') if bytes.get(pos + 1) == Some(&b'{') => {
                current.push_str(&text[seg_start..pos]);
                push_text(&mut segments, std::mem::take(&mut current));
                let (code, close) = scan_expression(text, pos)?;
                segments.push(Segment::Expr {
                    code: code.to_string(),
                    offset: pos,
                });
                interpolated = true;
                pos = close + 1;
                seg_start = pos;
            }
            _ => pos += 1,
        }
    }
}

/// Scans the expression of the `${` at `open`; returns the code and the
/// offset of the closing brace.
fn scan_expression(text: &str, open: usize) -> Result<(&str, usize), InterpolationError> {
    let bytes = text.as_bytes();
    let mut pos = open + 2;
    let mut depth = 0usize;
    loop {
        match bytes.get(pos) {
            None | Some(b'\n') => return Err(InterpolationError::Unterminated { at: open }),
            Some(b'{') => depth += 1,
            Some(b'}') if depth == 0 => {
                let code = &text[open + 2..pos];
                if code.trim().is_empty() {
                    return Err(InterpolationError::Empty { at: open });
                }
                return Ok((code, pos));
            }
            Some(b'}') => depth -= 1,
            Some(b'$') if bytes.get(pos + 1) == Some(&b'{') => {
                return Err(InterpolationError::Nested { at: pos });
            }
            Some(&q @ (b'"' | b'\'' | b'`')) => {
                pos += 1;
                loop {
                    match bytes.get(pos) {
                        None | Some(b'\n') => {
                            return Err(InterpolationError::Unterminated { at: open })
                        }
                        Some(b'\\') => pos += 1,
                        Some(&c) if c == q => break,
                        _ => {}
                    }
                    pos += 1;
                }
            }
            _ => {}
        }
        pos += 1;
    }
}

fn push_text(segments: &mut Vec<Segment>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(prev)) = segments.last_mut() {
        prev.push_str(&text);
    } else {
        segments.push(Segment::Text(text));
    }
}

fn char_len(text: &str, pos: usize) -> usize {
    text.get(pos..)
        .and_then(|rest| rest.chars().next())
        .map_or(0, char::len_utf8)
}

/// Renders segments as a standard-mode expression.
///
/// Without interpolation this is a single string literal; otherwise a
/// parenthesised `+` chain that always starts with a string literal so the
/// chain concatenates rather than adds.
pub(crate) fn render(segments: &[Segment], body: Body) -> String {
    let literal = |text: &str| match body {
        Body::Quoted(q) => {
            let q = q as char;
            format!("{q}{text}{q}")
        }
        Body::Heredoc => escape_literal(text),
    };

    if !segments.iter().any(|s| matches!(s, Segment::Expr { .. })) {
        let text = match segments.first() {
            Some(Segment::Text(text)) => text.as_str(),
            _ => "",
        };
        return literal(text);
    }

    let mut parts = Vec::with_capacity(segments.len() + 1);
    if matches!(segments.first(), Some(Segment::Expr { .. })) {
        parts.push(literal(""));
    }
    for segment in segments {
        match segment {
            Segment::Text(text) => parts.push(literal(text)),
            Segment::Expr { code, .. } => parts.push(format!("({code})")),
        }
    }
    format!("({})", parts.join(" + "))
}

/// Quotes arbitrary text as a double-quoted string literal.
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' | '\u{2029}' => out.push_str(&format!("\\u{:04x}", ch as u32)),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quoted(text: &str) -> Split {
        split(text, Body::Quoted(b'"')).expect("split")
    }

    #[test]
    fn plain_string_has_one_segment() {
        let s = quoted(r#"hello\n world" + rest"#);
        assert!(!s.interpolated);
        assert_eq!(s.segments, vec![Segment::Text(r"hello\n world".into())]);
        assert_eq!(s.end, 14);
    }

    #[test]
    fn interpolation_renders_as_concatenation() {
        let s = quoted(r#"a ${t} string""#);
        assert!(s.interpolated);
        assert_eq!(render(&s.segments, Body::Quoted(b'"')), r#"("a " + (t) + " string")"#);
    }

    #[test]
    fn leading_expression_gets_an_empty_literal() {
        let s = quoted(r#"${a}${b}""#);
        assert_eq!(render(&s.segments, Body::Quoted(b'"')), r#"("" + (a) + (b))"#);
    }

    #[test]
    fn quotes_inside_expression_do_not_end_the_string() {
        let s = quoted(r#"v=${m["k"]}!""#);
        assert_eq!(
            s.segments[1],
            Segment::Expr {
                code: r#"m["k"]"#.into(),
                offset: 2
            }
        );
    }

    #[test]
    fn escaped_opener_is_not_interpolation() {
        let s = quoted(r#"cost \${x}""#);
        assert!(!s.interpolated);
    }

    #[test]
    fn single_quotes_never_interpolate() {
        let s = split("a ${b}'", Body::Quoted(b'\'')).expect("split");
        assert!(!s.interpolated);
    }

    #[test]
    fn errors_are_reported_at_the_opener() {
        assert_eq!(
            split("x ${a", Body::Heredoc).err(),
            Some(InterpolationError::Unterminated { at: 2 })
        );
        assert_eq!(
            split("${a ${b}}", Body::Heredoc).err(),
            Some(InterpolationError::Nested { at: 4 })
        );
        assert_eq!(
            split("${  }", Body::Heredoc).err(),
            Some(InterpolationError::Empty { at: 0 })
        );
        assert_eq!(
            split("abc\n", Body::Quoted(b'"')).err(),
            Some(InterpolationError::UnclosedString)
        );
    }

    #[test]
    fn heredoc_escape_drops_backslash() {
        let s = split("cost \\${x}\n", Body::Heredoc).expect("split");
        assert_eq!(s.segments, vec![Segment::Text("cost ${x}\n".into())]);
    }

    #[test]
    fn escape_literal_handles_specials() {
        assert_eq!(escape_literal("a\"b\\c\nd\te"), r#""a\"b\\c\nd\te""#);
        assert_eq!(escape_literal("\u{1}"), r#""\u0001""#);
    }
}
