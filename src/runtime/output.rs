use std::{cell::RefCell, rc::Rc};

use crate::Span;

/// Destination for script `print` output.
pub trait OutputSink {
    fn emit(&mut self, text: &str, span: Option<&Span>);
}

// A null output sink for running without output.
pub struct NullSink;
impl OutputSink for NullSink {
    fn emit(&mut self, _text: &str, _span: Option<&Span>) {}
}

/// Shared, mutable handle to an output sink.
#[derive(Clone)]
pub struct SharedOutput(pub Rc<RefCell<dyn OutputSink>>);

impl SharedOutput {
    pub fn new<T: OutputSink + 'static>(sink: T) -> Self {
        SharedOutput(Rc::new(RefCell::new(sink)))
    }

    pub fn emit(&self, text: &str, span: Option<&Span>) {
        self.0.borrow_mut().emit(text, span);
    }
}

/// Collects output lines for capture.
///
/// One `print` may produce several lines; each embedded `\n` starts a new one.
#[derive(Debug, Default, Clone)]
pub struct OutputBuffer {
    pub lines: Vec<String>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_text(&self) -> String {
        self.lines.join("\n")
    }
}

impl OutputSink for OutputBuffer {
    fn emit(&mut self, text: &str, _span: Option<&Span>) {
        self.lines.extend(text.split('\n').map(str::to_string));
    }
}

/// Writes output to stdout.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, text: &str, _span: Option<&Span>) {
        println!("{}", text);
    }
}

/// Shared buffer whose lines can be read after the run.
#[derive(Clone, Default)]
pub struct CaptureHandle(Rc<RefCell<OutputBuffer>>);

impl CaptureHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> SharedOutput {
        SharedOutput(self.0.clone())
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().lines.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_newlines_split_lines() {
        let capture = CaptureHandle::new();
        let out = capture.output();
        out.emit("a\nb", None);
        out.emit("", None);
        assert_eq!(capture.lines(), vec!["a", "b", ""]);
    }
}
