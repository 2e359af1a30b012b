//! The embedded script evaluator.
//!
//! This is a small ECMAScript subset: enough for regression scripts that
//! print, assert with `fail`, use closures and objects, and poke at engine
//! bindings. It is not a conforming engine.

pub mod builtins;
pub mod eval;
pub mod object;
pub mod output;
pub mod scope;
pub mod value;

use std::time::Duration;

use serde::Serialize;

pub use eval::{EvaluationContext, Realm, Unwind};
pub use object::{is_enumerable, ObjectRef, PropertyMap};
pub use output::{CaptureHandle, NullSink, OutputBuffer, OutputSink, SharedOutput, StdoutSink};
pub use value::Value;

/// Keys the engine owns. Stored on the global object but never enumerated.
pub const ENGINE_KEYS: &[&str] = &[
    "javax.script.filename",
    "javax.script.argv",
    "__FILE__",
    "__DIR__",
    "$OPTIONS",
    "$ARG",
    "arguments",
];

pub fn is_engine_key(key: &str) -> bool {
    ENGINE_KEYS.contains(&key)
}

/// Binds `key` on a global object: engine keys non-enumerable, others
/// enumerable.
pub fn put_binding(global: &ObjectRef, key: &str, value: Value) {
    global
        .borrow_mut()
        .props
        .define(key, value, !is_engine_key(key));
}

/// A `fail(message)` recorded during a run. Execution continues after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftFailure {
    pub message: String,
    pub line: usize,
}

/// Resource limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Call depth after which a `RangeError` is thrown.
    pub max_depth: usize,
    /// Wall-clock budget; exceeding it halts the run.
    pub timeout: Option<Duration>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 200,
            timeout: None,
        }
    }
}
