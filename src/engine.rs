//! The embeddable script engine.
//!
//! A [`ScriptEngine`] owns one realm (global object and prototypes). Bindings
//! can be injected with [`ScriptEngine::put`] before source is evaluated;
//! engine-owned keys such as [`ScriptEngine::FILENAME`] are stored
//! non-enumerable so that scripts enumerating their global object never see
//! them.

use std::{cell::RefCell, path::Path, rc::Rc};

use crate::{
    errors::{RigError, SourceContext},
    preprocess::{prepare, SourceMode},
    runtime::{
        builtins::{self, FILENAME_KEY},
        is_enumerable,
        object::{lookup, Object, ObjectKind},
        put_binding, EvaluationContext, Limits, NullSink, ObjectRef, Realm, SharedOutput,
        SoftFailure, Unwind, Value,
    },
    syntax::parse,
};

/// How a run ended when it did not error.
#[derive(Debug)]
pub enum Termination {
    /// The program ran to its end; the value is its completion value.
    Completed(Value),
    /// `exit(code)` or `quit(code)` was called.
    Exited(i32),
}

pub struct ScriptEngine {
    realm: Rc<Realm>,
    scripting: bool,
    limits: Limits,
    output: SharedOutput,
    failures: Rc<RefCell<Vec<SoftFailure>>>,
}

impl ScriptEngine {
    /// Key under which the current script's file name is stored.
    pub const FILENAME: &'static str = FILENAME_KEY;

    /// A fresh engine. `options` are engine flags such as `-scripting`; they
    /// also show up on `$OPTIONS`.
    pub fn new(options: &[String]) -> Self {
        let scripting = options
            .iter()
            .any(|o| o.trim_start_matches('-') == "scripting");
        Self {
            realm: builtins::create_realm(options),
            scripting,
            limits: Limits::default(),
            output: SharedOutput::new(NullSink),
            failures: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_output(mut self, output: SharedOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn is_scripting(&self) -> bool {
        self.scripting
    }

    pub fn global(&self) -> ObjectRef {
        self.realm.global.clone()
    }

    pub fn put(&self, key: &str, value: impl Into<Value>) {
        put_binding(&self.realm.global, key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.realm.global, key)
    }

    /// Whether `key` shows up when the global object is enumerated.
    pub fn is_enumerable(&self, key: &str) -> bool {
        is_enumerable(&self.realm.global, key)
    }

    /// Soft failures recorded so far, in order.
    pub fn failures(&self) -> Vec<SoftFailure> {
        self.failures.borrow().clone()
    }

    /// Injects `__FILE__`, `__DIR__`, the filename key, `$ARG` and
    /// `arguments` for a script at `path`.
    pub fn bind_script(&self, path: &Path, args: &[String]) {
        let file = path.display().to_string();
        let dir = match path.parent().map(|p| p.display().to_string()) {
            Some(dir) if !dir.is_empty() => format!("{dir}/"),
            _ => "./".to_string(),
        };
        self.put("__FILE__", file.clone());
        self.put("__DIR__", dir);
        self.put(Self::FILENAME, file);

        let argv = || {
            let items = args.iter().map(|a| Value::str(a)).collect();
            Value::Object(Object::alloc(
                ObjectKind::Array(items),
                Some(self.realm.array_proto.clone()),
            ))
        };
        self.put("$ARG", argv());
        self.put("arguments", argv());
    }

    /// Preprocesses (in scripting mode), parses and runs `source`.
    ///
    /// A value thrown and not caught comes back as [`RigError::Evaluation`]
    /// pointing at the `throw` site.
    #[tracing::instrument(skip_all, fields(name = %source.name, scripting = self.scripting))]
    pub fn execute(&self, source: &SourceContext) -> Result<Termination, RigError> {
        let mode = if self.scripting {
            SourceMode::Scripting
        } else {
            SourceMode::Standard
        };
        let code = prepare(source, mode)?;
        let prepared = Rc::new(SourceContext::from_file(source.name.clone(), code));
        let program = parse(&prepared, self.scripting)?;

        let mut ctx = EvaluationContext::new(
            self.realm.clone(),
            self.output.clone(),
            prepared,
            self.scripting,
            self.limits,
        );
        ctx.failures = self.failures.clone();

        match ctx.run_program(&program) {
            Ok(value) => Ok(Termination::Completed(value)),
            Err(Unwind::Exit(code)) => {
                tracing::debug!(code, "script exited");
                Ok(Termination::Exited(code))
            }
            Err(Unwind::Halt(err)) => Err(err),
            Err(Unwind::Throw {
                value,
                span,
                source,
            }) => {
                let message = ctx.describe(&value);
                Err(source.evaluation_error(message, span))
            }
        }
    }

    /// Evaluates a snippet and returns its completion value. An `exit` inside
    /// the snippet yields `undefined`.
    pub fn eval(&self, code: &str) -> Result<Value, RigError> {
        let source = SourceContext::from_file("<eval>", code);
        match self.execute(&source)? {
            Termination::Completed(value) => Ok(value),
            Termination::Exited(_) => Ok(Value::Undefined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::CaptureHandle;

    #[test]
    fn injected_filename_is_hidden_from_enumeration() {
        let engine = ScriptEngine::new(&[]);
        engine.put(ScriptEngine::FILENAME, "foo");
        engine.put("visible", "bar");
        assert!(!engine.is_enumerable(ScriptEngine::FILENAME));
        assert!(engine.is_enumerable("visible"));
        assert!(matches!(engine.get(ScriptEngine::FILENAME), Some(Value::Str(s)) if &*s == "foo"));
    }

    #[test]
    fn uncaught_throw_becomes_an_evaluation_error() {
        let engine = ScriptEngine::new(&[]);
        let err = engine.eval("throw new TypeError('bad')").unwrap_err();
        assert_eq!(err.to_string(), "TypeError: bad");
    }

    #[test]
    fn exit_reports_its_code() {
        let capture = CaptureHandle::new();
        let engine = ScriptEngine::new(&[]).with_output(capture.output());
        let source = SourceContext::from_file("t.js", "print('a'); exit(3); print('b');");
        assert!(matches!(engine.execute(&source), Ok(Termination::Exited(3))));
        assert_eq!(capture.lines(), vec!["a"]);
    }

    #[test]
    fn script_bindings_are_injected() {
        let engine = ScriptEngine::new(&[]);
        engine.bind_script(Path::new("dir/sub/t.js"), &["x".to_string()]);
        let value = engine.eval("__DIR__ + '|' + __FILE__ + '|' + $ARG[0]").unwrap();
        assert!(matches!(value, Value::Str(s) if &*s == "dir/sub/|dir/sub/t.js|x"));
        assert!(!engine.is_enumerable("__FILE__"));
    }
}
