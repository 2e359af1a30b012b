//! Tree-walking evaluator.
//!
//! Statements produce a [`Completion`]; anything that leaves the normal flow
//! across function boundaries (`throw`, `exit`, a timeout) is an [`Unwind`].

use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::HashMap,
    rc::Rc,
    time::{Duration, Instant},
};

use super::object::{array_index, for_in_keys, has_property, lookup, Object, ObjectKind, ObjectRef};
use super::output::SharedOutput;
use super::scope::{Scope, ScopeRef};
use super::value::{to_int32, to_uint32, Callable, Value};
use super::{Limits, SoftFailure};
use crate::errors::{RigError, SourceContext};
use crate::preprocess::{prepare, SourceMode};
use crate::syntax::{
    parse, BinaryOp, Expr, ExprKind, FunctionDef, MemberKey, Program, Stmt, StmtKind, UnaryOp,
};
use crate::Span;

// ============================================================================
// CONTROL FLOW
// ============================================================================

/// Non-local exit from evaluation.
pub enum Unwind {
    /// A script-level exception; catchable by `try`.
    Throw {
        value: Value,
        span: Span,
        source: Rc<SourceContext>,
    },
    /// `exit(code)` or `quit(code)`.
    Exit(i32),
    /// A harness-level stop, such as a timeout.
    Halt(RigError),
}

pub enum Completion {
    /// The value is the statement's completion value, if it has one.
    Normal(Option<Value>),
    Return(Value),
    Break,
    Continue,
}

/// Prototypes and the global object of one engine instance.
pub struct Realm {
    pub global: ObjectRef,
    pub object_proto: ObjectRef,
    pub function_proto: ObjectRef,
    pub array_proto: ObjectRef,
    pub string_proto: ObjectRef,
    pub error_protos: HashMap<&'static str, ObjectRef>,
    pub options: Vec<String>,
}

#[derive(Clone)]
pub struct Frame {
    pub scope: ScopeRef,
    pub this: Value,
}

enum Reference {
    Name(String),
    Member(Value, String),
}

// ============================================================================
// CONTEXT
// ============================================================================

pub struct EvaluationContext {
    pub realm: Rc<Realm>,
    pub output: SharedOutput,
    pub failures: Rc<RefCell<Vec<SoftFailure>>>,
    pub source: Rc<SourceContext>,
    pub scripting: bool,
    pub depth: usize,
    pub max_depth: usize,
    /// Span of the innermost native call, for failures and errors it raises.
    pub call_span: Span,
    deadline: Option<(Instant, Duration)>,
}

impl EvaluationContext {
    pub fn new(
        realm: Rc<Realm>,
        output: SharedOutput,
        source: Rc<SourceContext>,
        scripting: bool,
        limits: Limits,
    ) -> Self {
        Self {
            realm,
            output,
            failures: Rc::new(RefCell::new(Vec::new())),
            source,
            scripting,
            depth: 0,
            max_depth: limits.max_depth,
            call_span: Span::default(),
            deadline: limits.timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    pub fn global_frame(&self) -> Frame {
        Frame {
            scope: Scope::global(self.realm.global.clone()),
            this: Value::Object(self.realm.global.clone()),
        }
    }

    /// Runs a parsed program in the global scope and returns its completion
    /// value.
    pub fn run_program(&mut self, program: &Program) -> Result<Value, Unwind> {
        let frame = self.global_frame();
        self.hoist(&program.body, &frame);
        Ok(match self.exec_block(&program.body, &frame)? {
            Completion::Normal(value) => value.unwrap_or_default(),
            Completion::Return(value) => value,
            Completion::Break | Completion::Continue => Value::Undefined,
        })
    }

    /// Indirect `eval`: preprocesses (in scripting mode), parses and runs
    /// `code` in the global scope. Parse failures become `SyntaxError`s.
    pub fn eval_source(&mut self, name: &str, code: &str) -> Result<Value, Unwind> {
        let raw = SourceContext::from_file(name, code);
        let mode = if self.scripting {
            SourceMode::Scripting
        } else {
            SourceMode::Standard
        };
        let parsed = prepare(&raw, mode).and_then(|text| {
            let source = Rc::new(SourceContext::from_file(name, text));
            parse(&source, self.scripting).map(|program| (source, program))
        });
        let (source, program) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => return Err(self.throw_error("SyntaxError", err.to_string(), self.call_span)),
        };
        let saved = std::mem::replace(&mut self.source, source);
        let result = self.run_program(&program);
        self.source = saved;
        result
    }

    /// Runs `f` with another realm installed, as nested engines do.
    pub fn with_realm<T>(&mut self, realm: Rc<Realm>, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.realm, realm);
        let result = f(self);
        self.realm = saved;
        result
    }

    /// Halts with `Timeout` once the deadline has passed.
    pub fn tick(&self) -> Result<(), Unwind> {
        match self.deadline {
            Some((deadline, limit)) if Instant::now() >= deadline => {
                Err(Unwind::Halt(RigError::Timeout {
                    limit_ms: limit.as_millis() as u64,
                }))
            }
            _ => Ok(()),
        }
    }

    pub fn record_failure(&self, message: String) {
        let line = self.source.line_of(self.call_span.start);
        tracing::debug!(line, %message, "soft failure");
        self.failures.borrow_mut().push(SoftFailure { message, line });
    }

    // ------------------------------------------------------------------------
    // ALLOCATION
    // ------------------------------------------------------------------------

    pub fn new_object(&self) -> ObjectRef {
        Object::alloc(ObjectKind::Ordinary, Some(self.realm.object_proto.clone()))
    }

    pub fn new_array(&self, items: Vec<Value>) -> Value {
        Value::Object(Object::alloc(
            ObjectKind::Array(items),
            Some(self.realm.array_proto.clone()),
        ))
    }

    pub fn new_function(&self, callable: Callable) -> Value {
        Value::Object(Object::alloc(
            ObjectKind::Function(callable),
            Some(self.realm.function_proto.clone()),
        ))
    }

    fn make_closure(&self, def: &Rc<FunctionDef>, env: ScopeRef) -> Value {
        let func = self.new_function(Callable::Closure {
            def: def.clone(),
            env,
            source: self.source.clone(),
        });
        if let Value::Object(obj) = &func {
            let proto = self.new_object();
            obj.borrow_mut()
                .props
                .define("prototype", Value::Object(proto), false);
        }
        func
    }

    pub fn make_error(&self, kind: &str, message: impl Into<String>) -> Value {
        let proto = self
            .realm
            .error_protos
            .get(kind)
            .or_else(|| self.realm.error_protos.get("Error"))
            .cloned();
        let obj = Object::alloc(ObjectKind::Error, proto);
        obj.borrow_mut()
            .props
            .define("message", Value::from(message.into()), false);
        Value::Object(obj)
    }

    pub fn throw_error(&self, kind: &str, message: impl Into<String>, span: Span) -> Unwind {
        Unwind::Throw {
            value: self.make_error(kind, message),
            span,
            source: self.source.clone(),
        }
    }

    fn snippet(&self, span: Span) -> &str {
        self.source
            .content
            .get(span.start..span.end)
            .unwrap_or("value")
    }

    // ------------------------------------------------------------------------
    // CONVERSIONS
    // ------------------------------------------------------------------------

    pub fn to_primitive(&mut self, value: Value, prefer_string: bool) -> Result<Value, Unwind> {
        let Value::Object(obj) = &value else {
            return Ok(value);
        };
        let order = if prefer_string {
            ["toString", "valueOf"]
        } else {
            ["valueOf", "toString"]
        };
        for name in order {
            let Some(method) = lookup(obj, name) else {
                continue;
            };
            if method.is_callable() {
                let result = self.call(&method, value.clone(), Vec::new(), self.call_span)?;
                if !matches!(result, Value::Object(_)) {
                    return Ok(result);
                }
            }
        }
        Err(self.throw_error(
            "TypeError",
            "cannot convert object to primitive value",
            self.call_span,
        ))
    }

    pub fn to_string(&mut self, value: &Value) -> Result<String, Unwind> {
        match value {
            Value::Object(_) => Ok(self.to_primitive(value.clone(), true)?.primitive_to_string()),
            other => Ok(other.primitive_to_string()),
        }
    }

    pub fn to_number(&mut self, value: &Value) -> Result<f64, Unwind> {
        match value {
            Value::Object(_) => Ok(self.to_primitive(value.clone(), false)?.primitive_to_number()),
            other => Ok(other.primitive_to_number()),
        }
    }

    /// String conversion that never fails, for reporting uncaught values.
    pub fn describe(&mut self, value: &Value) -> String {
        self.to_string(value)
            .unwrap_or_else(|_| value.primitive_to_string())
    }

    // ------------------------------------------------------------------------
    // PROPERTIES
    // ------------------------------------------------------------------------

    pub fn get_member(&mut self, object: &Value, key: &str, span: Span) -> Result<Value, Unwind> {
        match object {
            Value::Undefined | Value::Null => Err(self.throw_error(
                "TypeError",
                format!(
                    "Cannot read property \"{key}\" from {}",
                    object.primitive_to_string()
                ),
                span,
            )),
            Value::Object(obj) => Ok(lookup(obj, key).unwrap_or_default()),
            Value::Str(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(i)
                        .map_or(Value::Undefined, |c| Value::from(c.to_string())));
                }
                Ok(lookup(&self.realm.string_proto, key).unwrap_or_default())
            }
            Value::Number(_) | Value::Bool(_) => {
                Ok(lookup(&self.realm.object_proto, key).unwrap_or_default())
            }
        }
    }

    pub fn set_member(
        &mut self,
        object: &Value,
        key: &str,
        value: Value,
        span: Span,
    ) -> Result<(), Unwind> {
        match object {
            Value::Object(obj) => {
                if let Some(message) = obj.borrow().rejects(key, &value) {
                    return Err(self.throw_error("RangeError", message, span));
                }
                obj.borrow_mut().put(key, value);
                Ok(())
            }
            Value::Undefined | Value::Null => Err(self.throw_error(
                "TypeError",
                format!(
                    "Cannot set property \"{key}\" of {}",
                    object.primitive_to_string()
                ),
                span,
            )),
            _ => Ok(()),
        }
    }

    fn member_key(&mut self, property: &MemberKey, frame: &Frame) -> Result<String, Unwind> {
        match property {
            MemberKey::Named(name) => Ok(name.clone()),
            MemberKey::Computed(expr) => {
                let key = self.eval(expr, frame)?;
                self.to_string(&key)
            }
        }
    }

    // ------------------------------------------------------------------------
    // CALLS
    // ------------------------------------------------------------------------

    pub fn call(
        &mut self,
        func: &Value,
        this: Value,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, Unwind> {
        let callable = func
            .as_object()
            .and_then(|obj| obj.borrow().callable().cloned());
        let Some(callable) = callable else {
            return Err(self.throw_error("TypeError", "value is not a function", span));
        };
        self.tick()?;
        match callable {
            Callable::Native { call, .. } => {
                let saved = std::mem::replace(&mut self.call_span, span);
                let result = call(self, this, args);
                self.call_span = saved;
                result
            }
            Callable::Closure { def, env, source } => {
                self.call_closure(&def, env, source, this, args, span)
            }
        }
    }

    fn call_closure(
        &mut self,
        def: &FunctionDef,
        env: ScopeRef,
        source: Rc<SourceContext>,
        this: Value,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, Unwind> {
        if self.depth >= self.max_depth {
            return Err(self.throw_error("RangeError", "Maximum call stack size exceeded", span));
        }
        let scope = Scope::local(env);
        scope.declare("arguments", Some(self.new_array(args.clone())));
        for (i, param) in def.params.iter().enumerate() {
            scope.declare(param, Some(args.get(i).cloned().unwrap_or_default()));
        }
        let this = if this.is_nullish() {
            Value::Object(self.realm.global.clone())
        } else {
            this
        };
        let frame = Frame { scope, this };

        let saved_source = std::mem::replace(&mut self.source, source);
        self.depth += 1;
        self.hoist(&def.body, &frame);
        let result = self.exec_block(&def.body, &frame);
        self.depth -= 1;
        self.source = saved_source;

        Ok(match result? {
            Completion::Return(value) => value,
            _ => Value::Undefined,
        })
    }

    pub fn construct(&mut self, func: &Value, args: Vec<Value>, span: Span) -> Result<Value, Unwind> {
        let target = func
            .as_object()
            .and_then(|obj| obj.borrow().callable().cloned().map(|c| (obj.clone(), c)));
        match target {
            Some((_, Callable::Native { call, constructor: true, .. })) => {
                let saved = std::mem::replace(&mut self.call_span, span);
                let result = call(self, Value::Undefined, args);
                self.call_span = saved;
                result
            }
            Some((obj, Callable::Closure { .. })) => {
                let proto = match lookup(&obj, "prototype") {
                    Some(Value::Object(proto)) => proto,
                    _ => self.realm.object_proto.clone(),
                };
                let instance = Value::Object(Object::alloc(ObjectKind::Ordinary, Some(proto)));
                let result = self.call(func, instance.clone(), args, span)?;
                Ok(if matches!(result, Value::Object(_)) {
                    result
                } else {
                    instance
                })
            }
            _ => Err(self.throw_error("TypeError", "value is not a constructor", span)),
        }
    }

    fn eval_args(&mut self, args: &[Expr], frame: &Frame) -> Result<Vec<Value>, Unwind> {
        args.iter().map(|arg| self.eval(arg, frame)).collect()
    }

    // ------------------------------------------------------------------------
    // STATEMENTS
    // ------------------------------------------------------------------------

    /// Declares `var`s and binds function declarations before a body runs.
    fn hoist(&mut self, body: &[Stmt], frame: &Frame) {
        let mut names = Vec::new();
        collect_var_names(body, &mut names);
        for name in &names {
            frame.scope.declare(name, None);
        }
        for stmt in body {
            if let StmtKind::Function(def) = &stmt.kind {
                if let Some(name) = &def.name {
                    let func = self.make_closure(def, frame.scope.clone());
                    frame.scope.declare(name, Some(func));
                }
            }
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], frame: &Frame) -> Result<Completion, Unwind> {
        let mut last = None;
        for stmt in stmts {
            match self.exec(stmt, frame)? {
                Completion::Normal(Some(value)) => last = Some(value),
                Completion::Normal(None) => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(last))
    }

    fn exec(&mut self, stmt: &Stmt, frame: &Frame) -> Result<Completion, Unwind> {
        match &stmt.kind {
            StmtKind::Var(decls) => {
                for decl in decls {
                    if let Some(init) = &decl.init {
                        let value = self.eval(init, frame)?;
                        frame.scope.assign(&decl.name, value);
                    }
                }
                Ok(Completion::Normal(None))
            }
            StmtKind::Function(def) => {
                self.bind_nested_function(def, frame);
                Ok(Completion::Normal(None))
            }
            StmtKind::Expr(expr) => Ok(Completion::Normal(Some(self.eval(expr, frame)?))),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, frame)?.is_truthy() {
                    self.exec(consequent, frame)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate, frame)
                } else {
                    Ok(Completion::Normal(None))
                }
            }
            StmtKind::While { test, body } => {
                loop {
                    self.tick()?;
                    if !self.eval(test, frame)?.is_truthy() {
                        break;
                    }
                    match self.exec(body, frame)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                }
                Ok(Completion::Normal(None))
            }
            StmtKind::DoWhile { body, test } => {
                loop {
                    self.tick()?;
                    match self.exec(body, frame)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                    if !self.eval(test, frame)?.is_truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal(None))
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.exec(init, frame)?;
                }
                loop {
                    self.tick()?;
                    if let Some(test) = test {
                        if !self.eval(test, frame)?.is_truthy() {
                            break;
                        }
                    }
                    match self.exec(body, frame)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, frame)?;
                    }
                }
                Ok(Completion::Normal(None))
            }
            StmtKind::ForIn {
                name, object, body, ..
            } => {
                let object = self.eval(object, frame)?;
                let keys = match &object {
                    Value::Object(obj) => for_in_keys(obj),
                    Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
                    _ => Vec::new(),
                };
                for key in keys {
                    self.tick()?;
                    if let Value::Object(obj) = &object {
                        // Deleted during iteration.
                        if !has_property(obj, &key) {
                            continue;
                        }
                    }
                    frame.scope.assign(name, Value::from(key));
                    match self.exec(body, frame)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Continue | Completion::Normal(_) => {}
                    }
                }
                Ok(Completion::Normal(None))
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            StmtKind::Break => Ok(Completion::Break),
            StmtKind::Continue => Ok(Completion::Continue),
            StmtKind::Throw(expr) => {
                let value = self.eval(expr, frame)?;
                Err(Unwind::Throw {
                    value,
                    span: stmt.span,
                    source: self.source.clone(),
                })
            }
            StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            } => self.exec_try(block, param.as_deref(), handler.as_deref(), finalizer.as_deref(), frame),
            StmtKind::Block(stmts) => self.exec_block(stmts, frame),
            StmtKind::Empty => Ok(Completion::Normal(None)),
        }
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        param: Option<&str>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
        frame: &Frame,
    ) -> Result<Completion, Unwind> {
        let result = match (self.exec_block(block, frame), handler) {
            (Err(Unwind::Throw { value, .. }), Some(handler)) => {
                let scope = Scope::local(frame.scope.clone());
                if let Some(param) = param {
                    scope.declare(param, Some(value));
                }
                let inner = Frame {
                    scope,
                    this: frame.this.clone(),
                };
                self.exec_block(handler, &inner)
            }
            (other, _) => other,
        };
        let Some(finalizer) = finalizer else {
            return result;
        };
        if matches!(result, Err(Unwind::Exit(_)) | Err(Unwind::Halt(_))) {
            return result;
        }
        match self.exec_block(finalizer, frame)? {
            Completion::Normal(_) => result,
            abrupt => Ok(abrupt),
        }
    }

    /// Function declarations outside a body's top level bind when reached.
    fn bind_nested_function(&mut self, def: &Rc<FunctionDef>, frame: &Frame) {
        let Some(name) = &def.name else {
            return;
        };
        let already_bound = match frame.scope.lookup(name) {
            Some(Value::Object(obj)) => {
                let obj = obj.borrow();
                matches!(obj.callable(), Some(Callable::Closure { def: bound, .. }) if Rc::ptr_eq(bound, def))
            }
            _ => false,
        };
        if !already_bound {
            let func = self.make_closure(def, frame.scope.clone());
            frame.scope.assign(name, func);
        }
    }

    // ------------------------------------------------------------------------
    // EXPRESSIONS
    // ------------------------------------------------------------------------

    pub fn eval(&mut self, expr: &Expr, frame: &Frame) -> Result<Value, Unwind> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::str(s)),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Ident(name) => self.lookup_name(name, frame, expr.span),
            ExprKind::This => Ok(frame.this.clone()),
            ExprKind::Array(items) => {
                let values = self.eval_args(items, frame)?;
                Ok(self.new_array(values))
            }
            ExprKind::Object(props) => {
                let obj = self.new_object();
                for (key, value) in props {
                    let value = self.eval(value, frame)?;
                    obj.borrow_mut().props.define(key, value, true);
                }
                Ok(Value::Object(obj))
            }
            ExprKind::Function(def) => Ok(self.function_expression(def, frame)),
            ExprKind::Unary(op, operand) => self.eval_unary(*op, operand, frame),
            ExprKind::Update {
                increment,
                prefix,
                target,
            } => {
                let reference = self.reference(target, frame)?;
                let old = self.get_reference(&reference, frame, target.span)?;
                let old = self.to_number(&old)?;
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.put_reference(reference, Value::Number(new), frame, expr.span)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                self.binary(*op, left, right, expr.span)
            }
            ExprKind::Logical { and, left, right } => {
                let left = self.eval(left, frame)?;
                if left.is_truthy() != *and {
                    return Ok(left);
                }
                self.eval(right, frame)
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, frame)?.is_truthy() {
                    self.eval(consequent, frame)
                } else {
                    self.eval(alternate, frame)
                }
            }
            ExprKind::Assign { op, target, value } => {
                let reference = self.reference(target, frame)?;
                let value = match op {
                    None => self.eval(value, frame)?,
                    Some(op) => {
                        let current = self.get_reference(&reference, frame, target.span)?;
                        let rhs = self.eval(value, frame)?;
                        self.binary(*op, current, rhs, expr.span)?
                    }
                };
                self.put_reference(reference, value.clone(), frame, expr.span)?;
                Ok(value)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, frame, expr.span),
            ExprKind::New { callee, args } => {
                let func = self.eval(callee, frame)?;
                let args = self.eval_args(args, frame)?;
                if !func.is_callable() {
                    let message = format!("{} is not a constructor", self.snippet(callee.span));
                    return Err(self.throw_error("TypeError", message, callee.span));
                }
                self.construct(&func, args, expr.span)
            }
            ExprKind::Member { object, property } => {
                let object = self.eval(object, frame)?;
                let key = self.member_key(property, frame)?;
                self.get_member(&object, &key, expr.span)
            }
            ExprKind::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item, frame)?;
                }
                Ok(last)
            }
        }
    }

    fn lookup_name(&self, name: &str, frame: &Frame, span: Span) -> Result<Value, Unwind> {
        frame
            .scope
            .lookup(name)
            .ok_or_else(|| self.throw_error("ReferenceError", format!("\"{name}\" is not defined"), span))
    }

    fn function_expression(&self, def: &Rc<FunctionDef>, frame: &Frame) -> Value {
        match &def.name {
            // The name is visible inside the body only.
            Some(name) => {
                let scope = Scope::local(frame.scope.clone());
                let func = self.make_closure(def, scope.clone());
                scope.declare(name, Some(func.clone()));
                func
            }
            None => self.make_closure(def, frame.scope.clone()),
        }
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        frame: &Frame,
        span: Span,
    ) -> Result<Value, Unwind> {
        let (func, this) = match &callee.kind {
            ExprKind::Member { object, property } => {
                let object = self.eval(object, frame)?;
                let key = self.member_key(property, frame)?;
                let func = self.get_member(&object, &key, callee.span)?;
                (func, object)
            }
            _ => (self.eval(callee, frame)?, Value::Undefined),
        };
        let args = self.eval_args(args, frame)?;
        if !func.is_callable() {
            let message = format!("{} is not a function", self.snippet(callee.span));
            return Err(self.throw_error("TypeError", message, callee.span));
        }
        self.call(&func, this, args, span)
    }

    fn reference(&mut self, target: &Expr, frame: &Frame) -> Result<Reference, Unwind> {
        match &target.kind {
            ExprKind::Ident(name) => Ok(Reference::Name(name.clone())),
            ExprKind::Member { object, property } => {
                let object = self.eval(object, frame)?;
                let key = self.member_key(property, frame)?;
                Ok(Reference::Member(object, key))
            }
            _ => Err(self.throw_error("SyntaxError", "invalid assignment target", target.span)),
        }
    }

    fn get_reference(
        &mut self,
        reference: &Reference,
        frame: &Frame,
        span: Span,
    ) -> Result<Value, Unwind> {
        match reference {
            Reference::Name(name) => self.lookup_name(name, frame, span),
            Reference::Member(object, key) => self.get_member(object, key, span),
        }
    }

    fn put_reference(
        &mut self,
        reference: Reference,
        value: Value,
        frame: &Frame,
        span: Span,
    ) -> Result<(), Unwind> {
        match reference {
            Reference::Name(name) => {
                frame.scope.assign(&name, value);
                Ok(())
            }
            Reference::Member(object, key) => self.set_member(&object, &key, value, span),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, frame: &Frame) -> Result<Value, Unwind> {
        match (op, &operand.kind) {
            (UnaryOp::TypeOf, ExprKind::Ident(name)) => {
                let type_name = frame
                    .scope
                    .lookup(name)
                    .map_or("undefined", |v| v.type_name());
                return Ok(Value::str(type_name));
            }
            (UnaryOp::Delete, ExprKind::Member { object, property }) => {
                let object = self.eval(object, frame)?;
                let key = self.member_key(property, frame)?;
                return Ok(Value::Bool(match object {
                    Value::Object(obj) => obj.borrow_mut().delete(&key),
                    _ => true,
                }));
            }
            (UnaryOp::Delete, ExprKind::Ident(_)) => return Ok(Value::Bool(false)),
            _ => {}
        }

        let value = self.eval(operand, frame)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.is_truthy()),
            UnaryOp::Neg => Value::Number(-self.to_number(&value)?),
            UnaryOp::Plus => Value::Number(self.to_number(&value)?),
            UnaryOp::BitNot => Value::Number(f64::from(!to_int32(self.to_number(&value)?))),
            UnaryOp::TypeOf => Value::str(value.type_name()),
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Delete => Value::Bool(true),
        })
    }

    pub fn binary(&mut self, op: BinaryOp, a: Value, b: Value, span: Span) -> Result<Value, Unwind> {
        let value = match op {
            BinaryOp::Add => {
                let a = self.to_primitive(a, false)?;
                let b = self.to_primitive(b, false)?;
                if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
                    let mut text = a.primitive_to_string();
                    text.push_str(&b.primitive_to_string());
                    Value::from(text)
                } else {
                    Value::Number(a.primitive_to_number() + b.primitive_to_number())
                }
            }
            BinaryOp::Sub => Value::Number(self.to_number(&a)? - self.to_number(&b)?),
            BinaryOp::Mul => Value::Number(self.to_number(&a)? * self.to_number(&b)?),
            BinaryOp::Div => Value::Number(self.to_number(&a)? / self.to_number(&b)?),
            BinaryOp::Rem => Value::Number(self.to_number(&a)? % self.to_number(&b)?),
            BinaryOp::Shl => {
                let (x, shift) = (to_int32(self.to_number(&a)?), to_uint32(self.to_number(&b)?));
                Value::Number(f64::from(x.wrapping_shl(shift & 31)))
            }
            BinaryOp::Shr => {
                let (x, shift) = (to_int32(self.to_number(&a)?), to_uint32(self.to_number(&b)?));
                Value::Number(f64::from(x >> (shift & 31)))
            }
            BinaryOp::UShr => {
                let (x, shift) = (to_uint32(self.to_number(&a)?), to_uint32(self.to_number(&b)?));
                Value::Number(f64::from(x >> (shift & 31)))
            }
            BinaryOp::BitAnd => {
                Value::Number(f64::from(to_int32(self.to_number(&a)?) & to_int32(self.to_number(&b)?)))
            }
            BinaryOp::BitOr => {
                Value::Number(f64::from(to_int32(self.to_number(&a)?) | to_int32(self.to_number(&b)?)))
            }
            BinaryOp::BitXor => {
                Value::Number(f64::from(to_int32(self.to_number(&a)?) ^ to_int32(self.to_number(&b)?)))
            }
            BinaryOp::Lt => Value::Bool(self.compare(a, b)? == Some(Ordering::Less)),
            BinaryOp::Gt => Value::Bool(self.compare(a, b)? == Some(Ordering::Greater)),
            BinaryOp::Le => Value::Bool(matches!(
                self.compare(a, b)?,
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Ge => Value::Bool(matches!(
                self.compare(a, b)?,
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinaryOp::Eq => Value::Bool(self.loose_equals(a, b)?),
            BinaryOp::Ne => Value::Bool(!self.loose_equals(a, b)?),
            BinaryOp::StrictEq => Value::Bool(a.strict_equals(&b)),
            BinaryOp::StrictNe => Value::Bool(!a.strict_equals(&b)),
            BinaryOp::In => {
                let Value::Object(obj) = &b else {
                    return Err(self.throw_error(
                        "TypeError",
                        "'in' needs an object on its right-hand side",
                        span,
                    ));
                };
                let key = self.to_string(&a)?;
                Value::Bool(has_property(obj, &key))
            }
            BinaryOp::InstanceOf => Value::Bool(self.instance_of(&a, &b, span)?),
        };
        Ok(value)
    }

    fn compare(&mut self, a: Value, b: Value) -> Result<Option<Ordering>, Unwind> {
        let a = self.to_primitive(a, false)?;
        let b = self.to_primitive(b, false)?;
        if let (Value::Str(x), Value::Str(y)) = (&a, &b) {
            return Ok(Some(x.cmp(y)));
        }
        Ok(a.primitive_to_number().partial_cmp(&b.primitive_to_number()))
    }

    fn loose_equals(&mut self, a: Value, b: Value) -> Result<bool, Unwind> {
        Ok(match (&a, &b) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Object(_), Value::Object(_)) => a.strict_equals(&b),
            (Value::Object(_), _) => {
                let a = self.to_primitive(a, false)?;
                return self.loose_equals(a, b);
            }
            (_, Value::Object(_)) => {
                let b = self.to_primitive(b, false)?;
                return self.loose_equals(a, b);
            }
            (Value::Str(_), Value::Str(_)) => a.strict_equals(&b),
            _ => a.primitive_to_number() == b.primitive_to_number(),
        })
    }

    fn instance_of(&mut self, value: &Value, ctor: &Value, span: Span) -> Result<bool, Unwind> {
        let Some(ctor) = ctor.as_object().filter(|_| ctor.is_callable()) else {
            return Err(self.throw_error(
                "TypeError",
                "right-hand side of 'instanceof' is not callable",
                span,
            ));
        };
        let Some(Value::Object(proto)) = lookup(ctor, "prototype") else {
            return Ok(false);
        };
        let Value::Object(obj) = value else {
            return Ok(false);
        };
        let mut current = obj.borrow().proto.clone();
        while let Some(p) = current {
            if Rc::ptr_eq(&p, &proto) {
                return Ok(true);
            }
            current = p.borrow().proto.clone();
        }
        Ok(false)
    }
}

/// Names declared with `var` (or by nested function declarations) anywhere in
/// `stmts`, excluding nested function bodies.
fn collect_var_names(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        collect_from(stmt, out);
    }
}

fn push_unique(name: &str, out: &mut Vec<String>) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

fn collect_from(stmt: &Stmt, out: &mut Vec<String>) {
    match &stmt.kind {
        StmtKind::Var(decls) => decls.iter().for_each(|d| push_unique(&d.name, out)),
        StmtKind::If {
            consequent,
            alternate,
            ..
        } => {
            collect_from(consequent, out);
            if let Some(alternate) = alternate {
                collect_from(alternate, out);
            }
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => collect_from(body, out),
        StmtKind::For { init, body, .. } => {
            if let Some(init) = init {
                collect_from(init, out);
            }
            collect_from(body, out);
        }
        StmtKind::ForIn {
            declare,
            name,
            body,
            ..
        } => {
            if *declare {
                push_unique(name, out);
            }
            collect_from(body, out);
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            collect_var_names(block, out);
            if let Some(handler) = handler {
                collect_var_names(handler, out);
            }
            if let Some(finalizer) = finalizer {
                collect_var_names(finalizer, out);
            }
        }
        StmtKind::Block(stmts) => {
            for inner in stmts {
                if let StmtKind::Function(def) = &inner.kind {
                    if let Some(name) = &def.name {
                        push_unique(name, out);
                    }
                }
            }
            collect_var_names(stmts, out);
        }
        StmtKind::Function(_)
        | StmtKind::Expr(_)
        | StmtKind::Return(_)
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Throw(_)
        | StmtKind::Empty => {}
    }
}
