//! Global functions, constructors and prototype methods.
//!
//! Everything installed here is non-enumerable, so scripts that enumerate the
//! global object only see their own variables.

use std::{collections::HashMap, rc::Rc};

use rand::Rng;

use super::eval::{EvaluationContext, Realm, Unwind};
use super::object::{
    is_enumerable, lookup, Object, ObjectKind, ObjectRef, MAX_ARRAY_LENGTH, MAX_DENSE_LENGTH,
};
use super::put_binding;
use super::value::{Callable, Value};

/// `ScriptEngine.FILENAME`.
pub const FILENAME_KEY: &str = "javax.script.filename";

const ERROR_KINDS: &[&str] = &[
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
];

type Args = Vec<Value>;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

// ============================================================================
// INSTALLATION HELPERS
// ============================================================================

struct Installer {
    function_proto: ObjectRef,
}

impl Installer {
    fn function<F>(&self, name: &str, constructor: bool, f: F) -> Value
    where
        F: Fn(&mut EvaluationContext, Value, Args) -> Result<Value, Unwind> + 'static,
    {
        Value::Object(Object::alloc(
            ObjectKind::Function(Callable::Native {
                name: name.to_string(),
                call: Rc::new(f),
                constructor,
            }),
            Some(self.function_proto.clone()),
        ))
    }

    fn method<F>(&self, target: &ObjectRef, name: &str, f: F)
    where
        F: Fn(&mut EvaluationContext, Value, Args) -> Result<Value, Unwind> + 'static,
    {
        let func = self.function(name, false, f);
        hidden(target, name, func);
    }
}

fn hidden(target: &ObjectRef, key: &str, value: Value) {
    target.borrow_mut().props.define(key, value, false);
}

fn plain_object(proto: &ObjectRef) -> ObjectRef {
    Object::alloc(ObjectKind::Ordinary, Some(proto.clone()))
}

// ============================================================================
// REALM
// ============================================================================

/// Builds a fresh global object with every builtin installed.
pub fn create_realm(options: &[String]) -> Rc<Realm> {
    let object_proto = Object::alloc(ObjectKind::Ordinary, None);
    let function_proto = plain_object(&object_proto);
    let array_proto = plain_object(&object_proto);
    let string_proto = plain_object(&object_proto);
    let global = plain_object(&object_proto);
    let install = Installer {
        function_proto: function_proto.clone(),
    };

    let mut error_protos = HashMap::new();
    let error_proto = Object::alloc(ObjectKind::Error, Some(object_proto.clone()));
    for kind in ERROR_KINDS {
        let proto = if *kind == "Error" {
            error_proto.clone()
        } else {
            Object::alloc(ObjectKind::Error, Some(error_proto.clone()))
        };
        hidden(&proto, "name", Value::str(kind));
        error_protos.insert(*kind, proto);
    }
    hidden(&error_proto, "message", Value::str(""));

    install_globals(&install, &global);
    install_object(&install, &global, &object_proto);
    install_function_proto(&install, &function_proto);
    install_array(&install, &global, &array_proto);
    install_string(&install, &global, &string_proto);
    install_errors(&install, &global, &error_protos);
    install_math(&install, &global, &object_proto);
    install_json(&install, &global, &object_proto);
    install_script_engine(&install, &global, &object_proto);

    let option_bag = plain_object(&object_proto);
    for option in options {
        let (name, value) = option_property(option);
        option_bag.borrow_mut().put(&name, value);
    }
    put_binding(&global, "$OPTIONS", Value::Object(option_bag));

    Rc::new(Realm {
        global,
        object_proto,
        function_proto,
        array_proto,
        string_proto,
        error_protos,
        options: options.to_vec(),
    })
}

/// `-scripting` becomes `_scripting: true`; `-Dkey=v` becomes `_Dkey: "v"`.
fn option_property(option: &str) -> (String, Value) {
    let flag = option.trim_start_matches('-');
    let (name, value) = match flag.split_once('=') {
        Some((name, value)) => (name, Value::str(value)),
        None => (flag, Value::Bool(true)),
    };
    let name: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    (format!("_{name}"), value)
}

// ============================================================================
// GLOBAL FUNCTIONS
// ============================================================================

fn install_globals(install: &Installer, global: &ObjectRef) {
    hidden(global, "undefined", Value::Undefined);
    hidden(global, "NaN", Value::Number(f64::NAN));
    hidden(global, "Infinity", Value::Number(f64::INFINITY));

    let print = install.function("print", false, |ctx, _this, args| {
        let mut parts = Vec::with_capacity(args.len());
        for value in &args {
            parts.push(ctx.to_string(value)?);
        }
        let span = ctx.call_span;
        ctx.output.emit(&parts.join(" "), Some(&span));
        Ok(Value::Undefined)
    });
    hidden(global, "print", print.clone());
    hidden(global, "echo", print);

    install.method(global, "fail", |ctx, _this, args| {
        let message = match args.first() {
            Some(value) => ctx.to_string(value)?,
            None => "failed".to_string(),
        };
        ctx.record_failure(message);
        Ok(Value::Undefined)
    });

    install.method(global, "eval", |ctx, _this, args| match args.first() {
        Some(Value::Str(code)) => {
            let code = code.clone();
            ctx.eval_source("<eval>", &code)
        }
        Some(other) => Ok(other.clone()),
        None => Ok(Value::Undefined),
    });

    install.method(global, "readFully", |ctx, _this, args| {
        let path = ctx.to_string(&arg(&args, 0))?;
        std::fs::read_to_string(&path)
            .map(Value::from)
            .map_err(|e| ctx.throw_error("Error", format!("cannot read {path}: {e}"), ctx.call_span))
    });

    for name in ["exit", "quit"] {
        install.method(global, name, |ctx, _this, args| {
            let code = match args.first() {
                Some(value) => ctx.to_number(value)? as i32,
                None => 0,
            };
            Err(Unwind::Exit(code))
        });
    }

    install.method(global, "parseInt", |ctx, _this, args| {
        let text = ctx.to_string(&arg(&args, 0))?;
        let radix = match args.get(1) {
            Some(v) if !v.is_nullish() => ctx.to_number(v)? as u32,
            _ => 0,
        };
        Ok(Value::Number(parse_int(&text, radix)))
    });

    install.method(global, "parseFloat", |ctx, _this, args| {
        let text = ctx.to_string(&arg(&args, 0))?;
        Ok(Value::Number(parse_float(&text)))
    });

    install.method(global, "isNaN", |ctx, _this, args| {
        Ok(Value::Bool(ctx.to_number(&arg(&args, 0))?.is_nan()))
    });

    install.method(global, "isFinite", |ctx, _this, args| {
        Ok(Value::Bool(ctx.to_number(&arg(&args, 0))?.is_finite()))
    });

    let number = install.function("Number", true, |ctx, _this, args| {
        Ok(Value::Number(match args.first() {
            Some(value) => ctx.to_number(value)?,
            None => 0.0,
        }))
    });
    hidden(global, "Number", number);

    let boolean = install.function("Boolean", true, |_ctx, _this, args| {
        Ok(Value::Bool(arg(&args, 0).is_truthy()))
    });
    hidden(global, "Boolean", boolean);
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let mut rest = text.trim_start();
    let negative = rest.starts_with('-');
    rest = rest.trim_start_matches(['-', '+']);
    let mut radix = radix;
    if (radix == 0 || radix == 16) && (rest.starts_with("0x") || rest.starts_with("0X")) {
        rest = &rest[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: String = rest.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    if trimmed.starts_with("Infinity") || trimmed.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if trimmed.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    // Longest prefix that parses.
    (1..=trimmed.len())
        .rev()
        .filter(|&end| trimmed.is_char_boundary(end))
        .find_map(|end| trimmed[..end].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

// ============================================================================
// OBJECT AND FUNCTION
// ============================================================================

fn install_object(install: &Installer, global: &ObjectRef, object_proto: &ObjectRef) {
    let object = install.function("Object", true, |ctx, _this, args| match args.first() {
        Some(value @ Value::Object(_)) => Ok(value.clone()),
        _ => Ok(Value::Object(ctx.new_object())),
    });
    let Value::Object(ctor) = &object else {
        return;
    };
    hidden(ctor, "prototype", Value::Object(object_proto.clone()));

    install.method(ctor, "keys", |ctx, _this, args| {
        let keys = match arg(&args, 0) {
            Value::Object(obj) => obj.borrow().own_enumerable_keys(),
            Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
            other => {
                return Err(ctx.throw_error(
                    "TypeError",
                    format!("{} is not an object", other.primitive_to_string()),
                    ctx.call_span,
                ))
            }
        };
        Ok(ctx.new_array(keys.into_iter().map(Value::from).collect()))
    });

    install.method(ctor, "getOwnPropertyDescriptor", |ctx, _this, args| {
        let Value::Object(obj) = arg(&args, 0) else {
            return Ok(Value::Undefined);
        };
        let key = ctx.to_string(&arg(&args, 1))?;
        let value = {
            let o = obj.borrow();
            if !o.has_own(&key) {
                return Ok(Value::Undefined);
            }
            o.get_own(&key).unwrap_or_default()
        };
        let desc = ctx.new_object();
        {
            let mut d = desc.borrow_mut();
            d.put("value", value);
            d.put("writable", Value::Bool(true));
            d.put("enumerable", Value::Bool(is_enumerable(&obj, &key)));
            d.put("configurable", Value::Bool(true));
        }
        Ok(Value::Object(desc))
    });

    install.method(ctor, "defineProperty", |ctx, _this, args| {
        let target = arg(&args, 0);
        let Value::Object(obj) = &target else {
            return Err(ctx.throw_error(
                "TypeError",
                "Object.defineProperty called on non-object",
                ctx.call_span,
            ));
        };
        let key = ctx.to_string(&arg(&args, 1))?;
        let (value, enumerable) = match arg(&args, 2) {
            Value::Object(desc) => {
                let desc = desc.borrow();
                (
                    desc.get_own("value").unwrap_or_default(),
                    desc.get_own("enumerable").is_some_and(|v| v.is_truthy()),
                )
            }
            _ => (Value::Undefined, false),
        };
        let mut o = obj.borrow_mut();
        if matches!(o.kind, ObjectKind::Array(_)) && super::object::array_index(&key).is_some() {
            o.put(&key, value);
        } else {
            o.props.define(&key, value, enumerable);
        }
        drop(o);
        Ok(target)
    });

    install.method(ctor, "create", |ctx, _this, args| {
        let proto = match arg(&args, 0) {
            Value::Object(proto) => Some(proto),
            Value::Null => None,
            _ => {
                return Err(ctx.throw_error(
                    "TypeError",
                    "Object prototype may only be an Object or null",
                    ctx.call_span,
                ))
            }
        };
        Ok(Value::Object(Object::alloc(ObjectKind::Ordinary, proto)))
    });

    install.method(object_proto, "toString", |_ctx, this, _args| {
        Ok(Value::str(match &this {
            Value::Object(_) => "[object Object]".to_string(),
            other => other.primitive_to_string(),
        }))
    });
    install.method(object_proto, "valueOf", |_ctx, this, _args| Ok(this));
    install.method(object_proto, "hasOwnProperty", |ctx, this, args| {
        let key = ctx.to_string(&arg(&args, 0))?;
        Ok(Value::Bool(match &this {
            Value::Object(obj) => obj.borrow().has_own(&key),
            _ => false,
        }))
    });
    install.method(object_proto, "propertyIsEnumerable", |ctx, this, args| {
        let key = ctx.to_string(&arg(&args, 0))?;
        Ok(Value::Bool(match &this {
            Value::Object(obj) => is_enumerable(obj, &key),
            _ => false,
        }))
    });

    hidden(global, "Object", object);
}

fn install_function_proto(install: &Installer, function_proto: &ObjectRef) {
    install.method(function_proto, "call", |ctx, this, args| {
        let mut args = args.into_iter();
        let this_arg = args.next().unwrap_or_default();
        let span = ctx.call_span;
        ctx.call(&this, this_arg, args.collect(), span)
    });

    install.method(function_proto, "apply", |ctx, this, args| {
        let this_arg = arg(&args, 0);
        let list = match arg(&args, 1) {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Array(items) => items.clone(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        let span = ctx.call_span;
        ctx.call(&this, this_arg, list, span)
    });

    install.method(function_proto, "toString", |_ctx, this, _args| {
        let text = match this.as_object().and_then(|o| o.borrow().callable().cloned()) {
            Some(Callable::Closure { def, source, .. }) => source
                .content
                .get(def.span.start..def.span.end)
                .unwrap_or("function () { [code] }")
                .to_string(),
            Some(Callable::Native { name, .. }) => {
                format!("function {name}() {{ [native code] }}")
            }
            None => "[object Object]".to_string(),
        };
        Ok(Value::from(text))
    });
}

// ============================================================================
// ARRAYS
// ============================================================================

fn array_items(ctx: &EvaluationContext, this: &Value) -> Result<(ObjectRef, Vec<Value>), Unwind> {
    if let Value::Object(obj) = this {
        if let ObjectKind::Array(items) = &obj.borrow().kind {
            return Ok((obj.clone(), items.clone()));
        }
    }
    Err(ctx.throw_error("TypeError", "not an array", ctx.call_span))
}

fn with_items<T>(obj: &ObjectRef, f: impl FnOnce(&mut Vec<Value>) -> T) -> Option<T> {
    match &mut obj.borrow_mut().kind {
        ObjectKind::Array(items) => Some(f(items)),
        _ => None,
    }
}

/// Resolves a relative index the way `slice` does.
fn relative_index(value: f64, len: usize) -> usize {
    if value.is_nan() {
        return 0;
    }
    let len_f = len as f64;
    let index = if value < 0.0 {
        (len_f + value.trunc()).max(0.0)
    } else {
        value.trunc().min(len_f)
    };
    index as usize
}

fn join(ctx: &mut EvaluationContext, items: &[Value], separator: &str) -> Result<String, Unwind> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(if item.is_nullish() {
            String::new()
        } else {
            ctx.to_string(item)?
        });
    }
    Ok(parts.join(separator))
}

fn install_array(install: &Installer, global: &ObjectRef, array_proto: &ObjectRef) {
    let array = install.function("Array", true, |ctx, _this, args| {
        if let [Value::Number(n)] = args.as_slice() {
            if n.fract() != 0.0 || !(0.0..=MAX_ARRAY_LENGTH).contains(n) {
                return Err(ctx.throw_error("RangeError", "Invalid array length", ctx.call_span));
            }
            if *n > MAX_DENSE_LENGTH as f64 {
                return Err(ctx.throw_error(
                    "RangeError",
                    "Array length exceeds the supported maximum",
                    ctx.call_span,
                ));
            }
            return Ok(ctx.new_array(vec![Value::Undefined; *n as usize]));
        }
        Ok(ctx.new_array(args))
    });
    if let Value::Object(ctor) = &array {
        hidden(ctor, "prototype", Value::Object(array_proto.clone()));
        install.method(ctor, "isArray", |_ctx, _this, args| {
            Ok(Value::Bool(matches!(
                arg(&args, 0).as_object().map(|o| matches!(o.borrow().kind, ObjectKind::Array(_))),
                Some(true)
            )))
        });
    }
    hidden(global, "Array", array);

    install.method(array_proto, "push", |ctx, this, args| {
        let (obj, _) = array_items(ctx, &this)?;
        let len = with_items(&obj, |items| {
            items.extend(args);
            items.len()
        });
        Ok(Value::Number(len.unwrap_or_default() as f64))
    });

    install.method(array_proto, "pop", |ctx, this, _args| {
        let (obj, _) = array_items(ctx, &this)?;
        Ok(with_items(&obj, |items| items.pop()).flatten().unwrap_or_default())
    });

    install.method(array_proto, "shift", |ctx, this, _args| {
        let (obj, _) = array_items(ctx, &this)?;
        Ok(with_items(&obj, |items| {
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        })
        .flatten()
        .unwrap_or_default())
    });

    install.method(array_proto, "join", |ctx, this, args| {
        let (_, items) = array_items(ctx, &this)?;
        let separator = match args.first() {
            Some(v) if !matches!(v, Value::Undefined) => ctx.to_string(v)?,
            _ => ",".to_string(),
        };
        Ok(Value::from(join(ctx, &items, &separator)?))
    });

    install.method(array_proto, "toString", |ctx, this, _args| {
        let (_, items) = array_items(ctx, &this)?;
        Ok(Value::from(join(ctx, &items, ",")?))
    });

    install.method(array_proto, "indexOf", |ctx, this, args| {
        let (_, items) = array_items(ctx, &this)?;
        let needle = arg(&args, 0);
        Ok(Value::Number(
            items
                .iter()
                .position(|item| item.strict_equals(&needle))
                .map_or(-1.0, |i| i as f64),
        ))
    });

    install.method(array_proto, "slice", |ctx, this, args| {
        let (_, items) = array_items(ctx, &this)?;
        let len = items.len();
        let start = relative_index(ctx.to_number(&arg(&args, 0))?, len);
        let end = match args.get(1) {
            Some(v) if !matches!(v, Value::Undefined) => relative_index(ctx.to_number(v)?, len),
            _ => len,
        };
        let slice = items.get(start..end.max(start)).unwrap_or_default().to_vec();
        Ok(ctx.new_array(slice))
    });

    install.method(array_proto, "concat", |ctx, this, args| {
        let (_, mut items) = array_items(ctx, &this)?;
        for value in args {
            let spread = match &value {
                Value::Object(obj) => match &obj.borrow().kind {
                    ObjectKind::Array(more) => Some(more.clone()),
                    _ => None,
                },
                _ => None,
            };
            match spread {
                Some(more) => items.extend(more),
                None => items.push(value),
            }
        }
        Ok(ctx.new_array(items))
    });

    install.method(array_proto, "reverse", |ctx, this, _args| {
        let (obj, _) = array_items(ctx, &this)?;
        with_items(&obj, |items| items.reverse());
        Ok(this)
    });

    install.method(array_proto, "forEach", |ctx, this, args| {
        let (_, items) = array_items(ctx, &this)?;
        let callback = arg(&args, 0);
        let span = ctx.call_span;
        for (i, item) in items.into_iter().enumerate() {
            ctx.call(
                &callback,
                Value::Undefined,
                vec![item, Value::Number(i as f64), this.clone()],
                span,
            )?;
        }
        Ok(Value::Undefined)
    });

    install.method(array_proto, "map", |ctx, this, args| {
        let (_, items) = array_items(ctx, &this)?;
        let callback = arg(&args, 0);
        let span = ctx.call_span;
        let mut mapped = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            mapped.push(ctx.call(
                &callback,
                Value::Undefined,
                vec![item, Value::Number(i as f64), this.clone()],
                span,
            )?);
        }
        Ok(ctx.new_array(mapped))
    });

    install.method(array_proto, "filter", |ctx, this, args| {
        let (_, items) = array_items(ctx, &this)?;
        let callback = arg(&args, 0);
        let span = ctx.call_span;
        let mut kept = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            let keep = ctx.call(
                &callback,
                Value::Undefined,
                vec![item.clone(), Value::Number(i as f64), this.clone()],
                span,
            )?;
            if keep.is_truthy() {
                kept.push(item);
            }
        }
        Ok(ctx.new_array(kept))
    });
}

// ============================================================================
// STRINGS
// ============================================================================

fn this_chars(ctx: &mut EvaluationContext, this: &Value) -> Result<Vec<char>, Unwind> {
    Ok(ctx.to_string(this)?.chars().collect())
}

fn char_offset(haystack: &str, byte: usize) -> f64 {
    haystack[..byte].chars().count() as f64
}

fn install_string(install: &Installer, global: &ObjectRef, string_proto: &ObjectRef) {
    let string = install.function("String", true, |ctx, _this, args| {
        Ok(Value::from(match args.first() {
            Some(value) => ctx.to_string(value)?,
            None => String::new(),
        }))
    });
    if let Value::Object(ctor) = &string {
        hidden(ctor, "prototype", Value::Object(string_proto.clone()));
        install.method(ctor, "fromCharCode", |ctx, _this, args| {
            let mut text = String::new();
            for code in &args {
                let code = super::value::to_uint32(ctx.to_number(code)?) & 0xffff;
                text.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            Ok(Value::from(text))
        });
    }
    hidden(global, "String", string);

    for name in ["toString", "valueOf"] {
        install.method(string_proto, name, |ctx, this, _args| {
            Ok(Value::from(ctx.to_string(&this)?))
        });
    }

    install.method(string_proto, "charAt", |ctx, this, args| {
        let chars = this_chars(ctx, &this)?;
        let index = ctx.to_number(&arg(&args, 0))?;
        Ok(Value::from(
            usize_index(index)
                .and_then(|i| chars.get(i))
                .map_or(String::new(), |c| c.to_string()),
        ))
    });

    install.method(string_proto, "charCodeAt", |ctx, this, args| {
        let chars = this_chars(ctx, &this)?;
        let index = ctx.to_number(&arg(&args, 0))?;
        Ok(Value::Number(
            usize_index(index)
                .and_then(|i| chars.get(i))
                .map_or(f64::NAN, |c| f64::from(u32::from(*c))),
        ))
    });

    install.method(string_proto, "indexOf", |ctx, this, args| {
        let text = ctx.to_string(&this)?;
        let needle = ctx.to_string(&arg(&args, 0))?;
        Ok(Value::Number(
            text.find(&needle).map_or(-1.0, |b| char_offset(&text, b)),
        ))
    });

    install.method(string_proto, "lastIndexOf", |ctx, this, args| {
        let text = ctx.to_string(&this)?;
        let needle = ctx.to_string(&arg(&args, 0))?;
        Ok(Value::Number(
            text.rfind(&needle).map_or(-1.0, |b| char_offset(&text, b)),
        ))
    });

    install.method(string_proto, "substring", |ctx, this, args| {
        let chars = this_chars(ctx, &this)?;
        let len = chars.len();
        let clamp = |n: f64| if n.is_nan() { 0 } else { n.max(0.0).min(len as f64) as usize };
        let start = clamp(ctx.to_number(&arg(&args, 0))?);
        let end = match args.get(1) {
            Some(v) if !matches!(v, Value::Undefined) => clamp(ctx.to_number(v)?),
            _ => len,
        };
        let (lo, hi) = (start.min(end), start.max(end));
        Ok(Value::from(chars[lo..hi].iter().collect::<String>()))
    });

    install.method(string_proto, "slice", |ctx, this, args| {
        let chars = this_chars(ctx, &this)?;
        let len = chars.len();
        let start = relative_index(ctx.to_number(&arg(&args, 0))?, len);
        let end = match args.get(1) {
            Some(v) if !matches!(v, Value::Undefined) => relative_index(ctx.to_number(v)?, len),
            _ => len,
        };
        Ok(Value::from(
            chars.get(start..end.max(start)).unwrap_or_default().iter().collect::<String>(),
        ))
    });

    install.method(string_proto, "substr", |ctx, this, args| {
        let chars = this_chars(ctx, &this)?;
        let len = chars.len();
        let start = relative_index(ctx.to_number(&arg(&args, 0))?, len);
        let count = match args.get(1) {
            Some(v) if !matches!(v, Value::Undefined) => ctx.to_number(v)?.max(0.0) as usize,
            _ => len,
        };
        let end = start.saturating_add(count).min(len);
        Ok(Value::from(chars[start..end].iter().collect::<String>()))
    });

    install.method(string_proto, "split", |ctx, this, args| {
        let text = ctx.to_string(&this)?;
        let parts: Vec<Value> = match args.first() {
            None | Some(Value::Undefined) => vec![Value::from(text)],
            Some(separator) => {
                let separator = ctx.to_string(separator)?;
                if separator.is_empty() {
                    text.chars().map(|c| Value::from(c.to_string())).collect()
                } else {
                    text.split(separator.as_str()).map(Value::from).collect()
                }
            }
        };
        Ok(ctx.new_array(parts))
    });

    install.method(string_proto, "toUpperCase", |ctx, this, _args| {
        Ok(Value::from(ctx.to_string(&this)?.to_uppercase()))
    });

    install.method(string_proto, "toLowerCase", |ctx, this, _args| {
        Ok(Value::from(ctx.to_string(&this)?.to_lowercase()))
    });

    install.method(string_proto, "trim", |ctx, this, _args| {
        Ok(Value::str(ctx.to_string(&this)?.trim()))
    });

    install.method(string_proto, "startsWith", |ctx, this, args| {
        let text = ctx.to_string(&this)?;
        let prefix = ctx.to_string(&arg(&args, 0))?;
        Ok(Value::Bool(text.starts_with(&prefix)))
    });

    install.method(string_proto, "endsWith", |ctx, this, args| {
        let text = ctx.to_string(&this)?;
        let suffix = ctx.to_string(&arg(&args, 0))?;
        Ok(Value::Bool(text.ends_with(&suffix)))
    });

    // String patterns only; the first occurrence is replaced.
    install.method(string_proto, "replace", |ctx, this, args| {
        let text = ctx.to_string(&this)?;
        let pattern = ctx.to_string(&arg(&args, 0))?;
        let Some(at) = text.find(&pattern) else {
            return Ok(Value::from(text));
        };
        let replacement = match arg(&args, 1) {
            callback if callback.is_callable() => {
                let span = ctx.call_span;
                let result = ctx.call(
                    &callback,
                    Value::Undefined,
                    vec![Value::from(pattern.clone()), Value::Number(char_offset(&text, at))],
                    span,
                )?;
                ctx.to_string(&result)?
            }
            other => ctx.to_string(&other)?,
        };
        let mut out = String::with_capacity(text.len() + replacement.len());
        out.push_str(&text[..at]);
        out.push_str(&replacement);
        out.push_str(&text[at + pattern.len()..]);
        Ok(Value::from(out))
    });
}

fn usize_index(n: f64) -> Option<usize> {
    (n.is_finite() && n >= 0.0).then(|| n.trunc() as usize)
}

// ============================================================================
// ERRORS
// ============================================================================

fn install_errors(install: &Installer, global: &ObjectRef, protos: &HashMap<&'static str, ObjectRef>) {
    for kind in ERROR_KINDS {
        let Some(proto) = protos.get(kind) else {
            continue;
        };
        let kind: &'static str = kind;
        let ctor = install.function(kind, true, move |ctx, _this, args| {
            let message = match args.first() {
                Some(value) if !matches!(value, Value::Undefined) => ctx.to_string(value)?,
                _ => String::new(),
            };
            Ok(ctx.make_error(kind, message))
        });
        if let Value::Object(obj) = &ctor {
            hidden(obj, "prototype", Value::Object(proto.clone()));
        }
        hidden(global, kind, ctor);
    }

    if let Some(base) = protos.get("Error") {
        install.method(base, "toString", |ctx, this, _args| {
            let span = ctx.call_span;
            let name = ctx.get_member(&this, "name", span)?;
            let name = match name {
                Value::Undefined => "Error".to_string(),
                other => ctx.to_string(&other)?,
            };
            let message = ctx.get_member(&this, "message", span)?;
            let message = match message {
                Value::Undefined => String::new(),
                other => ctx.to_string(&other)?,
            };
            Ok(Value::from(match (name.is_empty(), message.is_empty()) {
                (_, true) => name,
                (true, false) => message,
                (false, false) => format!("{name}: {message}"),
            }))
        });
    }
}

// ============================================================================
// MATH
// ============================================================================

fn install_math(install: &Installer, global: &ObjectRef, object_proto: &ObjectRef) {
    let math = plain_object(object_proto);
    hidden(&math, "PI", Value::Number(std::f64::consts::PI));
    hidden(&math, "E", Value::Number(std::f64::consts::E));

    let unary: &[(&str, fn(f64) -> f64)] = &[
        ("floor", f64::floor),
        ("ceil", f64::ceil),
        ("abs", f64::abs),
        ("sqrt", f64::sqrt),
        ("trunc", f64::trunc),
        ("round", |x| (x + 0.5).floor()),
        ("sign", |x| if x.is_nan() || x == 0.0 { x } else { x.signum() }),
    ];
    for (name, op) in unary {
        let op = *op;
        install.method(&math, name, move |ctx, _this, args| {
            Ok(Value::Number(op(ctx.to_number(&arg(&args, 0))?)))
        });
    }

    install.method(&math, "pow", |ctx, _this, args| {
        let base = ctx.to_number(&arg(&args, 0))?;
        let exp = ctx.to_number(&arg(&args, 1))?;
        Ok(Value::Number(base.powf(exp)))
    });

    install.method(&math, "max", |ctx, _this, args| {
        let mut best = f64::NEG_INFINITY;
        for value in &args {
            let n = ctx.to_number(value)?;
            if n.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            best = best.max(n);
        }
        Ok(Value::Number(best))
    });

    install.method(&math, "min", |ctx, _this, args| {
        let mut best = f64::INFINITY;
        for value in &args {
            let n = ctx.to_number(value)?;
            if n.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            best = best.min(n);
        }
        Ok(Value::Number(best))
    });

    install.method(&math, "random", |_ctx, _this, _args| {
        Ok(Value::Number(rand::thread_rng().gen::<f64>()))
    });

    hidden(global, "Math", Value::Object(math));
}

// ============================================================================
// JSON
// ============================================================================

fn install_json(install: &Installer, global: &ObjectRef, object_proto: &ObjectRef) {
    let json = plain_object(object_proto);

    install.method(&json, "stringify", |ctx, _this, args| {
        let mut stack = Vec::new();
        let Some(tree) = to_json(ctx, &arg(&args, 0), &mut stack)? else {
            return Ok(Value::Undefined);
        };
        let indent = match args.get(2) {
            Some(Value::Number(n)) => " ".repeat(n.clamp(0.0, 10.0) as usize),
            Some(Value::Str(s)) => s.chars().take(10).collect(),
            _ => String::new(),
        };
        let text = if indent.is_empty() {
            serde_json::to_string(&tree)
        } else {
            pretty_json(&tree, &indent)
        };
        text.map(Value::from)
            .map_err(|e| ctx.throw_error("TypeError", e.to_string(), ctx.call_span))
    });

    install.method(&json, "parse", |ctx, _this, args| {
        let text = ctx.to_string(&arg(&args, 0))?;
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(tree) => Ok(from_json(ctx, tree)),
            Err(e) => Err(ctx.throw_error("SyntaxError", format!("invalid JSON: {e}"), ctx.call_span)),
        }
    });

    hidden(global, "JSON", Value::Object(json));
}

fn pretty_json(tree: &serde_json::Value, indent: &str) -> Result<String, serde_json::Error> {
    use serde::Serialize;

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    tree.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn json_number(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

fn to_json(
    ctx: &mut EvaluationContext,
    value: &Value,
    stack: &mut Vec<ObjectRef>,
) -> Result<Option<serde_json::Value>, Unwind> {
    let obj = match value {
        Value::Undefined => return Ok(None),
        Value::Null => return Ok(Some(serde_json::Value::Null)),
        Value::Bool(b) => return Ok(Some(serde_json::Value::Bool(*b))),
        Value::Number(n) => return Ok(Some(json_number(*n))),
        Value::Str(s) => return Ok(Some(serde_json::Value::String(s.to_string()))),
        Value::Object(obj) => obj,
    };
    if value.is_callable() {
        return Ok(None);
    }
    if stack.iter().any(|seen| Rc::ptr_eq(seen, obj)) {
        return Err(ctx.throw_error("TypeError", "cyclic object value", ctx.call_span));
    }
    stack.push(obj.clone());

    let items = match &obj.borrow().kind {
        ObjectKind::Array(items) => Some(items.clone()),
        _ => None,
    };
    let tree = match items {
        Some(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in &items {
                out.push(to_json(ctx, item, stack)?.unwrap_or(serde_json::Value::Null));
            }
            serde_json::Value::Array(out)
        }
        None => {
            let entries: Vec<(String, Value)> = {
                let o = obj.borrow();
                o.own_enumerable_keys()
                    .into_iter()
                    .map(|key| {
                        let value = o.get_own(&key).unwrap_or_default();
                        (key, value)
                    })
                    .collect()
            };
            let mut map = serde_json::Map::new();
            for (key, value) in entries {
                if let Some(json) = to_json(ctx, &value, stack)? {
                    map.insert(key, json);
                }
            }
            serde_json::Value::Object(map)
        }
    };

    stack.pop();
    Ok(Some(tree))
}

fn from_json(ctx: &EvaluationContext, tree: serde_json::Value) -> Value {
    match tree {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::from(s),
        serde_json::Value::Array(items) => {
            ctx.new_array(items.into_iter().map(|item| from_json(ctx, item)).collect())
        }
        serde_json::Value::Object(map) => {
            let obj = ctx.new_object();
            for (key, value) in map {
                let value = from_json(ctx, value);
                obj.borrow_mut().put(&key, value);
            }
            Value::Object(obj)
        }
    }
}

// ============================================================================
// NESTED ENGINES
// ============================================================================

fn install_script_engine(install: &Installer, global: &ObjectRef, object_proto: &ObjectRef) {
    let script_engine = plain_object(object_proto);
    hidden(&script_engine, "FILENAME", Value::str(FILENAME_KEY));
    install.method(&script_engine, "create", |ctx, _this, _args| {
        let realm = create_realm(&ctx.realm.options);
        Ok(engine_object(ctx, realm))
    });
    hidden(global, "ScriptEngine", Value::Object(script_engine));
}

/// A script-visible handle on another realm, with `put`, `get` and `eval`.
///
/// The nested engine shares output and failure recording with its creator.
pub fn engine_object(ctx: &EvaluationContext, realm: Rc<Realm>) -> Value {
    let install = Installer {
        function_proto: ctx.realm.function_proto.clone(),
    };
    let handle = ctx.new_object();

    let target = realm.clone();
    install.method(&handle, "put", move |ctx, _this, args| {
        let key = ctx.to_string(&arg(&args, 0))?;
        put_binding(&target.global, &key, arg(&args, 1));
        Ok(Value::Undefined)
    });

    let target = realm.clone();
    install.method(&handle, "get", move |ctx, _this, args| {
        let key = ctx.to_string(&arg(&args, 0))?;
        Ok(lookup(&target.global, &key).unwrap_or_default())
    });

    install.method(&handle, "eval", move |ctx, _this, args| {
        let code = ctx.to_string(&arg(&args, 0))?;
        // exit() ends only the nested evaluation.
        match ctx.with_realm(realm.clone(), |ctx| ctx.eval_source("<eval>", &code)) {
            Err(Unwind::Exit(_)) => Ok(Value::Undefined),
            other => other,
        }
    });

    Value::Object(handle)
}
