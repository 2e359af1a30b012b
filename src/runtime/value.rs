//! Script values and the primitive conversions that need no evaluator.

use std::{fmt, rc::Rc};

use super::eval::{EvaluationContext, Unwind};
use super::object::{ObjectKind, ObjectRef};
use super::scope::ScopeRef;
use crate::errors::SourceContext;
use crate::syntax::FunctionDef;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(text.as_ref()))
    }

    /// The `typeof` result.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(obj) => match obj.borrow().kind {
                ObjectKind::Function(_) => "function",
                _ => "object",
            },
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        self.as_object()
            .is_some_and(|o| matches!(o.borrow().kind, ObjectKind::Function(_)))
    }

    /// Number conversion for primitives. Objects convert through the evaluator.
    pub fn primitive_to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Object(_) => f64::NAN,
        }
    }

    /// String conversion for primitives. Objects convert through the evaluator.
    pub fn primitive_to_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::Str(s) => s.to_string(),
            Value::Object(_) => "[object Object]".into(),
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::Function(c) => write!(f, "[function {}]", c.name()),
                ObjectKind::Array(items) => write!(f, "[array; {}]", items.len()),
                _ => write!(f, "[object]"),
            },
            other => write!(f, "{}", other.primitive_to_string()),
        }
    }
}

// ============================================================================
// FUNCTIONS
// ============================================================================

pub type NativeFn = Rc<dyn Fn(&mut EvaluationContext, Value, Vec<Value>) -> Result<Value, Unwind>>;

#[derive(Clone)]
pub enum Callable {
    Closure {
        def: Rc<FunctionDef>,
        env: ScopeRef,
        source: Rc<SourceContext>,
    },
    Native {
        name: String,
        call: NativeFn,
        /// `new` is allowed and uses the returned object.
        constructor: bool,
    },
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Closure { def, .. } => def.name.as_deref().unwrap_or(""),
            Callable::Native { name, .. } => name,
        }
    }
}

// ============================================================================
// NUMBERS
// ============================================================================

/// Formats a number the way scripts print it: integers without a fraction,
/// exponents only for very large or very small magnitudes.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    if n == 0.0 {
        return "0".into();
    }
    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let formatted = format!("{n:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    if n.fract() == 0.0 {
        return format!("{}", n as i128);
    }
    format!("{n}")
}

pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) =>
        {
            trimmed.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_like_scripts_expect() {
        assert_eq!(number_to_string(8.0), "8");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_conversion_to_number() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn int32_wraps() {
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_uint32(-1.0), 4_294_967_295);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("0").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert_eq!(Value::Null.type_name(), "object");
    }
}
